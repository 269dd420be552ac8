// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use graphsub_core::{EventListener, ExecutionMetadata, Result, SubscriptionEvent};
use graphsub_sub_server_ws::{ClientConnection, ConnectionObserver, SubscriptionServer, codec_for};
use graphsub_testing::{MemoryClient, MemoryTransport, ProjectionRuntime, RecordingListener, util::wait_for};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const ON_MESSAGE: &str = "Subscription.onMessage";

/// A runtime with a `hello` query and `onMessage`/`onOther` subscriptions.
///
/// Events carrying `"skip": true` are not delivered, events carrying
/// `"last": true` complete the subscription.
pub fn runtime() -> ProjectionRuntime {
	ProjectionRuntime::new()
		.query_field("hello", json!("world"))
		.query_field("boom", json!(null))
		.failing_field("boom")
		.subscription_field("onMessage")
		.subscription_field("onOther")
		.on_event(|_, data| {
			Ok(ExecutionMetadata {
				skip_event: data["skip"] == json!(true),
				complete_subscription: data["last"] == json!(true),
			})
		})
}

pub struct Server {
	pub runtime: Arc<ProjectionRuntime>,
	pub listener: Arc<RecordingListener>,
	pub server: Arc<SubscriptionServer>,
}

impl Server {
	pub fn new(runtime: ProjectionRuntime) -> Self {
		let runtime = Arc::new(runtime);
		let listener = Arc::new(RecordingListener::new());
		let upstream: Arc<dyn EventListener> = listener.clone();
		let server = SubscriptionServer::new(runtime.clone(), upstream, 50);
		Self {
			runtime,
			listener,
			server,
		}
	}

	pub fn connect(&self, protocol: &str) -> Client {
		self.connect_with(protocol, None, None)
	}

	pub fn connect_with(&self, protocol: &str, keep_alive: Option<Duration>, init_timeout: Option<Duration>) -> Client {
		self.spawn(protocol, keep_alive, init_timeout, self.server.clone())
	}

	/// Connects with `observer` receiving the connection's notifications
	/// instead of the server.
	pub fn connect_observed(&self, protocol: &str, observer: Arc<dyn ConnectionObserver>) -> Client {
		self.spawn(protocol, None, None, observer)
	}

	fn spawn(
		&self,
		protocol: &str,
		keep_alive: Option<Duration>,
		init_timeout: Option<Duration>,
		observer: Arc<dyn ConnectionObserver>,
	) -> Client {
		let (transport, client) = MemoryTransport::pair();
		let Some(codec) = codec_for(protocol) else {
			panic!("unknown protocol {}", protocol);
		};
		let connection = ClientConnection::new(transport.clone(), codec, self.runtime.clone(), Some(observer));
		let cancel = CancellationToken::new();

		let task = tokio::spawn({
			let connection = connection.clone();
			let cancel = cancel.clone();
			async move { connection.start(keep_alive, init_timeout, cancel).await }
		});

		Client {
			connection,
			transport,
			client,
			cancel,
			task: Some(task),
		}
	}

	pub async fn publish(&self, event: &str, data: Value) -> Result<usize> {
		self.server.publish(Arc::new(SubscriptionEvent::new(event, data)), CancellationToken::new()).await
	}
}

pub struct Client {
	pub connection: Arc<ClientConnection<ProjectionRuntime>>,
	pub transport: Arc<MemoryTransport>,
	pub client: MemoryClient,
	pub cancel: CancellationToken,
	pub task: Option<JoinHandle<Result<()>>>,
}

impl Client {
	pub fn send(&self, message: Value) {
		self.client.send_json(message);
	}

	pub async fn next(&mut self) -> Value {
		self.client.next_json().await
	}

	/// Handshake without keep-alive.
	pub async fn init(&mut self) {
		self.send(json!({"type": "connection_init"}));
		assert_eq!(self.next().await, json!({"type": "connection_ack"}));
	}

	/// Starts a subscription and waits until it is registered.
	pub async fn subscribe(&mut self, kind: &str, id: &str, query: &str) {
		let expected = self.connection.subscription_count() + 1;
		self.send(json!({"type": kind, "id": id, "payload": {"query": query}}));
		let connection = self.connection.clone();
		wait_for(move || connection.subscription_count() == expected, "subscription registered").await;
	}

	/// Waits for the connection task to finish.
	pub async fn finished(&mut self) -> Result<()> {
		match self.task.take() {
			Some(task) => match task.await {
				Ok(result) => result,
				Err(err) => panic!("connection task failed: {}", err),
			},
			None => Ok(()),
		}
	}
}
