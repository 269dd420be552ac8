// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

mod common;

use std::{
	sync::{
		Arc, Weak,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};

use common::{Client, ON_MESSAGE, Server, runtime};
use graphsub_core::{ConnectionId, Error, EventListener, EventName, Result, RouteResolver, SubscriptionEvent};
use graphsub_sub_server_ws::{
	ConnectionObserver, EventPublisher, GRAPHQL_WS, InProcessEventSource, SubscriptionClient, SubscriptionServer,
};
use graphsub_testing::util::wait_for;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

async fn subscribed(server: &Server, subscriptions: usize) -> Client {
	let mut client = server.connect(GRAPHQL_WS);
	client.init().await;
	for n in 0..subscriptions {
		client.subscribe("start", &n.to_string(), "subscription { onMessage }").await;
	}
	client
}

#[tokio::test]
async fn test_fan_out_to_every_subscription() {
	const CONNECTIONS: usize = 4;
	const SUBSCRIPTIONS: usize = 3;

	let server = Server::new(runtime());
	let mut clients = Vec::new();
	for _ in 0..CONNECTIONS {
		clients.push(subscribed(&server, SUBSCRIPTIONS).await);
	}
	assert_eq!(server.server.receiver_count(&EventName::from(ON_MESSAGE)), CONNECTIONS);
	assert_eq!(server.listener.add_count(&EventName::from(ON_MESSAGE)), 1);

	let executions = server.runtime.execution_count();
	assert_eq!(server.publish(ON_MESSAGE, json!("x")).await.unwrap(), CONNECTIONS);
	assert_eq!(server.runtime.execution_count() - executions, CONNECTIONS * SUBSCRIPTIONS);

	for client in &mut clients {
		let mut ids = Vec::new();
		for _ in 0..SUBSCRIPTIONS {
			let message = client.next().await;
			assert_eq!(message["payload"]["data"]["onMessage"], "x");
			ids.push(message["id"].as_str().unwrap_or_default().to_string());
		}
		ids.sort();
		assert_eq!(ids, vec!["0", "1", "2"]);
		assert!(client.client.try_next().is_none());
	}
}

#[tokio::test]
async fn test_unrelated_routes_are_not_notified() {
	let server = Server::new(runtime());
	let mut on_message = subscribed(&server, 1).await;
	let mut on_other = server.connect(GRAPHQL_WS);
	on_other.init().await;
	on_other.subscribe("start", "1", "subscription { onOther }").await;

	assert_eq!(server.publish(ON_MESSAGE, json!(1)).await.unwrap(), 1);
	assert_eq!(on_message.next().await["id"], "0");
	assert!(on_other.client.try_next().is_none());

	assert_eq!(server.publish("Subscription.onNothing", json!(1)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_single_failure_is_reported_as_is() {
	let server = Server::new(runtime());
	let mut healthy = subscribed(&server, 1).await;
	let broken = subscribed(&server, 1).await;
	broken.transport.fail_sends(true);

	let err = server.publish(ON_MESSAGE, json!(1)).await.unwrap_err();
	assert!(matches!(err, Error::Transport(_)));
	// the healthy connection was still notified
	assert_eq!(healthy.next().await["payload"]["data"]["onMessage"], 1);
}

#[tokio::test]
async fn test_failures_are_aggregated() {
	let server = Server::new(runtime());
	let _healthy = subscribed(&server, 1).await;
	let first = subscribed(&server, 1).await;
	let second = subscribed(&server, 1).await;
	first.transport.fail_sends(true);
	second.transport.fail_sends(true);

	match server.publish(ON_MESSAGE, json!(1)).await {
		Err(Error::Dispatch {
			notified,
			failures,
		}) => {
			assert_eq!(notified, 3);
			assert_eq!(failures.len(), 2);
		}
		other => panic!("expected an aggregated error, got {:?}", other.map(|_| ())),
	}
}

#[tokio::test]
async fn test_failures_within_a_connection_are_aggregated() {
	let server = Server::new(runtime());
	let client = subscribed(&server, 2).await;
	client.transport.fail_sends(true);

	let err = client
		.connection
		.receive_event(&EventName::from(ON_MESSAGE), &json!(1), CancellationToken::new())
		.await
		.unwrap_err();
	assert!(matches!(err, Error::Dispatch { notified: 2, ref failures } if failures.len() == 2));
}

#[tokio::test]
async fn test_closed_connection_receives_nothing() {
	let server = Server::new(runtime());
	let mut client = subscribed(&server, 1).await;
	let connection = client.connection.clone();

	client.send(json!({"type": "connection_terminate"}));
	client.finished().await.unwrap();

	let sent = connection.receive_event(&EventName::from(ON_MESSAGE), &json!(1), CancellationToken::new()).await;
	assert_eq!(sent.unwrap(), 0);
}

#[tokio::test]
async fn test_dropped_connection_is_skipped() {
	let server = Server::new(runtime());
	let event = EventName::from(ON_MESSAGE);

	// a registration whose connection no longer exists
	struct Gone;

	#[async_trait::async_trait]
	impl SubscriptionClient for Gone {
		fn connection_id(&self) -> ConnectionId {
			ConnectionId::generate()
		}

		async fn receive_event(&self, _: &EventName, _: &Value, _: CancellationToken) -> Result<usize> {
			Ok(1)
		}
	}

	let gone: Arc<dyn SubscriptionClient> = Arc::new(Gone);
	server.server.route_added(Arc::downgrade(&gone), gone.connection_id(), &event);
	drop(gone);

	assert_eq!(server.server.receiver_count(&event), 1);
	assert_eq!(server.publish(ON_MESSAGE, json!(1)).await.unwrap(), 0);
}

/// Forwards to the server, holding up every withdrawal of interest.
struct SlowWithdrawal {
	server: Arc<SubscriptionServer>,
	delay: Duration,
	withdrawing: AtomicBool,
	withdrawn: AtomicBool,
}

impl ConnectionObserver for SlowWithdrawal {
	fn route_added(&self, client: Weak<dyn SubscriptionClient>, connection: ConnectionId, event: &EventName) {
		self.server.add_receiver(client, connection, event);
	}

	fn route_removed(&self, connection: ConnectionId, event: &EventName) {
		self.withdrawing.store(true, Ordering::SeqCst);
		std::thread::sleep(self.delay);
		self.server.remove_receiver(connection, event);
		self.withdrawn.store(true, Ordering::SeqCst);
	}

	fn connection_closed(&self, connection: ConnectionId) {
		self.server.remove_connection(connection);
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resubscribe_while_last_subscription_completes() {
	let server = Server::new(runtime());
	let observer = Arc::new(SlowWithdrawal {
		server: server.server.clone(),
		delay: Duration::from_millis(300),
		withdrawing: AtomicBool::new(false),
		withdrawn: AtomicBool::new(false),
	});
	let mut client = server.connect_observed(GRAPHQL_WS, observer.clone());
	client.init().await;
	client.subscribe("start", "a", "subscription { onMessage }").await;

	// completes "a", the last subscription on the route
	let publish = tokio::spawn({
		let server = server.server.clone();
		async move {
			let event = Arc::new(SubscriptionEvent::new(ON_MESSAGE, json!({"last": true})));
			server.publish(event, CancellationToken::new()).await
		}
	});
	{
		let observer = observer.clone();
		wait_for(move || observer.withdrawing.load(Ordering::SeqCst), "withdrawal started").await;
	}
	client.send(json!({"type": "start", "id": "b", "payload": {"query": "subscription { onMessage }"}}));

	{
		let observer = observer.clone();
		wait_for(move || observer.withdrawn.load(Ordering::SeqCst), "withdrawal finished").await;
	}
	{
		let connection = client.connection.clone();
		wait_for(move || connection.has_subscription("b"), "second subscription started").await;
	}
	assert_eq!(publish.await.unwrap().unwrap(), 1);
	assert_eq!(client.next().await, json!({"type": "data", "id": "a", "payload": {"data": {"onMessage": {"last": true}}}}));
	assert_eq!(client.next().await, json!({"type": "complete", "id": "a"}));

	assert_eq!(server.server.receiver_count(&EventName::from(ON_MESSAGE)), 1);
	assert_eq!(server.publish(ON_MESSAGE, json!("again")).await.unwrap(), 1);
	assert_eq!(client.next().await, json!({"type": "data", "id": "b", "payload": {"data": {"onMessage": "again"}}}));
}

#[tokio::test]
async fn test_in_process_source_and_publisher() {
	let runtime = Arc::new(runtime());
	let source = Arc::new(InProcessEventSource::new());
	let listener: Arc<dyn EventListener> = source.clone();
	let server = SubscriptionServer::new(runtime.clone(), listener, 8);

	let (transport, mut client) = graphsub_testing::MemoryTransport::pair();
	let observer: Arc<dyn ConnectionObserver> = server.clone();
	let connection = graphsub_sub_server_ws::ClientConnection::new(
		transport,
		graphsub_sub_server_ws::codec_for(GRAPHQL_WS).unwrap(),
		runtime.clone(),
		Some(observer),
	);
	let cancel = CancellationToken::new();
	tokio::spawn({
		let connection = connection.clone();
		let cancel = cancel.clone();
		async move { connection.start(None, None, cancel).await }
	});

	client.send_json(json!({"type": "connection_init"}));
	assert_eq!(client.next_json().await["type"], "connection_ack");
	client.send_json(json!({"type": "start", "id": "1", "payload": {"query": "subscription { onMessage }"}}));
	let event = EventName::from(ON_MESSAGE);
	{
		let source = source.clone();
		let event = event.clone();
		wait_for(move || source.has_receivers(&event), "server registered upstream").await;
	}
	assert!(runtime.resolve_route(&event).is_some());

	let (publisher, drain) = EventPublisher::spawn(source.clone(), 4, cancel.clone());
	publisher.publish(ON_MESSAGE, json!({"text": "queued"})).await.unwrap();
	assert_eq!(client.next_json().await["payload"]["data"]["onMessage"]["text"], "queued");

	// direct publication bypasses the queue
	let delivered = source.publish(SubscriptionEvent::new(ON_MESSAGE, json!(2)), CancellationToken::new()).await;
	assert_eq!(delivered.unwrap(), 1);
	assert_eq!(client.next_json().await["payload"]["data"]["onMessage"], 2);

	cancel.cancel();
	tokio::time::timeout(Duration::from_secs(1), drain).await.unwrap().unwrap();
	assert!(publisher.is_closed());

	let source_for_wait = source.clone();
	wait_for(move || !source_for_wait.has_receivers(&event), "server unregistered upstream").await;
}
