// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Websocket server subsystem hosting GraphQL subscription connections.
//!
//! `WsSubsystem` owns the TCP listener, negotiates the GraphQL sub-protocol
//! during the websocket upgrade and runs one [`ClientConnection`] per client.
//! Connections register their interest with a shared [`SubscriptionServer`],
//! which listens on the subsystem's [`InProcessEventSource`].

use std::{
	any::Any,
	net::SocketAddr,
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;
use graphsub_core::{ConnectionId, Error, QueryRuntime, Result};
use graphsub_sub_api::{HealthStatus, Subsystem};
use parking_lot::RwLock;
use tokio::{
	net::{TcpListener, TcpStream},
	sync::{Semaphore, watch},
	task::JoinHandle,
	time::{Instant, sleep},
};
use tokio_tungstenite::{
	accept_hdr_async,
	tungstenite::{
		handshake::server::{ErrorResponse, Request, Response},
		http::{HeaderValue, header::SEC_WEBSOCKET_PROTOCOL},
	},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
	config::WsConfig,
	connection::{ClientConnection, ConnectionObserver},
	protocol::codec_for,
	publisher::EventPublisher,
	server::SubscriptionServer,
	source::InProcessEventSource,
	transport::WebSocketTransport,
};

type Connections<R> = DashMap<ConnectionId, Arc<ClientConnection<R>>>;

pub struct WsSubsystem<R: QueryRuntime> {
	config: WsConfig,
	runtime: Arc<R>,
	source: Arc<InProcessEventSource>,
	server: Arc<SubscriptionServer>,
	/// Actual bound address (available after start).
	actual_addr: RwLock<Option<SocketAddr>>,
	running: Arc<AtomicBool>,
	active_connections: Arc<AtomicUsize>,
	connections: Arc<Connections<R>>,
	shutdown_tx: Option<watch::Sender<bool>>,
	/// Cancelled on shutdown; every connection and the publisher hold a child.
	cancel: CancellationToken,
	connection_semaphore: Arc<Semaphore>,
	publisher: Option<EventPublisher>,
	tasks: Vec<JoinHandle<()>>,
}

impl<R: QueryRuntime> WsSubsystem<R> {
	pub fn new(config: WsConfig, runtime: Arc<R>) -> Result<Self> {
		config.validate()?;
		let source = Arc::new(InProcessEventSource::new());
		let server = SubscriptionServer::new(runtime.clone(), source.clone(), config.max_concurrent_notifications);
		let max_connections = config.max_connections;

		Ok(Self {
			config,
			runtime,
			source,
			server,
			actual_addr: RwLock::new(None),
			running: Arc::new(AtomicBool::new(false)),
			active_connections: Arc::new(AtomicUsize::new(0)),
			connections: Arc::new(DashMap::new()),
			shutdown_tx: None,
			cancel: CancellationToken::new(),
			connection_semaphore: Arc::new(Semaphore::new(max_connections)),
			publisher: None,
			tasks: Vec::new(),
		})
	}

	pub fn config(&self) -> &WsConfig {
		&self.config
	}

	/// Get the actual bound address (available after start).
	pub fn local_addr(&self) -> Option<SocketAddr> {
		*self.actual_addr.read()
	}

	pub fn port(&self) -> Option<u16> {
		self.local_addr().map(|a| a.port())
	}

	pub fn active_connections(&self) -> usize {
		self.active_connections.load(Ordering::SeqCst)
	}

	/// Connections that completed the websocket upgrade and are still running.
	pub fn connection(&self, id: ConnectionId) -> Option<Arc<ClientConnection<R>>> {
		self.connections.get(&id).map(|entry| entry.value().clone())
	}

	pub fn connection_ids(&self) -> Vec<ConnectionId> {
		self.connections.iter().map(|entry| *entry.key()).collect()
	}

	pub fn server(&self) -> &Arc<SubscriptionServer> {
		&self.server
	}

	pub fn source(&self) -> &Arc<InProcessEventSource> {
		&self.source
	}

	/// Queue for publishing events, available while the subsystem runs.
	pub fn publisher(&self) -> Option<EventPublisher> {
		self.publisher.clone()
	}
}

#[async_trait]
impl<R: QueryRuntime> Subsystem for WsSubsystem<R> {
	fn name(&self) -> &'static str {
		"WebSocket"
	}

	async fn start(&mut self) -> Result<()> {
		if self.running.load(Ordering::SeqCst) {
			return Ok(());
		}

		let listener = TcpListener::bind(&self.config.bind_addr).await?;
		let actual_addr = listener.local_addr()?;
		*self.actual_addr.write() = Some(actual_addr);
		info!(addr = %actual_addr, "websocket server bound");

		self.cancel = CancellationToken::new();
		let (publisher, drain) = EventPublisher::spawn(
			self.source.clone(),
			self.config.publisher_queue_capacity,
			self.cancel.child_token(),
		);
		self.publisher = Some(publisher);
		self.tasks.push(drain);

		let (tx, rx) = watch::channel(false);
		let accept = AcceptLoop {
			listener,
			shutdown: rx,
			settings: Arc::new(ConnectionSettings {
				protocols: self.config.protocols.clone(),
				default_protocol: self.config.default_protocol,
				keep_alive: self.config.keep_alive_interval,
				init_timeout: self.config.connection_init_timeout,
			}),
			runtime: self.runtime.clone(),
			server: self.server.clone(),
			connections: self.connections.clone(),
			active_connections: self.active_connections.clone(),
			semaphore: self.connection_semaphore.clone(),
			cancel: self.cancel.clone(),
			running: self.running.clone(),
		};

		self.running.store(true, Ordering::SeqCst);
		self.tasks.push(tokio::spawn(accept.run()));
		self.shutdown_tx = Some(tx);
		Ok(())
	}

	async fn shutdown(&mut self) -> Result<()> {
		if let Some(tx) = self.shutdown_tx.take() {
			let _ = tx.send(true);
		}
		// open connections close themselves with 1001
		self.cancel.cancel();
		self.publisher = None;

		let deadline = Instant::now() + self.config.shutdown_grace;
		while self.active_connections.load(Ordering::SeqCst) > 0 {
			if Instant::now() > deadline {
				warn!(
					active = self.active_connections.load(Ordering::SeqCst),
					"websocket shutdown timeout with connections still active"
				);
				break;
			}
			sleep(Duration::from_millis(10)).await;
		}

		for task in self.tasks.drain(..) {
			if let Err(err) = task.await {
				warn!(error = %err, "websocket task failed");
			}
		}
		self.running.store(false, Ordering::SeqCst);
		debug!("websocket server shutdown completed");
		Ok(())
	}

	fn is_running(&self) -> bool {
		self.running.load(Ordering::SeqCst)
	}

	fn health_status(&self) -> HealthStatus {
		if self.running.load(Ordering::SeqCst) {
			let active = self.active_connections.load(Ordering::SeqCst);
			let max = self.config.max_connections;

			// Warn if connections are at 90% capacity
			if active > max * 90 / 100 {
				HealthStatus::Warning {
					description: format!("High connection count: {}/{}", active, max),
				}
			} else {
				HealthStatus::Healthy
			}
		} else {
			HealthStatus::Failed {
				description: "Not running".to_string(),
			}
		}
	}

	fn as_any(&self) -> &dyn Any {
		self
	}

	fn as_any_mut(&mut self) -> &mut dyn Any {
		self
	}
}

struct ConnectionSettings {
	protocols: Vec<&'static str>,
	default_protocol: &'static str,
	keep_alive: Option<Duration>,
	init_timeout: Option<Duration>,
}

struct AcceptLoop<R: QueryRuntime> {
	listener: TcpListener,
	shutdown: watch::Receiver<bool>,
	settings: Arc<ConnectionSettings>,
	runtime: Arc<R>,
	server: Arc<SubscriptionServer>,
	connections: Arc<Connections<R>>,
	active_connections: Arc<AtomicUsize>,
	semaphore: Arc<Semaphore>,
	cancel: CancellationToken,
	running: Arc<AtomicBool>,
}

impl<R: QueryRuntime> AcceptLoop<R> {
	async fn run(mut self) {
		loop {
			tokio::select! {
				biased;

				result = self.shutdown.changed() => {
					if result.is_err() || *self.shutdown.borrow() {
						info!("websocket server shutting down");
						break;
					}
				}

				accept = self.listener.accept() => {
					let (stream, peer) = match accept {
						Ok(accepted) => accepted,
						Err(err) => {
							warn!(error = %err, "accept failed");
							continue;
						}
					};

					let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
						warn!(%peer, "connection limit reached, rejecting");
						continue;
					};

					self.active_connections.fetch_add(1, Ordering::SeqCst);
					debug!(%peer, "accepted connection");

					let settings = self.settings.clone();
					let runtime = self.runtime.clone();
					let server = self.server.clone();
					let connections = self.connections.clone();
					let active = self.active_connections.clone();
					let cancel = self.cancel.child_token();
					tokio::spawn(async move {
						serve(stream, peer, &settings, runtime, server, &connections, cancel).await;
						active.fetch_sub(1, Ordering::SeqCst);
						drop(permit);
					});
				}
			}
		}

		self.running.store(false, Ordering::SeqCst);
		info!("websocket server stopped");
	}
}

async fn serve<R: QueryRuntime>(
	stream: TcpStream,
	peer: SocketAddr,
	settings: &ConnectionSettings,
	runtime: Arc<R>,
	server: Arc<SubscriptionServer>,
	connections: &Connections<R>,
	cancel: CancellationToken,
) {
	let mut negotiated = None;
	let callback = |request: &Request, mut response: Response| {
		let offered = request.headers().get(SEC_WEBSOCKET_PROTOCOL).and_then(|value| value.to_str().ok());
		if let Some(protocol) = negotiate_protocol(offered, &settings.protocols) {
			response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(protocol));
			negotiated = Some(protocol);
		}
		Ok::<_, ErrorResponse>(response)
	};

	let socket = match accept_hdr_async(stream, callback).await {
		Ok(socket) => socket,
		Err(err) => {
			debug!(%peer, error = %err, "websocket upgrade failed");
			return;
		}
	};

	let protocol = negotiated.unwrap_or(settings.default_protocol);
	let Some(codec) = codec_for(protocol) else {
		warn!(%peer, protocol, "no codec for protocol");
		return;
	};

	let transport = Arc::new(WebSocketTransport::new(socket));
	let observer: Arc<dyn ConnectionObserver> = server;
	let connection = ClientConnection::new(transport, codec, runtime, Some(observer));
	let id = connection.id();
	connections.insert(id, connection.clone());
	debug!(%peer, connection = %id, protocol, "websocket connection upgraded");

	if let Err(err) = connection.start(settings.keep_alive, settings.init_timeout, cancel).await {
		log_connection_error(id, &err);
	}
	connections.remove(&id);
}

fn log_connection_error(connection: ConnectionId, err: &Error) {
	match err {
		Error::WebSocket(_) | Error::Transport(_) | Error::Io(_) => {
			debug!(%connection, error = %err, "connection dropped")
		}
		_ => warn!(%connection, error = %err, "connection failed"),
	}
}

/// Picks the first of `supported` (in preference order) that the client
/// offered in its `Sec-WebSocket-Protocol` header.
pub fn negotiate_protocol(offered: Option<&str>, supported: &[&'static str]) -> Option<&'static str> {
	let offered: Vec<&str> = offered?.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
	supported.iter().copied().find(|protocol| offered.contains(protocol))
}
