// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! The per-client protocol engine.
//!
//! A [`ClientConnection`] owns one transport. Its receive loop dispatches
//! inbound messages one at a time, while published events arrive concurrently
//! through [`SubscriptionClient::receive_event`]. All per-connection state is
//! internally synchronized so both paths may run at once.
//!
//! Resources (subscriptions, id reservations, registry interest, timers) are
//! released exactly once, whichever of the receive loop, an explicit
//! [`ClientConnection::close_connection`] or the initialization timeout gets
//! there first.

mod observer;
mod state;

use std::{
	sync::{
		Arc, Weak,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};

use async_trait::async_trait;
use futures_util::future::join_all;
use graphsub_core::{
	ClientTransport, CloseStatus, ConnectionId, Error, EventName, EventSource, ExecutionContext, FieldRoute,
	FrameKind, GraphQLPayload, QueryRuntime, Result, TransportState,
};
use graphsub_runtime::{KeepAliveTimer, LinkedToken, ScheduledTask, schedule_once};
use graphsub_subscription::{ClientSubscription, MessageIdReservationSet, SubscriptionCollection};
pub use observer::{ConnectionObserver, SubscriptionClient};
use parking_lot::Mutex;
use serde_json::Value;
pub use state::ConnectionState;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, trace, warn};

use crate::protocol::{ClientMessage, ErrorCode, ErrorPayload, ProtocolCodec, ProtocolViolation, Rejection, ServerMessage};

pub struct ClientConnection<R: QueryRuntime> {
	id: ConnectionId,
	this: Weak<Self>,
	transport: Arc<dyn ClientTransport>,
	codec: Arc<dyn ProtocolCodec>,
	runtime: Arc<R>,
	state: Mutex<ConnectionState>,
	initialized: AtomicBool,
	keep_alive_configured: AtomicBool,
	keep_alive_enabled: AtomicBool,
	subscriptions: SubscriptionCollection<R::Plan>,
	reservations: MessageIdReservationSet,
	observer: Mutex<Option<Arc<dyn ConnectionObserver>>>,
	init_timer: Mutex<Option<ScheduledTask>>,
	/// Cancelled when resources are released; aborts in-flight executions.
	cancel: CancellationToken,
	released: AtomicBool,
}

impl<R: QueryRuntime> ClientConnection<R> {
	pub fn new(
		transport: Arc<dyn ClientTransport>,
		codec: Arc<dyn ProtocolCodec>,
		runtime: Arc<R>,
		observer: Option<Arc<dyn ConnectionObserver>>,
	) -> Arc<Self> {
		Arc::new_cyclic(|this| Self {
			id: ConnectionId::generate(),
			this: this.clone(),
			transport,
			codec,
			runtime,
			state: Mutex::new(ConnectionState::Created),
			initialized: AtomicBool::new(false),
			keep_alive_configured: AtomicBool::new(false),
			keep_alive_enabled: AtomicBool::new(false),
			subscriptions: SubscriptionCollection::new(),
			reservations: MessageIdReservationSet::new(),
			observer: Mutex::new(observer),
			init_timer: Mutex::new(None),
			cancel: CancellationToken::new(),
			released: AtomicBool::new(false),
		})
	}

	pub fn id(&self) -> ConnectionId {
		self.id
	}

	pub fn protocol(&self) -> &'static str {
		self.codec.name()
	}

	pub fn state(&self) -> ConnectionState {
		*self.state.lock()
	}

	pub fn subscription_count(&self) -> usize {
		self.subscriptions.len()
	}

	pub fn has_subscription(&self, id: &str) -> bool {
		self.subscriptions.contains(id)
	}

	pub fn is_reserved(&self, id: &str) -> bool {
		self.reservations.contains(id)
	}

	pub fn is_initialized(&self) -> bool {
		self.initialized.load(Ordering::SeqCst)
	}

	pub fn is_keep_alive_enabled(&self) -> bool {
		self.keep_alive_enabled.load(Ordering::SeqCst)
	}

	/// Runs the connection until the client goes away, the connection is
	/// closed or `cancel` fires.
	///
	/// Fails immediately if the connection has already been used. Timers are
	/// stopped and resources released on every exit path before returning.
	pub async fn start(
		&self,
		keep_alive: Option<Duration>,
		init_timeout: Option<Duration>,
		cancel: CancellationToken,
	) -> Result<()> {
		self.begin()?;
		let span = tracing::debug_span!("connection", connection = %self.id, protocol = self.codec.name());

		async {
			let timer = keep_alive.map(|interval| self.keep_alive_timer(interval));
			let result = self.run(timer.as_ref(), init_timeout, &cancel).await;

			if let Some(timer) = &timer {
				timer.dispose().await;
			}
			self.stop_init_timeout().await;

			let status = match &result {
				Ok(status) => status.clone(),
				Err(err) => {
					warn!(error = %err, "connection loop failed");
					CloseStatus::new(CloseStatus::INTERNAL_ERROR, "Internal server error")
				}
			};
			if self.transport.state() == TransportState::Open {
				if let Err(err) = self.close_connection(status).await {
					debug!(error = %err, "closing transport failed");
				}
			} else {
				self.release_resources();
			}

			self.observer.lock().take();
			*self.state.lock() = ConnectionState::ClosedForever;
			debug!("connection finished");
			result.map(|_| ())
		}
		.instrument(span)
		.await
	}

	fn begin(&self) -> Result<()> {
		let mut state = self.state.lock();
		if self.transport.is_closed_forever() {
			*state = ConnectionState::ClosedForever;
		}
		match *state {
			ConnectionState::Created => {
				*state = ConnectionState::Open;
				Ok(())
			}
			ConnectionState::Open | ConnectionState::Closing => Err(Error::AlreadyStarted(self.id)),
			ConnectionState::Closed | ConnectionState::ClosedForever => Err(Error::ClosedForever(self.id)),
		}
	}

	/// Returns the status to close the transport with.
	async fn run(
		&self,
		keep_alive: Option<&KeepAliveTimer>,
		init_timeout: Option<Duration>,
		cancel: &CancellationToken,
	) -> Result<CloseStatus> {
		self.transport.open(self.codec.name()).await?;
		info!("connection opened");

		if let Some(timeout) = init_timeout {
			self.schedule_init_timeout(timeout);
		}
		if let Some(timer) = keep_alive {
			self.keep_alive_configured.store(true, Ordering::SeqCst);
			timer.start().await?;
		}

		loop {
			let frame = tokio::select! {
				biased;
				_ = cancel.cancelled() => return Ok(CloseStatus::going_away("Server shutting down")),
				_ = self.cancel.cancelled() => return Ok(CloseStatus::normal()),
				frame = self.transport.receive() => frame?,
			};

			match frame.kind {
				FrameKind::Close => {
					let status = frame.close.unwrap_or_else(CloseStatus::normal);
					debug!(code = status.code, reason = %status.reason, "close received");
					return Ok(status);
				}
				FrameKind::Text | FrameKind::Binary => self.handle_frame(&frame.payload).await?,
			}

			if self.transport.state() != TransportState::Open {
				return Ok(CloseStatus::normal());
			}
		}
	}

	async fn handle_frame(&self, payload: &[u8]) -> Result<()> {
		let Ok(text) = std::str::from_utf8(payload) else {
			let violation = ProtocolViolation::new(ErrorCode::InvalidMessage, "Message is not valid UTF-8");
			return self.handle_violation(violation).await;
		};

		match self.codec.decode(text) {
			Ok(message) => self.dispatch(message).await,
			Err(violation) => self.handle_violation(violation).await,
		}
	}

	async fn dispatch(&self, message: ClientMessage) -> Result<()> {
		match message {
			ClientMessage::ConnectionInit {
				..
			} => self.handle_init().await,
			ClientMessage::Start {
				id,
				payload,
			} => self.handle_start(id, payload).await,
			ClientMessage::Stop {
				id,
			} => self.handle_stop(&id).await,
			ClientMessage::ConnectionTerminate => {
				debug!("client terminated the connection");
				self.close_connection(CloseStatus::normal()).await
			}
			ClientMessage::Ping {
				payload,
			} => {
				self.send(&ServerMessage::Pong {
					payload,
				})
				.await
			}
			ClientMessage::Pong {
				..
			} => Ok(()),
		}
	}

	async fn handle_violation(&self, violation: ProtocolViolation) -> Result<()> {
		debug!(%violation, "protocol violation");

		if violation.code == ErrorCode::InvalidConnectionInit {
			return match self.codec.init_rejected(&violation) {
				Rejection::Reply(message) => self.send(&message).await,
				Rejection::Close(status) => self.close_connection(status).await,
			};
		}

		let payload = violation.to_payload(self.codec.protocol_rule());
		self.send(&ServerMessage::error(violation.id, payload)).await
	}

	async fn handle_init(&self) -> Result<()> {
		if self.initialized.swap(true, Ordering::SeqCst) {
			if let Some(status) = self.codec.repeated_init() {
				return self.close_connection(status).await;
			}
			return self.send(&ServerMessage::ConnectionAck).await;
		}

		self.cancel_init_timeout();

		// no keep-alive may overtake the ack
		self.send(&ServerMessage::ConnectionAck).await?;
		if self.keep_alive_configured.load(Ordering::SeqCst) && !self.is_released() {
			self.keep_alive_enabled.store(true, Ordering::SeqCst);
			if let Some(keep_alive) = self.codec.keep_alive() {
				self.send(&keep_alive).await?;
			}
		}
		debug!("connection initialised");
		Ok(())
	}

	async fn handle_start(&self, id: String, payload: GraphQLPayload) -> Result<()> {
		if !self.is_initialized() {
			if let Some(status) = self.codec.unauthorized() {
				return self.close_connection(status).await;
			}
		}

		let Some(reservation) = self.reservations.reserve(&id) else {
			debug!(operation = %id, "operation id already in use");
			return self.send(&ServerMessage::error(Some(id.clone()), ErrorPayload::duplicate_id(&id))).await;
		};

		let request = self.runtime.create_request(payload).with_connection(self.id);
		let context = ExecutionContext::request(request.clone());
		let outcome = match self.runtime.execute(context, self.cancel.child_token()).await {
			Ok(outcome) => outcome,
			Err(err) => {
				warn!(operation = %id, error = %err, "operation failed");
				return self.send(&ServerMessage::error(Some(id), ErrorPayload::internal())).await;
			}
		};

		let Some(plan) = outcome.subscription else {
			// query or mutation: one result, then done
			self.send(&ServerMessage::data(&id, outcome.result)).await?;
			return self.send(&ServerMessage::complete(&id)).await;
		};

		if !plan.is_valid {
			debug!(operation = %id, route = %plan.route, "subscription rejected");
			let mut result = outcome.result;
			result.errors.extend(plan.messages);
			self.send(&ServerMessage::data(&id, result)).await?;
			return self.send(&ServerMessage::complete(&id)).await;
		}

		let event = plan.route.event_name();
		let route = plan.route.clone();
		let subscription = ClientSubscription::new(id.clone(), plan.route, request, plan.plan);
		let added = self.subscriptions.add_with(subscription, |count| {
			if count == 1 {
				self.notify_route_added(&event);
			}
		});
		if let Err(err) = added {
			warn!(operation = %id, error = %err, "subscription not added");
			return self.send(&ServerMessage::error(Some(id.clone()), ErrorPayload::duplicate_id(&id))).await;
		}

		// torn down while the runtime was executing
		if self.is_released() {
			self.remove_subscription(&id);
			return Ok(());
		}

		reservation.hold();
		debug!(operation = %id, %route, "subscription started");
		Ok(())
	}

	async fn handle_stop(&self, id: &str) -> Result<()> {
		if !self.remove_subscription(id) {
			debug!(operation = id, "stop for unknown operation");
		}
		match self.codec.stop_acknowledgement(id) {
			Some(ack) => self.send(&ack).await,
			None => Ok(()),
		}
	}

	/// Removes a subscription and releases its id. Returns `false` if there
	/// was no such subscription.
	fn remove_subscription(&self, id: &str) -> bool {
		let removed = self.subscriptions.remove_with(id, |subscription, remaining| {
			if remaining == 0 {
				self.notify_route_removed(subscription.event_name());
			}
		});
		let Some((subscription, _)) = removed else {
			return false;
		};
		self.reservations.release(id);
		debug!(operation = id, route = %subscription.route(), "subscription stopped");
		true
	}

	/// Closes the transport if it is still open and releases every resource
	/// of this connection. Safe to call more than once.
	pub async fn close_connection(&self, status: CloseStatus) -> Result<()> {
		let result = if self.transport.state() == TransportState::Open {
			{
				let mut state = self.state.lock();
				if state.is_open() {
					*state = ConnectionState::Closing;
				}
			}
			debug!(connection = %self.id, code = status.code, reason = %status.reason, "closing connection");
			self.transport.close(status).await
		} else {
			Ok(())
		};

		self.release_resources();
		result
	}

	fn release_resources(&self) {
		if self.released.swap(true, Ordering::SeqCst) {
			return;
		}

		self.cancel.cancel();
		self.keep_alive_enabled.store(false, Ordering::SeqCst);
		self.cancel_init_timeout();

		// a subscription added after the clear sees the released flag and
		// removes itself again
		let removed = self.subscriptions.clear();
		self.reservations.clear();
		let observer = self.observer.lock().clone();
		if let Some(observer) = observer {
			observer.connection_closed(self.id);
		}

		{
			let mut state = self.state.lock();
			if *state != ConnectionState::ClosedForever {
				*state = ConnectionState::Closed;
			}
		}
		debug!(connection = %self.id, subscriptions = removed.len(), "connection resources released");
	}

	fn is_released(&self) -> bool {
		self.released.load(Ordering::SeqCst)
	}

	async fn send(&self, message: &ServerMessage) -> Result<()> {
		let text = self.codec.encode(message)?;
		trace!(connection = %self.id, message = %text, "send");
		self.transport.send(FrameKind::Text, text.into_bytes()).await
	}

	fn notify_route_added(&self, event: &EventName) {
		let observer = self.observer.lock().clone();
		if let Some(observer) = observer {
			let client: Weak<dyn SubscriptionClient> = self.this.clone();
			observer.route_added(client, self.id, event);
		}
	}

	fn notify_route_removed(&self, event: &EventName) {
		let observer = self.observer.lock().clone();
		if let Some(observer) = observer {
			observer.route_removed(self.id, event);
		}
	}

	fn keep_alive_timer(&self, interval: Duration) -> KeepAliveTimer {
		let this = self.this.clone();
		KeepAliveTimer::new(interval, interval, move || {
			let this = this.clone();
			async move {
				match this.upgrade() {
					Some(connection) => connection.send_keep_alive().await,
					None => Ok(()),
				}
			}
		})
	}

	async fn send_keep_alive(&self) -> Result<()> {
		if !self.is_keep_alive_enabled() || self.is_released() || self.transport.state() != TransportState::Open {
			return Ok(());
		}
		match self.codec.keep_alive() {
			Some(keep_alive) => self.send(&keep_alive).await,
			None => Ok(()),
		}
	}

	fn schedule_init_timeout(&self, timeout: Duration) {
		let this = self.this.clone();
		let task = schedule_once(timeout, async move {
			if let Some(connection) = this.upgrade() {
				connection.on_init_timeout().await;
			}
		});
		*self.init_timer.lock() = Some(task);
	}

	/// Keeps a pending initialization timeout from firing. The task stays in
	/// place so the receive loop can wait for it on exit.
	fn cancel_init_timeout(&self) {
		if let Some(task) = self.init_timer.lock().as_ref() {
			task.cancel();
		}
	}

	/// Waits for an initialization timeout that already fired to finish.
	async fn stop_init_timeout(&self) {
		let task = self.init_timer.lock().take();
		if let Some(task) = task {
			task.stop().await;
		}
	}

	async fn on_init_timeout(&self) {
		if self.is_initialized() || self.is_released() {
			return;
		}
		match self.codec.init_timeout() {
			Some(status) => {
				info!(connection = %self.id, "connection initialisation timed out");
				if let Err(err) = self.close_connection(status).await {
					warn!(connection = %self.id, error = %err, "closing timed out connection failed");
				}
			}
			None => debug!(connection = %self.id, "initialisation window elapsed"),
		}
	}

	async fn deliver(
		&self,
		subscription: Arc<ClientSubscription<R::Plan>>,
		route: FieldRoute,
		data: Value,
		cancel: CancellationToken,
	) -> Result<usize> {
		let context = ExecutionContext::event(
			subscription.request().clone(),
			subscription.plan().clone(),
			EventSource {
				route,
				data,
			},
		);
		let outcome = self.runtime.execute(context, cancel).await?;

		let mut sent = 0;
		if !outcome.metadata.skip_event {
			self.send(&ServerMessage::data(subscription.id(), outcome.result)).await?;
			sent += 1;
		}
		if outcome.metadata.complete_subscription {
			if let Some(end) = self.codec.subscription_end(subscription.id()) {
				self.send(&end).await?;
			}
			self.remove_subscription(subscription.id());
		}
		Ok(sent)
	}
}

#[async_trait]
impl<R: QueryRuntime> SubscriptionClient for ClientConnection<R> {
	fn connection_id(&self) -> ConnectionId {
		self.id
	}

	async fn receive_event(&self, event: &EventName, data: &Value, cancel: CancellationToken) -> Result<usize> {
		// let a burst of events interleave with other work
		tokio::task::yield_now().await;

		if self.is_released() || !self.state().is_open() {
			return Ok(0);
		}
		let Some(route) = self.runtime.resolve_route(event) else {
			return Ok(0);
		};
		let subscriptions = self.subscriptions.retrieve_by_route(&route);
		if subscriptions.is_empty() {
			return Ok(0);
		}

		let linked = LinkedToken::new(&self.cancel, &cancel);
		let deliveries = subscriptions.into_iter().map(|subscription| {
			self.deliver(subscription, route.clone(), data.clone(), linked.token().clone())
		});
		let results = join_all(deliveries).await;

		let attempted = results.len();
		let mut sent = 0;
		let mut failures = Vec::new();
		for result in results {
			match result {
				Ok(count) => sent += count,
				Err(err) => failures.push(err),
			}
		}

		match Error::aggregate(attempted, failures) {
			Some(err) => {
				warn!(connection = %self.id, event = %event, error = %err, "event delivery failed");
				Err(err)
			}
			None => Ok(sent),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_state_display() {
		assert_eq!(ConnectionState::ClosedForever.to_string(), "closed-forever");
		assert!(ConnectionState::Open.is_open());
		assert!(!ConnectionState::Closing.is_open());
	}
}
