// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Server wide registry of which connections are interested in which events.
//!
//! The registry holds connections weakly: connections own their subscriptions,
//! the registry only routes events to them. An event name has an entry exactly
//! while at least one connection is interested in it, and the registry is
//! registered with the upstream [`EventListener`] for exactly those names.

use std::{
	collections::HashMap,
	sync::{Arc, Weak},
};

use async_trait::async_trait;
use graphsub_core::{
	ConnectionId, Error, EventListener, EventName, EventReceiver, ReceiverId, Result, RouteResolver,
	SubscriptionEvent,
};
use parking_lot::Mutex;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::connection::{ConnectionObserver, SubscriptionClient};

type Receivers = HashMap<EventName, HashMap<ConnectionId, Weak<dyn SubscriptionClient>>>;

pub struct SubscriptionServer {
	id: ReceiverId,
	this: Weak<Self>,
	resolver: Arc<dyn RouteResolver>,
	listener: Arc<dyn EventListener>,
	receivers: Mutex<Receivers>,
	/// Bounds concurrent connection notifications per server.
	notifications: Arc<Semaphore>,
}

impl SubscriptionServer {
	pub fn new(
		resolver: Arc<dyn RouteResolver>,
		listener: Arc<dyn EventListener>,
		max_concurrent_notifications: usize,
	) -> Arc<Self> {
		Arc::new_cyclic(|this| Self {
			id: ReceiverId::next(),
			this: this.clone(),
			resolver,
			listener,
			receivers: Mutex::new(HashMap::new()),
			notifications: Arc::new(Semaphore::new(max_concurrent_notifications.max(1))),
		})
	}

	/// Registers interest of `connection` in `event`.
	pub fn add_receiver(&self, client: Weak<dyn SubscriptionClient>, connection: ConnectionId, event: &EventName) {
		let mut receivers = self.receivers.lock();
		if !receivers.contains_key(event) {
			if let Some(this) = self.this.upgrade() {
				self.listener.add_receiver(event, this);
			}
			debug!(event = %event, "listening for event");
		}
		receivers.entry(event.clone()).or_default().insert(connection, client);
		trace!(%connection, event = %event, "receiver added");
	}

	/// Withdraws interest of `connection` in `event`.
	pub fn remove_receiver(&self, connection: ConnectionId, event: &EventName) {
		let mut receivers = self.receivers.lock();
		let Some(entry) = receivers.get_mut(event) else {
			return;
		};
		if entry.remove(&connection).is_none() {
			return;
		}
		trace!(%connection, event = %event, "receiver removed");
		if entry.is_empty() {
			receivers.remove(event);
			self.listener.remove_receiver(event, self.id);
			debug!(event = %event, "stopped listening for event");
		}
	}

	/// Withdraws interest of `connection` in every event.
	pub fn remove_connection(&self, connection: ConnectionId) {
		let mut receivers = self.receivers.lock();
		let mut emptied = Vec::new();
		for (event, entry) in receivers.iter_mut() {
			if entry.remove(&connection).is_some() && entry.is_empty() {
				emptied.push(event.clone());
			}
		}
		for event in emptied {
			receivers.remove(&event);
			self.listener.remove_receiver(&event, self.id);
			debug!(event = %event, "stopped listening for event");
		}
	}

	/// Number of connections interested in `event`.
	pub fn receiver_count(&self, event: &EventName) -> usize {
		self.receivers.lock().get(event).map_or(0, HashMap::len)
	}

	pub fn event_names(&self) -> Vec<EventName> {
		let mut names: Vec<_> = self.receivers.lock().keys().cloned().collect();
		names.sort();
		names
	}

	/// Live clients interested in `event`.
	fn snapshot(&self, event: &EventName) -> Vec<Arc<dyn SubscriptionClient>> {
		self.receivers
			.lock()
			.get(event)
			.map(|entry| entry.values().filter_map(Weak::upgrade).collect())
			.unwrap_or_default()
	}

	/// Fans `event` out to every interested connection and returns how many
	/// were notified.
	///
	/// At most `max_concurrent_notifications` connections are notified at
	/// once. All notifications run to completion; failures are reported
	/// together afterwards.
	pub async fn publish(&self, event: Arc<SubscriptionEvent>, cancel: CancellationToken) -> Result<usize> {
		let clients = self.snapshot(&event.event_name);
		if clients.is_empty() {
			return Ok(0);
		}
		if self.resolver.resolve_route(&event.event_name).is_none() {
			debug!(event = %event.event_name, "no route for event");
			return Ok(0);
		}

		let mut tasks = JoinSet::new();
		for client in clients {
			let permit = self
				.notifications
				.clone()
				.acquire_owned()
				.await
				.map_err(|_| Error::execution("notification limiter closed"))?;
			let event = event.clone();
			let cancel = cancel.clone();
			tasks.spawn(async move {
				let _permit = permit;
				client.receive_event(&event.event_name, &event.data, cancel).await
			});
		}

		let mut dispatched = 0;
		let mut notified = 0;
		let mut failures = Vec::new();
		while let Some(joined) = tasks.join_next().await {
			dispatched += 1;
			match joined {
				Ok(Ok(_)) => notified += 1,
				Ok(Err(err)) => failures.push(err),
				Err(err) => failures.push(Error::execution(format!("notification task failed: {}", err))),
			}
		}

		match Error::aggregate(dispatched, failures) {
			Some(err) => {
				warn!(event = %event.event_name, notified, error = %err, "event fan-out failed");
				Err(err)
			}
			None => {
				trace!(event = %event.event_name, notified, "event fanned out");
				Ok(notified)
			}
		}
	}
}

impl ConnectionObserver for SubscriptionServer {
	fn route_added(&self, client: Weak<dyn SubscriptionClient>, connection: ConnectionId, event: &EventName) {
		self.add_receiver(client, connection, event);
	}

	fn route_removed(&self, connection: ConnectionId, event: &EventName) {
		self.remove_receiver(connection, event);
	}

	fn connection_closed(&self, connection: ConnectionId) {
		self.remove_connection(connection);
	}
}

#[async_trait]
impl EventReceiver for SubscriptionServer {
	fn receiver_id(&self) -> ReceiverId {
		self.id
	}

	async fn receive_event(&self, event: Arc<SubscriptionEvent>, cancel: CancellationToken) -> Result<usize> {
		self.publish(event, cancel).await
	}
}

impl Drop for SubscriptionServer {
	fn drop(&mut self) {
		self.listener.remove_all(self.id);
	}
}
