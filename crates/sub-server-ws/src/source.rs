// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! In-process upstream event source.

use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::join_all;
use graphsub_core::{Error, EventListener, EventName, EventReceiver, ReceiverId, Result, SubscriptionEvent};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Delivers published events to the receivers registered for their name.
#[derive(Default)]
pub struct InProcessEventSource {
	receivers: DashMap<EventName, Vec<Arc<dyn EventReceiver>>>,
}

impl InProcessEventSource {
	pub fn new() -> Self {
		Self::default()
	}

	/// Delivers `event` to all receivers registered for its name and returns
	/// the sum of what they report as notified.
	pub async fn publish(&self, event: SubscriptionEvent, cancel: CancellationToken) -> Result<usize> {
		// snapshot, the map lock must not be held while receivers run
		let receivers = self.receivers.get(&event.event_name).map(|r| r.value().clone()).unwrap_or_default();
		if receivers.is_empty() {
			trace!(event = %event.event_name, "no receivers for event");
			return Ok(0);
		}

		let event = Arc::new(event);
		let results =
			join_all(receivers.iter().map(|receiver| receiver.receive_event(event.clone(), cancel.clone())))
				.await;

		let attempted = results.len();
		let mut notified = 0;
		let mut failures = Vec::new();
		for result in results {
			match result {
				Ok(count) => notified += count,
				Err(err) => failures.push(err),
			}
		}
		match Error::aggregate(attempted, failures) {
			Some(err) => Err(err),
			None => Ok(notified),
		}
	}

	pub fn has_receivers(&self, event: &EventName) -> bool {
		self.receivers.contains_key(event)
	}

	pub fn receiver_count(&self, event: &EventName) -> usize {
		self.receivers.get(event).map_or(0, |r| r.len())
	}
}

impl EventListener for InProcessEventSource {
	fn add_receiver(&self, event: &EventName, receiver: Arc<dyn EventReceiver>) {
		let mut entry = self.receivers.entry(event.clone()).or_default();
		if !entry.iter().any(|r| r.receiver_id() == receiver.receiver_id()) {
			entry.push(receiver);
		}
	}

	fn remove_receiver(&self, event: &EventName, receiver: ReceiverId) {
		let emptied = match self.receivers.get_mut(event) {
			Some(mut entry) => {
				entry.retain(|r| r.receiver_id() != receiver);
				entry.is_empty()
			}
			None => false,
		};
		if emptied {
			self.receivers.remove_if(event, |_, receivers| receivers.is_empty());
		}
	}

	fn remove_all(&self, receiver: ReceiverId) {
		self.receivers.retain(|_, receivers| {
			receivers.retain(|r| r.receiver_id() != receiver);
			!receivers.is_empty()
		});
	}
}
