// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! An [`EventListener`] that records every registration.

use std::{collections::HashMap, sync::Arc};

use graphsub_core::{EventListener, EventName, EventReceiver, ReceiverId, Result, SubscriptionEvent};
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerCall {
	Add(EventName, ReceiverId),
	Remove(EventName, ReceiverId),
	RemoveAll(ReceiverId),
}

#[derive(Default)]
pub struct RecordingListener {
	calls: Mutex<Vec<ListenerCall>>,
	receivers: Mutex<HashMap<EventName, Vec<Arc<dyn EventReceiver>>>>,
}

impl RecordingListener {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn calls(&self) -> Vec<ListenerCall> {
		self.calls.lock().clone()
	}

	pub fn clear_calls(&self) {
		self.calls.lock().clear();
	}

	pub fn add_count(&self, event: &EventName) -> usize {
		self.calls.lock().iter().filter(|call| matches!(call, ListenerCall::Add(name, _) if name == event)).count()
	}

	pub fn remove_count(&self, event: &EventName) -> usize {
		self.calls.lock().iter().filter(|call| matches!(call, ListenerCall::Remove(name, _) if name == event)).count()
	}

	pub fn is_listening(&self, event: &EventName) -> bool {
		self.receivers.lock().get(event).is_some_and(|receivers| !receivers.is_empty())
	}

	/// Delivers an event to the registered receivers, one after the other,
	/// and sums what they report.
	pub async fn deliver(&self, event: impl Into<EventName>, data: Value) -> Result<usize> {
		let event = Arc::new(SubscriptionEvent::new(event, data));
		let receivers = self.receivers.lock().get(&event.event_name).cloned().unwrap_or_default();

		let mut total = 0;
		for receiver in receivers {
			total += receiver.receive_event(event.clone(), CancellationToken::new()).await?;
		}
		Ok(total)
	}
}

impl EventListener for RecordingListener {
	fn add_receiver(&self, event: &EventName, receiver: Arc<dyn EventReceiver>) {
		self.calls.lock().push(ListenerCall::Add(event.clone(), receiver.receiver_id()));
		self.receivers.lock().entry(event.clone()).or_default().push(receiver);
	}

	fn remove_receiver(&self, event: &EventName, receiver: ReceiverId) {
		self.calls.lock().push(ListenerCall::Remove(event.clone(), receiver));
		let mut receivers = self.receivers.lock();
		if let Some(entry) = receivers.get_mut(event) {
			entry.retain(|r| r.receiver_id() != receiver);
			if entry.is_empty() {
				receivers.remove(event);
			}
		}
	}

	fn remove_all(&self, receiver: ReceiverId) {
		self.calls.lock().push(ListenerCall::RemoveAll(receiver));
		self.receivers.lock().retain(|_, entry| {
			entry.retain(|r| r.receiver_id() != receiver);
			!entry.is_empty()
		});
	}
}
