// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Bounded publish queue in front of an [`InProcessEventSource`].
//!
//! Producers enqueue events without waiting for delivery. A background task
//! drains the queue in order and logs delivery faults.

use std::sync::Arc;

use graphsub_core::{Error, EventName, Result, SubscriptionEvent};
use serde_json::Value;
use tokio::{
	sync::mpsc::{self, error::TrySendError},
	task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::source::InProcessEventSource;

#[derive(Clone)]
pub struct EventPublisher {
	queue: mpsc::Sender<SubscriptionEvent>,
}

impl EventPublisher {
	/// Spawns the drain task. It stops when `cancel` fires or every
	/// publisher handle has been dropped.
	pub fn spawn(
		source: Arc<InProcessEventSource>,
		capacity: usize,
		cancel: CancellationToken,
	) -> (Self, JoinHandle<()>) {
		let (queue, receiver) = mpsc::channel(capacity.max(1));
		let handle = tokio::spawn(drain(source, receiver, cancel));
		(
			Self {
				queue,
			},
			handle,
		)
	}

	/// Enqueues an event, waiting while the queue is full.
	pub async fn publish(&self, event: impl Into<EventName>, data: Value) -> Result<()> {
		self.queue
			.send(SubscriptionEvent::new(event, data))
			.await
			.map_err(|_| Error::execution("event publisher is closed"))
	}

	/// Enqueues an event if there is room.
	pub fn try_publish(&self, event: impl Into<EventName>, data: Value) -> Result<()> {
		self.queue.try_send(SubscriptionEvent::new(event, data)).map_err(|err| match err {
			TrySendError::Full(event) => {
				Error::execution(format!("event queue is full, dropped {}", event.event_name))
			}
			TrySendError::Closed(_) => Error::execution("event publisher is closed"),
		})
	}

	pub fn is_closed(&self) -> bool {
		self.queue.is_closed()
	}
}

#[instrument(name = "publisher", level = "debug", skip_all)]
async fn drain(
	source: Arc<InProcessEventSource>,
	mut receiver: mpsc::Receiver<SubscriptionEvent>,
	cancel: CancellationToken,
) {
	loop {
		let event = tokio::select! {
			biased;
			_ = cancel.cancelled() => break,
			event = receiver.recv() => match event {
				Some(event) => event,
				None => break,
			},
		};

		let id = event.id;
		let name = event.event_name.clone();
		match source.publish(event, cancel.child_token()).await {
			Ok(notified) => trace!(event = %name, %id, notified, "event delivered"),
			Err(err) => warn!(event = %name, %id, error = %err, "event delivery failed"),
		}
	}
	debug!("publisher stopped");
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use async_trait::async_trait;
	use graphsub_core::{EventListener, EventReceiver, ReceiverId};
	use serde_json::json;

	use super::*;

	struct Recorder {
		id: ReceiverId,
		seen: parking_lot::Mutex<Vec<Value>>,
		calls: AtomicUsize,
	}

	#[async_trait]
	impl EventReceiver for Recorder {
		fn receiver_id(&self) -> ReceiverId {
			self.id
		}

		async fn receive_event(&self, event: Arc<SubscriptionEvent>, _cancel: CancellationToken) -> Result<usize> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.seen.lock().push(event.data.clone());
			Ok(1)
		}
	}

	#[tokio::test]
	async fn test_events_are_delivered_in_order() {
		let source = Arc::new(InProcessEventSource::new());
		let recorder = Arc::new(Recorder {
			id: ReceiverId::next(),
			seen: parking_lot::Mutex::new(Vec::new()),
			calls: AtomicUsize::new(0),
		});
		source.add_receiver(&EventName::new("tick"), recorder.clone());

		let (publisher, handle) = EventPublisher::spawn(source, 4, CancellationToken::new());
		for i in 0..10 {
			publisher.publish("tick", json!(i)).await.unwrap();
		}
		publisher.publish("tock", json!("ignored")).await.unwrap();
		drop(publisher);
		handle.await.unwrap();

		let seen = recorder.seen.lock().clone();
		assert_eq!(seen, (0..10).map(|i| json!(i)).collect::<Vec<_>>());
		assert_eq!(recorder.calls.load(Ordering::SeqCst), 10);
	}

	#[tokio::test]
	async fn test_publish_after_cancel_fails() {
		let cancel = CancellationToken::new();
		let (publisher, handle) =
			EventPublisher::spawn(Arc::new(InProcessEventSource::new()), 1, cancel.clone());
		cancel.cancel();
		handle.await.unwrap();

		assert!(publisher.is_closed());
		assert!(publisher.publish("tick", json!(1)).await.is_err());
		assert!(publisher.try_publish("tick", json!(1)).is_err());
	}
}
