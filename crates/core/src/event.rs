// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Published events and the upstream listener registry.

use std::{
	fmt,
	sync::{
		Arc,
		atomic::{AtomicU64, Ordering},
	},
};

use async_trait::async_trait;
use graphsub_type::{EventName, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
	pub id: Uuid,
	pub event_name: EventName,
	pub data: Value,
}

impl SubscriptionEvent {
	pub fn new(event_name: impl Into<EventName>, data: Value) -> Self {
		Self {
			id: Uuid::new_v4(),
			event_name: event_name.into(),
			data,
		}
	}
}

static NEXT_RECEIVER_ID: AtomicU64 = AtomicU64::new(1);

/// Process unique identity of an [`EventReceiver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReceiverId(u64);

impl ReceiverId {
	pub fn next() -> Self {
		Self(NEXT_RECEIVER_ID.fetch_add(1, Ordering::Relaxed))
	}
}

impl fmt::Display for ReceiverId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "receiver-{}", self.0)
	}
}

/// Something published events are delivered to.
#[async_trait]
pub trait EventReceiver: Send + Sync {
	fn receiver_id(&self) -> ReceiverId;

	/// Returns the number of downstream parties notified.
	async fn receive_event(&self, event: Arc<SubscriptionEvent>, cancel: CancellationToken) -> Result<usize>;
}

/// Upstream event source that receivers register interest with.
pub trait EventListener: Send + Sync {
	fn add_receiver(&self, event: &EventName, receiver: Arc<dyn EventReceiver>);

	fn remove_receiver(&self, event: &EventName, receiver: ReceiverId);

	fn remove_all(&self, receiver: ReceiverId);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_receiver_ids_are_unique() {
		let a = ReceiverId::next();
		let b = ReceiverId::next();
		assert_ne!(a, b);
	}

	#[test]
	fn test_event_name_from_str_is_normalized() {
		let event = SubscriptionEvent::new("Subscription.OnThing", Value::Null);
		assert_eq!(event.event_name.as_str(), "subscription.onthing");
	}
}
