// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::Weak;

use async_trait::async_trait;
use graphsub_core::{ConnectionId, EventName, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// A connection as seen by the server wide registry.
#[async_trait]
pub trait SubscriptionClient: Send + Sync {
	fn connection_id(&self) -> ConnectionId;

	/// Delivers a published event to every matching subscription of this
	/// client and returns the number of messages sent.
	async fn receive_event(&self, event: &EventName, data: &Value, cancel: CancellationToken) -> Result<usize>;
}

/// Lifecycle notifications of one connection.
///
/// Registered when the connection is created and dropped when it has been
/// torn down, so each connection notifies at most one owner.
pub trait ConnectionObserver: Send + Sync {
	/// The first subscription for `event` was added on the connection.
	fn route_added(&self, client: Weak<dyn SubscriptionClient>, connection: ConnectionId, event: &EventName);

	/// The last subscription for `event` was removed from the connection.
	fn route_removed(&self, connection: ConnectionId, event: &EventName);

	/// The connection released its resources.
	fn connection_closed(&self, connection: ConnectionId);
}
