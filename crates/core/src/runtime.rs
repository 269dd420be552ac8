// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! The query runtime contract.
//!
//! A runtime is handed a request once when a client starts an operation. If
//! the operation is a subscription, the runtime returns a [`SubscriptionPlan`]
//! whose plan is kept by the connection and handed back on every event, so the
//! query is parsed and validated exactly once.

use std::sync::Arc;

use async_trait::async_trait;
use graphsub_type::{ConnectionId, EventName, FieldRoute, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::payload::{ExecutionResult, GraphQLError, GraphQLPayload};

/// Maps a published event name back to the schema field it targets.
pub trait RouteResolver: Send + Sync {
	fn resolve_route(&self, event: &EventName) -> Option<FieldRoute>;
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
	pub payload: GraphQLPayload,
	pub connection: Option<ConnectionId>,
}

impl QueryRequest {
	pub fn new(payload: GraphQLPayload) -> Self {
		Self {
			payload,
			connection: None,
		}
	}

	pub fn with_connection(mut self, connection: ConnectionId) -> Self {
		self.connection = Some(connection);
		self
	}
}

/// Published data bound as the input of the subscribed field.
#[derive(Debug, Clone)]
pub struct EventSource {
	pub route: FieldRoute,
	pub data: Value,
}

#[derive(Debug)]
pub struct ExecutionContext<P> {
	pub request: QueryRequest,
	/// Plan produced by the initial execution of a subscription. `None` on the
	/// first execution.
	pub plan: Option<Arc<P>>,
	pub source: Option<EventSource>,
}

impl<P> ExecutionContext<P> {
	pub fn request(request: QueryRequest) -> Self {
		Self {
			request,
			plan: None,
			source: None,
		}
	}

	pub fn event(request: QueryRequest, plan: Arc<P>, source: EventSource) -> Self {
		Self {
			request,
			plan: Some(plan),
			source: Some(source),
		}
	}
}

/// Flags a resolver may raise while handling an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionMetadata {
	/// Do not deliver the result of this execution.
	pub skip_event: bool,
	/// End the subscription after this execution.
	pub complete_subscription: bool,
}

#[derive(Debug)]
pub struct SubscriptionPlan<P> {
	pub route: FieldRoute,
	pub plan: Arc<P>,
	pub is_valid: bool,
	pub messages: Vec<GraphQLError>,
}

impl<P> SubscriptionPlan<P> {
	pub fn valid(route: FieldRoute, plan: P) -> Self {
		Self {
			route,
			plan: Arc::new(plan),
			is_valid: true,
			messages: Vec::new(),
		}
	}

	pub fn invalid(route: FieldRoute, plan: P, messages: Vec<GraphQLError>) -> Self {
		Self {
			route,
			plan: Arc::new(plan),
			is_valid: false,
			messages,
		}
	}
}

#[derive(Debug)]
pub struct ExecutionOutcome<P> {
	pub result: ExecutionResult,
	/// Present when the executed operation was a subscription.
	pub subscription: Option<SubscriptionPlan<P>>,
	pub metadata: ExecutionMetadata,
}

impl<P> ExecutionOutcome<P> {
	pub fn result(result: ExecutionResult) -> Self {
		Self {
			result,
			subscription: None,
			metadata: ExecutionMetadata::default(),
		}
	}

	pub fn subscription(plan: SubscriptionPlan<P>) -> Self {
		Self {
			result: ExecutionResult::default(),
			subscription: Some(plan),
			metadata: ExecutionMetadata::default(),
		}
	}

	pub fn with_metadata(mut self, metadata: ExecutionMetadata) -> Self {
		self.metadata = metadata;
		self
	}
}

#[async_trait]
pub trait QueryRuntime: RouteResolver + 'static {
	/// Pre-resolved operation kept for the life of a subscription.
	type Plan: Send + Sync + 'static;

	fn create_request(&self, payload: GraphQLPayload) -> QueryRequest {
		QueryRequest::new(payload)
	}

	async fn execute(
		&self,
		context: ExecutionContext<Self::Plan>,
		cancel: CancellationToken,
	) -> Result<ExecutionOutcome<Self::Plan>>;
}
