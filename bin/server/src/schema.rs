// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! The demo schema, executed by async-graphql.
//!
//! A subscription is validated once when it starts. Every published event is
//! then bound to the request as context data and the subscription stream is
//! asked for one response.

use std::{future::Future, pin::pin};

use async_graphql::{
	Context, EmptyMutation, Object, Request, Response, Schema, SimpleObject, Subscription, Variables,
	parser::{
		parse_query,
		types::{ExecutableDocument, OperationType, Selection},
	},
};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt, stream};
use graphsub_core::{
	EventName, ExecutionContext, ExecutionMetadata, ExecutionOutcome, ExecutionResult, FieldRoute, GraphQLError,
	GraphQLPayload, QueryRuntime, RouteResolver, SubscriptionPlan,
};
use graphsub_type::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::trace;

pub const ON_TICK: &str = "Subscription.onTick";

/// Subscription fields events are published for.
const SUBSCRIPTION_FIELDS: &[&str] = &["onTick"];

pub type DemoSchema = Schema<QueryRoot, EmptyMutation, SubscriptionRoot>;

pub struct QueryRoot;

#[Object]
impl QueryRoot {
	async fn hello(&self) -> &'static str {
		"world"
	}

	/// Version of the running server.
	async fn version(&self) -> &'static str {
		env!("CARGO_PKG_VERSION")
	}
}

#[derive(Debug, Clone, SimpleObject, Deserialize)]
pub struct Tick {
	pub tick: u64,
}

/// Data of the event being delivered.
struct Published(Value);

pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
	/// One tick per published event.
	async fn on_tick(&self, ctx: &Context<'_>) -> impl Stream<Item = Tick> {
		let tick: Option<Tick> =
			ctx.data_opt::<Published>().and_then(|published| serde_json::from_value(published.0.clone()).ok());
		stream::iter(tick)
	}
}

/// The subscribed field, kept for the life of a subscription.
#[derive(Debug)]
pub struct SchemaPlan {
	field: String,
}

pub struct SchemaRuntime {
	schema: DemoSchema,
}

impl Default for SchemaRuntime {
	fn default() -> Self {
		Self::new()
	}
}

impl SchemaRuntime {
	pub fn new() -> Self {
		Self {
			schema: Schema::build(QueryRoot, EmptyMutation, SubscriptionRoot).finish(),
		}
	}

	async fn plan_subscription(&self, request: Request, field: String) -> Result<ExecutionOutcome<SchemaPlan>> {
		let route = FieldRoute::subscription(field.clone());
		let plan = SchemaPlan {
			field,
		};

		// without event data the stream yields nothing but validation errors
		let mut responses = pin!(self.schema.execute_stream(request));
		let subscription = match responses.next().await {
			Some(response) if !response.errors.is_empty() => {
				SubscriptionPlan::invalid(route, plan, into_result(response)?.errors)
			}
			_ => SubscriptionPlan::valid(route, plan),
		};
		Ok(ExecutionOutcome::subscription(subscription))
	}

	async fn deliver(&self, request: Request, plan: &SchemaPlan, data: Value) -> Result<ExecutionOutcome<SchemaPlan>> {
		let mut responses = pin!(self.schema.execute_stream(request.data(Published(data))));
		match responses.next().await {
			Some(response) => Ok(ExecutionOutcome::result(into_result(response)?)),
			None => {
				trace!(field = %plan.field, "event produced no response");
				Ok(ExecutionOutcome::result(ExecutionResult::default()).with_metadata(ExecutionMetadata {
					skip_event: true,
					complete_subscription: false,
				}))
			}
		}
	}
}

impl RouteResolver for SchemaRuntime {
	fn resolve_route(&self, event: &EventName) -> Option<FieldRoute> {
		SUBSCRIPTION_FIELDS.iter().map(|field| FieldRoute::subscription(*field)).find(|route| &route.event_name() == event)
	}
}

#[async_trait]
impl QueryRuntime for SchemaRuntime {
	type Plan = SchemaPlan;

	async fn execute(
		&self,
		context: ExecutionContext<SchemaPlan>,
		cancel: CancellationToken,
	) -> Result<ExecutionOutcome<SchemaPlan>> {
		let payload = &context.request.payload;
		let request = build_request(payload);

		if let (Some(plan), Some(source)) = (context.plan, context.source) {
			return cancellable(&cancel, self.deliver(request, &plan, source.data)).await?;
		}

		let document = match parse_query(&payload.query) {
			Ok(document) => document,
			Err(err) => {
				return Ok(ExecutionOutcome::result(ExecutionResult::errors(vec![GraphQLError::new(
					err.to_string(),
				)])));
			}
		};

		match subscription_field(&document, payload.operation_name.as_deref()) {
			Some(field) => cancellable(&cancel, self.plan_subscription(request, field)).await?,
			None => {
				let response = cancellable(&cancel, self.schema.execute(request)).await?;
				Ok(ExecutionOutcome::result(into_result(response)?))
			}
		}
	}
}

fn build_request(payload: &GraphQLPayload) -> Request {
	let mut request = Request::new(payload.query.clone());
	if let Some(variables) = &payload.variables {
		request = request.variables(Variables::from_json(Value::Object(variables.clone())));
	}
	if let Some(name) = &payload.operation_name {
		request = request.operation_name(name.clone());
	}
	request
}

/// First top-level field of the selected operation if it is a subscription.
fn subscription_field(document: &ExecutableDocument, operation_name: Option<&str>) -> Option<String> {
	let (_, operation) = document
		.operations
		.iter()
		.find(|(name, _)| operation_name.is_none() || name.map(|name| name.as_str()) == operation_name)?;
	if !matches!(operation.node.ty, OperationType::Subscription) {
		return None;
	}
	operation.node.selection_set.node.items.iter().find_map(|item| match &item.node {
		Selection::Field(field) => Some(field.node.name.node.to_string()),
		_ => None,
	})
}

fn into_result(response: Response) -> Result<ExecutionResult> {
	Ok(serde_json::from_value(serde_json::to_value(&response)?)?)
}

async fn cancellable<F: Future>(cancel: &CancellationToken, future: F) -> Result<F::Output> {
	tokio::select! {
		biased;
		_ = cancel.cancelled() => Err(Error::execution("execution cancelled")),
		output = future => Ok(output),
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use graphsub_core::{EventSource, QueryRequest};
	use serde_json::json;

	use super::*;

	fn request(query: &str) -> ExecutionContext<SchemaPlan> {
		ExecutionContext::request(QueryRequest::new(GraphQLPayload::new(query)))
	}

	async fn plan(runtime: &SchemaRuntime, query: &str) -> SubscriptionPlan<SchemaPlan> {
		let outcome = runtime.execute(request(query), CancellationToken::new()).await.unwrap();
		outcome.subscription.unwrap()
	}

	fn event(query: &str, plan: Arc<SchemaPlan>, data: Value) -> ExecutionContext<SchemaPlan> {
		let source = EventSource {
			route: FieldRoute::subscription("onTick"),
			data,
		};
		ExecutionContext::event(QueryRequest::new(GraphQLPayload::new(query)), plan, source)
	}

	#[tokio::test]
	async fn test_query() {
		let runtime = SchemaRuntime::new();
		let outcome = runtime.execute(request("{ hello }"), CancellationToken::new()).await.unwrap();
		assert!(outcome.subscription.is_none());
		assert_eq!(outcome.result.data, Some(json!({"hello": "world"})));
	}

	#[tokio::test]
	async fn test_query_with_unknown_field() {
		let runtime = SchemaRuntime::new();
		let outcome = runtime.execute(request("{ nope }"), CancellationToken::new()).await.unwrap();
		assert!(outcome.result.has_errors());
		assert!(outcome.result.data.is_none());
	}

	#[tokio::test]
	async fn test_syntax_error() {
		let runtime = SchemaRuntime::new();
		let outcome = runtime.execute(request("{ hello"), CancellationToken::new()).await.unwrap();
		assert!(outcome.result.has_errors());
	}

	#[tokio::test]
	async fn test_subscription_is_planned() {
		let runtime = SchemaRuntime::new();
		let plan = plan(&runtime, "subscription { onTick { tick } }").await;
		assert!(plan.is_valid);
		assert_eq!(plan.route, FieldRoute::subscription("onTick"));
	}

	#[tokio::test]
	async fn test_invalid_subscription() {
		let runtime = SchemaRuntime::new();
		let plan = plan(&runtime, "subscription { onTick { nope } }").await;
		assert!(!plan.is_valid);
		assert!(!plan.messages.is_empty());
	}

	#[tokio::test]
	async fn test_event_is_projected() {
		let runtime = SchemaRuntime::new();
		let query = "subscription { onTick { tick } }";
		let plan = plan(&runtime, query).await;

		let outcome = runtime.execute(event(query, plan.plan, json!({"tick": 3})), CancellationToken::new()).await.unwrap();
		assert!(!outcome.metadata.skip_event);
		assert_eq!(outcome.result.data, Some(json!({"onTick": {"tick": 3}})));
	}

	#[tokio::test]
	async fn test_unusable_event_is_skipped() {
		let runtime = SchemaRuntime::new();
		let query = "subscription { onTick { tick } }";
		let plan = plan(&runtime, query).await;

		let outcome = runtime.execute(event(query, plan.plan, json!("noise")), CancellationToken::new()).await.unwrap();
		assert!(outcome.metadata.skip_event);
	}

	#[test]
	fn test_resolve_route() {
		let runtime = SchemaRuntime::new();
		assert_eq!(runtime.resolve_route(&EventName::from(ON_TICK)), Some(FieldRoute::subscription("onTick")));
		assert_eq!(runtime.resolve_route(&EventName::from("Subscription.onOther")), None);
	}
}
