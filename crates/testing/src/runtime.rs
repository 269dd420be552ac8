// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! A minimal [`QueryRuntime`] that projects top-level fields.
//!
//! Queries select fields from a static map of values. A subscription selects
//! a single field and receives the published event payload under that field.
//! Documents are parsed with the async-graphql parser; nested selections and
//! arguments are accepted but ignored.

use std::{
	collections::{HashMap, HashSet},
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use async_graphql::parser::{
	parse_query,
	types::{OperationType as ParsedOperationType, Selection as ParsedSelection},
};
use async_trait::async_trait;
use graphsub_core::{
	Error, EventName, ExecutionContext, ExecutionMetadata, ExecutionOutcome, ExecutionResult, FieldRoute,
	GraphQLError, OperationType, QueryRuntime, Result, RouteResolver, SubscriptionPlan,
};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// Decides what happens with an event delivered to a subscription.
pub type EventHook = Arc<dyn Fn(&FieldRoute, &Value) -> Result<ExecutionMetadata> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
	pub alias: Option<String>,
	pub name: String,
}

impl Selection {
	/// Key of the field in the response.
	pub fn key(&self) -> &str {
		self.alias.as_deref().unwrap_or(&self.name)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionPlan {
	pub operation: OperationType,
	pub selections: Vec<Selection>,
}

#[derive(Default)]
pub struct ProjectionRuntime {
	queries: HashMap<String, Value>,
	subscriptions: HashSet<String>,
	failing: HashSet<String>,
	on_event: Option<EventHook>,
	delay: Option<Duration>,
	executions: AtomicUsize,
}

impl ProjectionRuntime {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn query_field(mut self, name: impl Into<String>, value: Value) -> Self {
		self.queries.insert(name.into(), value);
		self
	}

	pub fn subscription_field(mut self, name: impl Into<String>) -> Self {
		self.subscriptions.insert(name.into());
		self
	}

	/// Executions touching `field` fail with an execution error.
	pub fn failing_field(mut self, name: impl Into<String>) -> Self {
		self.failing.insert(name.into());
		self
	}

	pub fn on_event<F>(mut self, hook: F) -> Self
	where
		F: Fn(&FieldRoute, &Value) -> Result<ExecutionMetadata> + Send + Sync + 'static,
	{
		self.on_event = Some(Arc::new(hook));
		self
	}

	/// Every execution waits `delay` before producing a result.
	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);
		self
	}

	/// Executions started so far, including event executions.
	pub fn execution_count(&self) -> usize {
		self.executions.load(Ordering::SeqCst)
	}

	fn check_failures(&self, selections: &[Selection]) -> Result<()> {
		match selections.iter().find(|s| self.failing.contains(&s.name)) {
			Some(selection) => Err(Error::execution(format!("resolving '{}' failed", selection.name))),
			None => Ok(()),
		}
	}

	fn execute_request(&self, plan: ProjectionPlan) -> ExecutionOutcome<ProjectionPlan> {
		match plan.operation {
			OperationType::Query => self.project_query(&plan.selections),
			OperationType::Mutation => ExecutionOutcome::result(ExecutionResult::errors(vec![GraphQLError::new(
				"Schema is not configured for mutations.",
			)])),
			OperationType::Subscription => self.plan_subscription(plan),
		}
	}

	fn project_query(&self, selections: &[Selection]) -> ExecutionOutcome<ProjectionPlan> {
		let mut data = Map::new();
		let mut errors = Vec::new();
		for selection in selections {
			match (selection.name.as_str(), self.queries.get(&selection.name)) {
				("__typename", _) => {
					data.insert(selection.key().to_string(), Value::from("Query"));
				}
				(_, Some(value)) => {
					data.insert(selection.key().to_string(), value.clone());
				}
				(name, None) => errors.push(unknown_field(name, OperationType::Query)),
			}
		}

		if errors.is_empty() {
			ExecutionOutcome::result(ExecutionResult::data(Value::Object(data)))
		} else {
			ExecutionOutcome::result(ExecutionResult::errors(errors))
		}
	}

	fn plan_subscription(&self, plan: ProjectionPlan) -> ExecutionOutcome<ProjectionPlan> {
		let Some(first) = plan.selections.first() else {
			return ExecutionOutcome::result(ExecutionResult::errors(vec![GraphQLError::new(
				"Subscription must select a field.",
			)]));
		};
		let route = FieldRoute::subscription(first.name.clone());

		let mut messages = Vec::new();
		if plan.selections.len() > 1 {
			messages.push(GraphQLError::new("Subscription must select only one top level field."));
		}
		if !self.subscriptions.contains(&first.name) {
			messages.push(unknown_field(&first.name, OperationType::Subscription));
		}

		let subscription = if messages.is_empty() {
			SubscriptionPlan::valid(route, plan)
		} else {
			SubscriptionPlan::invalid(route, plan, messages)
		};
		ExecutionOutcome::subscription(subscription)
	}

	fn project_event(
		&self,
		plan: &ProjectionPlan,
		route: &FieldRoute,
		data: Value,
	) -> Result<ExecutionOutcome<ProjectionPlan>> {
		let metadata = match &self.on_event {
			Some(hook) => hook(route, &data)?,
			None => ExecutionMetadata::default(),
		};

		let mut projected = Map::new();
		if let Some(selection) = plan.selections.first() {
			projected.insert(selection.key().to_string(), data);
		}
		Ok(ExecutionOutcome::result(ExecutionResult::data(Value::Object(projected))).with_metadata(metadata))
	}
}

impl RouteResolver for ProjectionRuntime {
	fn resolve_route(&self, event: &EventName) -> Option<FieldRoute> {
		self.subscriptions.iter().map(FieldRoute::subscription).find(|route| &route.event_name() == event)
	}
}

#[async_trait]
impl QueryRuntime for ProjectionRuntime {
	type Plan = ProjectionPlan;

	async fn execute(
		&self,
		context: ExecutionContext<ProjectionPlan>,
		cancel: CancellationToken,
	) -> Result<ExecutionOutcome<ProjectionPlan>> {
		self.executions.fetch_add(1, Ordering::SeqCst);

		if let Some(delay) = self.delay {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(Error::execution("execution cancelled")),
				_ = tokio::time::sleep(delay) => {}
			}
		}

		if let (Some(plan), Some(source)) = (context.plan, context.source) {
			self.check_failures(&plan.selections)?;
			return self.project_event(&plan, &source.route, source.data);
		}

		let plan = match parse(&context.request.payload.query) {
			Ok(plan) => plan,
			Err(message) => {
				return Ok(ExecutionOutcome::result(ExecutionResult::errors(vec![GraphQLError::new(message)])));
			}
		};
		self.check_failures(&plan.selections)?;
		Ok(self.execute_request(plan))
	}
}

fn unknown_field(name: &str, operation: OperationType) -> GraphQLError {
	GraphQLError::new(format!("Cannot query field \"{}\" on type \"{}\".", name, operation))
}

/// Parses the operation type and its top-level field selections.
///
/// The first operation of the document is used. Fragments at the top level
/// are ignored.
pub fn parse(query: &str) -> std::result::Result<ProjectionPlan, String> {
	let document = parse_query(query).map_err(|err| err.to_string())?;
	let Some((_, operation)) = document.operations.iter().next() else {
		return Err("Document does not contain an operation.".to_string());
	};

	let operation_type = match operation.node.ty {
		ParsedOperationType::Query => OperationType::Query,
		ParsedOperationType::Mutation => OperationType::Mutation,
		ParsedOperationType::Subscription => OperationType::Subscription,
	};
	let selections = operation
		.node
		.selection_set
		.node
		.items
		.iter()
		.filter_map(|item| match &item.node {
			ParsedSelection::Field(field) => Some(Selection {
				alias: field.node.alias.as_ref().map(|alias| alias.node.to_string()),
				name: field.node.name.node.to_string(),
			}),
			ParsedSelection::FragmentSpread(_) | ParsedSelection::InlineFragment(_) => None,
		})
		.collect();

	Ok(ProjectionPlan {
		operation: operation_type,
		selections,
	})
}
