// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Query text plus variables and operation name as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLPayload {
	pub query: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub variables: Option<Map<String, Value>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub operation_name: Option<String>,
}

impl GraphQLPayload {
	pub fn new(query: impl Into<String>) -> Self {
		Self {
			query: query.into(),
			variables: None,
			operation_name: None,
		}
	}

	pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
		self.variables = Some(variables);
		self
	}

	pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
		self.operation_name = Some(name.into());
		self
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path: Option<Vec<Value>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub extensions: Option<Map<String, Value>>,
}

impl GraphQLError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			path: None,
			extensions: None,
		}
	}

	pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.extensions.get_or_insert_with(Map::new).insert(key.into(), value.into());
		self
	}
}

/// `data` and `errors` of one execution, shaped as the GraphQL response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub errors: Vec<GraphQLError>,
}

impl ExecutionResult {
	pub fn data(data: Value) -> Self {
		Self {
			data: Some(data),
			errors: Vec::new(),
		}
	}

	pub fn errors(errors: Vec<GraphQLError>) -> Self {
		Self {
			data: None,
			errors,
		}
	}

	pub fn has_errors(&self) -> bool {
		!self.errors.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn test_payload_uses_camel_case() {
		let payload: GraphQLPayload = serde_json::from_value(json!({
			"query": "subscription { onThing { field } }",
			"operationName": "Things",
			"variables": {"a": 1}
		}))
		.unwrap();

		assert_eq!(payload.operation_name.as_deref(), Some("Things"));
		assert_eq!(payload.variables.unwrap()["a"], json!(1));
	}

	#[test]
	fn test_payload_optional_fields() {
		let payload: GraphQLPayload = serde_json::from_value(json!({"query": "{ a }"})).unwrap();
		assert_eq!(payload, GraphQLPayload::new("{ a }"));
		assert_eq!(serde_json::to_value(&payload).unwrap(), json!({"query": "{ a }"}));
	}

	#[test]
	fn test_result_skips_empty_errors() {
		let result = ExecutionResult::data(json!({"a": 1}));
		assert_eq!(serde_json::to_value(&result).unwrap(), json!({"data": {"a": 1}}));

		let result = ExecutionResult::errors(vec![GraphQLError::new("bad").with_extension("code", "X")]);
		assert_eq!(
			serde_json::to_value(&result).unwrap(),
			json!({"errors": [{"message": "bad", "extensions": {"code": "X"}}]})
		);
	}
}
