// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
	Query,
	Mutation,
	Subscription,
}

impl OperationType {
	pub fn type_name(&self) -> &'static str {
		match self {
			OperationType::Query => "Query",
			OperationType::Mutation => "Mutation",
			OperationType::Subscription => "Subscription",
		}
	}
}

impl fmt::Display for OperationType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.type_name())
	}
}

/// Canonical path of a schema field, e.g. `Subscription.onThing`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRoute {
	operation: OperationType,
	path: Vec<String>,
}

impl FieldRoute {
	pub fn new(operation: OperationType, path: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			operation,
			path: path.into_iter().map(Into::into).collect(),
		}
	}

	pub fn subscription(field: impl Into<String>) -> Self {
		Self::new(OperationType::Subscription, [field.into()])
	}

	pub fn operation(&self) -> OperationType {
		self.operation
	}

	pub fn path(&self) -> &[String] {
		&self.path
	}

	/// Name of the last segment of the route, the field that receives the
	/// event payload.
	pub fn field(&self) -> Option<&str> {
		self.path.last().map(String::as_str)
	}

	pub fn event_name(&self) -> EventName {
		EventName::from(self)
	}
}

impl fmt::Display for FieldRoute {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.operation.type_name())?;
		for segment in &self.path {
			write!(f, ".{}", segment)?;
		}
		Ok(())
	}
}

impl FromStr for FieldRoute {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut parts = s.split('.');
		let operation = match parts.next() {
			Some("Query") => OperationType::Query,
			Some("Mutation") => OperationType::Mutation,
			Some("Subscription") => OperationType::Subscription,
			_ => return Err(format!("invalid route '{}'", s)),
		};
		let path: Vec<String> = parts.map(str::to_string).collect();
		if path.is_empty() || path.iter().any(String::is_empty) {
			return Err(format!("invalid route '{}'", s));
		}
		Ok(Self {
			operation,
			path,
		})
	}
}

/// Normalized fan-out key derived from a [`FieldRoute`].
///
/// Names compare case-insensitively: they are lower-cased on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventName(String);

impl EventName {
	pub fn new(name: impl AsRef<str>) -> Self {
		Self(name.as_ref().trim().to_ascii_lowercase())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl From<&FieldRoute> for EventName {
	fn from(route: &FieldRoute) -> Self {
		Self::new(route.to_string())
	}
}

impl From<&str> for EventName {
	fn from(name: &str) -> Self {
		Self::new(name)
	}
}

impl From<String> for EventName {
	fn from(name: String) -> Self {
		Self::new(name)
	}
}

impl fmt::Display for EventName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_route_display() {
		let route = FieldRoute::subscription("onThing");
		assert_eq!(route.to_string(), "Subscription.onThing");
		assert_eq!(route.field(), Some("onThing"));
	}

	#[test]
	fn test_route_parse() {
		let route: FieldRoute = "Subscription.onThing".parse().unwrap();
		assert_eq!(route, FieldRoute::subscription("onThing"));

		assert!("Other.onThing".parse::<FieldRoute>().is_err());
		assert!("Subscription".parse::<FieldRoute>().is_err());
		assert!("Subscription..x".parse::<FieldRoute>().is_err());
	}

	#[test]
	fn test_event_name_is_normalized() {
		let route = FieldRoute::subscription("onThing");
		assert_eq!(route.event_name(), EventName::new(" SUBSCRIPTION.ONTHING "));
		assert_eq!(route.event_name().as_str(), "subscription.onthing");
	}
}
