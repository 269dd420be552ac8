// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{any::Any, fmt};

use async_trait::async_trait;
use graphsub_type::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
	Healthy,
	Warning {
		description: String,
	},
	Failed {
		description: String,
	},
}

impl HealthStatus {
	pub fn is_healthy(&self) -> bool {
		matches!(self, HealthStatus::Healthy)
	}

	pub fn is_failed(&self) -> bool {
		matches!(self, HealthStatus::Failed { .. })
	}
}

impl fmt::Display for HealthStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			HealthStatus::Healthy => f.write_str("healthy"),
			HealthStatus::Warning {
				description,
			} => write!(f, "warning: {}", description),
			HealthStatus::Failed {
				description,
			} => write!(f, "failed: {}", description),
		}
	}
}

/// A component with a start/shutdown lifecycle.
///
/// `start` is idempotent: starting a running subsystem succeeds without
/// side effects.
#[async_trait]
pub trait Subsystem: Send + Sync + Any {
	fn name(&self) -> &'static str;

	async fn start(&mut self) -> Result<()>;

	async fn shutdown(&mut self) -> Result<()>;

	fn is_running(&self) -> bool;

	fn health_status(&self) -> HealthStatus;

	fn as_any(&self) -> &dyn Any;

	fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_health_status_display() {
		assert_eq!(HealthStatus::Healthy.to_string(), "healthy");
		let warning = HealthStatus::Warning {
			description: "High connection count: 95/100".to_string(),
		};
		assert_eq!(warning.to_string(), "warning: High connection count: 95/100");
		assert!(!warning.is_healthy());
		assert!(
			HealthStatus::Failed {
				description: "Not running".to_string()
			}
			.is_failed()
		);
	}
}
