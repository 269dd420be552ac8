// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{
	any::Any,
	sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use graphsub_sub_api::{HealthStatus, Subsystem};
use graphsub_type::{Error, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{TracingBuilder, TracingFormat};

/// Set once a global subscriber has been installed by any instance.
static INSTALLED: AtomicBool = AtomicBool::new(false);

pub struct TracingSubsystem {
	config: TracingBuilder,
	running: bool,
}

impl TracingSubsystem {
	pub(crate) fn new(config: TracingBuilder) -> Self {
		Self {
			config,
			running: false,
		}
	}

	fn filter(&self) -> Result<EnvFilter> {
		if self.config.use_env {
			if let Ok(filter) = EnvFilter::try_from_default_env() {
				return Ok(filter);
			}
		}
		EnvFilter::try_new(self.config.directives()).map_err(Error::config)
	}

	/// Installs the global subscriber. Returns `false` when one was already
	/// installed, in which case the existing subscriber stays in place.
	fn install(&self) -> Result<bool> {
		let filter = self.filter()?;
		if INSTALLED.swap(true, Ordering::SeqCst) {
			return Ok(false);
		}

		let registry = tracing_subscriber::registry().with(filter);
		let installed = match self.config.format {
			TracingFormat::Compact => {
				registry.with(fmt::layer().compact().with_ansi(self.config.ansi)).try_init()
			}
			TracingFormat::Json => registry.with(fmt::layer().json().with_ansi(false)).try_init(),
		};
		Ok(installed.is_ok())
	}
}

#[async_trait]
impl Subsystem for TracingSubsystem {
	fn name(&self) -> &'static str {
		"Tracing"
	}

	async fn start(&mut self) -> Result<()> {
		if self.running {
			return Ok(());
		}

		if self.install()? {
			tracing::debug!(filter = %self.config.directives(), "tracing subscriber installed");
		} else {
			tracing::debug!("tracing subscriber already installed, keeping it");
		}
		self.running = true;
		Ok(())
	}

	async fn shutdown(&mut self) -> Result<()> {
		// a global subscriber cannot be uninstalled
		self.running = false;
		Ok(())
	}

	fn is_running(&self) -> bool {
		self.running
	}

	fn health_status(&self) -> HealthStatus {
		if self.running {
			HealthStatus::Healthy
		} else {
			HealthStatus::Failed {
				description: "Not running".to_string(),
			}
		}
	}

	fn as_any(&self) -> &dyn Any {
		self
	}

	fn as_any_mut(&mut self) -> &mut dyn Any {
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_start_twice_is_idempotent() {
		let mut first = TracingBuilder::new().with_ansi(false).with_env(false).build();
		first.start().await.unwrap();
		first.start().await.unwrap();
		assert!(first.is_running());
		assert!(first.health_status().is_healthy());

		let mut second = TracingBuilder::new().json().build();
		second.start().await.unwrap();
		assert!(second.is_running());

		second.shutdown().await.unwrap();
		assert!(!second.is_running());
	}

	#[test]
	fn test_invalid_filter_is_config_error() {
		let subsystem = TracingBuilder::new().with_env(false).with_filter("graphsub=verbose").build();
		assert!(matches!(subsystem.filter(), Err(Error::Config(_))));
	}
}
