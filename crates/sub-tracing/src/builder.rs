// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use tracing::Level;

use crate::TracingSubsystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
	/// Human readable single line output.
	Compact,
	/// One JSON object per event.
	Json,
}

/// Builder for [`TracingSubsystem`].
///
/// # Example
///
/// ```ignore
/// let mut tracing = TracingBuilder::new()
///     .with_level(Level::DEBUG)
///     .with_filter("graphsub=trace,tokio_tungstenite=info")
///     .build();
/// tracing.start().await?;
/// ```
#[derive(Debug, Clone)]
pub struct TracingBuilder {
	pub(crate) level: Level,
	pub(crate) filter: Option<String>,
	pub(crate) format: TracingFormat,
	pub(crate) ansi: bool,
	pub(crate) use_env: bool,
}

impl Default for TracingBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl TracingBuilder {
	pub fn new() -> Self {
		Self {
			level: Level::INFO,
			filter: None,
			format: TracingFormat::Compact,
			ansi: true,
			use_env: true,
		}
	}

	pub fn with_level(mut self, level: Level) -> Self {
		self.level = level;
		self
	}

	/// `EnvFilter` directives, taking precedence over the level.
	pub fn with_filter(mut self, directives: impl Into<String>) -> Self {
		self.filter = Some(directives.into());
		self
	}

	pub fn with_format(mut self, format: TracingFormat) -> Self {
		self.format = format;
		self
	}

	pub fn json(self) -> Self {
		self.with_format(TracingFormat::Json)
	}

	pub fn with_ansi(mut self, ansi: bool) -> Self {
		self.ansi = ansi;
		self
	}

	/// Whether `RUST_LOG` overrides the configured level and filter.
	pub fn with_env(mut self, use_env: bool) -> Self {
		self.use_env = use_env;
		self
	}

	pub(crate) fn directives(&self) -> String {
		match &self.filter {
			Some(filter) => filter.clone(),
			None => self.level.to_string().to_lowercase(),
		}
	}

	pub fn build(self) -> TracingSubsystem {
		TracingSubsystem::new(self)
	}
}
