// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{env, str::FromStr, time::Duration};

use graphsub_core::{Error, Result};
use graphsub_runtime::duration_from_millis;

use crate::protocol::{GRAPHQL_TRANSPORT_WS, GRAPHQL_WS, codec_for};

pub const ENV_BIND_ADDR: &str = "GRAPHSUB_BIND_ADDR";
pub const ENV_MAX_CONNECTIONS: &str = "GRAPHSUB_MAX_CONNECTIONS";
pub const ENV_KEEP_ALIVE_MS: &str = "GRAPHSUB_KEEP_ALIVE_MS";
pub const ENV_CONNECTION_INIT_TIMEOUT_MS: &str = "GRAPHSUB_CONNECTION_INIT_TIMEOUT_MS";
pub const ENV_MAX_CONCURRENT_NOTIFICATIONS: &str = "GRAPHSUB_MAX_CONCURRENT_NOTIFICATIONS";

/// Configuration of the websocket subscription server.
#[derive(Debug, Clone)]
pub struct WsConfig {
	/// Address and port to bind to.
	///
	/// Default: `0.0.0.0:8091`
	pub bind_addr: String,
	/// Connections accepted concurrently, further connections are dropped.
	///
	/// Default: 1024
	pub max_connections: usize,
	/// Interval between keep-alive messages. `None` disables keep-alive.
	///
	/// Default: 30s
	pub keep_alive_interval: Option<Duration>,
	/// Time a client has to send `connection_init`. `None` waits forever.
	///
	/// Default: 10s
	pub connection_init_timeout: Option<Duration>,
	/// Connections notified concurrently when an event is published.
	///
	/// Default: 50
	pub max_concurrent_notifications: usize,
	/// Supported sub-protocols in order of preference.
	pub protocols: Vec<&'static str>,
	/// Sub-protocol used when the client does not ask for one.
	///
	/// Default: `graphql-ws`
	pub default_protocol: &'static str,
	/// Events buffered by the publisher before `publish` waits.
	///
	/// Default: 1024
	pub publisher_queue_capacity: usize,
	/// How long shutdown waits for connections to close.
	///
	/// Default: 30s
	pub shutdown_grace: Duration,
}

impl Default for WsConfig {
	fn default() -> Self {
		Self {
			bind_addr: "0.0.0.0:8091".to_string(),
			max_connections: 1024,
			keep_alive_interval: Some(Duration::from_secs(30)),
			connection_init_timeout: Some(Duration::from_secs(10)),
			max_concurrent_notifications: 50,
			protocols: vec![GRAPHQL_TRANSPORT_WS, GRAPHQL_WS],
			default_protocol: GRAPHQL_WS,
			publisher_queue_capacity: 1024,
			shutdown_grace: Duration::from_secs(30),
		}
	}
}

impl WsConfig {
	pub fn new() -> Self {
		Self::default()
	}

	/// Defaults overlaid with the `GRAPHSUB_*` environment variables.
	pub fn from_env() -> Result<Self> {
		Self::default().with_overrides(|key| env::var(key).ok())
	}

	/// Applies overrides looked up by environment variable name. Millisecond
	/// values of `0` disable the timer.
	pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(addr) = lookup(ENV_BIND_ADDR) {
			self.bind_addr = addr;
		}
		if let Some(value) = lookup(ENV_MAX_CONNECTIONS) {
			self.max_connections = parse(ENV_MAX_CONNECTIONS, &value)?;
		}
		if let Some(value) = lookup(ENV_KEEP_ALIVE_MS) {
			self.keep_alive_interval = parse_millis(ENV_KEEP_ALIVE_MS, &value)?;
		}
		if let Some(value) = lookup(ENV_CONNECTION_INIT_TIMEOUT_MS) {
			self.connection_init_timeout = parse_millis(ENV_CONNECTION_INIT_TIMEOUT_MS, &value)?;
		}
		if let Some(value) = lookup(ENV_MAX_CONCURRENT_NOTIFICATIONS) {
			self.max_concurrent_notifications = parse(ENV_MAX_CONCURRENT_NOTIFICATIONS, &value)?;
		}
		self.validate()?;
		Ok(self)
	}

	pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
		self.bind_addr = addr.into();
		self
	}

	pub fn max_connections(mut self, max: usize) -> Self {
		self.max_connections = max;
		self
	}

	pub fn keep_alive_interval(mut self, interval: Option<Duration>) -> Self {
		self.keep_alive_interval = interval;
		self
	}

	pub fn connection_init_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.connection_init_timeout = timeout;
		self
	}

	pub fn max_concurrent_notifications(mut self, max: usize) -> Self {
		self.max_concurrent_notifications = max;
		self
	}

	pub fn protocols(mut self, protocols: Vec<&'static str>) -> Self {
		self.protocols = protocols;
		self
	}

	pub fn default_protocol(mut self, protocol: &'static str) -> Self {
		self.default_protocol = protocol;
		self
	}

	pub fn publisher_queue_capacity(mut self, capacity: usize) -> Self {
		self.publisher_queue_capacity = capacity;
		self
	}

	pub fn shutdown_grace(mut self, grace: Duration) -> Self {
		self.shutdown_grace = grace;
		self
	}

	pub fn validate(&self) -> Result<()> {
		if self.max_connections == 0 {
			return Err(Error::config("max_connections must be greater than zero"));
		}
		if self.max_concurrent_notifications == 0 {
			return Err(Error::config("max_concurrent_notifications must be greater than zero"));
		}
		if self.publisher_queue_capacity == 0 {
			return Err(Error::config("publisher_queue_capacity must be greater than zero"));
		}
		if self.keep_alive_interval.is_some_and(|interval| interval.is_zero()) {
			return Err(Error::config("keep_alive_interval must be greater than zero, use None to disable"));
		}
		if self.protocols.is_empty() {
			return Err(Error::config("at least one protocol must be enabled"));
		}
		if let Some(unknown) = self.protocols.iter().find(|p| codec_for(p).is_none()) {
			return Err(Error::config(format!("unsupported protocol '{}'", unknown)));
		}
		if !self.protocols.contains(&self.default_protocol) {
			return Err(Error::config(format!(
				"default protocol '{}' is not enabled",
				self.default_protocol
			)));
		}
		Ok(())
	}
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
	value.trim().parse().map_err(|_| Error::config(format!("{} has an invalid value '{}'", key, value)))
}

fn parse_millis(key: &str, value: &str) -> Result<Option<Duration>> {
	let millis: i64 = parse(key, value)?;
	let duration = duration_from_millis(millis).map_err(|e| Error::config(format!("{}: {}", key, e)))?;
	Ok((!duration.is_zero()).then_some(duration))
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
		move |key| map.get(key).cloned()
	}

	#[test]
	fn test_defaults() {
		let config = WsConfig::default();
		assert_eq!(config.bind_addr, "0.0.0.0:8091");
		assert_eq!(config.max_connections, 1024);
		assert_eq!(config.keep_alive_interval, Some(Duration::from_secs(30)));
		assert_eq!(config.connection_init_timeout, Some(Duration::from_secs(10)));
		assert_eq!(config.max_concurrent_notifications, 50);
		assert_eq!(config.protocols, vec![GRAPHQL_TRANSPORT_WS, GRAPHQL_WS]);
		assert_eq!(config.default_protocol, GRAPHQL_WS);
		config.validate().unwrap();
	}

	#[test]
	fn test_overrides() {
		let config = WsConfig::default()
			.with_overrides(overrides(&[
				(ENV_BIND_ADDR, "127.0.0.1:0"),
				(ENV_MAX_CONNECTIONS, "8"),
				(ENV_KEEP_ALIVE_MS, "1500"),
				(ENV_CONNECTION_INIT_TIMEOUT_MS, "0"),
				(ENV_MAX_CONCURRENT_NOTIFICATIONS, " 4 "),
			]))
			.unwrap();

		assert_eq!(config.bind_addr, "127.0.0.1:0");
		assert_eq!(config.max_connections, 8);
		assert_eq!(config.keep_alive_interval, Some(Duration::from_millis(1500)));
		assert_eq!(config.connection_init_timeout, None);
		assert_eq!(config.max_concurrent_notifications, 4);
	}

	#[test]
	fn test_negative_millis_rejected() {
		let err = WsConfig::default().with_overrides(overrides(&[(ENV_KEEP_ALIVE_MS, "-5")])).unwrap_err();
		assert!(matches!(err, Error::Config(ref m) if m.contains(ENV_KEEP_ALIVE_MS)));
	}

	#[test]
	fn test_garbage_rejected() {
		let err =
			WsConfig::default().with_overrides(overrides(&[(ENV_MAX_CONNECTIONS, "lots")])).unwrap_err();
		assert!(matches!(err, Error::Config(_)));
	}

	#[test]
	fn test_validate() {
		assert!(WsConfig::new().max_concurrent_notifications(0).validate().is_err());
		assert!(WsConfig::new().max_connections(0).validate().is_err());
		assert!(WsConfig::new().keep_alive_interval(Some(Duration::ZERO)).validate().is_err());
		assert!(WsConfig::new().keep_alive_interval(None).validate().is_ok());
		assert!(WsConfig::new().protocols(vec![]).validate().is_err());
		assert!(WsConfig::new().protocols(vec!["mqtt"]).validate().is_err());
		assert!(WsConfig::new().protocols(vec![GRAPHQL_TRANSPORT_WS]).validate().is_err());
		assert!(
			WsConfig::new()
				.protocols(vec![GRAPHQL_TRANSPORT_WS])
				.default_protocol(GRAPHQL_TRANSPORT_WS)
				.validate()
				.is_ok()
		);
	}
}
