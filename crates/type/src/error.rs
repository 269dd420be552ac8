// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::fmt;

use crate::ConnectionId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("subscription with id '{0}' already exists")]
	DuplicateSubscription(String),

	#[error("connection {0} is closed forever and cannot be restarted")]
	ClosedForever(ConnectionId),

	#[error("connection {0} has already been started")]
	AlreadyStarted(ConnectionId),

	#[error("timer has been disposed")]
	TimerDisposed,

	#[error("invalid timer interval: {0}ms")]
	InvalidInterval(i64),

	#[error("protocol error: {0}")]
	Protocol(String),

	#[error("transport error: {0}")]
	Transport(String),

	#[error("serialization error: {0}")]
	Serde(#[from] serde_json::Error),

	#[error("execution failed: {0}")]
	Execution(String),

	#[error("{} of {notified} dispatches failed: {}", failures.len(), DisplayFailures(failures))]
	Dispatch {
		notified: usize,
		failures: Vec<Error>,
	},

	#[error("configuration error: {0}")]
	Config(String),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	#[error("websocket error: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl Error {
	/// Folds the faults of concurrent work into one error, or `None` when
	/// nothing failed. A single fault is returned as is.
	pub fn aggregate(notified: usize, mut failures: Vec<Error>) -> Option<Error> {
		match failures.len() {
			0 => None,
			1 => failures.pop(),
			_ => Some(Error::Dispatch {
				notified,
				failures,
			}),
		}
	}

	pub fn transport(message: impl fmt::Display) -> Self {
		Error::Transport(message.to_string())
	}

	pub fn protocol(message: impl fmt::Display) -> Self {
		Error::Protocol(message.to_string())
	}

	pub fn execution(message: impl fmt::Display) -> Self {
		Error::Execution(message.to_string())
	}

	pub fn config(message: impl fmt::Display) -> Self {
		Error::Config(message.to_string())
	}
}

struct DisplayFailures<'a>(&'a [Error]);

impl fmt::Display for DisplayFailures<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (idx, failure) in self.0.iter().enumerate() {
			if idx > 0 {
				f.write_str("; ")?;
			}
			write!(f, "{}", failure)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_aggregate_empty_is_none() {
		assert!(Error::aggregate(3, vec![]).is_none());
	}

	#[test]
	fn test_aggregate_single_is_unwrapped() {
		let err = Error::aggregate(3, vec![Error::execution("boom")]).unwrap();
		assert!(matches!(err, Error::Execution(ref m) if m == "boom"));
	}

	#[test]
	fn test_aggregate_many_keeps_every_failure() {
		let err = Error::aggregate(4, vec![Error::execution("a"), Error::transport("b")]).unwrap();
		match &err {
			Error::Dispatch {
				notified,
				failures,
			} => {
				assert_eq!(*notified, 4);
				assert_eq!(failures.len(), 2);
			}
			other => panic!("unexpected {other:?}"),
		}
		assert_eq!(err.to_string(), "2 of 4 dispatches failed: execution failed: a; transport error: b");
	}
}
