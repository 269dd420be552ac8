// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::fmt;

/// Lifecycle of a [`ClientConnection`](super::ClientConnection).
///
/// `Created -> Open -> Closing -> Closed -> ClosedForever`. A connection is
/// used once: `ClosedForever` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Created,
	Open,
	Closing,
	Closed,
	ClosedForever,
}

impl ConnectionState {
	pub fn is_open(&self) -> bool {
		matches!(self, ConnectionState::Open)
	}
}

impl fmt::Display for ConnectionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			ConnectionState::Created => "created",
			ConnectionState::Open => "open",
			ConnectionState::Closing => "closing",
			ConnectionState::Closed => "closed",
			ConnectionState::ClosedForever => "closed-forever",
		})
	}
}
