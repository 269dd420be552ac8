// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server generated identity of one client connection.
///
/// Time ordered (UUID v7) so that log lines sort by connection age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
	pub fn generate() -> Self {
		Self(Uuid::now_v7())
	}

	pub fn as_uuid(&self) -> &Uuid {
		&self.0
	}
}

impl Default for ConnectionId {
	fn default() -> Self {
		Self::generate()
	}
}

impl fmt::Display for ConnectionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.0, f)
	}
}
