// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Shared vocabulary for the subscription engine: the error taxonomy and the
//! identifiers that cross crate boundaries (connections, field routes and the
//! event names derived from them).

mod error;
mod id;
mod route;

pub use error::{Error, Result};
pub use id::ConnectionId;
pub use route::{EventName, FieldRoute, OperationType};
