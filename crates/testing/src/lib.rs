// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Test doubles for the subscription engine's collaborators.

pub mod listener;
pub mod runtime;
pub mod transport;
pub mod util;

pub use listener::{ListenerCall, RecordingListener};
pub use runtime::{EventHook, ProjectionPlan, ProjectionRuntime, Selection};
pub use transport::{MemoryClient, MemoryTransport, Outbound};
