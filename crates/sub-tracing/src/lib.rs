// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Tracing subsystem: installs the process wide `tracing-subscriber`
//! registry.

mod builder;
mod subsystem;

pub use builder::{TracingBuilder, TracingFormat};
pub use subsystem::TracingSubsystem;
