// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Timer and cancellation utilities for the tokio runtime.
//!
//! - [`KeepAliveTimer`]: restartable periodic timer driving an async callback
//! - [`schedule_once`]: one-shot task whose cancellation handle is held by the owner
//! - [`LinkedToken`]: cancellation token that fires when either of two parents fires

mod cancel;
mod keepalive;
mod once;

use std::time::Duration;

pub use cancel::LinkedToken;
use graphsub_type::{Error, Result};
pub use keepalive::KeepAliveTimer;
pub use once::{ScheduledTask, schedule_once};

/// Converts a signed millisecond setting into a duration.
///
/// Negative values are rejected, zero is accepted.
pub fn duration_from_millis(millis: i64) -> Result<Duration> {
	u64::try_from(millis).map(Duration::from_millis).map_err(|_| Error::InvalidInterval(millis))
}
