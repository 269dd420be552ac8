// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{future::Future, time::Duration};

use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

/// Handle to a task scheduled with [`schedule_once`].
///
/// Dropping the handle cancels the task if it has not fired yet.
#[derive(Debug)]
pub struct ScheduledTask {
	cancel: CancellationToken,
	handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
	/// Prevents the task from firing. Once the delay has elapsed the task runs
	/// to completion and cancelling has no effect.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	pub fn is_finished(&self) -> bool {
		self.handle.as_ref().is_none_or(JoinHandle::is_finished)
	}

	/// Cancels the task and waits until it is gone.
	pub async fn stop(mut self) {
		self.cancel.cancel();
		if let Some(handle) = self.handle.take() {
			let _ = handle.await;
		}
	}
}

impl Drop for ScheduledTask {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

/// Runs `task` once after `delay` unless cancelled first.
pub fn schedule_once<F>(delay: Duration, task: F) -> ScheduledTask
where
	F: Future<Output = ()> + Send + 'static,
{
	let cancel = CancellationToken::new();
	let token = cancel.clone();

	let handle = tokio::spawn(async move {
		tokio::select! {
			biased;
			_ = token.cancelled() => {}
			_ = sleep(delay) => task.await,
		}
	});

	ScheduledTask {
		cancel,
		handle: Some(handle),
	}
}
