// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Restartable periodic timer.
//!
//! The timer owns at most one background task. Starting again stops the
//! previous task first, stopping waits for a callback that is currently
//! running to return. After [`KeepAliveTimer::stop`] returns no callback runs
//! until the next [`KeepAliveTimer::start`].

use std::{
	future::Future,
	panic::AssertUnwindSafe,
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicU64, Ordering},
	},
	time::Duration,
};

use futures_util::{FutureExt, future::BoxFuture};
use graphsub_type::{Error, Result};
use tokio::{
	sync::{Mutex, broadcast},
	task::JoinHandle,
	time::sleep,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Callback = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

const ERROR_CHANNEL_CAPACITY: usize = 16;

pub struct KeepAliveTimer {
	inner: Arc<Inner>,
}

struct Inner {
	callback: Callback,
	delay: Duration,
	interval: Duration,
	run: Mutex<Option<Running>>,
	disposed: AtomicBool,
	/// Parent of every run token, cancelled on dispose and drop.
	lifetime: CancellationToken,
	errors: broadcast::Sender<Arc<Error>>,
	ticks: AtomicU64,
}

struct Running {
	cancel: CancellationToken,
	handle: JoinHandle<()>,
}

impl KeepAliveTimer {
	/// Creates a stopped timer.
	///
	/// The first callback fires `delay` after [`start`](Self::start), then
	/// every `interval`. A zero `interval` fires once.
	pub fn new<F, Fut>(delay: Duration, interval: Duration, callback: F) -> Self
	where
		F: Fn() -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<()>> + Send + 'static,
	{
		let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
		Self {
			inner: Arc::new(Inner {
				callback: Arc::new(move || callback().boxed()),
				delay,
				interval,
				run: Mutex::new(None),
				disposed: AtomicBool::new(false),
				lifetime: CancellationToken::new(),
				errors,
				ticks: AtomicU64::new(0),
			}),
		}
	}

	pub async fn start(&self) -> Result<()> {
		if self.is_disposed() {
			return Err(Error::TimerDisposed);
		}

		let mut run = self.inner.run.lock().await;
		if let Some(previous) = run.take() {
			previous.stop().await;
		}
		// dispose may have raced with the wait above
		if self.is_disposed() {
			return Err(Error::TimerDisposed);
		}

		let cancel = self.inner.lifetime.child_token();
		let handle = tokio::spawn(run_loop(self.inner.clone(), cancel.clone()));
		*run = Some(Running {
			cancel,
			handle,
		});
		Ok(())
	}

	pub async fn stop(&self) {
		if let Some(running) = self.inner.run.lock().await.take() {
			running.stop().await;
		}
	}

	/// Stops the timer for good. Idempotent.
	pub async fn dispose(&self) {
		if self.inner.disposed.swap(true, Ordering::SeqCst) {
			return;
		}
		self.inner.lifetime.cancel();
		self.stop().await;
	}

	pub async fn is_running(&self) -> bool {
		self.inner.run.lock().await.as_ref().is_some_and(|r| !r.handle.is_finished())
	}

	pub fn is_disposed(&self) -> bool {
		self.inner.disposed.load(Ordering::SeqCst)
	}

	/// Number of callback invocations so far.
	pub fn ticks(&self) -> u64 {
		self.inner.ticks.load(Ordering::SeqCst)
	}

	/// Errors returned by, or panics raised in, the callback.
	pub fn subscribe_errors(&self) -> broadcast::Receiver<Arc<Error>> {
		self.inner.errors.subscribe()
	}
}

impl Drop for KeepAliveTimer {
	fn drop(&mut self) {
		self.inner.lifetime.cancel();
	}
}

impl Running {
	async fn stop(self) {
		self.cancel.cancel();
		if let Err(err) = self.handle.await {
			warn!("keep-alive task ended abnormally: {}", err);
		}
	}
}

async fn run_loop(inner: Arc<Inner>, cancel: CancellationToken) {
	let mut wait = inner.delay;
	loop {
		tokio::select! {
			biased;
			_ = cancel.cancelled() => break,
			_ = sleep(wait) => {}
		}

		// not raced against `cancel`: stop waits for the callback to return
		inner.ticks.fetch_add(1, Ordering::SeqCst);
		let outcome = AssertUnwindSafe((inner.callback)()).catch_unwind().await;
		let failure = match outcome {
			Ok(Ok(())) => None,
			Ok(Err(err)) => Some(err),
			Err(_) => Some(Error::execution("keep-alive callback panicked")),
		};
		if let Some(err) = failure {
			warn!(error = %err, "keep-alive callback failed");
			let _ = inner.errors.send(Arc::new(err));
		}

		if inner.interval.is_zero() {
			debug!("one-shot keep-alive timer fired");
			break;
		}
		wait = inner.interval;
	}
}
