// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use tokio_util::sync::{CancellationToken, DropGuard};

/// A token cancelled when either `primary` or `secondary` is cancelled, or
/// when this value is dropped.
pub struct LinkedToken {
	token: CancellationToken,
	_guard: DropGuard,
}

impl LinkedToken {
	pub fn new(primary: &CancellationToken, secondary: &CancellationToken) -> Self {
		let token = primary.child_token();

		if secondary.is_cancelled() {
			token.cancel();
		} else {
			let linked = token.clone();
			let secondary = secondary.clone();
			tokio::spawn(async move {
				tokio::select! {
					_ = secondary.cancelled() => linked.cancel(),
					_ = linked.cancelled() => {}
				}
			});
		}

		Self {
			_guard: token.clone().drop_guard(),
			token,
		}
	}

	pub fn token(&self) -> &CancellationToken {
		&self.token
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_primary_cancels_linked() {
		let primary = CancellationToken::new();
		let secondary = CancellationToken::new();
		let linked = LinkedToken::new(&primary, &secondary);

		primary.cancel();
		linked.token().cancelled().await;
		assert!(!secondary.is_cancelled());
	}

	#[tokio::test]
	async fn test_secondary_cancels_linked() {
		let primary = CancellationToken::new();
		let secondary = CancellationToken::new();
		let linked = LinkedToken::new(&primary, &secondary);

		secondary.cancel();
		linked.token().cancelled().await;
		assert!(!primary.is_cancelled());
	}

	#[tokio::test]
	async fn test_already_cancelled_secondary() {
		let secondary = CancellationToken::new();
		secondary.cancel();
		let linked = LinkedToken::new(&CancellationToken::new(), &secondary);
		assert!(linked.token().is_cancelled());
	}

	#[tokio::test]
	async fn test_drop_cancels_token() {
		let primary = CancellationToken::new();
		let linked = LinkedToken::new(&primary, &CancellationToken::new());
		let token = linked.token().clone();
		drop(linked);
		assert!(token.is_cancelled());
		assert!(!primary.is_cancelled());
	}
}
