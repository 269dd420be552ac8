// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;

/// Operation ids in use on one connection.
///
/// An id stays reserved while its request is in flight and, for
/// subscriptions, for as long as the subscription lives.
#[derive(Debug, Clone, Default)]
pub struct MessageIdReservationSet {
	ids: Arc<Mutex<HashSet<String>>>,
}

impl MessageIdReservationSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Reserves `id`, or returns `None` when it is already taken.
	///
	/// The reservation is released when the returned guard drops, unless it
	/// is [held](Reservation::hold).
	pub fn reserve(&self, id: &str) -> Option<Reservation> {
		if !self.ids.lock().insert(id.to_string()) {
			return None;
		}
		Some(Reservation {
			set: self.clone(),
			id: id.to_string(),
			held: false,
		})
	}

	/// Returns `true` if `id` was reserved.
	pub fn release(&self, id: &str) -> bool {
		self.ids.lock().remove(id)
	}

	pub fn contains(&self, id: &str) -> bool {
		self.ids.lock().contains(id)
	}

	pub fn clear(&self) {
		self.ids.lock().clear();
	}

	pub fn len(&self) -> usize {
		self.ids.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.ids.lock().is_empty()
	}
}

/// Guard over a reserved id.
#[derive(Debug)]
#[must_use = "dropping a reservation releases the id"]
pub struct Reservation {
	set: MessageIdReservationSet,
	id: String,
	held: bool,
}

impl Reservation {
	/// Keeps the id reserved after the guard drops. It must then be released
	/// through [`MessageIdReservationSet::release`].
	pub fn hold(mut self) {
		self.held = true;
	}
}

impl Drop for Reservation {
	fn drop(&mut self) {
		if !self.held {
			self.set.release(&self.id);
		}
	}
}
