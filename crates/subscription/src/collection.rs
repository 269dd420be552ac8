// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Subscriptions of one connection, indexed by operation id and by route.
//!
//! Both indexes live behind a single lock so that a subscription is present
//! in one if and only if it is present in the other.

use std::{
	collections::{HashMap, hash_map::Entry},
	sync::Arc,
};

use graphsub_type::{Error, FieldRoute, Result};
use parking_lot::Mutex;
use tracing::trace;

use crate::ClientSubscription;

pub struct SubscriptionCollection<P> {
	indexes: Mutex<Indexes<P>>,
}

struct Indexes<P> {
	by_id: HashMap<String, Arc<ClientSubscription<P>>>,
	by_route: HashMap<FieldRoute, Vec<Arc<ClientSubscription<P>>>>,
}

impl<P> Default for SubscriptionCollection<P> {
	fn default() -> Self {
		Self::new()
	}
}

impl<P> SubscriptionCollection<P> {
	pub fn new() -> Self {
		Self {
			indexes: Mutex::new(Indexes {
				by_id: HashMap::new(),
				by_route: HashMap::new(),
			}),
		}
	}

	/// Adds a subscription and returns how many subscriptions now share its
	/// route. A count of 1 means the route is new to this connection.
	pub fn add(&self, subscription: ClientSubscription<P>) -> Result<usize> {
		self.add_with(subscription, |_| {})
	}

	/// Like [`add`](Self::add), running `on_added` with the route count before
	/// the indexes are unlocked. Anything `on_added` does is therefore ordered
	/// with every other change to this collection.
	pub fn add_with<F>(&self, subscription: ClientSubscription<P>, on_added: F) -> Result<usize>
	where
		F: FnOnce(usize),
	{
		let subscription = Arc::new(subscription);
		let mut indexes = self.indexes.lock();

		match indexes.by_id.entry(subscription.id().to_string()) {
			Entry::Occupied(_) => return Err(Error::DuplicateSubscription(subscription.id().to_string())),
			Entry::Vacant(entry) => {
				entry.insert(subscription.clone());
			}
		}

		let route = indexes.by_route.entry(subscription.route().clone()).or_default();
		route.push(subscription.clone());
		let count = route.len();
		trace!(operation = subscription.id(), route = %subscription.route(), "subscription added");

		on_added(count);
		Ok(count)
	}

	/// Removes the subscription with `id`, returning it together with the
	/// number of subscriptions left on its route.
	pub fn remove(&self, id: &str) -> Option<(Arc<ClientSubscription<P>>, usize)> {
		self.remove_with(id, |_, _| {})
	}

	/// Like [`remove`](Self::remove), running `on_removed` with the removed
	/// subscription and the remaining route count before the indexes are
	/// unlocked.
	pub fn remove_with<F>(&self, id: &str, on_removed: F) -> Option<(Arc<ClientSubscription<P>>, usize)>
	where
		F: FnOnce(&ClientSubscription<P>, usize),
	{
		let mut indexes = self.indexes.lock();
		let subscription = indexes.by_id.remove(id)?;

		let remaining = match indexes.by_route.entry(subscription.route().clone()) {
			Entry::Occupied(mut entry) => {
				entry.get_mut().retain(|s| s.id() != id);
				let remaining = entry.get().len();
				if remaining == 0 {
					entry.remove();
				}
				remaining
			}
			Entry::Vacant(_) => 0,
		};

		trace!(operation = id, remaining, "subscription removed");
		on_removed(&subscription, remaining);
		Some((subscription, remaining))
	}

	pub fn contains(&self, id: &str) -> bool {
		self.indexes.lock().by_id.contains_key(id)
	}

	/// Snapshot of the subscriptions on `route`.
	pub fn retrieve_by_route(&self, route: &FieldRoute) -> Vec<Arc<ClientSubscription<P>>> {
		self.indexes.lock().by_route.get(route).cloned().unwrap_or_default()
	}

	pub fn route_count(&self, route: &FieldRoute) -> usize {
		self.indexes.lock().by_route.get(route).map_or(0, Vec::len)
	}

	pub fn routes(&self) -> Vec<FieldRoute> {
		self.indexes.lock().by_route.keys().cloned().collect()
	}

	/// Empties both indexes and returns everything that was removed.
	pub fn clear(&self) -> Vec<Arc<ClientSubscription<P>>> {
		let mut indexes = self.indexes.lock();
		indexes.by_route.clear();
		indexes.by_id.drain().map(|(_, subscription)| subscription).collect()
	}

	pub fn len(&self) -> usize {
		self.indexes.lock().by_id.len()
	}

	pub fn is_empty(&self) -> bool {
		self.indexes.lock().by_id.is_empty()
	}
}
