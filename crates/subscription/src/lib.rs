// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Per-connection subscription bookkeeping.
//!
//! - [`MessageIdReservationSet`]: operation ids currently in use on a connection
//! - [`SubscriptionCollection`]: live subscriptions indexed by id and by route

mod collection;
mod reservation;
mod subscription;

pub use collection::SubscriptionCollection;
pub use reservation::{MessageIdReservationSet, Reservation};
pub use subscription::ClientSubscription;
