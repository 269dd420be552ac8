// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{fmt, sync::Arc};

use graphsub_core::QueryRequest;
use graphsub_type::{EventName, FieldRoute};

/// A live subscription owned by one connection.
pub struct ClientSubscription<P> {
	id: String,
	route: FieldRoute,
	event_name: EventName,
	request: QueryRequest,
	plan: Arc<P>,
}

impl<P> ClientSubscription<P> {
	pub fn new(id: impl Into<String>, route: FieldRoute, request: QueryRequest, plan: Arc<P>) -> Self {
		let event_name = route.event_name();
		Self {
			id: id.into(),
			route,
			event_name,
			request,
			plan,
		}
	}

	/// Client chosen operation id, unique within the connection.
	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn route(&self) -> &FieldRoute {
		&self.route
	}

	pub fn event_name(&self) -> &EventName {
		&self.event_name
	}

	pub fn request(&self) -> &QueryRequest {
		&self.request
	}

	pub fn plan(&self) -> &Arc<P> {
		&self.plan
	}
}

impl<P> fmt::Debug for ClientSubscription<P> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ClientSubscription").field("id", &self.id).field("route", &self.route).finish()
	}
}
