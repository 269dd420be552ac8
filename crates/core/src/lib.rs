// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Contracts between the subscription engine and its collaborators.
//!
//! The engine itself never parses or executes GraphQL and never touches a
//! socket. It talks to:
//!
//! - a [`QueryRuntime`](runtime::QueryRuntime) that turns payloads into
//!   results and subscription plans,
//! - a [`ClientTransport`](transport::ClientTransport) that moves discrete
//!   text/binary frames for one client,
//! - an upstream [`EventListener`](event::EventListener) where the server
//!   registers interest in published events.

pub mod event;
pub mod payload;
pub mod runtime;
pub mod transport;

pub use event::{EventListener, EventReceiver, ReceiverId, SubscriptionEvent};
pub use graphsub_type::{ConnectionId, Error, EventName, FieldRoute, OperationType, Result};
pub use payload::{ExecutionResult, GraphQLError, GraphQLPayload};
pub use runtime::{
	EventSource, ExecutionContext, ExecutionMetadata, ExecutionOutcome, QueryRequest, QueryRuntime, RouteResolver,
	SubscriptionPlan,
};
pub use transport::{ClientTransport, CloseStatus, FrameKind, TransportFrame, TransportState};
