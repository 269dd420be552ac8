// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! GraphQL subscriptions over websockets.
//!
//! This crate speaks the two Apollo websocket sub-protocols, `graphql-ws`
//! and `graphql-transport-ws`, on top of any [`ClientTransport`]:
//!
//! - [`ClientConnection`] runs the per-client state machine: handshake,
//!   keep-alive, subscription start/stop and teardown.
//! - [`SubscriptionServer`] tracks which connections are interested in which
//!   event names and fans published events out to them.
//! - [`InProcessEventSource`] and [`EventPublisher`] feed events into the
//!   server from within the process.
//! - [`WsSubsystem`] hosts it all behind a tokio-tungstenite listener.
//!
//! Parsing and executing GraphQL is left to a [`QueryRuntime`].
//!
//! # Example
//!
//! ```ignore
//! let runtime = Arc::new(MyRuntime::new(schema));
//! let mut ws = WsSubsystem::new(WsConfig::default().bind_addr("127.0.0.1:8091"), runtime)?;
//! ws.start().await?;
//!
//! let publisher = ws.publisher().unwrap();
//! publisher.publish("Subscription.onMessage", json!({"text": "hello"})).await?;
//!
//! ws.shutdown().await?;
//! ```
//!
//! [`ClientTransport`]: graphsub_core::ClientTransport
//! [`QueryRuntime`]: graphsub_core::QueryRuntime

pub mod config;
pub mod connection;
pub mod protocol;
pub mod publisher;
pub mod server;
pub mod source;
pub mod subsystem;
pub mod transport;

pub use config::WsConfig;
pub use connection::{ClientConnection, ConnectionObserver, ConnectionState, SubscriptionClient};
pub use protocol::{
	ClientMessage, ErrorCode, ErrorPayload, GRAPHQL_TRANSPORT_WS, GRAPHQL_WS, GraphQLTransportWs, GraphQLWs,
	ProtocolCodec, ProtocolViolation, Rejection, ServerMessage, codec_for,
};
pub use publisher::EventPublisher;
pub use server::SubscriptionServer;
pub use source::InProcessEventSource;
pub use subsystem::{WsSubsystem, negotiate_protocol};
pub use transport::WebSocketTransport;
