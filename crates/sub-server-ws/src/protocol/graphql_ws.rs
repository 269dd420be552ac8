// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Apollo `subscriptions-transport-ws`, negotiated as `graphql-ws`.
//!
//! Inbound: `connection_init`, `start`, `stop`, `connection_terminate`.
//! Outbound: `connection_ack`, `ka`, `data`, `error`, `complete`,
//! `connection_error`.

use graphsub_core::{CloseStatus, Error, Result};
use serde_json::{Map, Value};

use super::{
	ClientMessage, ErrorPayload, GRAPHQL_WS, OutboundMessage, ProtocolCodec, ProtocolViolation, Rejection,
	ServerMessage, decode_envelope, init_payload, require_id, require_query, unknown_type,
};

const PROTOCOL_RULE: &str = "https://github.com/apollographql/subscriptions-transport-ws/blob/master/PROTOCOL.md";

#[derive(Debug, Clone, Copy, Default)]
pub struct GraphQLWs;

fn error_payload(payload: &ErrorPayload) -> Value {
	let mut object = Map::new();
	object.insert("message".to_string(), Value::from(payload.message.as_str()));
	object.insert("code".to_string(), Value::from(payload.code.as_str()));
	if !payload.metadata.is_empty() {
		object.insert("metadata".to_string(), Value::Object(payload.metadata.clone()));
	}
	Value::Object(object)
}

impl ProtocolCodec for GraphQLWs {
	fn name(&self) -> &'static str {
		GRAPHQL_WS
	}

	fn protocol_rule(&self) -> &'static str {
		PROTOCOL_RULE
	}

	fn decode(&self, text: &str) -> std::result::Result<ClientMessage, ProtocolViolation> {
		let (raw, kind) = decode_envelope(text)?;
		match kind.as_str() {
			"connection_init" => Ok(ClientMessage::ConnectionInit {
				payload: init_payload(&raw)?,
			}),
			"start" => Ok(ClientMessage::Start {
				id: require_id(&raw)?,
				payload: require_query(&raw)?,
			}),
			"stop" => Ok(ClientMessage::Stop {
				id: require_id(&raw)?,
			}),
			"connection_terminate" => Ok(ClientMessage::ConnectionTerminate),
			other => Err(unknown_type(&raw, other)),
		}
	}

	fn encode(&self, message: &ServerMessage) -> Result<String> {
		match message {
			ServerMessage::ConnectionAck => OutboundMessage::new("connection_ack").encode(),
			ServerMessage::KeepAlive => OutboundMessage::new("ka").encode(),
			ServerMessage::Data {
				id,
				payload,
			} => OutboundMessage::new("data").id(id).payload(serde_json::to_value(payload)?).encode(),
			ServerMessage::Error {
				id,
				payload,
			} => {
				let mut outbound = OutboundMessage::new("error").payload(error_payload(payload));
				if let Some(id) = id {
					outbound = outbound.id(id);
				}
				outbound.encode()
			}
			ServerMessage::Complete {
				id,
			} => OutboundMessage::new("complete").id(id).encode(),
			ServerMessage::ConnectionError {
				payload,
			} => OutboundMessage::new("connection_error").payload(error_payload(payload)).encode(),
			ServerMessage::Ping {
				..
			}
			| ServerMessage::Pong {
				..
			} => Err(Error::protocol("graphql-ws has no ping/pong messages")),
		}
	}

	fn keep_alive(&self) -> Option<ServerMessage> {
		Some(ServerMessage::KeepAlive)
	}

	fn stop_acknowledgement(&self, id: &str) -> Option<ServerMessage> {
		Some(ServerMessage::complete(id))
	}

	fn subscription_end(&self, id: &str) -> Option<ServerMessage> {
		Some(ServerMessage::complete(id))
	}

	fn init_timeout(&self) -> Option<CloseStatus> {
		None
	}

	fn repeated_init(&self) -> Option<CloseStatus> {
		None
	}

	fn unauthorized(&self) -> Option<CloseStatus> {
		None
	}

	fn init_rejected(&self, violation: &ProtocolViolation) -> Rejection {
		Rejection::Reply(ServerMessage::ConnectionError {
			payload: violation.to_payload(PROTOCOL_RULE),
		})
	}
}
