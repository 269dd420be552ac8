// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! The `graphql-transport-ws` protocol.
//!
//! Inbound: `connection_init`, `subscribe`, `complete`, `ping`, `pong`.
//! Outbound: `connection_ack`, `ping`, `pong`, `next`, `error`, `complete`.

use graphsub_core::{CloseStatus, Error, Result};
use serde_json::{Map, Value};

use super::{
	ClientMessage, ErrorPayload, GRAPHQL_TRANSPORT_WS, OutboundMessage, ProtocolCodec, ProtocolViolation, Rejection,
	ServerMessage, decode_envelope, init_payload, require_id, require_query, unknown_type,
};

const PROTOCOL_RULE: &str = "https://github.com/enisdenjo/graphql-ws/blob/master/PROTOCOL.md";

pub const BAD_REQUEST: u16 = 4400;
pub const UNAUTHORIZED: u16 = 4401;
pub const INIT_TIMEOUT: u16 = 4408;
pub const TOO_MANY_INIT_REQUESTS: u16 = 4429;

#[derive(Debug, Clone, Copy, Default)]
pub struct GraphQLTransportWs;

/// `error` carries a list of GraphQL errors; the code and diagnostics travel
/// in the extensions.
fn error_payload(payload: &ErrorPayload) -> Value {
	let mut extensions = payload.metadata.clone();
	extensions.insert("code".to_string(), Value::from(payload.code.as_str()));

	let mut error = Map::new();
	error.insert("message".to_string(), Value::from(payload.message.as_str()));
	error.insert("extensions".to_string(), Value::Object(extensions));
	Value::Array(vec![Value::Object(error)])
}

impl ProtocolCodec for GraphQLTransportWs {
	fn name(&self) -> &'static str {
		GRAPHQL_TRANSPORT_WS
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
			"subscribe" => Ok(ClientMessage::Start {
				id: require_id(&raw)?,
				payload: require_query(&raw)?,
			}),
			"complete" => Ok(ClientMessage::Stop {
				id: require_id(&raw)?,
			}),
			"ping" => Ok(ClientMessage::Ping {
				payload: raw.payload,
			}),
			"pong" => Ok(ClientMessage::Pong {
				payload: raw.payload,
			}),
			other => Err(unknown_type(&raw, other)),
		}
	}

	fn encode(&self, message: &ServerMessage) -> Result<String> {
		match message {
			ServerMessage::ConnectionAck => OutboundMessage::new("connection_ack").encode(),
			ServerMessage::KeepAlive => OutboundMessage::new("ping").encode(),
			ServerMessage::Ping {
				payload,
			} => with_payload(OutboundMessage::new("ping"), payload).encode(),
			ServerMessage::Pong {
				payload,
			} => with_payload(OutboundMessage::new("pong"), payload).encode(),
			ServerMessage::Data {
				id,
				payload,
			} => OutboundMessage::new("next").id(id).payload(serde_json::to_value(payload)?).encode(),
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
				..
			} => Err(Error::protocol("graphql-transport-ws has no connection_error message")),
		}
	}

	fn keep_alive(&self) -> Option<ServerMessage> {
		Some(ServerMessage::KeepAlive)
	}

	fn stop_acknowledgement(&self, _id: &str) -> Option<ServerMessage> {
		None
	}

	fn subscription_end(&self, id: &str) -> Option<ServerMessage> {
		Some(ServerMessage::complete(id))
	}

	fn init_timeout(&self) -> Option<CloseStatus> {
		Some(CloseStatus::new(INIT_TIMEOUT, "Connection initialisation timeout"))
	}

	fn repeated_init(&self) -> Option<CloseStatus> {
		Some(CloseStatus::new(TOO_MANY_INIT_REQUESTS, "Too many initialisation requests"))
	}

	fn unauthorized(&self) -> Option<CloseStatus> {
		Some(CloseStatus::new(UNAUTHORIZED, "Unauthorized"))
	}

	fn init_rejected(&self, violation: &ProtocolViolation) -> Rejection {
		Rejection::Close(CloseStatus::new(BAD_REQUEST, violation.message.clone()))
	}
}

fn with_payload<'a>(message: OutboundMessage<'a>, payload: &Option<Value>) -> OutboundMessage<'a> {
	match payload {
		Some(payload) => message.payload(payload.clone()),
		None => message,
	}
}

#[cfg(test)]
mod tests {
	use graphsub_core::ExecutionResult;
	use serde_json::json;

	use super::*;
	use crate::protocol::ErrorCode;

	fn encoded(message: ServerMessage) -> Value {
		serde_json::from_str(&GraphQLTransportWs.encode(&message).unwrap()).unwrap()
	}

	#[test]
	fn test_decode_subscribe_and_complete() {
		let message = GraphQLTransportWs
			.decode(r#"{"type":"subscribe","id":"a","payload":{"query":"{ hello }","operationName":"Hi"}}"#)
			.unwrap();
		match message {
			ClientMessage::Start {
				id,
				payload,
			} => {
				assert_eq!(id, "a");
				assert_eq!(payload.operation_name.as_deref(), Some("Hi"));
			}
			other => panic!("unexpected {other:?}"),
		}

		assert_eq!(
			GraphQLTransportWs.decode(r#"{"type":"complete","id":"a"}"#).unwrap(),
			ClientMessage::Stop {
				id: "a".to_string()
			}
		);
	}

	#[test]
	fn test_decode_ping_pong() {
		assert_eq!(
			GraphQLTransportWs.decode(r#"{"type":"ping","payload":{"t":1}}"#).unwrap(),
			ClientMessage::Ping {
				payload: Some(json!({"t": 1}))
			}
		);
		assert_eq!(
			GraphQLTransportWs.decode(r#"{"type":"pong"}"#).unwrap(),
			ClientMessage::Pong {
				payload: None
			}
		);
	}

	#[test]
	fn test_decode_rejects_graphql_ws_types() {
		let err = GraphQLTransportWs.decode(r#"{"type":"start","id":"1","payload":{"query":"{a}"}}"#).unwrap_err();
		assert_eq!(err.code, ErrorCode::UnknownMessageType);
	}

	#[test]
	fn test_encode_next() {
		let value = encoded(ServerMessage::data("a", ExecutionResult::data(json!({"hello": "world"}))));
		assert_eq!(value, json!({"type": "next", "id": "a", "payload": {"data": {"hello": "world"}}}));
	}

	#[test]
	fn test_encode_error_as_graphql_errors() {
		let value = encoded(ServerMessage::error(Some("a".to_string()), ErrorPayload::duplicate_id("a")));
		assert_eq!(
			value,
			json!({
				"type": "error",
				"id": "a",
				"payload": [{
					"message": "Subscriber for a already exists",
					"extensions": {"code": "DUPLICATE_ID", "lastReceivedId": "a"}
				}]
			})
		);
	}

	#[test]
	fn test_keep_alive_is_ping() {
		assert_eq!(encoded(ServerMessage::KeepAlive), json!({"type": "ping"}));
		assert_eq!(
			encoded(ServerMessage::Pong {
				payload: Some(json!({"t": 1}))
			}),
			json!({"type": "pong", "payload": {"t": 1}})
		);
	}

	#[test]
	fn test_protocol_rules() {
		assert!(GraphQLTransportWs.stop_acknowledgement("a").is_none());
		assert_eq!(GraphQLTransportWs.subscription_end("a"), Some(ServerMessage::complete("a")));
		assert_eq!(GraphQLTransportWs.init_timeout().unwrap().code, INIT_TIMEOUT);
		assert_eq!(GraphQLTransportWs.repeated_init().unwrap().code, TOO_MANY_INIT_REQUESTS);
		assert_eq!(GraphQLTransportWs.unauthorized().unwrap().code, UNAUTHORIZED);

		let violation = GraphQLTransportWs.decode(r#"{"type":"connection_init","payload":"x"}"#).unwrap_err();
		assert!(matches!(
			GraphQLTransportWs.init_rejected(&violation),
			Rejection::Close(CloseStatus { code: BAD_REQUEST, .. })
		));
	}
}
