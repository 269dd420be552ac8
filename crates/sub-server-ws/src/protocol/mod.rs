// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Protocol message model and the codecs of the two supported sub-protocols.
//!
//! Connections speak in terms of [`ClientMessage`] and [`ServerMessage`]. A
//! [`ProtocolCodec`] maps those to the wire format of one sub-protocol and
//! answers the questions where the protocols disagree, such as whether a
//! client `stop` is acknowledged.

mod graphql_ws;
mod transport_ws;

use std::{fmt, sync::Arc};

pub use graphql_ws::GraphQLWs;
use graphsub_core::{CloseStatus, ExecutionResult, GraphQLPayload, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
pub use transport_ws::GraphQLTransportWs;

/// Apollo `subscriptions-transport-ws`.
pub const GRAPHQL_WS: &str = "graphql-ws";
/// `graphql-ws` library protocol.
pub const GRAPHQL_TRANSPORT_WS: &str = "graphql-transport-ws";

/// Returns the codec for a sub-protocol name.
pub fn codec_for(protocol: &str) -> Option<Arc<dyn ProtocolCodec>> {
	match protocol {
		GRAPHQL_WS => Some(Arc::new(GraphQLWs)),
		GRAPHQL_TRANSPORT_WS => Some(Arc::new(GraphQLTransportWs)),
		_ => None,
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
	ConnectionInit {
		payload: Option<Map<String, Value>>,
	},
	/// `start` or `subscribe`.
	Start {
		id: String,
		payload: GraphQLPayload,
	},
	/// `stop`, or `complete` sent by the client.
	Stop {
		id: String,
	},
	ConnectionTerminate,
	Ping {
		payload: Option<Value>,
	},
	Pong {
		payload: Option<Value>,
	},
}

impl ClientMessage {
	pub fn id(&self) -> Option<&str> {
		match self {
			ClientMessage::Start {
				id,
				..
			}
			| ClientMessage::Stop {
				id,
			} => Some(id),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
	ConnectionAck,
	KeepAlive,
	Ping {
		payload: Option<Value>,
	},
	Pong {
		payload: Option<Value>,
	},
	/// `data` or `next`.
	Data {
		id: String,
		payload: ExecutionResult,
	},
	Error {
		id: Option<String>,
		payload: ErrorPayload,
	},
	Complete {
		id: String,
	},
	ConnectionError {
		payload: ErrorPayload,
	},
}

impl ServerMessage {
	pub fn data(id: impl Into<String>, payload: ExecutionResult) -> Self {
		ServerMessage::Data {
			id: id.into(),
			payload,
		}
	}

	pub fn complete(id: impl Into<String>) -> Self {
		ServerMessage::Complete {
			id: id.into(),
		}
	}

	pub fn error(id: Option<String>, payload: ErrorPayload) -> Self {
		ServerMessage::Error {
			id,
			payload,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
	InvalidMessage,
	UnknownMessageType,
	InvalidPayload,
	InvalidConnectionInit,
	DuplicateId,
	InternalServerError,
}

impl ErrorCode {
	pub fn as_str(&self) -> &'static str {
		match self {
			ErrorCode::InvalidMessage => "INVALID_MESSAGE",
			ErrorCode::UnknownMessageType => "UNKNOWN_MESSAGE_TYPE",
			ErrorCode::InvalidPayload => "INVALID_PAYLOAD",
			ErrorCode::InvalidConnectionInit => "INVALID_CONNECTION_INIT",
			ErrorCode::DuplicateId => "DUPLICATE_ID",
			ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
		}
	}
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Sanitized error sent to a client.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorPayload {
	pub message: String,
	pub code: ErrorCode,
	pub metadata: Map<String, Value>,
}

impl ErrorPayload {
	pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			code,
			metadata: Map::new(),
		}
	}

	pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.metadata.insert(key.into(), value.into());
		self
	}

	pub fn duplicate_id(id: &str) -> Self {
		Self::new(ErrorCode::DuplicateId, format!("Subscriber for {} already exists", id))
			.with_metadata("lastReceivedId", id)
	}

	pub fn internal() -> Self {
		Self::new(ErrorCode::InternalServerError, "Internal server error")
	}
}

/// An inbound message that could not be understood.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolViolation {
	pub code: ErrorCode,
	pub message: String,
	pub message_type: Option<String>,
	pub id: Option<String>,
}

impl ProtocolViolation {
	pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
			message_type: None,
			id: None,
		}
	}

	fn received(mut self, raw: &RawMessage) -> Self {
		self.message_type = raw.kind.clone();
		self.id = raw.id.clone();
		self
	}

	/// The error message reported back to the client.
	pub fn to_payload(&self, protocol_rule: &str) -> ErrorPayload {
		let mut payload = ErrorPayload::new(self.code, self.message.clone());
		if let Some(kind) = &self.message_type {
			payload = payload.with_metadata("lastReceivedType", kind.as_str());
		}
		if let Some(id) = &self.id {
			payload = payload.with_metadata("lastReceivedId", id.as_str());
		}
		payload.with_metadata("protocolRule", protocol_rule)
	}
}

impl fmt::Display for ProtocolViolation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.code, self.message)
	}
}

/// What a codec wants done when the client misbehaves during the handshake.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
	Reply(ServerMessage),
	Close(CloseStatus),
}

/// Wire format and protocol specific rules of one sub-protocol.
///
/// Methods returning `Option` describe messages or actions a protocol may not
/// define; `None` means nothing is sent.
pub trait ProtocolCodec: Send + Sync {
	/// Sub-protocol name as negotiated in `Sec-WebSocket-Protocol`.
	fn name(&self) -> &'static str;

	/// Reference attached to protocol violation errors.
	fn protocol_rule(&self) -> &'static str;

	fn decode(&self, text: &str) -> std::result::Result<ClientMessage, ProtocolViolation>;

	fn encode(&self, message: &ServerMessage) -> Result<String>;

	fn keep_alive(&self) -> Option<ServerMessage>;

	/// Reply to a client stopping a subscription.
	fn stop_acknowledgement(&self, id: &str) -> Option<ServerMessage>;

	/// Sent when the server ends a subscription.
	fn subscription_end(&self, id: &str) -> Option<ServerMessage>;

	/// Close status used when the client fails to initialise in time.
	fn init_timeout(&self) -> Option<CloseStatus>;

	/// Close status used when the client initialises twice.
	fn repeated_init(&self) -> Option<CloseStatus>;

	/// Close status used when an operation starts before the handshake.
	fn unauthorized(&self) -> Option<CloseStatus>;

	fn init_rejected(&self, violation: &ProtocolViolation) -> Rejection;
}

/// Envelope shared by both protocols.
#[derive(Debug, Deserialize)]
pub(crate) struct RawMessage {
	#[serde(rename = "type")]
	pub kind: Option<String>,
	#[serde(default)]
	pub id: Option<String>,
	#[serde(default)]
	pub payload: Option<Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct OutboundMessage<'a> {
	#[serde(rename = "type")]
	pub kind: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<&'a str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub payload: Option<Value>,
}

impl<'a> OutboundMessage<'a> {
	pub fn new(kind: &'static str) -> Self {
		Self {
			kind,
			id: None,
			payload: None,
		}
	}

	pub fn id(mut self, id: &'a str) -> Self {
		self.id = Some(id);
		self
	}

	pub fn payload(mut self, payload: Value) -> Self {
		self.payload = Some(payload);
		self
	}

	pub fn encode(&self) -> Result<String> {
		Ok(serde_json::to_string(self)?)
	}
}

/// Parses the envelope and returns it with its message type.
pub(crate) fn decode_envelope(text: &str) -> std::result::Result<(RawMessage, String), ProtocolViolation> {
	let raw: RawMessage = serde_json::from_str(text)
		.map_err(|e| ProtocolViolation::new(ErrorCode::InvalidMessage, format!("Invalid message: {}", e)))?;
	let Some(kind) = raw.kind.clone() else {
		return Err(ProtocolViolation::new(ErrorCode::InvalidMessage, "Message is missing a 'type'")
			.received(&raw));
	};
	Ok((raw, kind))
}

pub(crate) fn require_id(raw: &RawMessage) -> std::result::Result<String, ProtocolViolation> {
	match &raw.id {
		Some(id) if !id.is_empty() => Ok(id.clone()),
		_ => Err(ProtocolViolation::new(ErrorCode::InvalidMessage, "Message is missing an 'id'").received(raw)),
	}
}

pub(crate) fn require_query(raw: &RawMessage) -> std::result::Result<GraphQLPayload, ProtocolViolation> {
	let Some(payload) = raw.payload.clone() else {
		return Err(ProtocolViolation::new(ErrorCode::InvalidPayload, "Message is missing a 'payload'")
			.received(raw));
	};
	serde_json::from_value(payload).map_err(|e| {
		ProtocolViolation::new(ErrorCode::InvalidPayload, format!("Invalid payload: {}", e)).received(raw)
	})
}

pub(crate) fn init_payload(raw: &RawMessage) -> std::result::Result<Option<Map<String, Value>>, ProtocolViolation> {
	match &raw.payload {
		None | Some(Value::Null) => Ok(None),
		Some(Value::Object(map)) => Ok(Some(map.clone())),
		Some(_) => Err(ProtocolViolation::new(
			ErrorCode::InvalidConnectionInit,
			"Connection initialisation payload must be an object",
		)
		.received(raw)),
	}
}

pub(crate) fn unknown_type(raw: &RawMessage, kind: &str) -> ProtocolViolation {
	ProtocolViolation::new(ErrorCode::UnknownMessageType, format!("Unknown message type '{}'", kind)).received(raw)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn test_codec_for() {
		assert_eq!(codec_for(GRAPHQL_WS).unwrap().name(), GRAPHQL_WS);
		assert_eq!(codec_for(GRAPHQL_TRANSPORT_WS).unwrap().name(), GRAPHQL_TRANSPORT_WS);
		assert!(codec_for("mqtt").is_none());
	}

	#[test]
	fn test_envelope_rejects_non_json() {
		let err = decode_envelope("not json").unwrap_err();
		assert_eq!(err.code, ErrorCode::InvalidMessage);
		assert!(err.message_type.is_none());
	}

	#[test]
	fn test_envelope_requires_type() {
		let err = decode_envelope(r#"{"id":"1"}"#).unwrap_err();
		assert_eq!(err.code, ErrorCode::InvalidMessage);
		assert_eq!(err.id.as_deref(), Some("1"));
	}

	#[test]
	fn test_violation_payload_metadata() {
		let (raw, kind) = decode_envelope(r#"{"type":"bogus","id":"7"}"#).unwrap();
		let payload = unknown_type(&raw, &kind).to_payload("https://example.com/rules");

		assert_eq!(payload.code, ErrorCode::UnknownMessageType);
		assert_eq!(payload.message, "Unknown message type 'bogus'");
		assert_eq!(payload.metadata["lastReceivedType"], json!("bogus"));
		assert_eq!(payload.metadata["lastReceivedId"], json!("7"));
		assert_eq!(payload.metadata["protocolRule"], json!("https://example.com/rules"));
	}

	#[test]
	fn test_init_payload_must_be_object() {
		let (raw, _) = decode_envelope(r#"{"type":"connection_init","payload":{"token":"x"}}"#).unwrap();
		assert_eq!(init_payload(&raw).unwrap().unwrap()["token"], json!("x"));

		let (raw, _) = decode_envelope(r#"{"type":"connection_init","payload":null}"#).unwrap();
		assert!(init_payload(&raw).unwrap().is_none());

		let (raw, _) = decode_envelope(r#"{"type":"connection_init","payload":42}"#).unwrap();
		assert_eq!(init_payload(&raw).unwrap_err().code, ErrorCode::InvalidConnectionInit);
	}

	#[test]
	fn test_outbound_skips_absent_fields() {
		let text = OutboundMessage::new("ka").encode().unwrap();
		assert_eq!(text, r#"{"type":"ka"}"#);

		let text = OutboundMessage::new("complete").id("1").encode().unwrap();
		assert_eq!(text, r#"{"type":"complete","id":"1"}"#);
	}
}
