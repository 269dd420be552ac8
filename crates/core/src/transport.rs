// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::fmt;

use async_trait::async_trait;
use graphsub_type::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
	Connecting,
	Open,
	Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
	Text,
	Binary,
	Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseStatus {
	pub code: u16,
	pub reason: String,
}

impl CloseStatus {
	pub const NORMAL: u16 = 1000;
	pub const GOING_AWAY: u16 = 1001;
	pub const PROTOCOL_ERROR: u16 = 1002;
	pub const ABNORMAL: u16 = 1006;
	pub const INTERNAL_ERROR: u16 = 1011;

	pub fn new(code: u16, reason: impl Into<String>) -> Self {
		Self {
			code,
			reason: reason.into(),
		}
	}

	pub fn normal() -> Self {
		Self::new(Self::NORMAL, "Normal closure")
	}

	pub fn going_away(reason: impl Into<String>) -> Self {
		Self::new(Self::GOING_AWAY, reason)
	}
}

impl fmt::Display for CloseStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {}", self.code, self.reason)
	}
}

/// One complete message read from a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFrame {
	pub kind: FrameKind,
	pub payload: Vec<u8>,
	pub close: Option<CloseStatus>,
}

impl TransportFrame {
	pub fn text(text: impl Into<String>) -> Self {
		Self {
			kind: FrameKind::Text,
			payload: text.into().into_bytes(),
			close: None,
		}
	}

	pub fn binary(payload: Vec<u8>) -> Self {
		Self {
			kind: FrameKind::Binary,
			payload,
			close: None,
		}
	}

	pub fn close(status: Option<CloseStatus>) -> Self {
		Self {
			kind: FrameKind::Close,
			payload: Vec::new(),
			close: status,
		}
	}
}

/// Duplex message transport bound to a single client.
///
/// `receive` is only ever called by the connection's receive loop, while `send`
/// may be called concurrently from event delivery and the keep-alive timer.
/// Implementations serialize writes so that each message is written whole.
#[async_trait]
pub trait ClientTransport: Send + Sync + 'static {
	/// Completes the handshake for the negotiated sub-protocol.
	async fn open(&self, protocol: &str) -> Result<()>;

	/// Reads the next complete message. A close handshake yields a frame of
	/// kind [`FrameKind::Close`].
	async fn receive(&self) -> Result<TransportFrame>;

	/// Writes one complete message.
	async fn send(&self, kind: FrameKind, payload: Vec<u8>) -> Result<()>;

	async fn close(&self, status: CloseStatus) -> Result<()>;

	fn state(&self) -> TransportState;

	/// Set once the underlying connection can never be used again.
	fn is_closed_forever(&self) -> bool;
}
