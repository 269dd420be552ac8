// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! In-memory [`ClientTransport`] driven by a scripted [`MemoryClient`].

use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::Duration,
};

use async_trait::async_trait;
use graphsub_core::{ClientTransport, CloseStatus, Error, FrameKind, Result, TransportFrame, TransportState};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::{
	sync::{Mutex as AsyncMutex, mpsc},
	time::{sleep, timeout},
};

/// How long [`MemoryClient::next`] waits for the server.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);

/// A frame the server sent to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
	Text(String),
	Binary(Vec<u8>),
	Close(CloseStatus),
}

impl Outbound {
	pub fn json(&self) -> Option<Value> {
		match self {
			Outbound::Text(text) => serde_json::from_str(text).ok(),
			_ => None,
		}
	}
}

pub struct MemoryTransport {
	inbound: AsyncMutex<mpsc::UnboundedReceiver<TransportFrame>>,
	outbound: mpsc::UnboundedSender<Outbound>,
	state: Mutex<TransportState>,
	protocol: Mutex<Option<String>>,
	fail_sends: AtomicBool,
	slow_sends: Mutex<Option<(String, Duration)>>,
	close_delay: Mutex<Option<Duration>>,
	sent: AtomicUsize,
}

impl MemoryTransport {
	/// A transport and the client scripting it.
	pub fn pair() -> (Arc<Self>, MemoryClient) {
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let transport = Arc::new(Self {
			inbound: AsyncMutex::new(inbound_rx),
			outbound: outbound_tx,
			state: Mutex::new(TransportState::Connecting),
			protocol: Mutex::new(None),
			fail_sends: AtomicBool::new(false),
			slow_sends: Mutex::new(None),
			close_delay: Mutex::new(None),
			sent: AtomicUsize::new(0),
		});
		let client = MemoryClient {
			inbound: Some(inbound_tx),
			outbound: outbound_rx,
		};
		(transport, client)
	}

	pub fn protocol(&self) -> Option<String> {
		self.protocol.lock().clone()
	}

	/// Makes every following send fail.
	pub fn fail_sends(&self, fail: bool) {
		self.fail_sends.store(fail, Ordering::SeqCst);
	}

	/// Text frames containing `needle` take `delay` to be written. Other sends
	/// are not held up by them.
	pub fn delay_sends_containing(&self, needle: impl Into<String>, delay: Duration) {
		*self.slow_sends.lock() = Some((needle.into(), delay));
	}

	/// The close frame reaches the client `delay` after the transport has
	/// been marked closed.
	pub fn delay_close(&self, delay: Duration) {
		*self.close_delay.lock() = Some(delay);
	}

	/// Frames successfully sent to the client.
	pub fn sent(&self) -> usize {
		self.sent.load(Ordering::SeqCst)
	}

	fn set_state(&self, state: TransportState) {
		*self.state.lock() = state;
	}
}

#[async_trait]
impl ClientTransport for MemoryTransport {
	async fn open(&self, protocol: &str) -> Result<()> {
		let mut state = self.state.lock();
		match *state {
			TransportState::Connecting => {
				*state = TransportState::Open;
				*self.protocol.lock() = Some(protocol.to_string());
				Ok(())
			}
			TransportState::Open => Ok(()),
			TransportState::Closed => Err(Error::transport("memory transport is closed")),
		}
	}

	async fn receive(&self) -> Result<TransportFrame> {
		let frame = self.inbound.lock().await.recv().await;
		match frame {
			Some(frame) => {
				if frame.kind == FrameKind::Close {
					self.set_state(TransportState::Closed);
				}
				Ok(frame)
			}
			None => {
				self.set_state(TransportState::Closed);
				Ok(TransportFrame::close(Some(CloseStatus::new(CloseStatus::ABNORMAL, "Client went away"))))
			}
		}
	}

	async fn send(&self, kind: FrameKind, payload: Vec<u8>) -> Result<()> {
		if *self.state.lock() != TransportState::Open {
			return Err(Error::transport("memory transport is not open"));
		}
		if self.fail_sends.load(Ordering::SeqCst) {
			return Err(Error::transport("send failed"));
		}
		let frame = match kind {
			FrameKind::Text => {
				let text = String::from_utf8(payload).map_err(Error::transport)?;
				let delay = self
					.slow_sends
					.lock()
					.as_ref()
					.and_then(|(needle, delay)| text.contains(needle.as_str()).then_some(*delay));
				if let Some(delay) = delay {
					sleep(delay).await;
				}
				Outbound::Text(text)
			}
			FrameKind::Binary => Outbound::Binary(payload),
			FrameKind::Close => return self.close(CloseStatus::normal()).await,
		};
		self.outbound.send(frame).map_err(|_| Error::transport("client went away"))?;
		self.sent.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	async fn close(&self, status: CloseStatus) -> Result<()> {
		{
			let mut state = self.state.lock();
			if *state == TransportState::Closed {
				return Ok(());
			}
			*state = TransportState::Closed;
		}
		let delay = *self.close_delay.lock();
		if let Some(delay) = delay {
			sleep(delay).await;
		}
		// the client may already be gone
		let _ = self.outbound.send(Outbound::Close(status));
		Ok(())
	}

	fn state(&self) -> TransportState {
		*self.state.lock()
	}

	fn is_closed_forever(&self) -> bool {
		*self.state.lock() == TransportState::Closed
	}
}

/// The client end of a [`MemoryTransport`].
pub struct MemoryClient {
	inbound: Option<mpsc::UnboundedSender<TransportFrame>>,
	outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl MemoryClient {
	pub fn send_text(&self, text: impl Into<String>) {
		self.push(TransportFrame::text(text));
	}

	pub fn send_json(&self, message: Value) {
		self.send_text(message.to_string());
	}

	pub fn send_binary(&self, payload: Vec<u8>) {
		self.push(TransportFrame::binary(payload));
	}

	/// Sends a close frame.
	pub fn close(&self, status: CloseStatus) {
		self.push(TransportFrame::close(Some(status)));
	}

	/// Drops the connection without a close frame.
	pub fn disconnect(&mut self) {
		self.inbound = None;
	}

	fn push(&self, frame: TransportFrame) {
		if let Some(inbound) = &self.inbound {
			let _ = inbound.send(frame);
		}
	}

	/// Next frame sent by the server, `None` after [`RECEIVE_TIMEOUT`].
	pub async fn next(&mut self) -> Option<Outbound> {
		timeout(RECEIVE_TIMEOUT, self.outbound.recv()).await.ok().flatten()
	}

	/// Next frame if one is already waiting.
	pub fn try_next(&mut self) -> Option<Outbound> {
		self.outbound.try_recv().ok()
	}

	/// Next message, parsed.
	///
	/// # Panics
	/// Panics if the server sends nothing in time or sends something other
	/// than a JSON text frame.
	pub async fn next_json(&mut self) -> Value {
		match self.next().await {
			Some(Outbound::Text(text)) => match serde_json::from_str(&text) {
				Ok(value) => value,
				Err(err) => panic!("server sent invalid json {}: {}", text, err),
			},
			Some(other) => panic!("expected a text frame, got {:?}", other),
			None => panic!("server sent nothing within {:?}", RECEIVE_TIMEOUT),
		}
	}

	/// Waits for the server to close the connection.
	///
	/// # Panics
	/// Panics if the next frame is not a close frame.
	pub async fn next_close(&mut self) -> CloseStatus {
		match self.next().await {
			Some(Outbound::Close(status)) => status,
			Some(other) => panic!("expected a close frame, got {:?}", other),
			None => panic!("server did not close within {:?}", RECEIVE_TIMEOUT),
		}
	}

	/// Collects every message until the server closes or goes quiet.
	pub async fn drain(&mut self) -> Vec<Outbound> {
		let mut frames = Vec::new();
		while let Some(frame) = self.next().await {
			let closed = matches!(frame, Outbound::Close(_));
			frames.push(frame);
			if closed {
				break;
			}
		}
		frames
	}
}
