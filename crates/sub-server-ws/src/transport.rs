// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! [`ClientTransport`] over a tokio-tungstenite websocket.

use async_trait::async_trait;
use futures_util::{
	SinkExt, StreamExt,
	stream::{SplitSink, SplitStream},
};
use graphsub_core::{ClientTransport, CloseStatus, Error, FrameKind, Result, TransportFrame, TransportState};
use parking_lot::Mutex;
use tokio::{
	io::{AsyncRead, AsyncWrite},
	sync::Mutex as AsyncMutex,
};
use tokio_tungstenite::{
	WebSocketStream,
	tungstenite::{
		Message,
		protocol::{CloseFrame, frame::coding::CloseCode},
	},
};
use tracing::trace;

pub struct WebSocketTransport<S> {
	sink: AsyncMutex<SplitSink<WebSocketStream<S>, Message>>,
	stream: AsyncMutex<SplitStream<WebSocketStream<S>>>,
	state: Mutex<TransportState>,
	protocol: Mutex<Option<String>>,
}

impl<S> WebSocketTransport<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	/// Wraps a websocket whose HTTP upgrade has already completed.
	pub fn new(socket: WebSocketStream<S>) -> Self {
		let (sink, stream) = socket.split();
		Self {
			sink: AsyncMutex::new(sink),
			stream: AsyncMutex::new(stream),
			state: Mutex::new(TransportState::Connecting),
			protocol: Mutex::new(None),
		}
	}

	pub fn protocol(&self) -> Option<String> {
		self.protocol.lock().clone()
	}

	fn set_state(&self, state: TransportState) {
		*self.state.lock() = state;
	}
}

#[async_trait]
impl<S> ClientTransport for WebSocketTransport<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	async fn open(&self, protocol: &str) -> Result<()> {
		let mut state = self.state.lock();
		match *state {
			TransportState::Connecting => {
				*state = TransportState::Open;
				*self.protocol.lock() = Some(protocol.to_string());
				Ok(())
			}
			TransportState::Open => Ok(()),
			TransportState::Closed => Err(Error::transport("websocket is closed")),
		}
	}

	async fn receive(&self) -> Result<TransportFrame> {
		let mut stream = self.stream.lock().await;
		loop {
			let message = match stream.next().await {
				Some(Ok(message)) => message,
				Some(Err(err)) => {
					self.set_state(TransportState::Closed);
					return Err(err.into());
				}
				None => {
					self.set_state(TransportState::Closed);
					return Ok(TransportFrame::close(Some(CloseStatus::new(
						CloseStatus::ABNORMAL,
						"Connection closed without a close frame",
					))));
				}
			};

			match message {
				Message::Text(text) => return Ok(TransportFrame::text(text.as_str())),
				Message::Binary(bytes) => return Ok(TransportFrame::binary(bytes.to_vec())),
				Message::Close(frame) => {
					let status = frame.map(|f| CloseStatus::new(u16::from(f.code), f.reason.as_str()));
					self.set_state(TransportState::Closed);
					// push out the close reply queued by tungstenite
					let _ = self.sink.lock().await.flush().await;
					return Ok(TransportFrame::close(status));
				}
				// pings are answered by tungstenite itself
				Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
					trace!("control frame");
				}
			}
		}
	}

	async fn send(&self, kind: FrameKind, payload: Vec<u8>) -> Result<()> {
		if *self.state.lock() != TransportState::Open {
			return Err(Error::transport("websocket is not open"));
		}
		let message = match kind {
			FrameKind::Text => Message::text(String::from_utf8(payload).map_err(Error::transport)?),
			FrameKind::Binary => Message::binary(payload),
			FrameKind::Close => return self.close(CloseStatus::normal()).await,
		};
		self.sink.lock().await.send(message).await.map_err(Error::from)
	}

	async fn close(&self, status: CloseStatus) -> Result<()> {
		{
			let mut state = self.state.lock();
			if *state == TransportState::Closed {
				return Ok(());
			}
			*state = TransportState::Closed;
		}

		let frame = CloseFrame {
			code: CloseCode::from(status.code),
			reason: status.reason.into(),
		};
		self.sink.lock().await.send(Message::Close(Some(frame))).await.map_err(Error::from)
	}

	fn state(&self) -> TransportState {
		*self.state.lock()
	}

	fn is_closed_forever(&self) -> bool {
		*self.state.lock() == TransportState::Closed
	}
}
