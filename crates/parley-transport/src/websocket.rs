//! WebSocket framing for axum connections.
//!
//! JSON sessions exchange one event per text frame. MessagePack sessions
//! exchange length-prefixed events in binary frames, possibly several per
//! frame or one split across frames, so inbound binary data is buffered.

use crate::error::TransportError;
use crate::hub::Outbound;
use axum::extract::ws::Message;
use bytes::BytesMut;
use futures_util::{Sink, SinkExt};
use parley_protocol::{codec, ClientEvent, Encoding, ProtocolError, ServerEvent};
use std::fmt::Display;
use tracing::{debug, warn};

/// Default maximum inbound message size (64 KiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// What an inbound WebSocket message amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Zero or more complete client events.
    Events(Vec<ClientEvent>),
    /// The peer is closing.
    Close,
    /// Ping/pong and other control traffic.
    Control,
}

/// Encode an outbound event as a WebSocket message.
///
/// # Errors
///
/// Returns an error if the event cannot be encoded.
pub fn encode_event(event: &ServerEvent, encoding: Encoding) -> Result<Message, TransportError> {
    match encoding {
        Encoding::Json => Ok(Message::Text(codec::encode_json(event)?)),
        Encoding::MessagePack => Ok(Message::Binary(codec::encode(event)?.to_vec())),
    }
}

/// Decodes inbound WebSocket messages into client events.
#[derive(Debug)]
pub struct FrameDecoder {
    read_buffer: BytesMut,
    max_message_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl FrameDecoder {
    /// Create a decoder that rejects messages above `max_message_size` bytes.
    #[must_use]
    pub fn new(max_message_size: usize) -> Self {
        Self {
            read_buffer: BytesMut::with_capacity(4096),
            max_message_size,
        }
    }

    /// Decode one inbound WebSocket message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is too large or does not decode.
    /// A binary decode error discards any buffered partial data.
    pub fn decode(&mut self, message: Message) -> Result<Inbound, TransportError> {
        match message {
            Message::Text(text) => {
                self.check_size(text.len())?;
                let event = codec::decode_json(&text)?;
                Ok(Inbound::Events(vec![event]))
            }
            Message::Binary(data) => {
                self.check_size(data.len())?;
                self.read_buffer.extend_from_slice(&data);

                let mut events = Vec::new();
                loop {
                    if let Err(e) = self.check_buffered() {
                        self.read_buffer.clear();
                        return Err(e);
                    }
                    match codec::decode_from(&mut self.read_buffer) {
                        Ok(Some(event)) => events.push(event),
                        Ok(None) => break,
                        Err(e) => {
                            self.read_buffer.clear();
                            return Err(e.into());
                        }
                    }
                }
                Ok(Inbound::Events(events))
            }
            Message::Close(_) => Ok(Inbound::Close),
            Message::Ping(_) | Message::Pong(_) => Ok(Inbound::Control),
        }
    }

    /// Bytes buffered towards an incomplete binary event.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.read_buffer.len()
    }

    /// Reject a partial event that has already outgrown the limit, or whose
    /// length prefix announces more than the limit allows.
    fn check_buffered(&self) -> Result<(), TransportError> {
        self.check_size(self.read_buffer.len())?;
        if let Some(prefix) = self.read_buffer.get(..codec::LENGTH_PREFIX_SIZE) {
            let mut announced = [0u8; codec::LENGTH_PREFIX_SIZE];
            announced.copy_from_slice(prefix);
            let length = u32::from_be_bytes(announced) as usize;
            self.check_size(length.saturating_add(codec::LENGTH_PREFIX_SIZE))?;
        }
        Ok(())
    }

    fn check_size(&self, len: usize) -> Result<(), TransportError> {
        if len > self.max_message_size {
            warn!(
                "Message too large: {} bytes (max: {})",
                len, self.max_message_size
            );
            return Err(ProtocolError::FrameTooLarge(len).into());
        }
        Ok(())
    }
}

/// Drain a session's outbound queue into its socket.
///
/// Runs until the queue closes (the session was detached) or the socket
/// rejects a write. Events that fail to encode are logged and skipped.
///
/// # Errors
///
/// Returns [`TransportError::SendFailed`] if the socket write fails.
pub async fn pump_outbound<S>(
    mut sink: S,
    mut outbound: Outbound,
    encoding: Encoding,
) -> Result<(), TransportError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(event) = outbound.recv().await {
        let message = match encode_event(&event, encoding) {
            Ok(message) => message,
            Err(e) => {
                warn!(event = event.name(), error = %e, "Dropping event that failed to encode");
                continue;
            }
        };

        sink.send(message)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
    }

    debug!("Outbound queue closed");
    let _ = sink.close().await;
    Ok(())
}
