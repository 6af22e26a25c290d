//! # parley-protocol
//!
//! Wire protocol definitions for the Parley realtime chat core.
//!
//! This crate defines the events exchanged between chat clients and the
//! server over a live session, plus the codec used to put them on the wire.
//!
//! ## Events
//!
//! - `sendMessage` / `sendChannelMessage` - client-originated sends
//! - `message.received` / `channel.message.received` - server pushes
//! - `connected` / `error` / `ping` / `pong` - session housekeeping
//!
//! ## Example
//!
//! ```rust
//! use parley_protocol::{codec, ServerEvent};
//!
//! let event = ServerEvent::error(4001, "content is required for text messages");
//!
//! let text = codec::encode_json(&event).unwrap();
//! let decoded: ServerEvent = codec::decode_json(&text).unwrap();
//! assert_eq!(decoded, event);
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode, encode, Encoding, ProtocolError};
pub use events::{
    codes, ChannelMessagePayload, ClientEvent, DirectMessagePayload, MessageType, Party,
    ProfileProjection, SendChannelMessage, SendMessage, ServerEvent, CHANNEL_MESSAGE_RECEIVED,
    MESSAGE_RECEIVED,
};
