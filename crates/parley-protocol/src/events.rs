//! Event types for the Parley protocol.
//!
//! Every event travels inside the same envelope:
//! `{"event": "<name>", "data": { ... }}`. Field names on the wire are
//! camelCase and message/user identities are exposed as `_id`, which is
//! what existing chat clients already consume.

use serde::{Deserialize, Serialize};

/// Event name pushed to direct message participants.
pub const MESSAGE_RECEIVED: &str = "message.received";

/// Event name pushed to channel members.
pub const CHANNEL_MESSAGE_RECEIVED: &str = "channel.message.received";

/// Error codes carried by [`ServerEvent::Error`].
pub mod codes {
    /// The message body failed validation (type/content/file URL mismatch).
    pub const MALFORMED_MESSAGE: u16 = 4001;
    /// The inbound frame could not be decoded into a known event.
    pub const INVALID_EVENT: u16 = 4002;
    /// The store rejected or could not complete the write.
    pub const PERSISTENCE_FAILURE: u16 = 5001;
}

/// Kind of message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Plain text, `content` is required.
    Text,
    /// Uploaded file, `fileUrl` is required.
    File,
}

impl MessageType {
    /// Wire name of the message type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::File => "file",
        }
    }
}

/// Denormalized user profile embedded in pushed messages so the receiving
/// UI needs no follow-up fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileProjection {
    /// User identity.
    #[serde(rename = "_id")]
    pub id: String,
    /// Contact email.
    pub email: String,
    /// Given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Avatar location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Color tag index used for the avatar fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
}

/// A message party: the full profile when the store could resolve it,
/// otherwise the bare user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Party {
    /// Resolved profile.
    Profile(ProfileProjection),
    /// Unresolved user id.
    Id(String),
}

impl Party {
    /// The user id regardless of how the party is represented.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Party::Profile(profile) => &profile.id,
            Party::Id(id) => id,
        }
    }
}

/// Payload of a `message.received` push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessagePayload {
    #[serde(rename = "_id")]
    pub id: String,
    pub sender: Party,
    pub recipient: Party,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// Payload of a `channel.message.received` push.
///
/// Same shape as [`DirectMessagePayload`] with `channelId` instead of
/// `recipient`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMessagePayload {
    #[serde(rename = "_id")]
    pub id: String,
    pub sender: Party,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    pub timestamp: u64,
    pub channel_id: String,
}

/// Inbound `sendMessage` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub sender: String,
    pub recipient: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

/// Inbound `sendChannelMessage` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendChannelMessage {
    pub channel_id: String,
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

/// Events a client may send over its session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Send a direct message.
    #[serde(rename = "sendMessage")]
    SendMessage(SendMessage),

    /// Send a message to every member of a channel.
    #[serde(rename = "sendChannelMessage")]
    SendChannelMessage(SendChannelMessage),

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

/// Events the server pushes to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Sent once, right after the handshake.
    #[serde(rename = "connected")]
    Connected {
        #[serde(rename = "sessionId")]
        session_id: String,
        /// `None` when the handshake carried no user id.
        #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },

    /// A direct message was sent to or by this user.
    #[serde(rename = "message.received")]
    MessageReceived(DirectMessagePayload),

    /// A message was sent to a channel this user belongs to.
    #[serde(rename = "channel.message.received")]
    ChannelMessageReceived(ChannelMessagePayload),

    /// A request from this session was rejected.
    #[serde(rename = "error")]
    Error { code: u16, message: String },

    /// Keepalive response.
    #[serde(rename = "pong")]
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl ServerEvent {
    /// The wire name of this event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::MessageReceived(_) => MESSAGE_RECEIVED,
            ServerEvent::ChannelMessageReceived(_) => CHANNEL_MESSAGE_RECEIVED,
            ServerEvent::Error { .. } => "error",
            ServerEvent::Pong { .. } => "pong",
        }
    }

    /// Create an error event.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code,
            message: message.into(),
        }
    }
}
