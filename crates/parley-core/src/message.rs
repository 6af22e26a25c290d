//! Message types.
//!
//! A message belongs to exactly one conversation, either a direct exchange
//! with one recipient or a channel. That is encoded in [`Conversation`]
//! rather than in a pair of optional fields.

use crate::ids::{ChannelId, MessageId, UserId};
use parley_protocol::{
    ChannelMessagePayload, DirectMessagePayload, MessageType, Party, ServerEvent,
};
use serde::ser::{Serialize, Serializer};
use thiserror::Error;

/// Why a message body was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// Text message without content.
    #[error("content is required for text messages")]
    MissingContent,

    /// File message without a file URL.
    #[error("fileUrl is required for file messages")]
    MissingFileUrl,

    /// Text message that carries a file URL.
    #[error("fileUrl is only allowed on file messages")]
    UnexpectedFileUrl,

    /// Content longer than the configured limit.
    #[error("content length {len} exceeds maximum {max}")]
    ContentTooLong { len: usize, max: usize },
}

/// The conversation a message belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Conversation {
    /// One-to-one message.
    Direct { recipient: UserId },
    /// Message addressed to a channel.
    Channel { channel_id: ChannelId },
}

/// Validated message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Plain text.
    Text { content: String },
    /// Uploaded file with an optional caption.
    File {
        file_url: String,
        content: Option<String>,
    },
}

impl MessageBody {
    /// Build a body from the loose fields a client sends.
    ///
    /// # Errors
    ///
    /// Returns an error if the fields do not match the message type.
    pub fn from_parts(
        message_type: MessageType,
        content: Option<String>,
        file_url: Option<String>,
    ) -> Result<Self, MessageError> {
        let content = content.filter(|c| !c.is_empty());
        let file_url = file_url.filter(|u| !u.is_empty());

        match message_type {
            MessageType::Text => {
                if file_url.is_some() {
                    return Err(MessageError::UnexpectedFileUrl);
                }
                let content = content.ok_or(MessageError::MissingContent)?;
                Ok(MessageBody::Text { content })
            }
            MessageType::File => {
                let file_url = file_url.ok_or(MessageError::MissingFileUrl)?;
                Ok(MessageBody::File { file_url, content })
            }
        }
    }

    /// Reject content longer than `max` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::ContentTooLong`] when over the limit.
    pub fn check_length(&self, max: usize) -> Result<(), MessageError> {
        match self.content() {
            Some(content) if content.len() > max => Err(MessageError::ContentTooLong {
                len: content.len(),
                max,
            }),
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageBody::Text { .. } => MessageType::Text,
            MessageBody::File { .. } => MessageType::File,
        }
    }

    #[must_use]
    pub fn content(&self) -> Option<&str> {
        match self {
            MessageBody::Text { content } => Some(content),
            MessageBody::File { content, .. } => content.as_deref(),
        }
    }

    #[must_use]
    pub fn file_url(&self) -> Option<&str> {
        match self {
            MessageBody::Text { .. } => None,
            MessageBody::File { file_url, .. } => Some(file_url),
        }
    }
}

/// A message that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender: UserId,
    pub conversation: Conversation,
    pub body: MessageBody,
}

/// A persisted message. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender: UserId,
    pub conversation: Conversation,
    pub body: MessageBody,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl Message {
    /// Recipient of a direct message.
    #[must_use]
    pub fn recipient(&self) -> Option<&UserId> {
        match &self.conversation {
            Conversation::Direct { recipient } => Some(recipient),
            Conversation::Channel { .. } => None,
        }
    }

    /// Channel of a channel message.
    #[must_use]
    pub fn channel_id(&self) -> Option<&ChannelId> {
        match &self.conversation {
            Conversation::Direct { .. } => None,
            Conversation::Channel { channel_id } => Some(channel_id),
        }
    }

    /// Whether this is a direct message between `a` and `b`, in either direction.
    #[must_use]
    pub fn is_between(&self, a: &UserId, b: &UserId) -> bool {
        match self.recipient() {
            Some(recipient) => {
                (&self.sender == a && recipient == b) || (&self.sender == b && recipient == a)
            }
            None => false,
        }
    }
}

/// History records use the same flat field names as the push payloads.
impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(serde::Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Record<'a> {
            #[serde(rename = "_id")]
            id: &'a MessageId,
            sender: &'a UserId,
            #[serde(skip_serializing_if = "Option::is_none")]
            recipient: Option<&'a UserId>,
            #[serde(skip_serializing_if = "Option::is_none")]
            channel_id: Option<&'a ChannelId>,
            #[serde(skip_serializing_if = "Option::is_none")]
            content: Option<&'a str>,
            message_type: MessageType,
            #[serde(skip_serializing_if = "Option::is_none")]
            file_url: Option<&'a str>,
            timestamp: u64,
        }

        Record {
            id: &self.id,
            sender: &self.sender,
            recipient: self.recipient(),
            channel_id: self.channel_id(),
            content: self.body.content(),
            message_type: self.body.message_type(),
            file_url: self.body.file_url(),
            timestamp: self.timestamp,
        }
        .serialize(serializer)
    }
}

/// A persisted message joined with the profiles of its parties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedMessage {
    pub message: Message,
    pub sender: Party,
    /// Set for direct messages only.
    pub recipient: Option<Party>,
}

impl EnrichedMessage {
    /// Convert into the push event for this message's conversation.
    #[must_use]
    pub fn into_event(self) -> ServerEvent {
        let EnrichedMessage {
            message,
            sender,
            recipient,
        } = self;
        let content = message.body.content().map(str::to_string);
        let file_url = message.body.file_url().map(str::to_string);
        let message_type = message.body.message_type();

        match message.conversation {
            Conversation::Direct { recipient: id } => {
                ServerEvent::MessageReceived(DirectMessagePayload {
                    id: message.id.0,
                    sender,
                    recipient: recipient.unwrap_or(Party::Id(id.0)),
                    content,
                    message_type,
                    file_url,
                    timestamp: message.timestamp,
                })
            }
            Conversation::Channel { channel_id } => {
                ServerEvent::ChannelMessageReceived(ChannelMessagePayload {
                    id: message.id.0,
                    sender,
                    content,
                    message_type,
                    file_url,
                    timestamp: message.timestamp,
                    channel_id: channel_id.0,
                })
            }
        }
    }
}
