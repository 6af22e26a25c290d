//! Channel and user records.

use crate::ids::{ChannelId, MessageId, UserId};
use parley_protocol::ProfileProjection;
use serde::{Deserialize, Serialize};

/// Maximum channel name length.
pub const MAX_CHANNEL_NAME_LENGTH: usize = 256;

/// Validate a channel name.
///
/// # Errors
///
/// Returns an error message if the channel name is invalid.
pub fn validate_channel_name(name: &str) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("Channel name cannot be empty");
    }
    if name.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err("Channel name too long");
    }
    if name.chars().any(char::is_control) {
        return Err("Channel name contains invalid characters");
    }
    Ok(())
}

/// A group conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    #[serde(rename = "_id")]
    pub id: ChannelId,
    pub name: String,
    /// Listed members. The admin may or may not appear here.
    pub members: Vec<UserId>,
    pub admin: UserId,
    /// References to the channel's messages, in append order.
    pub messages: Vec<MessageId>,
    pub created_at: u64,
    /// Refreshed on every membership or message-list mutation.
    pub updated_at: u64,
}

impl Channel {
    /// Whether `user` receives this channel's messages.
    #[must_use]
    pub fn includes(&self, user: &UserId) -> bool {
        &self.admin == user || self.members.contains(user)
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub color: Option<u32>,
}

impl User {
    /// Create a user with only the required fields set.
    #[must_use]
    pub fn new(id: impl Into<UserId>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            first_name: None,
            last_name: None,
            image: None,
            color: None,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    /// The projection embedded into pushed messages.
    #[must_use]
    pub fn profile(&self) -> ProfileProjection {
        ProfileProjection {
            id: self.id.0.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            image: self.image.clone(),
            color: self.color,
        }
    }
}
