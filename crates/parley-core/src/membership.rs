//! Channel membership resolution for fan-out.

use crate::ids::{ChannelId, UserId};
use crate::store::{PersistentStore, StoreError};
use std::sync::Arc;
use tracing::trace;

/// Who a channel message is delivered to, as of the resolver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAudience {
    pub members: Vec<UserId>,
    pub admin: UserId,
}

impl ChannelAudience {
    /// Members ∪ {admin}, deduplicated. Listed members come first in stored
    /// order, then the admin unless already listed.
    #[must_use]
    pub fn targets(&self) -> Vec<UserId> {
        let mut targets: Vec<UserId> = Vec::with_capacity(self.members.len() + 1);
        for user in self.members.iter().chain(std::iter::once(&self.admin)) {
            if !targets.contains(user) {
                targets.push(user.clone());
            }
        }
        targets
    }
}

/// Reads a channel's current audience from the store.
///
/// Nothing is cached: every call is a fresh read, so a member added or
/// removed between two sends is honoured by the second one.
pub struct ChannelMembershipResolver<S: ?Sized> {
    store: Arc<S>,
}

impl<S: PersistentStore + ?Sized> ChannelMembershipResolver<S> {
    /// Create a resolver over `store`.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolve the audience of `channel_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the channel no longer exists.
    pub async fn resolve(&self, channel_id: &ChannelId) -> Result<ChannelAudience, StoreError> {
        let channel = self.store.get_channel(channel_id).await?;
        trace!(channel = %channel_id, members = channel.members.len(), "Resolved channel audience");

        Ok(ChannelAudience {
            members: channel.members,
            admin: channel.admin,
        })
    }
}
