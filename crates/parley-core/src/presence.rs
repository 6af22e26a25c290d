//! Presence tracking.
//!
//! The registry answers one question for the fan-out path: is user U
//! reachable for push right now, and through which session. At most one
//! session is registered per user; a newer handshake for the same user
//! supersedes the older one. The superseded session stays connected at the
//! transport level but is no longer addressable for push.

use crate::ids::{SessionId, UserId};
use dashmap::DashMap;
use tracing::debug;

/// In-memory user → session map.
///
/// Holds no durable state. A process restart starts empty and clients are
/// expected to reconnect.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    /// The authoritative mapping used for lookups.
    by_user: DashMap<UserId, SessionId>,
    /// Reverse index so `disconnect` does not scan. May hold stale entries
    /// for superseded sessions until they disconnect.
    by_session: DashMap<SessionId, UserId>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session_id` as the live session for `user_id`.
    ///
    /// Returns the session this call superseded, if any.
    pub(crate) fn connect(&self, user_id: UserId, session_id: SessionId) -> Option<SessionId> {
        self.by_session.insert(session_id.clone(), user_id.clone());
        let previous = self.by_user.insert(user_id.clone(), session_id.clone());

        match &previous {
            Some(old) if old != &session_id => {
                debug!(user = %user_id, session = %session_id, superseded = %old, "Presence: session superseded");
            }
            _ => {
                debug!(user = %user_id, session = %session_id, "Presence: user connected");
            }
        }

        previous.filter(|old| old != &session_id)
    }

    /// Forget `session_id`.
    ///
    /// Only removes the user's entry if it still points at this session, so
    /// a stale disconnect never evicts a newer session. Returns the user
    /// whose presence was removed.
    pub(crate) fn disconnect(&self, session_id: &SessionId) -> Option<UserId> {
        let (_, user_id) = self.by_session.remove(session_id)?;

        let removed = self
            .by_user
            .remove_if(&user_id, |_, current| current == session_id)
            .map(|(user, _)| user);

        if removed.is_some() {
            debug!(user = %user_id, session = %session_id, "Presence: user disconnected");
        } else {
            debug!(user = %user_id, session = %session_id, "Presence: superseded session closed");
        }

        removed
    }

    /// The live session for `user_id`, if the user is reachable.
    #[must_use]
    pub fn lookup(&self, user_id: &UserId) -> Option<SessionId> {
        self.by_user.get(user_id).map(|entry| entry.value().clone())
    }

    /// Whether `user_id` currently has a registered session.
    #[must_use]
    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.by_user.contains_key(user_id)
    }

    /// Number of reachable users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    /// Whether no user is reachable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }
}
