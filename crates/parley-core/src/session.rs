//! Transport session lifecycle and the push capability the core needs.
//!
//! ```text
//! Connecting ──handshake──▶ Connected ──close──▶ Disconnected
//! ```
//!
//! There is no reconnecting state. A client that drops opens a brand-new
//! session, which starts again at `Connecting`.

use crate::ids::{SessionId, UserId};
use crate::presence::PresenceRegistry;
use async_trait::async_trait;
use parley_protocol::ServerEvent;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Push delivery errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    /// The session is gone or its outbound queue is closed.
    #[error("Session closed: {0}")]
    SessionClosed(SessionId),

    /// The transport failed to accept the event.
    #[error("Emit failed: {0}")]
    Failed(String),
}

/// Fire-and-forget push to one live session.
///
/// Implementations must preserve per-session ordering: events emitted to
/// the same session are observed in emit order.
#[async_trait]
pub trait Emitter: Send + Sync {
    /// Push `event` to `session`.
    async fn emit(&self, session: &SessionId, event: Arc<ServerEvent>) -> Result<(), EmitError>;
}

/// State of one transport session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Transport is up, handshake not resolved yet.
    Connecting,
    /// Handshake resolved. `user` is `None` for anonymous sessions, which
    /// are never registered and never receive pushes.
    Connected { user: Option<UserId> },
    /// Terminal.
    Disconnected,
}

/// One transport session and its presence registration.
///
/// Dropping a session closes it, so a connection task that returns early
/// still releases its presence entry.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    state: SessionState,
    presence: Arc<PresenceRegistry>,
}

impl Session {
    pub(crate) fn open(id: SessionId, presence: Arc<PresenceRegistry>) -> Self {
        debug!(session = %id, "Session connecting");
        Self {
            id,
            state: SessionState::Connecting,
            presence,
        }
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The user this session was registered for, if any.
    #[must_use]
    pub fn user(&self) -> Option<&UserId> {
        match &self.state {
            SessionState::Connected { user } => user.as_ref(),
            _ => None,
        }
    }

    /// Resolve the handshake.
    ///
    /// With a user id the session is registered for push immediately;
    /// without one it is connected but unreachable. Returns `true` if the
    /// session was registered. Calls outside `Connecting` are ignored.
    pub fn handshake(&mut self, user: Option<UserId>) -> bool {
        if self.state != SessionState::Connecting {
            warn!(session = %self.id, state = ?self.state, "Handshake outside Connecting ignored");
            return false;
        }

        let registered = match &user {
            Some(user_id) => {
                if let Some(old) = self.presence.connect(user_id.clone(), self.id.clone()) {
                    debug!(session = %self.id, superseded = %old, "Earlier session no longer addressable");
                }
                true
            }
            None => {
                warn!(session = %self.id, "User ID not provided during handshake; session will not receive pushes");
                false
            }
        };

        self.state = SessionState::Connected { user };
        registered
    }

    /// Close the session. Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.presence.disconnect(&self.id);
        self.state = SessionState::Disconnected;
        debug!(session = %self.id, "Session disconnected");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
