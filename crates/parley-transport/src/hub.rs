//! Outbound queues for live sessions.

use crate::error::TransportError;
use async_trait::async_trait;
use dashmap::DashMap;
use parley_core::{EmitError, Emitter, SessionId};
use parley_protocol::ServerEvent;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

/// Default per-session outbound queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Receiving half of a session's outbound queue.
pub type Outbound = mpsc::Receiver<Arc<ServerEvent>>;

/// Maps each attached session to its outbound queue.
///
/// Every session gets its own bounded FIFO queue drained by that session's
/// writer task, so pushes to one session are observed in the order they
/// were emitted and a slow socket never blocks fan-out to the others.
/// Delivery is at most once: an event that finds the queue full is dropped
/// and reported as a failed push.
#[derive(Debug)]
pub struct SessionHub {
    sessions: DashMap<SessionId, mpsc::Sender<Arc<ServerEvent>>>,
    capacity: usize,
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}

impl SessionHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty hub whose session queues hold `capacity` events.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Per-session queue capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Create the outbound queue for `session_id`.
    ///
    /// Attaching an id twice replaces the earlier queue, which closes it.
    pub fn attach(&self, session_id: SessionId) -> Outbound {
        let (tx, rx) = mpsc::channel(self.capacity);
        debug!(session = %session_id, "Session attached");
        self.sessions.insert(session_id, tx);
        rx
    }

    /// Drop the outbound queue for `session_id`.
    ///
    /// Returns `true` if the session was attached.
    pub fn detach(&self, session_id: &SessionId) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            debug!(session = %session_id, "Session detached");
        }
        removed
    }

    /// Queue `event` for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the session is not
    /// attached or its writer has gone away, and
    /// [`TransportError::QueueFull`] if the writer has fallen too far behind.
    pub fn send(&self, session_id: &SessionId, event: Arc<ServerEvent>) -> Result<(), TransportError> {
        let tx = self
            .sessions
            .get(session_id)
            .ok_or_else(|| TransportError::ConnectionClosed(session_id.clone()))?;

        trace!(session = %session_id, event = event.name(), "Queueing event");
        tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => {
                warn!(session = %session_id, capacity = self.capacity, "Outbound queue full, dropping event");
                TransportError::QueueFull(session_id.clone())
            }
            TrySendError::Closed(_) => TransportError::ConnectionClosed(session_id.clone()),
        })
    }

    /// Number of attached sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl Emitter for SessionHub {
    async fn emit(&self, session: &SessionId, event: Arc<ServerEvent>) -> Result<(), EmitError> {
        Ok(self.send(session, event)?)
    }
}
