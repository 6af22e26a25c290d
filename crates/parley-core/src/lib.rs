//! # parley-core
//!
//! Presence tracking and message fan-out for the Parley chat server.
//!
//! This crate provides the parts with real concurrency and ordering
//! concerns:
//!
//! - **Presence** - which users hold a live session, and which one
//! - **Membership** - a channel's current audience, read fresh per send
//! - **Fanout** - persist a message, then push it to live recipients
//! - **Session** - transport session lifecycle and the push capability
//! - **Store** - the persistence seam plus an in-memory implementation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   handshake/close   ┌──────────────────┐
//! │   Session   │────────────────────▶│ PresenceRegistry │
//! └─────────────┘                     └──────────────────┘
//!                                              ▲ lookup
//! ┌─────────────┐  send   ┌──────────────┐     │        ┌─────────┐
//! │ ClientEvent │────────▶│    Fanout    │─────┴───────▶│ Emitter │
//! └─────────────┘         └──────────────┘     push     └─────────┘
//!                           │          │
//!                           ▼          ▼
//!                  ┌─────────────┐  ┌──────────────────┐
//!                  │    Store    │◀─│ MembershipResolver│
//!                  └─────────────┘  └──────────────────┘
//! ```

pub mod channel;
pub mod fanout;
pub mod ids;
pub mod membership;
pub mod message;
pub mod presence;
pub mod session;
pub mod store;

pub use channel::{Channel, User};
pub use fanout::{FanoutConfig, FanoutError, FanoutReport, MessageFanoutService};
pub use ids::{ChannelId, MessageId, SessionId, UserId};
pub use membership::{ChannelAudience, ChannelMembershipResolver};
pub use message::{Conversation, EnrichedMessage, Message, MessageBody, MessageError, NewMessage};
pub use presence::PresenceRegistry;
pub use session::{EmitError, Emitter, Session, SessionState};
pub use store::{ChannelWrite, MemoryStore, PersistentStore, StoreError};
