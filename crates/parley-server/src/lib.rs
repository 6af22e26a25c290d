//! # parley-server
//!
//! HTTP and WebSocket front end for the Parley chat core.
//!
//! - `GET /socket?userId=<id>&encoding=json|msgpack` - live session
//! - `GET /api/messages/direct?user1=<id>&user2=<id>` - direct history
//! - `GET /api/channels/{id}/messages` - channel history
//! - `GET /api/users/{id}/channels` - a user's channels
//! - `GET /health` - liveness

pub mod api;
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod seed;

pub use config::Config;
pub use handlers::{build_router, run_server, serve, AppState};
pub use seed::Seed;
