//! # parley-transport
//!
//! Adapter glue between live transport sessions and the fan-out core.
//!
//! - **SessionHub** - session id → outbound queue; the core pushes through
//!   it via the `Emitter` trait
//! - **WebSocket** - encode outbound events and decode inbound frames for
//!   axum WebSocket connections, in the encoding picked at handshake
//!
//! ```rust,ignore
//! use parley_transport::{websocket, SessionHub};
//!
//! let rx = hub.attach(session_id.clone());
//! let writer = tokio::spawn(websocket::pump_outbound(sink, rx, encoding));
//! ```

pub mod error;
pub mod hub;
pub mod websocket;

pub use error::TransportError;
pub use hub::SessionHub;
pub use websocket::Inbound;
