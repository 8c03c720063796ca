//! WebSocket transport for subscription streams.
//!
//! `GET /ws?token=...` opens the caller's event stream. Every hub message is
//! written as one JSON text frame: `{"type":"subscribed"}` first, then the
//! broadcast events in commit order.

pub mod actor;
pub mod handler;

/// Session token missing, unknown or not connected.
pub const CLOSE_INVALID_SESSION: u16 = 4002;

/// The hub ended the stream (logout, ban, removal, replacement or lag).
pub const CLOSE_SUBSCRIPTION_ENDED: u16 = 4003;
