//! Trust-on-first-use bootstrap of the root certificate.
//!
//! A client that has never talked to the server cannot validate its TLS
//! certificate yet, so the server exposes the root certificate on a separate,
//! unauthenticated TCP port:
//!
//! ```text
//! client -> server   "HELLO"                      (5 ASCII bytes)
//! server -> client   u32 big-endian length || PEM bytes of ca_cert.pem
//! ```
//!
//! The server closes the connection after the reply. Any other probe is
//! dropped without a response. This exchange can be intercepted; it replaces
//! nothing but the very first contact, and every later request goes over TLS
//! validated against the fetched root.

pub mod client;
pub mod server;

use std::time::Duration;

pub use client::{cache_key, fetch_ca, parse_ca, CaCache};
pub use server::BootstrapServer;

/// Literal probe a client sends to request the root certificate.
pub const HELLO: &[u8; 5] = b"HELLO";

/// Largest certificate payload a client accepts.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// How long the server waits on a single peer (probe read or reply write).
pub const PEER_DEADLINE: Duration = Duration::from_secs(5);

/// Client-side bootstrap failures. All are recoverable by retrying.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// No complete response within the caller's timeout
    #[error("no CA certificate received within {0:?}")]
    Timeout(Duration),

    /// Connect, send or receive failed
    #[error("bootstrap transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The response was framed wrong or is not a certificate
    #[error("malformed bootstrap response: {0}")]
    Malformed(String),
}
