//! Private certificate authority for the chat server.
//!
//! The server owns a self-signed root (`ca_cert.pem` / `ca_key.pem`) that is
//! generated once and reused across restarts, and a leaf certificate for its
//! own domain (`server_cert.pem` / `server_key.pem`) signed by that root.
//! Clients learn the root through the bootstrap protocol and use it to
//! validate the leaf during the TLS handshake.

pub mod authority;
pub mod tls;

use std::path::PathBuf;

use openssl::error::ErrorStack;

pub use authority::{
    ensure_leaf, ensure_root, issue_leaf, LeafCertificate, RootAuthority, TrustMaterial,
};

/// Root certificate file name inside the certificate directory.
pub const CA_CERT_FILE: &str = "ca_cert.pem";
/// Root private key file name inside the certificate directory.
pub const CA_KEY_FILE: &str = "ca_key.pem";
/// Leaf certificate file name inside the certificate directory.
pub const SERVER_CERT_FILE: &str = "server_cert.pem";
/// Leaf private key file name inside the certificate directory.
pub const SERVER_KEY_FILE: &str = "server_key.pem";

/// Errors raised while creating, loading or persisting trust material.
///
/// All of these are fatal at startup: the server cannot accept TLS
/// connections without a root and a leaf.
#[derive(Debug, thiserror::Error)]
pub enum CertError {
    /// Storage could not be read or written
    #[error("certificate storage error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An existing artifact is not valid PEM / X.509 / PKCS#8
    #[error("malformed certificate artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ErrorStack,
    },

    /// The stored certificate does not belong to the stored private key
    #[error("certificate {path} does not match its private key")]
    KeyMismatch { path: PathBuf },

    /// Key pair generation failed
    #[error("key generation failed: {0}")]
    Generate(#[source] ErrorStack),

    /// Building or signing a certificate failed
    #[error("certificate signing failed: {0}")]
    Sign(#[source] ErrorStack),

    /// The TLS acceptor refused the leaf certificate or key
    #[error("TLS configuration failed: {0}")]
    Tls(#[source] std::io::Error),
}
