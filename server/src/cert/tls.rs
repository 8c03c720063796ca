//! TLS acceptor configuration built from the server's leaf certificate.

use axum_server::tls_openssl::OpenSSLConfig;

use super::{CertError, LeafCertificate};

/// Build the axum-server TLS config presenting `leaf` during the handshake.
///
/// Clients validate it against the root they fetched during bootstrap, so the
/// leaf alone is served (no chain file).
pub fn server_tls_config(leaf: &LeafCertificate) -> Result<OpenSSLConfig, CertError> {
    OpenSSLConfig::from_pem(&leaf.cert_pem, &leaf.key_pem)
        .map_err(|e| CertError::Tls(std::io::Error::other(e.to_string())))
}
