use std::path::PathBuf;
use std::time::Duration;

use openssl::x509::X509;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::{BootstrapError, HELLO, MAX_FRAME_LEN};
use crate::storage::write_atomic;

/// Fetch the raw root certificate bytes from a bootstrap server.
///
/// `timeout` bounds the whole exchange: connect, probe and response.
pub async fn fetch_ca(server_addr: &str, timeout: Duration) -> Result<Vec<u8>, BootstrapError> {
    match tokio::time::timeout(timeout, exchange(server_addr)).await {
        Ok(result) => result,
        Err(_) => Err(BootstrapError::Timeout(timeout)),
    }
}

async fn exchange(server_addr: &str) -> Result<Vec<u8>, BootstrapError> {
    let mut stream = TcpStream::connect(server_addr).await?;
    stream.write_all(HELLO).await?;

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(BootstrapError::Malformed(format!(
            "frame length {} outside 1..={}",
            len, MAX_FRAME_LEN
        )));
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Parse fetched bytes as a PEM certificate.
pub fn parse_ca(pem: &[u8]) -> Result<X509, BootstrapError> {
    X509::from_pem(pem).map_err(|e| BootstrapError::Malformed(e.to_string()))
}

/// File-name-safe cache key for a server address.
///
/// `chat.example.net:8422` becomes `chat.example.net_8422`; IPv6 brackets
/// and path separators are escaped the same way.
pub fn cache_key(server_addr: &str) -> String {
    server_addr
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' | '[' | ']' => '_',
            c => c,
        })
        .collect()
}

/// On-disk cache of fetched root certificates, one file per server address.
#[derive(Debug, Clone)]
pub struct CaCache {
    dir: PathBuf,
}

impl CaCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, server_addr: &str) -> PathBuf {
        self.dir.join(format!("{}.pem", cache_key(server_addr)))
    }

    /// Cached certificate for `server_addr`, if one has been stored.
    pub fn load(&self, server_addr: &str) -> Result<Option<Vec<u8>>, BootstrapError> {
        let path = self.path_for(server_addr);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Return the cached root for `server_addr`, fetching and storing it on a miss.
    ///
    /// Nothing is written unless the fetched bytes parse as a certificate, and
    /// the write is atomic, so a timeout or crash never leaves a partial file.
    pub async fn load_or_fetch(
        &self,
        server_addr: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>, BootstrapError> {
        if let Some(cached) = self.load(server_addr)? {
            if parse_ca(&cached).is_ok() {
                return Ok(cached);
            }
            tracing::warn!(
                server = %server_addr,
                "Cached CA certificate is unreadable, fetching again"
            );
        }

        let pem = fetch_ca(server_addr, timeout).await?;
        parse_ca(&pem)?;

        let path = self.path_for(server_addr);
        let bytes = pem.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| BootstrapError::Io(std::io::Error::other(e)))??;

        tracing::info!(server = %server_addr, "CA certificate fetched and cached");
        Ok(pem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_escapes_separators() {
        assert_eq!(cache_key("localhost:8422"), "localhost_8422");
        assert_eq!(cache_key("[::1]:8422"), "___1__8422");
        assert_eq!(cache_key("a/b\\c"), "a_b_c");
    }

    #[test]
    fn test_cache_path_is_inside_cache_dir() {
        let cache = CaCache::new("/tmp/cas");
        assert_eq!(
            cache.path_for("10.0.0.1:8422"),
            PathBuf::from("/tmp/cas/10.0.0.1_8422.pem")
        );
    }

    #[test]
    fn test_parse_ca_rejects_garbage() {
        let err = parse_ca(b"not a certificate").unwrap_err();
        assert!(matches!(err, BootstrapError::Malformed(_)));
    }
}
