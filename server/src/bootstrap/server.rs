use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::{HELLO, PEER_DEADLINE};

/// Serves the root certificate to untrusted peers.
///
/// The certificate bytes are owned by the value, so several servers (for
/// example in tests) can run side by side with different roots.
#[derive(Clone)]
pub struct BootstrapServer {
    ca_pem: Arc<[u8]>,
}

impl BootstrapServer {
    pub fn new(ca_pem: impl Into<Arc<[u8]>>) -> Self {
        Self {
            ca_pem: ca_pem.into(),
        }
    }

    /// Accept peers until the listener fails.
    ///
    /// Each peer is handled on its own task; a failure talking to one peer is
    /// logged and never stops the accept loop.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "Bootstrap listener started");

        loop {
            let (stream, peer) = listener.accept().await?;
            let ca_pem = self.ca_pem.clone();
            tokio::spawn(async move {
                handle_peer(stream, peer, ca_pem).await;
            });
        }
    }

    /// Run [`serve`](Self::serve) on a background task.
    pub fn spawn(self, listener: TcpListener) -> JoinHandle<std::io::Result<()>> {
        tokio::spawn(self.serve(listener))
    }
}

async fn handle_peer(mut stream: TcpStream, peer: SocketAddr, ca_pem: Arc<[u8]>) {
    let mut probe = [0u8; HELLO.len()];
    match timeout(PEER_DEADLINE, stream.read_exact(&mut probe)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            tracing::debug!(peer = %peer, error = %e, "Bootstrap probe read failed");
            return;
        }
        Err(_) => {
            tracing::debug!(peer = %peer, "Bootstrap probe timed out");
            return;
        }
    }

    if &probe != HELLO {
        tracing::debug!(peer = %peer, "Ignoring unexpected bootstrap probe");
        return;
    }

    tracing::info!(peer = %peer.ip(), "CA certificate request");

    match timeout(PEER_DEADLINE, write_frame(&mut stream, &ca_pem)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(peer = %peer, error = %e, "Failed to send CA certificate");
        }
        Err(_) => {
            tracing::warn!(peer = %peer, "Timed out sending CA certificate");
        }
    }
}

/// Write a length-prefixed frame and close our half of the connection.
async fn write_frame(stream: &mut TcpStream, payload: &[u8]) -> std::io::Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "certificate too large to frame",
        )
    })?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(payload).await?;
    stream.shutdown().await
}
