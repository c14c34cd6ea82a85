//! Client used to issue CSI requests to a node plugin socket.

use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{debug, instrument};

use super::MAX_MESSAGE_BYTES;
use crate::error::CsiError;
use crate::message::CsiMessage;

/// A lightweight CSI client.  Every [`request`](Self::request) opens a fresh
/// connection to the plugin socket.
#[derive(Debug, Clone)]
pub struct CsiClient {
    socket_path: PathBuf,
}

impl CsiClient {
    /// Create a client for the plugin socket at `socket_path`.
    ///
    /// Fails if `socket_path` is not a Unix socket.
    pub async fn connect(socket_path: impl AsRef<Path>) -> Result<Self, CsiError> {
        let socket_path = socket_path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&socket_path).await.map_err(|e| {
            CsiError::TransportError(format!("stat {}: {e}", socket_path.display()))
        })?;
        if !meta.file_type().is_socket() {
            return Err(CsiError::TransportError(format!(
                "{} is not a unix socket",
                socket_path.display()
            )));
        }
        debug!(socket = %socket_path.display(), "CSI socket found");
        Ok(Self { socket_path })
    }

    /// Send a request and wait for the corresponding response.
    #[instrument(skip(self), fields(msg = %msg))]
    pub async fn request(&self, msg: &CsiMessage) -> Result<CsiMessage, CsiError> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(CsiError::transport)?;

        // Serialize, send and half-close so the server sees EOF.
        let payload = serde_json::to_vec(msg).map_err(CsiError::internal)?;
        stream
            .write_all(&payload)
            .await
            .map_err(CsiError::transport)?;
        stream.shutdown().await.map_err(CsiError::transport)?;

        let mut buf = Vec::new();
        (&mut stream)
            .take(MAX_MESSAGE_BYTES)
            .read_to_end(&mut buf)
            .await
            .map_err(CsiError::transport)?;

        let response: CsiMessage = serde_json::from_slice(&buf).map_err(CsiError::transport)?;
        debug!(%response, "CSI response received");
        Ok(response)
    }
}
