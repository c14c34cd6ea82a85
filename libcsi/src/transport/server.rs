//! Socket server that runs on each worker node and dispatches incoming CSI
//! requests to the Identity and Node service implementations.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use super::MAX_MESSAGE_BYTES;
use crate::error::CsiError;
use crate::identity::CsiIdentity;
use crate::message::CsiMessage;
use crate::node::CsiNode;

/// How long a client may take to send its whole request.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause after a failed `accept`, so descriptor exhaustion does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A CSI server that accepts Unix socket connections and dispatches
/// [`CsiMessage`] requests to a [`CsiIdentity`] and a [`CsiNode`]
/// implementation.
pub struct CsiServer<I, N> {
    listener: UnixListener,
    socket_path: PathBuf,
    identity: Arc<I>,
    node: Arc<N>,
    read_timeout: Duration,
    shutdown_token: CancellationToken,
    connections: TaskTracker,
}

impl<I, N> CsiServer<I, N>
where
    I: CsiIdentity + 'static,
    N: CsiNode + 'static,
{
    /// Bind a new server to `socket_path`, replacing a stale socket file left
    /// behind by a previous run.
    pub fn bind(
        socket_path: impl Into<PathBuf>,
        identity: Arc<I>,
        node: Arc<N>,
    ) -> Result<Self, CsiError> {
        let socket_path = socket_path.into();

        match std::fs::remove_file(&socket_path) {
            Ok(()) => debug!(path = %socket_path.display(), "removed stale socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CsiError::TransportError(format!(
                    "remove unix socket file {}: {e}",
                    socket_path.display()
                )));
            }
        }

        let listener = UnixListener::bind(&socket_path).map_err(|e| {
            CsiError::TransportError(format!("listen on {}: {e}", socket_path.display()))
        })?;
        info!(path = %socket_path.display(), "CSI server listening");

        Ok(Self {
            listener,
            socket_path,
            identity,
            node,
            read_timeout: DEFAULT_READ_TIMEOUT,
            shutdown_token: CancellationToken::new(),
            connections: TaskTracker::new(),
        })
    }

    /// Limit how long a connection may stay open without delivering a
    /// complete request.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Accept connections until [`shutdown`](Self::shutdown) is called.
    ///
    /// Each accepted connection is handled on its own tracked Tokio task, so
    /// RPCs run concurrently.  A failed `accept` is logged and retried.
    pub async fn serve(&self) -> Result<(), CsiError> {
        loop {
            let accepted = tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    debug!("accept loop stopped");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            let stream = match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let identity = Arc::clone(&self.identity);
            let node = Arc::clone(&self.node);
            let read_timeout = self.read_timeout;
            self.connections.spawn(async move {
                if let Err(e) = Self::handle_stream(stream, &identity, &node, read_timeout).await {
                    error!(error = %e, "CSI stream handler error");
                }
            });
        }
    }

    /// Path of the socket this server listens on.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Stop accepting connections, wait for in-flight requests to be
    /// answered, then remove the socket file.
    pub async fn shutdown(&self) -> Result<(), CsiError> {
        self.shutdown_token.cancel();
        self.connections.close();
        if !self.connections.is_empty() {
            info!(
                in_flight = self.connections.len(),
                "waiting for in-flight requests"
            );
        }
        self.connections.wait().await;

        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(CsiError::transport(e)),
        }
        info!(path = %self.socket_path.display(), "CSI server stopped");
        Ok(())
    }

    /// Process a single connection: read request → dispatch → write response.
    #[instrument(skip_all)]
    async fn handle_stream(
        mut stream: UnixStream,
        identity: &I,
        node: &N,
        read_timeout: Duration,
    ) -> Result<(), CsiError> {
        let mut buf = Vec::new();
        let mut limited = (&mut stream).take(MAX_MESSAGE_BYTES);
        tokio::time::timeout(read_timeout, limited.read_to_end(&mut buf))
            .await
            .map_err(|_| {
                CsiError::TransportError(format!("no complete request within {read_timeout:?}"))
            })?
            .map_err(CsiError::transport)?;

        if buf.is_empty() {
            debug!("connection closed without a request");
            return Ok(());
        }

        let response = match serde_json::from_slice::<CsiMessage>(&buf) {
            Ok(request) => {
                info!(%request, "request received");
                let response = Self::dispatch(identity, node, request).await;
                match &response {
                    CsiMessage::Error(e) if e.is_io_failure() => {
                        error!(error = %e, "failed processing request")
                    }
                    CsiMessage::Error(e) => warn!(error = %e, code = ?e.code(), "request rejected"),
                    other => info!(response = %other, "request completed"),
                }
                response
            }
            Err(e) => {
                warn!(error = %e, "malformed request");
                CsiMessage::Error(CsiError::InvalidArgument(format!("malformed request: {e}")))
            }
        };

        let payload = serde_json::to_vec(&response).map_err(CsiError::internal)?;
        stream
            .write_all(&payload)
            .await
            .map_err(CsiError::transport)?;
        stream.shutdown().await.map_err(CsiError::transport)?;
        Ok(())
    }

    /// Map a [`CsiMessage`] request to the correct trait method call and
    /// wrap the result in a response [`CsiMessage`].
    async fn dispatch(identity: &I, node: &N, request: CsiMessage) -> CsiMessage {
        match request {
            // --- Identity ---------------------------------------------------
            CsiMessage::Probe => match identity.probe().await {
                Ok(ok) => CsiMessage::ProbeResult(ok),
                Err(e) => CsiMessage::Error(e),
            },
            CsiMessage::GetPluginInfo => match identity.get_plugin_info().await {
                Ok(info) => CsiMessage::PluginInfoResponse(info),
                Err(e) => CsiMessage::Error(e),
            },
            CsiMessage::GetPluginCapabilities => match identity.get_plugin_capabilities().await {
                Ok(caps) => CsiMessage::PluginCapabilitiesResponse(caps),
                Err(e) => CsiMessage::Error(e),
            },

            // --- Node -------------------------------------------------------
            CsiMessage::StageVolume(req) => match node.stage_volume(req).await {
                Ok(()) => CsiMessage::Ok,
                Err(e) => CsiMessage::Error(e),
            },
            CsiMessage::UnstageVolume {
                volume_id,
                staging_target_path,
            } => match node.unstage_volume(&volume_id, &staging_target_path).await {
                Ok(()) => CsiMessage::Ok,
                Err(e) => CsiMessage::Error(e),
            },
            CsiMessage::PublishVolume(req) => match node.publish_volume(req).await {
                Ok(()) => CsiMessage::Ok,
                Err(e) => CsiMessage::Error(e),
            },
            CsiMessage::UnpublishVolume(req) => match node.unpublish_volume(req).await {
                Ok(()) => CsiMessage::Ok,
                Err(e) => CsiMessage::Error(e),
            },
            CsiMessage::GetVolumeStats {
                volume_id,
                volume_path,
            } => match node.get_volume_stats(&volume_id, &volume_path).await {
                Ok(usage) => CsiMessage::VolumeStats(usage),
                Err(e) => CsiMessage::Error(e),
            },
            CsiMessage::ExpandVolume(req) => match node.expand_volume(req).await {
                Ok(capacity) => CsiMessage::Capacity(capacity),
                Err(e) => CsiMessage::Error(e),
            },
            CsiMessage::GetNodeCapabilities => match node.get_capabilities().await {
                Ok(caps) => CsiMessage::NodeCapabilitiesResponse(caps),
                Err(e) => CsiMessage::Error(e),
            },
            CsiMessage::GetNodeInfo => match node.get_info().await {
                Ok(info) => CsiMessage::NodeInfoResponse(info),
                Err(e) => CsiMessage::Error(e),
            },

            // --- Response variants should never arrive as requests ----------
            other => {
                warn!(msg = %other, "unexpected message variant received as request");
                CsiMessage::Error(CsiError::InvalidArgument(format!(
                    "unexpected message: {other}"
                )))
            }
        }
    }
}
