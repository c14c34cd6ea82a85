//! Node service backed by [`VolumeLifecycle`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::error::CsiError;
use crate::lifecycle::VolumeLifecycle;
use crate::mount::Mounter;
use crate::node::CsiNode;
use crate::types::{
    NodeCapability, NodeExpandVolumeRequest, NodeInfo, NodePublishVolumeRequest,
    NodeStageVolumeRequest, NodeUnpublishVolumeRequest, VolumeId, VolumeUsage,
};

/// [`CsiNode`] implementation for ephemeral inline volumes.
///
/// Only publish / unpublish do real work.  Staging, stats and expansion are
/// reported as unimplemented.
#[derive(Debug)]
pub struct NodeServer<M> {
    node_id: String,
    lifecycle: Arc<VolumeLifecycle<M>>,
}

impl<M: Mounter + 'static> NodeServer<M> {
    /// `node_id` is echoed verbatim by [`CsiNode::get_info`], even if empty.
    pub fn new(node_id: impl Into<String>, lifecycle: VolumeLifecycle<M>) -> Self {
        Self {
            node_id: node_id.into(),
            lifecycle: Arc::new(lifecycle),
        }
    }

    pub fn lifecycle(&self) -> &VolumeLifecycle<M> {
        &self.lifecycle
    }

    /// Run a blocking lifecycle step off the async worker threads.
    async fn blocking<F>(&self, f: F) -> Result<(), CsiError>
    where
        F: FnOnce(&VolumeLifecycle<M>) -> Result<(), CsiError> + Send + 'static,
    {
        let lifecycle = Arc::clone(&self.lifecycle);
        tokio::task::spawn_blocking(move || f(&lifecycle))
            .await
            .map_err(CsiError::internal)?
    }
}

#[async_trait]
impl<M: Mounter + 'static> CsiNode for NodeServer<M> {
    async fn stage_volume(&self, _req: NodeStageVolumeRequest) -> Result<(), CsiError> {
        Err(CsiError::Unimplemented("NodeStageVolume".into()))
    }

    async fn unstage_volume(
        &self,
        _volume_id: &VolumeId,
        _staging_target_path: &str,
    ) -> Result<(), CsiError> {
        Err(CsiError::Unimplemented("NodeUnstageVolume".into()))
    }

    #[instrument(skip_all, fields(volume_id = %req.volume_id))]
    async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError> {
        self.blocking(move |lifecycle| lifecycle.publish_volume(&req))
            .await
    }

    #[instrument(skip_all, fields(volume_id = %req.volume_id))]
    async fn unpublish_volume(&self, req: NodeUnpublishVolumeRequest) -> Result<(), CsiError> {
        self.blocking(move |lifecycle| lifecycle.unpublish_volume(&req))
            .await
    }

    async fn get_volume_stats(
        &self,
        _volume_id: &VolumeId,
        _volume_path: &str,
    ) -> Result<Vec<VolumeUsage>, CsiError> {
        Err(CsiError::Unimplemented("NodeGetVolumeStats".into()))
    }

    async fn expand_volume(&self, _req: NodeExpandVolumeRequest) -> Result<u64, CsiError> {
        Err(CsiError::Unimplemented("NodeExpandVolume".into()))
    }

    async fn get_capabilities(&self) -> Result<Vec<NodeCapability>, CsiError> {
        Ok(vec![NodeCapability::Unknown])
    }

    async fn get_info(&self) -> Result<NodeInfo, CsiError> {
        Ok(NodeInfo {
            node_id: self.node_id.clone(),
        })
    }
}
