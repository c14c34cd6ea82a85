//! CSI Node service trait.
//!
//! The Node service runs on each worker node and makes ephemeral inline
//! volumes appear inside Pod containers:
//!
//! 1. **Publish**: persist the volume payload on node-local storage and
//!    bind-mount it read-only at the Pod's target path.
//! 2. **Unpublish**: remove the bind-mount and discard the payload.
//!
//! Staging, usage statistics and expansion are part of the CSI surface but
//! are not offered by this plugin.

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::{
    NodeCapability, NodeExpandVolumeRequest, NodeInfo, NodePublishVolumeRequest,
    NodeStageVolumeRequest, NodeUnpublishVolumeRequest, VolumeId, VolumeUsage,
};

/// Node service: local materialize / mount / unmount operations.
#[async_trait]
pub trait CsiNode: Send + Sync {
    /// Stage a volume at a global staging path.
    async fn stage_volume(&self, req: NodeStageVolumeRequest) -> Result<(), CsiError>;

    /// Unstage a volume from its global staging path.
    async fn unstage_volume(
        &self,
        volume_id: &VolumeId,
        staging_target_path: &str,
    ) -> Result<(), CsiError>;

    /// Publish a volume at `req.target_path`.
    ///
    /// This is idempotent: calling it again for the same `target_path` should
    /// succeed without mounting a second time.
    async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError>;

    /// Unpublish a volume from `req.target_path`.
    ///
    /// This is idempotent.
    async fn unpublish_volume(&self, req: NodeUnpublishVolumeRequest) -> Result<(), CsiError>;

    /// Report usage of a published volume.
    async fn get_volume_stats(
        &self,
        volume_id: &VolumeId,
        volume_path: &str,
    ) -> Result<Vec<VolumeUsage>, CsiError>;

    /// Grow a published volume, returning the new capacity in bytes.
    async fn expand_volume(&self, req: NodeExpandVolumeRequest) -> Result<u64, CsiError>;

    /// Advertise optional node RPCs.
    async fn get_capabilities(&self) -> Result<Vec<NodeCapability>, CsiError>;

    /// Return information about the node on which this service is running.
    async fn get_info(&self) -> Result<NodeInfo, CsiError>;
}
