//! Volume lifecycle: publish / unpublish state transitions.
//!
//! Nothing is persisted here.  Every call recomputes where a volume stands
//! from the storage backend and the mount table, which is what makes both
//! operations safe to repeat.
//!
//! Publish arms a rollback as soon as the payload is stored.  Any later
//! failure unmounts the target and removes the volume on a best-effort basis
//! before the original error is returned.  Unpublish needs no rollback: each
//! of its steps is idempotent, so a retry converges.

use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

use scopeguard::ScopeGuard;
use tracing::{Span, debug, info, info_span, warn};

use crate::error::CsiError;
use crate::mount::{MountState, Mounter, PUBLISH_MOUNT_OPTIONS};
use crate::storage::{Storage, StorageBackend};
use crate::types::{NodePublishVolumeRequest, NodeUnpublishVolumeRequest, VolumeContext};

const TARGET_DIR_MODE: u32 = 0o750;

/// Orchestrates a [`StorageBackend`] and a [`Mounter`].
///
/// Safe to call from many tasks at once; the only shared state lives in the
/// backend.
#[derive(Debug)]
pub struct VolumeLifecycle<M> {
    storage: StorageBackend,
    mounter: M,
    span: Span,
}

impl<M: Mounter> VolumeLifecycle<M> {
    /// Events are emitted under `span`.
    pub fn new(storage: StorageBackend, mounter: M, span: Span) -> Self {
        Self {
            storage,
            mounter,
            span,
        }
    }

    pub fn storage(&self) -> &StorageBackend {
        &self.storage
    }

    pub fn mounter(&self) -> &M {
        &self.mounter
    }

    /// Store the volume payload and bind-mount it read-only at the target.
    ///
    /// Succeeds without a second mount if the target is already mounted.
    pub fn publish_volume(&self, req: &NodePublishVolumeRequest) -> Result<(), CsiError> {
        req.volume_id.validate()?;
        if req.target_path.is_empty() {
            return Err(CsiError::InvalidArgument("target path must not be empty".into()));
        }
        let ctx = VolumeContext::from_map(&req.volume_context)?;
        let target = Path::new(&req.target_path);

        let span = info_span!(
            parent: &self.span,
            "publish_volume",
            volume_id = %req.volume_id,
            target_path = %req.target_path,
            pod_name = ctx.pod_name.as_deref().unwrap_or_default(),
        );
        let _entered = span.enter();

        let created = self.storage.write_volume(&req.volume_id, &ctx)?;
        debug!(created, "volume stored in backend");

        let rollback = scopeguard::guard((), |()| {
            warn!("publish failed, rolling back");
            if let Err(e) = self.mounter.unmount(target) {
                debug!(error = %e, "rollback unmount");
            }
            if let Err(e) = self.storage.remove_volume(&req.volume_id) {
                warn!(error = %e, "rollback failed to remove volume");
            }
        });

        let mounted = match self.mounter.is_mount_point(target)? {
            MountState::Mounted => true,
            MountState::NotMounted => false,
            MountState::Missing => {
                create_target_dir(target)?;
                false
            }
        };

        if mounted {
            info!("volume is already mounted to pod, nothing to do");
        } else {
            let source = self.storage.path_for_volume(&req.volume_id);
            debug!(source = %source.display(), "bind mounting data directory into pod");
            self.mounter
                .mount(&source, target, None, &PUBLISH_MOUNT_OPTIONS)?;
            info!("volume published");
        }

        ScopeGuard::into_inner(rollback);
        Ok(())
    }

    /// Unmount the target if needed and discard the volume.
    pub fn unpublish_volume(&self, req: &NodeUnpublishVolumeRequest) -> Result<(), CsiError> {
        req.volume_id.validate()?;
        if req.target_path.is_empty() {
            return Err(CsiError::InvalidArgument("target path must not be empty".into()));
        }
        let target = Path::new(&req.target_path);

        let span = info_span!(
            parent: &self.span,
            "unpublish_volume",
            volume_id = %req.volume_id,
            target_path = %req.target_path,
        );
        let _entered = span.enter();

        match self.mounter.is_mount_point(target)? {
            MountState::Mounted => self.mounter.unmount(target)?,
            MountState::NotMounted | MountState::Missing => {
                debug!("target not mounted, skipping unmount");
            }
        }

        self.storage.remove_volume(&req.volume_id)?;

        info!("volume unpublished");
        Ok(())
    }
}

fn create_target_dir(target: &Path) -> Result<(), CsiError> {
    DirBuilder::new()
        .recursive(true)
        .mode(TARGET_DIR_MODE)
        .create(target)
        .map_err(|e| CsiError::MountFailed {
            path: target.display().to_string(),
            reason: format!("create target dir: {e}"),
        })
}
