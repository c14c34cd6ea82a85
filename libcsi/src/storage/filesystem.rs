//! tmpfs-staged filesystem storage backend.
//!
//! [`FilesystemStore`] keeps every volume as a directory under a base path
//! that is itself a dedicated tmpfs mount, so payloads never reach persistent
//! disk and disappear on reboot.
//!
//! # On-disk layout
//!
//! ```text
//! <base>/                   # tmpfs mount
//!   <volume-id>/
//!     data/                 # bind-mount source
//!       <filename>          # payload from the volume context
//! ```
//!
//! Creation of `<base>/<volume-id>` is exclusive: when two publishes race for
//! the same id the filesystem lets exactly one of them create it.

use std::fs::{self, DirBuilder, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use tracing::{Span, debug, info, warn};

use super::Storage;
use crate::error::CsiError;
use crate::mount::{MountState, Mounter};
use crate::types::{VolumeContext, VolumeId};

const DIR_MODE: u32 = 0o700;
const FILE_MODE: u32 = 0o644;
const DATA_DIR: &str = "data";
const TMPFS_OPTIONS: [&str; 3] = ["nosuid", "nodev", "mode=0700"];

/// Filesystem-backed store rooted at a tmpfs mount.
#[derive(Debug)]
pub struct FilesystemStore {
    base: PathBuf,
    span: Span,
}

impl FilesystemStore {
    /// Open the store at `base`, creating the directory and mounting a tmpfs
    /// on it unless something is mounted there already.
    ///
    /// Events are emitted under `span`.
    pub fn new<M>(base: impl Into<PathBuf>, mounter: &M, span: Span) -> Result<Self, CsiError>
    where
        M: Mounter + ?Sized,
    {
        let base = base.into();

        match mounter.is_mount_point(&base)? {
            MountState::Mounted => {
                debug!(parent: &span, path = %base.display(), "reusing existing tmpfs");
            }
            state => {
                if state == MountState::Missing {
                    DirBuilder::new()
                        .recursive(true)
                        .mode(DIR_MODE)
                        .create(&base)
                        .map_err(|e| {
                            CsiError::BackendError(format!(
                                "create tmpfs dir {}: {e}",
                                base.display()
                            ))
                        })?;
                }
                mounter.mount(Path::new("tmpfs"), &base, Some("tmpfs"), &TMPFS_OPTIONS)?;
                info!(parent: &span, path = %base.display(), "mounted new tmpfs");
            }
        }

        Ok(Self { base, span })
    }

    /// Root directory of a volume.
    fn volume_root(&self, id: &VolumeId) -> PathBuf {
        self.base.join(&id.0)
    }

    /// Fill a freshly created volume root with the data directory and file.
    fn populate(&self, id: &VolumeId, ctx: &VolumeContext) -> Result<(), CsiError> {
        let data_dir = self.path_for_volume(id);
        DirBuilder::new()
            .mode(DIR_MODE)
            .create(&data_dir)
            .map_err(|e| {
                CsiError::BackendError(format!("create data dir {}: {e}", data_dir.display()))
            })?;

        let file_path = data_dir.join(&ctx.filename);
        debug!(parent: &self.span, path = %file_path.display(), "creating file");

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(FILE_MODE)
            .open(&file_path)
            .map_err(|e| {
                CsiError::BackendError(format!("create file {}: {e}", file_path.display()))
            })?;
        file.write_all(ctx.data.as_bytes()).map_err(|e| {
            CsiError::BackendError(format!("write file {}: {e}", file_path.display()))
        })?;

        Ok(())
    }
}

impl Storage for FilesystemStore {
    fn write_volume(&self, id: &VolumeId, ctx: &VolumeContext) -> Result<bool, CsiError> {
        let root = self.volume_root(id);

        match DirBuilder::new().mode(DIR_MODE).create(&root) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(parent: &self.span, volume_id = %id, "volume already exists");
                return Ok(false);
            }
            Err(e) => {
                return Err(CsiError::BackendError(format!(
                    "create volume dir {}: {e}",
                    root.display()
                )));
            }
        }

        // A half-written volume must not survive: the next write would see
        // "already exists" and never fill it.
        if let Err(e) = self.populate(id, ctx) {
            if let Err(cleanup) = fs::remove_dir_all(&root) {
                warn!(parent: &self.span, volume_id = %id, error = %cleanup, "failed to remove partial volume");
            }
            return Err(e);
        }

        info!(parent: &self.span, volume_id = %id, filename = %ctx.filename, "wrote volume");
        Ok(true)
    }

    fn path_for_volume(&self, id: &VolumeId) -> PathBuf {
        self.volume_root(id).join(DATA_DIR)
    }

    fn list_volumes(&self) -> Result<Vec<VolumeId>, CsiError> {
        let entries = fs::read_dir(&self.base)
            .map_err(|e| CsiError::BackendError(format!("list volumes in {}: {e}", self.base.display())))?;

        let mut volumes = Vec::new();
        for entry in entries {
            let entry = entry.map_err(CsiError::backend)?;
            if !entry.file_type().map_err(CsiError::backend)?.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => volumes.push(VolumeId(name)),
                Err(name) => {
                    warn!(parent: &self.span, ?name, "skipping non UTF-8 volume directory");
                }
            }
        }
        Ok(volumes)
    }

    fn remove_volume(&self, id: &VolumeId) -> Result<(), CsiError> {
        let root = self.volume_root(id);
        match fs::remove_dir_all(&root) {
            Ok(()) => {
                info!(parent: &self.span, volume_id = %id, "removed volume");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CsiError::BackendError(format!(
                "remove volume {}: {e}",
                root.display()
            ))),
        }
    }
}
