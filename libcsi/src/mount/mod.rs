//! Mount controller capability.
//!
//! [`Mounter`] is the narrow set of mount primitives the storage backends and
//! the volume lifecycle depend on.  Calls are synchronous and may block on
//! syscalls.
//!
//! * [`SystemMounter`]: Linux `mount(2)` / `umount(2)` via `nix`.
//! * [`FakeMounter`]: in-process mount table for tests.

mod fake;
mod system;

use std::path::Path;

use crate::error::CsiError;

pub use fake::{FakeAction, FakeMounter, MountPoint};
pub use system::SystemMounter;

/// Mount options used to publish a volume into a Pod.
pub const PUBLISH_MOUNT_OPTIONS: [&str; 2] = ["bind", "ro"];

/// Outcome of a mount-point query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    /// Something is mounted at the path.
    Mounted,
    /// The path exists but is not a mount point.
    NotMounted,
    /// The path does not exist.
    Missing,
}

/// Mount / unmount / is-mount-point primitives.
pub trait Mounter: Send + Sync {
    /// Inspect `path`.  A missing path is reported as [`MountState::Missing`],
    /// not as an error.
    fn is_mount_point(&self, path: &Path) -> Result<MountState, CsiError>;

    /// Mount `source` on `target`.
    ///
    /// `options` uses the `mount(8)` vocabulary (`bind`, `ro`, `mode=0700`…).
    fn mount(
        &self,
        source: &Path,
        target: &Path,
        fs_type: Option<&str>,
        options: &[&str],
    ) -> Result<(), CsiError>;

    /// Unmount whatever is mounted at `target`.
    fn unmount(&self, target: &Path) -> Result<(), CsiError>;
}
