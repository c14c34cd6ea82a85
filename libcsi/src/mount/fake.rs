//! In-process mount controller for tests.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::{MountState, Mounter};
use crate::error::CsiError;

/// An entry of the fake mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub source: PathBuf,
    pub target: PathBuf,
    pub fs_type: Option<String>,
    pub options: Vec<String>,
}

/// A mutating call recorded by [`FakeMounter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeAction {
    Mount { source: PathBuf, target: PathBuf },
    Unmount { target: PathBuf },
}

#[derive(Debug, Default)]
struct FakeState {
    mount_points: Vec<MountPoint>,
    log: Vec<FakeAction>,
}

/// Mount controller that keeps its mount table in memory.
///
/// Path existence is still read from the real filesystem, so tests can model
/// a missing target path with a non-existent directory.  Each primitive can
/// be made to fail.
#[derive(Debug, Default)]
pub struct FakeMounter {
    state: Mutex<FakeState>,
    fail_is_mount_point: bool,
    fail_mount: bool,
    fail_unmount: bool,
}

impl FakeMounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `targets` already mounted.
    pub fn with_mount_points(targets: impl IntoIterator<Item = PathBuf>) -> Self {
        let mounter = Self::new();
        mounter.state.lock().mount_points = targets
            .into_iter()
            .map(|target| MountPoint {
                source: PathBuf::new(),
                target,
                fs_type: None,
                options: Vec::new(),
            })
            .collect();
        mounter
    }

    pub fn failing_is_mount_point(mut self) -> Self {
        self.fail_is_mount_point = true;
        self
    }

    pub fn failing_mount(mut self) -> Self {
        self.fail_mount = true;
        self
    }

    pub fn failing_unmount(mut self) -> Self {
        self.fail_unmount = true;
        self
    }

    /// Current mount table.
    pub fn mount_points(&self) -> Vec<MountPoint> {
        self.state.lock().mount_points.clone()
    }

    /// Every mount / unmount call made so far, failed ones included.
    pub fn log(&self) -> Vec<FakeAction> {
        self.state.lock().log.clone()
    }
}

impl Mounter for FakeMounter {
    fn is_mount_point(&self, path: &Path) -> Result<MountState, CsiError> {
        if self.fail_is_mount_point {
            return Err(CsiError::BackendError(format!(
                "inspect mount point {}: injected failure",
                path.display()
            )));
        }
        if !path.exists() {
            return Ok(MountState::Missing);
        }

        let state = self.state.lock();
        Ok(if state.mount_points.iter().any(|mp| mp.target == path) {
            MountState::Mounted
        } else {
            MountState::NotMounted
        })
    }

    fn mount(
        &self,
        source: &Path,
        target: &Path,
        fs_type: Option<&str>,
        options: &[&str],
    ) -> Result<(), CsiError> {
        let mut state = self.state.lock();
        state.log.push(FakeAction::Mount {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
        });

        if self.fail_mount {
            return Err(CsiError::MountFailed {
                path: target.display().to_string(),
                reason: "injected failure".into(),
            });
        }

        state.mount_points.push(MountPoint {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            fs_type: fs_type.map(str::to_owned),
            options: options.iter().map(|o| (*o).to_owned()).collect(),
        });
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<(), CsiError> {
        let mut state = self.state.lock();
        state.log.push(FakeAction::Unmount {
            target: target.to_path_buf(),
        });

        if self.fail_unmount {
            return Err(CsiError::UnmountFailed {
                path: target.display().to_string(),
                reason: "injected failure".into(),
            });
        }

        // Like umount(2), only the most recent mount on the target goes away.
        match state.mount_points.iter().rposition(|mp| mp.target == target) {
            Some(idx) => {
                state.mount_points.remove(idx);
                Ok(())
            }
            None => Err(CsiError::UnmountFailed {
                path: target.display().to_string(),
                reason: "not mounted".into(),
            }),
        }
    }
}
