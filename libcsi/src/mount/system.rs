//! Linux mount controller backed by `nix::mount`.

use std::io;
use std::path::{Path, PathBuf};

use nix::mount::MsFlags;
use tracing::{debug, warn};

use super::{MountState, Mounter};
use crate::error::CsiError;

const PROC_MOUNTS: &str = "/proc/self/mounts";

/// Mount controller issuing real `mount(2)` / `umount(2)` syscalls.
///
/// Requires `CAP_SYS_ADMIN`.
#[derive(Debug, Clone)]
pub struct SystemMounter {
    mounts_file: PathBuf,
}

impl Default for SystemMounter {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMounter {
    pub fn new() -> Self {
        Self {
            mounts_file: PathBuf::from(PROC_MOUNTS),
        }
    }

    /// Read the mount table from `path` instead of `/proc/self/mounts`.
    pub fn with_mounts_file(path: impl Into<PathBuf>) -> Self {
        Self {
            mounts_file: path.into(),
        }
    }

    fn mount_table(&self) -> Result<String, CsiError> {
        std::fs::read_to_string(&self.mounts_file).map_err(|e| {
            CsiError::BackendError(format!("read {}: {e}", self.mounts_file.display()))
        })
    }
}

impl Mounter for SystemMounter {
    fn is_mount_point(&self, path: &Path) -> Result<MountState, CsiError> {
        let resolved = match path.canonicalize() {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(MountState::Missing),
            Err(e) => {
                return Err(CsiError::BackendError(format!(
                    "inspect mount point {}: {e}",
                    path.display()
                )));
            }
        };

        // Format: <device> <mountpoint> <fstype> <options> <dump> <pass>
        let mounted = self
            .mount_table()?
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .any(|mount_point| Path::new(&unescape_mount_path(mount_point)) == resolved);

        Ok(if mounted {
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
        let (flags, data) = parse_options(options);
        let mount_failed = |reason: String| CsiError::MountFailed {
            path: target.display().to_string(),
            reason,
        };

        let bind = flags.contains(MsFlags::MS_BIND);
        let read_only = flags.contains(MsFlags::MS_RDONLY);

        // The kernel ignores MS_RDONLY on the initial bind; it takes a
        // separate remount to enforce read-only access.
        let initial = if bind {
            flags.difference(MsFlags::MS_RDONLY)
        } else {
            flags
        };

        nix::mount::mount(Some(source), target, fs_type, initial, data.as_deref())
            .map_err(|e| mount_failed(e.to_string()))?;

        if bind && read_only {
            let remount = MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY;
            if let Err(e) = nix::mount::mount(None::<&str>, target, None::<&str>, remount, None::<&str>) {
                if let Err(undo) = nix::mount::umount(target) {
                    warn!(target = %target.display(), error = %undo, "failed to undo bind mount");
                }
                return Err(mount_failed(format!("remount read-only: {e}")));
            }
        }

        debug!(
            source = %source.display(),
            target = %target.display(),
            ?fs_type,
            ?options,
            "mounted",
        );
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<(), CsiError> {
        nix::mount::umount(target).map_err(|e| CsiError::UnmountFailed {
            path: target.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!(target = %target.display(), "unmounted");
        Ok(())
    }
}

/// Split `mount(8)` style options into syscall flags and the remaining
/// comma-joined filesystem data.
fn parse_options(options: &[&str]) -> (MsFlags, Option<String>) {
    let mut flags = MsFlags::empty();
    let mut data = Vec::new();

    for option in options {
        match *option {
            "bind" => flags |= MsFlags::MS_BIND,
            "rbind" => flags |= MsFlags::MS_BIND | MsFlags::MS_REC,
            "ro" => flags |= MsFlags::MS_RDONLY,
            "rw" => flags.remove(MsFlags::MS_RDONLY),
            "nosuid" => flags |= MsFlags::MS_NOSUID,
            "nodev" => flags |= MsFlags::MS_NODEV,
            "noexec" => flags |= MsFlags::MS_NOEXEC,
            other => data.push(other),
        }
    }

    let data = (!data.is_empty()).then(|| data.join(","));
    (flags, data)
}

/// Decode the octal escapes (`\040` for space, …) used in `/proc/self/mounts`.
fn unescape_mount_path(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits
                    .iter()
                    .fold(0u16, |acc, d| acc * 8 + u16::from(d - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn mounter_with_table(table: &str) -> (tempfile::NamedTempFile, SystemMounter) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(table.as_bytes()).unwrap();
        let mounter = SystemMounter::with_mounts_file(file.path());
        (file, mounter)
    }

    #[test]
    fn missing_path_is_not_an_error() {
        let (_table, mounter) = mounter_with_table("");
        let state = mounter
            .is_mount_point(Path::new("/nonexistent/path/for/test"))
            .unwrap();
        assert_eq!(state, MountState::Missing);
    }

    #[test]
    fn detects_listed_mount_point() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = dir.path().canonicalize().unwrap();
        let table = format!(
            "proc /proc proc rw 0 0\ntmpfs {} tmpfs rw,nosuid 0 0\n",
            resolved.display()
        );
        let (_table, mounter) = mounter_with_table(&table);

        assert_eq!(mounter.is_mount_point(dir.path()).unwrap(), MountState::Mounted);
    }

    #[test]
    fn unlisted_directory_is_not_mounted() {
        let dir = tempfile::tempdir().unwrap();
        let (_table, mounter) = mounter_with_table("proc /proc proc rw 0 0\n");

        assert_eq!(
            mounter.is_mount_point(dir.path()).unwrap(),
            MountState::NotMounted
        );
    }

    #[test]
    fn escaped_mount_point_matches() {
        let dir = tempfile::tempdir().unwrap();
        let spaced = dir.path().join("with space");
        std::fs::create_dir(&spaced).unwrap();
        let escaped = spaced
            .canonicalize()
            .unwrap()
            .display()
            .to_string()
            .replace(' ', "\\040");
        let (_table, mounter) = mounter_with_table(&format!("tmpfs {escaped} tmpfs rw 0 0\n"));

        assert_eq!(mounter.is_mount_point(&spaced).unwrap(), MountState::Mounted);
    }

    #[test]
    fn unreadable_mount_table_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mounter = SystemMounter::with_mounts_file(dir.path().join("absent"));
        let err = mounter.is_mount_point(dir.path()).unwrap_err();
        assert!(matches!(err, CsiError::BackendError(_)));
    }

    #[test]
    fn options_split_into_flags_and_data() {
        let (flags, data) = parse_options(&["bind", "ro"]);
        assert_eq!(flags, MsFlags::MS_BIND | MsFlags::MS_RDONLY);
        assert!(data.is_none());

        let (flags, data) = parse_options(&["nosuid", "nodev", "mode=0700", "size=64m"]);
        assert_eq!(flags, MsFlags::MS_NOSUID | MsFlags::MS_NODEV);
        assert_eq!(data.as_deref(), Some("mode=0700,size=64m"));
    }

    #[test]
    fn unescape_handles_octal_and_plain_text() {
        assert_eq!(unescape_mount_path("/a\\040b"), "/a b");
        assert_eq!(unescape_mount_path("/tab\\011x"), "/tab\tx");
        assert_eq!(unescape_mount_path("/plain"), "/plain");
        assert_eq!(unescape_mount_path("/trailing\\"), "/trailing\\");
    }
}
