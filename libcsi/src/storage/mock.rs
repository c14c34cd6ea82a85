//! Storage test double.

use std::path::PathBuf;

use parking_lot::Mutex;

use super::Storage;
use crate::error::CsiError;
use crate::types::{VolumeContext, VolumeId};

/// A call observed by [`MockStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    WriteVolume(VolumeId),
    PathForVolume(VolumeId),
    ListVolumes,
    RemoveVolume(VolumeId),
}

/// Storage double returning canned values, or a uniform error for every
/// fallible operation when `should_err` is set.
#[derive(Debug, Default)]
pub struct MockStorage {
    pub should_err: bool,
    /// Returned by every `path_for_volume` call.
    pub path: PathBuf,
    /// Returned by `list_volumes`.
    pub volumes: Vec<VolumeId>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockStorage {
    pub fn new(should_err: bool, path: impl Into<PathBuf>, volumes: Vec<VolumeId>) -> Self {
        Self {
            should_err,
            path: path.into(),
            volumes,
            calls: Mutex::default(),
        }
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().push(call);
    }

    fn fail(&self, what: &str) -> Result<(), CsiError> {
        if self.should_err {
            return Err(CsiError::BackendError(format!("error {what}")));
        }
        Ok(())
    }
}

impl Storage for MockStorage {
    fn write_volume(&self, id: &VolumeId, _ctx: &VolumeContext) -> Result<bool, CsiError> {
        self.record(MockCall::WriteVolume(id.clone()));
        self.fail("writing volume")?;
        Ok(true)
    }

    fn path_for_volume(&self, id: &VolumeId) -> PathBuf {
        self.record(MockCall::PathForVolume(id.clone()));
        self.path.clone()
    }

    fn list_volumes(&self) -> Result<Vec<VolumeId>, CsiError> {
        self.record(MockCall::ListVolumes);
        self.fail("getting volumes")?;
        Ok(self.volumes.clone())
    }

    fn remove_volume(&self, id: &VolumeId) -> Result<(), CsiError> {
        self.record(MockCall::RemoveVolume(id.clone()));
        self.fail("removing volume")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DATA_KEY, FILENAME_KEY};
    use std::collections::HashMap;

    fn ctx() -> VolumeContext {
        VolumeContext::from_map(&HashMap::from([
            (FILENAME_KEY.to_owned(), "f".to_owned()),
            (DATA_KEY.to_owned(), "x".to_owned()),
        ]))
        .unwrap()
    }

    #[test]
    fn write_volume() {
        let cases = [("no err", false, Some(true)), ("err", true, None)];
        for (name, should_err, want) in cases {
            let mock = MockStorage::new(should_err, "", Vec::new());
            let got = mock.write_volume(&VolumeId::from("test-id"), &ctx()).ok();
            assert_eq!(got, want, "case {name}");
        }
    }

    #[test]
    fn list_volumes() {
        let volumes = vec![VolumeId::from("a"), VolumeId::from("b")];

        let mock = MockStorage::new(false, "", volumes.clone());
        assert_eq!(mock.list_volumes().unwrap(), volumes);

        let mock = MockStorage::new(true, "", volumes);
        assert!(mock.list_volumes().is_err());
    }

    #[test]
    fn path_for_volume_is_canned() {
        let mock = MockStorage::new(true, "/dev/test", Vec::new());
        assert_eq!(mock.path_for_volume(&VolumeId::from("id")), PathBuf::from("/dev/test"));
    }

    #[test]
    fn remove_volume() {
        let mock = MockStorage::default();
        mock.remove_volume(&VolumeId::from("test-id")).unwrap();

        let mock = MockStorage::new(true, "", Vec::new());
        assert!(mock.remove_volume(&VolumeId::from("test-id")).is_err());
        assert_eq!(
            mock.calls(),
            vec![MockCall::RemoveVolume(VolumeId::from("test-id"))]
        );
    }
}
