//! Process-local storage backend.
//!
//! Volumes live in a map guarded by a single lock that is held only for the
//! duration of each map operation.  There is no filesystem behind it, so the
//! "source path" of a volume is just its id.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::PathBuf;

use parking_lot::Mutex;

use super::Storage;
use crate::error::CsiError;
use crate::types::{VolumeContext, VolumeId};

/// Metadata recorded for an in-memory volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMetadata {
    pub volume_id: VolumeId,
    /// Target path given to [`InMemoryStore::overwrite_volume`], if any.
    pub target_path: Option<String>,
    pub context: VolumeContext,
}

/// A stored volume: metadata plus raw payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRecord {
    pub metadata: VolumeMetadata,
    pub data: Vec<u8>,
}

impl VolumeRecord {
    fn new(volume_id: &VolumeId, target_path: Option<String>, ctx: &VolumeContext) -> Self {
        Self {
            metadata: VolumeMetadata {
                volume_id: volume_id.clone(),
                target_path,
                context: ctx.clone(),
            },
            data: ctx.data.as_bytes().to_vec(),
        }
    }
}

/// Concurrency-safe in-memory volume store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    volumes: Mutex<HashMap<VolumeId, VolumeRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert contract: store the volume under `id`, replacing any previous
    /// record.  Distinct from [`Storage::write_volume`], which never
    /// overwrites.
    pub fn overwrite_volume(&self, id: &VolumeId, target_path: &str, ctx: &VolumeContext) {
        let record = VolumeRecord::new(id, Some(target_path.to_owned()), ctx);
        self.volumes.lock().insert(id.clone(), record);
    }

    /// Copy of the payload stored for `id`.
    pub fn read_file(&self, id: &VolumeId) -> Result<Vec<u8>, CsiError> {
        self.volumes
            .lock()
            .get(id)
            .map(|record| record.data.clone())
            .ok_or_else(|| CsiError::VolumeNotFound(id.to_string()))
    }

    /// Full record for `id`, if stored.
    pub fn get(&self, id: &VolumeId) -> Option<VolumeRecord> {
        self.volumes.lock().get(id).cloned()
    }
}

impl Storage for InMemoryStore {
    fn write_volume(&self, id: &VolumeId, ctx: &VolumeContext) -> Result<bool, CsiError> {
        match self.volumes.lock().entry(id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(VolumeRecord::new(id, None, ctx));
                Ok(true)
            }
        }
    }

    fn path_for_volume(&self, id: &VolumeId) -> PathBuf {
        PathBuf::from(&id.0)
    }

    fn list_volumes(&self) -> Result<Vec<VolumeId>, CsiError> {
        Ok(self.volumes.lock().keys().cloned().collect())
    }

    fn remove_volume(&self, id: &VolumeId) -> Result<(), CsiError> {
        self.volumes.lock().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DATA_KEY, FILENAME_KEY};
    use std::collections::HashSet;

    fn ctx(data: &str) -> VolumeContext {
        VolumeContext::from_map(&HashMap::from([
            (FILENAME_KEY.to_owned(), "f".to_owned()),
            (DATA_KEY.to_owned(), data.to_owned()),
        ]))
        .unwrap()
    }

    #[test]
    fn write_is_create_only() {
        let store = InMemoryStore::new();
        let id = VolumeId::from("v1");

        assert!(store.write_volume(&id, &ctx("x")).unwrap());
        assert!(!store.write_volume(&id, &ctx("y")).unwrap());
        assert_eq!(store.read_file(&id).unwrap(), b"x");
    }

    #[test]
    fn overwrite_replaces_content() {
        let store = InMemoryStore::new();
        let id = VolumeId::from("v1");

        store.write_volume(&id, &ctx("x")).unwrap();
        store.overwrite_volume(&id, "/t", &ctx("y"));

        let record = store.get(&id).unwrap();
        assert_eq!(record.data, b"y");
        assert_eq!(record.metadata.target_path.as_deref(), Some("/t"));
    }

    #[test]
    fn path_is_the_id() {
        let store = InMemoryStore::new();
        assert_eq!(store.path_for_volume(&VolumeId::from("v1")), PathBuf::from("v1"));
    }

    #[test]
    fn read_missing_volume() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.read_file(&VolumeId::from("nope")),
            Err(CsiError::VolumeNotFound(_))
        ));
    }

    #[test]
    fn remove_is_idempotent() {
        let store = InMemoryStore::new();
        let id = VolumeId::from("v1");
        store.write_volume(&id, &ctx("x")).unwrap();

        store.remove_volume(&id).unwrap();
        store.remove_volume(&id).unwrap();
        assert!(store.list_volumes().unwrap().is_empty());
    }

    #[test]
    fn concurrent_distinct_writes() {
        const N: usize = 64;
        let store = InMemoryStore::new();

        std::thread::scope(|s| {
            for i in 0..N {
                let store = &store;
                s.spawn(move || {
                    let created = store
                        .write_volume(&VolumeId(format!("vol-{i}")), &ctx("x"))
                        .unwrap();
                    assert!(created);
                });
            }
        });

        let listed = store.list_volumes().unwrap();
        assert_eq!(listed.len(), N);
        let unique: HashSet<_> = listed.into_iter().collect();
        let expected: HashSet<_> = (0..N).map(|i| VolumeId(format!("vol-{i}"))).collect();
        assert_eq!(unique, expected);
    }
}
