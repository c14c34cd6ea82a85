//! Storage backends for ephemeral volume payloads.
//!
//! A backend persists the payload described by a [`VolumeContext`] and
//! resolves the deterministic source path that gets bind-mounted into a Pod.
//! The set of backends is closed; [`StorageBackend`] selects one at
//! construction time.

mod filesystem;
mod inmemory;
mod mock;

use std::path::PathBuf;

use crate::error::CsiError;
use crate::types::{VolumeContext, VolumeId};

pub use filesystem::FilesystemStore;
pub use inmemory::{InMemoryStore, VolumeMetadata, VolumeRecord};
pub use mock::{MockCall, MockStorage};

/// Idempotent-create storage contract shared by every backend.
pub trait Storage: Send + Sync {
    /// Create the volume and its single file.
    ///
    /// Returns `Ok(false)` without touching anything when the volume already
    /// exists; existing content is never overwritten.
    fn write_volume(&self, id: &VolumeId, ctx: &VolumeContext) -> Result<bool, CsiError>;

    /// Source path of the volume.  Pure: needs neither I/O nor an existing
    /// volume.
    fn path_for_volume(&self, id: &VolumeId) -> PathBuf;

    /// Ids of all stored volumes, in no particular order.
    fn list_volumes(&self) -> Result<Vec<VolumeId>, CsiError>;

    /// Delete the volume.  Deleting an absent volume succeeds.
    fn remove_volume(&self, id: &VolumeId) -> Result<(), CsiError>;
}

/// The storage backend a node plugin runs with.
#[derive(Debug)]
pub enum StorageBackend {
    /// tmpfs-staged directories, used in production.
    Filesystem(FilesystemStore),
    /// Process-local map, for environments without mount support.
    InMemory(InMemoryStore),
    /// Test double with injectable failures.
    Mock(MockStorage),
}

impl StorageBackend {
    fn inner(&self) -> &dyn Storage {
        match self {
            Self::Filesystem(store) => store,
            Self::InMemory(store) => store,
            Self::Mock(store) => store,
        }
    }
}

impl Storage for StorageBackend {
    fn write_volume(&self, id: &VolumeId, ctx: &VolumeContext) -> Result<bool, CsiError> {
        self.inner().write_volume(id, ctx)
    }

    fn path_for_volume(&self, id: &VolumeId) -> PathBuf {
        self.inner().path_for_volume(id)
    }

    fn list_volumes(&self) -> Result<Vec<VolumeId>, CsiError> {
        self.inner().list_volumes()
    }

    fn remove_volume(&self, id: &VolumeId) -> Result<(), CsiError> {
        self.inner().remove_volume(id)
    }
}

impl From<FilesystemStore> for StorageBackend {
    fn from(store: FilesystemStore) -> Self {
        Self::Filesystem(store)
    }
}

impl From<InMemoryStore> for StorageBackend {
    fn from(store: InMemoryStore) -> Self {
        Self::InMemory(store)
    }
}

impl From<MockStorage> for StorageBackend {
    fn from(store: MockStorage) -> Self {
        Self::Mock(store)
    }
}
