//! # libcsi: CSI Node plugin for ephemeral inline volumes
//!
//! `libcsi` implements a [Container Storage Interface][csi] Node plugin that
//! materializes small, orchestrator-supplied payloads on node-local tmpfs and
//! bind-mounts them read-only into Pods.  Every RPC may be retried by the
//! orchestrator, so publish and unpublish are idempotent and a failed publish
//! leaves nothing behind.  It follows the RK8s conventions (Tokio async
//! runtime, `tracing` for observability, `thiserror` for structured errors).
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Core data model: `VolumeId`, `VolumeContext`, requests, node/plugin info. |
//! | [`error`] | [`CsiError`] enum covering all failure modes. |
//! | [`message`] | [`CsiMessage`] protocol envelope for the socket transport. |
//! | [`identity`] | [`CsiIdentity`] trait: plugin discovery & health. |
//! | [`node`] | [`CsiNode`] trait: publish, unpublish and the unsupported node RPCs. |
//! | [`mount`] | [`Mounter`] capability: real syscalls and a fake for tests. |
//! | [`storage`] | [`Storage`] backends: tmpfs filesystem, in-memory, mock. |
//! | [`lifecycle`] | [`VolumeLifecycle`]: publish/unpublish with rollback. |
//! | [`driver`] | [`IdentityServer`] and [`NodeServer`]. |
//! | [`transport`] | Unix domain socket client/server. |
//!
//! [csi]: https://github.com/container-storage-interface/spec

pub mod driver;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod message;
pub mod mount;
pub mod node;
pub mod storage;
pub mod transport;
pub mod types;

// Re-export the most commonly used items at crate root for convenience.
pub use driver::{IdentityServer, NodeServer};
pub use error::{CsiError, ErrorCode};
pub use identity::CsiIdentity;
pub use lifecycle::VolumeLifecycle;
pub use message::CsiMessage;
pub use mount::{FakeMounter, MountState, Mounter, SystemMounter};
pub use node::CsiNode;
pub use storage::{FilesystemStore, InMemoryStore, MockStorage, Storage, StorageBackend};
pub use types::*;
