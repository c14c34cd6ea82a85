//! CSI error types.
//!
//! All errors in the `libcsi` crate are represented by the [`CsiError`] enum,
//! which derives [`thiserror::Error`] for ergonomic error handling and also
//! implements [`Serialize`]/[`Deserialize`] so errors can travel across the
//! Unix socket transport.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for CSI operations.
#[derive(Debug, Error, Serialize, Deserialize, Clone)]
pub enum CsiError {
    /// The requested volume was not found.
    #[error("volume {0} not found")]
    VolumeNotFound(String),

    /// A mount operation failed.
    #[error("mount failed at {path}: {reason}")]
    MountFailed {
        /// Filesystem path where the mount was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// An unmount operation failed.
    #[error("unmount failed at {path}: {reason}")]
    UnmountFailed {
        /// Filesystem path where the unmount was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The storage backend or a mount-table query hit an I/O failure.
    #[error("backend error: {0}")]
    BackendError(String),

    /// A socket / framing level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// The caller supplied an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The RPC is intentionally not supported by this plugin.
    #[error("{0} not implemented")]
    Unimplemented(String),

    /// The plugin is misconfigured and cannot answer.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// An unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Status code a [`CsiError`] maps to on the RPC surface.
///
/// Names follow the gRPC status codes the CSI protocol is written
/// against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    InvalidArgument,
    Unimplemented,
    Unavailable,
    Internal,
}

impl CsiError {
    /// Create a [`CsiError::BackendError`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn backend<E: std::fmt::Display>(e: E) -> Self {
        Self::BackendError(e.to_string())
    }

    /// Create a [`CsiError::TransportError`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn transport<E: std::fmt::Display>(e: E) -> Self {
        Self::TransportError(e.to_string())
    }

    /// Create a [`CsiError::Internal`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }

    /// The single status code this error is reported as.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::VolumeNotFound(_) => ErrorCode::NotFound,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Unimplemented(_) => ErrorCode::Unimplemented,
            Self::Unavailable(_) => ErrorCode::Unavailable,
            Self::MountFailed { .. }
            | Self::UnmountFailed { .. }
            | Self::BackendError(_)
            | Self::TransportError(_)
            | Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether this error is an I/O failure (storage, mount or unmount).
    pub fn is_io_failure(&self) -> bool {
        matches!(
            self,
            Self::MountFailed { .. } | Self::UnmountFailed { .. } | Self::BackendError(_)
        )
    }
}
