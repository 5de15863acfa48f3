//! Error types for pouch-core operations.

use std::path::PathBuf;

use crate::store::StoreError;
use crate::types::SessionId;

/// All errors surfaced to callers of the controller, reconciler and config
/// loader.
///
/// `ConditionFailed` from the store is deliberately absent: a lost completion
/// race is an expected outcome and never leaves the reconciler.
#[derive(Debug, thiserror::Error)]
pub enum PouchError {
    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle preconditions
    // ─────────────────────────────────────────────────────────────────────
    #[error("Could not start a session: {0}")]
    CreateFailed(String),

    #[error("Session {0} is not running")]
    NotActive(SessionId),

    #[error("Session {0} is not paused")]
    NotPaused(SessionId),

    #[error("Target duration must be at least one minute")]
    InvalidTarget,

    // ─────────────────────────────────────────────────────────────────────
    // Store errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Session {id} does not belong to {owner}")]
    PermissionDenied { id: SessionId, owner: String },

    #[error("Failed to read session store: {0}")]
    StoreReadFailed(String),

    #[error("Failed to write session store: {0}")]
    StoreWriteFailed(String),

    // ─────────────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Configuration read failed: {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Process
    // ─────────────────────────────────────────────────────────────────────
    #[error("Failed to install signal handler: {0}")]
    SignalSetup(String),
}

impl PouchError {
    /// True for transitions attempted from the wrong lifecycle state.
    pub fn is_precondition_failure(&self) -> bool {
        matches!(self, PouchError::NotActive(_) | PouchError::NotPaused(_))
    }

    /// Maps a store error raised while reading.
    pub(crate) fn from_read(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => PouchError::NotFound(id),
            StoreError::PermissionDenied { id, owner } => PouchError::PermissionDenied { id, owner },
            other => PouchError::StoreReadFailed(other.to_string()),
        }
    }

    /// Maps a store error raised while writing. `ConditionFailed` is handled
    /// by each caller before reaching this point.
    pub(crate) fn from_write(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => PouchError::NotFound(id),
            StoreError::PermissionDenied { id, owner } => PouchError::PermissionDenied { id, owner },
            other => PouchError::StoreWriteFailed(other.to_string()),
        }
    }
}

/// Convenience type alias for Results using PouchError.
pub type Result<T> = std::result::Result<T, PouchError>;
