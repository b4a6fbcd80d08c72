//! # Engine Errors
//!
//! Every failure is surfaced to the caller. Nothing is retried or corrected
//! inside the engine.

use thiserror::Error;

use crate::model::{RecordKey, RootId, VersionId};

/// Result type for engine operations
pub type EvcResult<T> = Result<T, EvcError>;

/// Engine errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvcError {
    // Versioning errors
    #[error("Current version already exists for {root_id} on {branch}")]
    AlreadyExists { root_id: RootId, branch: String },

    #[error("No current version for {root_id} on {branch}")]
    NoCurrentVersion { root_id: RootId, branch: String },

    #[error("Branch {branch} already has a current version for {root_id}")]
    BranchAlreadyExists { root_id: RootId, branch: String },

    #[error("Cannot revert {root_id} on {branch}: no target version")]
    NoParent { root_id: RootId, branch: String },

    #[error("Concurrent modification of {root_id} on {branch}")]
    ConcurrentModification { root_id: RootId, branch: String },

    #[error("Branch {0} is locked")]
    BranchLocked(String),

    #[error("Invalid branch label: {0:?}")]
    InvalidBranch(String),

    #[error("Invalid changes: {0}")]
    InvalidChanges(String),

    #[error("Lineage {0} still has a live current version")]
    NotDeleted(RootId),

    // Integrity errors
    #[error("Version not found: {0}")]
    VersionNotFound(VersionId),

    #[error("Version {0} is closed and immutable")]
    ImmutableVersion(VersionId),

    #[error("Parent version {0} is not persisted")]
    InvalidParent(VersionId),

    // Plain tier
    #[error("Entity not found: {0}")]
    EntityNotFound(uuid::Uuid),

    // Storage
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl EvcError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            EvcError::AlreadyExists { .. } => "EVC_ALREADY_EXISTS",
            EvcError::NoCurrentVersion { .. } => "EVC_NO_CURRENT_VERSION",
            EvcError::BranchAlreadyExists { .. } => "EVC_BRANCH_ALREADY_EXISTS",
            EvcError::NoParent { .. } => "EVC_NO_PARENT",
            EvcError::ConcurrentModification { .. } => "EVC_CONCURRENT_MODIFICATION",
            EvcError::BranchLocked(_) => "EVC_BRANCH_LOCKED",
            EvcError::InvalidBranch(_) => "EVC_INVALID_BRANCH",
            EvcError::InvalidChanges(_) => "EVC_INVALID_CHANGES",
            EvcError::NotDeleted(_) => "EVC_NOT_DELETED",
            EvcError::VersionNotFound(_) => "EVC_VERSION_NOT_FOUND",
            EvcError::ImmutableVersion(_) => "EVC_IMMUTABLE_VERSION",
            EvcError::InvalidParent(_) => "EVC_INVALID_PARENT",
            EvcError::EntityNotFound(_) => "EVC_ENTITY_NOT_FOUND",
            EvcError::StorageUnavailable(_) => "EVC_STORAGE_UNAVAILABLE",
        }
    }

    /// Whether the caller may retry the whole command.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EvcError::ConcurrentModification { .. })
    }

    /// Whether the current operation must be abandoned.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EvcError::StorageUnavailable(_))
    }

    pub(crate) fn already_exists(key: &RecordKey) -> Self {
        EvcError::AlreadyExists {
            root_id: key.root_id,
            branch: key.branch_label(),
        }
    }

    pub(crate) fn no_current(key: &RecordKey) -> Self {
        EvcError::NoCurrentVersion {
            root_id: key.root_id,
            branch: key.branch_label(),
        }
    }

    pub(crate) fn branch_exists(key: &RecordKey) -> Self {
        EvcError::BranchAlreadyExists {
            root_id: key.root_id,
            branch: key.branch_label(),
        }
    }

    pub(crate) fn no_parent(key: &RecordKey) -> Self {
        EvcError::NoParent {
            root_id: key.root_id,
            branch: key.branch_label(),
        }
    }

    pub(crate) fn conflict(key: &RecordKey) -> Self {
        EvcError::ConcurrentModification {
            root_id: key.root_id,
            branch: key.branch_label(),
        }
    }

    pub(crate) fn storage(msg: impl Into<String>) -> Self {
        EvcError::StorageUnavailable(msg.into())
    }

    pub(crate) fn poisoned() -> Self {
        EvcError::StorageUnavailable("Lock poisoned".into())
    }
}

impl From<std::io::Error> for EvcError {
    fn from(e: std::io::Error) -> Self {
        EvcError::StorageUnavailable(e.to_string())
    }
}
