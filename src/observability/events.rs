//! Lifecycle log events
//!
//! Every log line the engine emits is named by one of these.

use std::fmt;

use super::logger::Severity;

/// Observable engine events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Commands
    /// Command applied to a unit of work
    CommandExecuted,
    /// Command refused (missing version, existing version, lock, ...)
    CommandRejected,

    // Commits
    /// Unit of work committed
    CommitApplied,
    /// Unit of work lost a race on a `(root_id, branch)`
    CommitConflict,
    /// Unit of work could not be persisted
    CommitFailed,
    /// Unit of work discarded
    RolledBack,

    // Durable store
    /// Snapshot loaded from disk
    StoreLoaded,
    /// Snapshot written to disk
    StorePersisted,
    /// Snapshot replaced by another writer and reloaded
    StoreRefreshed,
    /// Snapshot unreadable or corrupt
    StoreCorrupt,

    // Configuration
    ConfigLoaded,

    // Branch locks
    BranchLocked,
    BranchUnlocked,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::CommandExecuted => "COMMAND_EXECUTED",
            Event::CommandRejected => "COMMAND_REJECTED",
            Event::CommitApplied => "COMMIT_APPLIED",
            Event::CommitConflict => "COMMIT_CONFLICT",
            Event::CommitFailed => "COMMIT_FAILED",
            Event::RolledBack => "ROLLED_BACK",
            Event::StoreLoaded => "STORE_LOADED",
            Event::StorePersisted => "STORE_PERSISTED",
            Event::StoreRefreshed => "STORE_REFRESHED",
            Event::StoreCorrupt => "STORE_CORRUPT",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::BranchLocked => "BRANCH_LOCKED",
            Event::BranchUnlocked => "BRANCH_UNLOCKED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::CommandExecuted
            | Event::CommitApplied
            | Event::RolledBack
            | Event::StorePersisted => Severity::Trace,
            Event::CommandRejected | Event::CommitConflict => Severity::Warn,
            Event::CommitFailed => Severity::Error,
            Event::StoreCorrupt => Severity::Fatal,
            _ => Severity::Info,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
