//! # Version Events
//!
//! Post-commit publication of version changes.
//!
//! Commands record events in the unit of work; the store hands them to its
//! `EventPublisher` only after the commit succeeded. A rolled back or
//! conflicting unit of work publishes nothing. The engine has no knowledge of
//! who consumes them.

mod bus;

pub use bus::{EventBus, EventReceiver, MemoryEventLog};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{RecordKey, RootId, VersionId};

/// What a committed command did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
    Undeleted,
    Branched,
    Merged,
    Reverted,
    Purged,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Created => "CREATED",
            ChangeKind::Updated => "UPDATED",
            ChangeKind::Deleted => "DELETED",
            ChangeKind::Undeleted => "UNDELETED",
            ChangeKind::Branched => "BRANCHED",
            ChangeKind::Merged => "MERGED",
            ChangeKind::Reverted => "REVERTED",
            ChangeKind::Purged => "PURGED",
        };
        write!(f, "{}", s)
    }
}

/// A committed version change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEvent {
    /// Monotonic per publisher; zero until published
    #[serde(default)]
    pub sequence: u64,

    pub kind: ChangeKind,

    /// Logical table of the entity
    pub table: String,

    pub root_id: RootId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Version produced or flagged by the command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<VersionId>,

    /// Version superseded by the command, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_version_id: Option<VersionId>,

    /// Branch read from for branch and merge events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_branch: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl VersionEvent {
    pub fn new(kind: ChangeKind, table: &str, key: &RecordKey, at: DateTime<Utc>) -> Self {
        Self {
            sequence: 0,
            kind,
            table: table.to_string(),
            root_id: key.root_id,
            branch: key.branch.clone(),
            version_id: None,
            previous_version_id: None,
            source_branch: None,
            timestamp: at,
        }
    }

    pub fn with_version(mut self, id: VersionId) -> Self {
        self.version_id = Some(id);
        self
    }

    pub fn with_previous(mut self, id: Option<VersionId>) -> Self {
        self.previous_version_id = id;
        self
    }

    pub fn with_source_branch(mut self, branch: &str) -> Self {
        self.source_branch = Some(branch.to_string());
        self
    }

    /// Topic string, `evc:<table>:<kind>`
    pub fn topic(&self) -> String {
        format!("evc:{}:{}", self.table, self.kind)
    }
}

/// Receives events after commit.
pub trait EventPublisher: Send + Sync + fmt::Debug {
    fn publish(&self, event: &VersionEvent);
}
