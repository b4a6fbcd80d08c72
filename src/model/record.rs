//! VersionRecord - one immutable snapshot of an entity
//!
//! A record is created once and afterwards only ever closed: `close` sets the
//! end of both intervals, after which nothing about the row changes again.
//! Soft delete flips `deleted_at` on a still-open record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::{
    Branchable, BranchableEntity, Entity, Identified, Versioned, VersionedEntity,
};
use super::{RecordKey, RootId, TimeRange, VersionId};

/// Fields a clone may take from the caller instead of the source.
#[derive(Debug, Clone)]
pub struct CloneOverrides<E> {
    pub branch: Option<String>,
    pub parent_version_id: Option<VersionId>,
    pub merge_from_branch: Option<String>,
    pub payload: Option<E>,
}

impl<E> Default for CloneOverrides<E> {
    fn default() -> Self {
        Self {
            branch: None,
            parent_version_id: None,
            merge_from_branch: None,
            payload: None,
        }
    }
}

/// A single version of an entity.
///
/// Fields are private; the engine is the only writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord<E> {
    version_id: VersionId,
    root_id: RootId,
    valid_time: TimeRange,
    transaction_time: TimeRange,
    #[serde(default)]
    deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    branch: Option<String>,
    #[serde(default)]
    parent_version_id: Option<VersionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    merge_from_branch: Option<String>,
    payload: E,
}

impl<E: VersionedEntity> VersionRecord<E> {
    /// First version of an entity without branching.
    pub fn unbranched(root_id: RootId, payload: E, now: DateTime<Utc>) -> Self {
        Self::build(root_id, None, payload, now)
    }
}

impl<E: BranchableEntity> VersionRecord<E> {
    /// First version of an entity on `branch`.
    pub fn on_branch(root_id: RootId, branch: &str, payload: E, now: DateTime<Utc>) -> Self {
        Self::build(root_id, Some(branch.to_string()), payload, now)
    }
}

impl<E: Entity> VersionRecord<E> {
    pub(crate) fn build(
        root_id: RootId,
        branch: Option<String>,
        payload: E,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            version_id: VersionId::new(),
            root_id,
            valid_time: TimeRange::open_from(now),
            transaction_time: TimeRange::open_from(now),
            deleted_at: None,
            branch,
            parent_version_id: None,
            merge_from_branch: None,
            payload,
        }
    }

    #[inline]
    pub fn version_id(&self) -> VersionId {
        self.version_id
    }

    #[inline]
    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    #[inline]
    pub fn branch_name(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    #[inline]
    pub fn parent(&self) -> Option<VersionId> {
        self.parent_version_id
    }

    #[inline]
    pub fn merged_from(&self) -> Option<&str> {
        self.merge_from_branch.as_deref()
    }

    /// The `(root_id, branch)` this record belongs to.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            root_id: self.root_id,
            branch: self.branch.clone(),
        }
    }

    /// Open in both dimensions, deleted or not.
    pub fn is_open(&self) -> bool {
        self.valid_time.is_open() && self.transaction_time.is_open()
    }

    /// Produces a new record from this one.
    ///
    /// Identity and temporal fields are reset, lineage fields cleared, and
    /// the overrides applied. `root_id` is always kept. The source is not
    /// touched.
    pub fn clone_version(&self, overrides: CloneOverrides<E>, now: DateTime<Utc>) -> Self {
        Self {
            version_id: VersionId::new(),
            root_id: self.root_id,
            valid_time: TimeRange::open_from(now),
            transaction_time: TimeRange::open_from(now),
            deleted_at: None,
            branch: overrides.branch.or_else(|| self.branch.clone()),
            parent_version_id: overrides.parent_version_id,
            merge_from_branch: overrides.merge_from_branch,
            payload: overrides.payload.unwrap_or_else(|| self.payload.clone()),
        }
    }

    /// Ends both intervals at `at`.
    pub(crate) fn close(&mut self, at: DateTime<Utc>) {
        self.valid_time = self.valid_time.closed_at(at);
        self.transaction_time = self.transaction_time.closed_at(at);
    }
}

impl<E> Identified for VersionRecord<E> {
    fn id(&self) -> Uuid {
        self.version_id.as_uuid()
    }
}

impl<E> Versioned for VersionRecord<E> {
    fn root_id(&self) -> RootId {
        self.root_id
    }

    fn valid_time(&self) -> &TimeRange {
        &self.valid_time
    }

    fn transaction_time(&self) -> &TimeRange {
        &self.transaction_time
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn soft_delete(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
    }

    fn undelete(&mut self) {
        self.deleted_at = None;
    }
}

impl<E: BranchableEntity> Branchable for VersionRecord<E> {
    fn branch(&self) -> &str {
        self.branch.as_deref().unwrap_or_default()
    }

    fn parent_version_id(&self) -> Option<VersionId> {
        self.parent_version_id
    }

    fn merge_from_branch(&self) -> Option<&str> {
        self.merge_from_branch.as_deref()
    }
}
