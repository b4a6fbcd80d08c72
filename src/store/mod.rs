//! # Storage Seam
//!
//! Commands and queries never talk to a table directly; they run against a
//! unit of work obtained from a store.
//!
//! - `VersionReader` - read view (committed state, or a unit of work's view
//!   including its own staged writes)
//! - `UnitOfWork` - staged mutations, committed or rolled back by the caller
//! - `VersionStore` - hands out units of work
//!
//! ## Single-current rule
//!
//! Per `(root_id, branch)` at most one row is open in both time dimensions.
//! This is checked when a unit of work commits, under the table's write lock;
//! a losing writer gets `ConcurrentModification` and nothing it staged is
//! applied. Because at most one row is open, at most one row is current.

mod file;
mod memory;
mod plain;

pub use file::JsonFileStore;
pub use memory::{MemoryStore, SnapshotSink, Transaction};
pub use plain::{MemoryPlainStore, PlainStore, PlainTransaction, PlainUnitOfWork};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::EvcResult;
use crate::events::VersionEvent;
use crate::model::{RecordKey, RootId, VersionId, VersionRecord, VersionedEntity};

/// Read access to version rows.
pub trait VersionReader<E: VersionedEntity> {
    /// Row by version id.
    fn get(&self, id: VersionId) -> EvcResult<Option<VersionRecord<E>>>;

    /// The row open in both dimensions for `key`, deleted or not.
    ///
    /// Point lookup on the head index.
    fn head(&self, key: &RecordKey) -> EvcResult<Option<VersionRecord<E>>>;

    /// Every row of a root, all branches, in insertion order.
    fn versions_of(&self, root_id: RootId) -> EvcResult<Vec<VersionRecord<E>>>;

    /// Every root id with at least one row, ordered.
    fn root_ids(&self) -> EvcResult<Vec<RootId>>;
}

/// Staged mutations against a store.
///
/// Nothing is visible to other readers until `commit`.
pub trait UnitOfWork<E: VersionedEntity>: VersionReader<E> {
    /// Stages a new row. Its parent, if any, must already be visible.
    fn insert(&mut self, record: VersionRecord<E>) -> EvcResult<()>;

    /// Ends both intervals of an open row at `at`.
    fn close(&mut self, id: VersionId, at: DateTime<Utc>) -> EvcResult<VersionRecord<E>>;

    /// Sets or clears `deleted_at` on an open row.
    fn set_deleted(
        &mut self,
        id: VersionId,
        deleted_at: Option<DateTime<Utc>>,
    ) -> EvcResult<VersionRecord<E>>;

    /// Physically removes every row of a root. Returns the number of rows.
    fn purge(&mut self, root_id: RootId) -> EvcResult<usize>;

    /// Queues an event for publication after a successful commit.
    fn record_event(&mut self, event: VersionEvent);

    fn commit(self) -> EvcResult<CommitReceipt>
    where
        Self: Sized;

    fn rollback(self)
    where
        Self: Sized;
}

/// Source of units of work.
pub trait VersionStore<E: VersionedEntity> {
    type Unit: UnitOfWork<E>;

    fn begin(&self) -> EvcResult<Self::Unit>;
}

/// What a commit applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitReceipt {
    pub inserted: usize,
    pub modified: usize,
    pub purged: usize,
    pub events: usize,
}
