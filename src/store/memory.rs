//! In-memory version table with optimistic units of work
//!
//! A `Transaction` stages its writes in an overlay and reads through it. On
//! commit the table's write lock is taken and the overlay is validated
//! against what is committed now:
//!
//! 1. every row the unit modified is unchanged since it was read
//! 2. every purged root still has the version set it had when purged
//! 3. every parent referenced by an inserted row still exists
//! 4. every affected `(root_id, branch)` ends with at most one open row
//!
//! Any failed check aborts the whole commit with `ConcurrentModification`.
//! Events are published after the lock is released.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::mem;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use super::{CommitReceipt, UnitOfWork, VersionReader, VersionStore};
use crate::errors::{EvcError, EvcResult};
use crate::events::{EventPublisher, VersionEvent};
use crate::model::{RecordKey, RootId, VersionId, VersionRecord, Versioned, VersionedEntity};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};

/// Durable target for committed table state.
///
/// A commit holds the table's write lock and then, in order: takes the
/// sink's lock, adopts any newer stored state from `refresh`, validates, and
/// hands the full next state to `persist`. An error aborts the commit.
pub trait SnapshotSink<E>: Send + Sync + fmt::Debug {
    /// Excludes other writers of the same storage until the guard drops.
    fn lock(&self) -> EvcResult<Box<dyn Send>>;

    /// Stored rows, if another writer replaced them since this sink last
    /// read or wrote.
    fn refresh(&self) -> EvcResult<Option<Vec<VersionRecord<E>>>>;

    fn persist(&self, records: &[VersionRecord<E>]) -> EvcResult<()>;
}

#[derive(Debug, Clone)]
struct Row<E> {
    seq: u64,
    record: VersionRecord<E>,
}

/// Committed rows plus the head index.
#[derive(Debug, Clone)]
pub(crate) struct Table<E> {
    rows: HashMap<VersionId, Row<E>>,
    by_root: HashMap<RootId, Vec<VersionId>>,
    heads: HashMap<RecordKey, VersionId>,
    next_seq: u64,
}

impl<E> Default for Table<E> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            by_root: HashMap::new(),
            heads: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<E: VersionedEntity> Table<E> {
    /// Rebuilds a table from rows in insertion order.
    pub(crate) fn from_records(records: Vec<VersionRecord<E>>) -> EvcResult<Self> {
        let mut table = Self::default();
        for record in records {
            if table.rows.contains_key(&record.version_id()) {
                return Err(EvcError::storage(format!(
                    "duplicate version {}",
                    record.version_id()
                )));
            }
            if record.is_open() && table.heads.contains_key(&record.key()) {
                return Err(EvcError::storage(format!(
                    "more than one open version for {}",
                    record.key()
                )));
            }
            table.insert(record);
        }
        Ok(table)
    }

    /// Every row in insertion order.
    pub(crate) fn records(&self) -> Vec<VersionRecord<E>> {
        let mut rows: Vec<&Row<E>> = self.rows.values().collect();
        rows.sort_by_key(|row| row.seq);
        rows.into_iter().map(|row| row.record.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    fn get(&self, id: VersionId) -> Option<&VersionRecord<E>> {
        self.rows.get(&id).map(|row| &row.record)
    }

    fn head(&self, key: &RecordKey) -> Option<&VersionRecord<E>> {
        self.heads.get(key).and_then(|id| self.get(*id))
    }

    fn version_ids(&self, root_id: RootId) -> &[VersionId] {
        self.by_root.get(&root_id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn versions_of(&self, root_id: RootId) -> Vec<VersionRecord<E>> {
        self.version_ids(root_id)
            .iter()
            .filter_map(|id| self.get(*id).cloned())
            .collect()
    }

    fn root_ids(&self) -> BTreeSet<RootId> {
        self.by_root.keys().copied().collect()
    }

    fn insert(&mut self, record: VersionRecord<E>) {
        let id = record.version_id();
        if record.is_open() {
            self.heads.insert(record.key(), id);
        }
        self.by_root.entry(record.root_id()).or_default().push(id);
        self.rows.insert(
            id,
            Row {
                seq: self.next_seq,
                record,
            },
        );
        self.next_seq += 1;
    }

    fn replace(&mut self, record: VersionRecord<E>) {
        let id = record.version_id();
        let key = record.key();
        if record.is_open() {
            self.heads.insert(key, id);
        } else if self.heads.get(&key) == Some(&id) {
            self.heads.remove(&key);
        }
        if let Some(row) = self.rows.get_mut(&id) {
            row.record = record;
        }
    }

    fn remove_root(&mut self, root_id: RootId) -> usize {
        let ids = self.by_root.remove(&root_id).unwrap_or_default();
        for id in &ids {
            self.rows.remove(id);
        }
        self.heads.retain(|key, _| key.root_id != root_id);
        ids.len()
    }

    fn apply(&mut self, staged: &Staged<E>) -> usize {
        let purged = staged
            .purged
            .keys()
            .map(|root_id| self.remove_root(*root_id))
            .sum();
        for record in staged.modified.values() {
            self.replace(record.clone());
        }
        for record in &staged.inserted {
            self.insert(record.clone());
        }
        purged
    }
}

struct Shared<E> {
    table: RwLock<Table<E>>,
    publisher: Option<Arc<dyn EventPublisher>>,
    sink: Option<Box<dyn SnapshotSink<E>>>,
    metrics: MetricsRegistry,
}

impl<E> fmt::Debug for Shared<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("publisher", &self.publisher)
            .field("sink", &self.sink)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

/// Shared, cloneable in-memory version store.
#[derive(Debug)]
pub struct MemoryStore<E> {
    shared: Arc<Shared<E>>,
}

impl<E> Clone for MemoryStore<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: VersionedEntity> Default for MemoryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: VersionedEntity> MemoryStore<E> {
    pub fn new() -> Self {
        Self::build(Table::default(), None, None)
    }

    /// Store that hands committed events to `publisher`.
    pub fn with_publisher(publisher: Arc<dyn EventPublisher>) -> Self {
        Self::build(Table::default(), Some(publisher), None)
    }

    pub(crate) fn with_sink(
        table: Table<E>,
        sink: Box<dyn SnapshotSink<E>>,
        publisher: Option<Arc<dyn EventPublisher>>,
    ) -> Self {
        Self::build(table, publisher, Some(sink))
    }

    fn build(
        table: Table<E>,
        publisher: Option<Arc<dyn EventPublisher>>,
        sink: Option<Box<dyn SnapshotSink<E>>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                table: RwLock::new(table),
                publisher,
                sink,
                metrics: MetricsRegistry::new(),
            }),
        }
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.shared.metrics
    }

    /// Number of committed rows.
    pub fn len(&self) -> EvcResult<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> EvcResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Every committed row in insertion order.
    pub fn records(&self) -> EvcResult<Vec<VersionRecord<E>>> {
        Ok(self.read()?.records())
    }

    fn read(&self) -> EvcResult<std::sync::RwLockReadGuard<'_, Table<E>>> {
        self.shared.table.read().map_err(|_| EvcError::poisoned())
    }
}

impl<E: VersionedEntity> VersionReader<E> for MemoryStore<E> {
    fn get(&self, id: VersionId) -> EvcResult<Option<VersionRecord<E>>> {
        Ok(self.read()?.get(id).cloned())
    }

    fn head(&self, key: &RecordKey) -> EvcResult<Option<VersionRecord<E>>> {
        Ok(self.read()?.head(key).cloned())
    }

    fn versions_of(&self, root_id: RootId) -> EvcResult<Vec<VersionRecord<E>>> {
        Ok(self.read()?.versions_of(root_id))
    }

    fn root_ids(&self) -> EvcResult<Vec<RootId>> {
        Ok(self.read()?.root_ids().into_iter().collect())
    }
}

impl<E: VersionedEntity> VersionStore<E> for MemoryStore<E> {
    type Unit = Transaction<E>;

    fn begin(&self) -> EvcResult<Transaction<E>> {
        Ok(Transaction {
            shared: Arc::clone(&self.shared),
            staged: Staged::default(),
            finished: false,
        })
    }
}

/// Writes staged by a transaction.
#[derive(Debug)]
struct Staged<E> {
    /// Committed state of every row the unit modified, as first read
    originals: HashMap<VersionId, VersionRecord<E>>,
    modified: HashMap<VersionId, VersionRecord<E>>,
    inserted: Vec<VersionRecord<E>>,
    /// Committed version ids of each purged root, as seen at purge time
    purged: HashMap<RootId, Vec<VersionId>>,
    events: Vec<VersionEvent>,
}

impl<E> Default for Staged<E> {
    fn default() -> Self {
        Self {
            originals: HashMap::new(),
            modified: HashMap::new(),
            inserted: Vec::new(),
            purged: HashMap::new(),
            events: Vec::new(),
        }
    }
}

impl<E: VersionedEntity> Staged<E> {
    fn affected_keys(&self) -> BTreeSet<(RootId, Option<String>)> {
        self.inserted
            .iter()
            .chain(self.modified.values())
            .map(|record| (record.root_id(), record.branch_name().map(str::to_string)))
            .collect()
    }

    fn validate(&self, table: &Table<E>) -> EvcResult<()> {
        for (id, original) in &self.originals {
            if table.get(*id) != Some(original) {
                return Err(EvcError::conflict(&original.key()));
            }
        }

        for (root_id, ids) in &self.purged {
            if table.version_ids(*root_id) != ids.as_slice() {
                return Err(EvcError::conflict(&RecordKey::unbranched(*root_id)));
            }
        }

        for record in &self.inserted {
            if let Some(parent) = record.parent() {
                let staged = self.inserted.iter().any(|r| r.version_id() == parent);
                let committed = table
                    .get(parent)
                    .map_or(false, |p| !self.purged.contains_key(&p.root_id()));
                if !staged && !committed {
                    return Err(EvcError::conflict(&record.key()));
                }
            }
        }

        for (root_id, branch) in self.affected_keys() {
            let key = RecordKey { root_id, branch };
            let committed_head = if self.purged.contains_key(&root_id) {
                None
            } else {
                table.head(&key).map(|head| {
                    self.modified
                        .get(&head.version_id())
                        .map_or(head.is_open(), VersionRecord::is_open)
                })
            };
            let open = usize::from(committed_head.unwrap_or(false))
                + self
                    .inserted
                    .iter()
                    .filter(|r| r.is_open() && r.key() == key)
                    .count();
            if open > 1 {
                return Err(EvcError::conflict(&key));
            }
        }

        Ok(())
    }
}

/// Validates and persists `staged` under the sink's lock.
///
/// Stored state written by another handle replaces `table` first, so the
/// unit is checked against what is durable now.
fn commit_durable<E: VersionedEntity>(
    sink: &dyn SnapshotSink<E>,
    table: &mut Table<E>,
    staged: &Staged<E>,
) -> EvcResult<usize> {
    let _guard = sink.lock()?;
    if let Some(records) = sink.refresh()? {
        *table = Table::from_records(records)?;
    }
    staged.validate(table)?;

    let mut next = table.clone();
    let purged = next.apply(staged);
    sink.persist(&next.records())?;
    *table = next;
    Ok(purged)
}

/// Optimistic unit of work over a `MemoryStore`.
///
/// Dropping it without `commit` discards every staged write.
#[derive(Debug)]
pub struct Transaction<E: VersionedEntity> {
    shared: Arc<Shared<E>>,
    staged: Staged<E>,
    finished: bool,
}

impl<E: VersionedEntity> Transaction<E> {
    /// Number of rows staged for insert.
    pub fn pending_inserts(&self) -> usize {
        self.staged.inserted.len()
    }

    fn committed(&self) -> EvcResult<std::sync::RwLockReadGuard<'_, Table<E>>> {
        self.shared.table.read().map_err(|_| EvcError::poisoned())
    }

    fn inserted_mut(&mut self, id: VersionId) -> Option<&mut VersionRecord<E>> {
        self.staged.inserted.iter_mut().find(|r| r.version_id() == id)
    }

    /// Loads an open row for modification, remembering its committed state.
    fn open_for_write(&mut self, id: VersionId) -> EvcResult<&mut VersionRecord<E>> {
        let existing = self.get(id)?.ok_or(EvcError::VersionNotFound(id))?;
        if !existing.is_open() {
            return Err(EvcError::ImmutableVersion(id));
        }

        if self.staged.inserted.iter().any(|r| r.version_id() == id) {
            return self.inserted_mut(id).ok_or(EvcError::VersionNotFound(id));
        }

        if !self.staged.originals.contains_key(&id) {
            let committed = self.committed()?.get(id).cloned();
            if let Some(original) = committed {
                self.staged.originals.insert(id, original);
            }
        }
        Ok(self.staged.modified.entry(id).or_insert(existing))
    }

    fn finish(&mut self) -> EvcResult<CommitReceipt> {
        self.finished = true;
        let staged = mem::take(&mut self.staged);
        let shared = Arc::clone(&self.shared);

        let purged = {
            let mut table = shared.table.write().map_err(|_| EvcError::poisoned())?;
            let applied = match &shared.sink {
                Some(sink) => commit_durable(sink.as_ref(), &mut table, &staged),
                None => staged.validate(&table).map(|()| table.apply(&staged)),
            };

            match applied {
                Ok(purged) => purged,
                Err(e) if e.is_retryable() => {
                    shared.metrics.increment_conflicts();
                    log_event_with_fields(
                        Event::CommitConflict,
                        &[("table", E::TABLE), ("error", &e.to_string())],
                    );
                    return Err(e);
                }
                Err(e) => {
                    log_event_with_fields(
                        Event::CommitFailed,
                        &[("table", E::TABLE), ("error", &e.to_string())],
                    );
                    return Err(e);
                }
            }
        };

        let receipt = CommitReceipt {
            inserted: staged.inserted.len(),
            modified: staged.modified.len(),
            purged,
            events: staged.events.len(),
        };

        shared.metrics.increment_commits();
        shared.metrics.add_versions_written(receipt.inserted as u64);
        log_event_with_fields(
            Event::CommitApplied,
            &[
                ("table", E::TABLE),
                ("inserted", &receipt.inserted.to_string()),
                ("modified", &receipt.modified.to_string()),
                ("purged", &receipt.purged.to_string()),
            ],
        );

        if let Some(publisher) = &shared.publisher {
            for event in &staged.events {
                publisher.publish(event);
            }
        }

        Ok(receipt)
    }
}

impl<E: VersionedEntity> VersionReader<E> for Transaction<E> {
    fn get(&self, id: VersionId) -> EvcResult<Option<VersionRecord<E>>> {
        if let Some(record) = self.staged.inserted.iter().find(|r| r.version_id() == id) {
            return Ok(Some(record.clone()));
        }
        if let Some(record) = self.staged.modified.get(&id) {
            return Ok(Some(record.clone()));
        }
        Ok(self
            .committed()?
            .get(id)
            .filter(|r| !self.staged.purged.contains_key(&r.root_id()))
            .cloned())
    }

    fn head(&self, key: &RecordKey) -> EvcResult<Option<VersionRecord<E>>> {
        if let Some(record) = self
            .staged
            .inserted
            .iter()
            .rev()
            .find(|r| r.is_open() && &r.key() == key)
        {
            return Ok(Some(record.clone()));
        }
        if self.staged.purged.contains_key(&key.root_id) {
            return Ok(None);
        }

        let committed = self.committed()?.head(key).cloned();
        Ok(committed
            .map(|head| {
                self.staged
                    .modified
                    .get(&head.version_id())
                    .cloned()
                    .unwrap_or(head)
            })
            .filter(VersionRecord::is_open))
    }

    fn versions_of(&self, root_id: RootId) -> EvcResult<Vec<VersionRecord<E>>> {
        let mut versions = if self.staged.purged.contains_key(&root_id) {
            Vec::new()
        } else {
            self.committed()?
                .versions_of(root_id)
                .into_iter()
                .map(|r| {
                    self.staged
                        .modified
                        .get(&r.version_id())
                        .cloned()
                        .unwrap_or(r)
                })
                .collect()
        };
        versions.extend(
            self.staged
                .inserted
                .iter()
                .filter(|r| r.root_id() == root_id)
                .cloned(),
        );
        Ok(versions)
    }

    fn root_ids(&self) -> EvcResult<Vec<RootId>> {
        let mut roots = self.committed()?.root_ids();
        roots.retain(|root| !self.staged.purged.contains_key(root));
        roots.extend(self.staged.inserted.iter().map(|r| r.root_id()));
        Ok(roots.into_iter().collect())
    }
}

impl<E: VersionedEntity> UnitOfWork<E> for Transaction<E> {
    fn insert(&mut self, record: VersionRecord<E>) -> EvcResult<()> {
        if let Some(parent) = record.parent() {
            if self.get(parent)?.is_none() {
                return Err(EvcError::InvalidParent(parent));
            }
        }
        self.staged.inserted.push(record);
        Ok(())
    }

    fn close(&mut self, id: VersionId, at: DateTime<Utc>) -> EvcResult<VersionRecord<E>> {
        let record = self.open_for_write(id)?;
        record.close(at);
        Ok(record.clone())
    }

    fn set_deleted(
        &mut self,
        id: VersionId,
        deleted_at: Option<DateTime<Utc>>,
    ) -> EvcResult<VersionRecord<E>> {
        let record = self.open_for_write(id)?;
        match deleted_at {
            Some(at) => record.soft_delete(at),
            None => record.undelete(),
        }
        Ok(record.clone())
    }

    fn purge(&mut self, root_id: RootId) -> EvcResult<usize> {
        let removed = self.versions_of(root_id)?.len();

        if !self.staged.purged.contains_key(&root_id) {
            let committed = self.committed()?.version_ids(root_id).to_vec();
            self.staged.purged.insert(root_id, committed);
        }
        self.staged.inserted.retain(|r| r.root_id() != root_id);
        self.staged.modified.retain(|_, r| r.root_id() != root_id);

        Ok(removed)
    }

    fn record_event(&mut self, event: VersionEvent) {
        self.staged.events.push(event);
    }

    fn commit(mut self) -> EvcResult<CommitReceipt> {
        self.finish()
    }

    fn rollback(self) {}
}

impl<E: VersionedEntity> Drop for Transaction<E> {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.metrics.increment_rollbacks();
            log_event_with_fields(
                Event::RolledBack,
                &[
                    ("table", E::TABLE),
                    ("discarded", &self.staged.inserted.len().to_string()),
                ],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChangeKind, MemoryEventLog};
    use crate::model::{BranchableEntity, CloneOverrides, Entity};
    use chrono::{Duration, TimeZone};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    impl Entity for Note {
        const TABLE: &'static str = "notes";
    }
    impl VersionedEntity for Note {}
    impl BranchableEntity for Note {}

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn note(text: &str) -> Note {
        Note { text: text.into() }
    }

    fn seed(store: &MemoryStore<Note>) -> VersionRecord<Note> {
        let record = VersionRecord::on_branch(RootId::new(), "main", note("v1"), t0());
        let mut tx = store.begin().unwrap();
        tx.insert(record.clone()).unwrap();
        tx.commit().unwrap();
        record
    }

    #[test]
    fn test_staged_writes_invisible_until_commit() {
        let store = MemoryStore::new();
        let record = VersionRecord::on_branch(RootId::new(), "main", note("v1"), t0());

        let mut tx = store.begin().unwrap();
        tx.insert(record.clone()).unwrap();
        assert!(tx.head(&record.key()).unwrap().is_some());
        assert!(store.head(&record.key()).unwrap().is_none());

        let receipt = tx.commit().unwrap();
        assert_eq!(receipt.inserted, 1);
        assert_eq!(store.head(&record.key()).unwrap(), Some(record));
    }

    #[test]
    fn test_drop_discards() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().unwrap();
            tx.insert(VersionRecord::on_branch(RootId::new(), "main", note("x"), t0()))
                .unwrap();
        }
        assert!(store.is_empty().unwrap());
        assert_eq!(store.metrics().snapshot().rollbacks, 1);
    }

    #[test]
    fn test_close_then_insert_moves_head() {
        let store = MemoryStore::new();
        let v1 = seed(&store);
        let at = t0() + Duration::minutes(1);

        let mut tx = store.begin().unwrap();
        tx.close(v1.version_id(), at).unwrap();
        let v2 = v1.clone_version(
            CloneOverrides {
                parent_version_id: Some(v1.version_id()),
                ..Default::default()
            },
            at,
        );
        tx.insert(v2.clone()).unwrap();
        tx.commit().unwrap();

        assert_eq!(store.head(&v1.key()).unwrap().map(|r| r.version_id()), Some(v2.version_id()));
        let closed = store.get(v1.version_id()).unwrap().unwrap();
        assert_eq!(closed.valid_time().end(), Some(at));
        assert_eq!(store.versions_of(v1.root_id()).unwrap().len(), 2);
    }

    #[test]
    fn test_closed_row_is_immutable() {
        let store = MemoryStore::new();
        let v1 = seed(&store);

        let mut tx = store.begin().unwrap();
        tx.close(v1.version_id(), t0()).unwrap();
        assert_eq!(
            tx.close(v1.version_id(), t0()),
            Err(EvcError::ImmutableVersion(v1.version_id()))
        );
        assert!(matches!(
            tx.set_deleted(v1.version_id(), Some(t0())),
            Err(EvcError::ImmutableVersion(_))
        ));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let store: MemoryStore<Note> = MemoryStore::new();
        let base = VersionRecord::on_branch(RootId::new(), "main", note("v1"), t0());
        let orphan = base.clone_version(
            CloneOverrides {
                parent_version_id: Some(base.version_id()),
                ..Default::default()
            },
            t0(),
        );

        let mut tx = store.begin().unwrap();
        assert_eq!(
            tx.insert(orphan),
            Err(EvcError::InvalidParent(base.version_id()))
        );
    }

    #[test]
    fn test_second_open_head_conflicts() {
        let store = MemoryStore::new();
        let v1 = seed(&store);

        let mut tx = store.begin().unwrap();
        tx.insert(v1.clone_version(CloneOverrides::default(), t0()))
            .unwrap();
        let err = tx.commit().unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_racing_updates_one_wins() {
        let store = MemoryStore::new();
        let v1 = seed(&store);
        let at = t0() + Duration::seconds(1);

        let mut a = store.begin().unwrap();
        let mut b = store.begin().unwrap();
        for tx in [&mut a, &mut b] {
            tx.close(v1.version_id(), at).unwrap();
            tx.insert(v1.clone_version(
                CloneOverrides {
                    parent_version_id: Some(v1.version_id()),
                    ..Default::default()
                },
                at,
            ))
            .unwrap();
        }

        assert!(a.commit().is_ok());
        assert!(matches!(
            b.commit(),
            Err(EvcError::ConcurrentModification { .. })
        ));
        assert_eq!(store.versions_of(v1.root_id()).unwrap().len(), 2);
        assert_eq!(store.metrics().snapshot().conflicts, 1);
    }

    #[test]
    fn test_racing_creates_one_wins() {
        let store = MemoryStore::new();
        let root = RootId::new();

        let mut a = store.begin().unwrap();
        let mut b = store.begin().unwrap();
        a.insert(VersionRecord::on_branch(root, "main", note("a"), t0()))
            .unwrap();
        b.insert(VersionRecord::on_branch(root, "main", note("b"), t0()))
            .unwrap();

        a.commit().unwrap();
        assert!(b.commit().is_err());
        let head = store.head(&RecordKey::on_branch(root, "main")).unwrap().unwrap();
        assert_eq!(head.payload().text, "a");
    }

    #[test]
    fn test_purge_conflicts_with_concurrent_insert() {
        let store = MemoryStore::new();
        let v1 = seed(&store);

        let mut purge = store.begin().unwrap();
        assert_eq!(purge.purge(v1.root_id()).unwrap(), 1);
        assert!(purge.versions_of(v1.root_id()).unwrap().is_empty());

        let mut branch = store.begin().unwrap();
        branch
            .insert(v1.clone_version(
                CloneOverrides {
                    branch: Some("co-1".into()),
                    parent_version_id: Some(v1.version_id()),
                    ..Default::default()
                },
                t0(),
            ))
            .unwrap();
        branch.commit().unwrap();

        assert!(purge.commit().is_err());
        assert_eq!(store.versions_of(v1.root_id()).unwrap().len(), 2);
    }

    #[test]
    fn test_events_published_only_on_commit() {
        let log = Arc::new(MemoryEventLog::new());
        let store: MemoryStore<Note> = MemoryStore::with_publisher(log.clone());
        let record = VersionRecord::on_branch(RootId::new(), "main", note("v1"), t0());
        let event = VersionEvent::new(ChangeKind::Created, Note::TABLE, &record.key(), t0());

        let mut tx = store.begin().unwrap();
        tx.insert(record.clone()).unwrap();
        tx.record_event(event.clone());
        tx.rollback();
        assert!(log.is_empty());

        let mut tx = store.begin().unwrap();
        tx.insert(record).unwrap();
        tx.record_event(event);
        tx.commit().unwrap();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_table_rejects_two_open_heads() {
        let root = RootId::new();
        let a = VersionRecord::on_branch(root, "main", note("a"), t0());
        let b = VersionRecord::on_branch(root, "main", note("b"), t0());
        assert!(matches!(
            Table::from_records(vec![a, b]),
            Err(EvcError::StorageUnavailable(_))
        ));
    }
}
