//! Plain-tier table: one mutable row per entity, hard delete only

use std::collections::HashMap;
use std::mem;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use super::CommitReceipt;
use crate::errors::{EvcError, EvcResult};
use crate::model::{Identified, PlainEntity, PlainRecord, RecordKey, RootId};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};

/// Staged access to plain rows.
pub trait PlainUnitOfWork<E: PlainEntity> {
    fn get(&self, id: Uuid) -> EvcResult<Option<PlainRecord<E>>>;

    /// Rows in insertion order, paged.
    fn list(&self, skip: usize, limit: usize) -> EvcResult<Vec<PlainRecord<E>>>;

    /// Inserts or replaces a row.
    fn put(&mut self, record: PlainRecord<E>) -> EvcResult<()>;

    /// Removes a row. Returns whether it existed.
    fn remove(&mut self, id: Uuid) -> EvcResult<bool>;

    fn commit(self) -> EvcResult<CommitReceipt>
    where
        Self: Sized;

    fn rollback(self)
    where
        Self: Sized;
}

/// Source of plain units of work.
pub trait PlainStore<E: PlainEntity> {
    type Unit: PlainUnitOfWork<E>;

    fn begin(&self) -> EvcResult<Self::Unit>;
}

#[derive(Debug)]
struct PlainTable<E> {
    rows: HashMap<Uuid, (u64, PlainRecord<E>)>,
    next_seq: u64,
}

impl<E> Default for PlainTable<E> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            next_seq: 0,
        }
    }
}

/// In-memory plain table.
#[derive(Debug)]
pub struct MemoryPlainStore<E> {
    table: Arc<RwLock<PlainTable<E>>>,
    metrics: Arc<MetricsRegistry>,
}

impl<E> Clone for MemoryPlainStore<E> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<E: PlainEntity> Default for MemoryPlainStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: PlainEntity> MemoryPlainStore<E> {
    pub fn new() -> Self {
        Self {
            table: Arc::new(RwLock::new(PlainTable::default())),
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }
}

impl<E: PlainEntity> PlainStore<E> for MemoryPlainStore<E> {
    type Unit = PlainTransaction<E>;

    fn begin(&self) -> EvcResult<PlainTransaction<E>> {
        Ok(PlainTransaction {
            store: self.clone(),
            originals: HashMap::new(),
            writes: HashMap::new(),
            order: Vec::new(),
            finished: false,
        })
    }
}

/// Optimistic unit of work over a `MemoryPlainStore`.
#[derive(Debug)]
pub struct PlainTransaction<E: PlainEntity> {
    store: MemoryPlainStore<E>,
    /// Committed state of every touched id as first seen; `None` if absent
    originals: HashMap<Uuid, Option<PlainRecord<E>>>,
    /// Staged state; `None` means removed
    writes: HashMap<Uuid, Option<PlainRecord<E>>>,
    order: Vec<Uuid>,
    finished: bool,
}

impl<E: PlainEntity> PlainTransaction<E> {
    fn committed(&self, id: Uuid) -> EvcResult<Option<PlainRecord<E>>> {
        let table = self.store.table.read().map_err(|_| EvcError::poisoned())?;
        Ok(table.rows.get(&id).map(|(_, record)| record.clone()))
    }

    fn touch(&mut self, id: Uuid) -> EvcResult<()> {
        if !self.originals.contains_key(&id) {
            let original = self.committed(id)?;
            self.originals.insert(id, original);
            self.order.push(id);
        }
        Ok(())
    }

    fn finish(&mut self) -> EvcResult<CommitReceipt> {
        self.finished = true;
        let originals = mem::take(&mut self.originals);
        let mut writes = mem::take(&mut self.writes);
        let order = mem::take(&mut self.order);

        let mut table = self.store.table.write().map_err(|_| EvcError::poisoned())?;
        for (id, original) in &originals {
            let current = table.rows.get(id).map(|(_, record)| record);
            if current != original.as_ref() {
                self.store.metrics.increment_conflicts();
                log_event_with_fields(
                    Event::CommitConflict,
                    &[("table", E::TABLE), ("id", &id.to_string())],
                );
                return Err(EvcError::conflict(&RecordKey::unbranched(
                    RootId::from_uuid(*id),
                )));
            }
        }

        let mut receipt = CommitReceipt::default();
        for id in order {
            match writes.remove(&id).flatten() {
                Some(record) => match table.rows.get_mut(&id) {
                    Some(row) => {
                        row.1 = record;
                        receipt.modified += 1;
                    }
                    None => {
                        let seq = table.next_seq;
                        table.next_seq += 1;
                        table.rows.insert(id, (seq, record));
                        receipt.inserted += 1;
                    }
                },
                None => {
                    if table.rows.remove(&id).is_some() {
                        receipt.purged += 1;
                    }
                }
            }
        }
        drop(table);

        self.store.metrics.increment_commits();
        log_event_with_fields(
            Event::CommitApplied,
            &[
                ("table", E::TABLE),
                ("inserted", &receipt.inserted.to_string()),
                ("modified", &receipt.modified.to_string()),
                ("purged", &receipt.purged.to_string()),
            ],
        );
        Ok(receipt)
    }
}

impl<E: PlainEntity> PlainUnitOfWork<E> for PlainTransaction<E> {
    fn get(&self, id: Uuid) -> EvcResult<Option<PlainRecord<E>>> {
        match self.writes.get(&id) {
            Some(staged) => Ok(staged.clone()),
            None => self.committed(id),
        }
    }

    fn list(&self, skip: usize, limit: usize) -> EvcResult<Vec<PlainRecord<E>>> {
        let table = self.store.table.read().map_err(|_| EvcError::poisoned())?;
        let mut rows: Vec<(u64, PlainRecord<E>)> = table
            .rows
            .iter()
            .filter_map(|(id, (seq, record))| match self.writes.get(id) {
                Some(Some(staged)) => Some((*seq, staged.clone())),
                Some(None) => None,
                None => Some((*seq, record.clone())),
            })
            .collect();

        let base = table.next_seq;
        for (offset, id) in self.order.iter().enumerate() {
            if table.rows.contains_key(id) {
                continue;
            }
            if let Some(Some(staged)) = self.writes.get(id) {
                rows.push((base + offset as u64, staged.clone()));
            }
        }

        rows.sort_by_key(|(seq, _)| *seq);
        Ok(rows
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|(_, record)| record)
            .collect())
    }

    fn put(&mut self, record: PlainRecord<E>) -> EvcResult<()> {
        let id = record.id();
        self.touch(id)?;
        self.writes.insert(id, Some(record));
        Ok(())
    }

    fn remove(&mut self, id: Uuid) -> EvcResult<bool> {
        let existed = self.get(id)?.is_some();
        self.touch(id)?;
        self.writes.insert(id, None);
        Ok(existed)
    }

    fn commit(mut self) -> EvcResult<CommitReceipt> {
        self.finish()
    }

    fn rollback(self) {}
}

impl<E: PlainEntity> Drop for PlainTransaction<E> {
    fn drop(&mut self) {
        if !self.finished {
            self.store.metrics.increment_rollbacks();
            log_event_with_fields(Event::RolledBack, &[("table", E::TABLE)]);
        }
    }
}
