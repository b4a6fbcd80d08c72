//! Service for the Versioned tier (history, no branches)

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::execute;
use crate::commands::{Create, Purge, Revert, SoftDelete, Undelete, Update};
use crate::errors::EvcResult;
use crate::model::{Changes, Clock, RecordKey, RootId, VersionId, VersionRecord, VersionedEntity};
use crate::observability::MetricsRegistry;
use crate::query;
use crate::store::{UnitOfWork, VersionReader};

/// Versioned-tier operations for entity `E`.
#[derive(Debug)]
pub struct VersionedService<E> {
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsRegistry>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for VersionedService<E> {
    fn clone(&self) -> Self {
        Self {
            clock: Arc::clone(&self.clock),
            metrics: Arc::clone(&self.metrics),
            _entity: PhantomData,
        }
    }
}

impl<E: VersionedEntity> VersionedService<E> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            metrics: Arc::new(MetricsRegistry::new()),
            _entity: PhantomData,
        }
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn create<U: UnitOfWork<E>>(
        &self,
        unit: &mut U,
        root_id: RootId,
        payload: E,
    ) -> EvcResult<VersionRecord<E>> {
        let command = Create {
            key: RecordKey::unbranched(root_id),
            payload,
        };
        execute::<E, _, _>(&self.metrics, command, unit, self.clock.now())
    }

    pub fn get_current<R: VersionReader<E> + ?Sized>(
        &self,
        reader: &R,
        root_id: RootId,
        include_deleted: bool,
    ) -> EvcResult<Option<VersionRecord<E>>> {
        query::current(reader, &RecordKey::unbranched(root_id), include_deleted)
    }

    /// The version valid at `instant`, as recorded now.
    pub fn get_at<R: VersionReader<E> + ?Sized>(
        &self,
        reader: &R,
        root_id: RootId,
        instant: DateTime<Utc>,
    ) -> EvcResult<Option<VersionRecord<E>>> {
        self.get_as_of(reader, root_id, instant, self.clock.now())
    }

    pub fn get_as_of<R: VersionReader<E> + ?Sized>(
        &self,
        reader: &R,
        root_id: RootId,
        valid_at: DateTime<Utc>,
        known_at: DateTime<Utc>,
    ) -> EvcResult<Option<VersionRecord<E>>> {
        query::as_of(reader, &RecordKey::unbranched(root_id), valid_at, known_at)
    }

    pub fn get_version<R: VersionReader<E> + ?Sized>(
        &self,
        reader: &R,
        version_id: VersionId,
    ) -> EvcResult<Option<VersionRecord<E>>> {
        query::get_version(reader, version_id)
    }

    pub fn update<U: UnitOfWork<E>>(
        &self,
        unit: &mut U,
        root_id: RootId,
        changes: Changes,
    ) -> EvcResult<VersionRecord<E>> {
        let command = Update {
            key: RecordKey::unbranched(root_id),
            changes,
        };
        execute::<E, _, _>(&self.metrics, command, unit, self.clock.now())
    }

    pub fn soft_delete<U: UnitOfWork<E>>(
        &self,
        unit: &mut U,
        root_id: RootId,
    ) -> EvcResult<VersionRecord<E>> {
        let command = SoftDelete {
            key: RecordKey::unbranched(root_id),
        };
        execute::<E, _, _>(&self.metrics, command, unit, self.clock.now())
    }

    pub fn undelete<U: UnitOfWork<E>>(
        &self,
        unit: &mut U,
        root_id: RootId,
    ) -> EvcResult<VersionRecord<E>> {
        let command = Undelete {
            key: RecordKey::unbranched(root_id),
        };
        execute::<E, _, _>(&self.metrics, command, unit, self.clock.now())
    }

    pub fn revert<U: UnitOfWork<E>>(
        &self,
        unit: &mut U,
        root_id: RootId,
        to_version: Option<VersionId>,
    ) -> EvcResult<VersionRecord<E>> {
        let command = Revert {
            key: RecordKey::unbranched(root_id),
            to_version,
        };
        execute::<E, _, _>(&self.metrics, command, unit, self.clock.now())
    }

    /// Hard delete of a fully soft-deleted lineage.
    pub fn purge<U: UnitOfWork<E>>(&self, unit: &mut U, root_id: RootId) -> EvcResult<usize> {
        execute::<E, _, _>(&self.metrics, Purge { root_id }, unit, self.clock.now())
    }

    pub fn history<R: VersionReader<E> + ?Sized>(
        &self,
        reader: &R,
        root_id: RootId,
        include_deleted: bool,
    ) -> EvcResult<Vec<VersionRecord<E>>> {
        query::history(reader, &RecordKey::unbranched(root_id), include_deleted)
    }

    pub fn lineage<R: VersionReader<E> + ?Sized>(
        &self,
        reader: &R,
        version_id: VersionId,
    ) -> EvcResult<Vec<VersionRecord<E>>> {
        query::lineage(reader, version_id)
    }

    pub fn list_current<R: VersionReader<E> + ?Sized>(
        &self,
        reader: &R,
        skip: usize,
        limit: usize,
    ) -> EvcResult<Vec<VersionRecord<E>>> {
        query::list_current(reader, None, skip, limit)
    }
}
