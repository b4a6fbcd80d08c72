//! Service for the Plain tier: no temporal semantics

use std::marker::PhantomData;
use std::sync::Arc;

use uuid::Uuid;

use super::execute_plain;
use crate::commands::{PlainCreate, PlainDelete, PlainUpdate};
use crate::errors::EvcResult;
use crate::model::{Changes, Clock, PlainEntity, PlainRecord};
use crate::observability::MetricsRegistry;
use crate::store::PlainUnitOfWork;

#[derive(Debug)]
pub struct PlainService<E> {
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsRegistry>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for PlainService<E> {
    fn clone(&self) -> Self {
        Self {
            clock: Arc::clone(&self.clock),
            metrics: Arc::clone(&self.metrics),
            _entity: PhantomData,
        }
    }
}

impl<E: PlainEntity> PlainService<E> {
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

    pub fn get<U: PlainUnitOfWork<E>>(&self, unit: &U, id: Uuid) -> EvcResult<Option<PlainRecord<E>>> {
        unit.get(id)
    }

    pub fn list<U: PlainUnitOfWork<E>>(
        &self,
        unit: &U,
        skip: usize,
        limit: usize,
    ) -> EvcResult<Vec<PlainRecord<E>>> {
        unit.list(skip, limit)
    }

    pub fn create<U: PlainUnitOfWork<E>>(&self, unit: &mut U, data: E) -> EvcResult<PlainRecord<E>> {
        execute_plain::<E, _, _>(&self.metrics, PlainCreate { data }, unit, self.clock.now())
    }

    /// Applies `changes` in place.
    pub fn update<U: PlainUnitOfWork<E>>(
        &self,
        unit: &mut U,
        id: Uuid,
        changes: Changes,
    ) -> EvcResult<PlainRecord<E>> {
        execute_plain::<E, _, _>(&self.metrics, PlainUpdate { id, changes }, unit, self.clock.now())
    }

    /// Irreversible.
    pub fn delete<U: PlainUnitOfWork<E>>(&self, unit: &mut U, id: Uuid) -> EvcResult<()> {
        execute_plain::<E, _, _>(&self.metrics, PlainDelete { id }, unit, self.clock.now())
    }
}
