//! Plain-tier commands: in-place writes, hard delete

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::{EvcError, EvcResult};
use crate::model::{Changes, PlainEntity, PlainRecord};
use crate::store::PlainUnitOfWork;

/// A mutation of plain rows.
pub trait PlainCommand<E: PlainEntity> {
    type Output;

    fn name(&self) -> &'static str;

    fn execute<U: PlainUnitOfWork<E>>(self, unit: &mut U, now: DateTime<Utc>)
        -> EvcResult<Self::Output>;
}

#[derive(Debug, Clone)]
pub struct PlainCreate<E> {
    pub data: E,
}

impl<E: PlainEntity> PlainCommand<E> for PlainCreate<E> {
    type Output = PlainRecord<E>;

    fn name(&self) -> &'static str {
        "plain_create"
    }

    fn execute<U: PlainUnitOfWork<E>>(self, unit: &mut U, now: DateTime<Utc>) -> EvcResult<Self::Output> {
        let record = PlainRecord::new(self.data, now);
        unit.put(record.clone())?;
        Ok(record)
    }
}

/// Applies changes in place and bumps `updated_at`.
#[derive(Debug, Clone)]
pub struct PlainUpdate {
    pub id: Uuid,
    pub changes: Changes,
}

impl<E: PlainEntity> PlainCommand<E> for PlainUpdate {
    type Output = PlainRecord<E>;

    fn name(&self) -> &'static str {
        "plain_update"
    }

    fn execute<U: PlainUnitOfWork<E>>(self, unit: &mut U, now: DateTime<Utc>) -> EvcResult<Self::Output> {
        let mut record = unit.get(self.id)?.ok_or(EvcError::EntityNotFound(self.id))?;
        record.apply(&self.changes, now)?;
        unit.put(record.clone())?;
        Ok(record)
    }
}

/// Removes the row for good.
#[derive(Debug, Clone, Copy)]
pub struct PlainDelete {
    pub id: Uuid,
}

impl<E: PlainEntity> PlainCommand<E> for PlainDelete {
    type Output = ();

    fn name(&self) -> &'static str {
        "plain_delete"
    }

    fn execute<U: PlainUnitOfWork<E>>(self, unit: &mut U, _now: DateTime<Utc>) -> EvcResult<()> {
        if !unit.remove(self.id)? {
            return Err(EvcError::EntityNotFound(self.id));
        }
        Ok(())
    }
}
