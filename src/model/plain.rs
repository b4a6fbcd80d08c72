//! PlainRecord - mutable-in-place record without history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::changes::{apply_changes, Changes};
use super::entity::{Identified, PlainEntity, Timestamped};
use crate::errors::EvcResult;

/// A plain-tier row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlainRecord<E> {
    id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    data: E,
}

impl<E: PlainEntity> PlainRecord<E> {
    pub fn new(data: E, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            data,
        }
    }

    #[inline]
    pub fn data(&self) -> &E {
        &self.data
    }

    /// Applies `changes` in place and bumps `updated_at`.
    pub(crate) fn apply(&mut self, changes: &Changes, now: DateTime<Utc>) -> EvcResult<()> {
        self.data = apply_changes(&self.data, changes)?;
        self.updated_at = now;
        Ok(())
    }
}

impl<E> Identified for PlainRecord<E> {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl<E> Timestamped for PlainRecord<E> {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
