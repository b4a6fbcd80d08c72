//! # Command Layer
//!
//! One struct per operation. A command reads the clock instant it is given,
//! stages its writes and events in the caller's unit of work, and returns the
//! resulting record. It never commits.
//!
//! Re-running a command creates new versions; nothing is deduplicated.

mod branching;
mod plain;
mod versioned;

pub use branching::{CreateBranch, MergeBranch};
pub use plain::{PlainCommand, PlainCreate, PlainDelete, PlainUpdate};
pub use versioned::{Create, Purge, Revert, SoftDelete, Undelete, Update};

use chrono::{DateTime, Utc};

use crate::errors::{EvcError, EvcResult};
use crate::model::{RecordKey, VersionRecord, Versioned, VersionedEntity};
use crate::store::{UnitOfWork, VersionReader};

/// A mutation of versioned rows.
pub trait VersionCommand<E: VersionedEntity> {
    type Output;

    /// Name used in logs
    fn name(&self) -> &'static str;

    fn execute<U: UnitOfWork<E>>(self, unit: &mut U, now: DateTime<Utc>)
        -> EvcResult<Self::Output>;
}

/// Rejects empty branch labels.
pub(crate) fn check_branch(key: &RecordKey) -> EvcResult<()> {
    match key.branch.as_deref() {
        Some(label) if label.trim().is_empty() => Err(EvcError::InvalidBranch(label.to_string())),
        _ => Ok(()),
    }
}

/// The current version of `key`, or `NoCurrentVersion`.
pub(crate) fn require_current<E, R>(reader: &R, key: &RecordKey) -> EvcResult<VersionRecord<E>>
where
    E: VersionedEntity,
    R: VersionReader<E> + ?Sized,
{
    reader
        .head(key)?
        .filter(|head| head.is_current())
        .ok_or_else(|| EvcError::no_current(key))
}

/// Closes a soft-deleted head so a fresh lineage can start on its key.
///
/// Fails with `live` if the head is current.
pub(crate) fn clear_head<E, U>(
    unit: &mut U,
    key: &RecordKey,
    now: DateTime<Utc>,
    live: fn(&RecordKey) -> EvcError,
) -> EvcResult<Option<VersionRecord<E>>>
where
    E: VersionedEntity,
    U: UnitOfWork<E>,
{
    match unit.head(key)? {
        Some(head) if head.is_current() => Err(live(key)),
        Some(head) => Ok(Some(unit.close(head.version_id(), now)?)),
        None => Ok(None),
    }
}
