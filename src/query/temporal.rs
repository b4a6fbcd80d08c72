//! As-of lookups and history
//!
//! A row closed at `c` was superseded at `c` in both dimensions. Before `c`
//! nobody knew its validity would end, so for `known_at < c` its valid time
//! is read as open. A soft delete at `d` hides the row for business times and
//! knowledge times both at or after `d`.

use chrono::{DateTime, Utc};

use crate::errors::EvcResult;
use crate::model::{RecordKey, VersionRecord, Versioned, VersionedEntity};
use crate::store::VersionReader;

/// Whether `record` answers "what did we believe at `known_at` about
/// `valid_at`".
pub fn is_visible<E: VersionedEntity>(
    record: &VersionRecord<E>,
    valid_at: DateTime<Utc>,
    known_at: DateTime<Utc>,
) -> bool {
    let tx = record.transaction_time();
    if tx.start() > known_at {
        return false;
    }

    let valid = record.valid_time();
    let valid_then = match tx.end() {
        Some(end) if known_at < end => valid.start() <= valid_at,
        _ => valid.contains(valid_at),
    };
    if !valid_then {
        return false;
    }

    match record.deleted_at() {
        Some(deleted) => valid_at < deleted || known_at < deleted,
        None => true,
    }
}

/// The version of `key` valid at `valid_at` as recorded by `known_at`.
///
/// `None` when the entity did not exist, or was deleted, at that point.
pub fn as_of<E, R>(
    reader: &R,
    key: &RecordKey,
    valid_at: DateTime<Utc>,
    known_at: DateTime<Utc>,
) -> EvcResult<Option<VersionRecord<E>>>
where
    E: VersionedEntity,
    R: VersionReader<E> + ?Sized,
{
    Ok(reader
        .versions_of(key.root_id)?
        .into_iter()
        .filter(|r| r.branch_name() == key.branch.as_deref())
        .filter(|r| is_visible(r, valid_at, known_at))
        .max_by_key(|r| r.transaction_time().start()))
}

/// Every version of `key` ordered by valid-time start.
///
/// Soft-deleted versions are skipped unless `include_deleted`.
pub fn history<E, R>(
    reader: &R,
    key: &RecordKey,
    include_deleted: bool,
) -> EvcResult<Vec<VersionRecord<E>>>
where
    E: VersionedEntity,
    R: VersionReader<E> + ?Sized,
{
    let mut versions: Vec<VersionRecord<E>> = reader
        .versions_of(key.root_id)?
        .into_iter()
        .filter(|r| r.branch_name() == key.branch.as_deref())
        .filter(|r| include_deleted || !r.is_deleted())
        .collect();
    versions.sort_by_key(|r| r.valid_time().start());
    Ok(versions)
}
