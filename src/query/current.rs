use crate::errors::EvcResult;
use crate::model::{RecordKey, VersionId, VersionRecord, Versioned, VersionedEntity};
use crate::store::VersionReader;

/// The current version of `key`.
///
/// With `include_deleted`, a soft-deleted open head is returned too.
pub fn current<E, R>(
    reader: &R,
    key: &RecordKey,
    include_deleted: bool,
) -> EvcResult<Option<VersionRecord<E>>>
where
    E: VersionedEntity,
    R: VersionReader<E> + ?Sized,
{
    Ok(reader
        .head(key)?
        .filter(|head| include_deleted || head.is_current()))
}

pub fn get_version<E, R>(reader: &R, id: VersionId) -> EvcResult<Option<VersionRecord<E>>>
where
    E: VersionedEntity,
    R: VersionReader<E> + ?Sized,
{
    reader.get(id)
}

/// Current versions on `branch`, ordered by root id, paged.
pub fn list_current<E, R>(
    reader: &R,
    branch: Option<&str>,
    skip: usize,
    limit: usize,
) -> EvcResult<Vec<VersionRecord<E>>>
where
    E: VersionedEntity,
    R: VersionReader<E> + ?Sized,
{
    let mut page = Vec::new();
    let mut skipped = 0;
    for root_id in reader.root_ids()? {
        if page.len() >= limit {
            break;
        }
        let key = RecordKey::new(root_id, branch);
        if let Some(record) = current::<E, R>(reader, &key, false)? {
            if skipped < skip {
                skipped += 1;
            } else {
                page.push(record);
            }
        }
    }
    Ok(page)
}
