//! Parent-link traversal
//!
//! Parents always point to earlier rows, so every walk terminates.

use std::collections::{BTreeSet, HashSet};

use crate::errors::EvcResult;
use crate::model::{RecordKey, RootId, VersionId, VersionRecord, Versioned, VersionedEntity};
use crate::store::VersionReader;

/// `start` followed by its ancestors, newest first.
///
/// Empty if `start` does not exist. A purged ancestor ends the walk.
pub fn lineage<E, R>(reader: &R, start: VersionId) -> EvcResult<Vec<VersionRecord<E>>>
where
    E: VersionedEntity,
    R: VersionReader<E> + ?Sized,
{
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut next = Some(start);

    while let Some(id) = next {
        if !seen.insert(id) {
            break;
        }
        match reader.get(id)? {
            Some(record) => {
                next = record.parent();
                chain.push(record);
            }
            None => break,
        }
    }
    Ok(chain)
}

/// Newest version shared by the lineages of two branches' open heads.
pub fn common_ancestor<E, R>(
    reader: &R,
    root_id: RootId,
    branch_a: &str,
    branch_b: &str,
) -> EvcResult<Option<VersionRecord<E>>>
where
    E: VersionedEntity,
    R: VersionReader<E> + ?Sized,
{
    let head_a = reader.head(&RecordKey::on_branch(root_id, branch_a))?;
    let head_b = reader.head(&RecordKey::on_branch(root_id, branch_b))?;
    let (Some(a), Some(b)) = (head_a, head_b) else {
        return Ok(None);
    };

    let ancestors_a: HashSet<VersionId> = lineage::<E, R>(reader, a.version_id())?
        .iter()
        .map(|r| r.version_id())
        .collect();

    Ok(lineage::<E, R>(reader, b.version_id())?
        .into_iter()
        .find(|r| ancestors_a.contains(&r.version_id())))
}

/// Branch labels of `root_id` that have a current version, sorted.
pub fn branches<E, R>(reader: &R, root_id: RootId) -> EvcResult<Vec<String>>
where
    E: VersionedEntity,
    R: VersionReader<E> + ?Sized,
{
    let labels: BTreeSet<String> = reader
        .versions_of(root_id)?
        .iter()
        .filter(|r| r.is_current())
        .filter_map(|r| r.branch_name().map(str::to_string))
        .collect();
    Ok(labels.into_iter().collect())
}
