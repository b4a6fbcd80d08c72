//! # Merged-View Projector
//!
//! Compares the current versions of two branches, root by root. Read-only:
//! nothing here writes or touches invariants.
//!
//! Relative to `base`, a root on `feature` is:
//! - `Unchanged` - same payload on both
//! - `Created` - current only on `feature`
//! - `Updated` - current on both, payload differs
//! - `Deleted` - current on `base`, absent or soft-deleted on `feature`

use serde::Serialize;
use serde_json::Map;

use crate::errors::EvcResult;
use crate::model::{diff_fields, fields_of, FieldDiff, RecordKey, RootId, VersionId, VersionedEntity};
use crate::query;
use crate::store::VersionReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewChange {
    Unchanged,
    Created,
    Updated,
    Deleted,
}

/// Comparison result for one root
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewEntry {
    pub root_id: RootId,
    pub change: ViewChange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_version: Option<VersionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_version: Option<VersionId>,
    /// Field-level differences, base to feature
    pub diffs: Vec<FieldDiff>,
}

/// Comparison of two whole branches
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedView {
    pub base: String,
    pub feature: String,
    pub entries: Vec<ViewEntry>,
}

impl MergedView {
    /// Entries other than `Unchanged`.
    pub fn changes(&self) -> impl Iterator<Item = &ViewEntry> {
        self.entries
            .iter()
            .filter(|e| e.change != ViewChange::Unchanged)
    }

    pub fn count(&self, change: ViewChange) -> usize {
        self.entries.iter().filter(|e| e.change == change).count()
    }
}

/// Compares one root on two branches.
///
/// `None` if the root is current on neither.
pub fn compare<E, R>(
    reader: &R,
    root_id: RootId,
    base: &str,
    feature: &str,
) -> EvcResult<Option<ViewEntry>>
where
    E: VersionedEntity,
    R: VersionReader<E> + ?Sized,
{
    let base_head = query::current::<E, R>(reader, &RecordKey::on_branch(root_id, base), false)?;
    let feature_head =
        query::current::<E, R>(reader, &RecordKey::on_branch(root_id, feature), false)?;

    let before = match &base_head {
        Some(record) => fields_of(record.payload())?,
        None => Map::new(),
    };
    let after = match &feature_head {
        Some(record) => fields_of(record.payload())?,
        None => Map::new(),
    };
    let diffs = diff_fields(&before, &after);

    let change = match (&base_head, &feature_head) {
        (None, None) => return Ok(None),
        (None, Some(_)) => ViewChange::Created,
        (Some(_), None) => ViewChange::Deleted,
        (Some(_), Some(_)) if diffs.is_empty() => ViewChange::Unchanged,
        (Some(_), Some(_)) => ViewChange::Updated,
    };

    Ok(Some(ViewEntry {
        root_id,
        change,
        base_version: base_head.map(|r| r.version_id()),
        feature_version: feature_head.map(|r| r.version_id()),
        diffs,
    }))
}

/// Compares every root current on either branch.
pub fn compare_branches<E, R>(reader: &R, base: &str, feature: &str) -> EvcResult<MergedView>
where
    E: VersionedEntity,
    R: VersionReader<E> + ?Sized,
{
    let mut entries = Vec::new();
    for root_id in reader.root_ids()? {
        if let Some(entry) = compare::<E, R>(reader, root_id, base, feature)? {
            entries.push(entry);
        }
    }
    Ok(MergedView {
        base: base.to_string(),
        feature: feature.to_string(),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Create, CreateBranch, SoftDelete, Update, VersionCommand};
    use crate::model::{BranchableEntity, Entity};
    use crate::store::{MemoryStore, UnitOfWork, VersionStore};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Shelf {
        label: String,
        slots: u32,
    }

    impl Entity for Shelf {
        const TABLE: &'static str = "shelves";
    }
    impl VersionedEntity for Shelf {}
    impl BranchableEntity for Shelf {}

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn apply<C: VersionCommand<Shelf>>(store: &MemoryStore<Shelf>, command: C, at: i64) {
        let mut tx = store.begin().unwrap();
        command.execute(&mut tx, t(at)).unwrap();
        tx.commit().unwrap();
    }

    fn shelf(store: &MemoryStore<Shelf>, label: &str) -> RootId {
        let root = RootId::new();
        apply(
            store,
            Create {
                key: RecordKey::on_branch(root, "main"),
                payload: Shelf {
                    label: label.into(),
                    slots: 4,
                },
            },
            0,
        );
        apply(
            store,
            CreateBranch {
                root_id: root,
                branch: "co-1".into(),
                from_branch: "main".into(),
            },
            1,
        );
        root
    }

    #[test]
    fn test_branch_projection() {
        let store = MemoryStore::new();
        let same = shelf(&store, "same");
        let changed = shelf(&store, "changed");
        let removed = shelf(&store, "removed");

        apply(
            &store,
            Update {
                key: RecordKey::on_branch(changed, "co-1"),
                changes: json!({"slots": 6}).as_object().cloned().unwrap(),
            },
            2,
        );
        apply(
            &store,
            SoftDelete {
                key: RecordKey::on_branch(removed, "co-1"),
            },
            3,
        );
        let added = RootId::new();
        apply(
            &store,
            Create {
                key: RecordKey::on_branch(added, "co-1"),
                payload: Shelf {
                    label: "new".into(),
                    slots: 1,
                },
            },
            4,
        );

        let view = compare_branches::<Shelf, _>(&store, "main", "co-1").unwrap();
        let change_of = |root: RootId| {
            view.entries
                .iter()
                .find(|e| e.root_id == root)
                .map(|e| e.change)
        };

        assert_eq!(change_of(same), Some(ViewChange::Unchanged));
        assert_eq!(change_of(changed), Some(ViewChange::Updated));
        assert_eq!(change_of(removed), Some(ViewChange::Deleted));
        assert_eq!(change_of(added), Some(ViewChange::Created));
        assert_eq!(view.changes().count(), 3);

        let updated = compare::<Shelf, _>(&store, changed, "main", "co-1")
            .unwrap()
            .unwrap();
        assert_eq!(updated.diffs.len(), 1);
        assert_eq!(updated.diffs[0].field, "slots");
        assert_eq!(updated.diffs[0].before, Some(json!(4)));
        assert_eq!(updated.diffs[0].after, Some(json!(6)));
    }

    #[test]
    fn test_projection_reads_staged_state() {
        let store = MemoryStore::new();
        let root = shelf(&store, "a");

        let mut tx = store.begin().unwrap();
        Update {
            key: RecordKey::on_branch(root, "co-1"),
            changes: json!({"label": "b"}).as_object().cloned().unwrap(),
        }
        .execute(&mut tx, t(5))
        .map(|_: crate::model::VersionRecord<Shelf>| ())
        .unwrap();

        let staged = compare::<Shelf, _>(&tx, root, "main", "co-1").unwrap().unwrap();
        assert_eq!(staged.change, ViewChange::Updated);
        tx.rollback();

        let committed = compare::<Shelf, _>(&store, root, "main", "co-1")
            .unwrap()
            .unwrap();
        assert_eq!(committed.change, ViewChange::Unchanged);
    }
}
