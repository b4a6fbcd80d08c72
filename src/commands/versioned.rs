//! Versioned-tier commands
//!
//! Every command here works on both tiers with history; the key decides
//! whether a branch is involved.

use chrono::{DateTime, Utc};

use super::{check_branch, clear_head, require_current, VersionCommand};
use crate::errors::{EvcError, EvcResult};
use crate::events::{ChangeKind, VersionEvent};
use crate::model::{
    apply_changes, Changes, CloneOverrides, RecordKey, RootId, VersionId, VersionRecord,
    Versioned, VersionedEntity,
};
use crate::store::UnitOfWork;

/// Inserts the first version of a lineage.
///
/// If the key's open head is soft-deleted, that head is closed and a new
/// lineage starts without a parent.
#[derive(Debug, Clone)]
pub struct Create<E> {
    pub key: RecordKey,
    pub payload: E,
}

impl<E: VersionedEntity> VersionCommand<E> for Create<E> {
    type Output = VersionRecord<E>;

    fn name(&self) -> &'static str {
        "create"
    }

    fn execute<U: UnitOfWork<E>>(self, unit: &mut U, now: DateTime<Utc>) -> EvcResult<Self::Output> {
        check_branch(&self.key)?;
        let previous = clear_head::<E, _>(unit, &self.key, now, EvcError::already_exists)?;

        let record = VersionRecord::build(self.key.root_id, self.key.branch.clone(), self.payload, now);
        unit.insert(record.clone())?;
        unit.record_event(
            VersionEvent::new(ChangeKind::Created, E::TABLE, &self.key, now)
                .with_version(record.version_id())
                .with_previous(previous.map(|p| p.version_id())),
        );
        Ok(record)
    }
}

/// Closes the current version and inserts a changed clone of it.
#[derive(Debug, Clone)]
pub struct Update {
    pub key: RecordKey,
    pub changes: Changes,
}

impl<E: VersionedEntity> VersionCommand<E> for Update {
    type Output = VersionRecord<E>;

    fn name(&self) -> &'static str {
        "update"
    }

    fn execute<U: UnitOfWork<E>>(self, unit: &mut U, now: DateTime<Utc>) -> EvcResult<Self::Output> {
        let current = require_current::<E, _>(&*unit, &self.key)?;
        let payload = apply_changes(current.payload(), &self.changes)?;

        unit.close(current.version_id(), now)?;
        let next = current.clone_version(
            CloneOverrides {
                parent_version_id: Some(current.version_id()),
                payload: Some(payload),
                ..Default::default()
            },
            now,
        );
        unit.insert(next.clone())?;
        unit.record_event(
            VersionEvent::new(ChangeKind::Updated, E::TABLE, &self.key, now)
                .with_version(next.version_id())
                .with_previous(Some(current.version_id())),
        );
        Ok(next)
    }
}

/// Flags the current version deleted. No row is added.
#[derive(Debug, Clone)]
pub struct SoftDelete {
    pub key: RecordKey,
}

impl<E: VersionedEntity> VersionCommand<E> for SoftDelete {
    type Output = VersionRecord<E>;

    fn name(&self) -> &'static str {
        "soft_delete"
    }

    fn execute<U: UnitOfWork<E>>(self, unit: &mut U, now: DateTime<Utc>) -> EvcResult<Self::Output> {
        let current = require_current::<E, _>(&*unit, &self.key)?;
        let deleted = unit.set_deleted(current.version_id(), Some(now))?;
        unit.record_event(
            VersionEvent::new(ChangeKind::Deleted, E::TABLE, &self.key, now)
                .with_version(deleted.version_id()),
        );
        Ok(deleted)
    }
}

/// Clears the deletion flag on the open head.
#[derive(Debug, Clone)]
pub struct Undelete {
    pub key: RecordKey,
}

impl<E: VersionedEntity> VersionCommand<E> for Undelete {
    type Output = VersionRecord<E>;

    fn name(&self) -> &'static str {
        "undelete"
    }

    fn execute<U: UnitOfWork<E>>(self, unit: &mut U, now: DateTime<Utc>) -> EvcResult<Self::Output> {
        let head = unit
            .head(&self.key)?
            .ok_or_else(|| EvcError::no_current(&self.key))?;
        if !head.is_deleted() {
            return Err(EvcError::already_exists(&self.key));
        }

        let restored = unit.set_deleted(head.version_id(), None)?;
        unit.record_event(
            VersionEvent::new(ChangeKind::Undeleted, E::TABLE, &self.key, now)
                .with_version(restored.version_id()),
        );
        Ok(restored)
    }
}

/// Makes an earlier state current again as a new version.
///
/// The target is `to_version` when given, otherwise the current version's
/// parent. The new version's parent is the version reverted from.
#[derive(Debug, Clone)]
pub struct Revert {
    pub key: RecordKey,
    pub to_version: Option<VersionId>,
}

impl<E: VersionedEntity> VersionCommand<E> for Revert {
    type Output = VersionRecord<E>;

    fn name(&self) -> &'static str {
        "revert"
    }

    fn execute<U: UnitOfWork<E>>(self, unit: &mut U, now: DateTime<Utc>) -> EvcResult<Self::Output> {
        let current = require_current::<E, _>(&*unit, &self.key)?;

        let target_id = self
            .to_version
            .or_else(|| current.parent())
            .ok_or_else(|| EvcError::no_parent(&self.key))?;
        let target = unit
            .get(target_id)?
            .filter(|t| t.root_id() == self.key.root_id)
            .ok_or_else(|| EvcError::no_parent(&self.key))?;

        unit.close(current.version_id(), now)?;
        let reverted = target.clone_version(
            CloneOverrides {
                branch: self.key.branch.clone(),
                parent_version_id: Some(current.version_id()),
                ..Default::default()
            },
            now,
        );
        unit.insert(reverted.clone())?;
        unit.record_event(
            VersionEvent::new(ChangeKind::Reverted, E::TABLE, &self.key, now)
                .with_version(reverted.version_id())
                .with_previous(Some(current.version_id())),
        );
        Ok(reverted)
    }
}

/// Physically removes every version of a root on every branch.
///
/// Refused while any branch still has a live current version.
#[derive(Debug, Clone, Copy)]
pub struct Purge {
    pub root_id: RootId,
}

impl<E: VersionedEntity> VersionCommand<E> for Purge {
    type Output = usize;

    fn name(&self) -> &'static str {
        "purge"
    }

    fn execute<U: UnitOfWork<E>>(self, unit: &mut U, now: DateTime<Utc>) -> EvcResult<usize> {
        let versions = unit.versions_of(self.root_id)?;
        if versions.iter().any(|v| v.is_current()) {
            return Err(EvcError::NotDeleted(self.root_id));
        }
        if versions.is_empty() {
            return Ok(0);
        }

        let removed = unit.purge(self.root_id)?;
        unit.record_event(VersionEvent::new(
            ChangeKind::Purged,
            E::TABLE,
            &RecordKey::unbranched(self.root_id),
            now,
        ));
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Entity;
    use crate::store::{MemoryStore, VersionReader, VersionStore};
    use chrono::{Duration, TimeZone};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Invoice {
        number: String,
        total: i64,
    }

    impl Entity for Invoice {
        const TABLE: &'static str = "invoices";
    }
    impl VersionedEntity for Invoice {}

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 8, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn invoice(total: i64) -> Invoice {
        Invoice {
            number: "INV-1".into(),
            total,
        }
    }

    fn changes(value: serde_json::Value) -> Changes {
        value.as_object().cloned().unwrap()
    }

    fn run<C>(store: &MemoryStore<Invoice>, command: C, now: DateTime<Utc>) -> EvcResult<C::Output>
    where
        C: VersionCommand<Invoice>,
    {
        let mut tx = store.begin()?;
        let out = command.execute(&mut tx, now)?;
        tx.commit()?;
        Ok(out)
    }

    fn created(store: &MemoryStore<Invoice>) -> VersionRecord<Invoice> {
        let key = RecordKey::unbranched(RootId::new());
        run(store, Create { key, payload: invoice(100) }, t(0)).unwrap()
    }

    #[test]
    fn test_create_twice_fails() {
        let store = MemoryStore::new();
        let v1 = created(&store);
        let err = run(
            &store,
            Create {
                key: v1.key(),
                payload: invoice(1),
            },
            t(1),
        )
        .unwrap_err();
        assert!(matches!(err, EvcError::AlreadyExists { .. }));
    }

    #[test]
    fn test_update_closes_and_links() {
        let store = MemoryStore::new();
        let v1 = created(&store);
        let update = Update {
            key: v1.key(),
            changes: changes(json!({"total": 150})),
        };
        let v2: VersionRecord<Invoice> = run(&store, update, t(5)).unwrap();

        assert_eq!(v2.parent(), Some(v1.version_id()));
        assert_eq!(v2.payload().total, 150);
        assert_eq!(v2.payload().number, "INV-1");

        let closed = store.get(v1.version_id()).unwrap().unwrap();
        assert_eq!(closed.valid_time().end(), Some(t(5)));
        assert_eq!(closed.transaction_time().end(), Some(t(5)));
        assert_eq!(closed.payload().total, 100);
    }

    #[test]
    fn test_update_without_current_fails() {
        let store: MemoryStore<Invoice> = MemoryStore::new();
        let update = Update {
            key: RecordKey::unbranched(RootId::new()),
            changes: changes(json!({"total": 1})),
        };
        let err = run::<Update>(&store, update, t(0)).unwrap_err();
        assert!(matches!(err, EvcError::NoCurrentVersion { .. }));
    }

    #[test]
    fn test_bad_changes_leave_store_untouched() {
        let store = MemoryStore::new();
        let v1 = created(&store);
        let update = Update {
            key: v1.key(),
            changes: changes(json!({"total": "lots"})),
        };
        let err = run::<Update>(&store, update, t(1)).unwrap_err();
        assert!(matches!(err, EvcError::InvalidChanges(_)));
        assert!(store.get(v1.version_id()).unwrap().unwrap().is_current());
    }

    #[test]
    fn test_soft_delete_and_undelete_flip_flag() {
        let store = MemoryStore::new();
        let v1 = created(&store);

        let deleted: VersionRecord<Invoice> =
            run(&store, SoftDelete { key: v1.key() }, t(1)).unwrap();
        assert_eq!(deleted.version_id(), v1.version_id());
        assert_eq!(deleted.deleted_at(), Some(t(1)));
        assert_eq!(store.versions_of(v1.root_id()).unwrap().len(), 1);

        let again = run::<SoftDelete>(&store, SoftDelete { key: v1.key() }, t(2)).unwrap_err();
        assert!(matches!(again, EvcError::NoCurrentVersion { .. }));

        let restored: VersionRecord<Invoice> =
            run(&store, Undelete { key: v1.key() }, t(3)).unwrap();
        assert!(restored.is_current());

        let live = run::<Undelete>(&store, Undelete { key: v1.key() }, t(4)).unwrap_err();
        assert!(matches!(live, EvcError::AlreadyExists { .. }));
    }

    #[test]
    fn test_create_after_soft_delete_starts_new_lineage() {
        let store = MemoryStore::new();
        let v1 = created(&store);
        run::<SoftDelete>(&store, SoftDelete { key: v1.key() }, t(1)).unwrap();

        let fresh = run(
            &store,
            Create {
                key: v1.key(),
                payload: invoice(5),
            },
            t(2),
        )
        .unwrap();
        assert_eq!(fresh.parent(), None);
        assert!(!store.get(v1.version_id()).unwrap().unwrap().is_open());
    }

    #[test]
    fn test_revert_to_parent() {
        let store = MemoryStore::new();
        let v1 = created(&store);
        let v2: VersionRecord<Invoice> = run(
            &store,
            Update {
                key: v1.key(),
                changes: changes(json!({"total": 999})),
            },
            t(1),
        )
        .unwrap();

        let v3: VersionRecord<Invoice> = run(
            &store,
            Revert {
                key: v1.key(),
                to_version: None,
            },
            t(2),
        )
        .unwrap();

        assert_eq!(v3.payload(), v1.payload());
        assert_eq!(v3.parent(), Some(v2.version_id()));
        assert_eq!(v3.merged_from(), None);
        assert_eq!(store.versions_of(v1.root_id()).unwrap().len(), 3);
    }

    #[test]
    fn test_revert_without_target_fails() {
        let store = MemoryStore::new();
        let v1 = created(&store);
        let err = run::<Revert>(
            &store,
            Revert {
                key: v1.key(),
                to_version: None,
            },
            t(1),
        )
        .unwrap_err();
        assert!(matches!(err, EvcError::NoParent { .. }));

        let foreign = created(&store);
        let err = run::<Revert>(
            &store,
            Revert {
                key: v1.key(),
                to_version: Some(foreign.version_id()),
            },
            t(1),
        )
        .unwrap_err();
        assert!(matches!(err, EvcError::NoParent { .. }));
    }

    #[test]
    fn test_purge_requires_deleted_lineage() {
        let store = MemoryStore::new();
        let v1 = created(&store);

        let err = run::<Purge>(&store, Purge { root_id: v1.root_id() }, t(1)).unwrap_err();
        assert_eq!(err, EvcError::NotDeleted(v1.root_id()));

        run::<SoftDelete>(&store, SoftDelete { key: v1.key() }, t(2)).unwrap();
        let removed: usize = run(&store, Purge { root_id: v1.root_id() }, t(3)).unwrap();
        assert_eq!(removed, 1);
        assert!(store.versions_of(v1.root_id()).unwrap().is_empty());
    }
}
