//! Service for the Branchable tier
//!
//! Every operation takes a branch label. Mutations targeting a locked branch
//! are rejected with `BranchLocked` before any command runs.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{execute, reject_locked, BranchLocks};
use crate::commands::{
    Create, CreateBranch, MergeBranch, Purge, Revert, SoftDelete, Undelete, Update,
    VersionCommand,
};
use crate::config::EngineConfig;
use crate::errors::EvcResult;
use crate::model::{BranchableEntity, Changes, Clock, RecordKey, RootId, VersionId, VersionRecord};
use crate::observability::MetricsRegistry;
use crate::projector::{self, MergedView, ViewEntry};
use crate::query;
use crate::store::{UnitOfWork, VersionReader};

/// Branchable-tier operations for entity `E`.
#[derive(Debug)]
pub struct BranchableService<E> {
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsRegistry>,
    locks: Arc<BranchLocks>,
    default_branch: String,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for BranchableService<E> {
    fn clone(&self) -> Self {
        Self {
            clock: Arc::clone(&self.clock),
            metrics: Arc::clone(&self.metrics),
            locks: Arc::clone(&self.locks),
            default_branch: self.default_branch.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: BranchableEntity> BranchableService<E> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::from_config(&EngineConfig::default(), clock)
    }

    /// Service with the configured default branch and initial locks.
    pub fn from_config(config: &EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            metrics: Arc::new(MetricsRegistry::new()),
            locks: Arc::new(BranchLocks::with_locked(config.locked_branches.iter().cloned())),
            default_branch: config.default_branch.clone(),
            _entity: PhantomData,
        }
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn locks(&self) -> &BranchLocks {
        &self.locks
    }

    /// Branch used by callers that name none.
    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    pub fn lock_branch(&self, branch: &str) -> EvcResult<bool> {
        self.locks.lock(branch)
    }

    pub fn unlock_branch(&self, branch: &str) -> EvcResult<bool> {
        self.locks.unlock(branch)
    }

    pub fn is_locked(&self, branch: &str) -> EvcResult<bool> {
        self.locks.is_locked(branch)
    }

    fn run<C, U>(&self, branch: &str, command: C, unit: &mut U) -> EvcResult<C::Output>
    where
        C: VersionCommand<E>,
        U: UnitOfWork<E>,
    {
        if self.locks.is_locked(branch)? {
            return reject_locked(&self.metrics, E::TABLE, command.name(), branch);
        }
        execute::<E, _, _>(&self.metrics, command, unit, self.clock.now())
    }

    pub fn create<U: UnitOfWork<E>>(
        &self,
        unit: &mut U,
        root_id: RootId,
        branch: &str,
        payload: E,
    ) -> EvcResult<VersionRecord<E>> {
        let command = Create {
            key: RecordKey::on_branch(root_id, branch),
            payload,
        };
        self.run(branch, command, unit)
    }

    pub fn get_current<R: VersionReader<E> + ?Sized>(
        &self,
        reader: &R,
        root_id: RootId,
        branch: &str,
        include_deleted: bool,
    ) -> EvcResult<Option<VersionRecord<E>>> {
        query::current(reader, &RecordKey::on_branch(root_id, branch), include_deleted)
    }

    /// The version valid at `instant` on `branch`, as recorded now.
    pub fn get_at<R: VersionReader<E> + ?Sized>(
        &self,
        reader: &R,
        root_id: RootId,
        branch: &str,
        instant: DateTime<Utc>,
    ) -> EvcResult<Option<VersionRecord<E>>> {
        self.get_as_of(reader, root_id, branch, instant, self.clock.now())
    }

    pub fn get_as_of<R: VersionReader<E> + ?Sized>(
        &self,
        reader: &R,
        root_id: RootId,
        branch: &str,
        valid_at: DateTime<Utc>,
        known_at: DateTime<Utc>,
    ) -> EvcResult<Option<VersionRecord<E>>> {
        query::as_of(
            reader,
            &RecordKey::on_branch(root_id, branch),
            valid_at,
            known_at,
        )
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
        branch: &str,
        changes: Changes,
    ) -> EvcResult<VersionRecord<E>> {
        let command = Update {
            key: RecordKey::on_branch(root_id, branch),
            changes,
        };
        self.run(branch, command, unit)
    }

    pub fn soft_delete<U: UnitOfWork<E>>(
        &self,
        unit: &mut U,
        root_id: RootId,
        branch: &str,
    ) -> EvcResult<VersionRecord<E>> {
        let command = SoftDelete {
            key: RecordKey::on_branch(root_id, branch),
        };
        self.run(branch, command, unit)
    }

    pub fn undelete<U: UnitOfWork<E>>(
        &self,
        unit: &mut U,
        root_id: RootId,
        branch: &str,
    ) -> EvcResult<VersionRecord<E>> {
        let command = Undelete {
            key: RecordKey::on_branch(root_id, branch),
        };
        self.run(branch, command, unit)
    }

    pub fn create_branch<U: UnitOfWork<E>>(
        &self,
        unit: &mut U,
        root_id: RootId,
        new_branch: &str,
        from_branch: &str,
    ) -> EvcResult<VersionRecord<E>> {
        let command = CreateBranch {
            root_id,
            branch: new_branch.to_string(),
            from_branch: from_branch.to_string(),
        };
        self.run(new_branch, command, unit)
    }

    /// Overwrites `target_branch` with the current state of `source_branch`.
    pub fn merge_branch<U: UnitOfWork<E>>(
        &self,
        unit: &mut U,
        root_id: RootId,
        source_branch: &str,
        target_branch: &str,
    ) -> EvcResult<VersionRecord<E>> {
        let command = MergeBranch {
            root_id,
            source: source_branch.to_string(),
            target: target_branch.to_string(),
        };
        self.run(target_branch, command, unit)
    }

    pub fn revert<U: UnitOfWork<E>>(
        &self,
        unit: &mut U,
        root_id: RootId,
        branch: &str,
        to_version: Option<VersionId>,
    ) -> EvcResult<VersionRecord<E>> {
        let command = Revert {
            key: RecordKey::on_branch(root_id, branch),
            to_version,
        };
        self.run(branch, command, unit)
    }

    /// Hard delete of a root on every branch.
    ///
    /// Rejected if any branch holding versions of the root is locked.
    pub fn purge<U: UnitOfWork<E>>(&self, unit: &mut U, root_id: RootId) -> EvcResult<usize> {
        let command = Purge { root_id };
        for version in unit.versions_of(root_id)? {
            if let Some(branch) = version.branch_name() {
                if self.locks.is_locked(branch)? {
                    return reject_locked(
                        &self.metrics,
                        E::TABLE,
                        VersionCommand::<E>::name(&command),
                        branch,
                    );
                }
            }
        }
        execute::<E, _, _>(&self.metrics, command, unit, self.clock.now())
    }

    pub fn history<R: VersionReader<E> + ?Sized>(
        &self,
        reader: &R,
        root_id: RootId,
        branch: &str,
        include_deleted: bool,
    ) -> EvcResult<Vec<VersionRecord<E>>> {
        query::history(reader, &RecordKey::on_branch(root_id, branch), include_deleted)
    }

    pub fn lineage<R: VersionReader<E> + ?Sized>(
        &self,
        reader: &R,
        version_id: VersionId,
    ) -> EvcResult<Vec<VersionRecord<E>>> {
        query::lineage(reader, version_id)
    }

    /// Newest version both branches descend from.
    pub fn common_ancestor<R: VersionReader<E> + ?Sized>(
        &self,
        reader: &R,
        root_id: RootId,
        branch_a: &str,
        branch_b: &str,
    ) -> EvcResult<Option<VersionRecord<E>>> {
        query::common_ancestor(reader, root_id, branch_a, branch_b)
    }

    /// Branch labels with a current version of `root_id`.
    pub fn list_branches<R: VersionReader<E> + ?Sized>(
        &self,
        reader: &R,
        root_id: RootId,
    ) -> EvcResult<Vec<String>> {
        query::branches::<E, R>(reader, root_id)
    }

    pub fn list_current<R: VersionReader<E> + ?Sized>(
        &self,
        reader: &R,
        branch: &str,
        skip: usize,
        limit: usize,
    ) -> EvcResult<Vec<VersionRecord<E>>> {
        query::list_current(reader, Some(branch), skip, limit)
    }

    pub fn compare<R: VersionReader<E> + ?Sized>(
        &self,
        reader: &R,
        root_id: RootId,
        branch_a: &str,
        branch_b: &str,
    ) -> EvcResult<Option<ViewEntry>> {
        projector::compare::<E, R>(reader, root_id, branch_a, branch_b)
    }

    pub fn compare_branches<R: VersionReader<E> + ?Sized>(
        &self,
        reader: &R,
        base: &str,
        feature: &str,
    ) -> EvcResult<MergedView> {
        projector::compare_branches::<E, R>(reader, base, feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EvcError;
    use crate::model::{Branchable, Entity, ManualClock, VersionedEntity};
    use crate::store::{MemoryStore, VersionStore};
    use chrono::TimeZone;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Page {
        title: String,
    }

    impl Entity for Page {
        const TABLE: &'static str = "pages";
    }
    impl VersionedEntity for Page {}
    impl BranchableEntity for Page {}

    fn service(config: &EngineConfig) -> BranchableService<Page> {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap(),
        ));
        BranchableService::from_config(config, clock)
    }

    fn page(title: &str) -> Page {
        Page {
            title: title.into(),
        }
    }

    #[test]
    fn test_locked_branch_rejects_mutation() {
        let config = EngineConfig {
            locked_branches: vec!["release".into()],
            ..Default::default()
        };
        let service = service(&config);
        let store = MemoryStore::new();
        let root = RootId::new();

        let mut tx = store.begin().unwrap();
        let err = service.create(&mut tx, root, "release", page("x")).unwrap_err();
        assert_eq!(err, EvcError::BranchLocked("release".into()));
        assert_eq!(tx.pending_inserts(), 0);

        service.create(&mut tx, root, "main", page("x")).unwrap();
        let err = service
            .create_branch(&mut tx, root, "release", "main")
            .unwrap_err();
        assert!(matches!(err, EvcError::BranchLocked(_)));

        assert!(service.unlock_branch("release").unwrap());
        service.create_branch(&mut tx, root, "release", "main").unwrap();
        tx.commit().unwrap();

        assert_eq!(service.metrics().snapshot().commands_rejected, 2);
    }

    #[test]
    fn test_reads_ignore_locks() {
        let service = service(&EngineConfig::default());
        let store = MemoryStore::new();
        let root = RootId::new();

        let mut tx = store.begin().unwrap();
        service.create(&mut tx, root, "main", page("x")).unwrap();
        tx.commit().unwrap();

        service.lock_branch("main").unwrap();
        let current = service.get_current(&store, root, "main", false).unwrap();
        assert_eq!(current.map(|r| r.branch().to_string()), Some("main".into()));
        assert_eq!(service.list_branches(&store, root).unwrap(), vec!["main"]);
    }

    #[test]
    fn test_purge_blocked_by_lock() {
        let service = service(&EngineConfig::default());
        let store = MemoryStore::new();
        let root = RootId::new();

        let mut tx = store.begin().unwrap();
        service.create(&mut tx, root, "main", page("x")).unwrap();
        service.soft_delete(&mut tx, root, "main").unwrap();
        tx.commit().unwrap();

        service.lock_branch("main").unwrap();
        let mut tx = store.begin().unwrap();
        assert!(matches!(
            service.purge(&mut tx, root),
            Err(EvcError::BranchLocked(_))
        ));
    }

    #[test]
    fn test_poisoned_locks_reject_mutations() {
        let service = service(&EngineConfig::default());
        let store = MemoryStore::new();
        let root = RootId::new();
        service.locks().poison();

        let mut tx = store.begin().unwrap();
        let err = service.create(&mut tx, root, "main", page("x")).unwrap_err();
        assert!(matches!(err, EvcError::StorageUnavailable(_)));
        assert!(err.is_fatal());
        assert_eq!(tx.pending_inserts(), 0);
    }

    #[test]
    fn test_default_branch_from_config() {
        let config = EngineConfig {
            default_branch: "trunk".into(),
            ..Default::default()
        };
        assert_eq!(service(&config).default_branch(), "trunk");
    }
}
