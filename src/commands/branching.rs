//! Branch commands, Branchable tier only

use chrono::{DateTime, Utc};

use super::{check_branch, clear_head, require_current, VersionCommand};
use crate::errors::{EvcError, EvcResult};
use crate::events::{ChangeKind, VersionEvent};
use crate::model::{BranchableEntity, CloneOverrides, RecordKey, RootId, VersionRecord};
use crate::store::UnitOfWork;

/// Clones the current version of `from_branch` onto a new branch.
#[derive(Debug, Clone)]
pub struct CreateBranch {
    pub root_id: RootId,
    pub branch: String,
    pub from_branch: String,
}

impl<E: BranchableEntity> VersionCommand<E> for CreateBranch {
    type Output = VersionRecord<E>;

    fn name(&self) -> &'static str {
        "create_branch"
    }

    fn execute<U: UnitOfWork<E>>(self, unit: &mut U, now: DateTime<Utc>) -> EvcResult<Self::Output> {
        let source_key = RecordKey::on_branch(self.root_id, &self.from_branch);
        let target_key = RecordKey::on_branch(self.root_id, &self.branch);
        check_branch(&target_key)?;

        let source = require_current::<E, _>(&*unit, &source_key)?;
        clear_head::<E, _>(unit, &target_key, now, EvcError::branch_exists)?;

        let branched = source.clone_version(
            CloneOverrides {
                branch: Some(self.branch.clone()),
                parent_version_id: Some(source.version_id()),
                ..Default::default()
            },
            now,
        );
        unit.insert(branched.clone())?;
        unit.record_event(
            VersionEvent::new(ChangeKind::Branched, E::TABLE, &target_key, now)
                .with_version(branched.version_id())
                .with_previous(Some(source.version_id()))
                .with_source_branch(&self.from_branch),
        );
        Ok(branched)
    }
}

/// Overwrites the target branch with the source branch's current state.
///
/// No field-level reconciliation: the source payload replaces the target's.
#[derive(Debug, Clone)]
pub struct MergeBranch {
    pub root_id: RootId,
    pub source: String,
    pub target: String,
}

impl<E: BranchableEntity> VersionCommand<E> for MergeBranch {
    type Output = VersionRecord<E>;

    fn name(&self) -> &'static str {
        "merge_branch"
    }

    fn execute<U: UnitOfWork<E>>(self, unit: &mut U, now: DateTime<Utc>) -> EvcResult<Self::Output> {
        let source_key = RecordKey::on_branch(self.root_id, &self.source);
        let target_key = RecordKey::on_branch(self.root_id, &self.target);
        check_branch(&target_key)?;

        let source = require_current::<E, _>(&*unit, &source_key)?;
        let replaced = match unit.head(&target_key)? {
            Some(head) => Some(unit.close(head.version_id(), now)?),
            None => None,
        };

        let merged = source.clone_version(
            CloneOverrides {
                branch: Some(self.target.clone()),
                parent_version_id: replaced.as_ref().map(|r| r.version_id()),
                merge_from_branch: Some(self.source.clone()),
                payload: None,
            },
            now,
        );
        unit.insert(merged.clone())?;
        unit.record_event(
            VersionEvent::new(ChangeKind::Merged, E::TABLE, &target_key, now)
                .with_version(merged.version_id())
                .with_previous(replaced.map(|r| r.version_id()))
                .with_source_branch(&self.source),
        );
        Ok(merged)
    }
}
