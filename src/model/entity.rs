//! Entity tiers and record capabilities
//!
//! Tiers are marker traits on the payload type, from weakest to strongest:
//! - `PlainEntity`: mutable in place, hard delete only
//! - `VersionedEntity`: bitemporal history and soft delete
//! - `BranchableEntity`: versioned plus isolated branches, merge and revert
//!
//! Records expose their capabilities through `Identified`, `Timestamped`,
//! `Versioned` and `Branchable`. Commands and services are written once per
//! tier, so a branch command on a non-branchable entity does not compile.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use super::{RootId, TimeRange, VersionId};

/// A domain payload the engine can store.
pub trait Entity:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Logical table name, used in events and logs.
    const TABLE: &'static str;
}

/// Reference or configuration data without history.
pub trait PlainEntity: Entity {}

/// Audit-only data with full history.
pub trait VersionedEntity: Entity {}

/// Data subject to parallel proposed changes.
pub trait BranchableEntity: VersionedEntity {}

/// Anything with a stable primary identity.
pub trait Identified {
    fn id(&self) -> Uuid;
}

/// Plain-tier bookkeeping.
pub trait Timestamped: Identified {
    fn created_at(&self) -> DateTime<Utc>;
    fn updated_at(&self) -> DateTime<Utc>;
}

/// Bitemporal capability.
pub trait Versioned: Identified {
    fn root_id(&self) -> RootId;
    fn valid_time(&self) -> &TimeRange;
    fn transaction_time(&self) -> &TimeRange;
    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    /// Marks this in-memory record deleted.
    fn soft_delete(&mut self, at: DateTime<Utc>);

    /// Clears the deletion mark.
    fn undelete(&mut self);

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }

    /// Open in both time dimensions and not deleted.
    fn is_current(&self) -> bool {
        self.valid_time().is_open() && self.transaction_time().is_open() && !self.is_deleted()
    }
}

/// Branching capability.
pub trait Branchable: Versioned {
    fn branch(&self) -> &str;
    fn parent_version_id(&self) -> Option<VersionId>;
    fn merge_from_branch(&self) -> Option<&str>;
}
