//! Temporal Record Model
//!
//! Leaf module with no engine dependencies beyond errors:
//! - `RootId`, `VersionId`, `RecordKey` - identities
//! - `TimeRange` - half-open interval used for valid and transaction time
//! - `VersionRecord` - immutable versioned snapshot
//! - `PlainRecord` - mutable plain-tier row
//! - Tier traits and record capability traits
//! - `Changes` / `FieldDiff` - field-level payload edits and comparison
//! - `Clock` - time source

mod changes;
mod clock;
mod entity;
mod ids;
mod interval;
mod plain;
mod record;

pub use changes::{apply_changes, diff_fields, fields_of, Changes, FieldDiff};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::{
    Branchable, BranchableEntity, Entity, Identified, PlainEntity, Timestamped, Versioned,
    VersionedEntity,
};
pub use ids::{RecordKey, RootId, VersionId};
pub use interval::TimeRange;
pub use plain::PlainRecord;
pub use record::{CloneOverrides, VersionRecord};
