//! # Query Engine
//!
//! Read-only lookups over any `VersionReader`: committed store state or a
//! unit of work's view of its own staged writes.
//!
//! - current: point lookup on the head index
//! - temporal: as-of lookups and history
//! - lineage: parent walks, common ancestors, branch listing

mod current;
mod lineage;
mod temporal;

pub use current::{current, get_version, list_current};
pub use lineage::{branches, common_ancestor, lineage};
pub use temporal::{as_of, history, is_visible};
