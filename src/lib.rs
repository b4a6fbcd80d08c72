//! evc - Entity Versioning Core
//!
//! A bitemporal, branchable versioning engine for domain entities:
//! - Temporal record model (valid time and transaction time)
//! - Commands: create, update, soft delete, undelete, branch, merge, revert, purge
//! - Queries: current lookup, time travel, history, lineage, branch listing
//! - Tiered services: plain, versioned, branchable
//! - Merged-view projection between two branches

pub mod cli;
pub mod commands;
pub mod config;
pub mod errors;
pub mod events;
pub mod model;
pub mod observability;
pub mod projector;
pub mod query;
pub mod service;
pub mod store;

pub use errors::{EvcError, EvcResult};
