//! # Service Layer
//!
//! One service per entity tier. Each method runs exactly one command or one
//! query against the unit of work or reader the caller passes in. Services
//! never begin or commit units of work; the caller owns the boundary.
//!
//! Branch locks are advisory and only consulted here.

mod branchable;
mod locks;
mod plain;
mod versioned;

pub use branchable::BranchableService;
pub use locks::BranchLocks;
pub use plain::PlainService;
pub use versioned::VersionedService;

use chrono::{DateTime, Utc};

use crate::commands::{PlainCommand, VersionCommand};
use crate::errors::{EvcError, EvcResult};
use crate::model::{PlainEntity, VersionedEntity};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::store::{PlainUnitOfWork, UnitOfWork};

fn record_outcome<T>(
    metrics: &MetricsRegistry,
    table: &str,
    command: &str,
    result: EvcResult<T>,
) -> EvcResult<T> {
    match &result {
        Ok(_) => {
            metrics.increment_commands_executed();
            log_event_with_fields(
                Event::CommandExecuted,
                &[("table", table), ("command", command)],
            );
        }
        Err(e) => {
            metrics.increment_commands_rejected();
            log_event_with_fields(
                Event::CommandRejected,
                &[
                    ("table", table),
                    ("command", command),
                    ("code", e.code()),
                    ("error", &e.to_string()),
                ],
            );
        }
    }
    result
}

/// Runs a versioned command and records its outcome.
pub(crate) fn execute<E, C, U>(
    metrics: &MetricsRegistry,
    command: C,
    unit: &mut U,
    now: DateTime<Utc>,
) -> EvcResult<C::Output>
where
    E: VersionedEntity,
    C: VersionCommand<E>,
    U: UnitOfWork<E>,
{
    let name = command.name();
    record_outcome(metrics, E::TABLE, name, command.execute(unit, now))
}

/// Runs a plain command and records its outcome.
pub(crate) fn execute_plain<E, C, U>(
    metrics: &MetricsRegistry,
    command: C,
    unit: &mut U,
    now: DateTime<Utc>,
) -> EvcResult<C::Output>
where
    E: PlainEntity,
    C: PlainCommand<E>,
    U: PlainUnitOfWork<E>,
{
    let name = command.name();
    record_outcome(metrics, E::TABLE, name, command.execute(unit, now))
}

/// Rejection of a mutation on a locked branch, logged like any other.
pub(crate) fn reject_locked<T>(
    metrics: &MetricsRegistry,
    table: &str,
    command: &str,
    branch: &str,
) -> EvcResult<T> {
    record_outcome(
        metrics,
        table,
        command,
        Err(EvcError::BranchLocked(branch.to_string())),
    )
}
