//! CLI command implementations
//!
//! Mutating commands run in one unit of work that is committed before the
//! response is written. Read commands go straight to the committed state.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::args::{Cli, Command};
use super::document::{parse_object, Document};
use super::io::{write_error, write_response};
use crate::config::EngineConfig;
use crate::errors::{EvcError, EvcResult};
use crate::model::{RootId, SystemClock};
use crate::observability::Logger;
use crate::service::BranchableService;
use crate::store::{JsonFileStore, Transaction, UnitOfWork, VersionStore};

struct Context {
    store: JsonFileStore<Document>,
    service: BranchableService<Document>,
    branch: String,
    page_size: usize,
}

impl Context {
    fn mutate<T, F>(&self, apply: F) -> EvcResult<Value>
    where
        T: Serialize,
        F: FnOnce(&mut Transaction<Document>) -> EvcResult<T>,
    {
        let mut tx = self.store.begin()?;
        let out = apply(&mut tx)?;
        tx.commit()?;
        to_value(&out)
    }
}

fn to_value<T: Serialize>(value: &T) -> EvcResult<Value> {
    serde_json::to_value(value).map_err(|e| EvcError::storage(e.to_string()))
}

fn load_config(path: &Path) -> EvcResult<EngineConfig> {
    if path.exists() {
        EngineConfig::load(path)
    } else {
        Ok(EngineConfig::default())
    }
}

/// Main entry point
pub fn run() -> EvcResult<()> {
    let cli = Cli::parse_args();
    run_command(cli)
}

/// Run one parsed invocation and write its response
pub fn run_command(cli: Cli) -> EvcResult<()> {
    // stdout carries only the response line
    Logger::set_stderr_only(true);
    let config = load_config(&cli.config)?;
    Logger::set_min_severity(config.log_level);

    let path = cli.store.unwrap_or_else(|| config.store_path.clone());
    let store = JsonFileStore::open(&path)?;
    let service = BranchableService::from_config(&config, Arc::new(SystemClock::new()));
    let branch = cli
        .branch
        .unwrap_or_else(|| service.default_branch().to_string());

    let ctx = Context {
        store,
        service,
        branch,
        page_size: config.page_size,
    };

    match dispatch(&ctx, cli.command) {
        Ok(data) => write_response(&data),
        Err(e) => {
            write_error(&e)?;
            Err(e)
        }
    }
}

fn dispatch(ctx: &Context, command: Command) -> EvcResult<Value> {
    let service = &ctx.service;
    let store = &ctx.store;
    let branch = ctx.branch.as_str();

    match command {
        Command::Create { root, data } => {
            let document = Document(parse_object(&data)?);
            let root = root.unwrap_or_else(RootId::new);
            ctx.mutate(|tx| service.create(tx, root, branch, document))
        }
        Command::Update { root, changes } => {
            let changes = parse_object(&changes)?;
            ctx.mutate(|tx| service.update(tx, root, branch, changes))
        }
        Command::Delete { root } => ctx.mutate(|tx| service.soft_delete(tx, root, branch)),
        Command::Undelete { root } => ctx.mutate(|tx| service.undelete(tx, root, branch)),
        Command::Branch { root, name, from } => {
            let from = from.unwrap_or_else(|| branch.to_string());
            ctx.mutate(|tx| service.create_branch(tx, root, &name, &from))
        }
        Command::Merge { root, source } => {
            ctx.mutate(|tx| service.merge_branch(tx, root, &source, branch))
        }
        Command::Revert { root, to } => ctx.mutate(|tx| service.revert(tx, root, branch, to)),
        Command::Purge { root } => ctx.mutate(|tx| {
            let removed = service.purge(tx, root)?;
            Ok(serde_json::json!({ "root_id": root, "removed": removed }))
        }),
        Command::Show {
            root,
            at,
            known_at,
            include_deleted,
        } => {
            let record = match (at, known_at) {
                (Some(at), Some(known_at)) => service.get_as_of(store, root, branch, at, known_at)?,
                (Some(at), None) => service.get_at(store, root, branch, at)?,
                (None, _) => service.get_current(store, root, branch, include_deleted)?,
            };
            to_value(&record)
        }
        Command::History {
            root,
            include_deleted,
        } => to_value(&service.history(store, root, branch, include_deleted)?),
        Command::Lineage { version } => to_value(&service.lineage(store, version)?),
        Command::Branches { root } => to_value(&service.list_branches(store, root)?),
        Command::List { skip, limit } => {
            let limit = limit.unwrap_or(ctx.page_size);
            to_value(&service.list_current(store, branch, skip, limit)?)
        }
        Command::Compare { feature, root } => match root {
            Some(root) => to_value(&service.compare(store, root, branch, &feature)?),
            None => to_value(&service.compare_branches(store, branch, &feature)?),
        },
    }
}
