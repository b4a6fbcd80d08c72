//! CLI argument definitions using clap
//!
//! Every command operates on one JSON snapshot file of free-form documents.
//! `--branch` selects the branch for single-branch commands and defaults to
//! the configured default branch.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use crate::model::{RootId, VersionId};

/// evc - bitemporal, branchable document history
#[derive(Parser, Debug)]
#[command(name = "evc")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./evc.json")]
    pub config: PathBuf,

    /// Snapshot file, overrides `store_path` from the configuration
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Branch to operate on
    #[arg(long, short)]
    pub branch: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the first version of a document
    Create {
        /// Root id; generated when omitted
        #[arg(long)]
        root: Option<RootId>,
        /// Document body as a JSON object
        data: String,
    },

    /// Apply field changes to the current version
    Update {
        root: RootId,
        /// Changed fields as a JSON object
        changes: String,
    },

    /// Soft delete the current version
    Delete { root: RootId },

    /// Undo a soft delete
    Undelete { root: RootId },

    /// Branch a document off another branch
    Branch {
        root: RootId,
        /// New branch label
        name: String,
        /// Source branch; defaults to the selected branch
        #[arg(long)]
        from: Option<String>,
    },

    /// Overwrite the selected branch with another branch's current version
    Merge {
        root: RootId,
        /// Branch to merge from
        source: String,
    },

    /// Make an earlier version current again
    Revert {
        root: RootId,
        /// Target version; defaults to the current version's parent
        #[arg(long)]
        to: Option<VersionId>,
    },

    /// Show the current version, or the version valid at `--at`
    Show {
        root: RootId,
        /// Business time (RFC 3339)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        /// Knowledge time (RFC 3339); defaults to now
        #[arg(long, requires = "at")]
        known_at: Option<DateTime<Utc>>,
        #[arg(long)]
        include_deleted: bool,
    },

    /// All versions on the selected branch, oldest first
    History {
        root: RootId,
        #[arg(long)]
        include_deleted: bool,
    },

    /// A version and its ancestors, newest first
    Lineage { version: VersionId },

    /// Branches with a current version of a document
    Branches { root: RootId },

    /// Current documents on the selected branch
    List {
        #[arg(long, default_value_t = 0)]
        skip: usize,
        /// Defaults to the configured page size
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Compare the selected branch against another, for one or all documents
    Compare {
        /// Branch compared against the selected one
        feature: String,
        #[arg(long)]
        root: Option<RootId>,
    },

    /// Permanently remove a soft-deleted document from every branch
    Purge { root: RootId },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_show_at() {
        let root = RootId::new();
        let root_arg = root.to_string();
        let cli = Cli::try_parse_from([
            "evc",
            "--branch",
            "co-1",
            "show",
            root_arg.as_str(),
            "--at",
            "2024-05-01T00:00:00Z",
        ])
        .unwrap();

        assert_eq!(cli.branch.as_deref(), Some("co-1"));
        match cli.command {
            Command::Show { root: parsed, at, .. } => {
                assert_eq!(parsed, root);
                assert!(at.is_some());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_known_at_requires_at() {
        let root = RootId::new().to_string();
        let parsed = Cli::try_parse_from([
            "evc",
            "show",
            root.as_str(),
            "--known-at",
            "2024-05-01T00:00:00Z",
        ]);
        assert!(parsed.is_err());
    }
}
