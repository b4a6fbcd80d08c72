//! Engine Configuration
//!
//! Every field is optional in the JSON file and falls back to its default.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{EvcError, EvcResult};
use crate::observability::{log_event_with_fields, Event, Severity};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Branch used when the caller names none (default: "main")
    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Branches locked read-only at service construction
    #[serde(default)]
    pub locked_branches: Vec<String>,

    /// Minimum log severity (default: INFO)
    #[serde(default = "default_log_level")]
    pub log_level: Severity,

    /// Snapshot file of the operator CLI
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Default page size for listings
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_log_level() -> Severity {
    Severity::Info
}

fn default_store_path() -> PathBuf {
    PathBuf::from("evc-store.json")
}

fn default_page_size() -> usize {
    50
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_branch: default_branch(),
            locked_branches: Vec::new(),
            log_level: default_log_level(),
            store_path: default_store_path(),
            page_size: default_page_size(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> EvcResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| EvcError::storage(format!("Failed to read config: {}", e)))?;

        let config: EngineConfig = serde_json::from_str(&content)
            .map_err(|e| EvcError::storage(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        log_event_with_fields(
            Event::ConfigLoaded,
            &[
                ("path", &path.display().to_string()),
                ("default_branch", &config.default_branch),
            ],
        );
        Ok(config)
    }

    fn validate(&self) -> EvcResult<()> {
        if self.default_branch.trim().is_empty() {
            return Err(EvcError::InvalidBranch(self.default_branch.clone()));
        }
        if let Some(bad) = self.locked_branches.iter().find(|b| b.trim().is_empty()) {
            return Err(EvcError::InvalidBranch(bad.clone()));
        }
        if self.page_size == 0 {
            return Err(EvcError::storage("page_size must be > 0"));
        }
        Ok(())
    }
}
