//! Identities
//!
//! - `RootId` names the logical entity across all versions and branches
//! - `VersionId` names one snapshot
//!
//! Both are opaque and never reused.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable logical identity of an entity.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RootId(Uuid);

impl RootId {
    /// Allocates a fresh root identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[inline]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    #[inline]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RootId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RootId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identity of a single version record.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(Uuid);

impl VersionId {
    /// Allocates a fresh version identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[inline]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    #[inline]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for VersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VersionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The `(root_id, branch)` pair that owns at most one current version.
///
/// `branch` is `None` for entities without branching.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub root_id: RootId,
    pub branch: Option<String>,
}

impl RecordKey {
    pub fn new(root_id: RootId, branch: Option<&str>) -> Self {
        Self {
            root_id,
            branch: branch.map(str::to_string),
        }
    }

    pub fn unbranched(root_id: RootId) -> Self {
        Self {
            root_id,
            branch: None,
        }
    }

    pub fn on_branch(root_id: RootId, branch: &str) -> Self {
        Self {
            root_id,
            branch: Some(branch.to_string()),
        }
    }

    /// Branch label for messages; `-` when unbranched.
    pub fn branch_label(&self) -> String {
        self.branch.clone().unwrap_or_else(|| "-".to_string())
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.branch {
            Some(branch) => write!(f, "{}@{}", self.root_id, branch),
            None => write!(f, "{}", self.root_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(RootId::new(), RootId::new());
        assert_ne!(VersionId::new(), VersionId::new());
    }

    #[test]
    fn test_parse_round_trip() {
        let root = RootId::new();
        let parsed: RootId = root.to_string().parse().unwrap();
        assert_eq!(root, parsed);
        assert!("not-a-uuid".parse::<VersionId>().is_err());
    }

    #[test]
    fn test_record_key_display() {
        let root = RootId::new();
        assert_eq!(RecordKey::on_branch(root, "co-1").to_string(), format!("{}@co-1", root));
        assert_eq!(RecordKey::unbranched(root).branch_label(), "-");
    }

    #[test]
    fn test_ids_serialize_as_plain_uuid() {
        let id = VersionId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
    }
}
