//! Free-form JSON document stored by the CLI

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{EvcError, EvcResult};
use crate::model::{BranchableEntity, Changes, Entity, VersionedEntity};

/// A JSON object with no fixed schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(pub Map<String, Value>);

impl Entity for Document {
    const TABLE: &'static str = "documents";
}
impl VersionedEntity for Document {}
impl BranchableEntity for Document {}

/// Parses a JSON object argument.
pub fn parse_object(text: &str) -> EvcResult<Changes> {
    match serde_json::from_str(text) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(EvcError::InvalidChanges("expected a JSON object".into())),
        Err(e) => Err(EvcError::InvalidChanges(e.to_string())),
    }
}
