//! Field-level changes and diffs over entity payloads
//!
//! Payloads are opaque to the engine; it only sees them through their
//! serialized field map.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{EvcError, EvcResult};

/// A set of field assignments applied by Update.
pub type Changes = Map<String, Value>;

/// Serializes a payload into its field map.
pub fn fields_of<E: Serialize>(payload: &E) -> EvcResult<Map<String, Value>> {
    match serde_json::to_value(payload) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(EvcError::InvalidChanges(format!(
            "payload must serialize to an object, got {}",
            kind_of(&other)
        ))),
        Err(e) => Err(EvcError::InvalidChanges(e.to_string())),
    }
}

/// Applies `changes` to `payload`, producing a new payload.
///
/// Every changed field must survive the round trip; a key the payload type
/// does not carry is rejected rather than silently dropped.
pub fn apply_changes<E>(payload: &E, changes: &Changes) -> EvcResult<E>
where
    E: Serialize + DeserializeOwned,
{
    let mut fields = fields_of(payload)?;
    for (key, value) in changes {
        fields.insert(key.clone(), value.clone());
    }

    let updated: E = serde_json::from_value(Value::Object(fields))
        .map_err(|e| EvcError::InvalidChanges(e.to_string()))?;

    let check = fields_of(&updated)?;
    if let Some(unknown) = changes.keys().find(|k| !check.contains_key(*k)) {
        return Err(EvcError::InvalidChanges(format!("unknown field '{}'", unknown)));
    }

    Ok(updated)
}

/// One field that differs between two payloads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub field: String,
    /// Value on the base side, `None` if absent
    pub before: Option<Value>,
    /// Value on the compared side, `None` if absent
    pub after: Option<Value>,
}

/// Field-level diff, ordered by field name.
pub fn diff_fields(before: &Map<String, Value>, after: &Map<String, Value>) -> Vec<FieldDiff> {
    let mut names: Vec<&String> = before.keys().chain(after.keys()).collect();
    names.sort();
    names.dedup();

    names
        .into_iter()
        .filter_map(|name| {
            let old = before.get(name);
            let new = after.get(name);
            if old == new {
                return None;
            }
            Some(FieldDiff {
                field: name.clone(),
                before: old.cloned(),
                after: new.cloned(),
            })
        })
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Budget {
        name: String,
        amount: i64,
    }

    fn changes(value: Value) -> Changes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_apply_changes() {
        let budget = Budget {
            name: "A".into(),
            amount: 10,
        };
        let updated = apply_changes(&budget, &changes(json!({"amount": 25}))).unwrap();
        assert_eq!(updated.name, "A");
        assert_eq!(updated.amount, 25);
        assert_eq!(budget.amount, 10);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let budget = Budget {
            name: "A".into(),
            amount: 10,
        };
        let err = apply_changes(&budget, &changes(json!({"colour": "red"}))).unwrap_err();
        assert!(matches!(err, EvcError::InvalidChanges(msg) if msg.contains("colour")));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let budget = Budget {
            name: "A".into(),
            amount: 10,
        };
        let err = apply_changes(&budget, &changes(json!({"amount": "lots"}))).unwrap_err();
        assert_eq!(err.code(), "EVC_INVALID_CHANGES");
    }

    #[test]
    fn test_diff_fields() {
        let before = changes(json!({"name": "A", "amount": 1, "gone": true}));
        let after = changes(json!({"name": "A", "amount": 2, "new": "x"}));

        let diff = diff_fields(&before, &after);
        let names: Vec<_> = diff.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(names, vec!["amount", "gone", "new"]);
        assert_eq!(diff[0].before, Some(json!(1)));
        assert_eq!(diff[0].after, Some(json!(2)));
        assert_eq!(diff[1].after, None);
        assert_eq!(diff[2].before, None);
    }
}
