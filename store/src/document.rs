//! Typed access over a flat JSON object, shared by both store backends.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{StorageError, StoreFault};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct Document {
    entries: BTreeMap<String, Value>,
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn mismatch(key: &str, expected: &'static str, found: &Value) -> StorageError {
    StorageError::read(
        key,
        StoreFault::TypeMismatch {
            expected,
            found: kind(found),
        },
    )
}

pub(crate) fn number_value(key: &str, value: f64) -> Result<Value, StorageError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| StorageError::write(key, StoreFault::NonFinite(value)))
}

pub(crate) fn number_list_value(key: &str, values: &[f64]) -> Result<Value, StorageError> {
    values
        .iter()
        .map(|v| number_value(key, *v))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

impl Document {
    pub(crate) fn get_bool(&self, key: &str) -> Result<Option<bool>, StorageError> {
        match self.entries.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(mismatch(key, "bool", other)),
        }
    }

    pub(crate) fn get_number(&self, key: &str) -> Result<Option<f64>, StorageError> {
        match self.entries.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value @ Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| mismatch(key, "number", value)),
            Some(other) => Err(mismatch(key, "number", other)),
        }
    }

    pub(crate) fn get_number_list(&self, key: &str) -> Result<Option<Vec<f64>>, StorageError> {
        match self.entries.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_f64().ok_or_else(|| mismatch(key, "number", item)))
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(other) => Err(mismatch(key, "number list", other)),
        }
    }

    pub(crate) fn get_string(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.entries.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(mismatch(key, "string", other)),
        }
    }

    pub(crate) fn insert(&mut self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), value);
    }

    pub(crate) fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> Document {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn absent_and_null_read_as_none() {
        let d = doc(json!({ "flag": null }));
        assert_eq!(d.get_bool("flag").unwrap(), None);
        assert_eq!(d.get_bool("missing").unwrap(), None);
        assert_eq!(d.get_number_list("missing").unwrap(), None);
    }

    #[test]
    fn list_with_non_number_is_a_read_error() {
        let d = doc(json!({ "ts": [1.0, "two", 3.0] }));
        let err = d.get_number_list("ts").unwrap_err();
        assert!(err.is_read());
        assert!(err.to_string().contains("found string"));
    }

    #[test]
    fn scalar_where_list_expected_is_a_read_error() {
        let d = doc(json!({ "ts": 12 }));
        assert!(d.get_number_list("ts").is_err());
        assert!(d.get_bool("ts").is_err());
        assert_eq!(d.get_number("ts").unwrap(), Some(12.0));
    }

    #[test]
    fn non_finite_numbers_are_rejected_on_write() {
        assert!(number_value("k", f64::NAN).is_err());
        assert!(number_list_value("k", &[1.0, f64::INFINITY]).is_err());
        assert_eq!(number_list_value("k", &[1.0, 2.5]).unwrap(), json!([1.0, 2.5]));
    }

    #[test]
    fn remove_reports_presence() {
        let mut d = Document::default();
        d.insert("a", Value::Bool(true));
        assert!(d.contains("a"));
        assert!(d.remove("a"));
        assert!(!d.remove("a"));
    }
}
