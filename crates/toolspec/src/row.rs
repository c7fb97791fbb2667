//! Row data returned by developer functions.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// An open-ended key/value record.
pub type Row = serde_json::Map<String, Value>;

/// Stable identity of a row, read from its identifier field.
///
/// String and integer identifiers are both accepted; `1` and `"1"` name
/// the same row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RowId(pub String);

impl RowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Convert a JSON value into an identity.
    ///
    /// Only non-empty strings and numbers qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// Read the identity of `row` from `field`.
    pub fn of(row: &Row, field: &str) -> Option<Self> {
        row.get(field).and_then(Self::from_value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RowId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<i64> for RowId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl<'de> Deserialize<'de> for RowId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).ok_or_else(|| {
            serde::de::Error::custom(format!("row identity must be a string or number, got {value}"))
        })
    }
}

/// One page of rows returned by a data loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub items: Vec<Row>,
    /// Count across all pages, not just this one.
    pub total_items: usize,
}

impl PageResult {
    /// Validate a loader's fulfilled value against the page shape.
    ///
    /// `items` must be an array of objects. A missing `totalItems` falls
    /// back to the number of items on the page.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(Error::Shape(format!(
                "expected an object with items and totalItems, got {}",
                type_name(&value)
            )));
        };

        let items = match map.remove("items") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(Error::Shape(format!(
                    "items must be an array, got {}",
                    type_name(&other)
                )));
            }
            None => return Err(Error::Shape("missing items".into())),
        };

        let rows = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(row) => Ok(row),
                other => Err(Error::Shape(format!(
                    "item {index} must be an object, got {}",
                    type_name(&other)
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        let total_items = match map.get("totalItems") {
            Some(Value::Number(n)) => n
                .as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| Error::Shape(format!("totalItems must be a non-negative integer, got {n}")))?,
            Some(Value::Null) | None => rows.len(),
            Some(other) => {
                return Err(Error::Shape(format!(
                    "totalItems must be a number, got {}",
                    type_name(other)
                )));
            }
        };

        Ok(Self {
            items: rows,
            total_items,
        })
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
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

    #[test]
    fn row_id_accepts_strings_and_numbers() {
        let row = json!({"id": 7, "code": "x1", "empty": ""});
        let row = row.as_object().unwrap();
        assert_eq!(RowId::of(row, "id"), Some(RowId::from(7)));
        assert_eq!(RowId::of(row, "code"), Some(RowId::from("x1")));
        assert_eq!(RowId::of(row, "empty"), None);
        assert_eq!(RowId::of(row, "missing"), None);
    }

    #[test]
    fn numeric_and_string_ids_compare_equal() {
        let a: RowId = serde_json::from_value(json!(1)).unwrap();
        let b: RowId = serde_json::from_value(json!("1")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn page_result_parses_loader_value() {
        let page = PageResult::from_value(json!({
            "items": [{"id": 1, "name": "A"}],
            "totalItems": 2
        }))
        .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total_items, 2);
    }

    #[test]
    fn page_result_defaults_total_to_page_length() {
        let page = PageResult::from_value(json!({"items": [{"id": 1}, {"id": 2}]})).unwrap();
        assert_eq!(page.total_items, 2);
    }

    #[test]
    fn page_result_rejects_non_array_items() {
        let err = PageResult::from_value(json!({"items": "nope", "totalItems": 1})).unwrap_err();
        assert!(err.to_string().contains("items must be an array"));
    }

    #[test]
    fn page_result_rejects_non_object_value() {
        assert!(PageResult::from_value(json!(null)).is_err());
        assert!(PageResult::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn page_result_rejects_scalar_items() {
        let err = PageResult::from_value(json!({"items": [1]})).unwrap_err();
        assert!(err.to_string().contains("item 0 must be an object"));
    }
}
