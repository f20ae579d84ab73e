//! Field codecs and the mutation request builder
//!
//! Each resource declares a table of [`FieldCodec`]s keyed by field name. A
//! codec knows how to read the field's current value from the resource data
//! and how to expand it into the API representation. [`build_mutation`] runs
//! the table and keeps only the fields worth sending.

use crate::error::Result;
use serde::Serialize;
use serde_json::{Map, Value};

/// Current value of a field as seen by the mutation builder
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    /// Configured value, or the last read value when not configured
    pub raw: Value,
    /// Whether the user set the field explicitly
    pub explicit: bool,
}

impl FieldValue {
    /// Prefer the configured value, fall back to the last read state
    pub fn configured_or_read<T: Serialize>(configured: Option<&T>, read: Option<&T>) -> Self {
        match configured {
            Some(v) => Self {
                raw: to_value(v),
                explicit: true,
            },
            None => Self {
                raw: read.map(to_value).unwrap_or(Value::Null),
                explicit: false,
            },
        }
    }

    /// A required field is always explicit
    pub fn required<T: Serialize>(value: &T) -> Self {
        Self {
            raw: to_value(value),
            explicit: true,
        }
    }
}

fn to_value<T: Serialize>(v: &T) -> Value {
    // Config types are plain data; serialization can't fail for them
    serde_json::to_value(v).unwrap_or(Value::Null)
}

/// Expander from a configured value to its wire representation
pub type ExpandFn = fn(&Value) -> Result<Value>;

/// One row of a resource's field table
pub struct FieldCodec<T> {
    /// Schema field name
    pub name: &'static str,
    /// Top-level key in the request body
    pub wire: &'static str,
    pub get: fn(&T) -> FieldValue,
    pub expand: ExpandFn,
}

/// Identity expander
pub fn expand_identity(v: &Value) -> Result<Value> {
    Ok(v.clone())
}

/// Go-style zero value check: null, "", 0, false, [] and {} are empty
pub fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Build the request body for a create or update call. A field is included
/// when its expanded value is non-empty and it was either set explicitly or
/// expansion changed it. The first expansion error aborts the build.
pub fn build_mutation<T>(fields: &[FieldCodec<T>], data: &T) -> Result<Map<String, Value>> {
    let mut obj = Map::new();

    for field in fields {
        let current = (field.get)(data);
        let expanded = (field.expand)(&current.raw)?;
        if !is_empty_value(&expanded) && (current.explicit || current.raw != expanded) {
            obj.insert(field.wire.to_string(), expanded);
        }
    }

    Ok(obj)
}

// =============================================================================
// Flatteners
// =============================================================================

/// Read a string field from an API response
pub fn flatten_string(v: Option<&Value>) -> Option<String> {
    v.and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Read an int64 field; the APIs encode int64 as a JSON string
pub fn flatten_i64(v: Option<&Value>) -> Option<i64> {
    match v? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Read a list of strings, skipping non-string entries
pub fn flatten_string_list(v: Option<&Value>) -> Option<Vec<String>> {
    v.and_then(|v| v.as_array()).map(|items| {
        items
            .iter()
            .filter_map(|i| i.as_str().map(|s| s.to_string()))
            .collect()
    })
}

/// Normalize Compute self links to the v1 API; other links pass through
pub fn convert_self_link_to_v1(link: &str) -> String {
    let Some(start) = link.find("/compute/") else {
        return link.to_string();
    };
    let after = &link[start + "/compute/".len()..];
    match after.find('/') {
        Some(end) if after[end..].starts_with("/projects/") => {
            format!("{}/compute/v1{}", &link[..start], &after[end..])
        },
        _ => link.to_string(),
    }
}
