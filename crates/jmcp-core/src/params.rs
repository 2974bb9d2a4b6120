//! Conversion of tool-supplied job parameters into the string form Jenkins
//! expects on `buildWithParameters`.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Normalize parameters for submission.
///
/// Arrays (multi-select parameters) are joined with commas, booleans become
/// `true`/`false`, numbers are stringified and `null` values are dropped.
pub fn normalize_params(params: &Map<String, Value>) -> BTreeMap<String, String> {
    params
        .iter()
        .filter_map(|(key, value)| scalar_text(value).map(|text| (key.clone(), text)))
        .collect()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(scalar_text)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}
