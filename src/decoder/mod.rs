//! Payload decoders.
//!
//! A [`Decoder`] turns raw source bytes into one nested raw-value map; the
//! merge pipeline then flattens that map into dotted keys. Decoders are
//! looked up by format name on the owning [`Config`](crate::Config), which
//! installs the JSON, TOML and YAML decoders out of the box and accepts
//! custom ones under new format names.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::BoxError;
use crate::opt::RawValue;

/// Decode a raw payload into a nested raw-value map.
pub type Decoder = Arc<dyn Fn(&[u8]) -> Result<RawValue, BoxError> + Send + Sync>;

pub(crate) fn decode_json(data: &[u8]) -> Result<RawValue, BoxError> {
    serde_json::from_slice(data).map_err(Into::into)
}

pub(crate) fn decode_toml(data: &[u8]) -> Result<RawValue, BoxError> {
    let text = std::str::from_utf8(data)?;
    let value: toml::Value = toml::from_str(text)?;
    Ok(toml_to_raw(value))
}

pub(crate) fn decode_yaml(data: &[u8]) -> Result<RawValue, BoxError> {
    serde_yaml::from_slice(data).map_err(Into::into)
}

// TOML datetimes carry no JSON representation of their own; their display
// form is what the time coercion expects.
fn toml_to_raw(value: toml::Value) -> RawValue {
    match value {
        toml::Value::String(s) => RawValue::String(s),
        toml::Value::Integer(i) => RawValue::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(RawValue::Number)
            .unwrap_or(RawValue::Null),
        toml::Value::Boolean(b) => RawValue::Bool(b),
        toml::Value::Datetime(d) => RawValue::String(d.to_string()),
        toml::Value::Array(items) => {
            RawValue::Array(items.into_iter().map(toml_to_raw).collect())
        }
        toml::Value::Table(table) => RawValue::Object(
            table
                .into_iter()
                .map(|(key, child)| (key, toml_to_raw(child)))
                .collect(),
        ),
    }
}

/// Flatten a nested map into dotted keys, depth first in key order.
///
/// Arrays stay whole: they are list leaves, not paths. A non-map input
/// flattens to nothing.
pub(crate) fn flatten(raw: &RawValue) -> BTreeMap<String, RawValue> {
    let mut out = BTreeMap::new();
    if let RawValue::Object(map) = raw {
        for (key, value) in map {
            flatten_into(&mut out, key.clone(), value);
        }
    }
    out
}

fn flatten_into(out: &mut BTreeMap<String, RawValue>, prefix: String, value: &RawValue) {
    match value {
        RawValue::Object(map) => {
            for (key, child) in map {
                flatten_into(out, format!("{prefix}.{key}"), child);
            }
        }
        _ => {
            out.insert(prefix, value.clone());
        }
    }
}
