//! Semantic comparison of desired and live objects
//!
//! A live object satisfies a desired one when every field the desired object
//! sets, labels included, is present with the same value. Maps recurse,
//! arrays compare element-wise at equal length.
//!
//! Fields only the live side carries (server defaults, status, clusterIP,
//! labels such as `kubernetes.io/metadata.name`) are ignored. An empty desired value (`null`, `{}`, `[]`, `""`) matches an
//! absent live field. Numbers compare by JSON identity, so `1` and `1.0`
//! differ.

use serde_json::Value;
use similar::TextDiff;
use syncpod_core::Object;

/// Whether `live` already has everything `desired` asks for
pub fn semantically_equal(live: &Object, desired: &Object) -> bool {
    is_subset(desired.as_value(), live.as_value())
}

/// Inverse of [`semantically_equal`]
pub fn needs_update(live: &Object, desired: &Object) -> bool {
    !semantically_equal(live, desired)
}

fn field_subset(desired: &Value, live: Option<&Value>) -> bool {
    match live {
        Some(l) => is_subset(desired, l),
        None => is_empty(desired),
    }
}

/// Recursive subset comparison
pub fn is_subset(desired: &Value, live: &Value) -> bool {
    match (desired, live) {
        (Value::Object(d), Value::Object(l)) => d.iter().all(|(key, dv)| field_subset(dv, l.get(key))),
        (Value::Array(d), Value::Array(l)) => {
            d.len() == l.len() && d.iter().zip(l).all(|(dv, lv)| is_subset(dv, lv))
        }
        (d, l) => d == l,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Unified diff between the YAML renderings of two objects
pub fn render_diff(live: &Object, desired: &Object) -> String {
    let old = live.to_yaml().unwrap_or_default();
    let new = desired.to_yaml().unwrap_or_default();
    TextDiff::from_lines(&old, &new)
        .unified_diff()
        .context_radius(3)
        .header("live", "desired")
        .to_string()
}
