//! Configuration merge logic
//!
//! - Objects: deep-merge by key
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)

use serde_json::{Map, Value};

/// Deep merge two JSON values.
///
/// Null in the overlay overrides whatever the base held.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }

        (_, overlay) => overlay,
    }
}

/// Merge layers in order; the last layer has the highest precedence.
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

/// Expand `a.b.c = v` pairs into `{"a": {"b": {"c": v}}}`.
///
/// A key that is both a leaf and a parent keeps whichever was set first.
pub fn expand_dotted<I>(pairs: I) -> Value
where
    I: IntoIterator<Item = (String, Value)>,
{
    let mut root = Map::new();

    for (key, value) in pairs {
        let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
        if let Some((last, parents)) = parts.split_last() {
            insert_path(&mut root, parents, last, value);
        }
    }

    Value::Object(root)
}

fn insert_path(map: &mut Map<String, Value>, parents: &[&str], leaf: &str, value: Value) {
    match parents.split_first() {
        None => {
            map.entry(leaf.to_string()).or_insert(value);
        }
        Some((head, rest)) => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(child) = child {
                insert_path(child, rest, leaf, value);
            }
        }
    }
}
