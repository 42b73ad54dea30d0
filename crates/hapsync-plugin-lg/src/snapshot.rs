//! Generic snapshot flattening for device types without a typed model

use hapsync_core::{StateMap, StateValue};
use serde_json::Value;

/// Flatten nested objects into dotted keys, e.g. `runState.currentState`
///
/// Arrays are stored as their JSON text.
pub fn flatten(snapshot: &Value) -> StateMap {
    let mut map = StateMap::new();
    flatten_into(&mut map, String::new(), snapshot);
    map
}

fn flatten_into(map: &mut StateMap, prefix: String, value: &Value) {
    match value {
        Value::Object(fields) => {
            for (key, child) in fields {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(map, path, child);
            }
        }
        Value::Array(_) => {
            map.insert(prefix, StateValue::Text(value.to_string()));
        }
        scalar => {
            if let Some(v) = StateValue::from_json(scalar) {
                map.insert(prefix, v);
            }
        }
    }
}
