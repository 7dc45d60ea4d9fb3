//! Deep-merge semantics for the view body.

use serde_json::Value;

/// Merge `incoming` into `target` recursively.
///
/// Mappings merge key-wise; everything else (lists, scalars, null)
/// replaces the existing value. This is what lets several dispatchers
/// contribute fields to one response body without coordinating.
pub(crate) fn deep_merge(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
