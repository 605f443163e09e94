//! Canonical JSON stringification, used to decide whether two manifests
//! that claim the same `(id, revision)` are actually the same document.
//!
//! Object keys are sorted alphabetically at every level; array order is
//! preserved (arrays are ordered data, not sets). The result is a `String`
//! suitable only for equality comparison — it is not meant to be pretty or
//! to round-trip back into a particular serde type.

use serde_json::{Map, Value};

/// Produce the canonical string form of `value`.
pub fn stable_stringify(value: &Value) -> String {
    canonicalize(value).to_string()
}

/// Build a new [`Value`] tree with every object's keys inserted in sorted
/// order, recursively.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                // `map[key]` is infallible: `key` was drawn from `map.keys()`.
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys_at_every_level() {
        let a = json!({"b": 1, "a": {"d": 2, "c": 3}});
        let b = json!({"a": {"c": 3, "d": 2}, "b": 1});
        assert_eq!(stable_stringify(&a), stable_stringify(&b));
    }

    #[test]
    fn preserves_array_order() {
        let a = json!({"list": [3, 1, 2]});
        let b = json!({"list": [1, 2, 3]});
        assert_ne!(stable_stringify(&a), stable_stringify(&b));
    }

    #[test]
    fn distinguishes_genuinely_different_documents() {
        let a = json!({"id": "weather", "revision": 1});
        let b = json!({"id": "weather", "revision": 2});
        assert_ne!(stable_stringify(&a), stable_stringify(&b));
    }
}
