//! Deep merge engine
//!
//! Applies partial updates to an in-memory document. Semantics follow
//! JSON merge-patch: nested objects merge recursively, the delete
//! sentinel removes a field, and every other value replaces the field
//! wholesale. Merging is total over well-formed input; there are no
//! error paths.

use serde_json::{Map, Value};

/// The delete sentinel.
///
/// A field set to `null` in a partial update is removed from the
/// document instead of being stored. This applies at any nesting depth.
pub const DELETE: Value = Value::Null;

/// Apply a partial update to `target` in place.
///
/// Fields absent from the update are left untouched. Object values merge
/// recursively; scalars and arrays replace wholesale. An object update
/// landing on a non-object field replaces that field.
pub fn apply(target: &mut Value, update: Value) {
    let entries = match update {
        Value::Object(entries) => entries,
        other => {
            // A non-object update replaces the value outright.
            *target = other;
            return;
        }
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(fields) = target {
        for (key, value) in entries {
            match value {
                Value::Null => {
                    fields.remove(&key);
                }
                Value::Object(_) => {
                    let slot = fields
                        .entry(key)
                        .or_insert_with(|| Value::Object(Map::new()));
                    apply(slot, value);
                }
                other => {
                    fields.insert(key, other);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unmentioned_fields_untouched() {
        let mut doc = json!({ "a": 1, "b": 2 });
        apply(&mut doc, json!({ "a": 10 }));
        assert_eq!(doc, json!({ "a": 10, "b": 2 }));
    }

    #[test]
    fn test_delete_sentinel_removes_field() {
        let mut doc = json!({ "a": 1, "b": 2 });
        apply(&mut doc, json!({ "a": DELETE }));
        assert_eq!(doc, json!({ "b": 2 }));
    }

    #[test]
    fn test_delete_sentinel_at_depth() {
        let mut doc = json!({ "outer": { "keep": 1, "drop": 2 } });
        apply(&mut doc, json!({ "outer": { "drop": null } }));
        assert_eq!(doc, json!({ "outer": { "keep": 1 } }));
    }

    #[test]
    fn test_deleting_missing_field_is_a_no_op() {
        let mut doc = json!({ "a": 1 });
        apply(&mut doc, json!({ "ghost": null }));
        assert_eq!(doc, json!({ "a": 1 }));
    }

    #[test]
    fn test_nested_objects_merge_recursively() {
        let mut doc = json!({ "user": { "name": "ada", "age": 36 } });
        apply(&mut doc, json!({ "user": { "age": 37 } }));
        assert_eq!(doc, json!({ "user": { "name": "ada", "age": 37 } }));
    }

    #[test]
    fn test_arrays_replace_wholesale() {
        let mut doc = json!({ "tags": [1, 2, 3] });
        apply(&mut doc, json!({ "tags": [4] }));
        assert_eq!(doc, json!({ "tags": [4] }));
    }

    #[test]
    fn test_object_update_replaces_scalar_field() {
        let mut doc = json!({ "a": 5 });
        apply(&mut doc, json!({ "a": { "nested": true } }));
        assert_eq!(doc, json!({ "a": { "nested": true } }));
    }

    #[test]
    fn test_scalar_update_replaces_object_field() {
        let mut doc = json!({ "a": { "nested": true } });
        apply(&mut doc, json!({ "a": 5 }));
        assert_eq!(doc, json!({ "a": 5 }));
    }

    #[test]
    fn test_object_update_into_missing_field() {
        let mut doc = json!({});
        apply(&mut doc, json!({ "a": { "b": { "c": 1 } } }));
        assert_eq!(doc, json!({ "a": { "b": { "c": 1 } } }));
    }

    #[test]
    fn test_non_object_update_replaces_document() {
        let mut doc = json!({ "a": 1 });
        apply(&mut doc, json!(42));
        assert_eq!(doc, json!(42));
    }
}
