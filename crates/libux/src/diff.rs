//! Structural clone and diff of `Value` trees.
//!
//! Maps are compared key by key and recursed into. Lists and dates are
//! atomic leaves: any difference records the whole new value, no element
//! reconciliation is attempted.

use crate::path;
use crate::value::Value;
use indexmap::IndexMap;

/// Clone the value at `path`, `None` when the path does not resolve.
pub fn clone_at(root: &Value, path: &str) -> Option<Value> {
    path::get(root, path).cloned()
}

/// A change set between two values.
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Leaf added or changed to this value.
    Set(Value),
    /// Key present before, absent now. Distinct from `Set(Value::Null)`.
    Removed,
    /// Changes below a map, only keys that differ.
    Nested(IndexMap<String, Diff>),
}

/// Compare `new` against `old`; `None` when nothing differs at or below.
pub fn diff(new: &Value, old: &Value) -> Option<Diff> {
    match (new, old) {
        (Value::Map(new), Value::Map(old)) => {
            let mut changes = IndexMap::new();
            for (key, value) in new {
                if !old.contains_key(key) {
                    changes.insert(key.clone(), Diff::Set(value.clone()));
                }
            }
            for (key, old_value) in old {
                let Some(new_value) = new.get(key) else {
                    changes.insert(key.clone(), Diff::Removed);
                    continue;
                };
                if let Some(change) = diff(new_value, old_value) {
                    changes.insert(key.clone(), change);
                }
            }
            (!changes.is_empty()).then_some(Diff::Nested(changes))
        }
        _ => (new != old).then(|| Diff::Set(new.clone())),
    }
}

impl Diff {
    /// Patch `target` so that every path recorded here matches the new side.
    pub fn apply(&self, target: &mut Value) {
        match self {
            Diff::Set(value) => *target = value.clone(),
            Diff::Removed => *target = Value::Null,
            Diff::Nested(changes) => {
                if !matches!(target, Value::Map(_)) {
                    *target = Value::map();
                }
                let Value::Map(map) = target else {
                    return;
                };
                for (key, change) in changes {
                    match change {
                        Diff::Removed => {
                            map.shift_remove(key);
                        }
                        Diff::Set(value) => {
                            map.insert(key.clone(), value.clone());
                        }
                        Diff::Nested(_) => change.apply(map.entry(key.clone()).or_insert_with(Value::map)),
                    }
                }
            }
        }
    }

    /// Flatten into `(dotted path, new value)` pairs; `None` marks a removal.
    pub fn entries(&self) -> Vec<(String, Option<&Value>)> {
        let mut entries = Vec::new();
        self.collect_entries(String::new(), &mut entries);
        entries
    }

    fn collect_entries<'d>(&'d self, prefix: String, entries: &mut Vec<(String, Option<&'d Value>)>) {
        match self {
            Diff::Set(value) => entries.push((prefix, Some(value))),
            Diff::Removed => entries.push((prefix, None)),
            Diff::Nested(changes) => {
                for (key, change) in changes {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.{key}")
                    };
                    change.collect_entries(path, entries);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use serde_json::json;

    fn value(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    #[test]
    fn test_identical_values_have_no_diff() {
        let a = value(json!({"a": {"b": [1, 2]}, "c": null}));
        assert_eq!(diff(&a, &a), None);
    }

    #[test]
    fn test_added_changed_removed() {
        let old = value(json!({"keep": 1, "change": 1, "gone": 1, "deep": {"x": 1, "y": 2}}));
        let new = value(json!({"keep": 1, "change": 2, "fresh": null, "deep": {"x": 1, "y": 3}}));
        let changes = diff(&new, &old).unwrap();
        assert_eq!(
            changes.entries(),
            vec![
                ("fresh".to_owned(), Some(&Value::Null)),
                ("change".to_owned(), Some(&Value::from(2))),
                ("gone".to_owned(), None),
                ("deep.y".to_owned(), Some(&Value::from(3))),
            ]
        );
    }

    #[test]
    fn test_lists_are_atomic() {
        let old = value(json!({"list": [1, 2, 3]}));
        let new = value(json!({"list": [1, 2, 4]}));
        let Some(Diff::Nested(changes)) = diff(&new, &old) else {
            panic!("expected nested diff");
        };
        assert_eq!(changes.get("list"), Some(&Diff::Set(value(json!([1, 2, 4])))));
    }

    #[test]
    fn test_dates_are_opaque_leaves() {
        let before = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let after = DateTime::from_timestamp_millis(1_700_000_000_001).unwrap();
        let old = Value::object([("due", Value::Date(before)), ("title", Value::from("a"))]);
        let new = Value::object([("due", Value::Date(after)), ("title", Value::from("a"))]);

        let Some(Diff::Nested(changes)) = diff(&new, &old) else {
            panic!("expected nested diff");
        };
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.get("due"), Some(&Diff::Set(Value::Date(after))));
        assert_eq!(diff(&old, &old.clone()), None);

        assert_eq!(clone_at(&old, "due"), Some(Value::Date(before)));
        assert_eq!(clone_at(&old, "due.year"), None);
    }

    #[test]
    fn test_apply_round_trips() {
        let old = value(json!({"a": {"b": 1, "c": [1]}, "d": "x"}));
        let new = value(json!({"a": {"b": 2, "e": {"f": true}}, "g": 1}));
        let mut patched = old.clone();
        diff(&new, &old).unwrap().apply(&mut patched);
        assert_eq!(patched, new);
    }

    #[test]
    fn test_clone_at() {
        let root = value(json!({"a": {"b": [1, 2]}}));
        assert_eq!(clone_at(&root, "a.b"), Some(value(json!([1, 2]))));
        assert_eq!(clone_at(&root, "a.z"), None);
        assert_eq!(clone_at(&root, ""), Some(root.clone()));
    }
}
