//! Property tests for structural clone and diff.
//!
//! - a value never differs from itself
//! - applying `diff(new, old)` to `old` yields `new`
//! - a snapshot is independent of later writes to the source tree

use chrono::DateTime;
use libux::diff::{clone_at, diff};
use libux::path;
use libux::{Map, Value};
use proptest::prelude::*;

fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1_000_000i64..1_000_000).prop_map(Value::from),
        (-1e6f64..1e6).prop_map(Value::Number),
        "[a-z ]{0,8}".prop_map(Value::String),
        (0i64..4_102_444_800_000)
            .prop_filter_map("representable date", |millis| {
                DateTime::from_timestamp_millis(millis).map(Value::Date)
            }),
    ]
}

fn arb_key() -> impl Strategy<Value = String> {
    "[a-e]{1,2}"
}

fn arb_value() -> impl Strategy<Value = Value> {
    arb_leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::vec((arb_key(), inner), 0..6)
                .prop_map(|fields| Value::Map(fields.into_iter().collect::<Map>())),
        ]
    })
}

fn arb_map() -> impl Strategy<Value = Value> {
    prop::collection::vec((arb_key(), arb_value()), 0..6)
        .prop_map(|fields| Value::Map(fields.into_iter().collect::<Map>()))
}

proptest! {
    #[test]
    fn prop_diff_with_itself_is_empty(a in arb_value()) {
        prop_assert_eq!(diff(&a, &a), None);
    }

    #[test]
    fn prop_apply_reproduces_new_side(new in arb_map(), old in arb_map()) {
        let mut patched = old.clone();
        if let Some(changes) = diff(&new, &old) {
            changes.apply(&mut patched);
        }
        prop_assert_eq!(&patched, &new);
        prop_assert_eq!(diff(&patched, &new), None);
    }

    #[test]
    fn prop_diff_is_empty_only_for_equal_values(a in arb_value(), b in arb_value()) {
        prop_assert_eq!(diff(&a, &b).is_none(), a == b);
    }

    #[test]
    fn prop_snapshot_is_independent(source in arb_map(), key in arb_key(), leaf in arb_leaf()) {
        let snapshot = clone_at(&source, "").expect("root always resolves");
        let before = source.clone();
        let mut source = source;
        let _ = path::set(&mut source, &format!("{key}.x"), leaf);
        prop_assert_eq!(snapshot, before);
    }
}

#[test]
fn test_removed_key_is_reported_separately_from_null() {
    let old = Value::from(serde_json::json!({"a": 1, "b": null}));
    let new = Value::from(serde_json::json!({"b": null, "c": null}));
    let changes = diff(&new, &old).unwrap();
    let entries = changes.entries();
    assert_eq!(entries.len(), 2);
    assert!(entries.contains(&("a".to_owned(), None)));
    assert!(entries.contains(&("c".to_owned(), Some(&Value::Null))));
}
