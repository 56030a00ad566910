//! Total dot-path traversal over JSON trees.

use serde_json::Value;

/// Resolves a dot-delimited `path` (e.g. `"user.id"`) against `root`.
///
/// Objects are indexed by key and arrays by decimal position. Any step that
/// hits a missing key, an out-of-range index, or a non-container value makes
/// the whole path resolve to `None`; there is no partial result.
#[must_use]
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn resolves_nested_object_fields() {
        let session = json!({"user": {"id": "u1", "profile": {"email": "a@b.c"}}});
        assert_eq!(resolve_path(&session, "user.id"), Some(&json!("u1")));
        assert_eq!(
            resolve_path(&session, "user.profile.email"),
            Some(&json!("a@b.c"))
        );
    }

    #[test]
    fn single_segment_path() {
        let user = json!({"sub": "abc"});
        assert_eq!(resolve_path(&user, "sub"), Some(&json!("abc")));
    }

    #[test]
    fn missing_or_null_intermediate_yields_none() {
        assert_eq!(resolve_path(&json!({"user": null}), "user.id"), None);
        assert_eq!(resolve_path(&json!({}), "user.id"), None);
        assert_eq!(resolve_path(&json!({"user": "flat"}), "user.id"), None);
        assert_eq!(resolve_path(&json!(42), "a"), None);
    }

    #[test]
    fn null_leaf_is_returned_as_null() {
        assert_eq!(resolve_path(&json!({"id": null}), "id"), Some(&Value::Null));
    }

    #[test]
    fn array_positions_are_traversable() {
        let value = json!({"accounts": [{"id": "first"}, {"id": "second"}]});
        assert_eq!(resolve_path(&value, "accounts.1.id"), Some(&json!("second")));
        assert_eq!(resolve_path(&value, "accounts.9.id"), None);
        assert_eq!(resolve_path(&value, "accounts.x.id"), None);
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,6}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-c]{1,2}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn traversal_never_panics(value in arb_json(), path in "[a-c0-2.]{0,10}") {
            let _ = resolve_path(&value, &path);
        }

        #[test]
        fn resolved_leaf_matches_manual_walk(key in "[a-z]{1,8}", leaf in "[a-z0-9]{1,8}") {
            let mut inner = serde_json::Map::new();
            inner.insert(key.clone(), Value::String(leaf.clone()));
            let value = json!({ "outer": Value::Object(inner) });
            let path = format!("outer.{key}");
            prop_assert_eq!(resolve_path(&value, &path), Some(&Value::String(leaf)));
        }
    }
}
