use converge_tree::{StateTree, StructuralPath, diff, extract};
use proptest::prelude::*;
use serde_json::{Map, Value};

fn arb_tree() -> impl Strategy<Value = StateTree> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-z]{0,6}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..5)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

proptest! {
    #[test]
    fn test_diff_is_reflexive(tree in arb_tree()) {
        prop_assert!(diff(&tree, &tree.clone()).is_empty());
    }

    #[test]
    fn test_diff_empty_iff_equal(a in arb_tree(), b in arb_tree()) {
        prop_assert_eq!(diff(&a, &b).is_empty(), a == b);
    }

    #[test]
    fn test_changed_paths_exist_somewhere(a in arb_tree(), b in arb_tree()) {
        // Every reported location is addressable in at least one of the two trees
        let changes = diff(&a, &b);
        for path in changes.paths() {
            prop_assert!(extract(&a, path).is_ok() || extract(&b, path).is_ok(), "{}", path);
        }
    }

    #[test]
    fn test_rendered_paths_parse_back(keys in prop::collection::vec(r#"[a-z'"\\]{1,5}"#, 0..4), index in 0usize..50) {
        let mut path = StructuralPath::root();
        for key in &keys {
            path = path.key(key.clone()).index(index);
        }
        prop_assert_eq!(StructuralPath::parse(&path.to_string()).unwrap(), path);
    }
}
