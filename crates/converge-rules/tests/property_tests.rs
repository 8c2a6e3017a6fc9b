//! Property tests for canonicalization and deduplication

use std::collections::HashSet;
use std::sync::Arc;

use converge_rules::{ChangeCategory, Match, Rule, RuleSet, canonicalize, dedup};
use converge_tree::{StateTree, StructuralPath, diff};
use proptest::prelude::*;
use serde_json::json;

fn routers_by_name() -> RuleSet {
    let mut rule = Rule::new(r"root['routers'][\d+]");
    rule.id_key = Some("name".to_string());
    RuleSet::new(vec![rule]).unwrap()
}

fn routers(items: &[(String, u32)]) -> StateTree {
    let list: Vec<StateTree> = items
        .iter()
        .map(|(name, asn)| json!({"name": name, "asn": asn}))
        .collect();
    json!({"routers": list, "hostname": "edge"})
}

/// Router lists with unique names, plus a shuffled copy
fn arb_router_lists() -> impl Strategy<Value = (Vec<(String, u32)>, Vec<(String, u32)>)> {
    prop::collection::hash_map("[a-z]{1,6}", any::<u32>(), 0..8).prop_flat_map(|map| {
        let items: Vec<(String, u32)> = map.into_iter().collect();
        (Just(items.clone()), Just(items).prop_shuffle())
    })
}

fn arb_match() -> impl Strategy<Value = Match> {
    (0usize..4, 0usize..3).prop_map(|(index, depth)| {
        let subtree_path = StructuralPath::root().key("routers").index(index);
        let mut changed_path = subtree_path.clone();
        for _ in 0..depth {
            changed_path = changed_path.key("name");
        }
        Match {
            category: ChangeCategory::Subtree,
            rule: Arc::new(Rule::new(r"root['routers'][\d+]")),
            subtree_path,
            changed_path,
            value: None,
        }
    })
}

proptest! {
    #[test]
    fn canonicalize_is_idempotent((items, _) in arb_router_lists()) {
        let rules = routers_by_name();
        let once = canonicalize(&routers(&items), &rules);
        let twice = canonicalize(&once, &rules);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn reordering_identity_sequences_is_no_change((items, shuffled) in arb_router_lists()) {
        let rules = routers_by_name();
        let a = canonicalize(&routers(&items), &rules);
        let b = canonicalize(&routers(&shuffled), &rules);
        prop_assert!(diff(&a, &b).is_empty());
    }

    #[test]
    fn dedup_keeps_first_match_per_subtree(matches in prop::collection::vec(arb_match(), 0..20)) {
        let kept = dedup(matches.clone());

        let kept_paths: Vec<&StructuralPath> = kept.iter().map(|m| &m.subtree_path).collect();
        let unique: HashSet<&StructuralPath> = kept_paths.iter().copied().collect();
        prop_assert_eq!(unique.len(), kept_paths.len());

        let mut expected = Vec::new();
        for m in &matches {
            if !expected.contains(&&m.subtree_path) {
                expected.push(&m.subtree_path);
            }
        }
        prop_assert_eq!(kept_paths, expected);

        // The kept match is the first one seen, not a later duplicate
        for m in &kept {
            let first = matches.iter().find(|c| c.subtree_path == m.subtree_path).unwrap();
            prop_assert_eq!(&first.changed_path, &m.changed_path);
        }
    }
}
