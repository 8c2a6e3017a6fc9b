//! End-to-end planning over the YAML scenarios in `test-fixtures/`

use converge_rules::{Action, Error, Rule, RuleSet, plan};
use converge_test_utils::Scenario;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

#[test]
fn test_rename_and_add_is_one_update() {
    let scenario = Scenario::load("rename_and_add");
    let plan = plan(&scenario.old, &scenario.new, &scenario.rules).unwrap();

    assert_eq!(plan.actions.len(), 1);
    let action = &plan.actions[0];
    assert_eq!(action.action, Action::Update);
    assert_eq!(action.subtree_path.to_string(), "root['routers'][0]");
    assert_eq!(
        action.subtree,
        json!({"name": "R2", "interfaces": [{"name": "eth1", "ip_address": "1.1.1.1"}]})
    );
    assert_eq!(action.vars["router_name"], json!("R2"));
    assert!(plan.unmatched.is_empty());
}

#[test]
fn test_add_to_missing_container_is_create() {
    let scenario = Scenario::load("add_to_empty");
    let plan = plan(&scenario.old, &scenario.new, &scenario.rules).unwrap();

    assert_eq!(plan.actions.len(), 1);
    assert_eq!(plan.actions[0].action, Action::Create);
    assert_eq!(plan.actions[0].subtree, json!({"name": "R1"}));
}

#[test]
fn test_full_removal_is_delete() {
    let scenario = Scenario::load("full_removal");
    let plan = plan(&scenario.old, &scenario.new, &scenario.rules).unwrap();

    assert_eq!(plan.actions.len(), 1);
    assert_eq!(plan.actions[0].action, Action::Delete);
    assert_eq!(plan.actions[0].subtree, json!({"name": "R1"}));
}

#[test]
fn test_reversed_scenario_inverts_action() {
    let scenario = Scenario::load("add_to_empty").reversed();
    let plan = plan(&scenario.old, &scenario.new, &scenario.rules).unwrap();
    assert_eq!(plan.actions[0].action, Action::Delete);
}

#[test]
fn test_reorder_is_no_change() {
    let scenario = Scenario::load("reorder");
    let plan = plan(&scenario.old, &scenario.new, &scenario.rules).unwrap();
    assert!(plan.is_empty());
    assert!(plan.actions.is_empty());
}

#[rstest]
#[case::null_to_list(json!({"routers": null}), json!({"routers": [{"name": "R1"}]}), Action::Create)]
#[case::list_to_null(json!({"routers": [{"name": "R1"}]}), json!({"routers": null}), Action::Delete)]
#[case::empty_to_list(json!({"routers": []}), json!({"routers": [{"name": "R1"}]}), Action::Create)]
#[case::list_to_empty(json!({"routers": [{"name": "R1"}]}), json!({"routers": []}), Action::Delete)]
fn test_empty_container_ambiguity(
    #[case] old: serde_json::Value,
    #[case] new: serde_json::Value,
    #[case] expected: Action,
) {
    let rules = RuleSet::new(vec![Rule::new(r"root['routers'][\d+]")]).unwrap();
    let plan = plan(&old, &new, &rules).unwrap();

    assert_eq!(plan.actions.len(), 1);
    assert_eq!(plan.actions[0].action, expected);
    assert_eq!(plan.actions[0].subtree, json!({"name": "R1"}));
}

#[test]
fn test_null_to_mapping_resolves_each_key() {
    let rules = RuleSet::parse_yaml(
        r#"
rules:
  - rule_selector: root['system']['hostname']
  - rule_selector: root['system']['ntp']
"#,
    )
    .unwrap();
    let old = json!({"system": null});
    let new = json!({"system": {"hostname": "edge-1", "ntp": "pool.ntp.org"}});

    let plan = plan(&old, &new, &rules).unwrap();
    let paths: Vec<String> = plan
        .actions
        .iter()
        .map(|a| a.subtree_path.to_string())
        .collect();
    assert_eq!(paths, vec!["root['system']['hostname']", "root['system']['ntp']"]);
    assert!(plan.actions.iter().all(|a| a.action == Action::Create));
}

#[test]
fn test_nested_rules_produce_one_action_per_subtree() {
    let rules = RuleSet::parse_yaml(
        r#"
rules:
  - rule_selector: root['routers'][\d+]['interfaces'][\d+]
  - rule_selector: root['routers'][\d+]
"#,
    )
    .unwrap();
    let old = json!({"routers": [{"name": "R1", "interfaces": [{"name": "eth0", "mtu": 1500}]}]});
    let new = json!({"routers": [{"name": "R1", "interfaces": [{"name": "eth0", "mtu": 9000}]}]});

    let plan = plan(&old, &new, &rules).unwrap();
    assert_eq!(plan.actions.len(), 2);
    assert_eq!(
        plan.actions[0].subtree_path.to_string(),
        "root['routers'][0]['interfaces'][0]"
    );
    assert_eq!(plan.actions[1].subtree_path.to_string(), "root['routers'][0]");
}

#[test]
fn test_inventory_selector_targets_hosts() {
    let rules = RuleSet::parse_yaml(
        r#"
rules:
  - rule_selector: root['routers'][\d+]
    inventory_selector: name
    create:
      tasks: create_router.yml
"#,
    )
    .unwrap();
    let plan = plan(&json!({}), &json!({"routers": [{"name": "R1"}]}), &rules).unwrap();

    let units = plan.units();
    assert_eq!(units[0].hosts, "R1");
    assert_eq!(units[0].name, "CREATE root['routers'][0] R1");
}

#[test]
fn test_invariant_error_is_not_action_local() {
    let err = Error::StructuralInvariant {
        path: "root['x']".to_string(),
    };
    assert!(!err.is_action_local());
}
