//! Diff command implementation
//!
//! Plans the actions between two state documents without executing them.

use std::path::Path;

use colored::Colorize;
use serde_json::json;

use converge_rules::{ExecutionUnit, Plan, RuleSet, plan};
use converge_tree::load_document;

use crate::error::Result;

/// Run the diff command
///
/// Exits 0 when there is nothing to do, 2 when actions were planned and 1
/// when any action could not be resolved.
pub fn run_diff(old: &Path, new: &Path, rules: &Path, explain: bool, json: bool) -> Result<i32> {
    let old = load_document(old)?;
    let new = load_document(new)?;
    let rules = RuleSet::load(rules)?;

    let plan = plan(&old, &new, &rules)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan_json(&plan, explain))?);
    } else {
        print_plan(&plan, explain);
    }

    Ok(exit_code(&plan))
}

fn exit_code(plan: &Plan) -> i32 {
    if !plan.failures.is_empty() {
        1
    } else if plan.actions.is_empty() {
        0
    } else {
        2
    }
}

pub(crate) fn plan_json(plan: &Plan, explain: bool) -> serde_json::Value {
    let mut out = json!({
        "has_changes": !plan.is_empty(),
        "actions": plan.actions.iter()
            .map(|a| json!({
                "action": a.action.to_string(),
                "path": a.subtree_path.to_string(),
                "selector": a.rule.rule_selector,
                "hosts": a.target,
                "vars": a.vars,
            }))
            .collect::<Vec<_>>(),
        "failures": plan.failures.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        "unmatched": plan.unmatched.iter().map(|p| p.to_string()).collect::<Vec<_>>(),
    });
    if explain {
        out["changes"] = plan.diff_bundle();
        out["units"] = json!(plan.units());
    }
    out
}

/// Print human-readable plan output
fn print_plan(plan: &Plan, explain: bool) {
    if plan.is_empty() {
        println!("{} No changes.", "OK".green().bold());
        return;
    }

    if explain {
        println!("{}", "Changes:".bold());
        for path in plan.changes.paths() {
            println!("  {} {}", "~".yellow(), path);
        }
        println!();
    }

    if plan.actions.is_empty() {
        println!("{} Changes found, but no rule governs them.", "OK".green().bold());
    } else {
        println!("{}", "Actions:".bold());
        for (action, unit) in plan.actions.iter().zip(plan.units()) {
            let label = action.action.to_string();
            let label = match action.action {
                converge_rules::Action::Create => label.green(),
                converge_rules::Action::Delete => label.red(),
                _ => label.yellow(),
            };
            println!("  {:<7} {} -> {}", label, action.subtree_path, action.target.cyan());
            if explain {
                print_unit(&unit, &action.rule.rule_selector);
            }
        }
    }

    if !plan.unmatched.is_empty() {
        println!();
        println!("{}", "Not governed by any rule:".bold());
        for path in &plan.unmatched {
            println!("  {} {}", "?".dimmed(), path);
        }
    }

    if !plan.failures.is_empty() {
        println!();
        println!("{}", "Unresolved:".red().bold());
        for failure in &plan.failures {
            println!("  {} {}", "x".red(), failure);
        }
    }
}

fn print_unit(unit: &ExecutionUnit, selector: &str) {
    println!("          {} {}", "rule".dimmed(), selector);
    if unit.is_noop() {
        println!("          {}", "no tasks declared".dimmed());
    }
    for task in &unit.tasks {
        println!("          {} {}", "task".dimmed(), task);
    }
    for (name, value) in &unit.vars {
        if name != converge_rules::NODE_VAR {
            println!("          {} {} = {}", "var".dimmed(), name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_test_utils::Scenario;

    #[test]
    fn test_plan_json_lists_actions() {
        let scenario = Scenario::load("add_to_empty");
        let plan = plan(&scenario.old, &scenario.new, &scenario.rules).unwrap();

        let out = plan_json(&plan, false);
        assert_eq!(out["has_changes"], json!(true));
        assert_eq!(out["actions"][0]["action"], json!("CREATE"));
        assert_eq!(out["actions"][0]["path"], json!("root['routers'][0]"));
        assert_eq!(out["actions"][0]["vars"]["router_name"], json!("R1"));
        assert!(out.get("units").is_none());
    }

    #[test]
    fn test_plan_json_explain_adds_units() {
        let scenario = Scenario::load("add_to_empty");
        let plan = plan(&scenario.old, &scenario.new, &scenario.rules).unwrap();

        let out = plan_json(&plan, true);
        assert_eq!(out["units"][0]["name"], json!("CREATE root['routers'][0] all"));
        assert!(out["changes"].get("dictionary_item_added").is_some());
    }

    #[test]
    fn test_exit_codes() {
        let scenario = Scenario::load("reorder");
        let quiet = plan(&scenario.old, &scenario.new, &scenario.rules).unwrap();
        assert_eq!(exit_code(&quiet), 0);

        let scenario = Scenario::load("full_removal");
        let busy = plan(&scenario.old, &scenario.new, &scenario.rules).unwrap();
        assert_eq!(exit_code(&busy), 2);
    }
}
