//! Rules command implementation

use std::path::Path;

use colored::Colorize;

use converge_rules::{Action, RuleSet};

use crate::error::Result;

const ACTIONS: [Action; 6] = [
    Action::Create,
    Action::Update,
    Action::Delete,
    Action::Retrieve,
    Action::Rename,
    Action::Validate,
];

/// Load and compile a rule document, then list what it governs
pub fn run_rules(path: &Path) -> Result<i32> {
    let rules = RuleSet::load(path)?;

    println!(
        "{} {} rule(s) in {}",
        "OK".green().bold(),
        rules.len(),
        path.display()
    );
    for compiled in rules.iter() {
        let rule = &compiled.rule;
        println!();
        println!("  {}", rule.rule_selector.cyan());
        if let Some(id_key) = &rule.id_key {
            println!("    id_key: {}", id_key);
        }
        match &rule.inventory_selector {
            Some(selector) => println!("    hosts: <{}>", selector),
            None => println!(
                "    hosts: {}",
                rule.inventory.as_deref().unwrap_or(converge_rules::rule::DEFAULT_INVENTORY)
            ),
        }
        let declared: Vec<&str> = ACTIONS
            .iter()
            .filter(|a| !rule.tasks_for(**a).is_empty())
            .map(|a| a.as_str())
            .collect();
        if declared.is_empty() {
            println!("    actions: {}", "none".dimmed());
        } else {
            println!("    actions: {}", declared.join(", "));
        }
    }

    Ok(0)
}
