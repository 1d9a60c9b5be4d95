//! The `assay run` command.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use assay_core::model::{ItemDefinition, VariableClass};
use assay_core::parser::load_item;
use assay_core::value::Value;
use assay_session::{EngineConfig, ItemSession};

use super::parse_assignments;

/// Turn `ID=VALUE` template arguments into typed values for the item's
/// template variables.
fn template_defaults(
    item: &ItemDefinition,
    args: &[String],
) -> Result<BTreeMap<String, Value>> {
    let mut defaults = BTreeMap::new();
    for (identifier, raw) in parse_assignments(args)? {
        let declaration = item
            .declaration(&identifier)
            .filter(|d| d.class == VariableClass::Template)
            .with_context(|| format!("'{identifier}' is not a template variable"))?;
        let base_type = declaration
            .base_type
            .with_context(|| format!("record variable '{identifier}' cannot be set"))?;
        let value = Value::parse(declaration.cardinality, base_type, raw.as_slice())
            .with_context(|| format!("invalid value for template variable '{identifier}'"))?;
        defaults.insert(identifier, value);
    }
    Ok(defaults)
}

pub fn execute(
    item_path: PathBuf,
    responses: Vec<String>,
    templates: Vec<String>,
    seed: Option<u64>,
    json: bool,
    mut config: EngineConfig,
) -> Result<()> {
    let item = Arc::new(load_item(&item_path)?);
    let external = template_defaults(&item, &templates)?;
    let responses = parse_assignments(&responses)?;
    if seed.is_some() {
        config.seed = seed;
    }

    let mut session = ItemSession::new(Arc::clone(&item)).with_config(&config);
    if let Some(report) = session.initialize_attempt(&external) {
        eprintln!(
            "Template processing: {:?} after {} pass(es)",
            report.state, report.attempts
        );
    }

    let failed = session.bind_responses(&responses)?;
    for identifier in &failed {
        eprintln!("Warning: could not bind response '{identifier}'");
    }
    for identifier in session.validate_responses()? {
        eprintln!("Warning: response '{identifier}' does not satisfy its interaction");
    }
    session.process_responses()?;
    for d in session.diagnostics() {
        eprintln!("Warning: {d}");
    }

    let summary = session.summary();
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Variable", "Class", "Value"]);
    for declaration in &item.declarations {
        table.add_row(vec![
            Cell::new(&declaration.identifier),
            Cell::new(declaration.class),
            Cell::new(session.value(&declaration.identifier)),
        ]);
    }
    println!("Item: {}", item.identifier);
    println!("{table}");

    let correct = match summary.correct {
        Some(true) => "yes",
        Some(false) => "no",
        None => "n/a",
    };
    println!(
        "Attempts: {}  Status: {}  Correct: {correct}",
        summary.attempts, summary.completion_status
    );

    Ok(())
}
