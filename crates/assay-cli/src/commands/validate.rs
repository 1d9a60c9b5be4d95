//! The `assay validate` command.

use std::path::PathBuf;

use anyhow::Result;

use assay_core::error::Diagnostic;
use assay_core::parser::{load_item, load_test};
use assay_core::validate::{validate_item, validate_test};

fn print_diagnostics(scope: &str, diagnostics: &[Diagnostic]) {
    for d in diagnostics {
        println!("  [{scope}] WARNING: {d}");
    }
}

pub fn execute(item_path: Option<PathBuf>, test_path: Option<PathBuf>) -> Result<()> {
    let mut total_warnings = 0;

    if let Some(path) = item_path {
        let item = load_item(&path)?;
        println!(
            "Item: {} ({} declarations, {} interactions)",
            item.identifier,
            item.declarations.len(),
            item.interactions.len()
        );
        let diagnostics = validate_item(&item);
        print_diagnostics(&item.identifier, &diagnostics);
        total_warnings += diagnostics.len();
    }

    if let Some(path) = test_path {
        let test = load_test(&path)?;
        println!("Test: {} ({} items)", test.identifier, test.item_refs().count());
        let diagnostics = validate_test(&test);
        print_diagnostics(&test.identifier, &diagnostics);
        total_warnings += diagnostics.len();

        for (href, item) in &test.items {
            let diagnostics = validate_item(item);
            if !diagnostics.is_empty() {
                println!("  Item {} ({href}):", item.identifier);
            }
            print_diagnostics(&item.identifier, &diagnostics);
            total_warnings += diagnostics.len();
        }
    }

    if total_warnings == 0 {
        println!("All definitions valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
