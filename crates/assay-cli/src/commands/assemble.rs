//! The `assay assemble` command.

use std::path::PathBuf;

use anyhow::Result;

use assay_assembly::{assemble_test, RuntimeNode, RuntimeTree};
use assay_core::parser::load_test;
use assay_core::random::{from_entropy, seeded};
use assay_session::EngineConfig;

fn print_node(node: &RuntimeNode, depth: usize) {
    let indent = "  ".repeat(depth);
    match node {
        RuntimeNode::Section(section) => {
            if section.title.is_empty() {
                println!("{indent}section {}", section.identifier);
            } else {
                println!("{indent}section {} \"{}\"", section.identifier, section.title);
            }
            for child in &section.children {
                print_node(child, depth + 1);
            }
        }
        RuntimeNode::Item(item) => {
            println!(
                "{indent}item {} [{}] #{}",
                item.identifier, item.href, item.instance
            );
        }
    }
}

fn print_tree(tree: &RuntimeTree) {
    println!("Test: {}", tree.test);
    for part in &tree.parts {
        println!("  part {}", part.identifier);
        for child in &part.children {
            print_node(child, 2);
        }
    }
    println!("{} item(s) delivered.", tree.items().len());
}

pub fn execute(
    test_path: PathBuf,
    seed: Option<u64>,
    json: bool,
    config: EngineConfig,
) -> Result<()> {
    let test = load_test(&test_path)?;
    let mut rng = seed.or(config.seed).map(seeded).unwrap_or_else(from_entropy);
    let tree = assemble_test(&test, &mut rng);

    if json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else {
        print_tree(&tree);
    }
    Ok(())
}
