//! The `assay init` command.

use std::path::Path;

use anyhow::Result;

const SAMPLE_CONFIG: &str = include_str!("../../../../samples/assay.toml");
const SAMPLE_CHOICE_ITEM: &str = include_str!("../../../../samples/capital.toml");
const SAMPLE_TEMPLATE_ITEM: &str = include_str!("../../../../samples/addition.toml");
const SAMPLE_TEST: &str = include_str!("../../../../samples/quiz.toml");

fn create(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

pub fn execute() -> Result<()> {
    create(Path::new("assay.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("samples")?;
    create(Path::new("samples/capital.toml"), SAMPLE_CHOICE_ITEM)?;
    create(Path::new("samples/addition.toml"), SAMPLE_TEMPLATE_ITEM)?;
    create(Path::new("samples/quiz.toml"), SAMPLE_TEST)?;

    println!("\nNext steps:");
    println!("  1. Run: assay validate --test samples/quiz.toml");
    println!("  2. Run: assay run --item samples/capital.toml --response RESPONSE=PARIS");
    println!("  3. Run: assay simulate --item samples/addition.toml --attempts 200");

    Ok(())
}
