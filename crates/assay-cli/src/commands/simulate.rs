//! The `assay simulate` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use assay_core::parser::load_item;
use assay_session::simulate::AttemptOutcome;
use assay_session::{simulate, EngineConfig, SimulationProgress, SimulationReport};

use super::parse_assignments;

/// Console progress reporter.
struct ConsoleReporter;

impl SimulationProgress for ConsoleReporter {
    fn on_attempt_complete(&self, outcome: &AttemptOutcome) {
        tracing::debug!(
            attempt = outcome.index,
            template_passes = outcome.template.attempts,
            "attempt complete"
        );
    }

    fn on_attempt_error(&self, index: usize, error: &str) {
        eprintln!("  ERROR: attempt {index}: {error}");
    }

    fn on_complete(&self, report: &SimulationReport) {
        eprintln!(
            "\nComplete: {}/{} attempts succeeded, {} failed ({}ms)",
            report.attempts - report.failed,
            report.attempts,
            report.failed,
            report.duration_ms
        );
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    item_path: PathBuf,
    attempts: usize,
    parallelism: Option<usize>,
    responses: Vec<String>,
    seed: Option<u64>,
    output: Option<PathBuf>,
    mut config: EngineConfig,
) -> Result<()> {
    anyhow::ensure!(attempts >= 1, "attempts must be at least 1");
    if let Some(parallelism) = parallelism {
        anyhow::ensure!(parallelism >= 1, "parallelism must be at least 1");
        config.parallelism = parallelism;
    }
    if seed.is_some() {
        config.seed = seed;
    }

    let item = Arc::new(load_item(&item_path)?);
    let responses = parse_assignments(&responses)?;
    eprintln!(
        "assay v{}: simulating {} attempts of '{}' ({} at a time)",
        env!("CARGO_PKG_VERSION"),
        attempts,
        item.identifier,
        config.parallelism
    );

    let report = simulate(item, &responses, attempts, &config, &ConsoleReporter).await?;
    print_summary(&report);

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write report: {}", path.display()))?;
        eprintln!("Report saved to: {}", path.display());
    }
    Ok(())
}

fn print_summary(report: &SimulationReport) {
    let completed = report.attempts - report.failed;
    let share = |count: usize| {
        if completed == 0 {
            0.0
        } else {
            count as f64 / completed as f64 * 100.0
        }
    };

    let mut table = Table::new();
    table.set_header(vec!["Outcome", "Value", "Count", "Share"]);
    for (identifier, values) in &report.outcome_frequencies {
        for (value, count) in values {
            table.add_row(vec![
                Cell::new(identifier),
                Cell::new(value),
                Cell::new(count),
                Cell::new(format!("{:.1}%", share(*count))),
            ]);
        }
    }
    println!("{table}");

    println!(
        "Correct: {}/{} ({:.1}%)",
        report.correct,
        completed,
        share(report.correct)
    );
    println!(
        "Template passes: mean {:.2}, max {}",
        report.mean_template_attempts, report.max_template_attempts
    );
    for (state, count) in &report.template_states {
        println!("  {state:?}: {count}");
    }
    for (identifier, count) in &report.binding_failures {
        println!("Binding failures for {identifier}: {count}");
    }
    for (identifier, count) in &report.invalid_responses {
        println!("Invalid responses for {identifier}: {count}");
    }
}
