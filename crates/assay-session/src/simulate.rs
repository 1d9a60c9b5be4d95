//! Batch simulation of many independent attempts at one item.
//!
//! Every attempt gets its own session and random source and runs on the
//! blocking pool, at most `parallelism` at a time. The report aggregates
//! template outcomes, scores and binding failures across attempts.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use assay_core::model::ItemDefinition;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::processing::{TemplateReport, TemplateState};
use crate::session::{ItemSession, ItemSummary};

/// Result of one simulated attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptOutcome {
    pub index: usize,
    pub seed: Option<u64>,
    pub template: TemplateReport,
    pub binding_failures: BTreeSet<String>,
    pub invalid_responses: BTreeSet<String>,
    pub diagnostics: usize,
    pub summary: ItemSummary,
}

/// Aggregate over a batch of attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub item: String,
    pub attempts: usize,
    /// Attempts that did not produce an outcome.
    pub failed: usize,
    pub template_states: BTreeMap<TemplateState, usize>,
    pub mean_template_attempts: f64,
    pub max_template_attempts: u32,
    pub correct: usize,
    /// Per outcome variable, how often each final value occurred.
    pub outcome_frequencies: BTreeMap<String, BTreeMap<String, usize>>,
    pub binding_failures: BTreeMap<String, usize>,
    pub invalid_responses: BTreeMap<String, usize>,
    pub diagnostics: usize,
    pub duration_ms: u64,
}

/// Progress callbacks for a simulation run.
pub trait SimulationProgress: Send + Sync {
    fn on_attempt_complete(&self, outcome: &AttemptOutcome);
    fn on_attempt_error(&self, index: usize, error: &str);
    fn on_complete(&self, report: &SimulationReport);
}

pub struct NoopProgress;

impl SimulationProgress for NoopProgress {
    fn on_attempt_complete(&self, _: &AttemptOutcome) {}
    fn on_attempt_error(&self, _: usize, _: &str) {}
    fn on_complete(&self, _: &SimulationReport) {}
}

/// Run one attempt to completion: initialize, bind, validate and process.
pub fn run_attempt(
    item: Arc<ItemDefinition>,
    responses: &BTreeMap<String, Vec<String>>,
    index: usize,
    seed: Option<u64>,
    max_template_retries: u32,
) -> Result<AttemptOutcome> {
    let mut session = ItemSession::new(item).with_max_template_retries(max_template_retries);
    if let Some(seed) = seed {
        session = session.with_seed(seed);
    }
    session.initialize_attempt(&BTreeMap::new());
    let binding_failures = session.bind_responses(responses)?;
    let invalid_responses = session.validate_responses()?;
    session.process_responses()?;

    let template = session.template_report().copied().unwrap_or(TemplateReport {
        state: TemplateState::Exited,
        attempts: 0,
    });
    Ok(AttemptOutcome {
        index,
        seed,
        template,
        binding_failures,
        invalid_responses,
        diagnostics: session.diagnostics().len(),
        summary: session.summary(),
    })
}

/// Simulate `attempts` independent attempts submitting the same responses.
///
/// With a configured seed, attempt `i` uses `seed + i`, so runs are
/// reproducible regardless of scheduling order.
pub async fn simulate(
    item: Arc<ItemDefinition>,
    responses: &BTreeMap<String, Vec<String>>,
    attempts: usize,
    config: &EngineConfig,
    progress: &dyn SimulationProgress,
) -> Result<SimulationReport> {
    let start = Instant::now();
    let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
    let responses = Arc::new(responses.clone());
    let mut futures = FuturesUnordered::new();

    for index in 0..attempts {
        let item = Arc::clone(&item);
        let responses = Arc::clone(&responses);
        let semaphore = Arc::clone(&semaphore);
        let seed = config.seed.map(|s| s.wrapping_add(index as u64));
        let max_retries = config.max_template_retries;

        futures.push(async move {
            let inner = async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                tokio::task::spawn_blocking(move || {
                    run_attempt(item, &responses, index, seed, max_retries)
                })
                .await?
            };
            (index, inner.await)
        });
    }

    let mut outcomes = Vec::with_capacity(attempts);
    let mut failed = 0usize;
    while let Some((index, result)) = futures.next().await {
        match result {
            Ok(outcome) => {
                progress.on_attempt_complete(&outcome);
                outcomes.push(outcome);
            }
            Err(e) => {
                tracing::error!("simulated attempt {index} failed: {e:#}");
                progress.on_attempt_error(index, &e.to_string());
                failed += 1;
            }
        }
    }
    outcomes.sort_by_key(|o| o.index);

    let mut report = aggregate(&item.identifier, &outcomes);
    report.attempts = attempts;
    report.failed = failed;
    report.duration_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        item = %item.identifier,
        attempts,
        failed,
        correct = report.correct,
        "simulation finished"
    );
    progress.on_complete(&report);
    Ok(report)
}

fn aggregate(item: &str, outcomes: &[AttemptOutcome]) -> SimulationReport {
    let mut template_states = BTreeMap::new();
    let mut outcome_frequencies: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    let mut binding_failures = BTreeMap::new();
    let mut invalid_responses = BTreeMap::new();
    let mut total_template_attempts = 0u64;
    let mut max_template_attempts = 0;
    let mut correct = 0;
    let mut diagnostics = 0;

    for outcome in outcomes {
        *template_states.entry(outcome.template.state).or_insert(0) += 1;
        total_template_attempts += u64::from(outcome.template.attempts);
        max_template_attempts = max_template_attempts.max(outcome.template.attempts);
        if outcome.summary.correct == Some(true) {
            correct += 1;
        }
        diagnostics += outcome.diagnostics;
        for (identifier, value) in &outcome.summary.outcomes {
            *outcome_frequencies
                .entry(identifier.clone())
                .or_default()
                .entry(value.to_string())
                .or_insert(0) += 1;
        }
        for identifier in &outcome.binding_failures {
            *binding_failures.entry(identifier.clone()).or_insert(0) += 1;
        }
        for identifier in &outcome.invalid_responses {
            *invalid_responses.entry(identifier.clone()).or_insert(0) += 1;
        }
    }

    let mean_template_attempts = if outcomes.is_empty() {
        0.0
    } else {
        total_template_attempts as f64 / outcomes.len() as f64
    };

    SimulationReport {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        item: item.to_string(),
        attempts: outcomes.len(),
        failed: 0,
        template_states,
        mean_template_attempts,
        max_template_attempts,
        correct,
        outcome_frequencies,
        binding_failures,
        invalid_responses,
        diagnostics,
        duration_ms: 0,
    }
}
