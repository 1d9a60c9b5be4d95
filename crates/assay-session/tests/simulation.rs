//! Batch simulation through the tokio runtime.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use assay_core::parser::parse_item_str;
use assay_session::{simulate, EngineConfig, NoopProgress, TemplateState};

const ITEM: &str = r#"
[item]
identifier = "addition"
response_processing_template = "match_correct"

[[declarations]]
identifier = "A"
class = "template"
cardinality = "single"
base_type = "integer"

[[declarations]]
identifier = "RESPONSE"
class = "response"
cardinality = "single"
base_type = "integer"
correct = 4

[[template_processing]]
rule = "set_template_value"
identifier = "A"
expression = { tag = "randomInteger", min = 1, max = 6 }

[[template_processing]]
rule = "template_constraint"
expression = { tag = "gt", children = [
    { tag = "variable", identifier = "A" },
    { tag = "baseValue", base_type = "integer", value = 3 },
] }
"#;

fn responses(value: &str) -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([("RESPONSE".to_string(), vec![value.to_string()])])
}

fn config(seed: Option<u64>) -> EngineConfig {
    EngineConfig {
        seed,
        parallelism: 3,
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn simulate_runs_every_attempt() {
    let item = Arc::new(parse_item_str(ITEM, Path::new("addition.toml")).unwrap());
    let report = simulate(item, &responses("4"), 25, &config(Some(9)), &NoopProgress)
        .await
        .unwrap();

    assert_eq!(report.item, "addition");
    assert_eq!(report.attempts, 25);
    assert_eq!(report.failed, 0);
    assert_eq!(report.correct, 25);
    assert_eq!(report.template_states[&TemplateState::Exited], 25);
    assert!(report.mean_template_attempts >= 1.0);
    assert_eq!(report.outcome_frequencies["SCORE"]["1"], 25);
}

#[tokio::test]
async fn seeded_simulations_are_reproducible() {
    let item = Arc::new(parse_item_str(ITEM, Path::new("addition.toml")).unwrap());
    let first = simulate(Arc::clone(&item), &responses("4"), 10, &config(Some(5)), &NoopProgress)
        .await
        .unwrap();
    let second = simulate(item, &responses("4"), 10, &config(Some(5)), &NoopProgress)
        .await
        .unwrap();
    assert_eq!(first.max_template_attempts, second.max_template_attempts);
    assert_eq!(first.mean_template_attempts, second.mean_template_attempts);
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn unparseable_responses_are_counted() {
    let item = Arc::new(parse_item_str(ITEM, Path::new("addition.toml")).unwrap());
    let report = simulate(item, &responses("four"), 4, &config(None), &NoopProgress)
        .await
        .unwrap();
    assert_eq!(report.binding_failures["RESPONSE"], 4);
    assert_eq!(report.correct, 0);
}
