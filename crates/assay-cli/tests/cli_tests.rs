//! CLI integration tests using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn assay() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("assay").unwrap()
}

#[test]
fn validate_sample_item() {
    assay()
        .arg("validate")
        .arg("--item")
        .arg("../../samples/capital.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("Item: capital"))
        .stdout(predicate::str::contains("All definitions valid"));
}

#[test]
fn validate_sample_test() {
    assay()
        .arg("validate")
        .arg("--test")
        .arg("../../samples/quiz.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("Test: quiz (3 items)"))
        .stdout(predicate::str::contains("All definitions valid"));
}

#[test]
fn validate_reports_unknown_variable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(
        &path,
        r#"
[item]
identifier = "broken"

[[declarations]]
identifier = "SCORE"
class = "outcome"
cardinality = "single"
base_type = "float"

[[response_processing]]
rule = "set_outcome_value"
identifier = "SCORE"
expression = { tag = "variable", identifier = "NOPE" }
"#,
    )
    .unwrap();

    assay()
        .arg("validate")
        .arg("--item")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("NOPE"))
        .stdout(predicate::str::contains("1 warning(s) found"));
}

#[test]
fn validate_requires_a_target() {
    assay().arg("validate").assert().failure();
}

#[test]
fn validate_nonexistent_file() {
    assay()
        .arg("validate")
        .arg("--item")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn run_correct_response() {
    assay()
        .arg("run")
        .arg("--item")
        .arg("../../samples/capital.toml")
        .arg("--response")
        .arg("RESPONSE=PARIS")
        .arg("--seed")
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("Correct: yes"))
        .stdout(predicate::str::contains("completed"));
}

#[test]
fn run_json_summary() {
    let output = assay()
        .arg("run")
        .arg("--item")
        .arg("../../samples/capital.toml")
        .arg("--response")
        .arg("RESPONSE=LYON")
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["identifier"], "capital");
    assert_eq!(summary["correct"], false);
    assert_eq!(summary["attempts"], 1);
}

#[test]
fn run_with_template_override() {
    assay()
        .arg("run")
        .arg("--item")
        .arg("../../samples/addition.toml")
        .arg("--template")
        .arg("A=2")
        .arg("--response")
        .arg("RESPONSE=0")
        .assert()
        .success()
        .stdout(predicate::str::contains("Correct: no"));
}

#[test]
fn run_rejects_unknown_template_variable() {
    assay()
        .arg("run")
        .arg("--item")
        .arg("../../samples/capital.toml")
        .arg("--template")
        .arg("Q=1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a template variable"));
}

#[test]
fn assemble_is_reproducible_with_seed() {
    let run = || {
        assay()
            .arg("assemble")
            .arg("--test")
            .arg("../../samples/quiz.toml")
            .arg("--seed")
            .arg("7")
            .output()
            .unwrap()
    };
    let first = run();
    let second = run();
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
    let stdout = String::from_utf8(first.stdout).unwrap();
    assert!(stdout.contains("item capital"));
    assert!(stdout.contains("2 item(s) delivered"));
}

#[test]
fn assemble_json_tree() {
    let output = assay()
        .arg("assemble")
        .arg("--test")
        .arg("../../samples/quiz.toml")
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());
    let tree: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(tree["test"], "quiz");
    assert_eq!(tree["parts"][0]["children"].as_array().unwrap().len(), 2);
}

#[test]
fn simulate_writes_report() {
    let dir = TempDir::new().unwrap();
    let report = dir.path().join("report.json");

    assay()
        .arg("simulate")
        .arg("--item")
        .arg("../../samples/capital.toml")
        .arg("--attempts")
        .arg("20")
        .arg("--parallelism")
        .arg("2")
        .arg("--response")
        .arg("RESPONSE=PARIS")
        .arg("--seed")
        .arg("3")
        .arg("--output")
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("Correct: 20/20"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["attempts"], 20);
    assert_eq!(json["item"], "capital");
}

#[test]
fn simulate_rejects_zero_attempts() {
    assay()
        .arg("simulate")
        .arg("--item")
        .arg("../../samples/capital.toml")
        .arg("--attempts")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("attempts must be at least 1"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    assay()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created assay.toml"))
        .stdout(predicate::str::contains("Created samples/quiz.toml"));

    assert!(dir.path().join("assay.toml").exists());
    assert!(dir.path().join("samples/capital.toml").exists());

    assay()
        .current_dir(dir.path())
        .arg("validate")
        .arg("--test")
        .arg("samples/quiz.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("All definitions valid"));
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    assay().current_dir(dir.path()).arg("init").assert().success();

    assay()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn broken_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("assay.toml"), "parallelism = 0\n").unwrap();

    assay()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn help_output() {
    assay()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Assessment scoring and processing engine"));
}

#[test]
fn version_output() {
    assay()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("assay"));
}
