use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

/// Data dir with a four-case test set and two prompts.
fn seed_data() -> TempDir {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    fs::create_dir_all(data.join("prompts")).unwrap();
    fs::write(
        data.join("test_set.json"),
        r#"[
            {"id": 1, "ticket": "Where is my order?", "expected": "ORDER"},
            {"id": 2, "ticket": "I want my money back", "expected": "REFUND"},
            {"id": 3, "ticket": "Cancel my order please", "expected": "ORDER"},
            {"id": 4, "ticket": "Send me the invoice", "expected": "INVOICE"}
        ]"#,
    )
    .unwrap();
    for (id, created) in [("v1", "2024-01-01T00:00:00Z"), ("v2", "2024-02-01T00:00:00Z")] {
        fs::write(
            data.join("prompts").join(format!("{id}.json")),
            format!(
                r#"{{"id": "{id}", "name": "Prompt {id}", "template": "Classify: {{ticket}}", "created_at": "{created}"}}"#
            ),
        )
        .unwrap();
    }
    dir
}

fn promptlab(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("promptlab").unwrap();
    cmd.current_dir(root)
        .env_remove("PROMPTLAB_CONFIG")
        .env_remove("PROMPTLAB_DATA_DIR")
        .env_remove("PROMPTLAB_CLASSIFIER_API_KEY")
        .env_remove("OPENAI_API_KEY")
        .env("RUST_LOG", "warn")
        .args(["--data-dir", "data"]);
    cmd
}

fn run_json(root: &Path, prompt: &str, answer: &str) -> Value {
    let out = promptlab(root)
        .args(["run", "--prompt", prompt, "--json", "--classifier", "fake"])
        .args(["--fake-response", answer])
        .output()
        .unwrap();
    assert!(out.status.success(), "run failed: {}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).expect("run --json must print JSON")
}

#[test]
fn version_prints_package_version() {
    let root = seed_data();
    promptlab(root.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn run_with_fake_classifier_reports_accuracy() {
    let root = seed_data();
    promptlab(root.path())
        .args(["run", "--prompt", "v1", "--classifier", "fake", "--fake-response", "order"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Accuracy: 50.0% (2/4)"))
        .stdout(predicate::str::contains("Failed cases (2):"));

    let runs: Vec<_> = fs::read_dir(root.path().join("data/runs"))
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(runs.len(), 1);
}

#[test]
fn run_json_uses_stored_wire_names() {
    let root = seed_data();
    let body = run_json(root.path(), "v1", "ORDER");
    let run = &body["run"];
    assert_eq!(run["status"], "completed");
    assert_eq!(run["prompt_id"], "v1");
    assert_eq!(run["metrics"]["correct"], 2);
    assert_eq!(run["results"].as_array().unwrap().len(), 4);
    assert_eq!(run["results"][1]["ticket"], "I want my money back");
    assert_eq!(run["results"][1]["predicted"], "ORDER");
    assert_eq!(run["confusion_matrix"]["REFUND"]["ORDER"], 1);
    assert!(body["comparison"].is_null());
}

#[test]
fn unknown_prompt_exits_not_found() {
    let root = seed_data();
    promptlab(root.path())
        .args(["run", "--prompt", "v9", "--classifier", "fake"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("prompt not found: v9"));
}

#[test]
fn missing_test_set_exits_run_failed() {
    let root = seed_data();
    fs::remove_file(root.path().join("data/test_set.json")).unwrap();
    promptlab(root.path())
        .args(["run", "--prompt", "v1", "--classifier", "fake"])
        .assert()
        .code(3);

    let out = promptlab(root.path())
        .args(["runs", "list", "--json"])
        .output()
        .unwrap();
    let runs: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(runs[0]["status"], "failed");
    assert!(runs[0]["error"].as_str().unwrap().contains("test_set.json"));
}

#[test]
fn openai_without_key_is_config_error() {
    let root = seed_data();
    promptlab(root.path())
        .args(["run", "--prompt", "v1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("API key"));
}

#[test]
fn regression_against_baseline_prompt() {
    let root = seed_data();
    run_json(root.path(), "v1", "ORDER");

    // v2 answers REFUND for everything: 1/4 vs 2/4.
    promptlab(root.path())
        .args(["run", "--prompt", "v2", "--classifier", "fake", "--fake-response", "REFUND"])
        .args(["--baseline-prompt", "v1", "--fail-on-regression"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("REGRESSION"));

    // Without the flag the regression is reported but not fatal.
    promptlab(root.path())
        .args(["run", "--prompt", "v2", "--classifier", "fake", "--fake-response", "REFUND"])
        .args(["--baseline-prompt", "v1"])
        .assert()
        .success();
}

#[test]
fn baseline_prompt_without_runs_exits_not_found() {
    let root = seed_data();
    promptlab(root.path())
        .args(["run", "--prompt", "v1", "--classifier", "fake", "--baseline-prompt", "v2"])
        .assert()
        .code(4);
}

#[test]
fn runs_show_and_compare() {
    let root = seed_data();
    let a = run_json(root.path(), "v1", "ORDER");
    let b = run_json(root.path(), "v2", "INVOICE");
    let a_id = a["run"]["id"].as_str().unwrap().to_string();
    let b_id = b["run"]["id"].as_str().unwrap().to_string();

    promptlab(root.path())
        .args(["runs", "show", &a_id])
        .assert()
        .success()
        .stdout(predicate::str::contains(a_id.as_str()))
        .stdout(predicate::str::contains("Accuracy: 50.0%"));

    promptlab(root.path())
        .args(["runs", "show", "v1_nope"])
        .assert()
        .code(4);

    let out = promptlab(root.path())
        .args(["compare", &a_id, &b_id, "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let cmp: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(cmp["outcome"], "regression");
    assert_eq!(cmp["newly_failed"].as_array().unwrap().len(), 2);
    assert_eq!(cmp["newly_fixed"].as_array().unwrap().len(), 1);

    promptlab(root.path())
        .args(["compare", &a_id, &b_id, "--fail-on-regression"])
        .assert()
        .code(1);
}

#[test]
fn runs_list_filters_by_prompt() {
    let root = seed_data();
    run_json(root.path(), "v1", "ORDER");
    run_json(root.path(), "v2", "ORDER");

    let out = promptlab(root.path())
        .args(["runs", "list", "--prompt", "v2", "--json"])
        .output()
        .unwrap();
    let runs: Value = serde_json::from_slice(&out.stdout).unwrap();
    let runs = runs.as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["prompt_id"], "v2");
}

#[test]
fn summary_names_best_prompt() {
    let root = seed_data();
    run_json(root.path(), "v1", "ORDER");
    run_json(root.path(), "v2", "REFUND");

    let out = promptlab(root.path())
        .args(["summary", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let summary: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(summary["best_prompt"], "v1");
    assert_eq!(summary["total_runs"], 2);
    assert_eq!(summary["test_set_size"], 4);
    assert_eq!(summary["prompts"][1]["latest_accuracy"], 0.25);
}

#[test]
fn test_set_info_and_cases() {
    let root = seed_data();
    promptlab(root.path())
        .args(["test-set", "info"])
        .assert()
        .success()
        .stdout(predicate::str::contains("4 cases, 3 categories"));

    let out = promptlab(root.path())
        .args(["test-set", "cases", "--category", "order", "--limit", "1", "--json"])
        .output()
        .unwrap();
    let page: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(page["total"], 2);
    assert_eq!(page["cases"].as_array().unwrap().len(), 1);
    assert_eq!(page["cases"][0]["id"], 1);
}

#[test]
fn sqlite_backend_from_config_file() {
    let root = seed_data();
    fs::write(
        root.path().join("promptlab.yaml"),
        "storage:\n  backend: sqlite\n",
    )
    .unwrap();

    run_json(root.path(), "v1", "ORDER");
    assert!(root.path().join("data/runs.db").exists());

    promptlab(root.path())
        .args(["runs", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("completed"));
}

#[test]
fn invalid_config_exits_config_error() {
    let root = seed_data();
    fs::write(root.path().join("promptlab.yaml"), "execution:\n  max_concurrent_runs: 0\n").unwrap();
    promptlab(root.path())
        .args(["runs", "list"])
        .assert()
        .code(2);
}
