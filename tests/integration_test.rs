use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;

/// Run the binary inside `cwd` with a scrubbed environment so no ambient
/// credentials or certifier URL leak into the run.
fn run(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_paperscout"))
        .current_dir(cwd)
        .args(args)
        .env_remove("OPENAI_API_KEY")
        .env_remove("SEMANTIC_SCHOLAR_API_KEY")
        .env_remove("SWARMIT_URL")
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to spawn paperscout binary")
}

/// Config with no sources and no local model, so a run never touches the network.
fn write_offline_config(dir: &Path) {
    let topics = dir.join("topics");
    std::fs::create_dir_all(&topics).unwrap();
    std::fs::write(topics.join("kappa_gates.txt"), "representation solver compatibility").unwrap();

    let config = format!(
        r#"
[embedding]
local_enabled = false

[sources]
enabled = []

[pipeline]
topics_dir = "{}"
output_dir = "{}"
review_output_dir = "{}"
"#,
        topics.display(),
        dir.join("posts").display(),
        dir.join("reviews").display(),
    );
    std::fs::write(dir.join("paperscout.toml"), config).unwrap();
}

#[test]
fn test_invalid_threshold_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    write_offline_config(dir.path());

    let output = run(dir.path(), &["--min-score", "1.5"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("min_score"), "stderr: {}", stderr);
    assert!(output.stdout.is_empty());
}

#[test]
fn test_missing_topics_dir_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    write_offline_config(dir.path());
    let missing = dir.path().join("no-such-corpus");

    let output = run(dir.path(), &["--topics-dir", missing.to_str().unwrap()]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("topics_dir"), "stderr: {}", stderr);
}

#[test]
fn test_unknown_source_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    write_offline_config(dir.path());

    let config_path = dir.path().join("paperscout.toml");
    let config = std::fs::read_to_string(&config_path)
        .unwrap()
        .replace("enabled = []", "enabled = [\"arxiv\", \"citeseer\"]");
    std::fs::write(&config_path, config).unwrap();

    let output = run(dir.path(), &[]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("citeseer"), "stderr: {}", stderr);
}

#[test]
fn test_empty_run_prints_json_summary_and_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    write_offline_config(dir.path());

    let output = run(dir.path(), &["--json", "--days", "3"]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let summary: Value = serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(summary["stopped_at"], "fetch");
    assert_eq!(summary["papers_fetched"], 0);
    assert_eq!(summary["errors"].as_array().unwrap().len(), 0);
    assert_eq!(summary["dry_run"], false);
    assert!(summary["run_id"].is_string());
    assert!(!dir.path().join("posts").exists());
}

#[test]
fn test_empty_run_prints_report() {
    let dir = tempfile::tempdir().unwrap();
    write_offline_config(dir.path());

    let output = run(dir.path(), &["--dry-run"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("PIPELINE SUMMARY"));
    assert!(stdout.contains("Stopped at:        FETCH (dry run)"));
    assert!(stdout.contains("Papers fetched:    0"));
}

#[test]
fn test_help_lists_flags() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--days", "--min-score", "--dry-run", "--no-reviews", "--topics-dir", "--json"] {
        assert!(stdout.contains(flag), "missing {} in help", flag);
    }
}
