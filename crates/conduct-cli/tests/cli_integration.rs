//! CLI-level integration: write workflow YAML files to disk, then drive
//! them through the validate and run commands end to end.

use std::io::Write;

use conduct_cli::commands;

const FLOW_YAML: &str = r#"
name: "Simulated Market Sync"
description: "Fetch quotes with one transient failure, then aggregate"

agents:
  - name: fetcher-1
    role: fetcher
    max_concurrent: 2
  - name: analyst-1
    role: analyst

tasks:
  - name: fetch-quotes
    kind: simulate
    preferred_role: fetcher
    params:
      provider: alpha
      fail_times: 1
      error: "connection refused"
      work_ms: 5
      payload:
        symbol: AAPL
        price: 187.2

  - name: fetch-rates
    kind: simulate
    preferred_role: fetcher
    params:
      provider: beta
      work_ms: 5

  - name: aggregate
    kind: simulate
    preferred_role: analyst
    depends_on: [fetch-quotes, fetch-rates]
    params:
      provider: gamma
      work_ms: 5
"#;

fn write_flow(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{yaml}").unwrap();
    file
}

#[tokio::test(start_paused = true)]
async fn validate_then_run_workflow_file() {
    let file = write_flow(FLOW_YAML);
    let path = file.path().to_str().unwrap();

    commands::validate::run(path).await.unwrap();
    commands::run::run(path, false, 120).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn run_uses_fallback_provider() {
    let yaml = r#"
name: "Fallback Flow"
tasks:
  - name: fetch
    kind: simulate
    params:
      provider: flaky
      fallback: steady
      fail_times: 10
      error: "rate limit exceeded"
      work_ms: 5
"#;
    let file = write_flow(yaml);
    commands::run::run(file.path().to_str().unwrap(), false, 300)
        .await
        .unwrap();
}

#[tokio::test]
async fn validate_rejects_bad_graphs() {
    let yaml = r#"
name: "Broken Flow"
tasks:
  - name: a
    kind: simulate
    depends_on: [b]
  - name: b
    kind: simulate
    depends_on: [a]
"#;
    let file = write_flow(yaml);
    let err = commands::validate::run(file.path().to_str().unwrap())
        .await
        .unwrap_err();
    assert!(err.contains("cycle"));
}

#[tokio::test]
async fn validate_reports_missing_file() {
    assert!(commands::validate::run("does-not-exist.yaml").await.is_err());
}
