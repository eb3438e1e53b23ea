//! The `sample-migration` binary: exit codes and rendered output

mod common;

use std::io::Write;
use std::process::Output;

use common::{SampleFixture, mount_system};
use sample_migration_verifier::SourceFormat;
use tempfile::NamedTempFile;
use tokio::process::Command;
use wiremock::MockServer;

fn binary() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_sample-migration"));
    command.env_remove("RUST_LOG");
    command
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[tokio::test]
async fn test_help() {
    let output = binary().arg("--help").output().await.unwrap();

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Usage:"));
    assert!(text.contains("--inventory-only"));
    assert!(text.contains("--test-accession"));
}

#[tokio::test]
async fn test_missing_urls_is_a_configuration_error() {
    let output = binary().arg("--inventory-only").output().await.unwrap();

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Configuration Error"));
}

#[tokio::test]
async fn test_full_run_prints_json_summary() {
    let old_server = MockServer::start().await;
    let new_server = MockServer::start().await;
    mount_system(
        &old_server,
        SourceFormat::Xml,
        &[
            SampleFixture::new("SAMEA1").attribute("age", "10"),
            SampleFixture::new("SAMEA2").attribute("age", "20"),
            SampleFixture::new("SAMEA5"),
        ],
    )
    .await;
    mount_system(
        &new_server,
        SourceFormat::Json,
        &[
            SampleFixture::new("SAMEA1").attribute("age", "10"),
            SampleFixture::new("SAMEA2").attribute("age", "21"),
            SampleFixture::new("SAMEA3"),
        ],
    )
    .await;

    let mut ignore_list = NamedTempFile::new().unwrap();
    writeln!(ignore_list, "# retired during migration").unwrap();
    writeln!(ignore_list, "SAMEA5").unwrap();

    let output = binary()
        .args(["--old", &old_server.uri(), "--old-format", "xml"])
        .args(["--new", &new_server.uri(), "--new-format", "json"])
        .arg("--ignore-list")
        .arg(ignore_list.path())
        .args(["--format", "json", "--quiet"])
        .output()
        .await
        .unwrap();

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let summary: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(summary["mode"], "full");
    assert_eq!(summary["common"], 2);
    assert_eq!(summary["compared"], 2);
    assert_eq!(summary["identical"], 1);
    assert_eq!(summary["ignored"], 1);
    assert_eq!(summary["only_new"][0], "SAMEA3");
    assert_eq!(summary["discrepancies"][0]["accession"], "SAMEA2");
    assert_eq!(summary["discrepancies"][0]["key"], "age");
}

#[tokio::test]
async fn test_unreachable_system_exits_with_failure() {
    let new_server = MockServer::start().await;
    mount_system(&new_server, SourceFormat::Json, &[]).await;

    // Nothing listens on port 9 of localhost
    let output = binary()
        .args(["--old", "http://127.0.0.1:9", "--new", &new_server.uri()])
        .args(["--retry-attempts", "0", "--timeout", "2", "--format", "summary"])
        .output()
        .await
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).is_empty());
}
