//! End-to-end tests for the session runner and the backup flow
//!
//! Every test drives real child processes through `sh` stand-ins for `ssh`.

use std::fs;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use hosting_utilities::{
    build_provider, BackupOptions, BackupService, Error, ErrorKind, VaultSelection,
};
use integration_tests::*;
use session_runner::{
    run_interactive, run_redirected, CommandLine, ExitOutcome, Failure, Prompt, FAILURE_EXIT_CODE,
};

fn march_7() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 7).expect("valid date")
}

async fn service_for(bench: &Workbench, ssh: &std::path::Path, site: &str) -> BackupService {
    let config = bench.config(ssh);
    let provider = build_provider(&config, site, &VaultSelection::default())
        .await
        .expect("Failed to build env-file provider");
    BackupService::new(provider, BackupOptions::from(&config))
}

// ============================================================================
// Session Runner Tests
// ============================================================================

#[tokio::test]
async fn test_runner_answers_ssh_style_prompt() {
    let bench = Workbench::new().expect("Failed to create workbench");
    let ssh = bench.prompting_ssh().expect("Failed to write stand-in");
    let command = CommandLine::new(ssh.display().to_string())
        .arg("-p")
        .arg("22")
        .arg("deploy@www.example.org")
        .arg("true");

    let prompt = Prompt::pattern("deploy@www\\.example\\.org's password: *").expect("valid pattern");
    let mut out = Vec::new();
    let outcome = run_interactive(
        &command,
        &prompt,
        PASSWORD.as_bytes(),
        Some(&mut out),
        Duration::from_secs(10),
    )
    .await;

    assert_eq!(outcome, ExitOutcome::Exited(0));
    assert_eq!(gunzip_bytes(&out), PAYLOAD);
}

#[tokio::test]
async fn test_runner_reports_rejected_password() {
    let bench = Workbench::new().expect("Failed to create workbench");
    let ssh = bench.prompting_ssh().expect("Failed to write stand-in");
    let command = CommandLine::new(ssh.display().to_string()).args(["-p", "22", "u@h", "true"]);

    let mut out = Vec::new();
    let started = Instant::now();
    let outcome = tokio::time::timeout(
        Duration::from_secs(20),
        run_interactive(
            &command,
            &Prompt::literal("u@h's password:"),
            b"nope",
            Some(&mut out),
            Duration::from_secs(2),
        ),
    )
    .await
    .expect("Runner did not return after the password was rejected");

    assert_eq!(outcome, ExitOutcome::Failed(Failure::PromptRepeated));
    assert!(started.elapsed() < Duration::from_secs(10));
    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("Permission denied"), "output was {:?}", text);
    assert!(!text.contains("nope"));
}

#[tokio::test]
async fn test_runner_timeout_is_bounded() {
    let bench = Workbench::new().expect("Failed to create workbench");
    let stuck = bench
        .script("stuck", "printf 'connecting'\nsleep 60")
        .expect("Failed to write stand-in");

    let started = Instant::now();
    let mut out = Vec::new();
    let outcome = run_interactive(
        &CommandLine::new(stuck.display().to_string()),
        &Prompt::literal("password:"),
        b"secret",
        Some(&mut out),
        Duration::from_millis(500),
    )
    .await;

    assert_eq!(outcome, ExitOutcome::Failed(Failure::TimedOut));
    assert_eq!(outcome.code(), FAILURE_EXIT_CODE);
    assert_eq!(out, b"connecting");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_redirected_run_writes_stdout_to_file() {
    let bench = Workbench::new().expect("Failed to create workbench");
    let ssh = bench.key_ssh().expect("Failed to write stand-in");
    let target = bench.dir.path().join("out.gz");
    let file = fs::File::create(&target).expect("Failed to create target");

    let outcome = run_redirected(
        &CommandLine::new(ssh.display().to_string()),
        file,
        Duration::ZERO,
    )
    .await;

    assert!(outcome.success());
    assert_eq!(gunzip(&target).expect("valid gzip"), PAYLOAD);
}

// ============================================================================
// Backup Tests
// ============================================================================

#[tokio::test]
async fn test_backup_with_password() {
    let bench = Workbench::new().expect("Failed to create workbench");
    let ssh = bench.prompting_ssh().expect("Failed to write stand-in");
    bench.site_env("blog", PASSWORD).expect("Failed to write env file");

    let service = service_for(&bench, &ssh, "blog").await;
    let published = service
        .run_backup_on("blog", march_7())
        .await
        .expect("Backup failed");

    assert_eq!(published, bench.dest.join("blog").join("03-07-24.tar.gz"));
    assert_eq!(gunzip(&published).expect("valid gzip"), PAYLOAD);
    assert_eq!(
        list_dir(&bench.dest.join("blog")).expect("listable"),
        vec!["03-07-24.tar.gz".to_string()]
    );
}

#[tokio::test]
async fn test_backup_with_key_auth() {
    let bench = Workbench::new().expect("Failed to create workbench");
    let ssh = bench.key_ssh().expect("Failed to write stand-in");
    bench.site_env("shop", "").expect("Failed to write env file");

    let service = service_for(&bench, &ssh, "shop").await;
    let published = service
        .run_backup_on("shop", march_7())
        .await
        .expect("Backup failed");

    assert_eq!(gunzip(&published).expect("valid gzip"), PAYLOAD);
}

#[tokio::test]
async fn test_backup_with_wrong_password_leaves_nothing() {
    let bench = Workbench::new().expect("Failed to create workbench");
    let ssh = bench.prompting_ssh().expect("Failed to write stand-in");
    bench.site_env("blog", "guess").expect("Failed to write env file");

    let service = service_for(&bench, &ssh, "blog").await;
    let err = tokio::time::timeout(Duration::from_secs(30), service.run_backup_on("blog", march_7()))
        .await
        .expect("Backup did not return after the password was rejected")
        .expect_err("Backup should fail");

    assert_eq!(err.kind(), ErrorKind::RemoteExecution);
    assert_eq!(err.code(), 3001);
    assert!(list_dir(&bench.dest.join("blog")).expect("listable").is_empty());
}

#[tokio::test]
async fn test_backup_of_corrupt_stream_is_rejected() {
    let bench = Workbench::new().expect("Failed to create workbench");
    let ssh = bench
        .script("ssh-truncated", r#"head -c 30 "$ARCHIVE""#)
        .expect("Failed to write stand-in");
    bench.site_env("blog", "").expect("Failed to write env file");

    let service = service_for(&bench, &ssh, "blog").await;
    let err = service
        .run_backup_on("blog", march_7())
        .await
        .expect_err("Backup should fail");

    assert!(matches!(err, Error::IntegrityCheckFailed(_)));
    assert!(list_dir(&bench.dest.join("blog")).expect("listable").is_empty());
}

#[tokio::test]
async fn test_backup_rerun_same_day_replaces_archive() {
    let bench = Workbench::new().expect("Failed to create workbench");
    let ssh = bench.key_ssh().expect("Failed to write stand-in");
    bench.site_env("blog", "").expect("Failed to write env file");

    for _ in 0..2 {
        let service = service_for(&bench, &ssh, "blog").await;
        service
            .run_backup_on("blog", march_7())
            .await
            .expect("Backup failed");
    }

    assert_eq!(
        list_dir(&bench.dest.join("blog")).expect("listable"),
        vec!["03-07-24.tar.gz".to_string()]
    );
}

#[tokio::test]
async fn test_backup_without_env_file_reports_missing_fields() {
    let bench = Workbench::new().expect("Failed to create workbench");
    let ssh = bench.key_ssh().expect("Failed to write stand-in");

    let service = service_for(&bench, &ssh, "unconfigured-site").await;
    let err = service
        .run_backup_on("unconfigured-site", march_7())
        .await
        .expect_err("Backup should fail");

    assert_eq!(err.kind(), ErrorKind::Configuration);
}

// ============================================================================
// Helpers
// ============================================================================

fn gunzip_bytes(data: &[u8]) -> Vec<u8> {
    use std::io::Read;
    let mut out = Vec::new();
    flate2::read::GzDecoder::new(data)
        .read_to_end(&mut out)
        .expect("Failed to decode gzip");
    out
}
