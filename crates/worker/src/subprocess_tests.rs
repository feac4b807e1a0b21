use super::*;
use oj_core::kind::NotebookParams;
use std::collections::HashMap;
use tempfile::tempdir;

fn notebook_params() -> JobParams {
    JobParams::Notebook(NotebookParams { template: "default".into(), extract_code: false })
}

#[tokio::test]
async fn successful_invocation_returns_output_bytes() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.src");
    let output = dir.path().join("out.html");
    tokio::fs::write(&input, b"hello").await.unwrap();

    let mut commands = HashMap::new();
    commands.insert(JobKind::Notebook, vec!["cp".to_string()]);
    let converter = SubprocessConverter::new(commands);

    let outcome = converter.convert(&input, &output, &notebook_params(), ProgressReporter::new()).await.unwrap();
    assert_eq!(outcome.payload, b"hello");
}

#[tokio::test]
async fn missing_executable_is_tool_missing() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.src");
    let output = dir.path().join("out.html");
    tokio::fs::write(&input, b"hello").await.unwrap();

    let mut commands = HashMap::new();
    commands.insert(JobKind::Notebook, vec!["definitely-not-a-real-binary-xyz".to_string()]);
    let converter = SubprocessConverter::new(commands);

    let err = converter.convert(&input, &output, &notebook_params(), ProgressReporter::new()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ToolMissing);
    assert!(!err.is_transient);
}

#[tokio::test]
async fn unconfigured_kind_is_tool_missing() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.src");
    let output = dir.path().join("out.html");
    tokio::fs::write(&input, b"hello").await.unwrap();

    let converter = SubprocessConverter::new(HashMap::new());
    let err = converter.convert(&input, &output, &notebook_params(), ProgressReporter::new()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ToolMissing);
}

#[tokio::test]
async fn cancellation_flag_aborts_before_completion() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.src");
    let output = dir.path().join("out.html");
    tokio::fs::write(&input, b"hello").await.unwrap();

    // "sleep 5" never finishes before the progress flag is checked; simulate
    // an already-cancelled job by pre-marking the reporter.
    let mut commands = HashMap::new();
    commands.insert(JobKind::Notebook, vec!["sleep".to_string(), "5".to_string()]);
    let converter = SubprocessConverter::new(commands);
    let progress = ProgressReporter::new();
    progress.mark_cancelled();

    let err = converter.convert(&input, &output, &notebook_params(), progress).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cancelled);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_escalates_to_a_kill_if_the_subprocess_ignores_the_term_signal() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.src");
    let output = dir.path().join("out.html");
    tokio::fs::write(&input, b"hello").await.unwrap();

    // Ignores SIGTERM, so the 2s grace window must elapse and the kill
    // escalation (SIGKILL via `start_kill`) must be what actually ends it.
    let mut commands = HashMap::new();
    commands.insert(
        JobKind::Notebook,
        vec!["sh".to_string(), "-c".to_string(), "trap '' TERM; sleep 10".to_string()],
    );
    let converter = SubprocessConverter::new(commands);
    let progress = ProgressReporter::new();
    progress.mark_cancelled();

    let started = std::time::Instant::now();
    let err = converter.convert(&input, &output, &notebook_params(), progress).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cancelled);
    assert!(
        started.elapsed() < Duration::from_secs(9),
        "kill escalation after the 2s grace window must end the subprocess well before its own 10s sleep would"
    );
}
