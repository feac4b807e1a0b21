use super::*;

#[tokio::test]
async fn is_alive_false_for_unknown_pid() {
    let launcher = DirectLauncher::new();
    // PID 1 is typically alive (init), but a deliberately implausible huge
    // pid should never resolve to a live process.
    assert!(!launcher.is_alive("999999999").await);
}

#[tokio::test]
async fn is_alive_false_for_garbage_handle() {
    let launcher = DirectLauncher::new();
    assert!(!launcher.is_alive("not-a-pid").await);
}

#[tokio::test]
async fn terminate_unknown_handle_errors() {
    let launcher = DirectLauncher::new();
    let err = launcher.terminate("1234").await.unwrap_err();
    assert!(matches!(err, WorkerError::HandleNotFound(_)));
}
