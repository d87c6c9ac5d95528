#![cfg(unix)]

use std::time::Duration;

use runexternal::RunnerError;
use runexternal_test_utils::builders::RunnerConfigBuilder;
use runexternal_test_utils::{init_tracing, with_timeout};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const START: Option<Duration> = Some(Duration::from_secs(5));

#[tokio::test]
async fn command_output_collects_stdout_lines() {
    init_tracing();
    let runner = RunnerConfigBuilder::new(["printf", "a\\nb\\n"]).pipe().build_runner();

    runner.start().unwrap();
    let lines = with_timeout(runner.command_output(START)).await.unwrap();

    assert_eq!(lines, vec!["a", "b"]);
    assert_eq!(with_timeout(runner.wait_finished(None)).await.unwrap(), 0);
}

#[tokio::test]
async fn separate_stderr_pipe() {
    init_tracing();
    let runner = RunnerConfigBuilder::shell_script("echo out; echo err >&2").pipe().build_runner();

    runner.start().unwrap();
    let mut stderr = with_timeout(runner.take_stderr(START)).await.unwrap();
    let stdout = with_timeout(runner.command_output(START)).await.unwrap();
    let mut err = String::new();
    with_timeout(stderr.read_to_string(&mut err)).await.unwrap();

    assert_eq!(stdout, vec!["out"]);
    assert_eq!(err, "err\n");
}

#[tokio::test]
async fn joined_pipe_merges_stderr_into_stdout() {
    init_tracing();
    let runner = RunnerConfigBuilder::shell_script("echo out; echo err >&2")
        .pipe()
        .join_streams()
        .build_runner();

    runner.start().unwrap();
    assert!(matches!(
        runner.take_stderr(START).await,
        Err(RunnerError::Configuration(_))
    ));
    let lines = with_timeout(runner.command_output(START)).await.unwrap();

    assert_eq!(lines, vec!["out", "err"]);
}

#[tokio::test]
async fn joined_pipe_keeps_the_child_write_order() {
    init_tracing();
    let runner = RunnerConfigBuilder::shell_script("echo o1; echo e1 >&2; echo o2; echo e2 >&2; echo o3")
        .pipe()
        .join_streams()
        .build_runner();

    for _ in 0..20 {
        runner.start().unwrap();
        let lines = with_timeout(runner.command_output(START)).await.unwrap();
        with_timeout(runner.join()).await;
        assert_eq!(lines, vec!["o1", "e1", "o2", "e2", "o3"]);
    }
}

#[tokio::test]
async fn stdin_is_forwarded_to_the_child() {
    init_tracing();
    let runner = RunnerConfigBuilder::new(["cat"]).pipe().build_runner();

    runner.start().unwrap();
    let mut stdin = with_timeout(runner.take_stdin(START)).await.unwrap();
    stdin.write_all(b"hello\nworld\n").await.unwrap();
    drop(stdin);

    let lines = with_timeout(runner.command_output(START)).await.unwrap();
    assert_eq!(lines, vec!["hello", "world"]);
    assert_eq!(with_timeout(runner.wait_finished(None)).await.unwrap(), 0);
}

#[tokio::test]
async fn untaken_stdin_is_closed_when_the_run_ends() {
    init_tracing();
    let runner = RunnerConfigBuilder::new(["echo", "done"]).pipe().build_runner();

    runner.start().unwrap();
    with_timeout(runner.join()).await;

    assert!(matches!(
        runner.take_stdin(START).await,
        Err(RunnerError::AlreadyFinished)
    ));
}

#[tokio::test]
async fn output_stays_readable_after_exit_but_only_once() {
    init_tracing();
    let runner = RunnerConfigBuilder::new(["echo", "late reader"]).pipe().build_runner();

    runner.start().unwrap();
    with_timeout(runner.join()).await;

    let lines = with_timeout(runner.command_output(START)).await.unwrap();
    assert_eq!(lines, vec!["late reader"]);
    assert!(matches!(
        runner.take_stdout(START).await,
        Err(RunnerError::AlreadyFinished)
    ));
}

#[tokio::test]
async fn pipe_accessor_times_out_when_launch_fails() {
    init_tracing();
    let runner = RunnerConfigBuilder::new(["/no/such/program-91c2"])
        .pipe()
        .fork_retries(3)
        .build_runner();

    runner.start().unwrap();
    let res = runner.take_stdout(Some(Duration::from_millis(200))).await;

    assert!(matches!(res, Err(RunnerError::Timeout { .. })));
    with_timeout(runner.join()).await;
    assert!(matches!(runner.last_error(), Some(RunnerError::Launch { attempts: 3, .. })));
    assert_eq!(runner.controller().launch_attempts(), 3);
}
