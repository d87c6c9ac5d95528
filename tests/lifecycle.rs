use std::sync::Arc;
use std::time::Duration;

use runexternal::{
    CommandSpec, ControllerConfig, ProcessController, RetryPolicy, RunState, RunnerError,
};
use runexternal_test_utils::builders::RunnerConfigBuilder;
use runexternal_test_utils::recording_capture::{Hook, RecordingCapture};
use runexternal_test_utils::{init_tracing, with_timeout};

fn recording_controller(capture: &RecordingCapture, args: &[&str]) -> ProcessController {
    let mut controller = ProcessController::new(Arc::new(capture.clone()));
    controller.configure(ControllerConfig {
        command: CommandSpec::new(args.iter().copied()),
        join_streams: false,
        policy: RetryPolicy::new(2, 0),
    });
    controller
}

#[tokio::test]
async fn rejected_request_never_spawns_but_signals_finished() {
    init_tracing();
    let capture = RecordingCapture::rejecting("log directory is gone");
    let controller = recording_controller(&capture, &["echo", "hi"]);

    controller.start().unwrap();
    let res = with_timeout(controller.wait_finished(Some(Duration::from_secs(2)))).await;

    assert!(matches!(res, Err(RunnerError::NotStarted(_))));
    assert!(controller.is_finished());
    assert!(!controller.is_started());
    assert_eq!(controller.launch_attempts(), 0);
    assert!(matches!(
        controller.last_error(),
        Some(RunnerError::Configuration(msg)) if msg.contains("log directory")
    ));
    assert_eq!(
        capture.calls(),
        vec![Hook::Prepare(vec!["echo".to_string(), "hi".to_string()])]
    );
}

#[tokio::test]
async fn failed_launch_still_closes_capture() {
    init_tracing();
    let capture = RecordingCapture::new();
    let controller = recording_controller(&capture, &["/no/such/program-4b1e"]);

    controller.start().unwrap();
    with_timeout(controller.join()).await;

    assert_eq!(controller.launch_attempts(), 2);
    assert_eq!(controller.state(), RunState::Finished);
    assert!(matches!(controller.last_error(), Some(RunnerError::Launch { .. })));
    assert_eq!(capture.count(|h| matches!(h, Hook::Attach)), 0);
    assert_eq!(capture.calls().last(), Some(&Hook::Close));
}

#[cfg(unix)]
#[tokio::test]
async fn hooks_run_in_order_for_a_successful_launch() {
    init_tracing();
    let capture = RecordingCapture::new();
    let controller = recording_controller(&capture, &["true"]);

    controller.start().unwrap();
    let code = with_timeout(controller.wait_finished(None)).await.unwrap();
    with_timeout(controller.join()).await;

    assert_eq!(code, 0);
    assert_eq!(
        capture.calls(),
        vec![
            Hook::Prepare(vec!["true".to_string()]),
            Hook::Attach,
            Hook::Drain,
            Hook::Close,
        ]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn restart_exit_code_relaunches_until_it_differs() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("first-run-done");
    let script = format!(
        "if [ -f '{m}' ]; then exit 0; else touch '{m}'; sleep 0.2; exit 42; fi",
        m = marker.display()
    );
    let runner = RunnerConfigBuilder::shell_script(&script)
        .log_dir(dir.path())
        .restart_on(42)
        .build_runner();

    runner.start().unwrap();
    with_timeout(runner.join()).await;

    let controller = runner.controller();
    assert_eq!(controller.iterations(), 2);
    assert_eq!(controller.launch_attempts(), 2);
    assert_eq!(runner.exit_code().await.unwrap(), 0);
    assert!(runner.duration() >= Duration::from_millis(200));
    assert!(runner.last_error().is_none());
    assert!(marker.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn stop_breaks_an_endless_restart_loop() {
    init_tracing();
    let runner = RunnerConfigBuilder::shell_script("sleep 0.05; exit 42")
        .pipe()
        .restart_on(42)
        .build_runner();

    runner.start().unwrap();
    with_timeout(runner.wait_started(None)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    with_timeout(runner.stop()).await.unwrap();

    assert!(!runner.controller().is_in_flight());
    assert_eq!(runner.state(), RunState::Finished);
    let code = runner.exit_code().await.unwrap();
    assert!(code == 42 || code == 137, "unexpected exit code {code}");
}

#[cfg(unix)]
#[tokio::test]
async fn bounded_wait_times_out_on_a_slow_process() {
    init_tracing();
    let runner = RunnerConfigBuilder::new(["sleep", "30"]).pipe().build_runner();

    runner.start().unwrap();
    let res = runner.wait_finished(Some(Duration::from_millis(100))).await;
    match res {
        Err(RunnerError::Timeout { event, timeout }) => {
            assert_eq!(event, "Process finished");
            assert_eq!(timeout, Duration::from_millis(100));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(runner.is_running());

    with_timeout(runner.stop()).await.unwrap();
    assert!(runner.is_finished());
}

#[cfg(unix)]
#[tokio::test]
async fn instance_can_be_started_again_after_a_run() {
    init_tracing();
    let runner = RunnerConfigBuilder::shell_script("exit 5").pipe().build_runner();

    runner.start().unwrap();
    with_timeout(runner.join()).await;
    assert_eq!(runner.exit_code().await.unwrap(), 5);

    runner.start().unwrap();
    with_timeout(runner.join()).await;
    assert_eq!(runner.exit_code().await.unwrap(), 5);
    assert_eq!(runner.controller().iterations(), 1);
}

#[tokio::test(start_paused = true)]
async fn exit_code_without_a_run_gives_up_after_grace() {
    let controller = recording_controller(&RecordingCapture::new(), &["true"]);
    let started = tokio::time::Instant::now();

    let res = controller.exit_code().await;

    assert!(matches!(res, Err(RunnerError::ExitCodeUnavailable)));
    assert!(started.elapsed() >= runexternal::exec::EXIT_CODE_GRACE);
}

#[tokio::test]
async fn finished_always_leaves_an_exit_code_or_an_error() {
    init_tracing();
    for args in [vec!["true"], vec!["/no/such/program-e51a"]] {
        let controller = recording_controller(&RecordingCapture::new(), &args);
        controller.start().unwrap();
        let _ = with_timeout(controller.wait_finished(Some(Duration::from_secs(5)))).await;

        assert!(controller.is_finished());
        let has_code = controller.exit_code().await.is_ok();
        assert!(
            has_code || controller.last_error().is_some(),
            "{args:?} left neither an exit code nor an error"
        );
    }
}

#[cfg(unix)]
#[tokio::test]
async fn lifecycle_events_can_be_awaited_directly() {
    init_tracing();
    let runner = RunnerConfigBuilder::new(["true"]).pipe().build_runner();
    let controller = runner.controller();
    assert_eq!(controller.started_event().name(), "Process started");
    assert_eq!(controller.finished_event().name(), "Process finished");

    runner.start().unwrap();
    with_timeout(controller.started_event().wait()).await;
    with_timeout(controller.finished_event().wait()).await;

    assert!(controller.started_event().is_set());
    assert!(runner.is_finished());
}
