// src/exec/controller.rs

//! Process lifecycle controller.
//!
//! `start()` spawns one background Tokio task per run. That task alone owns
//! the `Child`, performs the exit wait, writes exit code / duration / state,
//! and signals the `started` / `finished` events. Callers only read
//! snapshots or block on the events.

use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::capture::OutputCapture;
use crate::errors::{Result, RunnerError};
use crate::event::SyncEvent;
use crate::exec::platform::Platform;
use crate::exec::request::LaunchRequest;
use crate::types::{CommandSpec, EXIT_CODE_UNSET, RetryPolicy, RunState};

/// How long `exit_code()` waits for a late exit code before giving up.
pub const EXIT_CODE_GRACE: Duration = Duration::from_secs(2);

/// Everything fixed for the duration of a run.
#[derive(Debug, Clone, Default)]
pub struct ControllerConfig {
    pub command: CommandSpec,
    pub join_streams: bool,
    pub policy: RetryPolicy,
}

#[derive(Debug)]
struct RunRecord {
    state: RunState,
    exit_code: i32,
    duration: Duration,
    last_error: Option<RunnerError>,
    launch_attempts: u32,
    iterations: u32,
    pid: Option<u32>,
}

impl Default for RunRecord {
    fn default() -> Self {
        Self {
            state: RunState::NotStarted,
            exit_code: EXIT_CODE_UNSET,
            duration: Duration::ZERO,
            last_error: None,
            launch_attempts: 0,
            iterations: 0,
            pid: None,
        }
    }
}

/// State shared between the controller handle and its background task.
#[derive(Debug)]
struct Shared {
    started: SyncEvent,
    finished: SyncEvent,
    /// Set once the background task has returned.
    done: SyncEvent,
    in_flight: AtomicBool,
    stop_tx: watch::Sender<bool>,
    record: Mutex<RunRecord>,
}

impl Shared {
    fn record(&self) -> MutexGuard<'_, RunRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail(&self, err: RunnerError) {
        self.record().last_error = Some(err);
    }
}

/// Signals `finished` and `done` however the background task exits.
struct CompletionGuard(Arc<Shared>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        {
            let mut rec = self.0.record();
            if rec.state.is_active() {
                rec.state = RunState::Finished;
            }
            rec.pid = None;
        }
        self.0.finished.signal();
        self.0.in_flight.store(false, Ordering::SeqCst);
        self.0.done.signal();
    }
}

/// How one run iteration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterationOutcome {
    /// Rejected before launch, nothing was spawned.
    Rejected,
    LaunchFailed,
    Interrupted,
    Exited(i32),
}

pub struct ProcessController {
    config: ControllerConfig,
    capture: Arc<dyn OutputCapture>,
    platform: Platform,
    shared: Arc<Shared>,
}

impl ProcessController {
    pub fn new(capture: Arc<dyn OutputCapture>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            config: ControllerConfig::default(),
            capture,
            platform: Platform::current(),
            shared: Arc::new(Shared {
                started: SyncEvent::new("Process started"),
                finished: SyncEvent::new("Process finished"),
                done: SyncEvent::new("Run complete"),
                in_flight: AtomicBool::new(false),
                stop_tx,
                record: Mutex::new(RunRecord::default()),
            }),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Replace the command and policy used by the next `start()`.
    ///
    /// A run already in flight keeps the configuration it started with.
    pub fn configure(&mut self, config: ControllerConfig) {
        self.config = config;
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn capture(&self) -> &Arc<dyn OutputCapture> {
        &self.capture
    }

    /// Spawn the background execution task and return immediately.
    ///
    /// Must be called from within a Tokio runtime. Fails if a previous run
    /// on this instance is still in flight.
    pub fn start(&self) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| RunnerError::config(format!("start() needs a Tokio runtime: {e}")))?;

        if self
            .shared
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RunnerError::config("a run is already in progress"));
        }

        self.shared.done.reset();
        self.shared.started.reset();
        self.shared.finished.reset();
        self.shared.stop_tx.send_replace(false);
        *self.shared.record() = RunRecord::default();

        info!(cmd = ?self.config.command.args, "starting run");

        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let capture = Arc::clone(&self.capture);
        let platform = self.platform;
        handle.spawn(async move {
            execute(shared, config, capture, platform).await;
        });

        Ok(())
    }

    /// Kill the current process, if any, and wait until the background task
    /// has observed its termination. Also cancels any pending restart.
    pub async fn stop(&self) -> Result<()> {
        if !self.shared.in_flight.load(Ordering::SeqCst) {
            debug!("stop requested but no run is in flight");
            return Ok(());
        }
        info!(pid = ?self.pid(), "stop requested");
        self.shared.stop_tx.send_replace(true);
        self.shared.done.wait().await;
        Ok(())
    }

    /// Wait for the whole run, including restart iterations, to complete.
    pub async fn join(&self) {
        if self.shared.in_flight.load(Ordering::SeqCst) {
            self.shared.done.wait().await;
        }
    }

    /// True from `start()` until the background task has returned.
    pub fn is_in_flight(&self) -> bool {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    pub async fn wait_started(&self, timeout: Option<Duration>) -> Result<()> {
        self.shared.started.wait_for(timeout).await
    }

    /// Wait for the current iteration to finish and return its exit code.
    ///
    /// Fails with `NotStarted` if the process never launched.
    pub async fn wait_finished(&self, timeout: Option<Duration>) -> Result<i32> {
        self.shared.finished.wait_for(timeout).await?;
        if !self.shared.started.is_set() {
            let cmd = self.config.command.program().unwrap_or("null");
            return Err(RunnerError::NotStarted(format!(
                "was not able to start process successfully: {cmd}"
            )));
        }
        self.exit_code().await
    }

    pub fn is_started(&self) -> bool {
        self.shared.started.is_set()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.finished.is_set()
    }

    pub fn is_running(&self) -> bool {
        self.is_started() && !self.is_finished()
    }

    pub fn state(&self) -> RunState {
        self.shared.record().state
    }

    /// The last recorded exit code.
    ///
    /// If none has been recorded yet, waits up to [`EXIT_CODE_GRACE`] for the
    /// current iteration to finish and checks once more.
    pub async fn exit_code(&self) -> Result<i32> {
        if let Some(code) = self.recorded_exit_code() {
            return Ok(code);
        }
        warn!("exit code requested before it was recorded; waiting before checking again");
        let _ = self.shared.finished.wait_timeout(EXIT_CODE_GRACE).await;
        self.recorded_exit_code()
            .ok_or(RunnerError::ExitCodeUnavailable)
    }

    fn recorded_exit_code(&self) -> Option<i32> {
        let code = self.shared.record().exit_code;
        (code != EXIT_CODE_UNSET).then_some(code)
    }

    pub fn last_error(&self) -> Option<RunnerError> {
        self.shared.record().last_error.clone()
    }

    /// Wall-clock time spent running the process, summed over restart
    /// iterations.
    pub fn duration(&self) -> Duration {
        self.shared.record().duration
    }

    /// Process creation attempts made during this run, across iterations.
    pub fn launch_attempts(&self) -> u32 {
        self.shared.record().launch_attempts
    }

    /// Iterations begun during this run (1 + number of restarts).
    pub fn iterations(&self) -> u32 {
        self.shared.record().iterations
    }

    pub fn pid(&self) -> Option<u32> {
        self.shared.record().pid
    }

    pub fn started_event(&self) -> &SyncEvent {
        &self.shared.started
    }

    pub fn finished_event(&self) -> &SyncEvent {
        &self.shared.finished
    }
}

/// Body of the background execution task.
async fn execute(
    shared: Arc<Shared>,
    config: ControllerConfig,
    capture: Arc<dyn OutputCapture>,
    platform: Platform,
) {
    let _guard = CompletionGuard(Arc::clone(&shared));
    let mut stop_rx = shared.stop_tx.subscribe();
    let policy = config.policy;

    loop {
        let outcome = run_iteration(&shared, &config, capture.as_ref(), platform, &mut stop_rx).await;

        let restart = match outcome {
            IterationOutcome::Exited(code) => policy.should_restart(code) && !*stop_rx.borrow(),
            _ => false,
        };
        if !restart {
            debug!(?outcome, "run complete");
            break;
        }

        info!(
            cmd = ?config.command.program(),
            restart_exit_code = policy.restart_exit_code(),
            elapsed_ms = shared.record().duration.as_millis() as u64,
            "restarting"
        );
        shared.record().state = RunState::NotStarted;
    }
}

async fn run_iteration(
    shared: &Shared,
    config: &ControllerConfig,
    capture: &dyn OutputCapture,
    platform: Platform,
    stop_rx: &mut watch::Receiver<bool>,
) -> IterationOutcome {
    shared.started.reset();
    shared.finished.reset();
    {
        let mut rec = shared.record();
        rec.exit_code = EXIT_CODE_UNSET;
        rec.state = RunState::Starting;
        rec.iterations += 1;
    }

    let prepared = LaunchRequest::build(&config.command, config.join_streams, platform)
        .and_then(|request| {
            let stdio = capture.prepare(&request)?;
            let cmd = request.command(stdio)?;
            Ok((request, cmd))
        });
    let (request, mut cmd) = match prepared {
        Ok(v) => v,
        Err(err) => {
            error!(error = %err, "failed to configure process launch");
            shared.fail(err);
            finish_iteration(shared, None);
            return IterationOutcome::Rejected;
        }
    };

    debug!(cmd = ?request.argv, "starting process");
    trace!(cwd = ?request.cwd, env = ?request.env, "process environment");

    let (mut child, started_at) = match launch(shared, &request, &mut cmd, config.policy) {
        Ok(v) => v,
        Err(err) => {
            error!(cmd = %request.program(), "could not fork process, ran out of retries");
            shared.fail(err);
            capture.close();
            finish_iteration(shared, None);
            return IterationOutcome::LaunchFailed;
        }
    };

    // Release our copies of the child's stdio so shared pipes reach EOF
    // when the child exits.
    drop(cmd);
    capture.attach(&mut child);
    {
        let mut rec = shared.record();
        rec.pid = child.id();
        rec.state = RunState::Running;
    }
    shared.started.signal();
    debug!(pid = ?child.id(), "process started");

    let waited = tokio::select! {
        status = child.wait() => status,
        () = stop_requested(stop_rx) => {
            info!(pid = ?child.id(), "killing process");
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "failed to signal process termination");
            }
            child.wait().await
        }
    };
    let elapsed = started_at.elapsed();

    let outcome = match waited {
        Ok(status) => {
            let code = exit_code_of(status);
            shared.record().exit_code = code;
            debug!(exit_code = code, "process returned exit value");
            capture.drain().await;
            debug!("streams drained, closing");
            IterationOutcome::Exited(code)
        }
        Err(e) => {
            error!(error = %e, "error while waiting for process exit");
            shared.fail(RunnerError::WaitInterrupted {
                source: Arc::new(e),
            });
            IterationOutcome::Interrupted
        }
    };

    capture.close();
    finish_iteration(shared, Some(elapsed));
    info!(
        cmd = ?request.argv,
        exit_code = shared.record().exit_code,
        "finished executing"
    );
    outcome
}

/// Resolves once `stop()` has been requested.
async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    if stop_rx.wait_for(|stop| *stop).await.is_err() {
        // Sender gone: nobody can ask for a stop any more.
        std::future::pending::<()>().await;
    }
}

/// Try to spawn up to `policy.fork_retries()` times.
///
/// Returns the child and the instant its successful attempt began, so time
/// lost on failed attempts is not counted towards the run's duration.
fn launch(
    shared: &Shared,
    request: &LaunchRequest,
    cmd: &mut tokio::process::Command,
    policy: RetryPolicy,
) -> Result<(Child, Instant)> {
    let retries = policy.fork_retries();
    let mut last_err = None;

    for attempt in 1..=retries {
        shared.record().launch_attempts += 1;
        let attempt_started = Instant::now();
        match cmd.spawn() {
            Ok(child) => return Ok((child, attempt_started)),
            Err(e) => {
                error!(
                    cmd = %request.program(),
                    attempt,
                    error = %e,
                    "could not fork process"
                );
                last_err = Some(e);
            }
        }
    }

    Err(RunnerError::Launch {
        program: request.program().to_string(),
        attempts: retries,
        source: Arc::new(
            last_err.unwrap_or_else(|| std::io::Error::other("no fork attempt was made")),
        ),
    })
}

fn finish_iteration(shared: &Shared, elapsed: Option<Duration>) {
    {
        let mut rec = shared.record();
        if let Some(elapsed) = elapsed {
            rec.duration += elapsed;
        }
        rec.pid = None;
        rec.state = RunState::Finished;
    }
    shared.finished.signal();
}

/// Exit code of a finished child. On Unix a signal-terminated child maps to
/// `128 + signal`, the shell convention.
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    EXIT_CODE_UNSET
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PipeCapture;

    fn controller(args: &[&str], policy: RetryPolicy) -> ProcessController {
        let mut c = ProcessController::new(Arc::new(PipeCapture::new()));
        c.configure(ControllerConfig {
            command: CommandSpec::new(args.iter().copied()),
            join_streams: false,
            policy,
        });
        c
    }

    #[test]
    fn fresh_controller_is_not_started() {
        let c = controller(&["true"], RetryPolicy::default());
        assert_eq!(c.state(), RunState::NotStarted);
        assert!(!c.is_started());
        assert!(!c.is_finished());
        assert!(!c.is_running());
        assert_eq!(c.duration(), Duration::ZERO);
        assert!(c.last_error().is_none());
    }

    #[test]
    fn start_outside_runtime_is_rejected() {
        let c = controller(&["true"], RetryPolicy::default());
        assert!(matches!(c.start(), Err(RunnerError::Configuration(_))));
    }

    #[tokio::test]
    async fn wait_finished_before_start_times_out() {
        let c = controller(&["true"], RetryPolicy::default());
        let err = c
            .wait_finished(Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Timeout { .. }));
    }

    #[tokio::test]
    async fn stop_without_a_run_returns_immediately() {
        let c = controller(&["true"], RetryPolicy::default());
        c.stop().await.unwrap();
        c.join().await;
    }

    #[tokio::test]
    async fn nonexistent_executable_uses_every_fork_retry() {
        let c = controller(
            &["/definitely/not/a/real/executable-7f3a"],
            RetryPolicy::new(3, 0),
        );
        c.start().unwrap();
        c.join().await;

        assert_eq!(c.launch_attempts(), 3);
        assert!(c.is_finished());
        assert!(!c.is_started());
        match c.last_error() {
            Some(RunnerError::Launch { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected Launch error, got {other:?}"),
        }
        assert!(matches!(
            c.wait_finished(Some(Duration::from_secs(1))).await,
            Err(RunnerError::NotStarted(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_code_is_recorded() {
        let c = controller(&["sh", "-c", "exit 3"], RetryPolicy::default());
        c.start().unwrap();
        let code = c.wait_finished(Some(Duration::from_secs(10))).await.unwrap();
        assert_eq!(code, 3);
        c.join().await;
        assert_eq!(c.exit_code().await.unwrap(), 3);
        assert_eq!(c.state(), RunState::Finished);
        assert_eq!(c.iterations(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn second_start_while_in_flight_is_rejected() {
        let c = controller(&["sleep", "5"], RetryPolicy::default());
        c.start().unwrap();
        assert!(matches!(c.start(), Err(RunnerError::Configuration(_))));
        c.stop().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_kills_and_signals_finished() {
        let c = controller(&["sleep", "30"], RetryPolicy::new(1, 137));
        c.start().unwrap();
        c.wait_started(Some(Duration::from_secs(10))).await.unwrap();
        assert!(c.is_running());
        assert!(c.pid().is_some());

        c.stop().await.unwrap();

        assert!(c.is_finished());
        assert!(!c.is_running());
        // SIGKILL is 128 + 9; it matches the restart code but stop wins.
        assert_eq!(c.exit_code().await.unwrap(), 137);
        assert_eq!(c.iterations(), 1);
    }
}
