// src/lib.rs

pub mod capture;
pub mod cli;
pub mod config;
pub mod errors;
pub mod event;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod runner;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info, warn};

pub use crate::capture::{FileCapture, OutputCapture, PipeCapture, StdioSet};
pub use crate::errors::RunnerError;
pub use crate::event::SyncEvent;
pub use crate::exec::{ControllerConfig, LaunchRequest, ProcessController};
pub use crate::runner::{Runner, RunnerConfig};
pub use crate::types::{CommandSpec, LogFilePair, RetryPolicy, RunState, StreamMode};

use crate::cli::CliArgs;
use crate::config::{RawRunFile, RunFile, load_from_path};

/// How often the pipe relay checks for the next iteration's streams.
const RELAY_POLL: Duration = Duration::from_millis(100);

/// How long to let the relay flush output after the run is over.
const RELAY_GRACE: Duration = Duration::from_secs(5);

/// High-level entry point used by `main.rs`.
///
/// Resolves the run from `--config` plus flags, runs the command to
/// completion (or until the timeout / Ctrl-C stops it) and returns the
/// child's exit code.
pub async fn run(args: CliArgs) -> Result<i32> {
    let mut raw = match &args.config {
        Some(path) => load_from_path(path)?,
        None => RawRunFile::default(),
    };
    args.apply_to(&mut raw);
    let run_file = RunFile::try_from(raw).context("invalid run configuration")?;

    if args.dry_run {
        print_dry_run(&run_file);
        return Ok(0);
    }

    let timeout = run_file.timeout;
    let runner = Arc::new(Runner::new(run_file.into_runner_config())?);
    runner.start()?;

    let relay = (runner.mode() == StreamMode::Pipe)
        .then(|| tokio::spawn(relay_output(Arc::clone(&runner))));

    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        res = wait_run(&runner, timeout) => res?,
        () = interrupted => {
            warn!("interrupted; stopping command");
            runner.stop().await?;
        }
    }
    runner.join().await;

    if let Some(handle) = relay {
        if tokio::time::timeout(RELAY_GRACE, handle).await.is_err() {
            warn!("output relay still busy after the run ended; dropping it");
        }
    }

    let code = match runner.exit_code().await {
        Ok(code) => code,
        Err(e) => return Err(runner.last_error().unwrap_or(e).into()),
    };

    info!(
        exit_code = code,
        iterations = runner.controller().iterations(),
        duration_ms = runner.duration().as_millis() as u64,
        "run complete"
    );

    if runner.mode() == StreamMode::File {
        report_logs(&runner, args.delete_logs);
    } else if args.delete_logs {
        warn!("--delete-logs has no effect with --pipe");
    }

    Ok(code)
}

/// Wait for the whole run; stop it if `timeout` elapses first.
async fn wait_run(runner: &Runner, timeout: Option<Duration>) -> Result<()> {
    match timeout {
        None => runner.join().await,
        Some(limit) => {
            if tokio::time::timeout(limit, runner.join()).await.is_err() {
                warn!(timeout = ?limit, "run exceeded timeout; stopping command");
                runner.stop().await?;
            }
        }
    }
    Ok(())
}

fn report_logs(runner: &Runner, delete: bool) {
    let Ok(files) = runner.log_files() else {
        return;
    };
    if !delete {
        info!(
            stdout = ?files.stdout,
            stderr = ?files.stderr_or_stdout(),
            "output recorded"
        );
        return;
    }
    match runner.delete_logs() {
        Ok(true) => debug!("log files deleted"),
        Ok(false) => warn!(stdout = ?files.stdout, "some log files could not be deleted"),
        Err(e) => warn!(error = %e, "not deleting log files"),
    }
}

/// Forward the child's live output to our own stdout/stderr, for every
/// iteration of the run.
async fn relay_output(runner: Arc<Runner>) {
    loop {
        let done = !runner.controller().is_in_flight();
        match runner.take_stdout(Some(RELAY_POLL)).await {
            Ok(stdout) => {
                // Nothing to feed the child; let it see EOF.
                drop(runner.take_stdin(Some(Duration::ZERO)).await);
                let stderr = if runner.is_joined() {
                    None
                } else {
                    runner.take_stderr(Some(Duration::ZERO)).await.ok()
                };
                tokio::join!(copy_lines(stdout, false), async {
                    if let Some(err) = stderr {
                        copy_lines(err, true).await;
                    }
                });
            }
            Err(RunnerError::Timeout { .. }) if !done => {}
            Err(RunnerError::AlreadyFinished) if !done => tokio::time::sleep(RELAY_POLL).await,
            Err(_) => return,
        }
    }
}

async fn copy_lines<R: AsyncRead + Unpin>(reader: R, to_stderr: bool) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if to_stderr => eprintln!("{line}"),
            Ok(Some(line)) => println!("{line}"),
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "failed reading child output");
                return;
            }
        }
    }
}

/// Simple dry-run output: print the resolved run.
fn print_dry_run(run: &RunFile) {
    let cfg = &run.runner;
    println!("runexternal dry-run");
    println!("  command: {:?}", cfg.command.args);
    if let Some(cwd) = &cfg.command.cwd {
        println!("  cwd: {}", cwd.display());
    }
    if cfg.command.shell {
        println!("  shell: true");
    }
    for (key, value) in &cfg.command.env {
        println!("  env: {key}={value}");
    }
    println!("  join_streams: {}", cfg.join_streams);
    println!("  fork_retries: {}", cfg.policy.fork_retries());
    if cfg.policy.restart_exit_code() != 0 {
        println!("  restart_exit_code: {}", cfg.policy.restart_exit_code());
    }
    match cfg.mode {
        StreamMode::File => {
            if let Some(dir) = &cfg.log_dir {
                println!("  output: files in {}", dir.display());
            }
            if let Some(prefix) = &cfg.log_prefix {
                println!("  prefix: {prefix}");
            }
        }
        StreamMode::Pipe => println!("  output: live pipes"),
    }
    if let Some(timeout) = run.timeout {
        println!("  timeout: {timeout:?}");
    }

    debug!("dry-run complete (no execution)");
}
