// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{RawRunFile, RunFile};
use crate::errors::RunnerError;
use crate::runner::RunnerConfig;
use crate::types::{CommandSpec, RetryPolicy, StreamMode};

/// Semantic checks on a raw run file:
///
/// - exactly one of `command.args` / `command.line` is given
/// - the command is not empty
/// - file mode has an `output.log_dir`
/// - `wait.timeout`, if present, parses
impl TryFrom<RawRunFile> for RunFile {
    type Error = RunnerError;

    fn try_from(raw: RawRunFile) -> Result<Self, Self::Error> {
        let cmd = raw.command;
        let mut spec = match (cmd.args, cmd.line) {
            (Some(_), Some(_)) => {
                return Err(RunnerError::config(
                    "[command] takes either `args` or `line`, not both",
                ));
            }
            (Some(args), None) => CommandSpec::new(args),
            (None, Some(line)) => CommandSpec::parse(&line),
            (None, None) => {
                return Err(RunnerError::config(
                    "no command given; set [command].args or pass one after `--`",
                ));
            }
        };
        if spec.program().is_none_or(str::is_empty) {
            return Err(RunnerError::config("command must not be empty"));
        }

        spec = spec.envs(cmd.env).shell(cmd.shell);
        if let Some(cwd) = cmd.cwd {
            spec = spec.cwd(cwd);
        }

        let output = raw.output;
        if output.mode == StreamMode::File && output.log_dir.is_none() {
            return Err(RunnerError::config(
                "file output requires [output].log_dir (or --log-dir)",
            ));
        }

        let timeout = raw
            .wait
            .timeout
            .as_deref()
            .map(parse_duration)
            .transpose()
            .map_err(|e| RunnerError::config(format!("invalid [wait].timeout: {e}")))?;

        Ok(RunFile {
            runner: RunnerConfig {
                command: spec,
                join_streams: cmd.join_streams,
                policy: RetryPolicy::new(raw.policy.fork_retries, raw.policy.restart_exit_code),
                mode: output.mode,
                log_dir: output.log_dir,
                log_prefix: output.prefix.filter(|p| !p.is_empty()),
            },
            timeout,
        })
    }
}

/// Parse `<digits><unit>` with unit `ms`, `s`, `m` or `h`, e.g. `"250ms"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' needs a unit (ms, s, m or h)"))?;
    let (digits, unit) = s.split_at(split);
    if digits.is_empty() {
        return Err(format!("duration '{s}' does not start with a number"));
    }
    let value: u64 = digits
        .parse()
        .map_err(|e| format!("invalid duration number '{digits}': {e}"))?;

    let secs_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        other => return Err(format!("unknown duration unit '{other}' (ms, s, m or h)")),
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}
