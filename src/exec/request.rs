// src/exec/request.rs

//! The fully resolved process request for one run iteration.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::capture::StdioSet;
use crate::errors::{Result, RunnerError};
use crate::exec::platform::Platform;
use crate::types::CommandSpec;

/// What is about to be launched. Built fresh from the [`CommandSpec`] at the
/// start of every iteration, then handed to the capture strategy for
/// inspection before anything is spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Final argument vector (already shell-wrapped if requested).
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub join_streams: bool,
    /// Executable name of the *unwrapped* command, used for log naming.
    pub exec_name: Option<String>,
}

impl LaunchRequest {
    pub fn build(spec: &CommandSpec, join_streams: bool, platform: Platform) -> Result<Self> {
        if spec.args.is_empty() {
            return Err(RunnerError::config("exec command is empty"));
        }

        let exec_name = spec.exec_name();
        let argv = if spec.shell {
            match platform.shell_wrap(spec.args.clone()) {
                Some(wrapped) => {
                    debug!(argv = ?wrapped, "wrapping command in platform shell");
                    wrapped
                }
                None => {
                    warn!("no shell known for this platform; running command unwrapped");
                    spec.args.clone()
                }
            }
        } else {
            spec.args.clone()
        };

        Ok(Self {
            argv,
            cwd: spec.cwd.clone(),
            env: spec.env.clone(),
            join_streams,
            exec_name,
        })
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    /// Turn the request into a spawnable command wired to `stdio`.
    ///
    /// The child inherits the parent's environment with `env` layered on
    /// top, and is killed if its handle is dropped.
    pub fn command(&self, stdio: StdioSet) -> Result<Command> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| RunnerError::config("exec command is empty"))?;

        let mut cmd = Command::new(program);
        cmd.args(args).envs(&self.env);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd.stdin(stdio.stdin)
            .stdout(stdio.stdout)
            .stderr(stdio.stderr)
            .kill_on_drop(true);
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_a_configuration_error() {
        let err = LaunchRequest::build(&CommandSpec::default(), false, Platform::UNIX).unwrap_err();
        assert!(matches!(err, RunnerError::Configuration(_)));
    }

    #[test]
    fn shell_wrap_consumes_original_args_but_keeps_exec_name() {
        let spec = CommandSpec::new(["python3.11", "-c", "print(1)"]).shell(true);
        let req = LaunchRequest::build(&spec, false, Platform::UNIX).unwrap();

        assert_eq!(req.argv, vec!["/bin/sh", "-c", "python3.11 -c print(1)"]);
        assert_eq!(req.program(), "/bin/sh");
        assert_eq!(req.exec_name.as_deref(), Some("python3"));
    }

    #[test]
    fn request_carries_cwd_env_and_join_flag() {
        let spec = CommandSpec::new(["ls"]).cwd("/tmp").env("LANG", "C");
        let req = LaunchRequest::build(&spec, true, Platform::UNIX).unwrap();

        assert_eq!(req.argv, vec!["ls"]);
        assert_eq!(req.cwd, Some(PathBuf::from("/tmp")));
        assert_eq!(req.env.get("LANG").map(String::as_str), Some("C"));
        assert!(req.join_streams);
    }
}
