// src/config/loader.rs

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::model::{RawRunFile, RunFile};

/// Read and deserialize a run file without semantic validation.
///
/// Command-line overrides are usually applied to the result before it is
/// turned into a [`RunFile`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawRunFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading run file at {path:?}"))?;

    let raw = parse_str(&contents)
        .with_context(|| format!("parsing TOML run file from {path:?}"))?;

    Ok(raw)
}

/// Deserialize a run file from TOML text.
pub fn parse_str(contents: &str) -> crate::errors::Result<RawRunFile> {
    Ok(toml::from_str(contents)?)
}

/// Load a run file and validate it as is.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<RunFile> {
    let path = path.as_ref();
    let raw = load_from_path(path)?;
    let run = RunFile::try_from(raw).with_context(|| format!("validating run file {path:?}"))?;
    Ok(run)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::types::StreamMode;

    fn write(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("run.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_every_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            r#"
            [command]
            args = ["java", "-version"]
            cwd = "/tmp"
            join_streams = true
            [command.env]
            LC_ALL = "C"

            [policy]
            fork_retries = 3
            restart_exit_code = 42

            [output]
            mode = "pipe"

            [wait]
            timeout = "10s"
            "#,
        );

        let run = load_and_validate(&path).unwrap();
        let cfg = &run.runner;
        assert_eq!(cfg.command.args, vec!["java", "-version"]);
        assert_eq!(cfg.command.cwd.as_deref(), Some(Path::new("/tmp")));
        assert_eq!(cfg.command.env.get("LC_ALL").map(String::as_str), Some("C"));
        assert!(cfg.join_streams);
        assert_eq!(cfg.policy.fork_retries(), 3);
        assert_eq!(cfg.policy.restart_exit_code(), 42);
        assert_eq!(cfg.mode, StreamMode::Pipe);
        assert_eq!(run.timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn empty_file_parses_but_does_not_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "");

        let raw = load_from_path(&path).unwrap();
        assert!(raw.command.args.is_none());
        assert_eq!(raw.policy.fork_retries, 1);
        assert!(load_and_validate(&path).is_err());
    }

    #[test]
    fn unknown_mode_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "[output]\nmode = \"socket\"\n");

        let err = load_from_path(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parsing TOML run file"));
    }

    #[test]
    fn parse_str_reports_toml_errors() {
        let err = parse_str("[command\nargs = 1").unwrap_err();
        assert!(matches!(err, crate::errors::RunnerError::Toml(_)));
    }

    #[test]
    fn missing_file_mentions_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_from_path(dir.path().join("nope.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("nope.toml"));
    }
}
