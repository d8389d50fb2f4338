//! The command-execution collaborator (spec §1, §6): "the operating
//! system's process facility, exposing a run(command, cwd, env) ->
//! {stdout, stderr, return-value} operation." The recording engine and
//! inspections depend on this trait rather than calling `std::process`
//! directly, so tests can substitute a recorded-response double instead
//! of spawning real processes.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use thiserror::Error;

use crate::error::{Classify, Kind};
use crate::model::Byproducts;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("command {0:?} timed out after {1:?}")]
    Timeout(String, Duration),
    #[error("failed to spawn command {0:?}: {1}")]
    Spawn(String, std::io::Error),
    #[error("command {0:?} had no arguments")]
    EmptyCommand(String),
}

impl Classify for RunError {
    fn kind(&self) -> Kind {
        match self {
            RunError::Timeout(..) => Kind::Timeout,
            RunError::Spawn(..) | RunError::EmptyCommand(..) => Kind::Runtime,
        }
    }
}

/// The `run(command, cwd, env) -> {stdout, stderr, return-value}` contract.
pub trait CommandRunner {
    fn run(
        &self,
        command: &[String],
        cwd: &Path,
        env: &BTreeMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<Byproducts, RunError>;
}

/// Default [`CommandRunner`] backed by `std::process::Command`.
///
/// Timeout enforcement is cooperative: the child is polled at short
/// intervals and killed if it outlives the deadline (spec §4.5: "a step
/// that exceeds its configured timeout is recorded as a failure, not
/// silently truncated").
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(
        &self,
        command: &[String],
        cwd: &Path,
        env: &BTreeMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<Byproducts, RunError> {
        let joined = command.join(" ");
        let (program, args) = command.split_first().ok_or_else(|| RunError::EmptyCommand(joined.clone()))?;

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.current_dir(cwd);
        cmd.envs(env);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| RunError::Spawn(joined.clone(), e))?;

        let status = match timeout {
            None => child.wait().map_err(|e| RunError::Spawn(joined.clone(), e))?,
            Some(limit) => {
                let start = std::time::Instant::now();
                loop {
                    if let Some(status) = child.try_wait().map_err(|e| RunError::Spawn(joined.clone(), e))? {
                        break status;
                    }
                    if start.elapsed() >= limit {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(RunError::Timeout(joined, limit));
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
            }
        };

        use std::io::Read;
        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(mut out) = child.stdout.take() {
            let _ = out.read_to_string(&mut stdout);
        }
        if let Some(mut err) = child.stderr.take() {
            let _ = err.read_to_string(&mut stderr);
        }

        Ok(Byproducts { return_value: Some(status.code().unwrap_or(-1) as i64), stdout: Some(stdout), stderr: Some(stderr) })
    }
}

/// A [`CommandRunner`] double for hermetic tests: returns a fixed,
/// pre-recorded response without spawning anything.
#[cfg(any(test, feature = "test-support"))]
pub struct RecordedRunner {
    pub response: Byproducts,
}

#[cfg(any(test, feature = "test-support"))]
impl CommandRunner for RecordedRunner {
    fn run(
        &self,
        _command: &[String],
        _cwd: &Path,
        _env: &BTreeMap<String, String>,
        _timeout: Option<Duration>,
    ) -> Result<Byproducts, RunError> {
        Ok(self.response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_runner_captures_stdout_and_return_value() {
        let runner = ProcessRunner;
        let result = runner
            .run(&["echo".to_string(), "hi".to_string()], Path::new("."), &BTreeMap::new(), None)
            .unwrap();
        assert_eq!(result.return_value, Some(0));
        assert_eq!(result.stdout.unwrap().trim(), "hi");
    }

    #[test]
    fn empty_command_is_rejected() {
        let runner = ProcessRunner;
        let err = runner.run(&[], Path::new("."), &BTreeMap::new(), None).unwrap_err();
        assert!(matches!(err, RunError::EmptyCommand(_)));
    }
}
