//! External command helpers
//!
//! Module loading and unloading are best-effort: their outcome is captured
//! and logged, never turned into a harness failure.

use std::fmt;
use std::process::Command;

/// Result of running a one-shot external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Exited with status 0
    Success,
    /// Ran but exited unsuccessfully
    Failed {
        /// Exit code, `None` if killed by a signal
        code: Option<i32>,
        stderr: String,
    },
    /// Could not be started at all
    SpawnFailed(String),
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Success)
    }

    /// Log a warning for anything but success
    pub fn warn_on_failure(&self, what: &str) {
        if !self.is_success() {
            log::warn!("{} did not succeed: {}", what, self);
        }
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::Success => write!(f, "success"),
            CommandOutcome::Failed { code: Some(code), stderr } if stderr.is_empty() => {
                write!(f, "exit code {}", code)
            }
            CommandOutcome::Failed { code: Some(code), stderr } => {
                write!(f, "exit code {}: {}", code, stderr)
            }
            CommandOutcome::Failed { code: None, .. } => write!(f, "terminated by signal"),
            CommandOutcome::SpawnFailed(e) => write!(f, "failed to start: {}", e),
        }
    }
}

/// Run `program args...` to completion, capturing its status and stderr
pub fn run_command<I, S>(program: &str, args: I) -> CommandOutcome
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let mut command = Command::new(program);
    command.args(args);
    log::debug!("Running {:?}", command);

    match command.output() {
        Ok(output) if output.status.success() => CommandOutcome::Success,
        Ok(output) => CommandOutcome::Failed {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        },
        Err(e) => CommandOutcome::SpawnFailed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_command() {
        assert_eq!(run_command("true", [] as [&str; 0]), CommandOutcome::Success);
    }

    #[test]
    fn test_failed_command_captures_code_and_stderr() {
        let outcome = run_command("sh", ["-c", "echo nope >&2; exit 3"]);
        assert_eq!(
            outcome,
            CommandOutcome::Failed {
                code: Some(3),
                stderr: "nope".to_string(),
            }
        );
        assert_eq!(outcome.to_string(), "exit code 3: nope");
    }

    #[test]
    fn test_missing_program_is_spawn_failure() {
        let outcome = run_command("/nonexistent/modprobe", ["snd-aloop"]);
        assert!(matches!(outcome, CommandOutcome::SpawnFailed(_)));
        assert!(!outcome.is_success());
    }
}
