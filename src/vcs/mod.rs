pub mod git;

use crate::errors::{AppError, AppResult};
use std::path::Path;

/// Exit code reported when the process never ran.
pub const NOT_STARTED_EXIT_CODE: i32 = -1;

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub message: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn succeeded(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: stderr.into(),
            message: String::new(),
            exit_code: 0,
        }
    }

    /// Non-zero exit: the message prefers stderr and falls back to a generic line.
    pub fn exited(
        command: &str,
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        let stderr = stderr.into();
        let message = if stderr.trim().is_empty() {
            format!("{} failed with exit code {}", command, exit_code)
        } else {
            stderr.trim().to_string()
        };
        Self {
            success: false,
            stdout: stdout.into(),
            stderr,
            message,
            exit_code,
        }
    }

    pub fn not_started(message: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            message: message.into(),
            exit_code: NOT_STARTED_EXIT_CODE,
        }
    }

    pub fn into_result(self) -> AppResult<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(AppError::Git(self.message))
        }
    }
}

/// Runs the version-control CLI. Implementations block until the process exits
/// and both output streams are drained.
pub trait CommandRunner: Send + Sync {
    fn run(&self, cwd: &Path, args: &[&str]) -> CommandOutput;
}
