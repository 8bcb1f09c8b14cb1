use super::{CommandOutput, CommandRunner};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

const DEFAULT_GIT_BINARY: &str = "git";

/// Runs the `git` executable found on `PATH` (or an explicit binary).
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new(DEFAULT_GIT_BINARY)
    }
}

impl GitCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn display_command(&self, args: &[&str]) -> String {
        let program = self
            .program
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| DEFAULT_GIT_BINARY.to_string());
        format!("{} {}", program, args.join(" "))
    }
}

impl CommandRunner for GitCli {
    fn run(&self, cwd: &Path, args: &[&str]) -> CommandOutput {
        let command_line = self.display_command(args);
        tracing::debug!(cwd = %cwd.display(), command = %command_line, "running git");

        let output = Command::new(&self.program)
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = match output {
            Ok(output) => output,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(program = %self.program.display(), "git executable not found");
                return CommandOutput::not_started(
                    "Git CLI not found. Install Git or add it to PATH.",
                );
            }
            Err(error) => {
                tracing::warn!(command = %command_line, error = %error, "failed to start git");
                return CommandOutput::not_started(format!("Git command failed: {}", error));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if output.status.success() {
            return CommandOutput::succeeded(stdout, stderr);
        }

        let exit_code = output.status.code().unwrap_or(super::NOT_STARTED_EXIT_CODE);
        tracing::info!(command = %command_line, exit_code, "git exited with failure");
        CommandOutput::exited(&command_line, exit_code, stdout, stderr)
    }
}
