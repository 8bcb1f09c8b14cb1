use crate::vcs::CommandOutput;
use tokio::sync::mpsc;

pub const STDERR_PREFIX: &str = "! ";

/// Live log of a sync or restore run: one message per step or output line.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    sender: Option<mpsc::UnboundedSender<String>>,
}

impl Progress {
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender: Some(sender) }, receiver)
    }

    pub fn report(&self, message: impl AsRef<str>) {
        let message = message.as_ref().trim_end();
        if message.trim().is_empty() {
            return;
        }
        tracing::debug!(message, "sync progress");
        if let Some(sender) = &self.sender {
            // receiver may be gone if the caller stopped listening
            let _ = sender.send(message.to_string());
        }
    }

    /// Forwards every non-empty stdout line, then every non-empty stderr line
    /// prefixed with [`STDERR_PREFIX`].
    pub fn report_output(&self, output: &CommandOutput) {
        for line in split_output_lines(&output.stdout) {
            self.report(line);
        }
        for line in split_output_lines(&output.stderr) {
            self.report(format!("{}{}", STDERR_PREFIX, line));
        }
    }
}

/// Splits on `\n`, `\r\n` and bare `\r` (git rewrites progress lines with `\r`).
pub fn split_output_lines(text: &str) -> Vec<&str> {
    text.split(['\r', '\n'])
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect()
}
