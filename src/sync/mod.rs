pub mod bootstrap;
pub mod merge;
pub mod progress;

use crate::codec::TIMESTAMP_FORMAT;
use crate::errors::{AppError, AppResult};
use crate::models::SyncReport;
use crate::store::NoteStore;
use crate::vcs::{CommandOutput, CommandRunner};
use bootstrap::RepositoryBootstrapper;
use chrono::Local;
use progress::Progress;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_BRANCH: &str = "main";
pub const FALLBACK_USER_NAME: &str = "QuickNotes User";
pub const FALLBACK_USER_EMAIL: &str = "quicknotes@local";

/// Remote and identity used by [`SyncService`]. Blank identity fields fall back
/// to the git config of the notes repository, then to fixed defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub remote_url: String,
    pub branch: String,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    Sync,
    Restore,
}

impl SyncOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Restore => "restore",
        }
    }
}

pub struct SyncService {
    runner: Arc<dyn CommandRunner>,
    store: NoteStore,
    settings: SyncSettings,
    configured_branch: String,
    branch: RwLock<String>,
}

impl SyncService {
    pub fn new(runner: Arc<dyn CommandRunner>, store: NoteStore, settings: SyncSettings) -> Self {
        let branch = if settings.branch.trim().is_empty() {
            DEFAULT_BRANCH.to_string()
        } else {
            settings.branch.trim().to_string()
        };
        Self {
            runner,
            store,
            settings,
            configured_branch: branch.clone(),
            branch: RwLock::new(branch),
        }
    }

    /// Branch used for push and fetch. Changes when bootstrap adopts the
    /// remote default branch.
    pub fn branch(&self) -> String {
        self.branch
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn sync(&self, progress: &Progress) -> SyncReport {
        let result = self.push_notes(progress);
        self.finish(SyncOperation::Sync, result)
    }

    pub fn restore(&self, progress: &Progress) -> SyncReport {
        let result = self.restore_notes(progress);
        self.finish(SyncOperation::Restore, result)
    }

    pub fn run(&self, operation: SyncOperation, progress: &Progress) -> SyncReport {
        match operation {
            SyncOperation::Sync => self.sync(progress),
            SyncOperation::Restore => self.restore(progress),
        }
    }

    /// Runs the operation on the blocking pool. Progress lines arrive on
    /// [`SyncTask::events`] while the git commands execute.
    pub fn spawn(self: &Arc<Self>, operation: SyncOperation) -> SyncTask {
        let (progress, events) = Progress::channel();
        let service = Arc::clone(self);
        let handle = tokio::task::spawn_blocking(move || service.run(operation, &progress));
        SyncTask {
            operation,
            events,
            handle,
        }
    }

    fn finish(&self, operation: SyncOperation, result: AppResult<String>) -> SyncReport {
        let mut report = match result {
            Ok(message) => {
                tracing::info!(
                    operation = operation.as_str(),
                    branch = %self.branch(),
                    "git operation completed"
                );
                SyncReport::ok(message)
            }
            Err(error) => {
                tracing::warn!(
                    operation = operation.as_str(),
                    error = %error,
                    "git operation failed"
                );
                SyncReport::failed(error.detail())
            }
        };
        let branch = self.branch();
        if branch != self.configured_branch {
            report.adopted_branch = Some(branch);
        }
        report
    }

    fn ensure_repository(&self, progress: &Progress) -> AppResult<()> {
        progress.report("Checking repository...");
        let branch = self.branch();
        let outcome = RepositoryBootstrapper::new(
            self.runner.as_ref(),
            &self.store,
            &self.settings.remote_url,
            &branch,
            progress,
        )
        .ensure()?;

        if let Some(adopted) = outcome.adopted_branch {
            tracing::info!(requested = %branch, adopted = %adopted, "using remote default branch");
            *self
                .branch
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = adopted;
        }
        Ok(())
    }

    fn push_notes(&self, progress: &Progress) -> AppResult<String> {
        self.ensure_repository(progress)?;
        let directory = self.store.directory();
        let note_file = self.store.file_name();

        self.git(progress, directory, &["add", &note_file])?;
        let status = self.git(progress, directory, &["status", "--porcelain", "--", &note_file])?;
        if status.stdout.trim().is_empty() {
            progress.report("No changes to sync");
            return Ok("Everything is up to date! No changes to sync.".to_string());
        }

        let (user_name, user_email) = self.commit_identity(directory);
        let name_arg = format!("user.name={}", user_name);
        let email_arg = format!("user.email={}", user_email);
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        progress.report(format!("Creating commit: {}...", timestamp));
        self.git(
            progress,
            directory,
            &["-c", &name_arg, "-c", &email_arg, "commit", "-m", &timestamp],
        )?;

        let branch = self.branch();
        progress.report("Pushing to remote repository...");
        self.git(progress, directory, &["push", "origin", &branch])?;
        progress.report("Push completed");

        Ok(format!(
            "Notes synced successfully at {}",
            Local::now().format("%H:%M:%S")
        ))
    }

    fn restore_notes(&self, progress: &Progress) -> AppResult<String> {
        self.ensure_repository(progress)?;
        let directory = self.store.directory();

        progress.report("Creating local backup...");
        let snapshot = self
            .store
            .snapshot()
            .map_err(|error| AppError::Io(format!("Failed to create backup: {}", error.detail())))?;
        if let Some(path) = snapshot {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            progress.report(format!("Backup saved: {}", name));
        }

        let branch = self.branch();
        progress.report("Fetching from remote repository...");
        self.git(progress, directory, &["fetch", "origin", &branch])?;

        progress.report("Restoring notes from remote...");
        let target = format!("origin/{}", branch);
        self.git(progress, directory, &["reset", "--hard", &target])?;
        progress.report("Restore completed");

        Ok(format!(
            "Notes restored successfully at {}. Local backup created.",
            Local::now().format("%H:%M:%S")
        ))
    }

    fn git(&self, progress: &Progress, cwd: &Path, args: &[&str]) -> AppResult<CommandOutput> {
        let output = self.runner.run(cwd, args);
        progress.report_output(&output);
        output.into_result()
    }

    fn commit_identity(&self, directory: &Path) -> (String, String) {
        let user_name = configured(&self.settings.user_name)
            .or_else(|| self.git_config_value(directory, "user.name"))
            .unwrap_or_else(|| FALLBACK_USER_NAME.to_string());
        let user_email = configured(&self.settings.user_email)
            .or_else(|| self.git_config_value(directory, "user.email"))
            .unwrap_or_else(|| FALLBACK_USER_EMAIL.to_string());
        (user_name, user_email)
    }

    fn git_config_value(&self, directory: &Path, key: &str) -> Option<String> {
        let output = self.runner.run(directory, &["config", key]);
        if !output.success {
            return None;
        }
        let value = output.stdout.trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}

fn configured(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Handle to a sync or restore running in the background.
pub struct SyncTask {
    pub operation: SyncOperation,
    pub events: mpsc::UnboundedReceiver<String>,
    pub handle: JoinHandle<SyncReport>,
}

impl SyncTask {
    /// Forwards progress lines as they arrive, then returns the final report.
    pub async fn finish(mut self, mut on_event: impl FnMut(&str)) -> SyncReport {
        while let Some(event) = self.events.recv().await {
            on_event(&event);
        }
        match self.handle.await {
            Ok(report) => report,
            Err(error) => {
                let operation = self.operation.as_str();
                tracing::error!(operation, error = %error, "git task aborted");
                SyncReport::failed(format!("Git {} task failed: {}", operation, error))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::vcs::{CommandOutput, CommandRunner};
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;

    type Handler = Box<dyn Fn(&Path, &[&str]) -> CommandOutput + Send + Sync>;

    /// Fake git: `clone` materialises a repository at the target path, every
    /// other command answers from the scripted responses.
    pub struct ScriptedRunner {
        remote_notes: Option<String>,
        branch_clone_error: Option<String>,
        head: String,
        responses: HashMap<String, CommandOutput>,
        handler: Option<Handler>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        pub fn new(
            handler: impl Fn(&Path, &[&str]) -> CommandOutput + Send + Sync + 'static,
        ) -> Self {
            let mut runner = Self::cloning(None);
            runner.handler = Some(Box::new(handler));
            runner
        }

        pub fn cloning(remote_notes: Option<&str>) -> Self {
            Self {
                remote_notes: remote_notes.map(str::to_string),
                branch_clone_error: None,
                head: "main".to_string(),
                responses: HashMap::new(),
                handler: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing_branch_clone(mut self, stderr: &str) -> Self {
            self.branch_clone_error = Some(stderr.to_string());
            self
        }

        pub fn with_head(mut self, branch: &str) -> Self {
            self.head = branch.to_string();
            self
        }

        pub fn with_response(mut self, command: &str, output: CommandOutput) -> Self {
            self.responses.insert(command.to_string(), output);
            self
        }

        pub fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().expect("calls lock").clone()
        }

        pub fn commands(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .map(|args| {
                    args.into_iter()
                        .find(|arg| !arg.starts_with("-") && !arg.contains('='))
                        .unwrap_or_default()
                })
                .collect()
        }

        fn materialise_clone(&self, target: &Path) -> std::io::Result<()> {
            fs::create_dir_all(target.join(".git"))?;
            let head = format!("ref: refs/heads/{}\n", self.head);
            fs::write(target.join(".git").join("HEAD"), head)?;
            fs::write(target.join("README.md"), "# notes\n")?;
            fs::create_dir_all(target.join("docs"))?;
            fs::write(target.join("docs").join("guide.md"), "guide\n")?;
            if let Some(notes) = &self.remote_notes {
                fs::write(target.join(crate::store::NOTES_FILE_NAME), notes)?;
            }
            Ok(())
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, cwd: &Path, args: &[&str]) -> CommandOutput {
            self.calls
                .lock()
                .expect("calls lock")
                .push(args.iter().map(|arg| arg.to_string()).collect());
            if let Some(handler) = &self.handler {
                return handler(cwd, args);
            }

            let command = args
                .iter()
                .find(|arg| !arg.starts_with('-') && !arg.contains('='))
                .copied()
                .unwrap_or_default();
            if let Some(output) = self.responses.get(command) {
                return output.clone();
            }

            match command {
                "clone" => {
                    if args.contains(&"--single-branch") {
                        if let Some(error) = &self.branch_clone_error {
                            return CommandOutput::exited("git clone", 128, "", error.clone());
                        }
                    }
                    let target = Path::new(args.last().copied().unwrap_or_default());
                    match self.materialise_clone(target) {
                        Ok(()) => CommandOutput::succeeded("", "Cloning into 'clone'...\n"),
                        Err(error) => CommandOutput::not_started(error.to_string()),
                    }
                }
                "rev-parse" => CommandOutput::succeeded(format!("{}\n", self.head), ""),
                "status" => CommandOutput::succeeded(" M notes.txt\n", ""),
                "config" => CommandOutput::exited("git config", 1, "", ""),
                _ => CommandOutput::succeeded("", ""),
            }
        }
    }
}
