use super::merge::merge;
use super::progress::Progress;
use crate::errors::{AppError, AppResult};
use crate::store::{read_lines, NoteStore};
use crate::vcs::CommandRunner;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const METADATA_DIR: &str = ".git";
const UNBORN_BRANCH_PLACEHOLDER: &str = "HEAD";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapOutcome {
    pub already_linked: bool,
    /// Remote default branch picked up after the requested branch could not be cloned.
    pub adopted_branch: Option<String>,
}

/// Links the notes directory to a remote repository on first use.
pub struct RepositoryBootstrapper<'a> {
    runner: &'a dyn CommandRunner,
    store: &'a NoteStore,
    remote_url: &'a str,
    branch: &'a str,
    progress: &'a Progress,
    temp_base: Option<PathBuf>,
}

impl<'a> RepositoryBootstrapper<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        store: &'a NoteStore,
        remote_url: &'a str,
        branch: &'a str,
        progress: &'a Progress,
    ) -> Self {
        Self {
            runner,
            store,
            remote_url,
            branch,
            progress,
            temp_base: None,
        }
    }

    /// Creates the temporary clone under `base` instead of the system temp dir.
    pub fn with_temp_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.temp_base = Some(base.into());
        self
    }

    pub fn is_linked(directory: &Path) -> bool {
        directory.join(METADATA_DIR).is_dir()
    }

    pub fn ensure(&self) -> AppResult<BootstrapOutcome> {
        if self.remote_url.trim().is_empty() {
            return Err(AppError::Config(
                "Git repository URL is not configured in settings".to_string(),
            ));
        }

        let notes_dir = self.store.directory().to_path_buf();
        fs::create_dir_all(&notes_dir)?;
        if Self::is_linked(&notes_dir) {
            return Ok(BootstrapOutcome {
                already_linked: true,
                adopted_branch: None,
            });
        }

        let local_notes = if self.store.exists() {
            self.progress
                .report("Detected existing notes. Backing up before linking repository...");
            Some(self.store.read_raw()?)
        } else {
            None
        };

        let mut builder = tempfile::Builder::new();
        builder.prefix("quicknotes_");
        let temp = match &self.temp_base {
            Some(base) => builder.tempdir_in(base)?,
            None => builder.tempdir()?,
        };
        let result = self.link_from_clone(temp.path(), &notes_dir, local_notes);
        let temp_path = temp.path().to_path_buf();
        if let Err(error) = temp.close() {
            tracing::warn!(
                path = %temp_path.display(),
                error = %error,
                "failed to remove temporary clone"
            );
        }
        result
    }

    fn link_from_clone(
        &self,
        temp_root: &Path,
        notes_dir: &Path,
        local_notes: Option<Vec<String>>,
    ) -> AppResult<BootstrapOutcome> {
        let clone_dir = temp_root.join("clone");
        let adopted_branch = self.clone_remote(temp_root, &clone_dir)?;

        move_dir(&clone_dir.join(METADATA_DIR), &notes_dir.join(METADATA_DIR))?;
        self.progress.report("Repository initialized in notes directory");

        let note_file = self.store.file_name();
        let remote_notes = read_lines(&clone_dir.join(&note_file))?;
        copy_repository_files(&clone_dir, notes_dir, &note_file)?;

        let has_local = local_notes
            .as_ref()
            .is_some_and(|lines| lines.iter().any(|line| !line.trim().is_empty()));
        if has_local {
            self.progress.report("Reconciling local and remote notes...");
            let merged = merge(&remote_notes, &local_notes.unwrap_or_default());
            self.store.write_all(&merged)?;
            self.progress.report("Notes merged successfully");
        } else if !remote_notes.is_empty() {
            self.store.write_all(&remote_notes)?;
            self.progress.report("Remote notes downloaded");
        } else {
            self.store.write_all(&[])?;
        }

        tracing::info!(
            path = %notes_dir.display(),
            merged = has_local,
            "notes directory linked to remote repository"
        );
        Ok(BootstrapOutcome {
            already_linked: false,
            adopted_branch,
        })
    }

    /// Clones the configured branch, falling back to the remote default branch.
    /// Returns the remote branch name when the fallback was used.
    fn clone_remote(&self, temp_root: &Path, clone_dir: &Path) -> AppResult<Option<String>> {
        let target = clone_dir.to_string_lossy().to_string();
        let first = self.runner.run(
            temp_root,
            &[
                "clone",
                "--single-branch",
                "--branch",
                self.branch,
                self.remote_url,
                &target,
            ],
        );
        self.progress.report_output(&first);
        if first.success {
            return Ok(None);
        }

        if clone_dir.exists() {
            fs::remove_dir_all(clone_dir)?;
        }
        self.progress.report(
            "Requested branch not found or clone failed. Trying repository default branch...",
        );
        let fallback = self.runner.run(temp_root, &["clone", self.remote_url, &target]);
        self.progress.report_output(&fallback);
        if !fallback.success {
            tracing::warn!(
                branch = self.branch,
                "clone failed for requested and default branch"
            );
            return Err(AppError::Git(first.message));
        }

        let head = self.runner.run(clone_dir, &["rev-parse", "--abbrev-ref", "HEAD"]);
        self.progress.report_output(&head);
        if !head.success {
            return Ok(None);
        }
        let detected = head.stdout.trim();
        if detected.is_empty()
            || detected.eq_ignore_ascii_case(UNBORN_BRANCH_PLACEHOLDER)
            || detected == self.branch
        {
            return Ok(None);
        }
        self.progress.report(format!(
            "Using repository branch '{}'. Update settings if you prefer a different branch.",
            detected
        ));
        Ok(Some(detected.to_string()))
    }
}

fn move_dir(source: &Path, destination: &Path) -> AppResult<()> {
    if !source.is_dir() {
        return Err(AppError::Git(format!(
            "Cloned repository has no {} folder",
            METADATA_DIR
        )));
    }
    if destination.exists() {
        fs::remove_dir_all(destination)?;
    }
    if fs::rename(source, destination).is_ok() {
        return Ok(());
    }

    // rename fails across filesystems (temp dir on tmpfs)
    copy_dir_all(source, destination)?;
    if let Err(error) = fs::remove_dir_all(source) {
        tracing::debug!(
            path = %source.display(),
            error = %error,
            "left copied metadata behind in temp dir"
        );
    }
    Ok(())
}

fn copy_repository_files(source: &Path, destination: &Path, note_file: &str) -> AppResult<()> {
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.eq_ignore_ascii_case(METADATA_DIR) || name.eq_ignore_ascii_case(note_file) {
            continue;
        }

        let target = destination.join(&name);
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn copy_dir_all(source: &Path, destination: &Path) -> AppResult<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|error| AppError::Io(error.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|error| AppError::Internal(error.to_string()))?;
        let target: PathBuf = destination.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::ScriptedRunner;
    use crate::vcs::CommandOutput;

    const REMOTE_URL: &str = "https://example.test/notes.git";

    fn notes_store(dir: &Path) -> NoteStore {
        NoteStore::new(dir.join("notes").join(crate::store::NOTES_FILE_NAME))
    }

    fn bootstrapper<'a>(
        runner: &'a ScriptedRunner,
        store: &'a NoteStore,
        progress: &'a Progress,
    ) -> RepositoryBootstrapper<'a> {
        RepositoryBootstrapper::new(runner, store, REMOTE_URL, "main", progress)
    }

    fn entries(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .expect("list dir")
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn existing_metadata_folder_skips_bootstrap() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = notes_store(dir.path());
        fs::create_dir_all(store.directory().join(METADATA_DIR)).expect("metadata dir");
        let runner = ScriptedRunner::cloning(Some("[id:R] remote\n"));

        let outcome = bootstrapper(&runner, &store, &Progress::silent())
            .ensure()
            .expect("bootstrap");
        assert!(outcome.already_linked);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn missing_remote_url_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = notes_store(dir.path());
        let runner = ScriptedRunner::cloning(None);
        let error = RepositoryBootstrapper::new(&runner, &store, "  ", "main", &Progress::silent())
            .ensure()
            .expect_err("no url");
        assert!(matches!(error, AppError::Config(_)));
    }

    #[test]
    fn first_link_merges_local_notes_over_remote() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = notes_store(dir.path());
        fs::create_dir_all(store.directory()).expect("notes dir");
        fs::write(
            store.path(),
            "[id:A] [2024-01-03 00:00:00] local edit\n[id:L] [2024-01-04 00:00:00] local only\n",
        )
        .expect("seed local");

        let runner = ScriptedRunner::cloning(Some(
            "[id:A] [2024-01-01 00:00:00] remote original\n\
             [id:R] [2024-01-02 00:00:00] remote only\n",
        ));
        let (progress, mut events) = Progress::channel();
        let outcome = bootstrapper(&runner, &store, &progress)
            .ensure()
            .expect("bootstrap");

        assert!(!outcome.already_linked);
        assert_eq!(outcome.adopted_branch, None);
        assert!(store.directory().join(METADATA_DIR).join("HEAD").is_file());
        assert!(store.directory().join("README.md").is_file());
        assert!(store.directory().join("docs").join("guide.md").is_file());
        assert_eq!(
            store.read_raw().expect("merged notes"),
            vec![
                "[id:A] [2024-01-03 00:00:00] local edit",
                "[id:R] [2024-01-02 00:00:00] remote only",
                "[id:L] [2024-01-04 00:00:00] local only",
            ]
        );

        let first_call = &runner.calls()[0];
        assert_eq!(&first_call[..4], &["clone", "--single-branch", "--branch", "main"]);

        let mut messages = Vec::new();
        while let Ok(message) = events.try_recv() {
            messages.push(message);
        }
        assert!(messages.iter().any(|m| m.contains("Reconciling local and remote notes")));
    }

    #[test]
    fn remote_notes_are_downloaded_when_no_local_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = notes_store(dir.path());
        let runner = ScriptedRunner::cloning(Some("[id:R] [2024-01-02 00:00:00] remote only\n"));

        bootstrapper(&runner, &store, &Progress::silent())
            .ensure()
            .expect("bootstrap");
        assert_eq!(
            store.read_raw().expect("notes"),
            vec!["[id:R] [2024-01-02 00:00:00] remote only"]
        );
    }

    #[test]
    fn empty_remote_and_no_local_file_creates_empty_notes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = notes_store(dir.path());
        let runner = ScriptedRunner::cloning(None);

        bootstrapper(&runner, &store, &Progress::silent())
            .ensure()
            .expect("bootstrap");
        assert!(store.exists());
        assert!(store.read_raw().expect("notes").is_empty());
    }

    #[test]
    fn falls_back_to_default_branch_and_adopts_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = notes_store(dir.path());
        let runner = ScriptedRunner::cloning(Some("[id:R] remote\n"))
            .failing_branch_clone("fatal: Remote branch main not found in upstream origin")
            .with_head("master");

        let outcome = bootstrapper(&runner, &store, &Progress::silent())
            .ensure()
            .expect("bootstrap");
        assert_eq!(outcome.adopted_branch.as_deref(), Some("master"));

        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1][0], "clone");
        assert_eq!(calls[1].len(), 3);
        assert_eq!(&calls[2][..], &["rev-parse", "--abbrev-ref", "HEAD"]);
    }

    #[test]
    fn unborn_head_is_not_adopted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = notes_store(dir.path());
        let runner = ScriptedRunner::cloning(None)
            .failing_branch_clone("fatal: Remote branch main not found")
            .with_head("HEAD");

        let outcome = bootstrapper(&runner, &store, &Progress::silent())
            .ensure()
            .expect("bootstrap");
        assert_eq!(outcome.adopted_branch, None);
    }

    #[test]
    fn failed_clones_report_first_error_and_leave_notes_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = notes_store(dir.path());
        fs::create_dir_all(store.directory()).expect("notes dir");
        fs::write(store.path(), "[id:A] keep me\n").expect("seed local");

        let runner = ScriptedRunner::new(|_, args| {
            if args.len() > 3 {
                CommandOutput::exited("git clone", 128, "", "fatal: branch clone failed")
            } else {
                CommandOutput::exited("git clone", 128, "", "fatal: repository not found")
            }
        });

        let error = bootstrapper(&runner, &store, &Progress::silent())
            .ensure()
            .expect_err("clone failure");
        assert_eq!(error.detail(), "fatal: branch clone failed");
        assert_eq!(fs::read_to_string(store.path()).expect("notes"), "[id:A] keep me\n");
        assert!(!store.directory().join(METADATA_DIR).exists());
    }

    #[test]
    fn clone_without_metadata_folder_fails_and_cleans_temp_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let temp_base = dir.path().join("tmp");
        fs::create_dir_all(&temp_base).expect("temp base");
        let store = notes_store(dir.path());
        let runner = ScriptedRunner::new(|_, args| {
            if args.first() == Some(&"clone") {
                let target = Path::new(args.last().copied().unwrap_or_default());
                fs::create_dir_all(target).expect("clone target");
                fs::write(target.join("notes.txt"), "[id:R] remote\n").expect("remote notes");
            }
            CommandOutput::succeeded("", "")
        });

        let error = bootstrapper(&runner, &store, &Progress::silent())
            .with_temp_base(&temp_base)
            .ensure()
            .expect_err("clone has no metadata");
        assert!(matches!(error, AppError::Git(_)));
        assert!(error.detail().contains("no .git folder"));
        assert!(entries(&temp_base).is_empty());
        assert!(!store.directory().join(METADATA_DIR).exists());
        assert!(!store.exists());
    }

    #[test]
    fn failed_notes_write_still_cleans_temp_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let temp_base = dir.path().join("tmp");
        fs::create_dir_all(&temp_base).expect("temp base");
        let store = notes_store(dir.path());
        // a directory in place of the notes file makes the final rename fail
        fs::create_dir_all(store.path()).expect("blocking dir");
        let runner = ScriptedRunner::cloning(Some("[id:R] [2024-01-02 00:00:00] remote only\n"));

        let result = bootstrapper(&runner, &store, &Progress::silent())
            .with_temp_base(&temp_base)
            .ensure();
        assert!(result.is_err());
        assert!(entries(&temp_base).is_empty());
        assert!(store.directory().join(METADATA_DIR).join("HEAD").is_file());
        assert!(store.path().is_dir());
    }
}
