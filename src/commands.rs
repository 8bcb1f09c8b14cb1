use crate::codec;
use crate::config::{AppSettings, SettingsStore};
use crate::errors::{AppError, AppResult};
use crate::models::{
    DeleteAllOutcome, DeleteOutcome, Feedback, MatchKind, NoteRecord, SortDirection, SortField,
};
use crate::notes::{NoteBook, Selector};
use crate::store::NoteStore;
use crate::sync::{SyncOperation, SyncService};
use crate::vcs::CommandRunner;
use std::sync::Arc;

pub const CONFIRM_FLAG: &str = "--yes";

const HELP_TEXT: &str = "\
<text>                      add a note
list                        show all notes, pinned first
search <term>               find notes containing a term
searchtag <tag>             find notes with a #tag
view <n>                    show one note
edit <n> <text>             replace the text of a note
pin <n> / unpin <n>         pin or unpin a note
del <n|text> [--yes]        delete a note
delall [--yes]              delete every note (a backup is kept)
undo                        restore the last deleted note
sort date|alpha [asc|desc]  reorder the notes file
backup                      write a timestamped copy of the notes file
export                      write notes without identity tags
sync                        commit and push notes to the git remote
restore [--yes]             replace local notes with the remote copy";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    List,
    Add(String),
    Search(String),
    SearchTag(String),
    View(usize),
    Edit { index: usize, text: String },
    Pin(usize),
    Unpin(usize),
    Delete { selector: Selector, confirmed: bool },
    DeleteAll { confirmed: bool },
    Undo,
    Sort { field: SortField, direction: SortDirection },
    Backup,
    Export,
    Sync,
    Restore { confirmed: bool },
}

impl Command {
    /// Parses one query. The first word picks the command; anything that is
    /// not a command keyword becomes a new note.
    pub fn parse(input: &str) -> AppResult<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Self::Help);
        }

        let (keyword, rest) = match input.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (input, ""),
        };
        let command = match keyword.to_ascii_lowercase().as_str() {
            "help" | "?" => Self::Help,
            "list" | "ls" => Self::List,
            "search" => Self::Search(required(rest, "Usage: search <term>")?),
            "searchtag" => Self::SearchTag(required(rest, "Usage: searchtag <tag>")?),
            "view" => Self::View(parse_index(rest, "Usage: view <number>")?),
            "edit" => {
                let usage = "Usage: edit <number> <new text>";
                let (index, text) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| AppError::InvalidInput(usage.to_string()))?;
                Self::Edit {
                    index: parse_index(index, usage)?,
                    text: required(text, usage)?,
                }
            }
            "pin" => Self::Pin(parse_index(rest, "Usage: pin <number>")?),
            "unpin" => Self::Unpin(parse_index(rest, "Usage: unpin <number>")?),
            "del" | "delete" => {
                let (target, confirmed) = split_confirmation(rest);
                Self::Delete {
                    selector: Selector::parse(&required(target, "Usage: del <number or text>")?),
                    confirmed,
                }
            }
            "delall" => Self::DeleteAll {
                confirmed: split_confirmation(rest).1,
            },
            "undo" => Self::Undo,
            "sort" => {
                let mut words = rest.split_whitespace();
                let field = words
                    .next()
                    .ok_or_else(|| {
                        AppError::InvalidInput("Usage: sort date|alpha [asc|desc]".to_string())
                    })?
                    .parse::<SortField>()?;
                let direction = match words.next() {
                    Some(direction) => direction.parse::<SortDirection>()?,
                    None => SortDirection::default(),
                };
                Self::Sort { field, direction }
            }
            "backup" => Self::Backup,
            "export" => Self::Export,
            "sync" => Self::Sync,
            "restore" => Self::Restore {
                confirmed: split_confirmation(rest).1,
            },
            _ => Self::Add(input.to_string()),
        };
        Ok(command)
    }
}

fn split_confirmation(rest: &str) -> (&str, bool) {
    match rest.strip_suffix(CONFIRM_FLAG) {
        Some(head) if head.is_empty() || head.ends_with(char::is_whitespace) => {
            (head.trim(), true)
        }
        _ => (rest, false),
    }
}

fn required(value: &str, usage: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::InvalidInput(usage.to_string()));
    }
    Ok(value.to_string())
}

fn parse_index(value: &str, usage: &str) -> AppResult<usize> {
    match value.trim().parse::<usize>() {
        Ok(index) if index > 0 => Ok(index),
        _ => Err(AppError::InvalidInput(usage.to_string())),
    }
}

enum Notes {
    Ready(NoteBook),
    Unavailable(String),
}

/// Command boundary: every operation ends in a [`Feedback`], never a panic.
pub struct App {
    notes: Notes,
    settings: AppSettings,
    settings_store: Option<SettingsStore>,
    runner: Arc<dyn CommandRunner>,
}

impl App {
    /// Opens the notes directory named by the settings. A failure leaves the
    /// app in a state where every command reports the initialization error.
    pub fn open(settings: AppSettings, runner: Arc<dyn CommandRunner>) -> Self {
        let notes = match settings.notes_dir().and_then(|dir| NoteStore::open(&dir)) {
            Ok(store) => Notes::Ready(NoteBook::new(store)),
            Err(error) => {
                tracing::error!(error = %error, "notes storage could not be initialized");
                Notes::Unavailable(error.detail())
            }
        };
        Self {
            notes,
            settings,
            settings_store: None,
            runner,
        }
    }

    pub fn with_store(
        store: NoteStore,
        settings: AppSettings,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            notes: Notes::Ready(NoteBook::new(store)),
            settings,
            settings_store: None,
            runner,
        }
    }

    /// Where an adopted sync branch gets written back.
    pub fn with_settings_store(mut self, settings_store: SettingsStore) -> Self {
        self.settings_store = Some(settings_store);
        self
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn notebook(&self) -> Option<&NoteBook> {
        match &self.notes {
            Notes::Ready(notebook) => Some(notebook),
            Notes::Unavailable(_) => None,
        }
    }

    pub async fn execute(&mut self, command: Command, on_progress: impl FnMut(&str)) -> Feedback {
        if matches!(command, Command::Help) {
            return Feedback::info("QuickNotes commands", HELP_TEXT);
        }
        if let Notes::Unavailable(reason) = &self.notes {
            return Feedback::error(
                "QuickNotes is not initialized",
                format!("Notes storage could not be prepared: {}", reason),
            );
        }

        match command {
            Command::Sync => self.run_git(SyncOperation::Sync, on_progress).await,
            Command::Restore { confirmed: true } => {
                self.run_git(SyncOperation::Restore, on_progress).await
            }
            Command::Restore { confirmed: false } => Feedback::info(
                "Confirm restore",
                format!(
                    "Restore replaces local notes with the remote copy. A backup is made first.\n\
                     Run 'restore {}' to continue.",
                    CONFIRM_FLAG
                ),
            ),
            other => {
                let Notes::Ready(notebook) = &mut self.notes else {
                    return not_initialized();
                };
                run_note_command(notebook, other).unwrap_or_else(|error| {
                    tracing::debug!(error = %error, "command failed");
                    Feedback::from(error)
                })
            }
        }
    }

    async fn run_git(
        &mut self,
        operation: SyncOperation,
        on_progress: impl FnMut(&str),
    ) -> Feedback {
        let Notes::Ready(notebook) = &mut self.notes else {
            return not_initialized();
        };
        let Some(sync_settings) = self.settings.sync_settings() else {
            return Feedback::from(AppError::Config(
                "Git sync is disabled. Enable it and set the repository URL in settings."
                    .to_string(),
            ));
        };

        let service = Arc::new(SyncService::new(
            Arc::clone(&self.runner),
            notebook.store().clone(),
            sync_settings,
        ));
        let report = service
            .spawn(operation)
            .finish(on_progress)
            .await;

        if let Some(branch) = &report.adopted_branch {
            self.settings.git_branch = branch.clone();
            if let Some(store) = &self.settings_store {
                if let Err(error) = store.save(&self.settings) {
                    tracing::warn!(
                        branch = %branch,
                        error = %error,
                        "failed to persist adopted branch"
                    );
                }
            }
        }

        let title = match (operation, report.success) {
            (SyncOperation::Sync, true) => "Sync complete",
            (SyncOperation::Sync, false) => "Sync failed",
            (SyncOperation::Restore, true) => "Restore complete",
            (SyncOperation::Restore, false) => "Restore failed",
        };
        if !report.success {
            return Feedback::error(title, report.message);
        }
        if operation == SyncOperation::Restore {
            notebook.clear_undo();
        }
        Feedback::info(title, report.message)
    }
}

fn not_initialized() -> Feedback {
    Feedback::error("QuickNotes is not initialized", "Notes storage is unavailable.")
}

fn run_note_command(notebook: &mut NoteBook, command: Command) -> AppResult<Feedback> {
    match command {
        Command::List => {
            let notes = notebook.read_all()?;
            if notes.is_empty() {
                return Ok(Feedback::info("No notes yet", "Type any text to add your first note."));
            }
            Ok(Feedback::info(format!("{} notes", notes.len()), render_list(&pinned_first(notes))))
        }
        Command::Add(text) => {
            let note = notebook.create(&text)?;
            Ok(Feedback::info("Note saved", codec::strip_timestamp(&note.body)))
        }
        Command::Search(term) => search_feedback(&term, notebook.search(&term)?),
        Command::SearchTag(tag) => search_feedback(&tag, notebook.search_tag(&tag)?),
        Command::View(index) => {
            let note = notebook.view(index)?;
            Ok(Feedback::info(format!("Note #{}", index), render_note(&note)))
        }
        Command::Edit { index, text } => match notebook.edit(index, &text)? {
            Some(note) => Ok(Feedback::info(
                format!("Note #{} updated", index),
                codec::strip_timestamp(&note.body),
            )),
            None => Ok(Feedback::info(
                "No changes",
                format!("Note #{} already has that text.", index),
            )),
        },
        Command::Pin(index) => {
            let note = notebook.pin(index)?;
            Ok(Feedback::info(
                format!("Pinned note #{}", index),
                codec::strip_timestamp(&note.body),
            ))
        }
        Command::Unpin(index) => {
            let note = notebook.unpin(index)?;
            Ok(Feedback::info(
                format!("Unpinned note #{}", index),
                codec::strip_timestamp(&note.body),
            ))
        }
        Command::Delete { selector, confirmed } => {
            delete_feedback(notebook.delete(&selector, confirmed)?)
        }
        Command::DeleteAll { confirmed } => Ok(match notebook.delete_all(confirmed)? {
            DeleteAllOutcome::Empty => Feedback::info("No notes", "There is nothing to delete."),
            DeleteAllOutcome::NeedsConfirmation { count } => Feedback::info(
                "Confirm delete all",
                format!(
                    "This deletes all {} notes. A backup is made first.\n\
                     Run 'delall {}' to continue.",
                    count, CONFIRM_FLAG
                ),
            ),
            DeleteAllOutcome::Deleted { count, backup } => {
                let backup = backup
                    .map(|path| format!(" Backup: {}", path.display()))
                    .unwrap_or_default();
                Feedback::info("All notes deleted", format!("Deleted {} notes.{}", count, backup))
            }
        }),
        Command::Undo => Ok(match notebook.undo()? {
            Some(note) => Feedback::info(
                format!("Restored note #{}", note.display_index),
                codec::strip_timestamp(&note.body),
            ),
            None => Feedback::info("Nothing to undo", "No deleted note is waiting to be restored."),
        }),
        Command::Sort { field, direction } => {
            let count = notebook.sort(field, direction)?;
            if count == 0 {
                return Ok(Feedback::info("No notes", "There is nothing to sort."));
            }
            Ok(Feedback::info(
                "Notes sorted",
                format!("Sorted {} notes by {} ({}).", count, field.as_str(), direction.as_str()),
            ))
        }
        Command::Backup => {
            let path = notebook.backup()?;
            Ok(Feedback::info("Backup created", path.display().to_string()))
        }
        Command::Export => {
            let path = notebook.export()?;
            Ok(Feedback::info("Notes exported", path.display().to_string()))
        }
        Command::Help | Command::Sync | Command::Restore { .. } => Err(AppError::Internal(
            "command must be handled before note dispatch".to_string(),
        )),
    }
}

fn delete_feedback(outcome: DeleteOutcome) -> AppResult<Feedback> {
    Ok(match outcome {
        DeleteOutcome::NeedsConfirmation { candidate } => Feedback::info(
            "Confirm delete",
            format!(
                "{}\nRun 'del {} {}' to delete it.",
                render_note(&candidate),
                candidate.display_index,
                CONFIRM_FLAG
            ),
        ),
        DeleteOutcome::Ambiguous { kind, candidates } => {
            let title = match kind {
                MatchKind::Exact => "Several notes have that text",
                MatchKind::Partial => "Several notes match",
            };
            Feedback::info(
                title,
                format!("Delete by number instead:\n{}", render_list(&candidates)),
            )
        }
        DeleteOutcome::Deleted { record } => Feedback::info(
            "Note deleted",
            format!("{}\nRun 'undo' to bring it back.", codec::strip_timestamp(&record.body)),
        ),
    })
}

fn search_feedback(term: &str, hits: Vec<NoteRecord>) -> AppResult<Feedback> {
    if hits.is_empty() {
        return Err(AppError::NotFound(format!("No notes match '{}'.", term.trim())));
    }
    Ok(Feedback::info(
        format!("{} notes match '{}'", hits.len(), term.trim()),
        render_list(&hits),
    ))
}

/// Pinned notes first, each group in file order. Display indices stay as read.
pub fn pinned_first(notes: Vec<NoteRecord>) -> Vec<NoteRecord> {
    let (mut pinned, rest): (Vec<_>, Vec<_>) = notes.into_iter().partition(|note| note.is_pinned);
    pinned.extend(rest);
    pinned
}

fn render_list(notes: &[NoteRecord]) -> String {
    notes.iter().map(render_note).collect::<Vec<_>>().join("\n")
}

fn render_note(note: &NoteRecord) -> String {
    let marker = if note.is_pinned { "[pinned] " } else { "" };
    let text = codec::strip_timestamp(&note.body).replace('\n', "\n   ");
    match note.created_at {
        Some(created_at) => format!(
            "{}. {}{} ({})",
            note.display_index,
            marker,
            text,
            codec::format_timestamp(&created_at)
        ),
        None => format!("{}. {}{}", note.display_index, marker, text),
    }
}
