use crate::codec::{self, TIMESTAMP_TOKEN_LEN};
use crate::errors::{AppError, AppResult};
use crate::models::{
    DeleteAllOutcome, DeleteOutcome, DeletedRecord, MatchKind, NoteRecord, SortDirection, SortField,
};
use crate::store::NoteStore;
use chrono::{Local, NaiveDateTime, Timelike};
use std::cmp::Ordering;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use uuid::Uuid;

/// How a delete request names its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Index(usize),
    Text(String),
}

impl Selector {
    /// Positive integers select by display index; anything else is matched as text.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<usize>() {
            Ok(index) if index > 0 => Self::Index(index),
            _ => Self::Text(raw.trim().to_string()),
        }
    }
}

/// Mutation engine over a [`NoteStore`].
///
/// Display indices handed out by [`NoteBook::read_all`] are only valid for that
/// snapshot. Every method taking a display index re-reads the file, resolves
/// the index to a record, then relocates the record's physical line by id.
#[derive(Debug)]
pub struct NoteBook {
    store: NoteStore,
    undo: Option<DeletedRecord>,
}

impl NoteBook {
    pub fn new(store: NoteStore) -> Self {
        Self { store, undo: None }
    }

    pub fn store(&self) -> &NoteStore {
        &self.store
    }

    pub fn undo_slot(&self) -> Option<&DeletedRecord> {
        self.undo.as_ref()
    }

    /// Forgets the undo slot, e.g. after the file was replaced from outside.
    pub fn clear_undo(&mut self) {
        self.undo = None;
    }

    pub fn read_all(&self) -> AppResult<Vec<NoteRecord>> {
        let raw = self.store.read_raw()?;
        Ok(decode_snapshot(&raw))
    }

    pub fn create(&mut self, text: &str) -> AppResult<NoteRecord> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::InvalidInput("Note text cannot be empty".to_string()));
        }

        let now = now_to_second();
        let body = format!("[{}] {}", codec::format_timestamp(&now), codec::encode_multiline(text));
        let record = NoteRecord {
            id: new_note_id(),
            is_pinned: false,
            created_at: Some(now),
            body,
            display_index: 0,
        };
        self.store.append(&codec::encode(&record))?;
        self.undo = None;
        tracing::info!(note_id = %record.id, "note created");
        Ok(record)
    }

    pub fn view(&self, display_index: usize) -> AppResult<NoteRecord> {
        let notes = self.read_all()?;
        resolve_index(&notes, display_index).cloned()
    }

    pub fn search(&self, term: &str) -> AppResult<Vec<NoteRecord>> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return Err(AppError::InvalidInput("Search term cannot be empty".to_string()));
        }
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|note| note.body.to_lowercase().contains(&needle))
            .collect())
    }

    pub fn search_tag(&self, tag: &str) -> AppResult<Vec<NoteRecord>> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(AppError::InvalidInput("Tag cannot be empty".to_string()));
        }
        if tag.starts_with('#') {
            self.search(tag)
        } else {
            self.search(&format!("#{}", tag))
        }
    }

    /// Replaces the text of a note, keeping its creation timestamp token.
    /// Returns `None` when the new text equals the current one.
    pub fn edit(&mut self, display_index: usize, new_text: &str) -> AppResult<Option<NoteRecord>> {
        let new_text = new_text.trim();
        if new_text.is_empty() {
            return Err(AppError::InvalidInput("New note text cannot be empty".to_string()));
        }

        let notes = self.read_all()?;
        let mut target = resolve_index(&notes, display_index)?.clone();
        if codec::strip_timestamp(&target.body) == new_text {
            return Ok(None);
        }

        let mut raw = self.store.read_raw()?;
        let position = locate_line(&raw, &target).ok_or_else(changed_concurrently)?;

        let prefix = match target.created_at {
            Some(_) if codec::timestamp_token(&target.body).is_some() => {
                target.body[..TIMESTAMP_TOKEN_LEN].to_string()
            }
            _ => String::new(),
        };
        target.body = format!("{}{}", prefix, codec::encode_multiline(new_text));
        raw[position] = codec::encode(&target);
        self.store.write_all(&raw)?;
        self.undo = None;
        tracing::info!(note_id = %target.id, "note edited");
        Ok(Some(target))
    }

    pub fn pin(&mut self, display_index: usize) -> AppResult<NoteRecord> {
        self.set_pinned(display_index, true)
    }

    pub fn unpin(&mut self, display_index: usize) -> AppResult<NoteRecord> {
        self.set_pinned(display_index, false)
    }

    pub fn set_pinned(&mut self, display_index: usize, pinned: bool) -> AppResult<NoteRecord> {
        let notes = self.read_all()?;
        let target = resolve_index(&notes, display_index)?;

        let mut raw = self.store.read_raw()?;
        let position = locate_line(&raw, target).ok_or_else(changed_concurrently)?;

        let mut updated = codec::decode(&raw[position]);
        updated.is_pinned = pinned;
        updated.display_index = target.display_index;
        raw[position] = codec::encode(&updated);
        self.store.write_all(&raw)?;
        self.undo = None;
        tracing::info!(note_id = %updated.id, pinned, "note pin state changed");
        Ok(updated)
    }

    /// Rewrites the file in the requested order. Notes without a timestamp sort
    /// as the most recent; text order compares the whole body, timestamp token
    /// included, ignoring case. Ties keep their current file order.
    pub fn sort(&mut self, field: SortField, direction: SortDirection) -> AppResult<usize> {
        let mut notes = self.read_all()?;
        if notes.is_empty() {
            return Ok(0);
        }

        notes.sort_by(|a, b| {
            let ordering = compare_notes(a, b, field);
            match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });

        let lines = notes.iter().map(codec::encode).collect::<Vec<_>>();
        self.store.write_all(&lines)?;
        self.undo = None;
        tracing::info!(
            field = field.as_str(),
            direction = direction.as_str(),
            count = lines.len(),
            "notes sorted"
        );
        Ok(lines.len())
    }

    /// Deletes by display index or by text. Text selectors try an exact match on
    /// the note text (timestamp and tags stripped) before falling back to a
    /// substring match; several hits produce a disambiguation list instead of
    /// a deletion. Nothing is removed unless `confirmed` is set.
    pub fn delete(&mut self, selector: &Selector, confirmed: bool) -> AppResult<DeleteOutcome> {
        let notes = self.read_all()?;

        let candidate = match selector {
            Selector::Index(index) => resolve_index(&notes, *index)?.clone(),
            Selector::Text(text) => {
                let query = text.trim().to_lowercase();
                if query.is_empty() {
                    return Err(AppError::InvalidInput(
                        "Specify a note number or text to delete".to_string(),
                    ));
                }
                match find_by_text(&notes, &query) {
                    TextMatch::One(record) => record,
                    TextMatch::Many(kind, candidates) => {
                        return Ok(DeleteOutcome::Ambiguous { kind, candidates });
                    }
                    TextMatch::None => {
                        return Err(AppError::NotFound(format!(
                            "No note with content '{}' was found. \
                             Try using the note number instead.",
                            text.trim()
                        )));
                    }
                }
            }
        };

        if !confirmed {
            return Ok(DeleteOutcome::NeedsConfirmation { candidate });
        }

        let mut raw = self.store.read_raw()?;
        let position = locate_line(&raw, &candidate).ok_or_else(|| {
            AppError::NotFound(
                "The note was not found in the file. It may have been deleted already.".to_string(),
            )
        })?;

        let removed = raw.remove(position);
        self.store.write_all(&raw)?;
        self.undo = Some(DeletedRecord {
            line: removed,
            was_pinned: candidate.is_pinned,
        });
        tracing::info!(note_id = %candidate.id, "note deleted");
        Ok(DeleteOutcome::Deleted { record: candidate })
    }

    /// Re-appends the last deleted note at the end of the file.
    /// Returns `None` when there is nothing to undo.
    pub fn undo(&mut self) -> AppResult<Option<NoteRecord>> {
        let Some(deleted) = self.undo.clone() else {
            return Ok(None);
        };

        let mut raw = self.store.read_raw()?;
        raw.push(deleted.line.clone());
        self.store.write_all(&raw)?;
        self.undo = None;

        let restored_line = deleted.line.trim();
        let restored = self
            .read_all()?
            .into_iter()
            .rev()
            .find(|note| {
                codec::encode(note) == restored_line && note.is_pinned == deleted.was_pinned
            })
            .unwrap_or_else(|| codec::decode(&deleted.line));
        tracing::info!(note_id = %restored.id, "note restored from undo slot");
        Ok(Some(restored))
    }

    /// Removes every note after a timestamped backup. Not undoable.
    pub fn delete_all(&mut self, confirmed: bool) -> AppResult<DeleteAllOutcome> {
        let count = self.read_all()?.len();
        if count == 0 {
            return Ok(DeleteAllOutcome::Empty);
        }
        if !confirmed {
            return Ok(DeleteAllOutcome::NeedsConfirmation { count });
        }

        let backup = self.store.snapshot()?;
        self.store.write_all(&[])?;
        self.undo = None;
        tracing::warn!(count, "all notes deleted");
        Ok(DeleteAllOutcome::Deleted { count, backup })
    }

    pub fn backup(&self) -> AppResult<PathBuf> {
        self.store
            .snapshot()?
            .ok_or_else(|| AppError::NotFound("The notes file doesn't exist.".to_string()))
    }

    /// Writes a copy of all notes without identity tags.
    pub fn export(&self) -> AppResult<PathBuf> {
        let notes = self.read_all()?;
        if notes.is_empty() {
            return Err(AppError::NotFound("Your notes file is empty.".to_string()));
        }

        let target = self
            .store
            .directory()
            .join(format!("notes_export_{}.txt", Local::now().format("%Y%m%d_%H%M%S")));
        let file = fs::File::create(&target)?;
        let mut writer = BufWriter::new(file);
        for note in &notes {
            if note.is_pinned {
                write!(writer, "{} ", codec::PINNED_TAG)?;
            }
            writeln!(writer, "{}", note.body)?;
        }
        writer.flush()?;
        tracing::info!(path = %target.display(), count = notes.len(), "notes exported");
        Ok(target)
    }
}

enum TextMatch {
    One(NoteRecord),
    Many(MatchKind, Vec<NoteRecord>),
    None,
}

fn find_by_text(notes: &[NoteRecord], query: &str) -> TextMatch {
    let stripped = notes
        .iter()
        .map(|note| (note, codec::strip_timestamp_and_tags(&note.body).to_lowercase()))
        .collect::<Vec<_>>();

    for kind in [MatchKind::Exact, MatchKind::Partial] {
        let mut hits = stripped
            .iter()
            .filter(|(_, text)| match kind {
                MatchKind::Exact => text == query,
                MatchKind::Partial => text.contains(query),
            })
            .map(|(note, _)| (*note).clone())
            .collect::<Vec<_>>();
        match hits.len() {
            0 => continue,
            1 => return TextMatch::One(hits.remove(0)),
            _ => return TextMatch::Many(kind, hits),
        }
    }
    TextMatch::None
}

/// Decodes non-blank lines and numbers them 1..N in file order.
pub fn decode_snapshot(raw: &[String]) -> Vec<NoteRecord> {
    raw.iter()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(position, line)| {
            let mut record = codec::decode(line);
            record.display_index = position + 1;
            record
        })
        .collect()
}

pub fn resolve_index(notes: &[NoteRecord], display_index: usize) -> AppResult<&NoteRecord> {
    notes
        .iter()
        .find(|note| note.display_index == display_index)
        .ok_or_else(|| AppError::NoteNotFound {
            index: display_index,
            available: notes.iter().map(|note| note.display_index).collect(),
        })
}

/// Finds the physical line holding `record`: by identity tag when it has one,
/// otherwise by its full encoded content.
pub fn locate_line(raw: &[String], record: &NoteRecord) -> Option<usize> {
    if record.is_legacy() {
        let encoded = codec::encode(record);
        return raw.iter().position(|line| {
            let decoded = codec::decode(line);
            decoded.is_legacy() && codec::encode(&decoded) == encoded
        });
    }
    let tag = codec::id_tag(&record.id);
    raw.iter().position(|line| line.trim_start().starts_with(&tag))
}

fn compare_notes(a: &NoteRecord, b: &NoteRecord, field: SortField) -> Ordering {
    match field {
        SortField::CreatedAt => {
            let left = a.created_at.unwrap_or(NaiveDateTime::MAX);
            let right = b.created_at.unwrap_or(NaiveDateTime::MAX);
            left.cmp(&right)
        }
        SortField::Text => a.body.to_lowercase().cmp(&b.body.to_lowercase()),
    }
}

fn changed_concurrently() -> AppError {
    AppError::NotFound(
        "Could not find the note in the file. It may have changed; refresh and retry.".to_string(),
    )
}

fn new_note_id() -> String {
    format!("Q{}", Uuid::new_v4().simple())
}

fn now_to_second() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}
