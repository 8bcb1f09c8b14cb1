use chrono::NaiveDateTime;
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::AppError;

/// One logical note as decoded from a single line of the backing file.
///
/// `display_index` is never persisted: it is the 1-based position of the record
/// within the read snapshot that produced it and becomes meaningless after any
/// mutation. Callers holding a display index must resolve it against a fresh
/// read on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteRecord {
    pub id: String,
    pub is_pinned: bool,
    pub created_at: Option<NaiveDateTime>,
    pub body: String,
    pub display_index: usize,
}

impl NoteRecord {
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_pinned: false,
            created_at: None,
            body: body.into(),
            display_index: 0,
        }
    }

    pub fn is_legacy(&self) -> bool {
        self.id.is_empty()
    }
}

/// Contents of the single-slot undo buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedRecord {
    pub line: String,
    pub was_pinned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    Text,
}

impl SortField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreatedAt => "date",
            Self::Text => "text",
        }
    }
}

impl FromStr for SortField {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "date" | "time" | "created" => Ok(Self::CreatedAt),
            "alpha" | "text" => Ok(Self::Text),
            other => Err(AppError::InvalidInput(format!(
                "Unknown sort field '{}'. Use 'sort date [asc|desc]' or 'sort alpha [asc|desc]'.",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            other => Err(AppError::InvalidInput(format!(
                "Unknown sort direction '{}'. Use 'asc' or 'desc'.",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Partial,
}

/// Result of a delete request. Only `Deleted` mutates the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    NeedsConfirmation { candidate: NoteRecord },
    Ambiguous { kind: MatchKind, candidates: Vec<NoteRecord> },
    Deleted { record: NoteRecord },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteAllOutcome {
    Empty,
    NeedsConfirmation { count: usize },
    Deleted { count: usize, backup: Option<PathBuf> },
}

/// Title plus message shown to the user for every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub title: String,
    pub message: String,
    pub is_error: bool,
}

impl Feedback {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            is_error: false,
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            is_error: true,
        }
    }
}

impl From<AppError> for Feedback {
    fn from(value: AppError) -> Self {
        Self::error(value.title(), value.detail())
    }
}

/// Final result of a sync or restore run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub success: bool,
    pub message: String,
    pub adopted_branch: Option<String>,
}

impl SyncReport {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            adopted_branch: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            adopted_branch: None,
        }
    }
}
