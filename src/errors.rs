use thiserror::Error;

#[cfg(windows)]
const ERROR_SHARING_VIOLATION: i32 = 32;
#[cfg(windows)]
const ERROR_LOCK_VIOLATION: i32 = 33;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
    #[error("NOT_FOUND: note #{index} does not exist (available: {})", format_indices(.available))]
    NoteNotFound { index: usize, available: Vec<usize> },
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("FILE_LOCKED: {0}")]
    FileLocked(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("GIT_FAILURE: {0}")]
    Git(String),
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    /// Short user-facing title for the failure.
    pub fn title(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "Invalid input",
            Self::NoteNotFound { .. } | Self::NotFound(_) => "Note not found",
            Self::FileLocked(_) => "File in use",
            Self::Io(_) => "File error",
            Self::Git(_) => "Git sync failed",
            Self::Config(_) => "Configuration error",
            Self::Internal(_) => "Unexpected error",
        }
    }

    /// Message without the error code prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::NoteNotFound { index, available } if available.is_empty() => {
                format!("Note #{} does not exist. There are no notes yet.", index)
            }
            Self::NoteNotFound { index, available } => {
                format!(
                    "Note #{} does not exist.\nAvailable: {}",
                    index,
                    format_indices(available)
                )
            }
            Self::InvalidInput(message)
            | Self::NotFound(message)
            | Self::FileLocked(message)
            | Self::Io(message)
            | Self::Git(message)
            | Self::Config(message)
            | Self::Internal(message) => message.clone(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::FileLocked(_))
    }
}

fn format_indices(indices: &[usize]) -> String {
    indices
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn is_sharing_violation(error: &std::io::Error) -> bool {
    if error.kind() == std::io::ErrorKind::WouldBlock {
        return true;
    }
    #[cfg(windows)]
    {
        matches!(
            error.raw_os_error(),
            Some(ERROR_SHARING_VIOLATION) | Some(ERROR_LOCK_VIOLATION)
        )
    }
    #[cfg(not(windows))]
    {
        false
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        if is_sharing_violation(&value) {
            Self::FileLocked(format!(
                "Notes file is used by another process. Please try again shortly. ({})",
                value
            ))
        } else {
            Self::Io(value.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn not_found_lists_available_indices() {
        let error = AppError::NoteNotFound {
            index: 3,
            available: vec![1, 2],
        };
        assert_eq!(
            error.to_string(),
            "NOT_FOUND: note #3 does not exist (available: 1, 2)"
        );
        assert!(error.detail().contains("Available: 1, 2"));
        assert_eq!(error.title(), "Note not found");
    }

    #[test]
    fn would_block_is_reported_as_retryable_lock() {
        let io = std::io::Error::new(std::io::ErrorKind::WouldBlock, "busy");
        let error = AppError::from(io);
        assert!(error.is_retryable());
        assert!(error.to_string().starts_with("FILE_LOCKED"));

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let other = AppError::from(denied);
        assert!(!other.is_retryable());
        assert!(other.to_string().starts_with("IO_FAILURE"));
    }
}
