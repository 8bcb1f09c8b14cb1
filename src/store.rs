use crate::errors::{AppError, AppResult};
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const NOTES_FILE_NAME: &str = "notes.txt";

/// Owns the backing file. Every mutation goes through [`NoteStore::write_all`]
/// except note creation, which appends.
#[derive(Debug, Clone)]
pub struct NoteStore {
    path: PathBuf,
}

impl NoteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates the notes directory and an empty backing file if needed, then
    /// checks the file accepts appends.
    pub fn open(directory: &Path) -> AppResult<Self> {
        fs::create_dir_all(directory)?;
        let store = Self::new(directory.join(NOTES_FILE_NAME));
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&store.path)?;
        tracing::debug!(path = %store.path.display(), "notes file ready");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| NOTES_FILE_NAME.to_string())
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".bak");
        PathBuf::from(name)
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Physical lines in file order, blank lines included. A missing file reads as empty.
    pub fn read_raw(&self) -> AppResult<Vec<String>> {
        read_lines(&self.path)
    }

    /// Replaces the whole file. The previous content is copied to `<file>.bak`
    /// first on a best-effort basis; the new content is staged in a sibling temp
    /// file and swapped in so readers see either the old or the new file.
    pub fn write_all(&self, lines: &[String]) -> AppResult<()> {
        if self.path.exists() {
            if let Err(error) = fs::copy(&self.path, self.backup_path()) {
                tracing::warn!(
                    path = %self.backup_path().display(),
                    error = %error,
                    "failed to refresh notes backup; continuing with rewrite"
                );
            }
        }

        let directory = self.directory();
        fs::create_dir_all(directory)?;
        let staged = tempfile::Builder::new()
            .prefix(".notes-")
            .suffix(".tmp")
            .tempfile_in(directory)?;
        {
            let mut writer = BufWriter::new(staged.as_file());
            for line in lines.iter().filter(|line| !line.trim().is_empty()) {
                writeln!(writer, "{}", line)?;
            }
            writer.flush()?;
        }
        staged.as_file().sync_all()?;
        staged
            .persist(&self.path)
            .map_err(|error| AppError::from(error.error))?;

        tracing::debug!(path = %self.path.display(), lines = lines.len(), "notes file rewritten");
        Ok(())
    }

    /// Appends one record without touching the rest of the file.
    pub fn append(&self, line: &str) -> AppResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        let needs_separator = match file.metadata()?.len() {
            0 => false,
            len => {
                file.seek(SeekFrom::Start(len - 1))?;
                let mut last = [0u8; 1];
                file.read_exact(&mut last)?;
                last[0] != b'\n'
            }
        };

        let mut payload = String::with_capacity(line.len() + 2);
        if needs_separator {
            payload.push('\n');
        }
        payload.push_str(line);
        payload.push('\n');
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Copies the file to `notes_backup_<timestamp>.txt` beside it.
    /// Returns `None` when there is nothing to back up.
    pub fn snapshot(&self) -> AppResult<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let target = self.directory().join(format!(
            "notes_backup_{}.txt",
            Local::now().format("%Y%m%d_%H%M%S")
        ));
        fs::copy(&self.path, &target)?;
        tracing::info!(path = %target.display(), "notes snapshot created");
        Ok(Some(target))
    }
}

/// Reads lines without taking any lock so concurrent readers and writers never block us.
pub fn read_lines(path: &Path) -> AppResult<Vec<String>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(AppError::from(error)),
    };
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let decoded = String::from_utf8_lossy(&bytes);
    let content = decoded.strip_prefix('\u{feff}').unwrap_or(&decoded);
    Ok(content.lines().map(str::to_string).collect())
}
