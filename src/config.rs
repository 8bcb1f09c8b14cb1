use crate::errors::{AppError, AppResult};
use crate::sync::{SyncSettings, DEFAULT_BRANCH};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const APP_DIR_NAME: &str = "QuickNotes";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const SETTINGS_PATH_ENV: &str = "QUICKNOTES_SETTINGS";
pub const CUSTOM_NOTES_PATH_ENV: &str = "QUICKNOTES_CUSTOM_PATH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub enable_git_sync: bool,
    pub notes_folder_path: String,
    pub git_repository_url: String,
    pub git_branch: String,
    pub git_username: String,
    pub git_email: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            enable_git_sync: false,
            notes_folder_path: String::new(),
            git_repository_url: String::new(),
            git_branch: DEFAULT_BRANCH.to_string(),
            git_username: String::new(),
            git_email: String::new(),
        }
    }
}

impl AppSettings {
    pub fn effective_branch(&self) -> String {
        match self.git_branch.trim() {
            "" => DEFAULT_BRANCH.to_string(),
            branch => branch.to_string(),
        }
    }

    pub fn notes_dir(&self) -> AppResult<PathBuf> {
        self.resolve_notes_dir_with(std::env::var(CUSTOM_NOTES_PATH_ENV).ok())
    }

    /// `notesFolderPath`, then the custom-path override, then the local data dir.
    pub fn resolve_notes_dir_with(&self, custom_path: Option<String>) -> AppResult<PathBuf> {
        if !self.notes_folder_path.trim().is_empty() {
            return Ok(PathBuf::from(self.notes_folder_path.trim()));
        }
        if let Some(custom) = custom_path.filter(|value| !value.trim().is_empty()) {
            return Ok(PathBuf::from(custom.trim()));
        }
        default_data_dir()
    }

    /// `None` when sync is switched off or no remote is set.
    pub fn sync_settings(&self) -> Option<SyncSettings> {
        if !self.enable_git_sync || self.git_repository_url.trim().is_empty() {
            return None;
        }
        Some(SyncSettings {
            remote_url: self.git_repository_url.trim().to_string(),
            branch: self.effective_branch(),
            user_name: non_blank(&self.git_username),
            user_email: non_blank(&self.git_email),
        })
    }
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

pub fn default_data_dir() -> AppResult<PathBuf> {
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| AppError::Config("could not resolve the local data directory".to_string()))
}

pub fn log_dir() -> AppResult<PathBuf> {
    Ok(default_data_dir()?.join("logs"))
}

/// JSON settings file. A missing file loads as defaults.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_store() -> AppResult<Self> {
        if let Ok(path) = std::env::var(SETTINGS_PATH_ENV) {
            if !path.trim().is_empty() {
                return Ok(Self::new(path.trim()));
            }
        }
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::Config("could not resolve the config directory".to_string()))?;
        Ok(Self::new(config_dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> AppResult<AppSettings> {
        if !self.path.exists() {
            return Ok(AppSettings::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(AppSettings::default());
        }
        serde_json::from_str(&raw).map_err(|error| {
            AppError::Config(format!("invalid settings file {}: {}", self.path.display(), error))
        })
    }

    pub fn save(&self, settings: &AppSettings) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, data)?;
        tracing::debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SettingsStore::new(dir.path().join("settings.json"));
        let settings = store.load().expect("load");
        assert_eq!(settings, AppSettings::default());
        assert_eq!(settings.effective_branch(), "main");
        assert!(settings.sync_settings().is_none());
    }

    #[test]
    fn partial_camel_case_json_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{
                "enableGitSync": true,
                "gitRepositoryUrl": "git@example.test:me/notes.git",
                "gitBranch": "  "
            }"#,
        )
        .expect("write settings");

        let settings = SettingsStore::new(&path).load().expect("load");
        assert!(settings.enable_git_sync);
        assert_eq!(settings.effective_branch(), "main");

        let sync = settings.sync_settings().expect("sync enabled");
        assert_eq!(sync.remote_url, "git@example.test:me/notes.git");
        assert_eq!(sync.user_name, None);
    }

    #[test]
    fn save_round_trips_adopted_branch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SettingsStore::new(dir.path().join("nested").join("settings.json"));
        let mut settings = AppSettings {
            enable_git_sync: true,
            git_repository_url: "https://example.test/notes.git".to_string(),
            ..AppSettings::default()
        };
        settings.git_branch = "master".to_string();
        store.save(&settings).expect("save");

        let raw = fs::read_to_string(store.path()).expect("read back");
        assert!(raw.contains("\"gitBranch\": \"master\""));
        assert_eq!(store.load().expect("load"), settings);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").expect("write");
        let error = SettingsStore::new(&path).load().expect_err("malformed");
        assert!(matches!(error, AppError::Config(_)));
    }

    #[test]
    fn notes_dir_prefers_setting_then_custom_path() {
        let mut settings = AppSettings::default();
        assert_eq!(
            settings
                .resolve_notes_dir_with(Some("/tmp/custom-notes".to_string()))
                .expect("custom"),
            PathBuf::from("/tmp/custom-notes")
        );

        settings.notes_folder_path = "/srv/notes".to_string();
        assert_eq!(
            settings
                .resolve_notes_dir_with(Some("/tmp/custom-notes".to_string()))
                .expect("configured"),
            PathBuf::from("/srv/notes")
        );
    }
}
