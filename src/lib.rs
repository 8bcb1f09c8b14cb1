pub mod codec;
pub mod commands;
pub mod config;
pub mod errors;
pub mod models;
pub mod notes;
pub mod store;
pub mod sync;
pub mod vcs;

use crate::commands::{App, Command};
use crate::config::SettingsStore;
use crate::models::Feedback;
use anyhow::Context;
use crate::vcs::git::GitCli;
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

pub fn run() {
    match try_run() {
        Ok(feedback) => {
            print_feedback(&feedback);
            if feedback.is_error {
                std::process::exit(1);
            }
        }
        Err(error) => {
            eprintln!("QuickNotes could not start\n{:#}", error);
            std::process::exit(1);
        }
    }
}

fn try_run() -> anyhow::Result<Feedback> {
    let settings_store =
        SettingsStore::default_store().context("failed to locate the settings file")?;
    let settings = settings_store
        .load()
        .with_context(|| format!("failed to load {}", settings_store.path().display()))?;
    match config::log_dir() {
        Ok(log_dir) => {
            if let Err(error) = init_tracing(&log_dir) {
                eprintln!("logging disabled: {}", error);
            }
        }
        Err(error) => eprintln!("logging disabled: {}", error.detail()),
    }

    let input = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let command = match Command::parse(&input) {
        Ok(command) => command,
        Err(error) => return Ok(Feedback::from(error)),
    };
    tracing::info!(command = ?command, "command received");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let mut app =
        App::open(settings, Arc::new(GitCli::default())).with_settings_store(settings_store);
    Ok(runtime.block_on(app.execute(command, |line| println!("  {}", line))))
}

fn print_feedback(feedback: &Feedback) {
    if feedback.is_error {
        eprintln!("{}\n{}", feedback.title, feedback.message);
    } else {
        println!("{}\n{}", feedback.title, feedback.message);
    }
}

pub fn init_tracing(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "quick-notes.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
