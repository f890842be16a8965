//! Tracing setup shared by every binary and test that embeds the board core.
//!
//! Console output is always on. Setting `BOARD_FILE_LOGGING=true` adds a JSON
//! layer that writes daily-rotated files under [`log_dir`]; `BOARD_LOG_MAX_FILES`
//! bounds how many of them are kept (default 7).

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::assets::log_dir;

const LOG_FILE_PREFIX: &str = "taskboard.log";

#[derive(Debug, Clone)]
pub struct FileLoggingConfig {
    pub enabled: bool,
    pub log_dir: PathBuf,
    pub max_files: usize,
}

impl FileLoggingConfig {
    pub fn from_env() -> Self {
        let enabled = std::env::var("BOARD_FILE_LOGGING")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let max_files = std::env::var("BOARD_LOG_MAX_FILES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(7);

        Self {
            enabled,
            log_dir: log_dir(),
            max_files,
        }
    }
}

fn filter_for(level: &str) -> EnvFilter {
    let directives = format!("warn,services={level},db={level},utils={level}");
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Meant for the host binary's startup; the library crates only emit events.
/// The returned guard flushes the file writer on drop and must be held for the
/// lifetime of the process. `None` means console-only logging.
pub fn init_logging(level: &str) -> Option<WorkerGuard> {
    let config = FileLoggingConfig::from_env();
    let console_layer = tracing_subscriber::fmt::layer().with_filter(filter_for(level));

    if !config.enabled {
        let _ = tracing_subscriber::registry()
            .with(console_layer)
            .try_init();
        return None;
    }

    if let Err(e) = std::fs::create_dir_all(&config.log_dir) {
        eprintln!("Failed to create log directory {:?}: {}", config.log_dir, e);
        let _ = tracing_subscriber::registry()
            .with(console_layer)
            .try_init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(filter_for(level));

    let _ = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init();

    tracing::info!(
        log_dir = ?config.log_dir,
        max_files = config.max_files,
        "File logging enabled"
    );

    let dir = config.log_dir.clone();
    let max_files = config.max_files;
    std::thread::spawn(move || prune_old_logs(&dir, max_files));

    Some(guard)
}

/// Subscriber for tests: captured by the test harness, `RUST_LOG` aware, and
/// safe to call from every test.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn prune_old_logs(dir: &Path, max_files: usize) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    let mut log_files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX))
        })
        .filter_map(|e| {
            e.metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(|t| (e.path(), t))
        })
        .collect();

    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.into_iter().skip(max_files) {
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(path = ?path, error = %e, "Failed to remove old log file");
        }
    }
}
