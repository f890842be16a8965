use std::path::{Path, PathBuf};

use directories::ProjectDirs;

const PROJECT_ROOT: &str = env!("CARGO_MANIFEST_DIR");

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn ensure_dir(path: &Path) {
    if !path.exists()
        && let Err(e) = std::fs::create_dir_all(path)
    {
        tracing::warn!(path = %path.display(), error = %e, "Failed to create directory");
    }
}

/// Root directory for the database, config and log files.
///
/// Respects `BOARD_ASSET_DIR`. Debug builds default to `dev_assets/` at the
/// workspace root so development never touches the real data directory.
pub fn asset_dir() -> PathBuf {
    let path = if let Ok(dir) = std::env::var("BOARD_ASSET_DIR") {
        expand_tilde(&dir)
    } else if cfg!(debug_assertions) {
        PathBuf::from(PROJECT_ROOT).join("../../dev_assets")
    } else {
        ProjectDirs::from("world", "openflow", "taskboard")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    };

    ensure_dir(&path);
    path
}

/// Get the configuration directory path.
///
/// Respects the `BOARD_CONFIG_DIR` environment variable. Default: `{asset_dir}`
pub fn config_dir() -> PathBuf {
    if let Ok(path) = std::env::var("BOARD_CONFIG_DIR") {
        let expanded = expand_tilde(&path);
        ensure_dir(&expanded);
        return expanded;
    }
    asset_dir()
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Get the database file path.
///
/// Respects the `BOARD_DATABASE_PATH` environment variable for custom locations.
///
/// Default: `{asset_dir}/db.sqlite`
pub fn database_path() -> PathBuf {
    if let Ok(path) = std::env::var("BOARD_DATABASE_PATH") {
        return expand_tilde(&path);
    }
    asset_dir().join("db.sqlite")
}

/// Directory for rolling log files. Respects `BOARD_LOG_DIR`.
pub fn log_dir() -> PathBuf {
    if let Ok(path) = std::env::var("BOARD_LOG_DIR") {
        return expand_tilde(&path);
    }
    asset_dir().join("logs")
}
