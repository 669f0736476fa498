//! # Database State
//!
//! Resolves where the database file lives and opens it.
//!
//! ## Path Resolution (Priority Order)
//! 1. `--db <file>` on the command line
//! 2. `TALLY_DB_PATH` or `database_path` in the config file
//! 3. `<platform data dir>/tally.db`, e.g. `~/.local/share/tally/tally.db`
//! 4. `./tally.db` when no home directory is known

use std::path::{Path, PathBuf};
use tally_db::{Database, DbConfig};
use tracing::info;

use super::config::{project_dirs, AppConfig};
use crate::error::ApiError;

pub fn resolve_db_path(cli_override: Option<&Path>, config: &AppConfig) -> PathBuf {
    if let Some(path) = cli_override {
        return path.to_path_buf();
    }

    if let Some(path) = &config.database_path {
        return path.clone();
    }

    match project_dirs() {
        Some(dirs) => dirs.data_dir().join("tally.db"),
        None => PathBuf::from("tally.db"),
    }
}

/// Opens (creating if needed) the database and applies migrations.
pub async fn open_database(path: &Path) -> Result<Database, ApiError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            ApiError::io(format!("Cannot create {}: {}", parent.display(), e))
        })?;
    }

    info!(path = %path.display(), "Opening database");
    Ok(Database::new(DbConfig::new(path)).await?)
}
