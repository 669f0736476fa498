//! # Application State
//!
//! Everything a command needs: configuration, the database and the
//! output mode.
//!
//! ```text
//! state/
//! ├── mod.rs     ◄─── AppState
//! ├── config.rs  ◄─── AppConfig (env > TOML > defaults)
//! └── db.rs      ◄─── database path resolution
//! ```

pub mod config;
pub mod db;

pub use config::{AppConfig, ConfigError};

use serde::Serialize;
use std::path::PathBuf;
use tally_core::Money;
use tally_db::Database;

use crate::error::ApiError;

/// Shared by every command handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: Database,
    /// Where `db` lives.
    pub db_path: PathBuf,
    /// Print JSON instead of text tables.
    pub json: bool,
}

impl AppState {
    pub fn new(config: AppConfig, db: Database, db_path: PathBuf, json: bool) -> Self {
        AppState {
            config,
            db,
            db_path,
            json,
        }
    }

    pub fn money(&self, amount: Money) -> String {
        self.config.money(amount)
    }

    pub fn cents(&self, cents: i64) -> String {
        self.config.format_currency(cents)
    }

    /// Renders `value` as pretty JSON in `--json` mode, else with `text`.
    pub fn render<T: Serialize>(
        &self,
        value: &T,
        text: impl FnOnce(&T) -> String,
    ) -> Result<String, ApiError> {
        if self.json {
            Ok(serde_json::to_string_pretty(value)?)
        } else {
            Ok(text(value))
        }
    }
}
