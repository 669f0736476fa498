//! # Config Command
//!
//! Shows the configuration in effect after env, file and defaults have
//! been merged.

use clap::Subcommand;
use serde_json::json;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
}

pub fn run(state: &AppState, command: ConfigCommand) -> Result<String, ApiError> {
    match command {
        ConfigCommand::Show => {
            let mut config = state.config.clone();
            config.database_path = Some(state.db_path.clone());

            if state.json {
                return Ok(serde_json::to_string_pretty(&json!({ "config": config }))?);
            }

            toml::to_string_pretty(&config)
                .map_err(|e| ApiError::internal(format!("Cannot render config: {}", e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::state;
    use crate::state::AppConfig;

    #[tokio::test]
    async fn test_show_round_trips_as_toml() {
        let state = state().await;
        let out = run(&state, ConfigCommand::Show).unwrap();

        let parsed: AppConfig = toml::from_str(&out).unwrap();
        assert_eq!(parsed.store_name, state.config.store_name);
        assert_eq!(parsed.receipt.paper_width, 42);
        assert_eq!(parsed.database_path, Some(state.db_path.clone()));
    }
}
