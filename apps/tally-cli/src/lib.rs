//! # Tally POS Command Line
//!
//! Command-line front end over `tally-core` and `tally-db`.
//!
//! ## Startup Sequence
//! 1. Parse arguments (clap)
//! 2. Initialize tracing (logging to stderr)
//! 3. Load configuration (env > TOML file > defaults)
//! 4. Resolve the database path, connect & run migrations
//! 5. Dispatch the command, print its output
//!
//! ## Example Session
//! ```text
//! $ tally category add Beverages
//! $ tally product add "Cola 330ml" --barcode 5449000000996 --price 1.50 \
//!       --cost 0.90 --quantity 48 --category Beverages --tiers 6@135,12@120
//! $ tally quote 5449000000996:12
//! $ tally sale new 5449000000996:12 --payment cash --tendered 20 --print
//! $ tally report --period week --xlsx week.xlsx
//! ```

pub mod commands;
pub mod error;
pub mod state;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use commands::party::{CategoryCommand, CustomerCommand, SupplierCommand};
use commands::product::ProductCommand;
use commands::report::ReportArgs;
use commands::sale::{CartArgs, SaleCommand};
use commands::stock::StockCommand;
use commands::transfer::{ExportArgs, ImportArgs};
use commands::config::ConfigCommand;
use error::ApiError;
use state::{db, AppConfig, AppState};

// =============================================================================
// Command Line
// =============================================================================

#[derive(Debug, Parser)]
#[command(name = "tally", version, about = "Tally POS - point of sale for small shops")]
pub struct Cli {
    /// Config file (default: platform config folder, or TALLY_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file (default: TALLY_DB_PATH, config, or platform data folder)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage the product catalog
    #[command(subcommand)]
    Product(ProductCommand),

    /// Manage product categories
    #[command(subcommand)]
    Category(CategoryCommand),

    /// Manage suppliers
    #[command(subcommand)]
    Supplier(SupplierCommand),

    /// Manage customers
    #[command(subcommand)]
    Customer(CustomerCommand),

    /// Receive, adjust and audit stock
    #[command(subcommand)]
    Stock(StockCommand),

    /// Record and look up sales
    #[command(subcommand)]
    Sale(SaleCommand),

    /// Price a cart without recording a sale
    Quote(CartArgs),

    /// Write data to a JSON file
    Export(ExportArgs),

    /// Load data from a JSON file
    Import(ImportArgs),

    /// Sales and inventory report
    Report(ReportArgs),

    /// Show configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

// =============================================================================
// Setup
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - All debug messages
/// - `RUST_LOG=tally=debug` - Debug for tally crates only
/// - `RUST_LOG=info` - Info and above
///
/// Logs go to stderr so command output on stdout stays pipeable.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,tally=info,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Loads config, opens the database and runs one command.
pub async fn run(cli: Cli) -> Result<String, ApiError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let db_path = db::resolve_db_path(cli.db.as_deref(), &config);
    let database = db::open_database(&db_path).await?;

    debug!(command = ?cli.command, "Dispatching");
    let state = AppState::new(config, database, db_path, cli.json);
    let result = dispatch(&state, cli.command).await;
    state.db.close().await;
    result
}

pub async fn dispatch(state: &AppState, command: Command) -> Result<String, ApiError> {
    match command {
        Command::Product(cmd) => commands::product::run(state, cmd).await,
        Command::Category(cmd) => commands::party::run_category(state, cmd).await,
        Command::Supplier(cmd) => commands::party::run_supplier(state, cmd).await,
        Command::Customer(cmd) => commands::party::run_customer(state, cmd).await,
        Command::Stock(cmd) => commands::stock::run(state, cmd).await,
        Command::Sale(cmd) => commands::sale::run(state, cmd).await,
        Command::Quote(args) => commands::sale::quote(state, args).await,
        Command::Export(args) => commands::transfer::export(state, args).await,
        Command::Import(args) => commands::transfer::import(state, args).await,
        Command::Report(args) => commands::report::run(state, args).await,
        Command::Config(cmd) => commands::config::run(state, cmd),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sale_line() {
        let cli = Cli::try_parse_from([
            "tally",
            "--json",
            "sale",
            "new",
            "cola:6",
            "bread:1:10%",
            "--payment",
            "card",
            "--discount",
            "5%",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Command::Sale(SaleCommand::New(new)) => {
                assert_eq!(new.cart.lines.len(), 2);
                assert_eq!(new.payment, tally_core::PaymentMethod::Card);
                assert!(new.cart.discount.is_some());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_negative_adjustment_parses() {
        let cli = Cli::try_parse_from(["tally", "stock", "adjust", "bread", "-3"]).unwrap();
        match cli.command {
            Command::Stock(StockCommand::Adjust { delta, .. }) => assert_eq!(delta, -3),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_bad_period_rejected() {
        assert!(Cli::try_parse_from(["tally", "report", "--period", "fortnight"]).is_err());
        assert!(Cli::try_parse_from(["tally", "report", "--from", "2026-01-01"]).is_err());
    }
}
