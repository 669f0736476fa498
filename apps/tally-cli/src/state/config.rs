//! # Configuration State
//!
//! Stores application configuration loaded at startup.
//!
//! ## Configuration Sources (Priority Order)
//! 1. Environment variables (`TALLY_*`)
//! 2. Config file (`config.toml`, from `--config`, `TALLY_CONFIG` or the
//!    platform config folder)
//! 3. Defaults (this file)
//!
//! ## Example `config.toml`
//! ```toml
//! store_name = "Corner Shop"
//! store_address = ["12 High Street", "Springfield"]
//! currency_symbol = "€"
//! default_tax_rate_bps = 2000
//! tax_mode = "inclusive"
//!
//! [receipt]
//! paper_width = 32
//! footer = ["Thank you!", "No refunds without receipt"]
//! ```

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tally_core::receipt::ReceiptLayout;
use tally_core::{Money, TaxMode, TaxRate, ValidationError};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "TALLY_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnv { var: String, value: String },

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Application configuration.
///
/// ## Fields
/// Every field has a default so a missing or partial config file works.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Store name (first receipt header line)
    pub store_name: String,

    /// Store address lines (for receipts)
    pub store_address: Vec<String>,

    /// Currency symbol (for display)
    pub currency_symbol: String,

    /// Number of decimal places for currency
    pub currency_decimals: u8,

    /// Default tax rate in basis points
    /// e.g., 825 = 8.25%
    pub default_tax_rate_bps: u32,

    pub tax_mode: TaxMode,

    /// Database file. `None` means the platform data folder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// Receipt printer configuration
    pub receipt: PrinterConfig,
}

/// Printer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    /// Paper width in characters (32, 42, or 48)
    pub paper_width: usize,

    /// Lines printed under the totals
    pub footer: Vec<String>,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        PrinterConfig {
            paper_width: 42,
            footer: vec!["Thank you for shopping with us!".to_string()],
        }
    }
}

impl Default for AppConfig {
    /// Returns default configuration suitable for development.
    ///
    /// ## Default Values
    /// - Store: "Tally POS Store"
    /// - Currency: $ with 2 decimals
    /// - Tax: none, exclusive
    /// - Receipt: 42 columns
    fn default() -> Self {
        AppConfig {
            store_name: "Tally POS Store".to_string(),
            store_address: Vec::new(),
            currency_symbol: "$".to_string(),
            currency_decimals: 2,
            default_tax_rate_bps: 0,
            tax_mode: TaxMode::Exclusive,
            database_path: None,
            receipt: PrinterConfig::default(),
        }
    }
}

/// Platform folders for config and data, e.g. `~/.config/tally` on Linux.
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "tally", "pos")
}

impl AppConfig {
    /// Loads configuration from file and environment.
    ///
    /// `explicit` (from `--config`) wins over `TALLY_CONFIG`; both must exist.
    /// The platform config file is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);

        let mut config = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => AppConfig::from_file(&path)?,
            None => match project_dirs().map(|dirs| dirs.config_dir().join("config.toml")) {
                Some(path) if path.exists() => AppConfig::from_file(&path)?,
                _ => AppConfig::default(),
            },
        };

        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Loading config file");

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies environment overrides.
    ///
    /// ## Environment Variables
    /// - `TALLY_DB_PATH`: Database file
    /// - `TALLY_STORE_NAME`: Override store name
    /// - `TALLY_TAX_RATE`: Override default tax rate (e.g., "8.25")
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(path) = lookup("TALLY_DB_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }

        if let Some(store_name) = lookup("TALLY_STORE_NAME") {
            self.store_name = store_name;
        }

        if let Some(rate) = lookup("TALLY_TAX_RATE") {
            let pct = rate
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|pct| (0.0..=100.0).contains(pct))
                .ok_or_else(|| ConfigError::InvalidEnv {
                    var: "TALLY_TAX_RATE".to_string(),
                    value: rate.clone(),
                })?;
            self.default_tax_rate_bps = TaxRate::from_percentage(pct).bps();
        }

        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        tally_core::validation::validate_tax_rate_bps(self.default_tax_rate_bps)?;
        tally_core::validation::validate_currency_decimals(self.currency_decimals)?;
        self.receipt_layout()?;
        Ok(())
    }

    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.default_tax_rate_bps)
    }

    /// Receipt layout with the store header and printer settings.
    pub fn receipt_layout(&self) -> Result<ReceiptLayout, ValidationError> {
        let mut header = vec![self.store_name.clone()];
        header.extend(self.store_address.iter().cloned());

        Ok(ReceiptLayout::new(self.receipt.paper_width)?
            .with_header(header)
            .with_footer(self.receipt.footer.clone())
            .with_currency(self.currency_symbol.clone(), self.currency_decimals))
    }

    /// Formats a cent amount as a currency string.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let config = AppConfig::default();
    /// assert_eq!(config.format_currency(1234), "$12.34");
    /// ```
    pub fn format_currency(&self, cents: i64) -> String {
        Money::from_cents(cents).format_minor(&self.currency_symbol, self.currency_decimals)
    }

    pub fn money(&self, amount: Money) -> String {
        self.format_currency(amount.cents())
    }

    /// Parses an amount typed in major units ("12.5", "$3", "0.99") into
    /// minor units using `currency_decimals`.
    pub fn parse_amount(&self, input: &str) -> Result<Money, ValidationError> {
        let invalid = || ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: format!("'{}' is not an amount", input),
        };

        let text = input.trim();
        let text = text.strip_prefix(self.currency_symbol.as_str()).unwrap_or(text);
        let (negative, text) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let decimals = self.currency_decimals as usize;
        let (whole, frac) = text.split_once('.').unwrap_or((text, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if frac.len() > decimals
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let frac: i64 = if frac.is_empty() {
            0
        } else {
            format!("{:0<width$}", frac, width = decimals)
                .parse()
                .map_err(|_| invalid())?
        };

        let scale = 10_i64.checked_pow(decimals as u32).ok_or_else(invalid)?;
        let cents = whole
            .checked_mul(scale)
            .and_then(|c| c.checked_add(frac))
            .ok_or_else(invalid)?;

        Ok(Money::from_cents(if negative { -cents } else { cents }))
    }
}
