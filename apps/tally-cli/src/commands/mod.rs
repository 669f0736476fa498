//! # CLI Commands Module
//!
//! One module per command group. Every handler takes the shared
//! [`AppState`] and returns the text to print, so handlers can be tested
//! without capturing stdout.
//!
//! ## Command Organization
//! ```text
//! commands/
//! ├── mod.rs       ◄─── You are here (shared helpers)
//! ├── product.rs   ◄─── product add|list|search|show|update|delete|low-stock
//! ├── party.rs     ◄─── category / supplier / customer add|list|delete
//! ├── stock.rs     ◄─── stock receive|adjust|history
//! ├── sale.rs      ◄─── sale new|list|show|void|receipt, quote
//! ├── transfer.rs  ◄─── export, import
//! ├── report.rs    ◄─── report (text, JSON, --xlsx)
//! └── config.rs    ◄─── config show
//! ```
//!
//! ## Handler Shape
//! ```text
//! tally product show 5449000000996
//!        │
//!        ▼
//! lib.rs dispatch ──► product::run(&state, ProductCommand::Show { .. })
//!        │                    │
//!        │                    ▼
//!        │            db.products().lookup(..)  ──► Result<String, ApiError>
//!        ▼
//! stdout (text or --json)
//! ```

pub mod config;
pub mod party;
pub mod product;
pub mod report;
pub mod sale;
pub mod stock;
pub mod transfer;

use std::str::FromStr;
use tally_core::pricing::LineDiscount;
use tally_core::{Product, ValidationError};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Lookups
// =============================================================================

/// Finds a product by id, barcode or exact name.
pub(crate) async fn find_product(state: &AppState, code: &str) -> Result<Product, ApiError> {
    state
        .db
        .products()
        .lookup(code)
        .await?
        .ok_or_else(|| ApiError::not_found("Product", code))
}

/// Resolves an optional category name/id to an id.
pub(crate) async fn category_id(
    state: &AppState,
    key: Option<&str>,
) -> Result<Option<String>, ApiError> {
    match key {
        None => Ok(None),
        Some(key) => state
            .db
            .categories()
            .lookup(key)
            .await?
            .map(|c| Some(c.id))
            .ok_or_else(|| ApiError::not_found("Category", key)),
    }
}

/// Resolves an optional supplier name/id to an id.
pub(crate) async fn supplier_id(
    state: &AppState,
    key: Option<&str>,
) -> Result<Option<String>, ApiError> {
    match key {
        None => Ok(None),
        Some(key) => state
            .db
            .suppliers()
            .lookup(key)
            .await?
            .map(|s| Some(s.id))
            .ok_or_else(|| ApiError::not_found("Supplier", key)),
    }
}

// =============================================================================
// Cart Line Argument
// =============================================================================

/// A cart line typed as `CODE:QTY[:DISCOUNT]`.
///
/// `CODE` is a product id, barcode or exact name; `QTY` defaults to 1;
/// `DISCOUNT` is cents (`250`) or a percentage (`10%`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLineArg {
    pub code: String,
    pub quantity: i64,
    pub discount: Option<LineDiscount>,
}

impl FromStr for CartLineArg {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "line".to_string(),
            reason: format!("'{}': {}", s, reason),
        };

        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        let (code, quantity, discount) = match parts.as_slice() {
            [code] => (*code, None, None),
            [code, qty] => (*code, Some(*qty), None),
            [code, qty, discount] => (*code, Some(*qty), Some(*discount)),
            _ => return Err(invalid("expected CODE:QTY[:DISCOUNT]")),
        };

        if code.is_empty() {
            return Err(invalid("missing product code"));
        }

        let quantity = match quantity {
            None => 1,
            Some(q) => q
                .parse::<i64>()
                .map_err(|_| invalid("quantity is not a whole number"))?,
        };

        let discount = discount
            .filter(|d| !d.is_empty())
            .map(LineDiscount::parse)
            .transpose()?;

        Ok(CartLineArg {
            code: code.to_string(),
            quantity,
            discount,
        })
    }
}

// =============================================================================
// Text Output
// =============================================================================

/// Left-aligned text table. Columns listed in `right` are right-aligned.
pub(crate) fn table(headers: &[&str], rows: &[Vec<String>], right: &[usize]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let line = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let width = widths.get(i).copied().unwrap_or_default();
                if right.contains(&i) {
                    format!("{:>width$}", cell, width = width)
                } else {
                    format!("{:<width$}", cell, width = width)
                }
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = vec![line(headers.to_vec())];
    out.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in rows {
        out.push(line(row.iter().map(String::as_str).collect()));
    }
    out.join("\n")
}

/// `label: value` lines with the labels padded to the same width.
pub(crate) fn fields(pairs: &[(&str, String)]) -> String {
    let width = pairs.iter().map(|(k, _)| k.len()).max().unwrap_or_default();
    pairs
        .iter()
        .map(|(k, v)| format!("{:<width$}  {}", format!("{}:", k), v, width = width + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn or_dash(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::state::{AppConfig, AppState};
    use tally_db::{Database, DbConfig};

    /// Fresh in-memory store with default config and text output.
    pub async fn state() -> AppState {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        AppState::new(AppConfig::default(), db, ":memory:".into(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::Money;

    #[test]
    fn test_cart_line_forms() {
        let line: CartLineArg = "5449000000996".parse().unwrap();
        assert_eq!(line.quantity, 1);
        assert_eq!(line.discount, None);

        let line: CartLineArg = "Cola 330ml:6".parse().unwrap();
        assert_eq!(line.code, "Cola 330ml");
        assert_eq!(line.quantity, 6);

        let line: CartLineArg = "cola:2:250".parse().unwrap();
        assert_eq!(line.discount, Some(LineDiscount::Amount(Money::from_cents(250))));

        let line: CartLineArg = "cola:2:10%".parse().unwrap();
        assert_eq!(line.discount, Some(LineDiscount::Percent(1000)));
    }

    #[test]
    fn test_cart_line_rejects_garbage() {
        assert!("cola:two".parse::<CartLineArg>().is_err());
        assert!(":3".parse::<CartLineArg>().is_err());
        assert!("cola:1:5:6".parse::<CartLineArg>().is_err());
        assert!("cola:1:150%".parse::<CartLineArg>().is_err());
    }

    #[test]
    fn test_table_alignment() {
        let out = table(
            &["Name", "Qty"],
            &[
                vec!["Cola".to_string(), "6".to_string()],
                vec!["Bread".to_string(), "12".to_string()],
            ],
            &[1],
        );
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Name   Qty");
        assert_eq!(lines[1], "-----  ---");
        assert_eq!(lines[2], "Cola     6");
        assert_eq!(lines[3], "Bread   12");
    }
}
