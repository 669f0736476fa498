//! # Repository Module
//!
//! Database repository implementations for Tally POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CLI command                                                           │
//! │       │  db.products().search("cola", 20)                              │
//! │       ▼                                                                 │
//! │  ProductRepository                                                     │
//! │  ├── search(&self, query, limit)                                       │
//! │  ├── get_by_id(&self, id)                                              │
//! │  ├── insert(&self, product)                                            │
//! │  └── update(&self, product)                                            │
//! │       │  SQL                                                            │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writes that must share a transaction with other tables (sale completion,
//! stock receipt, import) are also exposed as `*_on(conn, ..)` functions
//! taking a `&mut SqliteConnection`, so callers can pass `&mut *tx`.
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Product CRUD, search, barcode lookup
//! - [`category::CategoryRepository`]
//! - [`supplier::SupplierRepository`]
//! - [`customer::CustomerRepository`]
//! - [`sale::SaleRepository`] - Recording and voiding sales
//! - [`stock::StockRepository`] - Receiving, adjustments, movement ledger

pub mod category;
pub mod customer;
pub mod product;
pub mod sale;
pub mod stock;
pub mod supplier;

use crate::error::DbError;

/// Converts a sqlx error, filling in the offending value when it is a
/// UNIQUE violation on `column`.
pub(crate) fn unique_on(err: sqlx::Error, column: &str, value: &str) -> DbError {
    match DbError::from(err) {
        DbError::UniqueViolation { field, .. } if field.ends_with(column) => {
            DbError::duplicate(column, value)
        }
        other => other,
    }
}

/// Builds a `LIKE` pattern matching `query` anywhere, with `%`, `_` and `\`
/// escaped (use with `ESCAPE '\'`).
pub(crate) fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Trims an optional text field, mapping blank to `None`.
pub(crate) fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("cola"), "%cola%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_clean() {
        assert_eq!(clean(&Some("  x ".to_string())), Some("x".to_string()));
        assert_eq!(clean(&Some("   ".to_string())), None);
        assert_eq!(clean(&None), None);
    }
}
