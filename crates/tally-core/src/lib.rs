//! # tally-core: Pure Business Logic for Tally POS
//!
//! Everything Tally knows about prices, carts, imports and reports lives
//! here as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    tally-cli (commands)                         │   │
//! │  │   product, stock, sale new, quote, import/export, report        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │  ┌────────┐ ┌─────────┐ ┌──────┐ ┌──────────┐ ┌───────────┐    │   │
//! │  │  │ types  │ │ pricing │ │ cart │ │ transfer │ │ analytics │    │   │
//! │  │  │ money  │ │  tiers  │ │      │ │ envelope │ │  receipt  │    │   │
//! │  │  └────────┘ └─────────┘ └──────┘ └──────────┘ └───────────┘    │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO FILES                               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-db (Database Layer)                    │   │
//! │  │         SQLite queries, migrations, repositories, transfer      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Product, Sale, StockMovement, ...)
//! - [`money`] - Integer money arithmetic
//! - [`pricing`] - Bulk tiers and per-line pricing
//! - [`cart`] - The in-progress sale and checkout
//! - [`transfer`] - Export envelope and import conflict resolution
//! - [`analytics`] - Sales and inventory reports
//! - [`receipt`] - Text receipts for thermal printers
//! - [`validation`] - Business rule validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::money::Money;
//! use tally_core::pricing::unit_price_for;
//! use tally_core::types::BulkPriceTier;
//!
//! let tiers = [BulkPriceTier::new(6, 90), BulkPriceTier::new(12, 80)];
//! let list = Money::from_cents(100);
//!
//! assert_eq!(unit_price_for(list, &tiers, 5).cents(), 100);
//! assert_eq!(unit_price_for(list, &tiers, 6).cents(), 90);
//! assert_eq!(unit_price_for(list, &tiers, 24).cents(), 80);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod analytics;
pub mod cart;
pub mod error;
pub mod money;
pub mod pricing;
pub mod receipt;
pub mod transfer;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartTotals, CheckoutDraft, Payment};
pub use error::{CoreError, CoreResult, TransferError, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line.
///
/// Catches typing 1000 instead of 10.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Highest unit price or cost, in minor units.
///
/// A full cart of lines at this price and `MAX_ITEM_QUANTITY` still fits in
/// an `i64`.
pub const MAX_PRICE_CENTS: i64 = 1_000_000_000_000;

/// Most digits a currency may show after the decimal point.
pub const MAX_CURRENCY_DECIMALS: u8 = 4;
