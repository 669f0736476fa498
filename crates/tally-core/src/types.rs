//! # Domain Types
//!
//! Core domain types used throughout Tally POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │  StockMovement  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  product_id     │       │
//! │  │  barcode        │   │  receipt_number │   │  type in/out    │       │
//! │  │  price/cost     │   │  customer_id    │   │  quantity, cost │       │
//! │  │  bulk_pricing   │   │  items ──────┐  │   │  supplier_id    │       │
//! │  └──────┬──────────┘   └──────────────┼──┘   └─────────────────┘       │
//! │         │ category_id, supplier_id    ▼                                 │
//! │  ┌──────┴──────┐ ┌──────────┐  ┌─────────────┐  ┌──────────┐           │
//! │  │  Category   │ │ Supplier │  │  SaleItem   │  │ Customer │           │
//! │  └─────────────┘ └──────────┘  └─────────────┘  └──────────┘           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records serialize with snake_case keys; this is also the shape of the
//! `data` payload inside export files. Optional fields default when missing
//! so that hand-edited import files stay readable.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (825 = 8.25%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a percentage (for config files).
    pub fn from_percentage(pct: f64) -> Self {
        TaxRate((pct * 100.0).round().max(0.0) as u32)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

/// Tax calculation mode for the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TaxMode {
    /// Price + tax shown separately.
    #[default]
    Exclusive,
    /// Price includes tax.
    Inclusive,
}

// =============================================================================
// Bulk Pricing Tier
// =============================================================================

/// A quantity break: at `min_quantity` units or more, each unit costs
/// `unit_price_cents`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BulkPriceTier {
    pub min_quantity: i64,
    pub unit_price_cents: i64,
}

impl BulkPriceTier {
    pub const fn new(min_quantity: i64, unit_price_cents: i64) -> Self {
        BulkPriceTier {
            min_quantity,
            unit_price_cents,
        }
    }

    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product available for sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4). Blank in import files means "new".
    #[serde(default)]
    pub id: String,

    /// Display name shown on screen and on receipt.
    pub name: String,

    /// Barcode (EAN-13, UPC-A, ...), scanned or typed.
    #[serde(default)]
    pub barcode: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// List price in cents.
    pub price_cents: i64,

    /// Latest purchase cost in cents (for profit reports).
    #[serde(default)]
    pub cost_cents: i64,

    /// Units on hand. Never negative.
    #[serde(default)]
    pub quantity: i64,

    /// Reorder threshold; at or below this the product is "low stock".
    #[serde(default)]
    pub min_stock: i64,

    #[serde(default)]
    pub category_id: Option<String>,

    #[serde(default)]
    pub supplier_id: Option<String>,

    /// Quantity breaks, ascending by `min_quantity`.
    #[serde(default)]
    pub bulk_pricing: Vec<BulkPriceTier>,

    #[serde(default = "Utc::now")]
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }

    /// Checks if `quantity` units can be taken from stock.
    pub fn can_sell(&self, quantity: i64) -> bool {
        quantity <= self.quantity
    }

    /// Low stock means some left but at or below the reorder threshold.
    pub fn is_low_stock(&self) -> bool {
        self.quantity > 0 && self.quantity <= self.min_stock
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.quantity <= 0
    }

    pub fn has_bulk_pricing(&self) -> bool {
        !self.bulk_pricing.is_empty()
    }
}

// =============================================================================
// Category / Supplier / Customer
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Category {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "Utc::now")]
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Supplier {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "Utc::now")]
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "Utc::now")]
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    /// Store credit / customer tab.
    Credit,
}

impl PaymentMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Credit => "credit",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" | "credit_card" | "debit" => Ok(PaymentMethod::Card),
            "transfer" | "bank" => Ok(PaymentMethod::Transfer),
            "credit" | "tab" => Ok(PaymentMethod::Credit),
            other => Err(ValidationError::InvalidFormat {
                field: "payment_method".to_string(),
                reason: format!("unknown method '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Completed,
    Voided,
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaleStatus::Completed => f.write_str("completed"),
            SaleStatus::Voided => f.write_str("voided"),
        }
    }
}

/// A recorded sale transaction.
///
/// `gross - bulk_savings - discount = subtotal`; `total` adds exclusive tax
/// (or equals `subtotal` when prices include tax).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub receipt_number: String,
    pub customer_id: Option<String>,
    pub payment_method: PaymentMethod,
    pub status: SaleStatus,
    pub gross_cents: i64,
    pub bulk_savings_cents: i64,
    pub discount_cents: i64,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub amount_tendered_cents: i64,
    pub change_cents: i64,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub voided_at: Option<DateTime<Utc>>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    pub fn is_voided(&self) -> bool {
        self.status == SaleStatus::Voided
    }
}

/// A line item in a sale. Product data is frozen at time of sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    /// Effective unit price after any bulk tier or override.
    pub unit_price_cents: i64,
    /// List price at the time of sale.
    pub base_price_cents: i64,
    /// Unit cost at the time of sale.
    pub cost_cents: i64,
    /// Manual discount, including this line's share of any cart discount.
    pub discount_cents: i64,
    /// `unit_price × quantity − discount`.
    pub subtotal_cents: i64,
    /// Threshold of the bulk tier that set `unit_price_cents`. `None` for
    /// the list price or a manual price.
    #[serde(default)]
    pub tier_min_quantity: Option<i64>,
}

impl SaleItem {
    /// Savings against the list price from a tier or a lower manual price.
    pub fn bulk_savings(&self) -> Money {
        Money::from_cents((self.base_price_cents - self.unit_price_cents).max(0) * self.quantity)
    }

    pub fn cost_of_goods(&self) -> Money {
        Money::from_cents(self.cost_cents * self.quantity)
    }
}

/// A sale together with its line items (for reports and receipts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleWithItems {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
}

// =============================================================================
// Stock Movement
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockReason {
    /// Goods received from a supplier.
    Purchase,
    Sale,
    /// Manual count correction, damage, loss.
    Adjustment,
    /// Stock returned when a sale is voided.
    Void,
    /// Opening stock of a product created by a data import.
    Import,
}

/// A ledger entry recording inventory received or consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub product_id: String,
    pub movement_type: MovementType,
    /// Always positive; direction is `movement_type`.
    pub quantity: i64,
    pub unit_cost_cents: Option<i64>,
    pub supplier_id: Option<String>,
    pub reason: StockReason,
    /// Related record, e.g. the sale id.
    pub reference: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    /// Signed quantity change applied to the product.
    pub fn delta(&self) -> i64 {
        match self.movement_type {
            MovementType::In => self.quantity,
            MovementType::Out => -self.quantity,
        }
    }

    /// Total cost of the movement, when a unit cost was recorded.
    pub fn total_cost(&self) -> Option<Money> {
        self.unit_cost_cents
            .map(|c| Money::from_cents(c * self.quantity))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(quantity: i64, min_stock: i64) -> Product {
        Product {
            id: "p1".to_string(),
            name: "Cola".to_string(),
            barcode: None,
            description: None,
            price_cents: 150,
            cost_cents: 90,
            quantity,
            min_stock,
            category_id: None,
            supplier_id: None,
            bulk_pricing: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_tax_rate_from_percentage() {
        assert_eq!(TaxRate::from_percentage(8.25).bps(), 825);
        assert!((TaxRate::from_bps(825).percentage() - 8.25).abs() < 0.001);
    }

    #[test]
    fn test_stock_levels() {
        assert!(product(3, 5).is_low_stock());
        assert!(!product(0, 5).is_low_stock());
        assert!(product(0, 5).is_out_of_stock());
        assert!(!product(10, 5).is_low_stock());
        assert!(product(10, 5).can_sell(10));
        assert!(!product(10, 5).can_sell(11));
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!("Cash".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cash);
        assert_eq!("debit".parse::<PaymentMethod>().unwrap(), PaymentMethod::Card);
        assert!("bitcoin".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_product_deserializes_with_defaults() {
        let json = r#"{"name": "Rice 1kg", "price_cents": 250}"#;
        let p: Product = serde_json::from_str(json).unwrap();
        assert!(p.id.is_empty());
        assert_eq!(p.quantity, 0);
        assert!(p.bulk_pricing.is_empty());
    }

    #[test]
    fn test_movement_delta() {
        let movement = StockMovement {
            id: "m1".to_string(),
            product_id: "p1".to_string(),
            movement_type: MovementType::Out,
            quantity: 4,
            unit_cost_cents: Some(90),
            supplier_id: None,
            reason: StockReason::Sale,
            reference: None,
            notes: None,
            created_at: Utc::now(),
        };
        assert_eq!(movement.delta(), -4);
        assert_eq!(movement.total_cost(), Some(Money::from_cents(360)));
    }
}
