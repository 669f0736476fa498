//! # Bulk Pricing
//!
//! Quantity-break pricing and manual line discounts.
//!
//! ## How a Line Is Priced
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Product: Water 600ml   list $1.00                                      │
//! │  Tiers:   6+ → $0.90    12+ → $0.80    24+ → $0.70                      │
//! │                                                                         │
//! │  Quantity 14                                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  applicable_tier: highest min_quantity ≤ 14  →  12+ @ $0.80             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  gross   = $1.00 × 14 = $14.00                                          │
//! │  tiered  = $0.80 × 14 = $11.20     bulk savings = $2.80                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  manual discount 10% of tiered = $1.12                                  │
//! │  subtotal = $11.20 − $1.12 = $10.08                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::BulkPriceTier;
use crate::validation::{validate_discount_bps, ValidationResult};

// =============================================================================
// Tier Lookup
// =============================================================================

/// Returns the tier with the highest `min_quantity` at or below `quantity`.
///
/// Tiers need not be sorted. A non-positive quantity never qualifies.
///
/// ```rust
/// use tally_core::pricing::applicable_tier;
/// use tally_core::types::BulkPriceTier;
///
/// let tiers = [BulkPriceTier::new(12, 80), BulkPriceTier::new(6, 90)];
/// assert_eq!(applicable_tier(&tiers, 5), None);
/// assert_eq!(applicable_tier(&tiers, 6).unwrap().unit_price_cents, 90);
/// assert_eq!(applicable_tier(&tiers, 14).unwrap().unit_price_cents, 80);
/// ```
pub fn applicable_tier(tiers: &[BulkPriceTier], quantity: i64) -> Option<&BulkPriceTier> {
    if quantity <= 0 {
        return None;
    }

    tiers
        .iter()
        .filter(|t| t.min_quantity <= quantity)
        .max_by_key(|t| t.min_quantity)
}

/// Unit price for `quantity` units: the applicable tier's price, or the
/// base price when no tier applies.
pub fn unit_price_for(base_price: Money, tiers: &[BulkPriceTier], quantity: i64) -> Money {
    applicable_tier(tiers, quantity)
        .map(BulkPriceTier::unit_price)
        .unwrap_or(base_price)
}

/// Checks tier thresholds are ≥ 1 and unique, and prices are not negative.
pub fn validate_tiers(tiers: &[BulkPriceTier]) -> ValidationResult<()> {
    for (i, tier) in tiers.iter().enumerate() {
        if tier.min_quantity < 1 {
            return Err(ValidationError::MustBePositive {
                field: "bulk_pricing.min_quantity".to_string(),
            });
        }
        crate::validation::validate_price("bulk_pricing.unit_price", tier.unit_price_cents)?;
        if tiers[..i].iter().any(|t| t.min_quantity == tier.min_quantity) {
            return Err(ValidationError::Duplicate {
                field: "bulk_pricing.min_quantity".to_string(),
                value: tier.min_quantity.to_string(),
            });
        }
    }

    Ok(())
}

/// Returns the tiers sorted ascending by threshold.
pub fn normalize_tiers(mut tiers: Vec<BulkPriceTier>) -> Vec<BulkPriceTier> {
    tiers.sort_by_key(|t| t.min_quantity);
    tiers
}

/// Parses a tier list written as `QTY@CENTS,QTY@CENTS` (e.g. `6@90,12@80`).
pub fn parse_tiers(spec: &str) -> ValidationResult<Vec<BulkPriceTier>> {
    let invalid = |part: &str| ValidationError::InvalidFormat {
        field: "bulk_pricing".to_string(),
        reason: format!("'{}' is not QTY@PRICE_CENTS", part),
    };

    let mut tiers = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (qty, price) = part.split_once('@').ok_or_else(|| invalid(part))?;
        let min_quantity = qty.trim().parse::<i64>().map_err(|_| invalid(part))?;
        let unit_price_cents = price.trim().parse::<i64>().map_err(|_| invalid(part))?;
        tiers.push(BulkPriceTier::new(min_quantity, unit_price_cents));
    }

    validate_tiers(&tiers)?;
    Ok(normalize_tiers(tiers))
}

// =============================================================================
// Manual Discounts
// =============================================================================

/// A discount entered by the cashier, on a line or on the whole cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LineDiscount {
    /// Fixed amount off.
    Amount(Money),
    /// Percentage in basis points (1000 = 10%).
    Percent(u32),
}

impl LineDiscount {
    /// Resolves the discount against `base`, clamped to `[0, base]`.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    /// use tally_core::pricing::LineDiscount;
    ///
    /// let base = Money::from_cents(500);
    /// assert_eq!(LineDiscount::Percent(1000).resolve(base).cents(), 50);
    /// assert_eq!(LineDiscount::Amount(Money::from_cents(900)).resolve(base).cents(), 500);
    /// ```
    pub fn resolve(&self, base: Money) -> Money {
        let raw = match self {
            LineDiscount::Amount(amount) => *amount,
            LineDiscount::Percent(bps) => base.percentage(*bps),
        };
        raw.clamp_between(Money::zero(), base.max(Money::zero()))
    }

    pub fn validate(&self) -> ValidationResult<()> {
        match self {
            LineDiscount::Amount(amount) if amount.is_negative() => Err(ValidationError::Negative {
                field: "discount".to_string(),
            }),
            LineDiscount::Amount(_) => Ok(()),
            LineDiscount::Percent(bps) => validate_discount_bps(*bps),
        }
    }

    /// Parses `250` (cents) or `10%` / `12.5%`.
    pub fn parse(input: &str) -> ValidationResult<Self> {
        let input = input.trim();
        let invalid = || ValidationError::InvalidFormat {
            field: "discount".to_string(),
            reason: format!("'{}' is neither cents nor a percentage", input),
        };

        let discount = if let Some(pct) = input.strip_suffix('%') {
            let pct: f64 = pct.trim().parse().map_err(|_| invalid())?;
            if !(0.0..=100.0).contains(&pct) {
                return Err(invalid());
            }
            LineDiscount::Percent((pct * 100.0).round() as u32)
        } else {
            LineDiscount::Amount(Money::from_cents(input.parse().map_err(|_| invalid())?))
        };

        discount.validate()?;
        Ok(discount)
    }
}

// =============================================================================
// Line Pricing
// =============================================================================

/// Fully priced cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LinePricing {
    pub quantity: i64,
    /// List price per unit.
    pub base_unit_price: Money,
    /// Price per unit actually charged.
    pub unit_price: Money,
    /// Tier that set `unit_price`, if any.
    pub tier: Option<BulkPriceTier>,
    /// `base_unit_price × quantity`.
    pub gross: Money,
    /// `unit_price × quantity`.
    pub tiered: Money,
    /// `gross − tiered` (never negative).
    pub bulk_savings: Money,
    pub discount: Money,
    /// `tiered − discount`.
    pub subtotal: Money,
}

impl LinePricing {
    /// Everything the customer saved on this line.
    pub fn total_savings(&self) -> Money {
        self.bulk_savings + self.discount
    }
}

/// Prices one line.
///
/// `price_override`, when set, replaces both the list price and any tier.
/// A tier priced above the list price still applies (the store chose it),
/// but it contributes no savings.
pub fn price_line(
    base_price: Money,
    tiers: &[BulkPriceTier],
    quantity: i64,
    price_override: Option<Money>,
    discount: Option<LineDiscount>,
) -> LinePricing {
    let quantity = quantity.max(0);
    let (unit_price, tier) = match price_override {
        Some(price) => (price, None),
        None => match applicable_tier(tiers, quantity) {
            Some(t) => (t.unit_price(), Some(*t)),
            None => (base_price, None),
        },
    };

    let gross = base_price * quantity;
    let tiered = unit_price * quantity;
    let bulk_savings = (gross - tiered).max(Money::zero());
    let discount = discount
        .map(|d| d.resolve(tiered))
        .unwrap_or_default();

    LinePricing {
        quantity,
        base_unit_price: base_price,
        unit_price,
        tier,
        gross,
        tiered,
        bulk_savings,
        discount,
        subtotal: tiered - discount,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
