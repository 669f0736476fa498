//! # Cart
//!
//! The in-progress sale: lines, bulk tier reconciliation, discounts,
//! totals, and conversion into sale records at checkout.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Operator Action         Cart Method              Effect                │
//! │  ───────────────         ───────────              ──────                │
//! │  Scan / pick product ──► add_product()     ──► push line or qty += n    │
//! │  Change quantity ──────► set_quantity()    ──► unit price re-derived    │
//! │                                                from tiers (0 removes)   │
//! │  Type a price ─────────► override_price()  ──► tiers ignored for line   │
//! │  Line discount ────────► set_line_discount()                            │
//! │  Cart discount ────────► set_cart_discount()                            │
//! │  Pay ──────────────────► checkout()        ──► CheckoutDraft            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A line never stores a computed unit price. Pricing is derived from the
//! snapshot (list price + tiers) and the current quantity every time, so a
//! quantity change can move the line into or out of a tier without any
//! bookkeeping.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::pricing::{price_line, LineDiscount, LinePricing};
use crate::types::{
    BulkPriceTier, PaymentMethod, Product, Sale, SaleItem, SaleStatus, SaleWithItems, TaxMode,
    TaxRate,
};
use crate::validation::{validate_cart_size, validate_quantity};
use crate::MAX_ITEM_QUANTITY;

// =============================================================================
// Cart Line
// =============================================================================

/// One product in the cart, with product data frozen when it was added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub name: String,
    pub base_price: Money,
    pub cost: Money,
    pub bulk_pricing: Vec<BulkPriceTier>,
    /// Stock on hand when the line was last refreshed.
    pub available: i64,
    pub quantity: i64,
    pub price_override: Option<Money>,
    pub discount: Option<LineDiscount>,
}

impl CartLine {
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        CartLine {
            product_id: product.id.clone(),
            name: product.name.clone(),
            base_price: product.price(),
            cost: product.cost(),
            bulk_pricing: product.bulk_pricing.clone(),
            available: product.quantity,
            quantity,
            price_override: None,
            discount: None,
        }
    }

    pub fn pricing(&self) -> LinePricing {
        price_line(
            self.base_price,
            &self.bulk_pricing,
            self.quantity,
            self.price_override,
            self.discount,
        )
    }
}

// =============================================================================
// Totals
// =============================================================================

/// Cart totals summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartTotals {
    pub item_count: usize,
    pub total_quantity: i64,
    /// List price × quantity over all lines.
    pub gross: Money,
    pub bulk_savings: Money,
    pub line_discounts: Money,
    pub cart_discount: Money,
    /// After tiers and all discounts, before exclusive tax.
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub total_savings: Money,
}

// =============================================================================
// Checkout
// =============================================================================

/// Payment details captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub method: PaymentMethod,
    /// Cash handed over. `None` means exact amount.
    pub tendered: Option<Money>,
}

/// One priced line as it will be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLine {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub base_price: Money,
    pub cost: Money,
    /// Line discount plus this line's share of the cart discount.
    pub discount: Money,
    pub subtotal: Money,
    pub tier: Option<BulkPriceTier>,
}

/// A validated, fully priced sale ready to be persisted.
///
/// ## Invariant
/// `Σ lines.subtotal == subtotal`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutDraft {
    pub customer_id: Option<String>,
    pub payment_method: PaymentMethod,
    pub gross: Money,
    pub bulk_savings: Money,
    pub discount: Money,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub tendered: Money,
    pub change: Money,
    pub notes: Option<String>,
    pub lines: Vec<CheckoutLine>,
}

impl CheckoutDraft {
    /// Builds the sale header and item records with fresh ids.
    pub fn into_records(self, receipt_number: String, now: DateTime<Utc>) -> SaleWithItems {
        let sale_id = Uuid::new_v4().to_string();

        let items = self
            .lines
            .into_iter()
            .map(|line| SaleItem {
                id: Uuid::new_v4().to_string(),
                sale_id: sale_id.clone(),
                product_id: line.product_id,
                product_name: line.product_name,
                quantity: line.quantity,
                unit_price_cents: line.unit_price.cents(),
                base_price_cents: line.base_price.cents(),
                cost_cents: line.cost.cents(),
                discount_cents: line.discount.cents(),
                subtotal_cents: line.subtotal.cents(),
                tier_min_quantity: line.tier.map(|t| t.min_quantity),
            })
            .collect();

        let sale = Sale {
            id: sale_id,
            receipt_number,
            customer_id: self.customer_id,
            payment_method: self.payment_method,
            status: SaleStatus::Completed,
            gross_cents: self.gross.cents(),
            bulk_savings_cents: self.bulk_savings.cents(),
            discount_cents: self.discount.cents(),
            subtotal_cents: self.subtotal.cents(),
            tax_cents: self.tax.cents(),
            total_cents: self.total.cents(),
            amount_tendered_cents: self.tendered.cents(),
            change_cents: self.change.cents(),
            notes: self.notes,
            created_at: now,
            voided_at: None,
        };

        SaleWithItems { sale, items }
    }
}

/// Formats a receipt number as `YYYYMMDD-NNNN` for the `seq`-th sale of the
/// day.
///
/// ```rust
/// use chrono::NaiveDate;
/// use tally_core::cart::format_receipt_number;
///
/// let day = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
/// assert_eq!(format_receipt_number(day, 12), "20260307-0012");
/// ```
pub fn format_receipt_number(date: NaiveDate, seq: u32) -> String {
    format!("{}-{:04}", date.format("%Y%m%d"), seq)
}

// =============================================================================
// Cart
// =============================================================================

/// The shopping cart.
///
/// ## Invariants
/// - Lines are unique by `product_id` (adding the same product adds quantity)
/// - Every line quantity is in `1..=MAX_ITEM_QUANTITY`
/// - At most `MAX_CART_ITEMS` lines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
    cart_discount: Option<LineDiscount>,
    pub customer_id: Option<String>,
    pub notes: Option<String>,
}

impl Cart {
    pub fn new() -> Self {
        Cart::default()
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn line(&self, product_id: &str) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    fn line_mut(&mut self, product_id: &str) -> CoreResult<&mut CartLine> {
        self.lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or_else(|| CoreError::NotInCart(product_id.to_string()))
    }

    /// Adds a product or increases the quantity of its existing line.
    pub fn add_product(&mut self, product: &Product, quantity: i64) -> CoreResult<()> {
        validate_quantity(quantity)?;

        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product.id) {
            let new_qty = line.quantity + quantity;
            if new_qty > MAX_ITEM_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: new_qty,
                    max: MAX_ITEM_QUANTITY,
                });
            }
            ensure_stock(product, new_qty)?;
            line.quantity = new_qty;
            line.available = product.quantity;
            return Ok(());
        }

        validate_cart_size(self.lines.len())?;
        ensure_stock(product, quantity)?;
        self.lines.push(CartLine::from_product(product, quantity));
        Ok(())
    }

    /// Sets a line's quantity. Zero removes the line.
    ///
    /// The unit price follows the new quantity through the bulk tiers
    /// unless the line has a manual price override.
    pub fn set_quantity(&mut self, product_id: &str, quantity: i64) -> CoreResult<()> {
        if quantity == 0 {
            return self.remove(product_id);
        }
        validate_quantity(quantity)?;

        let line = self.line_mut(product_id)?;
        if quantity > line.available {
            return Err(CoreError::InsufficientStock {
                product: line.name.clone(),
                available: line.available,
                requested: quantity,
            });
        }
        line.quantity = quantity;
        Ok(())
    }

    /// Refreshes a line's snapshot from current product data (price, tiers,
    /// stock), keeping quantity, override and discount.
    pub fn refresh_product(&mut self, product: &Product) -> CoreResult<()> {
        let line = self.line_mut(&product.id)?;
        let quantity = line.quantity;
        let price_override = line.price_override;
        let discount = line.discount;

        *line = CartLine::from_product(product, quantity);
        line.price_override = price_override;
        line.discount = discount;
        Ok(())
    }

    pub fn override_price(&mut self, product_id: &str, price: Money) -> CoreResult<()> {
        crate::validation::validate_price("price", price.cents())?;
        self.line_mut(product_id)?.price_override = Some(price);
        Ok(())
    }

    pub fn clear_price_override(&mut self, product_id: &str) -> CoreResult<()> {
        self.line_mut(product_id)?.price_override = None;
        Ok(())
    }

    pub fn set_line_discount(
        &mut self,
        product_id: &str,
        discount: Option<LineDiscount>,
    ) -> CoreResult<()> {
        if let Some(d) = &discount {
            d.validate()?;
        }
        self.line_mut(product_id)?.discount = discount;
        Ok(())
    }

    pub fn set_cart_discount(&mut self, discount: Option<LineDiscount>) -> CoreResult<()> {
        if let Some(d) = &discount {
            d.validate()?;
        }
        self.cart_discount = discount;
        Ok(())
    }

    pub fn remove(&mut self, product_id: &str) -> CoreResult<()> {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        if self.lines.len() == before {
            return Err(CoreError::NotInCart(product_id.to_string()));
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Cart::default();
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.lines.len()
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Prices every line, in cart order.
    pub fn priced_lines(&self) -> Vec<LinePricing> {
        self.lines.iter().map(CartLine::pricing).collect()
    }

    /// Computes cart totals.
    ///
    /// ## Order of Application
    /// 1. Bulk tier (or override) per line
    /// 2. Manual line discount
    /// 3. Cart discount on the sum of line subtotals
    /// 4. Tax on the result (exclusive) or extracted from it (inclusive)
    pub fn totals(&self, tax_rate: TaxRate, tax_mode: TaxMode) -> CartTotals {
        let priced = self.priced_lines();
        self.totals_from(&priced, tax_rate, tax_mode)
    }

    fn totals_from(&self, priced: &[LinePricing], tax_rate: TaxRate, tax_mode: TaxMode) -> CartTotals {
        let gross: Money = priced.iter().map(|p| p.gross).sum();
        let bulk_savings: Money = priced.iter().map(|p| p.bulk_savings).sum();
        let line_discounts: Money = priced.iter().map(|p| p.discount).sum();
        let lines_subtotal: Money = priced.iter().map(|p| p.subtotal).sum();

        let cart_discount = self
            .cart_discount
            .map(|d| d.resolve(lines_subtotal))
            .unwrap_or_default();
        let subtotal = lines_subtotal - cart_discount;

        let (tax, total) = match tax_mode {
            TaxMode::Exclusive => {
                let tax = subtotal.calculate_tax(tax_rate);
                (tax, subtotal + tax)
            }
            TaxMode::Inclusive => (subtotal.included_tax(tax_rate), subtotal),
        };

        CartTotals {
            item_count: self.item_count(),
            total_quantity: self.total_quantity(),
            gross,
            bulk_savings,
            line_discounts,
            cart_discount,
            subtotal,
            tax,
            total,
            total_savings: bulk_savings + line_discounts + cart_discount,
        }
    }

    /// Validates the cart against payment and produces the records to store.
    ///
    /// The cart discount is spread over the lines in proportion to their
    /// subtotals so stored item subtotals add up to the sale subtotal.
    pub fn checkout(
        &self,
        tax_rate: TaxRate,
        tax_mode: TaxMode,
        payment: Payment,
    ) -> CoreResult<CheckoutDraft> {
        if self.is_empty() {
            return Err(CoreError::EmptyCart);
        }

        for line in &self.lines {
            if line.quantity > line.available {
                return Err(CoreError::InsufficientStock {
                    product: line.name.clone(),
                    available: line.available,
                    requested: line.quantity,
                });
            }
        }

        let priced = self.priced_lines();
        let totals = self.totals_from(&priced, tax_rate, tax_mode);

        let (tendered, change) = match (payment.method, payment.tendered) {
            (PaymentMethod::Cash, Some(tendered)) => {
                if tendered < totals.total {
                    return Err(CoreError::InsufficientPayment {
                        total_cents: totals.total.cents(),
                        tendered_cents: tendered.cents(),
                    });
                }
                (tendered, tendered - totals.total)
            }
            _ => (totals.total, Money::zero()),
        };

        let weights: Vec<i64> = priced.iter().map(|p| p.subtotal.cents()).collect();
        let shares = spread_discount(totals.cart_discount, &weights);

        let lines = self
            .lines
            .iter()
            .zip(priced.iter())
            .zip(shares)
            .map(|((line, pricing), share)| CheckoutLine {
                product_id: line.product_id.clone(),
                product_name: line.name.clone(),
                quantity: pricing.quantity,
                unit_price: pricing.unit_price,
                base_price: pricing.base_unit_price,
                cost: line.cost,
                discount: pricing.discount + share,
                subtotal: pricing.subtotal - share,
                tier: pricing.tier,
            })
            .collect();

        Ok(CheckoutDraft {
            customer_id: self.customer_id.clone(),
            payment_method: payment.method,
            gross: totals.gross,
            bulk_savings: totals.bulk_savings,
            discount: totals.line_discounts + totals.cart_discount,
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
            tendered,
            change,
            notes: self.notes.clone(),
            lines,
        })
    }
}

fn ensure_stock(product: &Product, quantity: i64) -> CoreResult<()> {
    if !product.can_sell(quantity) {
        return Err(CoreError::InsufficientStock {
            product: product.name.clone(),
            available: product.quantity,
            requested: quantity,
        });
    }
    Ok(())
}

/// Proportional split of `discount` where no share exceeds its weight.
///
/// `Money::allocate` can hand the last line a rounding remainder larger than
/// its own subtotal; the excess moves to lines that still have room.
fn spread_discount(discount: Money, weights: &[i64]) -> Vec<Money> {
    let mut shares = discount.allocate(weights);

    let mut excess = Money::zero();
    for (share, weight) in shares.iter_mut().zip(weights) {
        let cap = Money::from_cents((*weight).max(0));
        if *share > cap {
            excess += *share - cap;
            *share = cap;
        }
    }

    for (share, weight) in shares.iter_mut().zip(weights) {
        if excess.is_zero() {
            break;
        }
        let room = Money::from_cents((*weight).max(0)) - *share;
        let moved = room.min(excess);
        *share += moved;
        excess -= moved;
    }

    shares
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, price_cents: i64, quantity: i64, tiers: Vec<BulkPriceTier>) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {}", id),
            barcode: None,
            description: None,
            price_cents,
            cost_cents: price_cents / 2,
            quantity,
            min_stock: 0,
            category_id: None,
            supplier_id: None,
            bulk_pricing: tiers,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn water() -> Product {
        product(
            "water",
            100,
            500,
            vec![BulkPriceTier::new(6, 90), BulkPriceTier::new(12, 80)],
        )
    }

    fn cash_exact() -> Payment {
        Payment {
            method: PaymentMethod::Cash,
            tendered: None,
        }
    }

    #[test]
    fn test_add_same_product_merges_lines() {
        let mut cart = Cart::new();
        cart.add_product(&water(), 2).unwrap();
        cart.add_product(&water(), 3).unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total_quantity(), 5);
    }

    #[test]
    fn test_quantity_change_moves_between_tiers() {
        let mut cart = Cart::new();
        cart.add_product(&water(), 5).unwrap();
        assert_eq!(cart.priced_lines()[0].unit_price.cents(), 100);

        cart.set_quantity("water", 6).unwrap();
        assert_eq!(cart.priced_lines()[0].unit_price.cents(), 90);

        cart.set_quantity("water", 12).unwrap();
        assert_eq!(cart.priced_lines()[0].unit_price.cents(), 80);

        cart.set_quantity("water", 3).unwrap();
        assert_eq!(cart.priced_lines()[0].unit_price.cents(), 100);
    }

    #[test]
    fn test_override_survives_quantity_change() {
        let mut cart = Cart::new();
        cart.add_product(&water(), 2).unwrap();
        cart.override_price("water", Money::from_cents(95)).unwrap();
        cart.set_quantity("water", 20).unwrap();
        assert_eq!(cart.priced_lines()[0].unit_price.cents(), 95);

        cart.clear_price_override("water").unwrap();
        assert_eq!(cart.priced_lines()[0].unit_price.cents(), 80);

        assert!(matches!(
            cart.override_price("water", Money::from_cents(-1)),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            cart.override_price("water", Money::from_cents(crate::MAX_PRICE_CENTS + 1)),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        let mut cart = Cart::new();
        cart.add_product(&water(), 2).unwrap();
        cart.set_quantity("water", 0).unwrap();
        assert!(cart.is_empty());
        assert!(matches!(
            cart.set_quantity("water", 1),
            Err(CoreError::NotInCart(_))
        ));
    }

    #[test]
    fn test_stock_is_enforced() {
        let mut cart = Cart::new();
        let scarce = product("scarce", 100, 3, vec![]);
        assert!(matches!(
            cart.add_product(&scarce, 4),
            Err(CoreError::InsufficientStock { available: 3, .. })
        ));
        cart.add_product(&scarce, 3).unwrap();
        assert!(cart.add_product(&scarce, 1).is_err());
        assert!(cart.set_quantity("scarce", 4).is_err());
    }

    #[test]
    fn test_totals_stack_tier_line_and_cart_discounts() {
        let mut cart = Cart::new();
        // 14 × $0.80 = $11.20 (gross $14.00)
        cart.add_product(&water(), 14).unwrap();
        cart.set_line_discount("water", Some(LineDiscount::Amount(Money::from_cents(120))))
            .unwrap();
        // 2 × $5.00 = $10.00
        cart.add_product(&product("bread", 500, 10, vec![]), 2).unwrap();
        cart.set_cart_discount(Some(LineDiscount::Percent(1000))).unwrap();

        let totals = cart.totals(TaxRate::zero(), TaxMode::Exclusive);
        assert_eq!(totals.gross.cents(), 2400);
        assert_eq!(totals.bulk_savings.cents(), 280);
        assert_eq!(totals.line_discounts.cents(), 120);
        // lines: 1000 + 1000 = 2000, 10% off = 200
        assert_eq!(totals.cart_discount.cents(), 200);
        assert_eq!(totals.subtotal.cents(), 1800);
        assert_eq!(totals.total.cents(), 1800);
        assert_eq!(totals.total_savings.cents(), 600);
    }

    #[test]
    fn test_tax_modes() {
        let mut cart = Cart::new();
        cart.add_product(&product("a", 1000, 10, vec![]), 1).unwrap();

        let exclusive = cart.totals(TaxRate::from_bps(825), TaxMode::Exclusive);
        assert_eq!(exclusive.tax.cents(), 83);
        assert_eq!(exclusive.total.cents(), 1083);

        let inclusive = cart.totals(TaxRate::from_bps(1000), TaxMode::Inclusive);
        assert_eq!(inclusive.total.cents(), 1000);
        assert_eq!(inclusive.tax.cents(), 91);
    }

    #[test]
    fn test_checkout_item_subtotals_match_sale() {
        let mut cart = Cart::new();
        cart.add_product(&product("a", 333, 10, vec![]), 1).unwrap();
        cart.add_product(&product("b", 333, 10, vec![]), 1).unwrap();
        cart.add_product(&product("c", 1, 10, vec![]), 1).unwrap();
        cart.set_cart_discount(Some(LineDiscount::Amount(Money::from_cents(600))))
            .unwrap();

        let draft = cart
            .checkout(TaxRate::zero(), TaxMode::Exclusive, cash_exact())
            .unwrap();
        let item_sum: Money = draft.lines.iter().map(|l| l.subtotal).sum();
        assert_eq!(item_sum, draft.subtotal);
        assert!(draft.lines.iter().all(|l| !l.subtotal.is_negative()));
        assert_eq!(draft.subtotal.cents(), 67);
    }

    #[test]
    fn test_checkout_cash_change_and_shortfall() {
        let mut cart = Cart::new();
        cart.add_product(&product("a", 450, 10, vec![]), 2).unwrap();

        let draft = cart
            .checkout(
                TaxRate::zero(),
                TaxMode::Exclusive,
                Payment {
                    method: PaymentMethod::Cash,
                    tendered: Some(Money::from_cents(1000)),
                },
            )
            .unwrap();
        assert_eq!(draft.change.cents(), 100);

        let short = cart.checkout(
            TaxRate::zero(),
            TaxMode::Exclusive,
            Payment {
                method: PaymentMethod::Cash,
                tendered: Some(Money::from_cents(500)),
            },
        );
        assert!(matches!(short, Err(CoreError::InsufficientPayment { .. })));
    }

    #[test]
    fn test_checkout_empty_cart() {
        let cart = Cart::new();
        assert!(matches!(
            cart.checkout(TaxRate::zero(), TaxMode::Exclusive, cash_exact()),
            Err(CoreError::EmptyCart)
        ));
    }

    #[test]
    fn test_into_records_links_items() {
        let mut cart = Cart::new();
        cart.add_product(&water(), 12).unwrap();
        let draft = cart
            .checkout(TaxRate::zero(), TaxMode::Exclusive, cash_exact())
            .unwrap();
        let record = draft.into_records("20260101-0001".to_string(), Utc::now());

        assert_eq!(record.items.len(), 1);
        assert_eq!(record.items[0].sale_id, record.sale.id);
        assert_eq!(record.items[0].unit_price_cents, 80);
        assert_eq!(record.items[0].base_price_cents, 100);
        assert_eq!(record.items[0].tier_min_quantity, Some(12));
        assert_eq!(record.sale.bulk_savings_cents, 240);
        assert_eq!(record.sale.total_cents, 960);
    }

    #[test]
    fn test_spread_discount_caps_shares() {
        let shares = spread_discount(Money::from_cents(300), &[150, 150, 1]);
        let sum: Money = shares.iter().sum();
        assert_eq!(sum.cents(), 300);
        assert!(shares[2].cents() <= 1);
    }
}
