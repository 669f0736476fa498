//! # Receipt Rendering
//!
//! Plain-text receipts for character-based thermal printers.
//!
//! ```text
//!            CORNER SHOP
//!          12 Market Road
//! ================================
//! Receipt: 20260307-0001
//! Date: 2026-03-07 10:15
//! --------------------------------
//! Water 500ml
//!   12 x $0.80                $9.60
//!   Bulk price 12+, list $1.00
//! --------------------------------
//! You saved                   $2.40
//! TOTAL                       $9.60
//! ```
//!
//! No line ever exceeds the paper width; long names wrap.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{PaymentMethod, Sale, SaleItem};

/// Paper widths (characters per line) of common 58mm and 80mm printers.
pub const SUPPORTED_PAPER_WIDTHS: [usize; 3] = [32, 42, 48];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLayout {
    pub paper_width: usize,
    pub header: Vec<String>,
    pub footer: Vec<String>,
    pub currency_symbol: String,
    /// Minor digits shown after the decimal point.
    pub currency_decimals: u8,
}

impl Default for ReceiptLayout {
    fn default() -> Self {
        ReceiptLayout {
            paper_width: 42,
            header: Vec::new(),
            footer: vec!["Thank you!".to_string()],
            currency_symbol: "$".to_string(),
            currency_decimals: 2,
        }
    }
}

impl ReceiptLayout {
    pub fn new(paper_width: usize) -> Result<Self, ValidationError> {
        if !SUPPORTED_PAPER_WIDTHS.contains(&paper_width) {
            return Err(ValidationError::InvalidFormat {
                field: "paper_width".to_string(),
                reason: "must be 32, 42 or 48".to_string(),
            });
        }
        Ok(ReceiptLayout {
            paper_width,
            ..ReceiptLayout::default()
        })
    }

    pub fn with_header(mut self, lines: Vec<String>) -> Self {
        self.header = lines;
        self
    }

    pub fn with_footer(mut self, lines: Vec<String>) -> Self {
        self.footer = lines;
        self
    }

    pub fn with_currency(mut self, symbol: impl Into<String>, decimals: u8) -> Self {
        self.currency_symbol = symbol.into();
        self.currency_decimals = decimals;
        self
    }
}

// =============================================================================
// Line Builder
// =============================================================================

struct Lines<'a> {
    layout: &'a ReceiptLayout,
    out: Vec<String>,
}

impl<'a> Lines<'a> {
    fn width(&self) -> usize {
        self.layout.paper_width
    }

    fn money(&self, amount: Money) -> String {
        amount.format_minor(&self.layout.currency_symbol, self.layout.currency_decimals)
    }

    fn rule(&mut self, c: char) {
        let rule = c.to_string().repeat(self.width());
        self.out.push(rule);
    }

    fn text(&mut self, text: &str) {
        let wrapped = wrap(text, self.width());
        self.out.extend(wrapped);
    }

    fn indented(&mut self, text: &str) {
        for line in wrap(text, self.width() - 2) {
            self.out.push(format!("  {}", line));
        }
    }

    fn centered(&mut self, text: &str) {
        for line in wrap(text, self.width()) {
            let pad = (self.width() - line.chars().count()) / 2;
            self.out.push(format!("{}{}", " ".repeat(pad), line));
        }
    }

    /// Left text with a right-aligned value. When both do not fit, the left
    /// text wraps and the value goes on its own line.
    fn pair(&mut self, left: &str, right: &str) {
        let width = self.width();
        let left_len = left.chars().count();
        let right_len = right.chars().count();

        if left_len + right_len < width {
            let gap = width - left_len - right_len;
            self.out.push(format!("{}{}{}", left, " ".repeat(gap), right));
            return;
        }

        self.text(left);
        let right: String = right.chars().take(width).collect();
        let pad = width - right.chars().count();
        self.out.push(format!("{}{}", " ".repeat(pad), right));
    }
}

/// Word-wraps `text` to `width` characters, splitting words longer than a
/// line.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();

        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(width);
            lines.push(word.into_iter().collect());
            word = rest;
        }

        let current_len = current.chars().count();
        if current_len > 0 && current_len + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.extend(word);
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

// =============================================================================
// Rendering
// =============================================================================

/// Renders a sale receipt.
pub fn render_receipt(
    layout: &ReceiptLayout,
    sale: &Sale,
    items: &[SaleItem],
    customer_name: Option<&str>,
) -> String {
    let mut r = Lines {
        layout,
        out: Vec::new(),
    };

    for line in &layout.header {
        r.centered(line);
    }
    r.rule('=');
    r.text(&format!("Receipt: {}", sale.receipt_number));
    r.text(&format!("Date: {}", sale.created_at.format("%Y-%m-%d %H:%M")));
    if let Some(name) = customer_name {
        r.text(&format!("Customer: {}", name));
    }
    r.rule('-');

    for item in items {
        let unit = Money::from_cents(item.unit_price_cents);
        let base = Money::from_cents(item.base_price_cents);
        let extended = unit.multiply_quantity(item.quantity);

        r.text(&item.product_name);
        let qty_line = format!("  {} x {}", item.quantity, r.money(unit));
        let value = r.money(extended);
        r.pair(&qty_line, &value);

        match item.tier_min_quantity {
            Some(threshold) => {
                let note = format!("Bulk price {}+, list {}", threshold, r.money(base));
                r.indented(&note);
            }
            None if unit != base => {
                let note = format!("Price changed, list {}", r.money(base));
                r.indented(&note);
            }
            None => {}
        }
        if item.discount_cents > 0 {
            let value = r.money(-Money::from_cents(item.discount_cents));
            r.pair("  Discount", &value);
        }
    }
    r.rule('-');

    let gross = Money::from_cents(sale.gross_cents);
    let bulk = Money::from_cents(sale.bulk_savings_cents);
    let discount = Money::from_cents(sale.discount_cents);

    if bulk.is_positive() || discount.is_positive() {
        let v = r.money(gross);
        r.pair("Gross", &v);
    }
    if bulk.is_positive() {
        let v = r.money(-bulk);
        r.pair("Bulk savings", &v);
    }
    if discount.is_positive() {
        let v = r.money(-discount);
        r.pair("Discount", &v);
    }

    let subtotal = r.money(Money::from_cents(sale.subtotal_cents));
    r.pair("Subtotal", &subtotal);
    let tax = r.money(Money::from_cents(sale.tax_cents));
    r.pair("Tax", &tax);
    let total = r.money(sale.total());
    r.pair("TOTAL", &total);

    if sale.payment_method == PaymentMethod::Cash {
        let tendered = r.money(Money::from_cents(sale.amount_tendered_cents));
        r.pair("Cash", &tendered);
        let change = r.money(Money::from_cents(sale.change_cents));
        r.pair("Change", &change);
    }
    r.text(&format!("Paid by: {}", sale.payment_method));

    let saved = bulk + discount;
    if saved.is_positive() {
        let v = r.money(saved);
        r.pair("You saved", &v);
    }

    if sale.is_voided() {
        r.centered("*** VOIDED ***");
    }

    if !layout.footer.is_empty() {
        r.rule('=');
        for line in &layout.footer {
            r.centered(line);
        }
    }

    let mut text = r.out.join("\n");
    text.push('\n');
    text
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SaleStatus;
    use chrono::{TimeZone, Utc};

    fn sale() -> (Sale, Vec<SaleItem>) {
        let items = vec![
            SaleItem {
                id: "i1".to_string(),
                sale_id: "s1".to_string(),
                product_id: "p1".to_string(),
                product_name: "Water 500ml".to_string(),
                quantity: 12,
                unit_price_cents: 80,
                base_price_cents: 100,
                cost_cents: 50,
                discount_cents: 0,
                subtotal_cents: 960,
                tier_min_quantity: Some(12),
            },
            SaleItem {
                id: "i2".to_string(),
                sale_id: "s1".to_string(),
                product_id: "p2".to_string(),
                product_name: "Extra large family size chocolate chip cookies with hazelnuts"
                    .to_string(),
                quantity: 1,
                unit_price_cents: 450,
                base_price_cents: 450,
                cost_cents: 300,
                discount_cents: 50,
                subtotal_cents: 400,
                tier_min_quantity: None,
            },
        ];
        let sale = Sale {
            id: "s1".to_string(),
            receipt_number: "20260307-0001".to_string(),
            customer_id: None,
            payment_method: PaymentMethod::Cash,
            status: SaleStatus::Completed,
            gross_cents: 1650,
            bulk_savings_cents: 240,
            discount_cents: 50,
            subtotal_cents: 1360,
            tax_cents: 0,
            total_cents: 1360,
            amount_tendered_cents: 2000,
            change_cents: 640,
            notes: None,
            created_at: Utc.with_ymd_and_hms(2026, 3, 7, 10, 15, 0).unwrap(),
            voided_at: None,
        };
        (sale, items)
    }

    #[test]
    fn test_lines_fit_every_paper_width() {
        let (sale, items) = sale();
        for width in SUPPORTED_PAPER_WIDTHS {
            let layout = ReceiptLayout::new(width)
                .unwrap()
                .with_header(vec!["Corner Shop".to_string(), "12 Market Road".to_string()]);
            let text = render_receipt(&layout, &sale, &items, Some("Ana"));
            for line in text.lines() {
                assert!(
                    line.chars().count() <= width,
                    "line too wide for {}: {:?}",
                    width,
                    line
                );
            }
        }
    }

    #[test]
    fn test_receipt_content() {
        let (sale, items) = sale();
        let layout = ReceiptLayout::new(32).unwrap();
        let text = render_receipt(&layout, &sale, &items, None);

        assert!(text.contains("Receipt: 20260307-0001"));
        assert!(text.contains("Bulk price 12+, list $1.00"));
        assert!(!text.contains("Price changed"));
        assert!(text.contains("$9.60"));
        assert!(text.contains("-$2.40"));
        assert!(text.contains("Change"));
        assert!(text.contains("$6.40"));
        assert!(text.contains("Paid by: cash"));
        assert!(text.contains("Thank you!"));
        assert!(!text.contains("VOIDED"));
    }

    #[test]
    fn test_pair_right_aligns() {
        let layout = ReceiptLayout::new(32).unwrap();
        let (sale, items) = sale();
        let text = render_receipt(&layout, &sale, &items, None);
        let total = text.lines().find(|l| l.starts_with("TOTAL")).unwrap();
        assert_eq!(total.chars().count(), 32);
        assert!(total.ends_with("$13.60"));
    }

    #[test]
    fn test_manual_price_is_not_a_bulk_price() {
        let (mut sale, mut items) = sale();
        items[0].tier_min_quantity = None;
        sale.bulk_savings_cents = 0;
        let layout = ReceiptLayout::new(42).unwrap();
        let text = render_receipt(&layout, &sale, &items, None);

        assert!(text.contains("Price changed, list $1.00"));
        assert!(!text.contains("Bulk price"));
    }

    #[test]
    fn test_amounts_follow_currency_decimals() {
        let (mut sale, mut items) = sale();
        items.truncate(1);
        items[0].unit_price_cents = 150;
        items[0].base_price_cents = 150;
        items[0].tier_min_quantity = None;
        items[0].quantity = 1;
        items[0].subtotal_cents = 150;
        sale.gross_cents = 150;
        sale.bulk_savings_cents = 0;
        sale.discount_cents = 0;
        sale.subtotal_cents = 150;
        sale.total_cents = 150;
        sale.amount_tendered_cents = 200;
        sale.change_cents = 50;

        let layout = ReceiptLayout::new(32).unwrap().with_currency("¥", 0);
        let text = render_receipt(&layout, &sale, &items, None);

        let total = text.lines().find(|l| l.starts_with("TOTAL")).unwrap();
        assert!(total.ends_with("¥150"));
        assert!(text.contains("1 x ¥150"));
        assert!(!text.contains("1.50"));
    }

    #[test]
    fn test_rejects_unknown_width() {
        assert!(ReceiptLayout::new(40).is_err());
    }

    #[test]
    fn test_wrap_splits_long_words() {
        let lines = wrap("abcdefghij klm", 4);
        assert_eq!(lines, vec!["abcd", "efgh", "ij", "klm"]);
    }
}
