//! # Analytics
//!
//! Sales and inventory reports computed from loaded records.
//!
//! ```text
//! ReportPeriod ──range(now)──► DateRange ──► tally-db loads sales in range
//!                                                    │
//!                                                    ▼
//!                      SalesReport::build(period, range, &sales, top_n)
//!                      ├── SalesSummary
//!                      ├── top_products
//!                      ├── payment_breakdown
//!                      └── daily_totals
//! ```
//!
//! Voided sales are ignored by every sales figure.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{PaymentMethod, Product, SaleWithItems};

// =============================================================================
// Periods
// =============================================================================

/// Half-open UTC range `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at < self.to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPeriod {
    Today,
    /// Today and the six days before it.
    Week,
    /// Last 30 days including today.
    Month,
    /// Last 365 days including today.
    Year,
    All,
    /// Inclusive calendar dates.
    Custom { from: NaiveDate, to: NaiveDate },
}

fn start_of(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

impl ReportPeriod {
    pub fn range(&self, now: DateTime<Utc>) -> DateRange {
        let today = now.date_naive();
        let tomorrow = start_of(today) + Duration::days(1);
        let back = |days: i64| DateRange {
            from: start_of(today) - Duration::days(days),
            to: tomorrow,
        };

        match self {
            ReportPeriod::Today => back(0),
            ReportPeriod::Week => back(6),
            ReportPeriod::Month => back(29),
            ReportPeriod::Year => back(364),
            ReportPeriod::All => DateRange {
                from: DateTime::<Utc>::UNIX_EPOCH,
                to: tomorrow,
            },
            ReportPeriod::Custom { from, to } => {
                let (from, to) = if from <= to { (*from, *to) } else { (*to, *from) };
                DateRange {
                    from: start_of(from),
                    to: start_of(to) + Duration::days(1),
                }
            }
        }
    }

    pub fn label(&self) -> String {
        match self {
            ReportPeriod::Today => "Today".to_string(),
            ReportPeriod::Week => "Last 7 days".to_string(),
            ReportPeriod::Month => "Last 30 days".to_string(),
            ReportPeriod::Year => "Last 365 days".to_string(),
            ReportPeriod::All => "All time".to_string(),
            ReportPeriod::Custom { from, to } => format!("{} to {}", from, to),
        }
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for ReportPeriod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "today" | "day" => Ok(ReportPeriod::Today),
            "week" | "7d" => Ok(ReportPeriod::Week),
            "month" | "30d" => Ok(ReportPeriod::Month),
            "year" | "365d" => Ok(ReportPeriod::Year),
            "all" => Ok(ReportPeriod::All),
            other => Err(ValidationError::InvalidFormat {
                field: "period".to_string(),
                reason: format!("unknown period '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Sales Summary
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SalesSummary {
    pub transactions: usize,
    pub voided: usize,
    pub items_sold: i64,
    pub gross: Money,
    pub bulk_savings: Money,
    pub discounts: Money,
    pub subtotal: Money,
    pub tax: Money,
    /// Sum of sale totals.
    pub revenue: Money,
    pub cost_of_goods: Money,
    /// `subtotal − cost_of_goods`.
    pub gross_profit: Money,
    pub average_sale: Money,
}

impl SalesSummary {
    pub fn compute(sales: &[SaleWithItems]) -> Self {
        let mut summary = SalesSummary::default();

        for entry in sales {
            if entry.sale.is_voided() {
                summary.voided += 1;
                continue;
            }
            let sale = &entry.sale;
            summary.transactions += 1;
            summary.gross += Money::from_cents(sale.gross_cents);
            summary.bulk_savings += Money::from_cents(sale.bulk_savings_cents);
            summary.discounts += Money::from_cents(sale.discount_cents);
            summary.subtotal += Money::from_cents(sale.subtotal_cents);
            summary.tax += Money::from_cents(sale.tax_cents);
            summary.revenue += sale.total();

            for item in &entry.items {
                summary.items_sold += item.quantity;
                summary.cost_of_goods += item.cost_of_goods();
            }
        }

        summary.gross_profit = summary.subtotal - summary.cost_of_goods;
        if summary.transactions > 0 {
            let n = summary.transactions as i64;
            let cents = summary.revenue.cents();
            // round half up on non-negative revenue
            summary.average_sale = Money::from_cents((cents + n / 2) / n);
        }

        summary
    }

    /// Gross margin in basis points of subtotal.
    pub fn margin_bps(&self) -> Option<i64> {
        (self.subtotal.is_positive())
            .then(|| self.gross_profit.cents() * 10000 / self.subtotal.cents())
    }
}

// =============================================================================
// Breakdowns
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TopProduct {
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub revenue: Money,
}

/// Best sellers by quantity, then revenue.
pub fn top_products(sales: &[SaleWithItems], limit: usize) -> Vec<TopProduct> {
    let mut by_product: HashMap<&str, TopProduct> = HashMap::new();

    for item in completed(sales).flat_map(|s| s.items.iter()) {
        let entry = by_product
            .entry(item.product_id.as_str())
            .or_insert_with(|| TopProduct {
                product_id: item.product_id.clone(),
                name: item.product_name.clone(),
                quantity: 0,
                revenue: Money::zero(),
            });
        entry.quantity += item.quantity;
        entry.revenue += Money::from_cents(item.subtotal_cents);
    }

    let mut ranked: Vec<TopProduct> = by_product.into_values().collect();
    ranked.sort_by(|a, b| {
        b.quantity
            .cmp(&a.quantity)
            .then(b.revenue.cmp(&a.revenue))
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked.truncate(limit);
    ranked
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentTotal {
    pub method: PaymentMethod,
    pub count: usize,
    pub total: Money,
}

/// Count and total per payment method, largest total first.
pub fn payment_breakdown(sales: &[SaleWithItems]) -> Vec<PaymentTotal> {
    let mut by_method: BTreeMap<PaymentMethod, PaymentTotal> = BTreeMap::new();

    for sale in completed(sales).map(|s| &s.sale) {
        let entry = by_method
            .entry(sale.payment_method)
            .or_insert_with(|| PaymentTotal {
                method: sale.payment_method,
                count: 0,
                total: Money::zero(),
            });
        entry.count += 1;
        entry.total += sale.total();
    }

    let mut totals: Vec<PaymentTotal> = by_method.into_values().collect();
    totals.sort_by(|a, b| b.total.cmp(&a.total).then(a.method.cmp(&b.method)));
    totals
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DailyTotal {
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub transactions: usize,
    pub revenue: Money,
}

/// Revenue per UTC calendar day, oldest first. Days without sales are
/// omitted.
pub fn daily_totals(sales: &[SaleWithItems]) -> Vec<DailyTotal> {
    let mut by_day: BTreeMap<NaiveDate, DailyTotal> = BTreeMap::new();

    for sale in completed(sales).map(|s| &s.sale) {
        let date = sale.created_at.date_naive();
        let entry = by_day.entry(date).or_insert_with(|| DailyTotal {
            date,
            transactions: 0,
            revenue: Money::zero(),
        });
        entry.transactions += 1;
        entry.revenue += sale.total();
    }

    by_day.into_values().collect()
}

fn completed(sales: &[SaleWithItems]) -> impl Iterator<Item = &SaleWithItems> {
    sales.iter().filter(|s| !s.sale.is_voided())
}

// =============================================================================
// Sales Report
// =============================================================================

/// Everything the report command and spreadsheet export show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesReport {
    pub period: String,
    pub range: DateRange,
    pub summary: SalesSummary,
    pub top_products: Vec<TopProduct>,
    pub payments: Vec<PaymentTotal>,
    pub daily: Vec<DailyTotal>,
}

impl SalesReport {
    pub fn build(
        period: &ReportPeriod,
        range: DateRange,
        sales: &[SaleWithItems],
        top_n: usize,
    ) -> Self {
        SalesReport {
            period: period.label(),
            range,
            summary: SalesSummary::compute(sales),
            top_products: top_products(sales, top_n),
            payments: payment_breakdown(sales),
            daily: daily_totals(sales),
        }
    }
}

// =============================================================================
// Inventory
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockAlert {
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub min_stock: i64,
}

impl From<&Product> for StockAlert {
    fn from(p: &Product) -> Self {
        StockAlert {
            product_id: p.id.clone(),
            name: p.name.clone(),
            quantity: p.quantity,
            min_stock: p.min_stock,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryReport {
    pub total_products: usize,
    pub total_units: i64,
    pub stock_value_cost: Money,
    pub stock_value_retail: Money,
    pub low_stock: Vec<StockAlert>,
    pub out_of_stock: Vec<StockAlert>,
}

impl InventoryReport {
    pub fn compute(products: &[Product]) -> Self {
        let mut report = InventoryReport {
            total_products: products.len(),
            ..InventoryReport::default()
        };

        for product in products {
            let units = product.quantity.max(0);
            report.total_units += units;
            report.stock_value_cost += product.cost().multiply_quantity(units);
            report.stock_value_retail += product.price().multiply_quantity(units);

            if product.is_out_of_stock() {
                report.out_of_stock.push(product.into());
            } else if product.is_low_stock() {
                report.low_stock.push(product.into());
            }
        }

        report.low_stock.sort_by(|a, b| a.quantity.cmp(&b.quantity).then(a.name.cmp(&b.name)));
        report.out_of_stock.sort_by(|a, b| a.name.cmp(&b.name));
        report
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Sale, SaleItem, SaleStatus};

    fn sale(
        id: &str,
        method: PaymentMethod,
        at: DateTime<Utc>,
        items: &[(&str, i64, i64, i64)],
    ) -> SaleWithItems {
        let items: Vec<SaleItem> = items
            .iter()
            .enumerate()
            .map(|(i, (product, qty, unit, cost))| SaleItem {
                id: format!("{}-{}", id, i),
                sale_id: id.to_string(),
                product_id: product.to_string(),
                product_name: product.to_uppercase(),
                quantity: *qty,
                unit_price_cents: *unit,
                base_price_cents: *unit,
                cost_cents: *cost,
                discount_cents: 0,
                subtotal_cents: unit * qty,
                tier_min_quantity: None,
            })
            .collect();
        let subtotal: i64 = items.iter().map(|i| i.subtotal_cents).sum();
        SaleWithItems {
            sale: Sale {
                id: id.to_string(),
                receipt_number: format!("R-{}", id),
                customer_id: None,
                payment_method: method,
                status: SaleStatus::Completed,
                gross_cents: subtotal,
                bulk_savings_cents: 0,
                discount_cents: 0,
                subtotal_cents: subtotal,
                tax_cents: 0,
                total_cents: subtotal,
                amount_tendered_cents: subtotal,
                change_cents: 0,
                notes: None,
                created_at: at,
                voided_at: None,
            },
            items,
        }
    }

    fn at(date: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(date).unwrap().with_timezone(&Utc)
    }

    fn fixture() -> Vec<SaleWithItems> {
        let mut voided = sale(
            "s4",
            PaymentMethod::Cash,
            at("2026-03-02T12:00:00Z"),
            &[("cola", 50, 100, 60)],
        );
        voided.sale.status = SaleStatus::Voided;

        vec![
            sale(
                "s1",
                PaymentMethod::Cash,
                at("2026-03-01T09:00:00Z"),
                &[("cola", 2, 100, 60), ("bread", 1, 300, 200)],
            ),
            sale(
                "s2",
                PaymentMethod::Card,
                at("2026-03-01T18:30:00Z"),
                &[("cola", 3, 100, 60)],
            ),
            sale(
                "s3",
                PaymentMethod::Cash,
                at("2026-03-02T08:00:00Z"),
                &[("bread", 4, 300, 200)],
            ),
            voided,
        ]
    }

    #[test]
    fn test_summary_excludes_voided() {
        let summary = SalesSummary::compute(&fixture());
        assert_eq!(summary.transactions, 3);
        assert_eq!(summary.voided, 1);
        assert_eq!(summary.items_sold, 10);
        // 500 + 300 + 1200
        assert_eq!(summary.revenue.cents(), 2000);
        // 5 × 60 + 5 × 200
        assert_eq!(summary.cost_of_goods.cents(), 1300);
        assert_eq!(summary.gross_profit.cents(), 700);
        assert_eq!(summary.average_sale.cents(), 667);
        assert_eq!(summary.margin_bps(), Some(3500));
    }

    #[test]
    fn test_top_products_rank_by_quantity_then_revenue() {
        let top = top_products(&fixture(), 10);
        assert_eq!(top.len(), 2);
        // both sold 5 units; bread earned more
        assert_eq!(top[0].product_id, "bread");
        assert_eq!(top[0].revenue.cents(), 1500);
        assert_eq!(top[1].product_id, "cola");

        assert_eq!(top_products(&fixture(), 1).len(), 1);
    }

    #[test]
    fn test_payment_breakdown() {
        let payments = payment_breakdown(&fixture());
        assert_eq!(payments[0].method, PaymentMethod::Cash);
        assert_eq!(payments[0].count, 2);
        assert_eq!(payments[0].total.cents(), 1700);
        assert_eq!(payments[1].method, PaymentMethod::Card);
    }

    #[test]
    fn test_daily_totals_ascending() {
        let daily = daily_totals(&fixture());
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].date, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(daily[0].transactions, 2);
        assert_eq!(daily[0].revenue.cents(), 800);
        assert_eq!(daily[1].revenue.cents(), 1200);
    }

    #[test]
    fn test_period_ranges() {
        let now = at("2026-03-07T15:00:00Z");

        let today = ReportPeriod::Today.range(now);
        assert_eq!(today.from, at("2026-03-07T00:00:00Z"));
        assert_eq!(today.to, at("2026-03-08T00:00:00Z"));

        let week = ReportPeriod::Week.range(now);
        assert_eq!(week.from, at("2026-03-01T00:00:00Z"));
        assert!(week.contains(now));

        let custom = ReportPeriod::Custom {
            from: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            to: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        }
        .range(now);
        assert_eq!(custom.from, at("2026-03-01T00:00:00Z"));
        assert!(!custom.contains(at("2026-03-03T00:00:00Z")));

        assert!("fortnight".parse::<ReportPeriod>().is_err());
    }

    #[test]
    fn test_inventory_report() {
        let make = |id: &str, qty: i64, min: i64| Product {
            id: id.to_string(),
            name: id.to_string(),
            barcode: None,
            description: None,
            price_cents: 200,
            cost_cents: 120,
            quantity: qty,
            min_stock: min,
            category_id: None,
            supplier_id: None,
            bulk_pricing: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let report = InventoryReport::compute(&[make("a", 10, 2), make("b", 2, 5), make("c", 0, 1)]);

        assert_eq!(report.total_units, 12);
        assert_eq!(report.stock_value_cost.cents(), 1440);
        assert_eq!(report.stock_value_retail.cents(), 2400);
        assert_eq!(report.low_stock.len(), 1);
        assert_eq!(report.low_stock[0].product_id, "b");
        assert_eq!(report.out_of_stock[0].product_id, "c");
    }
}
