//! # Report Command
//!
//! Sales analytics for a period plus the current inventory position,
//! printed as text, JSON, or written to a spreadsheet.
//!
//! ## Spreadsheet Layout (`--xlsx`)
//! ```text
//! ┌──────────┬────────┬──────────────┬──────────┬───────────┐
//! │ Summary  │ Daily  │ Top Products │ Payments │ Inventory │
//! └──────────┴────────┴──────────────┴──────────┴───────────┘
//! Summary       metric / value pairs
//! Daily         date, transactions, revenue
//! Top Products  rank, product, quantity, revenue
//! Payments      method, count, total
//! Inventory     product, stock, min, status, cost value, retail value
//! ```
//!
//! Amounts are written as numbers in major units with a currency format,
//! so the sheet can be summed.

use chrono::{NaiveDate, Utc};
use clap::Args;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tally_core::analytics::{InventoryReport, ReportPeriod, SalesReport};
use tally_core::{Money, Product};
use tracing::info;

use super::{fields, table};
use crate::error::ApiError;
use crate::state::{AppConfig, AppState};

// =============================================================================
// Arguments
// =============================================================================

/// Date selection shared by `report` and `sale list`.
#[derive(Debug, Clone, Args)]
pub struct PeriodArgs {
    /// today, week, month, year or all
    #[arg(long, default_value = "today")]
    pub period: ReportPeriod,

    /// First day (YYYY-MM-DD); with --to, replaces --period
    #[arg(long, requires = "to")]
    pub from: Option<NaiveDate>,

    /// Last day, inclusive (YYYY-MM-DD)
    #[arg(long, requires = "from")]
    pub to: Option<NaiveDate>,
}

impl PeriodArgs {
    pub fn resolve(&self) -> ReportPeriod {
        match (self.from, self.to) {
            (Some(from), Some(to)) => ReportPeriod::Custom { from, to },
            _ => self.period,
        }
    }
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[command(flatten)]
    pub period: PeriodArgs,

    /// Number of best sellers to list
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Also write the report to this .xlsx file
    #[arg(long)]
    pub xlsx: Option<PathBuf>,
}

/// Sales for the period and stock as of now.
#[derive(Debug, Clone, Serialize)]
pub struct FullReport {
    pub sales: SalesReport,
    pub inventory: InventoryReport,
    #[serde(skip)]
    pub products: Vec<Product>,
}

// =============================================================================
// Command
// =============================================================================

pub async fn build(state: &AppState, args: &ReportArgs) -> Result<FullReport, ApiError> {
    let period = args.period.resolve();
    let range = period.range(Utc::now());

    let sales = state
        .db
        .sales()
        .sales_with_items_between(range.from, range.to)
        .await?;
    let products = state.db.products().list().await?;

    Ok(FullReport {
        sales: SalesReport::build(&period, range, &sales, args.top),
        inventory: InventoryReport::compute(&products),
        products,
    })
}

pub async fn run(state: &AppState, args: ReportArgs) -> Result<String, ApiError> {
    let report = build(state, &args).await?;

    let mut out = state.render(&report, |r| render_text(state, r))?;

    if let Some(path) = &args.xlsx {
        write_xlsx(&state.config, &report, path)?;
        info!(path = %path.display(), "Report spreadsheet written");
        if !state.json {
            out.push_str(&format!("\n\nSpreadsheet written to {}", path.display()));
        }
    }

    Ok(out)
}

// =============================================================================
// Text
// =============================================================================

fn render_text(state: &AppState, report: &FullReport) -> String {
    let sales = &report.sales;
    let s = &sales.summary;
    let margin = s
        .margin_bps()
        .map(|bps| format!("{:.1}%", bps as f64 / 100.0))
        .unwrap_or_else(|| "-".to_string());

    let mut sections = vec![format!(
        "Sales report: {} ({} to {})",
        sales.period,
        sales.range.from.format("%Y-%m-%d"),
        (sales.range.to - chrono::Duration::days(1)).format("%Y-%m-%d")
    )];

    sections.push(fields(&[
        ("Transactions", s.transactions.to_string()),
        ("Voided", s.voided.to_string()),
        ("Items sold", s.items_sold.to_string()),
        ("Gross", state.money(s.gross)),
        ("Bulk savings", state.money(s.bulk_savings)),
        ("Discounts", state.money(s.discounts)),
        ("Net sales", state.money(s.subtotal)),
        ("Tax", state.money(s.tax)),
        ("Revenue", state.money(s.revenue)),
        ("Cost of goods", state.money(s.cost_of_goods)),
        ("Gross profit", state.money(s.gross_profit)),
        ("Margin", margin),
        ("Average sale", state.money(s.average_sale)),
    ]));

    if !sales.daily.is_empty() {
        let rows: Vec<Vec<String>> = sales
            .daily
            .iter()
            .map(|d| {
                vec![
                    d.date.to_string(),
                    d.transactions.to_string(),
                    state.money(d.revenue),
                ]
            })
            .collect();
        sections.push(table(&["Date", "Sales", "Revenue"], &rows, &[1, 2]));
    }

    if !sales.top_products.is_empty() {
        let rows: Vec<Vec<String>> = sales
            .top_products
            .iter()
            .enumerate()
            .map(|(i, p)| {
                vec![
                    (i + 1).to_string(),
                    p.name.clone(),
                    p.quantity.to_string(),
                    state.money(p.revenue),
                ]
            })
            .collect();
        sections.push(table(&["#", "Top products", "Qty", "Revenue"], &rows, &[0, 2, 3]));
    }

    if !sales.payments.is_empty() {
        let rows: Vec<Vec<String>> = sales
            .payments
            .iter()
            .map(|p| vec![p.method.to_string(), p.count.to_string(), state.money(p.total)])
            .collect();
        sections.push(table(&["Payment", "Count", "Total"], &rows, &[1, 2]));
    }

    let inv = &report.inventory;
    sections.push(fields(&[
        ("Products", inv.total_products.to_string()),
        ("Units on hand", inv.total_units.to_string()),
        ("Stock at cost", state.money(inv.stock_value_cost)),
        ("Stock at retail", state.money(inv.stock_value_retail)),
        ("Low stock", inv.low_stock.len().to_string()),
        ("Out of stock", inv.out_of_stock.len().to_string()),
    ]));

    sections.join("\n\n")
}

// =============================================================================
// Spreadsheet
// =============================================================================

fn amount(config: &AppConfig, money: Money) -> f64 {
    money.cents() as f64 / 10_f64.powi(config.currency_decimals as i32)
}

fn header(sheet: &mut Worksheet, titles: &[&str], bold: &Format) -> Result<(), XlsxError> {
    for (col, title) in titles.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, bold)?;
    }
    Ok(())
}

/// Writes the report workbook with one sheet per section.
pub fn write_xlsx(config: &AppConfig, report: &FullReport, path: &Path) -> Result<(), ApiError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let decimals = "0".repeat(config.currency_decimals as usize);
    let money_format = if decimals.is_empty() {
        Format::new().set_num_format("#,##0")
    } else {
        Format::new().set_num_format(format!("#,##0.{}", decimals))
    };

    let sales = &report.sales;
    let s = &sales.summary;

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Summary")?;
        header(sheet, &["Metric", "Value"], &bold)?;
        sheet.set_column_width(0, 18)?;
        sheet.set_column_width(1, 14)?;

        sheet.write_string(1, 0, "Period")?;
        sheet.write_string(1, 1, sales.period.as_str())?;

        let counts = [
            ("Transactions", s.transactions as f64),
            ("Voided", s.voided as f64),
            ("Items sold", s.items_sold as f64),
        ];
        let amounts = [
            ("Gross", s.gross),
            ("Bulk savings", s.bulk_savings),
            ("Discounts", s.discounts),
            ("Net sales", s.subtotal),
            ("Tax", s.tax),
            ("Revenue", s.revenue),
            ("Cost of goods", s.cost_of_goods),
            ("Gross profit", s.gross_profit),
            ("Average sale", s.average_sale),
        ];

        let mut row = 2;
        for (label, value) in counts {
            sheet.write_string(row, 0, label)?;
            sheet.write_number(row, 1, value)?;
            row += 1;
        }
        for (label, value) in amounts {
            sheet.write_string(row, 0, label)?;
            sheet.write_number_with_format(row, 1, amount(config, value), &money_format)?;
            row += 1;
        }
    }

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Daily")?;
        header(sheet, &["Date", "Transactions", "Revenue"], &bold)?;
        sheet.set_column_width(0, 12)?;
        for (i, day) in sales.daily.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_string(row, 0, day.date.to_string())?;
            sheet.write_number(row, 1, day.transactions as f64)?;
            sheet.write_number_with_format(row, 2, amount(config, day.revenue), &money_format)?;
        }
    }

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Top Products")?;
        header(sheet, &["Rank", "Product", "Quantity", "Revenue"], &bold)?;
        sheet.set_column_width(1, 30)?;
        for (i, product) in sales.top_products.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_number(row, 0, (i + 1) as f64)?;
            sheet.write_string(row, 1, product.name.as_str())?;
            sheet.write_number(row, 2, product.quantity as f64)?;
            sheet.write_number_with_format(row, 3, amount(config, product.revenue), &money_format)?;
        }
    }

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Payments")?;
        header(sheet, &["Method", "Count", "Total"], &bold)?;
        for (i, payment) in sales.payments.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_string(row, 0, payment.method.as_str())?;
            sheet.write_number(row, 1, payment.count as f64)?;
            sheet.write_number_with_format(row, 2, amount(config, payment.total), &money_format)?;
        }
    }

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Inventory")?;
        header(
            sheet,
            &["Product", "Stock", "Min", "Status", "Cost value", "Retail value"],
            &bold,
        )?;
        sheet.set_column_width(0, 30)?;
        for (i, product) in report.products.iter().enumerate() {
            let row = i as u32 + 1;
            let units = product.quantity.max(0);
            let status = if product.is_out_of_stock() {
                "out"
            } else if product.is_low_stock() {
                "low"
            } else {
                "ok"
            };
            sheet.write_string(row, 0, product.name.as_str())?;
            sheet.write_number(row, 1, product.quantity as f64)?;
            sheet.write_number(row, 2, product.min_stock as f64)?;
            sheet.write_string(row, 3, status)?;
            sheet.write_number_with_format(
                row,
                4,
                amount(config, product.cost().multiply_quantity(units)),
                &money_format,
            )?;
            sheet.write_number_with_format(
                row,
                5,
                amount(config, product.price().multiply_quantity(units)),
                &money_format,
            )?;
        }
    }

    workbook.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::product::{run as run_product, NewProduct, ProductCommand};
    use crate::commands::sale::{run as run_sale, CartArgs, NewSale, SaleCommand};
    use crate::commands::testing::state;
    use tally_core::PaymentMethod;

    async fn sell_some(state: &AppState) {
        run_product(
            state,
            ProductCommand::Add(NewProduct {
                name: "Cola".to_string(),
                barcode: None,
                price: "1.50".to_string(),
                cost: Some("0.60".to_string()),
                quantity: 30,
                min_stock: 20,
                category: None,
                supplier: None,
                tiers: Some("6@135".to_string()),
                description: None,
            }),
        )
        .await
        .unwrap();

        for (line, method) in [("cola:6", PaymentMethod::Cash), ("cola:2", PaymentMethod::Card)] {
            run_sale(
                state,
                SaleCommand::New(NewSale {
                    cart: CartArgs {
                        lines: vec![line.parse().unwrap()],
                        discount: None,
                        prices: Vec::new(),
                        tax_rate: None,
                    },
                    payment: method,
                    tendered: None,
                    customer: None,
                    notes: None,
                    print: false,
                }),
            )
            .await
            .unwrap();
        }
    }

    fn today() -> ReportArgs {
        ReportArgs {
            period: PeriodArgs {
                period: ReportPeriod::Today,
                from: None,
                to: None,
            },
            top: 5,
            xlsx: None,
        }
    }

    #[tokio::test]
    async fn test_report_totals() {
        let state = state().await;
        sell_some(&state).await;

        let report = build(&state, &today()).await.unwrap();
        let s = &report.sales.summary;
        assert_eq!(s.transactions, 2);
        assert_eq!(s.items_sold, 8);
        // 6 × 135 + 2 × 150
        assert_eq!(s.revenue.cents(), 1110);
        assert_eq!(s.bulk_savings.cents(), 90);
        assert_eq!(s.cost_of_goods.cents(), 480);
        assert_eq!(report.sales.payments.len(), 2);
        // 22 left, reorder at 20: not low
        assert!(report.inventory.low_stock.is_empty());

        let text = run(&state, today()).await.unwrap();
        assert!(text.contains("Revenue"));
        assert!(text.contains("$11.10"));
        assert!(text.contains("Top products"));
    }

    #[tokio::test]
    async fn test_custom_range_outside_sales_is_empty() {
        let state = state().await;
        sell_some(&state).await;

        let mut args = today();
        args.period.from = NaiveDate::from_ymd_opt(2001, 1, 1);
        args.period.to = NaiveDate::from_ymd_opt(2001, 1, 31);

        let report = build(&state, &args).await.unwrap();
        assert_eq!(report.sales.summary.transactions, 0);
        assert!(report.sales.daily.is_empty());
    }

    #[tokio::test]
    async fn test_xlsx_written() {
        let state = state().await;
        sell_some(&state).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xlsx");
        let mut args = today();
        args.xlsx = Some(path.clone());

        let out = run(&state, args).await.unwrap();
        assert!(out.contains("Spreadsheet written"));

        let bytes = std::fs::read(&path).unwrap();
        // xlsx is a zip archive
        assert_eq!(&bytes[..2], b"PK");
    }
}
