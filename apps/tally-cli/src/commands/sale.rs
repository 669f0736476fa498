//! # Sale Commands
//!
//! Ringing up sales, looking them up, voiding them and printing receipts.
//!
//! ## Sale Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  tally sale new cola:12 bread:1:10% --payment cash --tendered 20        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  build_cart: lookup each CODE ──► Cart::add_product (stock check)       │
//! │              line discount, --price overrides, --discount on cart       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Cart::checkout(tax, payment) ──► CheckoutDraft (bulk tiers applied)   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SaleRepository::record_sale ──► one transaction:                       │
//! │       sale + items, stock decrement, `out` movements, receipt number    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  "Sale 20260310-0004: total $19.44, change $0.56"                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `tally quote` runs the same cart building and pricing without touching
//! the database.

use clap::{Args, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tally_core::pricing::{LineDiscount, LinePricing};
use tally_core::receipt::render_receipt;
use tally_core::{Cart, CartTotals, Payment, PaymentMethod, Sale, SaleWithItems, TaxRate};
use tracing::{debug, info};

use super::report::PeriodArgs;
use super::{fields, find_product, or_dash, table, CartLineArg};
use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Arguments
// =============================================================================

/// What goes in the cart; shared by `sale new` and `quote`.
#[derive(Debug, Args)]
pub struct CartArgs {
    /// Lines as CODE:QTY[:DISCOUNT], e.g. 5449000000996:6 bread:1:10%
    #[arg(required = true, value_name = "CODE:QTY[:DISCOUNT]")]
    pub lines: Vec<CartLineArg>,

    /// Discount on the whole cart: cents (250) or percent (5%)
    #[arg(long, value_parser = LineDiscount::parse)]
    pub discount: Option<LineDiscount>,

    /// Manual unit price for one product, e.g. --price bread=2.50
    #[arg(long = "price", value_name = "CODE=PRICE")]
    pub prices: Vec<String>,

    /// Tax rate in percent instead of the configured default
    #[arg(long)]
    pub tax_rate: Option<f64>,
}

#[derive(Debug, Args)]
pub struct NewSale {
    #[command(flatten)]
    pub cart: CartArgs,

    /// cash, card, transfer or credit
    #[arg(long, default_value = "cash")]
    pub payment: PaymentMethod,

    /// Cash handed over, e.g. 20; omit for the exact amount
    #[arg(long)]
    pub tendered: Option<String>,

    /// Customer id, phone or name
    #[arg(long)]
    pub customer: Option<String>,

    #[arg(long)]
    pub notes: Option<String>,

    /// Print the receipt instead of a one-line summary
    #[arg(long)]
    pub print: bool,
}

#[derive(Debug, Subcommand)]
pub enum SaleCommand {
    /// Ring up a sale
    New(NewSale),

    /// List sales in a period
    List {
        #[command(flatten)]
        period: PeriodArgs,

        /// Only sales to this customer (id, phone or name)
        #[arg(long)]
        customer: Option<String>,
    },

    /// Show a sale with its items
    Show {
        /// Sale id or receipt number
        key: String,
    },

    /// Void a completed sale and put its items back in stock
    Void { key: String },

    /// Print the receipt of a sale
    Receipt {
        key: String,

        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

// =============================================================================
// Cart Building
// =============================================================================

/// Looks up every line and builds a priced cart.
async fn build_cart(state: &AppState, args: &CartArgs) -> Result<Cart, ApiError> {
    let mut cart = Cart::new();

    for line in &args.lines {
        let product = find_product(state, &line.code).await?;
        cart.add_product(&product, line.quantity)?;
        if let Some(discount) = line.discount {
            cart.set_line_discount(&product.id, Some(discount))?;
        }
        debug!(product = %product.name, quantity = line.quantity, "Added to cart");
    }

    for spec in &args.prices {
        let (code, price) = spec
            .split_once('=')
            .ok_or_else(|| ApiError::validation(format!("'{}' is not CODE=PRICE", spec)))?;
        let product = find_product(state, code.trim()).await?;
        let price = state.config.parse_amount(price)?;
        if price.is_negative() {
            return Err(ApiError::validation("Price cannot be negative"));
        }
        cart.override_price(&product.id, price)?;
    }

    cart.set_cart_discount(args.discount)?;
    Ok(cart)
}

fn tax_rate(state: &AppState, args: &CartArgs) -> Result<TaxRate, ApiError> {
    let rate = match args.tax_rate {
        Some(pct) => TaxRate::from_percentage(pct),
        None => state.config.tax_rate(),
    };
    tally_core::validation::validate_tax_rate_bps(rate.bps())?;
    Ok(rate)
}

// =============================================================================
// Quote
// =============================================================================

/// Prices a cart without recording anything.
pub async fn quote(state: &AppState, args: CartArgs) -> Result<String, ApiError> {
    let cart = build_cart(state, &args).await?;
    let rate = tax_rate(state, &args)?;
    let priced = cart.priced_lines();
    let totals = cart.totals(rate, state.config.tax_mode);

    if state.json {
        let lines: Vec<serde_json::Value> = cart
            .lines()
            .iter()
            .zip(&priced)
            .map(|(line, pricing)| {
                json!({
                    "product_id": line.product_id,
                    "name": line.name,
                    "pricing": pricing,
                })
            })
            .collect();
        return Ok(serde_json::to_string_pretty(&json!({
            "lines": lines,
            "totals": totals,
        }))?);
    }

    let names: Vec<&str> = cart.lines().iter().map(|l| l.name.as_str()).collect();
    Ok(format!(
        "{}\n\n{}",
        lines_table(state, &names, &priced),
        totals_block(state, &totals)
    ))
}

fn lines_table(state: &AppState, names: &[&str], priced: &[LinePricing]) -> String {
    let rows: Vec<Vec<String>> = names
        .iter()
        .zip(priced)
        .map(|(name, p)| {
            vec![
                name.to_string(),
                p.quantity.to_string(),
                state.money(p.unit_price),
                match &p.tier {
                    Some(tier) => format!("{}+ tier", tier.min_quantity),
                    None if p.unit_price != p.base_unit_price => "override".to_string(),
                    None => String::new(),
                },
                if p.discount.is_zero() {
                    String::new()
                } else {
                    format!("-{}", state.money(p.discount))
                },
                state.money(p.subtotal),
            ]
        })
        .collect();

    table(
        &["Item", "Qty", "Unit", "Price", "Discount", "Subtotal"],
        &rows,
        &[1, 2, 4, 5],
    )
}

fn totals_block(state: &AppState, totals: &CartTotals) -> String {
    let mut pairs = vec![("Gross", state.money(totals.gross))];
    if !totals.bulk_savings.is_zero() {
        pairs.push(("Bulk savings", format!("-{}", state.money(totals.bulk_savings))));
    }
    if !totals.line_discounts.is_zero() {
        pairs.push(("Line discounts", format!("-{}", state.money(totals.line_discounts))));
    }
    if !totals.cart_discount.is_zero() {
        pairs.push(("Cart discount", format!("-{}", state.money(totals.cart_discount))));
    }
    pairs.push(("Subtotal", state.money(totals.subtotal)));
    pairs.push(("Tax", state.money(totals.tax)));
    pairs.push(("Total", state.money(totals.total)));
    fields(&pairs)
}

// =============================================================================
// Sales
// =============================================================================

pub async fn run(state: &AppState, command: SaleCommand) -> Result<String, ApiError> {
    match command {
        SaleCommand::New(new) => new_sale(state, new).await,
        SaleCommand::List { period, customer } => {
            let sales = match customer {
                Some(key) => {
                    let customer = state
                        .db
                        .customers()
                        .lookup(&key)
                        .await?
                        .ok_or_else(|| ApiError::not_found("Customer", &key))?;
                    let range = period.resolve().range(chrono::Utc::now());
                    state
                        .db
                        .sales()
                        .list_for_customer(&customer.id)
                        .await?
                        .into_iter()
                        .filter(|s| range.contains(s.created_at))
                        .collect()
                }
                None => {
                    let range = period.resolve().range(chrono::Utc::now());
                    state.db.sales().list_between(range.from, range.to).await?
                }
            };
            state.render(&sales, |sales| sales_table(state, sales))
        }
        SaleCommand::Show { key } => {
            let sale = state.db.sales().get_with_items(&key).await?;
            state.render(&sale, |sale| sale_details(state, sale))
        }
        SaleCommand::Void { key } => {
            let sale = state
                .db
                .sales()
                .find(&key)
                .await?
                .ok_or_else(|| ApiError::not_found("Sale", &key))?;
            let voided = state.db.sales().void_sale(&sale.id).await?;
            info!(receipt = %voided.receipt_number, "Sale voided");
            state.render(&voided, |s| {
                format!(
                    "Voided sale {} ({} returned to stock)",
                    s.receipt_number,
                    state.money(s.total())
                )
            })
        }
        SaleCommand::Receipt { key, out } => {
            let sale = state.db.sales().get_with_items(&key).await?;
            let text = receipt_text(state, &sale).await?;
            match out {
                Some(path) => {
                    std::fs::write(&path, &text)?;
                    Ok(format!("Receipt written to {}", path.display()))
                }
                None => Ok(text),
            }
        }
    }
}

async fn new_sale(state: &AppState, new: NewSale) -> Result<String, ApiError> {
    let mut cart = build_cart(state, &new.cart).await?;
    let rate = tax_rate(state, &new.cart)?;

    if let Some(key) = &new.customer {
        let customer = state
            .db
            .customers()
            .lookup(key)
            .await?
            .ok_or_else(|| ApiError::not_found("Customer", key))?;
        cart.customer_id = Some(customer.id);
    }
    cart.notes = new.notes;

    let tendered = match &new.tendered {
        Some(amount) => Some(state.config.parse_amount(amount)?),
        None => None,
    };

    let draft = cart.checkout(
        rate,
        state.config.tax_mode,
        Payment {
            method: new.payment,
            tendered,
        },
    )?;
    let recorded = state.db.sales().record_sale(draft).await?;

    if new.print && !state.json {
        return receipt_text(state, &recorded).await;
    }

    state.render(&recorded, |r| {
        let mut line = format!(
            "Sale {}: total {}",
            r.sale.receipt_number,
            state.money(r.sale.total())
        );
        if r.sale.change_cents > 0 {
            line.push_str(&format!(", change {}", state.cents(r.sale.change_cents)));
        }
        if r.sale.bulk_savings_cents > 0 {
            line.push_str(&format!(
                ", bulk savings {}",
                state.cents(r.sale.bulk_savings_cents)
            ));
        }
        line
    })
}

async fn receipt_text(state: &AppState, sale: &SaleWithItems) -> Result<String, ApiError> {
    let layout = state.config.receipt_layout()?;
    let customer = match &sale.sale.customer_id {
        Some(id) => state.db.customers().get_by_id(id).await?.map(|c| c.name),
        None => None,
    };
    Ok(render_receipt(
        &layout,
        &sale.sale,
        &sale.items,
        customer.as_deref(),
    ))
}

fn sales_table(state: &AppState, sales: &[Sale]) -> String {
    if sales.is_empty() {
        return "No sales in this period".to_string();
    }

    let rows: Vec<Vec<String>> = sales
        .iter()
        .map(|s| {
            vec![
                s.receipt_number.clone(),
                s.created_at.format("%Y-%m-%d %H:%M").to_string(),
                s.payment_method.to_string(),
                state.cents(s.total_cents),
                if s.is_voided() { "VOID" } else { "" }.to_string(),
            ]
        })
        .collect();

    let completed: i64 = sales
        .iter()
        .filter(|s| !s.is_voided())
        .map(|s| s.total_cents)
        .sum();

    format!(
        "{}\n\n{} sale(s), {} taken",
        table(&["Receipt", "When", "Payment", "Total", ""], &rows, &[3]),
        sales.len(),
        state.cents(completed)
    )
}

fn sale_details(state: &AppState, sale: &SaleWithItems) -> String {
    let s = &sale.sale;
    let mut pairs = vec![
        ("Receipt", s.receipt_number.clone()),
        ("Id", s.id.clone()),
        ("Date", s.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ("Status", s.status.to_string()),
        ("Payment", s.payment_method.to_string()),
        ("Customer", or_dash(&s.customer_id)),
        ("Gross", state.cents(s.gross_cents)),
        ("Bulk savings", state.cents(s.bulk_savings_cents)),
        ("Discount", state.cents(s.discount_cents)),
        ("Subtotal", state.cents(s.subtotal_cents)),
        ("Tax", state.cents(s.tax_cents)),
        ("Total", state.cents(s.total_cents)),
        ("Tendered", state.cents(s.amount_tendered_cents)),
        ("Change", state.cents(s.change_cents)),
    ];
    if let Some(voided_at) = s.voided_at {
        pairs.push(("Voided", voided_at.format("%Y-%m-%d %H:%M:%S").to_string()));
    }
    if let Some(notes) = &s.notes {
        pairs.push(("Notes", notes.clone()));
    }

    let rows: Vec<Vec<String>> = sale
        .items
        .iter()
        .map(|i| {
            vec![
                i.product_name.clone(),
                i.quantity.to_string(),
                state.cents(i.unit_price_cents),
                state.cents(i.base_price_cents),
                state.cents(i.discount_cents),
                state.cents(i.subtotal_cents),
            ]
        })
        .collect();

    format!(
        "{}\n\n{}",
        fields(&pairs),
        table(
            &["Item", "Qty", "Unit", "List", "Discount", "Subtotal"],
            &rows,
            &[1, 2, 3, 4, 5]
        )
    )
}
