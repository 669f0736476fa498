//! # Product Commands
//!
//! Catalog maintenance: add, list, search, show, update, delete and the
//! reorder list.
//!
//! Prices are typed in major units (`1.50`); bulk tiers use
//! `QTY@PRICE_CENTS` pairs (`6@135,12@120`).

use chrono::Utc;
use clap::{Args, Subcommand};
use serde_json::json;
use std::collections::HashMap;
use tally_core::pricing::parse_tiers;
use tally_core::{BulkPriceTier, Product};
use tally_db::StockReceipt;
use tracing::{debug, info};

use super::{category_id, fields, find_product, or_dash, supplier_id, table};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Subcommand)]
pub enum ProductCommand {
    /// Add a product to the catalog
    Add(NewProduct),

    /// List all products
    List {
        /// Only products in this category (name or id)
        #[arg(long)]
        category: Option<String>,
    },

    /// Search by name or barcode
    Search {
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Show one product with its recent stock movements
    Show {
        /// Product id, barcode or exact name
        code: String,
    },

    /// Change product details (stock changes go through `tally stock`)
    Update {
        code: String,
        #[command(flatten)]
        changes: ProductChanges,
    },

    /// Delete a product that has never been sold
    Delete { code: String },

    /// Products at or below their reorder level
    LowStock,
}

#[derive(Debug, Args)]
pub struct NewProduct {
    pub name: String,

    #[arg(long)]
    pub barcode: Option<String>,

    /// Selling price, e.g. 1.50
    #[arg(long)]
    pub price: String,

    /// Purchase cost, e.g. 0.95
    #[arg(long)]
    pub cost: Option<String>,

    /// Opening stock, recorded as a purchase
    #[arg(long, default_value_t = 0)]
    pub quantity: i64,

    /// Reorder level
    #[arg(long, default_value_t = 0)]
    pub min_stock: i64,

    /// Category name or id
    #[arg(long)]
    pub category: Option<String>,

    /// Supplier name or id
    #[arg(long)]
    pub supplier: Option<String>,

    /// Bulk tiers as QTY@PRICE_CENTS, e.g. 6@135,12@120
    #[arg(long)]
    pub tiers: Option<String>,

    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Args)]
pub struct ProductChanges {
    #[arg(long)]
    pub name: Option<String>,

    /// New barcode; an empty string removes it
    #[arg(long)]
    pub barcode: Option<String>,

    #[arg(long)]
    pub price: Option<String>,

    #[arg(long)]
    pub cost: Option<String>,

    #[arg(long)]
    pub min_stock: Option<i64>,

    /// Category name or id; an empty string removes it
    #[arg(long)]
    pub category: Option<String>,

    /// Supplier name or id; an empty string removes it
    #[arg(long)]
    pub supplier: Option<String>,

    /// Replace the bulk tiers, e.g. 6@135,12@120
    #[arg(long, conflicts_with = "clear_tiers")]
    pub tiers: Option<String>,

    /// Remove all bulk tiers
    #[arg(long)]
    pub clear_tiers: bool,

    #[arg(long)]
    pub description: Option<String>,
}

pub async fn run(state: &AppState, command: ProductCommand) -> Result<String, ApiError> {
    match command {
        ProductCommand::Add(new) => add(state, new).await,
        ProductCommand::List { category } => {
            let products = match category_id(state, category.as_deref()).await? {
                Some(id) => state.db.products().list_by_category(&id).await?,
                None => state.db.products().list().await?,
            };
            listing(state, &products).await
        }
        ProductCommand::Search { query, limit } => {
            let products = state.db.products().search(&query, limit.min(100)).await?;
            debug!(query = %query, count = products.len(), "product search");
            listing(state, &products).await
        }
        ProductCommand::Show { code } => show(state, &code).await,
        ProductCommand::Update { code, changes } => update(state, &code, changes).await,
        ProductCommand::Delete { code } => {
            let product = find_product(state, &code).await?;
            state.db.products().delete(&product.id).await?;
            info!(id = %product.id, name = %product.name, "Product deleted");
            state.render(&json!({ "deleted": product.id }), |_| {
                format!("Deleted {}", product.name)
            })
        }
        ProductCommand::LowStock => {
            let products = state.db.products().low_stock().await?;
            state.render(&products, |products| {
                if products.is_empty() {
                    return "All products are above their reorder level".to_string();
                }
                let rows: Vec<Vec<String>> = products
                    .iter()
                    .map(|p| {
                        vec![
                            p.name.clone(),
                            p.quantity.to_string(),
                            p.min_stock.to_string(),
                            if p.is_out_of_stock() { "OUT" } else { "low" }.to_string(),
                        ]
                    })
                    .collect();
                table(&["Name", "Stock", "Min", ""], &rows, &[1, 2])
            })
        }
    }
}

async fn add(state: &AppState, new: NewProduct) -> Result<String, ApiError> {
    let now = Utc::now();
    let price = state.config.parse_amount(&new.price)?;
    let cost = match &new.cost {
        Some(cost) => state.config.parse_amount(cost)?,
        None => tally_core::Money::zero(),
    };
    if new.quantity < 0 {
        return Err(ApiError::validation("Opening quantity cannot be negative"));
    }

    let product = Product {
        id: String::new(),
        name: new.name,
        barcode: new.barcode,
        description: new.description,
        price_cents: price.cents(),
        cost_cents: cost.cents(),
        quantity: 0,
        min_stock: new.min_stock,
        category_id: category_id(state, new.category.as_deref()).await?,
        supplier_id: supplier_id(state, new.supplier.as_deref()).await?,
        bulk_pricing: tiers(new.tiers.as_deref())?,
        created_at: now,
        updated_at: now,
    };

    let mut stored = state.db.products().insert(&product).await?;

    if new.quantity > 0 {
        state
            .db
            .stock()
            .receive(&StockReceipt {
                product_id: stored.id.clone(),
                quantity: new.quantity,
                unit_cost_cents: Some(stored.cost_cents),
                supplier_id: stored.supplier_id.clone(),
                notes: Some("Opening stock".to_string()),
            })
            .await?;
        stored = state.db.products().get(&stored.id).await?;
    }

    info!(id = %stored.id, name = %stored.name, "Product added");
    state.render(&stored, |p| {
        format!("Added {} ({}) at {}", p.name, p.id, state.cents(p.price_cents))
    })
}

async fn update(
    state: &AppState,
    code: &str,
    changes: ProductChanges,
) -> Result<String, ApiError> {
    let mut product = find_product(state, code).await?;

    if let Some(name) = changes.name {
        product.name = name;
    }
    if let Some(barcode) = changes.barcode {
        product.barcode = Some(barcode);
    }
    if let Some(price) = changes.price {
        product.price_cents = state.config.parse_amount(&price)?.cents();
    }
    if let Some(cost) = changes.cost {
        product.cost_cents = state.config.parse_amount(&cost)?.cents();
    }
    if let Some(min_stock) = changes.min_stock {
        product.min_stock = min_stock;
    }
    if let Some(category) = changes.category {
        product.category_id = if category.trim().is_empty() {
            None
        } else {
            category_id(state, Some(&category)).await?
        };
    }
    if let Some(supplier) = changes.supplier {
        product.supplier_id = if supplier.trim().is_empty() {
            None
        } else {
            supplier_id(state, Some(&supplier)).await?
        };
    }
    if changes.clear_tiers {
        product.bulk_pricing.clear();
    } else if let Some(spec) = changes.tiers {
        product.bulk_pricing = tiers(Some(&spec))?;
    }
    if let Some(description) = changes.description {
        product.description = Some(description);
    }

    let stored = state.db.products().update(&product).await?;
    info!(id = %stored.id, "Product updated");
    state.render(&stored, |p| format!("Updated {}", p.name))
}

async fn show(state: &AppState, code: &str) -> Result<String, ApiError> {
    let product = find_product(state, code).await?;
    let movements = state.db.stock().history(&product.id, 10).await?;

    let category = match &product.category_id {
        Some(id) => state.db.categories().get_by_id(id).await?.map(|c| c.name),
        None => None,
    };
    let supplier = match &product.supplier_id {
        Some(id) => state.db.suppliers().get_by_id(id).await?.map(|s| s.name),
        None => None,
    };

    if state.json {
        return Ok(serde_json::to_string_pretty(&json!({
            "product": product,
            "movements": movements,
        }))?);
    }

    let mut out = fields(&[
        ("Name", product.name.clone()),
        ("Id", product.id.clone()),
        ("Barcode", or_dash(&product.barcode)),
        ("Price", state.cents(product.price_cents)),
        ("Cost", state.cents(product.cost_cents)),
        ("Bulk", tier_summary(state, &product.bulk_pricing)),
        ("Stock", format!("{} (reorder at {})", product.quantity, product.min_stock)),
        ("Category", or_dash(&category)),
        ("Supplier", or_dash(&supplier)),
        ("Description", or_dash(&product.description)),
    ]);

    if !movements.is_empty() {
        let rows: Vec<Vec<String>> = movements
            .iter()
            .map(|m| {
                vec![
                    m.created_at.format("%Y-%m-%d %H:%M").to_string(),
                    format!("{:+}", m.delta()),
                    format!("{:?}", m.reason).to_lowercase(),
                    or_dash(&m.notes),
                ]
            })
            .collect();
        out.push_str("\n\nRecent movements\n");
        out.push_str(&table(&["When", "Change", "Reason", "Notes"], &rows, &[1]));
    }

    Ok(out)
}

async fn listing(state: &AppState, products: &[Product]) -> Result<String, ApiError> {
    let categories: HashMap<String, String> = state
        .db
        .categories()
        .list()
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();

    state.render(&products, |products| {
        if products.is_empty() {
            return "No products found".to_string();
        }
        let rows: Vec<Vec<String>> = products
            .iter()
            .map(|p| {
                let category = p
                    .category_id
                    .as_ref()
                    .and_then(|id| categories.get(id).cloned());
                vec![
                    p.name.clone(),
                    or_dash(&p.barcode),
                    state.cents(p.price_cents),
                    p.quantity.to_string(),
                    or_dash(&category),
                    if p.bulk_pricing.is_empty() { "" } else { "bulk" }.to_string(),
                ]
            })
            .collect();
        table(
            &["Name", "Barcode", "Price", "Stock", "Category", ""],
            &rows,
            &[2, 3],
        )
    })
}

fn tiers(spec: Option<&str>) -> Result<Vec<BulkPriceTier>, ApiError> {
    match spec {
        Some(spec) => Ok(parse_tiers(spec)?),
        None => Ok(Vec::new()),
    }
}

fn tier_summary(state: &AppState, tiers: &[BulkPriceTier]) -> String {
    if tiers.is_empty() {
        return "-".to_string();
    }
    tiers
        .iter()
        .map(|t| format!("{}+ @ {}", t.min_quantity, state.cents(t.unit_price_cents)))
        .collect::<Vec<_>>()
        .join(", ")
}
