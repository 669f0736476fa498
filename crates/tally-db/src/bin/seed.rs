//! # Seed Data Generator
//!
//! Populates a database with a small demo store for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./tally_dev.db
//! cargo run -p tally-db --bin seed
//!
//! # Specify database path and products per category
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db --per-category 10
//! ```
//!
//! ## Generated Data
//! - Categories: Beverages, Snacks, Dairy, Grocery, Household
//! - Two suppliers
//! - Products with a barcode, stock level and (for every third one) bulk
//!   price tiers at 6 and 12 units
//! - A few customers

use chrono::Utc;
use std::env;
use tally_core::{BulkPriceTier, Category, Customer, Product, Supplier};
use tally_db::{Database, DbConfig, StockReceipt};

/// Demo catalog: category name and product names.
const CATALOG: &[(&str, &[&str])] = &[
    (
        "Beverages",
        &[
            "Cola 330ml",
            "Cola 1.5L",
            "Orange Soda 330ml",
            "Mineral Water 500ml",
            "Mineral Water 1.5L",
            "Iced Tea 500ml",
            "Energy Drink 250ml",
            "Apple Juice 1L",
            "Instant Coffee 100g",
            "Black Tea 50 bags",
        ],
    ),
    (
        "Snacks",
        &[
            "Potato Chips 150g",
            "Salted Peanuts 200g",
            "Chocolate Bar 50g",
            "Butter Cookies 300g",
            "Crackers 250g",
            "Gummy Bears 100g",
            "Pretzels 200g",
            "Popcorn 90g",
        ],
    ),
    (
        "Dairy",
        &[
            "Whole Milk 1L",
            "Skim Milk 1L",
            "Plain Yogurt 500g",
            "Cheddar 200g",
            "Butter 250g",
            "Eggs x12",
            "Eggs x6",
        ],
    ),
    (
        "Grocery",
        &[
            "White Rice 1kg",
            "Brown Rice 1kg",
            "Spaghetti 500g",
            "Flour 1kg",
            "Sugar 1kg",
            "Salt 500g",
            "Cooking Oil 1L",
            "Canned Tomatoes 400g",
            "Canned Beans 400g",
            "Peanut Butter 340g",
        ],
    ),
    (
        "Household",
        &[
            "Dish Soap 500ml",
            "Laundry Powder 1kg",
            "Toilet Paper x4",
            "Paper Towels x2",
            "Matches x10",
            "Candles x6",
        ],
    ),
];

const SUPPLIERS: &[(&str, &str)] = &[
    ("Metro Wholesale", "+1 555 0100"),
    ("Valley Distributors", "+1 555 0199"),
];

const CUSTOMERS: &[(&str, &str)] = &[
    ("Ana Lima", "0812345678"),
    ("Ben Ortiz", "0899911122"),
    ("Corner Cafe", "0855501234"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut per_category: usize = usize::MAX;
    let mut db_path = String::from("./tally_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--per-category" | "-n" => {
                if i + 1 < args.len() {
                    per_category = args[i + 1].parse().unwrap_or(usize::MAX);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -n, --per-category <N>  Products per category (default: all)");
                println!("  -d, --db <PATH>         Database file path (default: ./tally_dev.db)");
                println!("  -h, --help              Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Tally POS Seed Data Generator");
    println!("=============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let now = Utc::now();
    let start = std::time::Instant::now();

    let mut supplier_ids = Vec::new();
    for (name, phone) in SUPPLIERS {
        let supplier = db
            .suppliers()
            .insert(&Supplier {
                id: String::new(),
                name: name.to_string(),
                contact_name: None,
                phone: Some(phone.to_string()),
                email: None,
                address: None,
                notes: None,
                created_at: now,
                updated_at: now,
            })
            .await?;
        supplier_ids.push(supplier.id);
    }

    let mut generated = 0;
    for (category_idx, (category_name, names)) in CATALOG.iter().enumerate() {
        let category = db
            .categories()
            .insert(&Category {
                id: String::new(),
                name: category_name.to_string(),
                description: None,
                created_at: now,
                updated_at: now,
            })
            .await?;

        for (product_idx, name) in names.iter().take(per_category).enumerate() {
            let seed = category_idx * 100 + product_idx;
            let supplier_id = &supplier_ids[seed % supplier_ids.len()];
            let product = generate_product(name, &category.id, supplier_id, seed);

            let stored = match db.products().insert(&product).await {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Failed to insert {}: {}", product.name, e);
                    continue;
                }
            };

            // opening stock goes through the ledger
            let quantity = ((seed * 7) % 60) as i64;
            if quantity > 0 {
                db.stock()
                    .receive(&StockReceipt {
                        product_id: stored.id.clone(),
                        quantity,
                        unit_cost_cents: Some(stored.cost_cents),
                        supplier_id: Some(supplier_id.clone()),
                        notes: Some("Opening stock".to_string()),
                    })
                    .await?;
            }

            generated += 1;
        }
    }

    for (name, phone) in CUSTOMERS {
        db.customers()
            .insert(&Customer {
                id: String::new(),
                name: name.to_string(),
                phone: Some(phone.to_string()),
                email: None,
                address: None,
                notes: None,
                created_at: now,
                updated_at: now,
            })
            .await?;
    }

    println!();
    println!("✓ Generated {} products in {:?}", generated, start.elapsed());

    let low = db.products().low_stock().await?;
    println!("  Low or out of stock: {}", low.len());
    let search_results = db.products().search("cola", 10).await?;
    println!("  Search 'cola': {} results", search_results.len());

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Builds one product with deterministic demo pricing.
fn generate_product(name: &str, category_id: &str, supplier_id: &str, seed: usize) -> Product {
    let now = Utc::now();

    // EAN-13 shaped, checksum not computed
    let barcode = Some(format!("200{:010}", seed));

    // $0.99 - $8.99
    let price_cents = 99 + ((seed * 37) % 800) as i64;
    // 55-75% of price
    let cost_cents = price_cents * (55 + (seed % 20) as i64) / 100;

    let bulk_pricing = if seed % 3 == 0 {
        vec![
            BulkPriceTier::new(6, price_cents * 95 / 100),
            BulkPriceTier::new(12, price_cents * 90 / 100),
        ]
    } else {
        Vec::new()
    };

    Product {
        id: String::new(),
        name: name.to_string(),
        barcode,
        description: None,
        price_cents,
        cost_cents,
        quantity: 0,
        min_stock: 5 + (seed % 6) as i64,
        category_id: Some(category_id.to_string()),
        supplier_id: Some(supplier_id.to_string()),
        bulk_pricing,
        created_at: now,
        updated_at: now,
    }
}
