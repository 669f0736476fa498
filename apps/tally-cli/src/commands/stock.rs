//! # Stock Commands
//!
//! Every change to stock on hand goes through the movement ledger.
//!
//! ```text
//! tally stock receive cola 24 --cost 0.85 --supplier "Metro"
//!      │
//!      ▼
//! StockRepository::receive ──► products.quantity += 24
//!                          ──► products.cost_cents = 85
//!                          ──► stock_movements: in / purchase
//! ```

use clap::Subcommand;
use tally_core::{MovementType, StockMovement};
use tally_db::StockReceipt;
use tracing::info;

use super::{find_product, or_dash, supplier_id, table};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Subcommand)]
pub enum StockCommand {
    /// Record goods received from a supplier
    Receive {
        /// Product id, barcode or exact name
        code: String,
        quantity: i64,
        /// Unit cost paid, e.g. 0.85; becomes the product's cost
        #[arg(long)]
        cost: Option<String>,
        /// Supplier name or id
        #[arg(long)]
        supplier: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Correct stock after a count, damage or loss (e.g. -- -3)
    Adjust {
        code: String,
        #[arg(allow_hyphen_values = true)]
        delta: i64,
        /// Why the count changed
        #[arg(long)]
        notes: Option<String>,
    },

    /// Show the movement ledger of a product, newest first
    History {
        code: String,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

pub async fn run(state: &AppState, command: StockCommand) -> Result<String, ApiError> {
    match command {
        StockCommand::Receive {
            code,
            quantity,
            cost,
            supplier,
            notes,
        } => {
            let product = find_product(state, &code).await?;
            let unit_cost_cents = match cost {
                Some(cost) => Some(state.config.parse_amount(&cost)?.cents()),
                None => None,
            };

            let movement = state
                .db
                .stock()
                .receive(&StockReceipt {
                    product_id: product.id.clone(),
                    quantity,
                    unit_cost_cents,
                    supplier_id: supplier_id(state, supplier.as_deref()).await?,
                    notes,
                })
                .await?;

            let on_hand = product.quantity + quantity;
            info!(product = %product.name, quantity, on_hand, "Stock received");
            state.render(&movement, |_| {
                format!("Received {} x {}, {} on hand", quantity, product.name, on_hand)
            })
        }
        StockCommand::Adjust { code, delta, notes } => {
            let product = find_product(state, &code).await?;
            let movement = state
                .db
                .stock()
                .adjust(&product.id, delta, notes.as_deref())
                .await?;

            let on_hand = product.quantity + delta;
            info!(product = %product.name, delta, on_hand, "Stock adjusted");
            state.render(&movement, |_| {
                format!("Adjusted {} by {:+}, {} on hand", product.name, delta, on_hand)
            })
        }
        StockCommand::History { code, limit } => {
            let product = find_product(state, &code).await?;
            let movements = state.db.stock().history(&product.id, limit).await?;
            state.render(&movements, |movements| history_table(state, movements))
        }
    }
}

fn history_table(state: &AppState, movements: &[StockMovement]) -> String {
    if movements.is_empty() {
        return "No stock movements".to_string();
    }

    let rows: Vec<Vec<String>> = movements
        .iter()
        .map(|m| {
            vec![
                m.created_at.format("%Y-%m-%d %H:%M").to_string(),
                match m.movement_type {
                    MovementType::In => "in",
                    MovementType::Out => "out",
                }
                .to_string(),
                m.quantity.to_string(),
                format!("{:?}", m.reason).to_lowercase(),
                m.unit_cost_cents
                    .map(|c| state.cents(c))
                    .unwrap_or_else(|| "-".to_string()),
                or_dash(&m.reference),
                or_dash(&m.notes),
            ]
        })
        .collect();

    table(
        &["When", "Type", "Qty", "Reason", "Unit cost", "Reference", "Notes"],
        &rows,
        &[2, 4],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::product::{run as run_product, NewProduct, ProductCommand};
    use crate::commands::testing::state;
    use crate::error::ErrorCode;

    async fn add_bread(state: &AppState) {
        run_product(
            state,
            ProductCommand::Add(NewProduct {
                name: "Bread".to_string(),
                barcode: None,
                price: "3.00".to_string(),
                cost: Some("1.80".to_string()),
                quantity: 5,
                min_stock: 2,
                category: None,
                supplier: None,
                tiers: None,
                description: None,
            }),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_receive_updates_cost() {
        let state = state().await;
        add_bread(&state).await;

        let out = run(
            &state,
            StockCommand::Receive {
                code: "Bread".to_string(),
                quantity: 10,
                cost: Some("2.00".to_string()),
                supplier: None,
                notes: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(out, "Received 10 x Bread, 15 on hand");

        let bread = crate::commands::find_product(&state, "Bread").await.unwrap();
        assert_eq!(bread.quantity, 15);
        assert_eq!(bread.cost_cents, 200);
    }

    #[tokio::test]
    async fn test_adjust_cannot_go_negative() {
        let state = state().await;
        add_bread(&state).await;

        let err = run(
            &state,
            StockCommand::Adjust {
                code: "Bread".to_string(),
                delta: -6,
                notes: Some("count".to_string()),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientStock);

        run(
            &state,
            StockCommand::Adjust {
                code: "Bread".to_string(),
                delta: -2,
                notes: Some("damaged".to_string()),
            },
        )
        .await
        .unwrap();

        let history = run(
            &state,
            StockCommand::History {
                code: "Bread".to_string(),
                limit: 10,
            },
        )
        .await
        .unwrap();
        assert!(history.contains("damaged"));
        assert!(history.contains("adjustment"));
        assert!(history.contains("purchase"));
    }
}
