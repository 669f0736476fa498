//! # Stock Repository
//!
//! The inventory ledger. Every change to `products.quantity` outside of a
//! catalog insert goes through here and leaves a `stock_movements` row.
//!
//! ## Movements
//! ```text
//! ┌──────────────┬───────────┬──────────────────────────────────────────┐
//! │ reason       │ direction │ written by                               │
//! ├──────────────┼───────────┼──────────────────────────────────────────┤
//! │ purchase     │ in        │ receive()                                │
//! │ adjustment   │ in / out  │ adjust()                                 │
//! │ sale         │ out       │ SaleRepository::record_sale()            │
//! │ void         │ in        │ SaleRepository::void_sale()              │
//! │ import       │ in        │ TransferService::import() (new products) │
//! └──────────────┴───────────┴──────────────────────────────────────────┘
//! ```
//!
//! The product update and the ledger row share one transaction.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::product::ProductRepository;
use crate::repository::clean;
use tally_core::validation::validate_non_negative;
use tally_core::{MovementType, StockMovement, StockReason, ValidationError};

const SELECT_MOVEMENT: &str = r#"
    SELECT
        id, product_id, movement_type, quantity, unit_cost_cents,
        supplier_id, reason, reference, notes, created_at
    FROM stock_movements
"#;

/// Goods arriving from a supplier.
#[derive(Debug, Clone, Default)]
pub struct StockReceipt {
    pub product_id: String,
    pub quantity: i64,
    /// New unit cost; when set it also becomes the product's cost.
    pub unit_cost_cents: Option<i64>,
    pub supplier_id: Option<String>,
    pub notes: Option<String>,
}

/// Builds a ledger entry for a signed delta.
pub(crate) fn movement(
    product_id: &str,
    delta: i64,
    reason: StockReason,
    now: DateTime<Utc>,
) -> StockMovement {
    StockMovement {
        id: Uuid::new_v4().to_string(),
        product_id: product_id.to_string(),
        movement_type: if delta < 0 {
            MovementType::Out
        } else {
            MovementType::In
        },
        quantity: delta.abs(),
        unit_cost_cents: None,
        supplier_id: None,
        reason,
        reference: None,
        notes: None,
        created_at: now,
    }
}

#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Receives goods: raises stock, records a `purchase` movement and, when a
    /// unit cost is given, updates the product's cost.
    pub async fn receive(&self, receipt: &StockReceipt) -> DbResult<StockMovement> {
        if receipt.quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }
        if let Some(cost) = receipt.unit_cost_cents {
            validate_non_negative("unit_cost_cents", cost)?;
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let on_hand =
            ProductRepository::apply_delta_on(&mut tx, &receipt.product_id, receipt.quantity, now)
                .await?;

        if let Some(cost) = receipt.unit_cost_cents {
            sqlx::query("UPDATE products SET cost_cents = ?2 WHERE id = ?1")
                .bind(&receipt.product_id)
                .bind(cost)
                .execute(&mut *tx)
                .await?;
        }

        let mut entry = movement(&receipt.product_id, receipt.quantity, StockReason::Purchase, now);
        entry.unit_cost_cents = receipt.unit_cost_cents;
        entry.supplier_id = clean(&receipt.supplier_id);
        entry.notes = clean(&receipt.notes);
        Self::record_on(&mut tx, &entry).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            product_id = %receipt.product_id,
            quantity = receipt.quantity,
            on_hand = on_hand,
            "Stock received"
        );
        Ok(entry)
    }

    /// Manual correction (count, damage, loss). Negative deltas cannot take
    /// stock below zero.
    pub async fn adjust(
        &self,
        product_id: &str,
        delta: i64,
        notes: Option<&str>,
    ) -> DbResult<StockMovement> {
        if delta == 0 {
            return Err(ValidationError::InvalidFormat {
                field: "delta".to_string(),
                reason: "must not be zero".to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        ProductRepository::apply_delta_on(&mut tx, product_id, delta, now).await?;

        let mut entry = movement(product_id, delta, StockReason::Adjustment, now);
        entry.notes = notes.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
        Self::record_on(&mut tx, &entry).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(product_id = %product_id, delta = delta, "Stock adjusted");
        Ok(entry)
    }

    /// Movements for one product, newest first.
    pub async fn history(&self, product_id: &str, limit: u32) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "{} WHERE product_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            SELECT_MOVEMENT
        );
        let movements = sqlx::query_as::<_, StockMovement>(&sql)
            .bind(product_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(movements)
    }

    /// Movements attached to a record, e.g. every line of a sale.
    pub async fn by_reference(&self, reference: &str) -> DbResult<Vec<StockMovement>> {
        let sql = format!("{} WHERE reference = ?1 ORDER BY rowid", SELECT_MOVEMENT);
        let movements = sqlx::query_as::<_, StockMovement>(&sql)
            .bind(reference)
            .fetch_all(&self.pool)
            .await?;
        Ok(movements)
    }

    pub(crate) async fn record_on(
        conn: &mut SqliteConnection,
        entry: &StockMovement,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, product_id, movement_type, quantity, unit_cost_cents,
                supplier_id, reason, reference, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.product_id)
        .bind(entry.movement_type)
        .bind(entry.quantity)
        .bind(entry.unit_cost_cents)
        .bind(&entry.supplier_id)
        .bind(entry.reason)
        .bind(&entry.reference)
        .bind(&entry.notes)
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use tally_core::{CoreError, Product};

    async fn setup(quantity: i64) -> (Database, Product) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .insert(&Product {
                id: String::new(),
                name: "Rice 1kg".to_string(),
                barcode: None,
                description: None,
                price_cents: 250,
                cost_cents: 180,
                quantity,
                min_stock: 0,
                category_id: None,
                supplier_id: None,
                bulk_pricing: Vec::new(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        (db, product)
    }

    #[tokio::test]
    async fn test_receive_updates_stock_and_cost() {
        let (db, rice) = setup(4).await;

        let entry = db
            .stock()
            .receive(&StockReceipt {
                product_id: rice.id.clone(),
                quantity: 20,
                unit_cost_cents: Some(170),
                supplier_id: None,
                notes: Some("Invoice 881".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(entry.movement_type, MovementType::In);
        assert_eq!(entry.reason, StockReason::Purchase);

        let rice = db.products().get(&rice.id).await.unwrap();
        assert_eq!(rice.quantity, 24);
        assert_eq!(rice.cost_cents, 170);

        let history = db.stock().history(&rice.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].notes.as_deref(), Some("Invoice 881"));
    }

    #[tokio::test]
    async fn test_receive_rejects_zero_quantity() {
        let (db, rice) = setup(4).await;
        let receipt = StockReceipt {
            product_id: rice.id,
            quantity: 0,
            ..Default::default()
        };
        assert!(db.stock().receive(&receipt).await.is_err());
    }

    #[tokio::test]
    async fn test_adjust_guard_leaves_no_movement() {
        let (db, rice) = setup(3).await;

        let out = db.stock().adjust(&rice.id, -2, Some("damaged")).await.unwrap();
        assert_eq!(out.movement_type, MovementType::Out);
        assert_eq!(out.quantity, 2);

        let err = db.stock().adjust(&rice.id, -5, None).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InsufficientStock { .. })));

        assert_eq!(db.products().get(&rice.id).await.unwrap().quantity, 1);
        assert_eq!(db.stock().history(&rice.id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_receive_unknown_product() {
        let (db, _) = setup(0).await;
        let receipt = StockReceipt {
            product_id: "missing".to_string(),
            quantity: 1,
            ..Default::default()
        };
        assert!(db.stock().receive(&receipt).await.unwrap_err().is_not_found());
    }
}
