//! # Sale Repository
//!
//! Database operations for sales and sale items.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. CHECKOUT (tally-core)                                              │
//! │     └── Cart::checkout() → CheckoutDraft (priced, validated)           │
//! │                                                                         │
//! │  2. RECORD (one transaction)                                           │
//! │     ├── next receipt number for today  → 20260307-0012                 │
//! │     ├── INSERT sales, sale_items                                       │
//! │     ├── products.quantity -= qty      (guarded, never below zero)      │
//! │     └── stock_movements: out / sale                                    │
//! │                                                                         │
//! │  3. (OPTIONAL) VOID (one transaction)                                  │
//! │     ├── status = voided, voided_at = now                               │
//! │     ├── products.quantity += qty                                       │
//! │     └── stock_movements: in / void                                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! If any line runs out of stock the whole sale is rolled back.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::product::ProductRepository;
use crate::repository::stock::{movement, StockRepository};
use tally_core::cart::format_receipt_number;
use tally_core::{
    CheckoutDraft, CoreError, Sale, SaleItem, SaleStatus, SaleWithItems, StockReason,
};

const SELECT_SALE: &str = r#"
    SELECT
        id, receipt_number, customer_id, payment_method, status,
        gross_cents, bulk_savings_cents, discount_cents, subtotal_cents,
        tax_cents, total_cents, amount_tendered_cents, change_cents,
        notes, created_at, voided_at
    FROM sales
"#;

const SELECT_ITEM: &str = r#"
    SELECT
        id, sale_id, product_id, product_name, quantity,
        unit_price_cents, base_price_cents, cost_cents,
        discount_cents, subtotal_cents, tier_min_quantity
    FROM sale_items
"#;

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    // =========================================================================
    // Recording
    // =========================================================================

    /// Persists a checked-out cart as a completed sale.
    ///
    /// ## Returns
    /// * `Ok(SaleWithItems)` - The stored sale with its receipt number
    /// * `Err(DbError::Core(InsufficientStock))` - A line exceeds stock on
    ///   hand; nothing was written
    pub async fn record_sale(&self, draft: CheckoutDraft) -> DbResult<SaleWithItems> {
        if draft.lines.is_empty() {
            return Err(CoreError::EmptyCart.into());
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let receipt_number = Self::next_receipt_number_on(&mut tx, now.date_naive()).await?;
        let record = draft.into_records(receipt_number, now);

        debug!(
            id = %record.sale.id,
            receipt_number = %record.sale.receipt_number,
            lines = record.items.len(),
            "Recording sale"
        );

        Self::insert_sale_on(&mut tx, &record.sale).await?;

        for (position, item) in record.items.iter().enumerate() {
            Self::insert_item_on(&mut tx, item, position as i64).await?;

            ProductRepository::apply_delta_on(&mut tx, &item.product_id, -item.quantity, now)
                .await?;

            let mut entry = movement(&item.product_id, -item.quantity, StockReason::Sale, now);
            entry.unit_cost_cents = Some(item.cost_cents);
            entry.reference = Some(record.sale.id.clone());
            StockRepository::record_on(&mut tx, &entry).await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            receipt_number = %record.sale.receipt_number,
            total_cents = record.sale.total_cents,
            "Sale completed"
        );
        Ok(record)
    }

    /// Voids a completed sale and puts its items back on the shelf.
    ///
    /// Voiding a voided sale fails with `InvalidSaleStatus`.
    pub async fn void_sale(&self, id: &str) -> DbResult<Sale> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let sale = Self::get_on(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", id))?;

        if sale.status != SaleStatus::Completed {
            warn!(id = %id, status = %sale.status, "Refusing to void sale");
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale.receipt_number,
                current_status: sale.status.to_string(),
            }
            .into());
        }

        sqlx::query("UPDATE sales SET status = 'voided', voided_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let items = Self::items_on(&mut tx, id).await?;
        for item in &items {
            ProductRepository::apply_delta_on(&mut tx, &item.product_id, item.quantity, now)
                .await?;

            let mut entry = movement(&item.product_id, item.quantity, StockReason::Void, now);
            entry.unit_cost_cents = Some(item.cost_cents);
            entry.reference = Some(sale.id.clone());
            StockRepository::record_on(&mut tx, &entry).await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(receipt_number = %sale.receipt_number, "Sale voided");

        Ok(Sale {
            status: SaleStatus::Voided,
            voided_at: Some(now),
            ..sale
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_on(&mut conn, id).await
    }

    pub async fn get_by_receipt(&self, receipt_number: &str) -> DbResult<Option<Sale>> {
        let sql = format!("{} WHERE receipt_number = ?1", SELECT_SALE);
        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(receipt_number.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(sale)
    }

    /// Resolves a sale id or receipt number.
    pub async fn find(&self, key: &str) -> DbResult<Option<Sale>> {
        match self.get_by_id(key.trim()).await? {
            Some(sale) => Ok(Some(sale)),
            None => self.get_by_receipt(key).await,
        }
    }

    /// Loads a sale with its items in entry order.
    pub async fn get_with_items(&self, key: &str) -> DbResult<SaleWithItems> {
        let sale = self
            .find(key)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", key))?;
        let items = self.items_for(&sale.id).await?;
        Ok(SaleWithItems { sale, items })
    }

    pub async fn items_for(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let mut conn = self.pool.acquire().await?;
        Self::items_on(&mut conn, sale_id).await
    }

    /// Sales (any status) created in `[from, to)`, oldest first.
    pub async fn list_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> DbResult<Vec<Sale>> {
        let sql = format!(
            "{} WHERE created_at >= ?1 AND created_at < ?2 ORDER BY created_at, receipt_number",
            SELECT_SALE
        );
        let sales = sqlx::query_as::<_, Sale>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        Ok(sales)
    }

    /// Sales in `[from, to)` with their items, for reports and exports.
    pub async fn sales_with_items_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<SaleWithItems>> {
        let sales = self.list_between(from, to).await?;
        if sales.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"{}
            WHERE sale_id IN (
                SELECT id FROM sales WHERE created_at >= ?1 AND created_at < ?2
            )
            ORDER BY sale_id, position"#,
            SELECT_ITEM
        );
        let items = sqlx::query_as::<_, SaleItem>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;

        let mut by_sale: HashMap<String, Vec<SaleItem>> = HashMap::new();
        for item in items {
            by_sale.entry(item.sale_id.clone()).or_default().push(item);
        }

        Ok(sales
            .into_iter()
            .map(|sale| {
                let items = by_sale.remove(&sale.id).unwrap_or_default();
                SaleWithItems { sale, items }
            })
            .collect())
    }

    /// Most recent sales first.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<Sale>> {
        let sql = format!(
            "{} ORDER BY created_at DESC, receipt_number DESC LIMIT ?1",
            SELECT_SALE
        );
        let sales = sqlx::query_as::<_, Sale>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(sales)
    }

    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<Sale>> {
        let sql = format!(
            "{} WHERE customer_id = ?1 ORDER BY created_at DESC",
            SELECT_SALE
        );
        let sales = sqlx::query_as::<_, Sale>(&sql)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(sales)
    }

    // =========================================================================
    // Connection-level helpers
    // =========================================================================

    pub(crate) async fn get_on(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
        let sql = format!("{} WHERE id = ?1", SELECT_SALE);
        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(sale)
    }

    pub(crate) async fn items_on(
        conn: &mut SqliteConnection,
        sale_id: &str,
    ) -> DbResult<Vec<SaleItem>> {
        let sql = format!("{} WHERE sale_id = ?1 ORDER BY position", SELECT_ITEM);
        let items = sqlx::query_as::<_, SaleItem>(&sql)
            .bind(sale_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(items)
    }

    /// Daily counter: the n-th sale of `day` gets `YYYYMMDD-000n`.
    async fn next_receipt_number_on(conn: &mut SqliteConnection, day: NaiveDate) -> DbResult<String> {
        let prefix = format!("{}-%", day.format("%Y%m%d"));
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales WHERE receipt_number LIKE ?1")
            .bind(&prefix)
            .fetch_one(&mut *conn)
            .await?;

        let seq = u32::try_from(count + 1)
            .map_err(|_| DbError::Internal(format!("receipt counter overflow on {}", day)))?;
        Ok(format_receipt_number(day, seq))
    }

    async fn insert_sale_on(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sales (
                id, receipt_number, customer_id, payment_method, status,
                gross_cents, bulk_savings_cents, discount_cents, subtotal_cents,
                tax_cents, total_cents, amount_tendered_cents, change_cents,
                notes, created_at, voided_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9,
                ?10, ?11, ?12, ?13,
                ?14, ?15, ?16
            )
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.receipt_number)
        .bind(&sale.customer_id)
        .bind(sale.payment_method)
        .bind(sale.status)
        .bind(sale.gross_cents)
        .bind(sale.bulk_savings_cents)
        .bind(sale.discount_cents)
        .bind(sale.subtotal_cents)
        .bind(sale.tax_cents)
        .bind(sale.total_cents)
        .bind(sale.amount_tendered_cents)
        .bind(sale.change_cents)
        .bind(&sale.notes)
        .bind(sale.created_at)
        .bind(sale.voided_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Product details are copied onto the item so history survives later
    /// price and name changes.
    async fn insert_item_on(conn: &mut SqliteConnection, item: &SaleItem, position: i64) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sale_items (
                id, sale_id, product_id, product_name, quantity,
                unit_price_cents, base_price_cents, cost_cents,
                discount_cents, subtotal_cents, tier_min_quantity, position
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(&item.product_id)
        .bind(&item.product_name)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.base_price_cents)
        .bind(item.cost_cents)
        .bind(item.discount_cents)
        .bind(item.subtotal_cents)
        .bind(item.tier_min_quantity)
        .bind(position)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use tally_core::{
        BulkPriceTier, Cart, MovementType, Money, Payment, PaymentMethod, Product, TaxMode,
        TaxRate,
    };

    async fn setup() -> (Database, Product, Product) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut cola = Product {
            id: String::new(),
            name: "Cola 330ml".to_string(),
            barcode: Some("5449000000996".to_string()),
            description: None,
            price_cents: 150,
            cost_cents: 90,
            quantity: 24,
            min_stock: 6,
            category_id: None,
            supplier_id: None,
            bulk_pricing: vec![BulkPriceTier::new(6, 135)],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let mut bread = cola.clone();
        bread.name = "Bread".to_string();
        bread.barcode = None;
        bread.price_cents = 300;
        bread.cost_cents = 200;
        bread.quantity = 2;
        bread.bulk_pricing = Vec::new();

        cola = db.products().insert(&cola).await.unwrap();
        bread = db.products().insert(&bread).await.unwrap();
        (db, cola, bread)
    }

    fn draft(lines: &[(&Product, i64)]) -> CheckoutDraft {
        let mut cart = Cart::new();
        for (product, qty) in lines {
            cart.add_product(product, *qty).unwrap();
        }
        cart.checkout(
            TaxRate::zero(),
            TaxMode::Exclusive,
            Payment {
                method: PaymentMethod::Cash,
                tendered: None,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_record_sale_decrements_stock() {
        let (db, cola, bread) = setup().await;

        let sale = db
            .sales()
            .record_sale(draft(&[(&cola, 6), (&bread, 1)]))
            .await
            .unwrap();

        // 6 × 1.35 + 3.00
        assert_eq!(sale.sale.total(), Money::from_cents(1110));
        assert_eq!(sale.sale.bulk_savings_cents, 90);
        assert_eq!(db.products().get(&cola.id).await.unwrap().quantity, 18);
        assert_eq!(db.products().get(&bread.id).await.unwrap().quantity, 1);

        let ledger = db.stock().by_reference(&sale.sale.id).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.iter().all(|m| m.movement_type == MovementType::Out));

        let loaded = db.sales().get_with_items(&sale.sale.receipt_number).await.unwrap();
        assert_eq!(loaded.items.len(), 2);
        assert_eq!(loaded.items[0].product_name, "Cola 330ml");
        assert_eq!(loaded.items[0].tier_min_quantity, Some(6));
        assert_eq!(loaded.items[1].tier_min_quantity, None);
    }

    #[tokio::test]
    async fn test_receipt_numbers_count_up_daily() {
        let (db, cola, _) = setup().await;
        let first = db.sales().record_sale(draft(&[(&cola, 1)])).await.unwrap();
        let second = db.sales().record_sale(draft(&[(&cola, 1)])).await.unwrap();

        let day = Utc::now().date_naive();
        assert_eq!(first.sale.receipt_number, format_receipt_number(day, 1));
        assert_eq!(second.sale.receipt_number, format_receipt_number(day, 2));
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back() {
        let (db, cola, bread) = setup().await;
        let pending = draft(&[(&cola, 2), (&bread, 2)]);

        // stock changed after the cart was priced
        db.products().adjust_quantity(&bread.id, -1).await.unwrap();

        let err = db.sales().record_sale(pending).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InsufficientStock { .. })));

        assert_eq!(db.products().get(&cola.id).await.unwrap().quantity, 24);
        assert!(db.sales().list_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_void_restores_stock_once() {
        let (db, cola, _) = setup().await;
        let sale = db.sales().record_sale(draft(&[(&cola, 4)])).await.unwrap();

        let voided = db.sales().void_sale(&sale.sale.id).await.unwrap();
        assert!(voided.is_voided());
        assert!(voided.voided_at.is_some());
        assert_eq!(db.products().get(&cola.id).await.unwrap().quantity, 24);

        let err = db.sales().void_sale(&sale.sale.id).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InvalidSaleStatus { .. })));
        assert_eq!(db.products().get(&cola.id).await.unwrap().quantity, 24);

        let ledger = db.stock().by_reference(&sale.sale.id).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[1].reason, StockReason::Void);
    }

    #[tokio::test]
    async fn test_with_items_between() {
        let (db, cola, bread) = setup().await;
        db.sales().record_sale(draft(&[(&cola, 1), (&bread, 1)])).await.unwrap();
        db.sales().record_sale(draft(&[(&cola, 2)])).await.unwrap();

        let now = Utc::now();
        let sales = db
            .sales()
            .sales_with_items_between(now - chrono::Duration::hours(1), now + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(sales.len(), 2);
        assert_eq!(sales[0].items.len(), 2);
        assert_eq!(sales[1].items.len(), 1);

        let none = db
            .sales()
            .sales_with_items_between(now - chrono::Duration::days(2), now - chrono::Duration::days(1))
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
