//! # Product Repository
//!
//! Database operations for products.
//!
//! ## Key Operations
//! - Lookup by id, barcode (scanner input) or exact name
//! - Substring search over name and barcode
//! - CRUD with validation
//! - Guarded stock deltas (stock never goes below zero)
//!
//! ## Lookup Order
//! ```text
//! operator types / scans "5449000000996"
//!      │
//!      ├── id match?       ──► product
//!      ├── barcode match?  ──► product
//!      └── name match?     ──► product (case-insensitive, trimmed)
//! ```
//!
//! `bulk_pricing` is stored as a JSON array column and decoded on read.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::{clean, like_pattern, unique_on};
use tally_core::pricing::normalize_tiers;
use tally_core::validation::{validate_product, validate_search_query};
use tally_core::{BulkPriceTier, CoreError, Product};

const SELECT_PRODUCT: &str = r#"
    SELECT
        id, name, barcode, description,
        price_cents, cost_cents, quantity, min_stock,
        category_id, supplier_id, bulk_pricing,
        created_at, updated_at
    FROM products
"#;

/// Raw `products` row; `bulk_pricing` still JSON text.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    barcode: Option<String>,
    description: Option<String>,
    price_cents: i64,
    cost_cents: i64,
    quantity: i64,
    min_stock: i64,
    category_id: Option<String>,
    supplier_id: Option<String>,
    bulk_pricing: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = DbError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let bulk_pricing: Vec<BulkPriceTier> = serde_json::from_str(&row.bulk_pricing)
            .map_err(|e| DbError::corrupt("product bulk_pricing", e))?;

        Ok(Product {
            id: row.id,
            name: row.name,
            barcode: row.barcode,
            description: row.description,
            price_cents: row.price_cents,
            cost_cents: row.cost_cents,
            quantity: row.quantity,
            min_stock: row.min_stock,
            category_id: row.category_id,
            supplier_id: row.supplier_id,
            bulk_pricing,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn decode_all(rows: Vec<ProductRow>) -> DbResult<Vec<Product>> {
    rows.into_iter().map(Product::try_from).collect()
}

fn encode_tiers(tiers: &[BulkPriceTier]) -> DbResult<String> {
    serde_json::to_string(tiers).map_err(|e| DbError::Internal(e.to_string()))
}

/// Trims text fields, maps blank optionals to `None` and sorts tiers.
fn normalized(product: &Product) -> Product {
    Product {
        name: product.name.trim().to_string(),
        barcode: clean(&product.barcode),
        description: clean(&product.description),
        category_id: clean(&product.category_id),
        supplier_id: clean(&product.supplier_id),
        bulk_pricing: normalize_tiers(product.bulk_pricing.clone()),
        ..product.clone()
    }
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = ProductRepository::new(pool);
/// let results = repo.search("cola", 20).await?;
/// let scanned = repo.get_by_barcode("5449000000996").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Searches products by substring of name or barcode.
    ///
    /// An empty query lists products by name.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        let query = validate_search_query(query)?;

        debug!(query = %query, limit = %limit, "Searching products");

        if query.is_empty() {
            let sql = format!("{} ORDER BY name COLLATE NOCASE LIMIT ?1", SELECT_PRODUCT);
            let rows = sqlx::query_as::<_, ProductRow>(&sql)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
            return decode_all(rows);
        }

        // Names that start with the query rank above mid-word matches.
        let sql = format!(
            r#"{}
            WHERE name LIKE ?1 ESCAPE '\' OR barcode LIKE ?1 ESCAPE '\'
            ORDER BY (name LIKE ?2 ESCAPE '\') DESC, name COLLATE NOCASE
            LIMIT ?3"#,
            SELECT_PRODUCT
        );
        let pattern = like_pattern(&query);
        let prefix = pattern[1..].to_string();

        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(&pattern)
            .bind(&prefix)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let products = decode_all(rows)?;
        debug!(count = products.len(), "Search returned products");
        Ok(products)
    }

    /// Lists all products ordered by name.
    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let mut conn = self.pool.acquire().await?;
        Self::list_on(&mut conn).await
    }

    pub(crate) async fn list_on(conn: &mut SqliteConnection) -> DbResult<Vec<Product>> {
        let sql = format!("{} ORDER BY name COLLATE NOCASE", SELECT_PRODUCT);
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .fetch_all(&mut *conn)
            .await?;
        decode_all(rows)
    }

    pub async fn list_by_category(&self, category_id: &str) -> DbResult<Vec<Product>> {
        let sql = format!(
            "{} WHERE category_id = ?1 ORDER BY name COLLATE NOCASE",
            SELECT_PRODUCT
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(category_id)
            .fetch_all(&self.pool)
            .await?;
        decode_all(rows)
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_on(&mut conn, id).await
    }

    /// Like [`get_by_id`](Self::get_by_id) but missing is an error.
    pub async fn get(&self, id: &str) -> DbResult<Product> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    pub(crate) async fn get_on(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("{} WHERE id = ?1", SELECT_PRODUCT);
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        row.map(Product::try_from).transpose()
    }

    /// Gets a product by barcode (scanner input).
    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Option<Product>> {
        let barcode = barcode.trim();
        debug!(barcode = %barcode, "Looking up barcode");

        let sql = format!("{} WHERE barcode = ?1", SELECT_PRODUCT);
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(barcode)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Product::try_from).transpose()
    }

    /// Finds a product by exact name, ignoring case and surrounding spaces.
    pub async fn find_by_name(&self, name: &str) -> DbResult<Option<Product>> {
        let sql = format!(
            "{} WHERE name = ?1 COLLATE NOCASE ORDER BY created_at LIMIT 1",
            SELECT_PRODUCT
        );
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Product::try_from).transpose()
    }

    /// Resolves operator input (id, barcode or exact name) to a product.
    pub async fn lookup(&self, code: &str) -> DbResult<Option<Product>> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(None);
        }
        if let Some(p) = self.get_by_id(code).await? {
            return Ok(Some(p));
        }
        if let Some(p) = self.get_by_barcode(code).await? {
            return Ok(Some(p));
        }
        self.find_by_name(code).await
    }

    /// Products at or below their reorder threshold, emptiest first.
    pub async fn low_stock(&self) -> DbResult<Vec<Product>> {
        let sql = format!(
            "{} WHERE quantity <= min_stock ORDER BY quantity, name COLLATE NOCASE",
            SELECT_PRODUCT
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        decode_all(rows)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts a new product. A blank id is replaced with a fresh UUID.
    ///
    /// ## Returns
    /// * `Ok(Product)` - The stored product
    /// * `Err(DbError::UniqueViolation)` - Barcode already exists
    /// * `Err(DbError::Core(Validation))` - Business rule failed
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_on(&mut conn, product).await
    }

    pub(crate) async fn insert_on(
        conn: &mut SqliteConnection,
        product: &Product,
    ) -> DbResult<Product> {
        validate_product(product)?;

        let mut product = normalized(product);
        if product.id.trim().is_empty() {
            product.id = Uuid::new_v4().to_string();
        }

        debug!(id = %product.id, name = %product.name, "Inserting product");

        let tiers = encode_tiers(&product.bulk_pricing)?;
        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, barcode, description,
                price_cents, cost_cents, quantity, min_stock,
                category_id, supplier_id, bulk_pricing,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.barcode)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.quantity)
        .bind(product.min_stock)
        .bind(&product.category_id)
        .bind(&product.supplier_id)
        .bind(&tiers)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| unique_on(e, "barcode", product.barcode.as_deref().unwrap_or_default()))?;

        Ok(product)
    }

    /// Updates a product's catalog fields.
    ///
    /// Stock on hand is not written here; it only changes through stock
    /// movements and sales.
    pub async fn update(&self, product: &Product) -> DbResult<Product> {
        let mut conn = self.pool.acquire().await?;
        Self::update_on(&mut conn, product, Utc::now()).await
    }

    pub(crate) async fn update_on(
        conn: &mut SqliteConnection,
        product: &Product,
        now: DateTime<Utc>,
    ) -> DbResult<Product> {
        validate_product(product)?;
        let mut product = normalized(product);
        product.updated_at = now;

        debug!(id = %product.id, "Updating product");

        let tiers = encode_tiers(&product.bulk_pricing)?;
        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2,
                barcode = ?3,
                description = ?4,
                price_cents = ?5,
                cost_cents = ?6,
                min_stock = ?7,
                category_id = ?8,
                supplier_id = ?9,
                bulk_pricing = ?10,
                updated_at = ?11
            WHERE id = ?1
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.barcode)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.min_stock)
        .bind(&product.category_id)
        .bind(&product.supplier_id)
        .bind(&tiers)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| unique_on(e, "barcode", product.barcode.as_deref().unwrap_or_default()))?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }

        // quantity was not written; report what is stored
        Self::get_on(conn, &product.id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", &product.id))
    }

    /// Applies a stock delta without writing a movement.
    ///
    /// Prefer [`StockRepository`](crate::repository::stock::StockRepository),
    /// which records the change in the ledger.
    pub async fn adjust_quantity(&self, id: &str, delta: i64) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        Self::apply_delta_on(&mut conn, id, delta, Utc::now()).await
    }

    /// Guarded stock update: fails with `InsufficientStock` rather than
    /// letting quantity go negative. Returns the new quantity.
    pub(crate) async fn apply_delta_on(
        conn: &mut SqliteConnection,
        id: &str,
        delta: i64,
        now: DateTime<Utc>,
    ) -> DbResult<i64> {
        debug!(id = %id, delta = %delta, "Updating stock");

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET quantity = quantity + ?2, updated_at = ?3
            WHERE id = ?1 AND quantity + ?2 >= 0
            RETURNING quantity
            "#,
        )
        .bind(id)
        .bind(delta)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(quantity) = updated {
            return Ok(quantity);
        }

        match Self::get_on(conn, id).await? {
            Some(product) => Err(CoreError::InsufficientStock {
                product: product.name,
                available: product.quantity,
                requested: -delta,
            }
            .into()),
            None => Err(DbError::not_found("Product", id)),
        }
    }

    /// Deletes a product and its stock ledger.
    ///
    /// Refused with `InUse` when any sale references the product.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting product");

        let sold: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sale_items WHERE product_id = ?1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if sold > 0 {
            return Err(DbError::InUse {
                entity: "Product".to_string(),
                id: id.to_string(),
                dependents: format!("{} sale line(s)", sold),
            });
        }

        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
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

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn product(name: &str, barcode: Option<&str>, quantity: i64) -> Product {
        Product {
            id: String::new(),
            name: name.to_string(),
            barcode: barcode.map(str::to_string),
            description: None,
            price_cents: 150,
            cost_cents: 90,
            quantity,
            min_stock: 5,
            category_id: None,
            supplier_id: None,
            bulk_pricing: vec![BulkPriceTier::new(12, 120), BulkPriceTier::new(6, 135)],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_read_back_tiers() {
        let db = test_db().await;
        let stored = db
            .products()
            .insert(&product("Cola 330ml", Some("5449000000996"), 24))
            .await
            .unwrap();

        assert!(!stored.id.is_empty());
        let loaded = db.products().get(&stored.id).await.unwrap();
        // tiers come back sorted
        assert_eq!(loaded.bulk_pricing[0].min_quantity, 6);
        assert_eq!(loaded.bulk_pricing[1].min_quantity, 12);
    }

    #[tokio::test]
    async fn test_duplicate_barcode_rejected() {
        let db = test_db().await;
        db.products()
            .insert(&product("Cola", Some("123456"), 1))
            .await
            .unwrap();
        let err = db
            .products()
            .insert(&product("Cola again", Some("123456"), 1))
            .await
            .unwrap_err();

        match err {
            DbError::UniqueViolation { field, value } => {
                assert_eq!(field, "barcode");
                assert_eq!(value, "123456");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_product_rejected() {
        let db = test_db().await;
        let mut bad = product("Cola", None, 1);
        bad.price_cents = -1;
        assert!(matches!(
            db.products().insert(&bad).await,
            Err(DbError::Core(CoreError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn test_lookup_by_barcode_and_name() {
        let db = test_db().await;
        let cola = db
            .products()
            .insert(&product("Cola 330ml", Some("5449000000996"), 10))
            .await
            .unwrap();

        let repo = db.products();
        assert_eq!(repo.lookup(&cola.id).await.unwrap().unwrap().id, cola.id);
        assert_eq!(repo.lookup("5449000000996").await.unwrap().unwrap().id, cola.id);
        assert_eq!(repo.lookup("  cola 330ML ").await.unwrap().unwrap().id, cola.id);
        assert!(repo.lookup("pepsi").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_name_and_barcode() {
        let db = test_db().await;
        let repo = db.products();
        repo.insert(&product("Diet Cola", None, 1)).await.unwrap();
        repo.insert(&product("Cola Zero", Some("5449000000996"), 1)).await.unwrap();
        repo.insert(&product("Bread", Some("2000000000017"), 1)).await.unwrap();

        let hits = repo.search("cola", 20).await.unwrap();
        assert_eq!(hits.len(), 2);
        // prefix match first
        assert_eq!(hits[0].name, "Cola Zero");

        assert_eq!(repo.search("20000", 20).await.unwrap().len(), 1);
        assert_eq!(repo.search("", 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stock_guard() {
        let db = test_db().await;
        let p = db.products().insert(&product("Tea", None, 3)).await.unwrap();

        assert_eq!(db.products().adjust_quantity(&p.id, -2).await.unwrap(), 1);
        let err = db.products().adjust_quantity(&p.id, -2).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InsufficientStock {
                available: 1,
                requested: 2,
                ..
            })
        ));
        assert!(db.products().adjust_quantity("missing", 1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_update_keeps_stock() {
        let db = test_db().await;
        let mut p = db.products().insert(&product("Tea", None, 7)).await.unwrap();
        p.price_cents = 175;
        p.quantity = 999;

        let updated = db.products().update(&p).await.unwrap();
        assert_eq!(updated.price_cents, 175);
        assert_eq!(updated.quantity, 7);
    }

    #[tokio::test]
    async fn test_low_stock_and_delete() {
        let db = test_db().await;
        let low = db.products().insert(&product("Low", None, 2)).await.unwrap();
        db.products().insert(&product("Plenty", None, 50)).await.unwrap();

        let alerts = db.products().low_stock().await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, low.id);

        db.products().delete(&low.id).await.unwrap();
        assert_eq!(db.products().count().await.unwrap(), 1);
        assert!(db.products().delete(&low.id).await.unwrap_err().is_not_found());
    }
}
