//! # Import / Export
//!
//! Reads and writes the JSON envelope defined in `tally_core::transfer`.
//!
//! ## Import Flow
//! ```text
//! file text
//!    │ parse_envelope()            version + dataType checked, nothing written yet
//!    ▼
//! BEGIN
//!    ├── categories ─┐
//!    ├── suppliers ──┼── resolve() against current rows ──► insert / update / skip
//!    ├── products ───┘   (category/supplier refs rewritten through the id remap)
//!    └── customers
//! COMMIT
//! ```
//!
//! A record that fails validation or hits a constraint is counted as an
//! error and the rest of the file still imports. Anything else aborts the
//! whole import.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::category::CategoryRepository;
use crate::repository::customer::CustomerRepository;
use crate::repository::product::ProductRepository;
use crate::repository::stock::{movement, StockRepository};
use crate::repository::supplier::SupplierRepository;
use tally_core::transfer::{
    parse_envelope, resolve, Bundle, ConflictPolicy, DataType, ExportEnvelope, IdRemap,
    ImportAction, ImportPayload, ImportPlan, ImportRecord, ImportSummary,
};
use tally_core::{Category, Customer, Product, StockReason, Supplier};

// =============================================================================
// Per-type storage hooks
// =============================================================================

/// Connection-level writes for a record type that can be imported.
trait Importable: ImportRecord + Sized {
    async fn existing(conn: &mut SqliteConnection) -> DbResult<Vec<Self>>;

    async fn insert(conn: &mut SqliteConnection, record: &Self) -> DbResult<Self>;

    async fn update(
        conn: &mut SqliteConnection,
        record: &Self,
        now: DateTime<Utc>,
    ) -> DbResult<Self>;

    /// Runs after a new row is stored.
    async fn after_insert(
        _conn: &mut SqliteConnection,
        _stored: &Self,
        _now: DateTime<Utc>,
    ) -> DbResult<()> {
        Ok(())
    }
}

impl Importable for Category {
    async fn existing(conn: &mut SqliteConnection) -> DbResult<Vec<Self>> {
        CategoryRepository::list_on(conn).await
    }

    async fn insert(conn: &mut SqliteConnection, record: &Self) -> DbResult<Self> {
        CategoryRepository::insert_on(conn, record).await
    }

    async fn update(conn: &mut SqliteConnection, record: &Self, now: DateTime<Utc>) -> DbResult<Self> {
        CategoryRepository::update_on(conn, record, now).await
    }
}

impl Importable for Supplier {
    async fn existing(conn: &mut SqliteConnection) -> DbResult<Vec<Self>> {
        SupplierRepository::list_on(conn).await
    }

    async fn insert(conn: &mut SqliteConnection, record: &Self) -> DbResult<Self> {
        SupplierRepository::insert_on(conn, record).await
    }

    async fn update(conn: &mut SqliteConnection, record: &Self, now: DateTime<Utc>) -> DbResult<Self> {
        SupplierRepository::update_on(conn, record, now).await
    }
}

impl Importable for Customer {
    async fn existing(conn: &mut SqliteConnection) -> DbResult<Vec<Self>> {
        CustomerRepository::list_on(conn).await
    }

    async fn insert(conn: &mut SqliteConnection, record: &Self) -> DbResult<Self> {
        CustomerRepository::insert_on(conn, record).await
    }

    async fn update(conn: &mut SqliteConnection, record: &Self, now: DateTime<Utc>) -> DbResult<Self> {
        CustomerRepository::update_on(conn, record, now).await
    }
}

impl Importable for Product {
    async fn existing(conn: &mut SqliteConnection) -> DbResult<Vec<Self>> {
        ProductRepository::list_on(conn).await
    }

    async fn insert(conn: &mut SqliteConnection, record: &Self) -> DbResult<Self> {
        ProductRepository::insert_on(conn, record).await
    }

    async fn update(conn: &mut SqliteConnection, record: &Self, now: DateTime<Utc>) -> DbResult<Self> {
        ProductRepository::update_on(conn, record, now).await
    }

    /// Opening stock of an imported product is written to the ledger.
    async fn after_insert(
        conn: &mut SqliteConnection,
        stored: &Self,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        if stored.quantity > 0 {
            let mut entry = movement(&stored.id, stored.quantity, StockReason::Import, now);
            entry.unit_cost_cents = Some(stored.cost_cents);
            StockRepository::record_on(conn, &entry).await?;
        }
        Ok(())
    }
}

/// Errors that reject one record rather than the whole file.
fn is_record_error(err: &DbError) -> bool {
    matches!(
        err,
        DbError::UniqueViolation { .. } | DbError::ForeignKeyViolation { .. } | DbError::Core(_)
    )
}

/// Outcome of applying one resolved batch.
struct Applied {
    summary: ImportSummary,
    remap: IdRemap,
    /// Ids that exist after the batch (for rewriting references).
    known_ids: HashSet<String>,
}

async fn import_batch<T: Importable>(
    conn: &mut SqliteConnection,
    incoming: Vec<T>,
    policy: ConflictPolicy,
    now: DateTime<Utc>,
) -> DbResult<Applied> {
    let existing = T::existing(conn).await?;
    let ImportPlan {
        actions,
        sources,
        remap,
        mut known_ids,
        mut summary,
    } = resolve(incoming, &existing, policy, now);

    debug!(kind = T::KIND, actions = actions.len(), "Applying import plan");

    for (action, carried) in actions.into_iter().zip(sources) {
        let (result, record, inserted) = match &action {
            ImportAction::Insert(record) => {
                let stored = T::insert(conn, record).await;
                if let Ok(stored) = &stored {
                    T::after_insert(conn, stored, now).await?;
                }
                (stored.map(|_| ()), record, true)
            }
            ImportAction::Update { record, .. } => {
                (T::update(conn, record, now).await.map(|_| ()), record, false)
            }
            ImportAction::Skip { .. } => continue,
        };

        let Err(err) = result else { continue };
        if !is_record_error(&err) {
            return Err(err);
        }
        warn!(
            kind = T::KIND,
            name = %record.record_name(),
            records = carried.len(),
            error = %err,
            "Import record rejected"
        );

        // Later duplicates folded into this action were counted as updates.
        let folded = if inserted {
            summary.imported = summary.imported.saturating_sub(1);
            known_ids.remove(record.record_id());
            carried.len().saturating_sub(1)
        } else {
            carried.len()
        };
        summary.updated = summary.updated.saturating_sub(folded);
        summary.errors += carried.len();
        for source in &carried {
            summary.messages.push(format!(
                "{} #{} ({}): {}",
                T::KIND,
                source.position,
                source.name,
                err
            ));
        }
    }

    Ok(Applied {
        summary,
        remap,
        known_ids,
    })
}

fn ids<T: ImportRecord>(records: &[T]) -> HashSet<String> {
    records.iter().map(|r| r.record_id().to_string()).collect()
}

// =============================================================================
// Service
// =============================================================================

/// Import/export over the whole database.
///
/// ```rust,ignore
/// let json = db.transfer().export(DataType::Products).await?;
/// let summary = db.transfer().import(&json, ConflictPolicy::Overwrite).await?;
/// ```
#[derive(Debug, Clone)]
pub struct TransferService {
    db: Database,
}

impl TransferService {
    pub fn new(db: Database) -> Self {
        TransferService { db }
    }

    /// Serializes every record of `data_type` into an export envelope.
    pub async fn export(&self, data_type: DataType) -> DbResult<String> {
        let now = Utc::now();
        let json = match data_type {
            DataType::Products => envelope(data_type, self.db.products().list().await?, now)?,
            DataType::Customers => envelope(data_type, self.db.customers().list().await?, now)?,
            DataType::Suppliers => envelope(data_type, self.db.suppliers().list().await?, now)?,
            DataType::Categories => envelope(data_type, self.db.categories().list().await?, now)?,
            DataType::Sales => {
                let sales = self
                    .db
                    .sales()
                    .sales_with_items_between(DateTime::<Utc>::UNIX_EPOCH, now + Duration::days(1))
                    .await?;
                envelope(data_type, sales, now)?
            }
            DataType::All => {
                let bundle = Bundle {
                    categories: self.db.categories().list().await?,
                    suppliers: self.db.suppliers().list().await?,
                    products: self.db.products().list().await?,
                    customers: self.db.customers().list().await?,
                };
                envelope(data_type, bundle, now)?
            }
        };

        info!(data_type = %data_type, bytes = json.len(), "Export complete");
        Ok(json)
    }

    /// Sales created in `[from, to)` with their items.
    pub async fn export_sales_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<String> {
        let sales = self.db.sales().sales_with_items_between(from, to).await?;
        envelope(DataType::Sales, sales, Utc::now())
    }

    /// Imports an export file in one transaction.
    ///
    /// ## Returns
    /// * `Ok(ImportSummary)` - Counts per outcome, with one message per
    ///   rejected record
    /// * `Err(DbError::Core(Transfer))` - The file itself is unusable
    ///   (bad JSON, unknown version, `sales` data); nothing was written
    pub async fn import(&self, json: &str, policy: ConflictPolicy) -> DbResult<ImportSummary> {
        let payload = parse_envelope(json)?;
        let data_type = payload.data_type();
        let now = Utc::now();

        info!(data_type = %data_type, policy = ?policy, "Starting import");

        let mut tx = self.db.pool().begin().await?;

        let summary = match payload {
            ImportPayload::Categories(records) => {
                import_batch(&mut tx, records, policy, now).await?.summary
            }
            ImportPayload::Suppliers(records) => {
                import_batch(&mut tx, records, policy, now).await?.summary
            }
            ImportPayload::Customers(records) => {
                import_batch(&mut tx, records, policy, now).await?.summary
            }
            ImportPayload::Products(records) => {
                let categories = ids(&CategoryRepository::list_on(&mut tx).await?);
                let suppliers = ids(&SupplierRepository::list_on(&mut tx).await?);
                let records = relink(
                    records,
                    (&IdRemap::default(), &categories),
                    (&IdRemap::default(), &suppliers),
                );
                import_batch(&mut tx, records, policy, now).await?.summary
            }
            ImportPayload::All(bundle) => {
                let categories = import_batch(&mut tx, bundle.categories, policy, now).await?;
                let suppliers = import_batch(&mut tx, bundle.suppliers, policy, now).await?;
                let products = relink(
                    bundle.products,
                    (&categories.remap, &categories.known_ids),
                    (&suppliers.remap, &suppliers.known_ids),
                );
                let products = import_batch(&mut tx, products, policy, now).await?;
                let customers = import_batch(&mut tx, bundle.customers, policy, now).await?;

                let mut summary = categories.summary;
                summary.merge(suppliers.summary);
                summary.merge(products.summary);
                summary.merge(customers.summary);
                summary
            }
        };

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            data_type = %data_type,
            imported = summary.imported,
            updated = summary.updated,
            skipped = summary.skipped,
            errors = summary.errors,
            "Import complete"
        );
        Ok(summary)
    }
}

/// Points product references at the ids categories and suppliers ended up
/// with; unknown references are cleared.
fn relink(
    products: Vec<Product>,
    categories: (&IdRemap, &HashSet<String>),
    suppliers: (&IdRemap, &HashSet<String>),
) -> Vec<Product> {
    products
        .into_iter()
        .map(|p| Product {
            category_id: categories.0.rewrite(&p.category_id, categories.1),
            supplier_id: suppliers.0.rewrite(&p.supplier_id, suppliers.1),
            ..p
        })
        .collect()
}

fn envelope<T: Serialize>(data_type: DataType, data: T, now: DateTime<Utc>) -> DbResult<String> {
    Ok(ExportEnvelope::new(data_type, data, now).to_json()?)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbConfig;
    use tally_core::{BulkPriceTier, CoreError, TransferError};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn file(data_type: &str, data: &str) -> String {
        format!(
            r#"{{"version":"1.0","dataType":"{}","exportedAt":"2026-03-07T10:00:00Z","data":{}}}"#,
            data_type, data
        )
    }

    #[tokio::test]
    async fn test_all_import_links_references() {
        let db = test_db().await;
        let json = file(
            "all",
            r#"{
                "categories": [{"id": "c-1", "name": "Drinks"}],
                "suppliers": [{"id": "s-1", "name": "Acme"}],
                "products": [
                    {"name": "Cola", "price_cents": 150, "quantity": 12,
                     "category_id": "c-1", "supplier_id": "s-9",
                     "bulk_pricing": [{"min_quantity": 6, "unit_price_cents": 135}]}
                ],
                "customers": [{"name": "Ana", "phone": "0812345678"}]
            }"#,
        );

        let summary = db.transfer().import(&json, ConflictPolicy::Overwrite).await.unwrap();
        assert_eq!(summary.imported, 4);
        assert_eq!(summary.errors, 0);

        let cola = db.products().lookup("cola").await.unwrap().unwrap();
        assert_eq!(cola.category_id.as_deref(), Some("c-1"));
        // s-9 is not in the file or the database
        assert_eq!(cola.supplier_id, None);
        assert_eq!(cola.bulk_pricing, vec![BulkPriceTier::new(6, 135)]);

        let ledger = db.stock().history(&cola.id, 10).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].reason, StockReason::Import);
    }

    #[tokio::test]
    async fn test_reimport_matches_by_name_and_keeps_stock() {
        let db = test_db().await;
        let first = file("products", r#"[{"name": "Tea", "price_cents": 200, "quantity": 5}]"#);
        db.transfer().import(&first, ConflictPolicy::Overwrite).await.unwrap();

        let second = file("products", r#"[{"name": " TEA ", "price_cents": 220, "quantity": 99}]"#);
        let summary = db.transfer().import(&second, ConflictPolicy::Overwrite).await.unwrap();
        assert_eq!(summary.updated, 1);

        let tea = db.products().lookup("tea").await.unwrap().unwrap();
        assert_eq!(tea.price_cents, 220);
        assert_eq!(tea.quantity, 5);
        assert_eq!(db.products().count().await.unwrap(), 1);

        let summary = db.transfer().import(&second, ConflictPolicy::KeepExisting).await.unwrap();
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn test_bad_records_counted_not_fatal() {
        let db = test_db().await;
        db.products()
            .insert(&Product {
                id: String::new(),
                name: "Cola".to_string(),
                barcode: Some("123456".to_string()),
                description: None,
                price_cents: 150,
                cost_cents: 0,
                quantity: 0,
                min_stock: 0,
                category_id: None,
                supplier_id: None,
                bulk_pricing: Vec::new(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let json = file(
            "products",
            r#"[
                {"name": "", "price_cents": 100},
                {"name": "Fake Cola", "barcode": "999999", "price_cents": 100},
                {"id": "p-2", "name": "Other", "barcode": "777777", "price_cents": -5},
                {"name": "Water", "price_cents": 80}
            ]"#,
        );
        let summary = db.transfer().import(&json, ConflictPolicy::Overwrite).await.unwrap();
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.messages.len(), 2);
        assert_eq!(db.products().count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_barcode_matching_and_conflicts() {
        let db = test_db().await;
        let seed = file(
            "products",
            r#"[{"name": "Cola", "barcode": "123456", "price_cents": 150},
                {"name": "Tea", "barcode": "777777", "price_cents": 200}]"#,
        );
        db.transfer().import(&seed, ConflictPolicy::Overwrite).await.unwrap();

        // new name, known barcode: matched and renamed
        let renamed = file(
            "products",
            r#"[{"name": "Cola Classic", "barcode": "123456", "price_cents": 160}]"#,
        );
        let summary = db.transfer().import(&renamed, ConflictPolicy::Overwrite).await.unwrap();
        assert_eq!(summary.updated, 1);
        assert!(db.products().lookup("Cola Classic").await.unwrap().is_some());

        // matched by name but takes Tea's barcode
        let clash = file(
            "products",
            r#"[{"name": "Cola Classic", "barcode": "777777", "price_cents": 170},
                {"name": "Water", "price_cents": 80}]"#,
        );
        let summary = db.transfer().import(&clash, ConflictPolicy::Overwrite).await.unwrap();
        assert_eq!(summary.updated, 0);
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(db.products().get_by_barcode("123456").await.unwrap().unwrap().price_cents, 160);
        assert_eq!(db.products().count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_rejected_update_returns_folded_duplicates() {
        let db = test_db().await;
        let seed = file(
            "products",
            r#"[{"name": "Cola", "barcode": "111111", "price_cents": 150},
                {"name": "Tea", "barcode": "222222", "price_cents": 200}]"#,
        );
        db.transfer().import(&seed, ConflictPolicy::Overwrite).await.unwrap();

        // Tea takes Cola's barcode, then appears again with a new price
        let clash = file(
            "products",
            r#"[{"name": "Tea", "barcode": "111111", "price_cents": 300},
                {"name": "Tea", "price_cents": 400}]"#,
        );
        let summary = db.transfer().import(&clash, ConflictPolicy::Overwrite).await.unwrap();
        assert_eq!(summary.updated, 0);
        assert_eq!(summary.imported, 0);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.total(), 2);
        assert_eq!(summary.messages.len(), 2);
        assert!(summary.messages[0].starts_with("product #1 (Tea)"));
        assert!(summary.messages[1].starts_with("product #2 (Tea)"));

        let tea = db.products().lookup("Tea").await.unwrap().unwrap();
        assert_eq!(tea.price_cents, 200);
        assert_eq!(tea.barcode.as_deref(), Some("222222"));
    }

    #[tokio::test]
    async fn test_file_level_errors() {
        let db = test_db().await;

        let err = db
            .transfer()
            .import(&file("sales", "[]"), ConflictPolicy::Overwrite)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::Transfer(TransferError::UnsupportedDataType(_)))
        ));

        let future = r#"{"version":"2.0","dataType":"products","exportedAt":"2026-03-07T10:00:00Z","data":[]}"#;
        assert!(db.transfer().import(future, ConflictPolicy::Overwrite).await.is_err());
        assert!(db.transfer().import("not json", ConflictPolicy::Overwrite).await.is_err());
    }

    #[tokio::test]
    async fn test_export_round_trips_through_import() {
        let source = test_db().await;
        let json = file(
            "all",
            r#"{"categories": [{"name": "Bakery"}],
                "products": [{"name": "Bread", "price_cents": 300, "quantity": 4}]}"#,
        );
        source.transfer().import(&json, ConflictPolicy::Overwrite).await.unwrap();

        let exported = source.transfer().export(DataType::All).await.unwrap();
        assert!(exported.contains("\"dataType\": \"all\""));

        let target = test_db().await;
        let summary = target.transfer().import(&exported, ConflictPolicy::Overwrite).await.unwrap();
        assert_eq!(summary.imported, 2);

        let bread = source.products().lookup("bread").await.unwrap().unwrap();
        let copied = target.products().get(&bread.id).await.unwrap();
        assert_eq!(copied.quantity, 4);
        assert_eq!(copied.category_id, bread.category_id);
    }
}
