//! # Supplier Repository
//!
//! Suppliers are referenced by products and by stock receipts. Deleting a
//! supplier clears those references.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::clean;
use tally_core::validation::validate_supplier;
use tally_core::Supplier;

const SELECT_SUPPLIER: &str = r#"
    SELECT id, name, contact_name, phone, email, address, notes, created_at, updated_at
    FROM suppliers
"#;

fn normalized(supplier: &Supplier) -> Supplier {
    Supplier {
        name: supplier.name.trim().to_string(),
        contact_name: clean(&supplier.contact_name),
        phone: clean(&supplier.phone),
        email: clean(&supplier.email),
        address: clean(&supplier.address),
        notes: clean(&supplier.notes),
        ..supplier.clone()
    }
}

#[derive(Debug, Clone)]
pub struct SupplierRepository {
    pool: SqlitePool,
}

impl SupplierRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SupplierRepository { pool }
    }

    pub async fn list(&self) -> DbResult<Vec<Supplier>> {
        let mut conn = self.pool.acquire().await?;
        Self::list_on(&mut conn).await
    }

    pub(crate) async fn list_on(conn: &mut SqliteConnection) -> DbResult<Vec<Supplier>> {
        let sql = format!("{} ORDER BY name COLLATE NOCASE", SELECT_SUPPLIER);
        let suppliers = sqlx::query_as::<_, Supplier>(&sql)
            .fetch_all(&mut *conn)
            .await?;
        Ok(suppliers)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Supplier>> {
        let sql = format!("{} WHERE id = ?1", SELECT_SUPPLIER);
        let supplier = sqlx::query_as::<_, Supplier>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(supplier)
    }

    pub async fn get(&self, id: &str) -> DbResult<Supplier> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Supplier", id))
    }

    pub async fn find_by_name(&self, name: &str) -> DbResult<Option<Supplier>> {
        let sql = format!(
            "{} WHERE name = ?1 COLLATE NOCASE ORDER BY created_at LIMIT 1",
            SELECT_SUPPLIER
        );
        let supplier = sqlx::query_as::<_, Supplier>(&sql)
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(supplier)
    }

    /// Resolves an id or a name.
    pub async fn lookup(&self, key: &str) -> DbResult<Option<Supplier>> {
        match self.get_by_id(key.trim()).await? {
            Some(s) => Ok(Some(s)),
            None => self.find_by_name(key).await,
        }
    }

    pub async fn insert(&self, supplier: &Supplier) -> DbResult<Supplier> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_on(&mut conn, supplier).await
    }

    pub(crate) async fn insert_on(
        conn: &mut SqliteConnection,
        supplier: &Supplier,
    ) -> DbResult<Supplier> {
        validate_supplier(supplier)?;

        let mut supplier = normalized(supplier);
        if supplier.id.trim().is_empty() {
            supplier.id = Uuid::new_v4().to_string();
        }

        debug!(id = %supplier.id, name = %supplier.name, "Inserting supplier");

        sqlx::query(
            r#"
            INSERT INTO suppliers (
                id, name, contact_name, phone, email, address, notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&supplier.id)
        .bind(&supplier.name)
        .bind(&supplier.contact_name)
        .bind(&supplier.phone)
        .bind(&supplier.email)
        .bind(&supplier.address)
        .bind(&supplier.notes)
        .bind(supplier.created_at)
        .bind(supplier.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(supplier)
    }

    pub async fn update(&self, supplier: &Supplier) -> DbResult<Supplier> {
        let mut conn = self.pool.acquire().await?;
        Self::update_on(&mut conn, supplier, Utc::now()).await
    }

    pub(crate) async fn update_on(
        conn: &mut SqliteConnection,
        supplier: &Supplier,
        now: DateTime<Utc>,
    ) -> DbResult<Supplier> {
        validate_supplier(supplier)?;
        let mut supplier = normalized(supplier);
        supplier.updated_at = now;

        let result = sqlx::query(
            r#"
            UPDATE suppliers SET
                name = ?2, contact_name = ?3, phone = ?4, email = ?5,
                address = ?6, notes = ?7, updated_at = ?8
            WHERE id = ?1
            "#,
        )
        .bind(&supplier.id)
        .bind(&supplier.name)
        .bind(&supplier.contact_name)
        .bind(&supplier.phone)
        .bind(&supplier.email)
        .bind(&supplier.address)
        .bind(&supplier.notes)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Supplier", &supplier.id));
        }
        Ok(supplier)
    }

    /// Deletes a supplier; products and stock movements keep their rows with
    /// the supplier reference cleared.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting supplier");

        let result = sqlx::query("DELETE FROM suppliers WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Supplier", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn supplier(name: &str, phone: Option<&str>) -> Supplier {
        Supplier {
            id: String::new(),
            name: name.to_string(),
            contact_name: Some("  ".to_string()),
            phone: phone.map(str::to_string),
            email: None,
            address: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_crud() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.suppliers();

        let mut acme = repo.insert(&supplier(" Acme Wholesale ", Some("+1 555 0100"))).await.unwrap();
        assert_eq!(acme.name, "Acme Wholesale");
        assert_eq!(acme.contact_name, None);

        acme.email = Some("orders@acme.com".to_string());
        repo.update(&acme).await.unwrap();
        assert_eq!(
            repo.lookup("acme wholesale").await.unwrap().unwrap().email.as_deref(),
            Some("orders@acme.com")
        );

        repo.delete(&acme.id).await.unwrap();
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_phone_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.suppliers().insert(&supplier("Acme", Some("12"))).await.is_err());
    }
}
