//! # Customer Repository
//!
//! Customers are optional on a sale. Deleting a customer keeps their sales
//! with the customer reference cleared.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::{clean, like_pattern};
use tally_core::validation::{validate_customer, validate_search_query};
use tally_core::Customer;

const SELECT_CUSTOMER: &str = r#"
    SELECT id, name, phone, email, address, notes, created_at, updated_at
    FROM customers
"#;

fn normalized(customer: &Customer) -> Customer {
    Customer {
        name: customer.name.trim().to_string(),
        phone: clean(&customer.phone),
        email: clean(&customer.email),
        address: clean(&customer.address),
        notes: clean(&customer.notes),
        ..customer.clone()
    }
}

#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    pub async fn list(&self) -> DbResult<Vec<Customer>> {
        let mut conn = self.pool.acquire().await?;
        Self::list_on(&mut conn).await
    }

    pub(crate) async fn list_on(conn: &mut SqliteConnection) -> DbResult<Vec<Customer>> {
        let sql = format!("{} ORDER BY name COLLATE NOCASE", SELECT_CUSTOMER);
        let customers = sqlx::query_as::<_, Customer>(&sql)
            .fetch_all(&mut *conn)
            .await?;
        Ok(customers)
    }

    /// Searches by name, phone or email substring.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Customer>> {
        let query = validate_search_query(query)?;
        let sql = format!(
            r#"{}
            WHERE name LIKE ?1 ESCAPE '\' OR phone LIKE ?1 ESCAPE '\' OR email LIKE ?1 ESCAPE '\'
            ORDER BY name COLLATE NOCASE
            LIMIT ?2"#,
            SELECT_CUSTOMER
        );
        let customers = sqlx::query_as::<_, Customer>(&sql)
            .bind(like_pattern(&query))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(customers)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let sql = format!("{} WHERE id = ?1", SELECT_CUSTOMER);
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(customer)
    }

    pub async fn get(&self, id: &str) -> DbResult<Customer> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", id))
    }

    pub async fn find_by_name(&self, name: &str) -> DbResult<Option<Customer>> {
        let sql = format!(
            "{} WHERE name = ?1 COLLATE NOCASE ORDER BY created_at LIMIT 1",
            SELECT_CUSTOMER
        );
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(customer)
    }

    /// Resolves an id, exact phone or name.
    pub async fn lookup(&self, key: &str) -> DbResult<Option<Customer>> {
        let key = key.trim();
        if let Some(c) = self.get_by_id(key).await? {
            return Ok(Some(c));
        }
        let sql = format!("{} WHERE phone = ?1 LIMIT 1", SELECT_CUSTOMER);
        let by_phone = sqlx::query_as::<_, Customer>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match by_phone {
            Some(c) => Ok(Some(c)),
            None => self.find_by_name(key).await,
        }
    }

    pub async fn insert(&self, customer: &Customer) -> DbResult<Customer> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_on(&mut conn, customer).await
    }

    pub(crate) async fn insert_on(
        conn: &mut SqliteConnection,
        customer: &Customer,
    ) -> DbResult<Customer> {
        validate_customer(customer)?;

        let mut customer = normalized(customer);
        if customer.id.trim().is_empty() {
            customer.id = Uuid::new_v4().to_string();
        }

        debug!(id = %customer.id, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, name, phone, email, address, notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(&customer.email)
        .bind(&customer.address)
        .bind(&customer.notes)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(customer)
    }

    pub async fn update(&self, customer: &Customer) -> DbResult<Customer> {
        let mut conn = self.pool.acquire().await?;
        Self::update_on(&mut conn, customer, Utc::now()).await
    }

    pub(crate) async fn update_on(
        conn: &mut SqliteConnection,
        customer: &Customer,
        now: DateTime<Utc>,
    ) -> DbResult<Customer> {
        validate_customer(customer)?;
        let mut customer = normalized(customer);
        customer.updated_at = now;

        let result = sqlx::query(
            r#"
            UPDATE customers SET
                name = ?2, phone = ?3, email = ?4, address = ?5, notes = ?6, updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(&customer.email)
        .bind(&customer.address)
        .bind(&customer.notes)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", &customer.id));
        }
        Ok(customer)
    }

    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting customer");

        let result = sqlx::query("DELETE FROM customers WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn customer(name: &str, phone: &str) -> Customer {
        Customer {
            id: String::new(),
            name: name.to_string(),
            phone: Some(phone.to_string()),
            email: None,
            address: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_search_and_lookup() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.customers();
        let ana = repo.insert(&customer("Ana Lima", "0812345678")).await.unwrap();
        repo.insert(&customer("Ben Ortiz", "0899999999")).await.unwrap();

        assert_eq!(repo.search("lima", 10).await.unwrap().len(), 1);
        assert_eq!(repo.search("08", 10).await.unwrap().len(), 2);
        assert_eq!(repo.lookup("0812345678").await.unwrap().unwrap().id, ana.id);
        assert_eq!(repo.lookup("ana lima").await.unwrap().unwrap().id, ana.id);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.customers();
        let mut ana = repo.insert(&customer("Ana", "0812345678")).await.unwrap();

        ana.notes = Some("Pays on Fridays".to_string());
        let updated = repo.update(&ana).await.unwrap();
        assert_eq!(updated.notes.as_deref(), Some("Pays on Fridays"));

        repo.delete(&ana.id).await.unwrap();
        assert!(repo.get(&ana.id).await.unwrap_err().is_not_found());
    }
}
