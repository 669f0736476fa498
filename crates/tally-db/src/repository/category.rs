//! # Category Repository
//!
//! Category names are unique ignoring case. Deleting a category leaves its
//! products uncategorized (`ON DELETE SET NULL`).

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::{clean, unique_on};
use tally_core::validation::validate_category;
use tally_core::Category;

#[derive(Debug, Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CategoryRepository { pool }
    }

    pub async fn list(&self) -> DbResult<Vec<Category>> {
        let mut conn = self.pool.acquire().await?;
        Self::list_on(&mut conn).await
    }

    pub(crate) async fn list_on(conn: &mut SqliteConnection) -> DbResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            r#"
            SELECT id, name, description, created_at, updated_at
            FROM categories
            ORDER BY name COLLATE NOCASE
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;
        Ok(categories)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(
            "SELECT id, name, description, created_at, updated_at FROM categories WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(category)
    }

    pub async fn get(&self, id: &str) -> DbResult<Category> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Category", id))
    }

    pub async fn find_by_name(&self, name: &str) -> DbResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            SELECT id, name, description, created_at, updated_at
            FROM categories
            WHERE name = ?1 COLLATE NOCASE
            "#,
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(category)
    }

    /// Resolves an id or a name.
    pub async fn lookup(&self, key: &str) -> DbResult<Option<Category>> {
        match self.get_by_id(key.trim()).await? {
            Some(c) => Ok(Some(c)),
            None => self.find_by_name(key).await,
        }
    }

    pub async fn insert(&self, category: &Category) -> DbResult<Category> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_on(&mut conn, category).await
    }

    pub(crate) async fn insert_on(
        conn: &mut SqliteConnection,
        category: &Category,
    ) -> DbResult<Category> {
        validate_category(category)?;

        let mut category = Category {
            name: category.name.trim().to_string(),
            description: clean(&category.description),
            ..category.clone()
        };
        if category.id.trim().is_empty() {
            category.id = Uuid::new_v4().to_string();
        }

        debug!(id = %category.id, name = %category.name, "Inserting category");

        sqlx::query(
            r#"
            INSERT INTO categories (id, name, description, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| unique_on(e, "name", &category.name))?;

        Ok(category)
    }

    pub async fn update(&self, category: &Category) -> DbResult<Category> {
        let mut conn = self.pool.acquire().await?;
        Self::update_on(&mut conn, category, Utc::now()).await
    }

    pub(crate) async fn update_on(
        conn: &mut SqliteConnection,
        category: &Category,
        now: DateTime<Utc>,
    ) -> DbResult<Category> {
        validate_category(category)?;

        let category = Category {
            name: category.name.trim().to_string(),
            description: clean(&category.description),
            updated_at: now,
            ..category.clone()
        };

        let result = sqlx::query(
            "UPDATE categories SET name = ?2, description = ?3, updated_at = ?4 WHERE id = ?1",
        )
        .bind(&category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| unique_on(e, "name", &category.name))?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Category", &category.id));
        }
        Ok(category)
    }

    /// Deletes a category; its products become uncategorized.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting category");

        let result = sqlx::query("DELETE FROM categories WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Category", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use tally_core::Product;

    fn category(name: &str) -> Category {
        Category {
            id: String::new(),
            name: name.to_string(),
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_names_unique_ignoring_case() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.categories().insert(&category("Drinks")).await.unwrap();

        let err = db.categories().insert(&category("drinks")).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        let found = db.categories().lookup("DRINKS").await.unwrap().unwrap();
        assert_eq!(found.name, "Drinks");
    }

    #[tokio::test]
    async fn test_delete_uncategorizes_products() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let drinks = db.categories().insert(&category("Drinks")).await.unwrap();

        let cola = db
            .products()
            .insert(&Product {
                id: String::new(),
                name: "Cola".to_string(),
                barcode: None,
                description: None,
                price_cents: 100,
                cost_cents: 50,
                quantity: 1,
                min_stock: 0,
                category_id: Some(drinks.id.clone()),
                supplier_id: None,
                bulk_pricing: Vec::new(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        db.categories().delete(&drinks.id).await.unwrap();
        let cola = db.products().get(&cola.id).await.unwrap();
        assert_eq!(cola.category_id, None);
    }
}
