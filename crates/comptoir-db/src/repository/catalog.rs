//! # Catalog Repository
//!
//! Read API over the product catalog. Catalog administration lives outside
//! this engine; `insert_product` and `delete_product` exist for seeding and
//! tests.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

use comptoir_core::{CategoryRef, ProductInfo, ProductRef};

use super::{money_text, parse_money};
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    price: String,
    category_ref: Option<String>,
    brand_ref: Option<String>,
}

impl ProductRow {
    fn into_info(self) -> DbResult<ProductInfo> {
        Ok(ProductInfo {
            price: parse_money("products.price", &self.price)?,
            id: ProductRef(self.id),
            name: self.name,
            category_ref: self.category_ref.map(CategoryRef),
            brand_ref: self.brand_ref,
        })
    }
}

/// Repository for catalog reads.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Gets a product by reference.
    pub async fn product(&self, id: &ProductRef) -> DbResult<Option<ProductInfo>> {
        let row: Option<ProductRow> = sqlx::query_as(
            "SELECT id, name, price, category_ref, brand_ref FROM products WHERE id = ?1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProductRow::into_info).transpose()
    }

    /// Gets several products at once. Unknown references are simply absent
    /// from the map.
    pub async fn products_by_ids(
        &self,
        ids: &[ProductRef],
    ) -> DbResult<HashMap<ProductRef, ProductInfo>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        debug!(count = ids.len(), "Loading products");

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, name, price, category_ref, brand_ref FROM products WHERE id IN (",
        );
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let rows: Vec<ProductRow> = query.build_query_as().fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|row| {
                let info = row.into_info()?;
                Ok((info.id.clone(), info))
            })
            .collect()
    }

    /// Inserts a product.
    pub async fn insert_product(&self, product: &ProductInfo) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product");
        let now: DateTime<Utc> = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO products (id, name, price, category_ref, brand_ref, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(money_text(product.price))
        .bind(product.category_ref.as_ref().map(|c| c.as_str()))
        .bind(product.brand_ref.as_deref())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes a product.
    pub async fn delete_product(&self, id: &ProductRef) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id.as_str()));
        }
        Ok(())
    }

    /// Counts catalog products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use comptoir_core::Money;

    fn product(id: &str, cents: u64) -> ProductInfo {
        ProductInfo {
            id: ProductRef::from(id),
            name: id.to_uppercase(),
            price: Money::from_cents(cents),
            category_ref: Some(CategoryRef::from("office")),
            brand_ref: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_load() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();

        catalog.insert_product(&product("paper", 1099)).await.unwrap();
        catalog.insert_product(&product("toner", 2500)).await.unwrap();

        let paper = catalog.product(&ProductRef::from("paper")).await.unwrap().unwrap();
        assert_eq!(paper.price, Money::from_cents(1099));
        assert_eq!(paper.category_ref, Some(CategoryRef::from("office")));

        let found = catalog
            .products_by_ids(&[
                ProductRef::from("paper"),
                ProductRef::from("toner"),
                ProductRef::from("ghost"),
            ])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(!found.contains_key(&ProductRef::from("ghost")));
        assert_eq!(catalog.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_product() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();
        catalog.insert_product(&product("paper", 1099)).await.unwrap();

        catalog.delete_product(&ProductRef::from("paper")).await.unwrap();
        assert!(catalog.product(&ProductRef::from("paper")).await.unwrap().is_none());
        assert!(matches!(
            catalog.delete_product(&ProductRef::from("paper")).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
