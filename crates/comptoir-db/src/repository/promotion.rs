//! # Promotion Repository
//!
//! Promotions and their applicability sets.
//!
//! ## Storage Layout
//! ```text
//! promotions            promotion_products        promotion_categories
//! ┌──────────────┐      ┌──────────────────┐      ┌───────────────────┐
//! │ id           │◄─────│ promotion_id     │      │ promotion_id      │──►
//! │ company_ref  │      │ product_ref      │      │ category_ref      │
//! │ discount_%   │      └──────────────────┘      └───────────────────┘
//! │ start / end  │
//! │ is_active    │      company_ref NULL = global promotion
//! └──────────────┘
//! ```
//!
//! Applicability is never stored on carts; settlement asks for the current
//! promotions on every operation.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeSet;
use tracing::debug;

use comptoir_core::{
    CategoryRef, CompanyRef, ProductRef, Promotion, PromotionId, PromotionScope,
};

use super::parse_percentage;
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct PromotionRow {
    id: String,
    company_ref: Option<String>,
    name: String,
    description: Option<String>,
    discount_percentage: String,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    is_active: bool,
    applies_to_all_products: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const SELECT_PROMOTION: &str = r#"
    SELECT
        id, company_ref, name, description, discount_percentage,
        start_date, end_date, is_active, applies_to_all_products,
        created_at, updated_at
    FROM promotions
"#;

/// Repository for promotion database operations.
#[derive(Debug, Clone)]
pub struct PromotionRepository {
    pool: SqlitePool,
}

impl PromotionRepository {
    /// Creates a new PromotionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PromotionRepository { pool }
    }

    /// Gets a promotion by ID.
    pub async fn get(&self, id: &PromotionId) -> DbResult<Option<Promotion>> {
        let sql = format!("{SELECT_PROMOTION} WHERE id = ?1");
        let mut tx = self.pool.begin().await?;
        let row: Option<PromotionRow> = sqlx::query_as(&sql)
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let promotion = match row {
            Some(row) => Some(hydrate(&mut *tx, row).await?),
            None => None,
        };
        tx.commit().await?;
        Ok(promotion)
    }

    /// Lists promotions, newest first.
    ///
    /// With a company, only the promotions that company can see: global ones
    /// and its own.
    pub async fn list(&self, company: Option<&CompanyRef>) -> DbResult<Vec<Promotion>> {
        let mut tx = self.pool.begin().await?;
        let rows: Vec<PromotionRow> = match company {
            Some(company) => {
                let sql = format!(
                    "{SELECT_PROMOTION} WHERE company_ref IS NULL OR company_ref = ?1 \
                     ORDER BY created_at DESC, id DESC"
                );
                sqlx::query_as(&sql)
                    .bind(company.as_str())
                    .fetch_all(&mut *tx)
                    .await?
            }
            None => {
                let sql = format!("{SELECT_PROMOTION} ORDER BY created_at DESC, id DESC");
                sqlx::query_as(&sql).fetch_all(&mut *tx).await?
            }
        };

        let promotions = hydrate_all(&mut *tx, rows).await?;
        tx.commit().await?;
        Ok(promotions)
    }

    /// Promotions that may apply to a purchase attributed to `company`:
    /// enabled, and global or scoped to that company. The validity window is
    /// checked by the resolver.
    pub async fn applicable(&self, company: Option<&CompanyRef>) -> DbResult<Vec<Promotion>> {
        let sql = format!(
            "{SELECT_PROMOTION} WHERE is_active = 1 AND (company_ref IS NULL OR company_ref = ?1)"
        );
        let mut tx = self.pool.begin().await?;
        let rows: Vec<PromotionRow> = sqlx::query_as(&sql)
            .bind(company.map(|c| c.as_str()))
            .fetch_all(&mut *tx)
            .await?;

        debug!(count = rows.len(), "Loaded applicable promotions");
        let promotions = hydrate_all(&mut *tx, rows).await?;
        tx.commit().await?;
        Ok(promotions)
    }

    /// Inserts a promotion with its product and category sets.
    pub async fn insert(&self, promotion: &Promotion) -> DbResult<()> {
        debug!(id = %promotion.id, name = %promotion.name, "Inserting promotion");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO promotions (
                id, company_ref, name, description, discount_percentage,
                start_date, end_date, is_active, applies_to_all_products,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(promotion.id.as_str())
        .bind(promotion.scope.company_ref().map(|c| c.as_str()))
        .bind(&promotion.name)
        .bind(promotion.description.as_deref())
        .bind(promotion.discount_percentage.value().to_string())
        .bind(promotion.start_date)
        .bind(promotion.end_date)
        .bind(promotion.is_active)
        .bind(promotion.applies_to_all_products)
        .bind(promotion.created_at)
        .bind(promotion.updated_at)
        .execute(&mut *tx)
        .await?;

        write_links(&mut *tx, promotion).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        Ok(())
    }

    /// Overwrites a promotion and its sets.
    pub async fn update(&self, promotion: &Promotion) -> DbResult<()> {
        debug!(id = %promotion.id, "Updating promotion");

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE promotions SET
                company_ref = ?2,
                name = ?3,
                description = ?4,
                discount_percentage = ?5,
                start_date = ?6,
                end_date = ?7,
                is_active = ?8,
                applies_to_all_products = ?9,
                updated_at = ?10
            WHERE id = ?1
            "#,
        )
        .bind(promotion.id.as_str())
        .bind(promotion.scope.company_ref().map(|c| c.as_str()))
        .bind(&promotion.name)
        .bind(promotion.description.as_deref())
        .bind(promotion.discount_percentage.value().to_string())
        .bind(promotion.start_date)
        .bind(promotion.end_date)
        .bind(promotion.is_active)
        .bind(promotion.applies_to_all_products)
        .bind(promotion.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Promotion", promotion.id.as_str()));
        }

        sqlx::query("DELETE FROM promotion_products WHERE promotion_id = ?1")
            .bind(promotion.id.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM promotion_categories WHERE promotion_id = ?1")
            .bind(promotion.id.as_str())
            .execute(&mut *tx)
            .await?;
        write_links(&mut *tx, promotion).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        Ok(())
    }

    /// Flips the kill switch and returns the updated promotion.
    pub async fn set_active(
        &self,
        id: &PromotionId,
        active: bool,
        now: DateTime<Utc>,
    ) -> DbResult<Promotion> {
        let result = sqlx::query("UPDATE promotions SET is_active = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id.as_str())
            .bind(active)
            .bind(now)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Promotion", id.as_str()));
        }

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Promotion", id.as_str()))
    }
}

async fn hydrate_all(conn: &mut SqliteConnection, rows: Vec<PromotionRow>) -> DbResult<Vec<Promotion>> {
    let mut promotions = Vec::with_capacity(rows.len());
    for row in rows {
        promotions.push(hydrate(&mut *conn, row).await?);
    }
    Ok(promotions)
}

/// Attaches the product and category sets to a row, reading on `conn`.
async fn hydrate(conn: &mut SqliteConnection, row: PromotionRow) -> DbResult<Promotion> {
    let product_refs: Vec<String> = sqlx::query_scalar(
        "SELECT product_ref FROM promotion_products WHERE promotion_id = ?1",
    )
    .bind(&row.id)
    .fetch_all(&mut *conn)
    .await?;

    let category_refs: Vec<String> = sqlx::query_scalar(
        "SELECT category_ref FROM promotion_categories WHERE promotion_id = ?1",
    )
    .bind(&row.id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Promotion {
        discount_percentage: parse_percentage(
            "promotions.discount_percentage",
            &row.discount_percentage,
        )?,
        id: PromotionId(row.id),
        scope: match row.company_ref {
            Some(company) => PromotionScope::Company(CompanyRef(company)),
            None => PromotionScope::Global,
        },
        name: row.name,
        description: row.description,
        start_date: row.start_date,
        end_date: row.end_date,
        is_active: row.is_active,
        applies_to_all_products: row.applies_to_all_products,
        product_refs: product_refs.into_iter().map(ProductRef).collect::<BTreeSet<_>>(),
        category_refs: category_refs.into_iter().map(CategoryRef).collect::<BTreeSet<_>>(),
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

async fn write_links(conn: &mut SqliteConnection, promotion: &Promotion) -> DbResult<()> {
    for product_ref in &promotion.product_refs {
        sqlx::query("INSERT INTO promotion_products (promotion_id, product_ref) VALUES (?1, ?2)")
            .bind(promotion.id.as_str())
            .bind(product_ref.as_str())
            .execute(&mut *conn)
            .await?;
    }
    for category_ref in &promotion.category_refs {
        sqlx::query("INSERT INTO promotion_categories (promotion_id, category_ref) VALUES (?1, ?2)")
            .bind(promotion.id.as_str())
            .bind(category_ref.as_str())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;
    use comptoir_core::{DiscountPercentage, PromotionDraft};

    fn draft(name: &str, scope: PromotionScope) -> PromotionDraft {
        PromotionDraft {
            scope,
            name: name.to_string(),
            description: Some("back to school".to_string()),
            discount_percentage: "12.5".parse::<DiscountPercentage>().unwrap(),
            start_date: Utc::now() - Duration::days(1),
            end_date: Some(Utc::now() + Duration::days(30)),
            is_active: true,
            applies_to_all_products: false,
            product_refs: BTreeSet::from([ProductRef::from("paper")]),
            category_refs: BTreeSet::from([CategoryRef::from("ink")]),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let promotion = Promotion::from_draft(draft("Rentrée", PromotionScope::Global), Utc::now()).unwrap();
        db.promotions().insert(&promotion).await.unwrap();

        let loaded = db.promotions().get(&promotion.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Rentrée");
        assert_eq!(loaded.discount_percentage, promotion.discount_percentage);
        assert_eq!(loaded.product_refs, promotion.product_refs);
        assert_eq!(loaded.category_refs, promotion.category_refs);
        assert_eq!(loaded.scope, PromotionScope::Global);
    }

    #[tokio::test]
    async fn test_update_replaces_sets() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut promotion = Promotion::from_draft(draft("Rentrée", PromotionScope::Global), Utc::now()).unwrap();
        db.promotions().insert(&promotion).await.unwrap();

        let mut edit = draft("Rentrée bis", PromotionScope::Global);
        edit.product_refs = BTreeSet::from([ProductRef::from("toner")]);
        edit.category_refs = BTreeSet::new();
        promotion.apply_draft(edit, Utc::now()).unwrap();
        db.promotions().update(&promotion).await.unwrap();

        let loaded = db.promotions().get(&promotion.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Rentrée bis");
        assert_eq!(loaded.product_refs, BTreeSet::from([ProductRef::from("toner")]));
        assert!(loaded.category_refs.is_empty());
    }

    #[tokio::test]
    async fn test_applicable_filters_scope_and_kill_switch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.promotions();
        let acme = CompanyRef::from("acme");

        let global = Promotion::from_draft(draft("Global", PromotionScope::Global), Utc::now()).unwrap();
        let scoped = Promotion::from_draft(draft("Acme", PromotionScope::Company(acme.clone())), Utc::now()).unwrap();
        let other = Promotion::from_draft(
            draft("Globex", PromotionScope::Company(CompanyRef::from("globex"))),
            Utc::now(),
        )
        .unwrap();
        for p in [&global, &scoped, &other] {
            repo.insert(p).await.unwrap();
        }

        assert_eq!(repo.applicable(None).await.unwrap().len(), 1);
        assert_eq!(repo.applicable(Some(&acme)).await.unwrap().len(), 2);
        assert_eq!(repo.list(None).await.unwrap().len(), 3);
        assert_eq!(repo.list(Some(&acme)).await.unwrap().len(), 2);

        let disabled = repo.set_active(&scoped.id, false, Utc::now()).await.unwrap();
        assert!(!disabled.is_active);
        assert_eq!(repo.applicable(Some(&acme)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_promotion() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let result = db
            .promotions()
            .set_active(&PromotionId::from("nope"), true, Utc::now())
            .await;
        assert!(matches!(result, Err(DbError::NotFound { .. })));
    }
}
