//! # Promotion Usage Ledger
//!
//! Append-only. Records are inserted by the cart repository inside the
//! transaction that submits a cart; there is no update or delete path.
//!
//! ## Reading
//! ```text
//! promotion_usages ──LEFT JOIN── carts
//!        │                          │
//!        └── record fields          └── status at query time
//!                                       (NULL once the cart is deleted)
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use comptoir_core::{
    CartId, CartStatus, ProductRef, PromotionId, PromotionUsageRecord, PromotionUsageSummary,
    UserRef,
};

use super::{money_text, parse_total};
use crate::error::DbResult;

#[derive(Debug, sqlx::FromRow)]
struct UsageRow {
    id: String,
    promotion_id: String,
    cart_id: String,
    user_ref: String,
    product_ref: String,
    discount_amount: String,
    cart_total: String,
    applied_at: DateTime<Utc>,
    cart_status: Option<CartStatus>,
}

impl UsageRow {
    fn into_record(self) -> DbResult<PromotionUsageRecord> {
        Ok(PromotionUsageRecord {
            discount_amount: parse_total("promotion_usages.discount_amount", &self.discount_amount)?,
            cart_total: parse_total("promotion_usages.cart_total", &self.cart_total)?,
            id: self.id,
            promotion_id: PromotionId(self.promotion_id),
            cart_id: CartId(self.cart_id),
            user_ref: UserRef(self.user_ref),
            product_ref: ProductRef(self.product_ref),
            applied_at: self.applied_at,
            cart_status: self.cart_status,
        })
    }
}

const SELECT_USAGE: &str = r#"
    SELECT
        u.id, u.promotion_id, u.cart_id, u.user_ref, u.product_ref,
        u.discount_amount, u.cart_total, u.applied_at,
        c.status AS cart_status
    FROM promotion_usages u
    LEFT JOIN carts c ON c.id = u.cart_id
"#;

/// Inserts records on an open connection (normally a transaction).
pub(crate) async fn insert_records(
    conn: &mut SqliteConnection,
    records: &[PromotionUsageRecord],
) -> DbResult<()> {
    for record in records {
        debug!(
            promotion_id = %record.promotion_id,
            cart_id = %record.cart_id,
            product_ref = %record.product_ref,
            "Recording promotion usage"
        );

        sqlx::query(
            r#"
            INSERT INTO promotion_usages (
                id, promotion_id, cart_id, user_ref, product_ref,
                discount_amount, cart_total, applied_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&record.id)
        .bind(record.promotion_id.as_str())
        .bind(record.cart_id.as_str())
        .bind(record.user_ref.as_str())
        .bind(record.product_ref.as_str())
        .bind(money_text(record.discount_amount))
        .bind(money_text(record.cart_total))
        .bind(record.applied_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Read access to the usage ledger.
#[derive(Debug, Clone)]
pub struct UsageRepository {
    pool: SqlitePool,
}

impl UsageRepository {
    /// Creates a new UsageRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UsageRepository { pool }
    }

    /// Records for one cart, oldest first.
    pub async fn for_cart(&self, cart_id: &CartId) -> DbResult<Vec<PromotionUsageRecord>> {
        let sql = format!("{SELECT_USAGE} WHERE u.cart_id = ?1 ORDER BY u.applied_at, u.id");
        let rows: Vec<UsageRow> = sqlx::query_as(&sql)
            .bind(cart_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(UsageRow::into_record).collect()
    }

    /// Records for one promotion, oldest first.
    pub async fn for_promotion(
        &self,
        promotion_id: &PromotionId,
    ) -> DbResult<Vec<PromotionUsageRecord>> {
        let sql = format!("{SELECT_USAGE} WHERE u.promotion_id = ?1 ORDER BY u.applied_at, u.id");
        let rows: Vec<UsageRow> = sqlx::query_as(&sql)
            .bind(promotion_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(UsageRow::into_record).collect()
    }

    /// Usage count, discount sum and distinct carts for one promotion.
    ///
    /// Amounts are summed as decimals in Rust, not by SQLite.
    pub async fn summary_for_promotion(
        &self,
        promotion_id: &PromotionId,
    ) -> DbResult<PromotionUsageSummary> {
        let records = self.for_promotion(promotion_id).await?;
        Ok(PromotionUsageSummary::from_records(
            promotion_id.clone(),
            &records,
        ))
    }
}
