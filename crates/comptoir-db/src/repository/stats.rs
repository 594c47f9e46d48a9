//! # Stats Repository
//!
//! Fetches the raw cart rows of a statistics window. Bucketing and ranking
//! happen in `comptoir_core::stats::aggregate`.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use comptoir_core::{CartId, CartStatus, CompanyRef, StatsRow, UserRef};

use super::parse_total;
use crate::error::DbResult;

#[derive(Debug, sqlx::FromRow)]
struct StatsDbRow {
    cart_id: String,
    owner_ref: String,
    owner_name: Option<String>,
    company_ref: Option<String>,
    company_name: Option<String>,
    status: CartStatus,
    total: String,
    created_at: DateTime<Utc>,
}

/// Repository for statistics reads.
#[derive(Debug, Clone)]
pub struct StatsRepository {
    pool: SqlitePool,
}

impl StatsRepository {
    /// Creates a new StatsRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StatsRepository { pool }
    }

    /// Carts created at or after `window_start`, optionally of one status,
    /// with their owner and company joined in.
    pub async fn rows_since(
        &self,
        window_start: DateTime<Utc>,
        status: Option<CartStatus>,
    ) -> DbResult<Vec<StatsRow>> {
        let rows: Vec<StatsDbRow> = sqlx::query_as(
            r#"
            SELECT
                c.id AS cart_id,
                c.owner_ref,
                u.name AS owner_name,
                u.company_ref,
                co.name AS company_name,
                c.status,
                c.total,
                c.created_at
            FROM carts c
            LEFT JOIN users u ON u.id = c.owner_ref
            LEFT JOIN companies co ON co.id = u.company_ref
            WHERE c.created_at >= ?1
              AND (?2 IS NULL OR c.status = ?2)
            ORDER BY c.created_at
            "#,
        )
        .bind(window_start)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), since = %window_start, "Loaded stats rows");

        rows.into_iter()
            .map(|row| {
                Ok(StatsRow {
                    total: parse_total("carts.total", &row.total)?,
                    cart_id: CartId(row.cart_id),
                    owner_ref: UserRef(row.owner_ref),
                    owner_name: row.owner_name,
                    company_ref: row.company_ref.map(CompanyRef),
                    company_name: row.company_name,
                    status: row.status,
                    created_at: row.created_at,
                })
            })
            .collect()
    }
}
