//! # Cart Repository
//!
//! Carts, their lines, and the writes that must be atomic with them.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  update(cart, expected_version, usages)                                 │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    UPDATE carts SET … , version = expected + 1                          │
//! │      WHERE id = ? AND version = expected                                │
//! │        │                                                                │
//! │        ├── 0 rows, cart exists  → VersionConflict (ROLLBACK)           │
//! │        ├── 0 rows, no cart      → NotFound (ROLLBACK)                  │
//! │        ▼                                                                │
//! │    DELETE + INSERT cart_items (line order kept in `position`)          │
//! │    INSERT promotion_usages (only when submitting)                      │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## One Active Cart Per Owner
//! The partial unique index `idx_carts_one_active_per_owner` covers carts in
//! `building` or `submitted`. A second active cart for the same owner fails
//! with a [`DbError::UniqueViolation`] that
//! [`DbError::is_active_cart_violation`] recognises, whichever request got
//! there first.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use comptoir_core::{
    ActorKind, Cart, CartId, CartItem, CartStatus, ProductRef, PromotionUsageRecord, UserRef,
};

use super::usage::insert_records;
use super::{money_text, parse_money, parse_total};
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    id: String,
    owner_ref: String,
    created_by: ActorKind,
    notes: Option<String>,
    order_reference: Option<String>,
    status: CartStatus,
    total: String,
    discount_total: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    version: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct CartItemRow {
    product_ref: String,
    quantity: i64,
    unit_price: String,
    line_reference: Option<String>,
}

impl CartItemRow {
    fn into_item(self) -> DbResult<CartItem> {
        Ok(CartItem {
            unit_price: parse_money("cart_items.unit_price", &self.unit_price)?,
            product_ref: ProductRef(self.product_ref),
            quantity: self.quantity,
            line_reference: self.line_reference,
        })
    }
}

const SELECT_CART: &str = r#"
    SELECT
        id, owner_ref, created_by, notes, order_reference, status,
        total, discount_total, created_at, updated_at, submitted_at, version
    FROM carts
"#;

/// Repository for cart database operations.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    /// Creates a new CartRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets a cart with its lines.
    ///
    /// The header and the lines are read in one transaction so a concurrent
    /// update is seen either entirely or not at all.
    pub async fn get(&self, id: &CartId) -> DbResult<Option<Cart>> {
        let sql = format!("{SELECT_CART} WHERE id = ?1");
        let mut tx = self.pool.begin().await?;
        let row: Option<CartRow> = sqlx::query_as(&sql)
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let cart = match row {
            Some(row) => Some(hydrate(&mut *tx, row).await?),
            None => None,
        };
        tx.commit().await?;
        Ok(cart)
    }

    /// The owner's cart in `building` or `submitted`, if any.
    pub async fn active_for_owner(&self, owner: &UserRef) -> DbResult<Option<Cart>> {
        let sql = format!(
            "{SELECT_CART} WHERE owner_ref = ?1 AND status IN ('building', 'submitted')"
        );
        let mut tx = self.pool.begin().await?;
        let row: Option<CartRow> = sqlx::query_as(&sql)
            .bind(owner.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let cart = match row {
            Some(row) => Some(hydrate(&mut *tx, row).await?),
            None => None,
        };
        tx.commit().await?;
        Ok(cart)
    }

    /// Every cart of an owner, newest first.
    pub async fn list_for_owner(&self, owner: &UserRef) -> DbResult<Vec<Cart>> {
        let sql = format!("{SELECT_CART} WHERE owner_ref = ?1 ORDER BY created_at DESC, id DESC");
        let mut tx = self.pool.begin().await?;
        let rows: Vec<CartRow> = sqlx::query_as(&sql)
            .bind(owner.as_str())
            .fetch_all(&mut *tx)
            .await?;

        let mut carts = Vec::with_capacity(rows.len());
        for row in rows {
            carts.push(hydrate(&mut *tx, row).await?);
        }
        tx.commit().await?;
        Ok(carts)
    }

    /// Counts carts, whatever their status.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM carts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts a new cart with its lines and any usage records.
    ///
    /// Fails with an active-cart violation if the owner already has one.
    pub async fn insert(&self, cart: &Cart, usages: &[PromotionUsageRecord]) -> DbResult<()> {
        debug!(id = %cart.id, owner = %cart.owner_ref, "Inserting cart");

        let mut tx = self.pool.begin().await?;
        insert_cart(&mut *tx, cart).await?;
        write_items(&mut *tx, cart).await?;
        insert_records(&mut *tx, usages).await?;
        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(id = %cart.id, owner = %cart.owner_ref, status = %cart.status, "Cart created");
        Ok(())
    }

    /// Cancels the owner's active cart and inserts `new_cart`, atomically.
    ///
    /// The old cart must still be at `old_version` and still be active;
    /// otherwise nothing is written.
    pub async fn replace_active(
        &self,
        old_id: &CartId,
        old_version: i64,
        now: DateTime<Utc>,
        new_cart: &Cart,
        usages: &[PromotionUsageRecord],
    ) -> DbResult<()> {
        debug!(old = %old_id, new = %new_cart.id, "Replacing active cart");

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE carts
            SET status = 'cancelled', updated_at = ?3, version = version + 1
            WHERE id = ?1 AND version = ?2 AND status IN ('building', 'submitted')
            "#,
        )
        .bind(old_id.as_str())
        .bind(old_version)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let err = missing_or_conflict(&mut *tx, old_id, old_version).await;
            tx.rollback().await?;
            return Err(err);
        }

        insert_cart(&mut *tx, new_cart).await?;
        write_items(&mut *tx, new_cart).await?;
        insert_records(&mut *tx, usages).await?;
        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(old = %old_id, new = %new_cart.id, owner = %new_cart.owner_ref, "Active cart replaced");
        Ok(())
    }

    /// Persists `cart` if the stored version is still `expected_version`.
    ///
    /// Rewrites the lines, appends `usages`, and returns the new version.
    pub async fn update(
        &self,
        cart: &Cart,
        expected_version: i64,
        usages: &[PromotionUsageRecord],
    ) -> DbResult<i64> {
        debug!(id = %cart.id, expected_version, "Updating cart");

        let mut tx = self.pool.begin().await?;
        let next_version = expected_version + 1;

        let result = sqlx::query(
            r#"
            UPDATE carts SET
                notes = ?3,
                order_reference = ?4,
                status = ?5,
                total = ?6,
                discount_total = ?7,
                updated_at = ?8,
                submitted_at = ?9,
                version = ?10
            WHERE id = ?1 AND version = ?2
            "#,
        )
        .bind(cart.id.as_str())
        .bind(expected_version)
        .bind(cart.notes.as_deref())
        .bind(cart.order_reference.as_deref())
        .bind(cart.status)
        .bind(money_text(cart.total))
        .bind(money_text(cart.discount_total))
        .bind(cart.updated_at)
        .bind(cart.submitted_at)
        .bind(next_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let err = missing_or_conflict(&mut *tx, &cart.id, expected_version).await;
            tx.rollback().await?;
            return Err(err);
        }

        sqlx::query("DELETE FROM cart_items WHERE cart_id = ?1")
            .bind(cart.id.as_str())
            .execute(&mut *tx)
            .await?;
        write_items(&mut *tx, cart).await?;
        insert_records(&mut *tx, usages).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(next_version)
    }

    /// Hard-deletes a cart and its lines. Usage records stay.
    pub async fn delete(&self, id: &CartId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM carts WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Cart", id.as_str()));
        }

        info!(id = %id, "Cart deleted");
        Ok(())
    }
}

async fn insert_cart(conn: &mut SqliteConnection, cart: &Cart) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO carts (
            id, owner_ref, created_by, notes, order_reference, status,
            total, discount_total, created_at, updated_at, submitted_at, version
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(cart.id.as_str())
    .bind(cart.owner_ref.as_str())
    .bind(cart.created_by)
    .bind(cart.notes.as_deref())
    .bind(cart.order_reference.as_deref())
    .bind(cart.status)
    .bind(money_text(cart.total))
    .bind(money_text(cart.discount_total))
    .bind(cart.created_at)
    .bind(cart.updated_at)
    .bind(cart.submitted_at)
    .bind(cart.version)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn write_items(conn: &mut SqliteConnection, cart: &Cart) -> DbResult<()> {
    for (position, item) in cart.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO cart_items (cart_id, position, product_ref, quantity, unit_price, line_reference)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(cart.id.as_str())
        .bind(position as i64)
        .bind(item.product_ref.as_str())
        .bind(item.quantity)
        .bind(money_text(item.unit_price))
        .bind(item.line_reference.as_deref())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Builds a cart from its header row and the lines read on the same connection.
async fn hydrate(conn: &mut SqliteConnection, row: CartRow) -> DbResult<Cart> {
    let items: Vec<CartItemRow> = sqlx::query_as(
        r#"
        SELECT product_ref, quantity, unit_price, line_reference
        FROM cart_items
        WHERE cart_id = ?1
        ORDER BY position
        "#,
    )
    .bind(&row.id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Cart {
        items: items
            .into_iter()
            .map(CartItemRow::into_item)
            .collect::<DbResult<Vec<_>>>()?,
        total: parse_total("carts.total", &row.total)?,
        discount_total: parse_total("carts.discount_total", &row.discount_total)?,
        id: CartId(row.id),
        owner_ref: UserRef(row.owner_ref),
        created_by: row.created_by,
        notes: row.notes,
        order_reference: row.order_reference,
        status: row.status,
        created_at: row.created_at,
        updated_at: row.updated_at,
        submitted_at: row.submitted_at,
        version: row.version,
    })
}

/// Tells a lost optimistic lock apart from a missing row.
async fn missing_or_conflict(conn: &mut SqliteConnection, id: &CartId, expected: i64) -> DbError {
    let exists: Result<Option<i64>, sqlx::Error> =
        sqlx::query_scalar("SELECT version FROM carts WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&mut *conn)
            .await;

    match exists {
        Ok(Some(_)) => DbError::VersionConflict {
            entity: "Cart".to_string(),
            id: id.to_string(),
            expected,
        },
        Ok(None) => DbError::not_found("Cart", id.as_str()),
        Err(e) => e.into(),
    }
}
