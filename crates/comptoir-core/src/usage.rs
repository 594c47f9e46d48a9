//! # Promotion Usage Records
//!
//! One immutable record per discounted line, written when a cart is
//! submitted. Records are never updated or deleted; the status of the cart
//! they belong to is joined in when the ledger is read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::cart::Cart;
use crate::money::Money;
use crate::settlement::Settlement;
use crate::types::{CartId, CartStatus, ProductRef, PromotionId, UserRef};

/// A single application of a promotion to a submitted cart line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionUsageRecord {
    pub id: String,
    pub promotion_id: PromotionId,
    pub cart_id: CartId,
    pub user_ref: UserRef,
    pub product_ref: ProductRef,
    pub discount_amount: Money,
    /// Cart grand total at submission.
    pub cart_total: Money,
    pub applied_at: DateTime<Utc>,
    /// Current status of the cart, filled in at read time.
    pub cart_status: Option<CartStatus>,
}

/// Builds the records for a cart being submitted.
pub fn records_for_submission(
    cart: &Cart,
    settlement: &Settlement,
    at: DateTime<Utc>,
) -> Vec<PromotionUsageRecord> {
    settlement
        .discounted_lines()
        .filter_map(|line| {
            let promotion = line.promotion.as_ref()?;
            Some(PromotionUsageRecord {
                id: Uuid::new_v4().to_string(),
                promotion_id: promotion.promotion_id.clone(),
                cart_id: cart.id.clone(),
                user_ref: cart.owner_ref.clone(),
                product_ref: line.product_ref.clone(),
                discount_amount: line.discount,
                cart_total: settlement.grand_total,
                applied_at: at,
                cart_status: None,
            })
        })
        .collect()
}

/// Aggregate view of a promotion's usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionUsageSummary {
    pub promotion_id: PromotionId,
    pub usage_count: u64,
    pub total_discount: Money,
    pub distinct_carts: u64,
    pub first_used_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl PromotionUsageSummary {
    /// Summarizes the records of one promotion.
    pub fn from_records(promotion_id: PromotionId, records: &[PromotionUsageRecord]) -> Self {
        let records: Vec<&PromotionUsageRecord> = records
            .iter()
            .filter(|r| r.promotion_id == promotion_id)
            .collect();
        let carts: HashSet<&CartId> = records.iter().map(|r| &r.cart_id).collect();

        PromotionUsageSummary {
            usage_count: records.len() as u64,
            total_discount: records.iter().map(|r| r.discount_amount).sum(),
            distinct_carts: carts.len() as u64,
            first_used_at: records.iter().map(|r| r.applied_at).min(),
            last_used_at: records.iter().map(|r| r.applied_at).max(),
            promotion_id,
        }
    }
}
