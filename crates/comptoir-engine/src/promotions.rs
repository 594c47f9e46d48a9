//! Promotion administration and lookup.
//!
//! Creating, editing and toggling promotions is reserved to administrators.
//! Listing and resolution are open to any caller.

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use comptoir_core::promotion::{classify, resolve};
use comptoir_core::{
    Actor, CategoryRef, CompanyRef, ProductRef, Promotion, PromotionDraft, PromotionId,
    PromotionMatch, PromotionTemporalState, PromotionUsageRecord, PromotionUsageSummary,
};

use crate::engine::CartEngine;
use crate::error::{EngineError, EngineResult};

/// A promotion with where it stands today.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionListing {
    pub promotion: Promotion,
    pub temporal_state: PromotionTemporalState,
}

/// Everything recorded against one promotion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionUsageReport {
    pub summary: PromotionUsageSummary,
    pub records: Vec<PromotionUsageRecord>,
}

fn require_administrator(actor: &Actor, action: &str) -> EngineResult<()> {
    if actor.is_administrator() {
        Ok(())
    } else {
        Err(EngineError::forbidden(action))
    }
}

impl CartEngine {
    /// Creates a promotion from a validated draft.
    pub async fn create_promotion(
        &self,
        actor: &Actor,
        draft: PromotionDraft,
    ) -> EngineResult<Promotion> {
        require_administrator(actor, "create promotions")?;

        let promotion = Promotion::from_draft(draft, Utc::now())?;
        self.promotions.insert(&promotion).await?;

        info!(
            promotion_id = %promotion.id,
            name = %promotion.name,
            percentage = %promotion.discount_percentage,
            company = ?promotion.scope.company_ref(),
            "Promotion created"
        );
        Ok(promotion)
    }

    /// Replaces every editable field of a promotion.
    ///
    /// Already recorded usage keeps the percentage it was granted at.
    pub async fn update_promotion(
        &self,
        actor: &Actor,
        id: &PromotionId,
        draft: PromotionDraft,
    ) -> EngineResult<Promotion> {
        require_administrator(actor, "edit promotions")?;

        let mut promotion = self.load_promotion(id).await?;
        promotion.apply_draft(draft, Utc::now())?;
        self.promotions.update(&promotion).await?;

        info!(promotion_id = %promotion.id, "Promotion updated");
        Ok(promotion)
    }

    /// Flips the kill switch without touching the validity window.
    pub async fn set_promotion_active(
        &self,
        actor: &Actor,
        id: &PromotionId,
        active: bool,
    ) -> EngineResult<Promotion> {
        require_administrator(actor, "enable or disable promotions")?;

        let promotion = self.promotions.set_active(id, active, Utc::now()).await?;
        info!(promotion_id = %id, active, "Promotion toggled");
        Ok(promotion)
    }

    /// Promotions visible to `company` (global ones plus its own), newest
    /// first, each with its temporal state. Disabled promotions are included.
    pub async fn list_promotions(
        &self,
        company: Option<&CompanyRef>,
    ) -> EngineResult<Vec<PromotionListing>> {
        let promotions = self
            .read("promotions", || self.promotions.list(company))
            .await?;

        Ok(classify(&promotions, Utc::now())
            .into_iter()
            .map(|(promotion, temporal_state)| PromotionListing {
                promotion: promotion.clone(),
                temporal_state,
            })
            .collect())
    }

    /// Usage summary and records of one promotion.
    pub async fn promotion_usage(&self, id: &PromotionId) -> EngineResult<PromotionUsageReport> {
        self.load_promotion(id).await?;

        let summary = self
            .read("usage summary", || self.usage.summary_for_promotion(id))
            .await?;
        let records = self
            .read("usage records", || self.usage.for_promotion(id))
            .await?;

        Ok(PromotionUsageReport { summary, records })
    }

    /// The promotion a product would get right now.
    ///
    /// When `category` is `None` the product's catalog category is used.
    pub async fn resolve_promotion(
        &self,
        product_ref: &ProductRef,
        category: Option<&CategoryRef>,
        company: Option<&CompanyRef>,
    ) -> EngineResult<Option<PromotionMatch>> {
        let looked_up = match category {
            Some(_) => None,
            None => self
                .read("product", || self.catalog.product(product_ref))
                .await?
                .and_then(|p| p.category_ref),
        };
        let category = category.or(looked_up.as_ref());

        let promotions = self
            .read("promotions", || self.promotions.applicable(company))
            .await?;

        Ok(resolve(&promotions, product_ref, category, company, Utc::now()))
    }

    async fn load_promotion(&self, id: &PromotionId) -> EngineResult<Promotion> {
        self.read("promotion", || self.promotions.get(id))
            .await?
            .ok_or_else(|| EngineError::not_found("Promotion", id.as_str()))
    }
}
