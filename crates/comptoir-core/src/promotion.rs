//! # Promotion Resolver
//!
//! Decides which promotion, if any, discounts a given product for a given
//! purchaser at a given instant.
//!
//! ## Resolution Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  all promotions                                                         │
//! │      │                                                                  │
//! │      ├── is_active == false ─────────────────────────► discarded        │
//! │      ├── at < start_date or at > end_date ───────────► discarded        │
//! │      ├── Company(c) scope and purchaser ∉ c ─────────► discarded        │
//! │      ├── not (all products | product ∈ set | category ∈ set) ► discarded│
//! │      ▼                                                                  │
//! │  candidates ──► max by (discount %, created_at, id) ──► PromotionMatch  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Promotions never compound: exactly one percentage applies to a line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::money::DiscountPercentage;
use crate::types::{CategoryRef, CompanyRef, ProductRef, PromotionId};
use crate::validation::{
    normalize_optional_text, validate_date_range, validate_promotion_name, ValidationResult,
};

/// Maximum length of a promotion description.
pub const MAX_DESCRIPTION_LEN: usize = 2000;

// =============================================================================
// Types
// =============================================================================

/// Who a promotion is offered to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "company_ref", rename_all = "snake_case")]
pub enum PromotionScope {
    /// Every purchase, including purchases with no company.
    Global,
    /// Only purchases attributed to this company.
    Company(CompanyRef),
}

impl PromotionScope {
    /// The company, for company-scoped promotions.
    pub fn company_ref(&self) -> Option<&CompanyRef> {
        match self {
            PromotionScope::Global => None,
            PromotionScope::Company(company) => Some(company),
        }
    }
}

/// Where a promotion sits on its validity window at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionTemporalState {
    /// `at < start_date`.
    Upcoming,
    /// Within the window.
    Active,
    /// `end_date` set and `at > end_date`.
    Expired,
}

/// A percentage discount on a set of products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: PromotionId,
    pub scope: PromotionScope,
    pub name: String,
    pub description: Option<String>,
    pub discount_percentage: DiscountPercentage,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    /// Administrative kill switch.
    pub is_active: bool,
    pub applies_to_all_products: bool,
    pub product_refs: BTreeSet<ProductRef>,
    pub category_refs: BTreeSet<CategoryRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The promotion chosen for a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionMatch {
    pub promotion_id: PromotionId,
    pub name: String,
    pub discount_percentage: DiscountPercentage,
}

/// Administrator input for creating or editing a promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionDraft {
    pub scope: PromotionScope,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub discount_percentage: DiscountPercentage,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub applies_to_all_products: bool,
    #[serde(default)]
    pub product_refs: BTreeSet<ProductRef>,
    #[serde(default)]
    pub category_refs: BTreeSet<CategoryRef>,
}

fn default_true() -> bool {
    true
}

impl PromotionDraft {
    /// Validates name, description and validity window.
    pub fn validate(&self) -> ValidationResult<()> {
        validate_promotion_name(&self.name)?;
        normalize_optional_text(
            "description",
            self.description.as_deref(),
            MAX_DESCRIPTION_LEN,
        )?;
        validate_date_range(self.start_date, self.end_date)
    }
}

// =============================================================================
// Promotion Behaviour
// =============================================================================

impl Promotion {
    /// Builds a new promotion from a validated draft.
    pub fn from_draft(draft: PromotionDraft, now: DateTime<Utc>) -> ValidationResult<Self> {
        draft.validate()?;
        let mut promotion = Promotion {
            id: PromotionId::generate(),
            scope: PromotionScope::Global,
            name: String::new(),
            description: None,
            discount_percentage: DiscountPercentage::zero(),
            start_date: draft.start_date,
            end_date: None,
            is_active: true,
            applies_to_all_products: false,
            product_refs: BTreeSet::new(),
            category_refs: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        };
        promotion.apply_draft(draft, now)?;
        Ok(promotion)
    }

    /// Overwrites every editable field with `draft`. Identity and
    /// `created_at` are kept.
    pub fn apply_draft(&mut self, draft: PromotionDraft, now: DateTime<Utc>) -> ValidationResult<()> {
        draft.validate()?;
        self.description = normalize_optional_text(
            "description",
            draft.description.as_deref(),
            MAX_DESCRIPTION_LEN,
        )?;
        self.scope = draft.scope;
        self.name = draft.name.trim().to_string();
        self.discount_percentage = draft.discount_percentage;
        self.start_date = draft.start_date;
        self.end_date = draft.end_date;
        self.is_active = draft.is_active;
        self.applies_to_all_products = draft.applies_to_all_products;
        self.product_refs = draft.product_refs;
        self.category_refs = draft.category_refs;
        self.updated_at = now;
        Ok(())
    }

    /// Classifies the promotion against its validity window.
    pub fn temporal_state(&self, at: DateTime<Utc>) -> PromotionTemporalState {
        if at < self.start_date {
            PromotionTemporalState::Upcoming
        } else if self.end_date.map_or(false, |end| at > end) {
            PromotionTemporalState::Expired
        } else {
            PromotionTemporalState::Active
        }
    }

    /// Whether `at` falls inside the validity window (bounds inclusive).
    #[inline]
    pub fn is_time_valid(&self, at: DateTime<Utc>) -> bool {
        self.temporal_state(at) == PromotionTemporalState::Active
    }

    /// Whether the promotion is offered to a purchase attributed to `company`.
    pub fn matches_scope(&self, company: Option<&CompanyRef>) -> bool {
        match &self.scope {
            PromotionScope::Global => true,
            PromotionScope::Company(target) => company == Some(target),
        }
    }

    /// Whether the promotion covers a product.
    ///
    /// Without `applies_to_all_products`, only the explicit product and
    /// category sets count; both empty matches nothing.
    pub fn matches_product(&self, product: &ProductRef, category: Option<&CategoryRef>) -> bool {
        self.applies_to_all_products
            || self.product_refs.contains(product)
            || category.map_or(false, |c| self.category_refs.contains(c))
    }

    /// All resolver filters at once.
    pub fn applies_to(
        &self,
        product: &ProductRef,
        category: Option<&CategoryRef>,
        company: Option<&CompanyRef>,
        at: DateTime<Utc>,
    ) -> bool {
        self.is_active
            && self.is_time_valid(at)
            && self.matches_scope(company)
            && self.matches_product(product, category)
    }

    /// The match value handed to settlement.
    pub fn to_match(&self) -> PromotionMatch {
        PromotionMatch {
            promotion_id: self.id.clone(),
            name: self.name.clone(),
            discount_percentage: self.discount_percentage,
        }
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Total order used to pick among several matching promotions.
///
/// Highest discount first, then most recently created, then greatest id.
fn precedence(a: &Promotion, b: &Promotion) -> Ordering {
    a.discount_percentage
        .cmp(&b.discount_percentage)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Picks the promotion that applies to a product.
///
/// The result does not depend on the order of `promotions`.
///
/// ## Example
/// ```rust
/// use chrono::Utc;
/// use comptoir_core::promotion::resolve;
/// use comptoir_core::{ProductRef, Promotion};
///
/// let promotions: Vec<Promotion> = Vec::new();
/// let none = resolve(&promotions, &ProductRef::from("paper"), None, None, Utc::now());
/// assert!(none.is_none());
/// ```
pub fn resolve<'a>(
    promotions: impl IntoIterator<Item = &'a Promotion>,
    product: &ProductRef,
    category: Option<&CategoryRef>,
    company: Option<&CompanyRef>,
    at: DateTime<Utc>,
) -> Option<PromotionMatch> {
    promotions
        .into_iter()
        .filter(|p| p.applies_to(product, category, company, at))
        .max_by(|a, b| precedence(a, b))
        .map(Promotion::to_match)
}

/// Every promotion with its temporal state, for catalog and admin display.
pub fn classify<'a>(
    promotions: impl IntoIterator<Item = &'a Promotion>,
    at: DateTime<Utc>,
) -> Vec<(&'a Promotion, PromotionTemporalState)> {
    promotions
        .into_iter()
        .map(|p| (p, p.temporal_state(at)))
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn promo(id: &str, pct: u32) -> Promotion {
        let now = Utc::now();
        Promotion {
            id: PromotionId::from(id),
            scope: PromotionScope::Global,
            name: format!("promo {id}"),
            description: None,
            discount_percentage: DiscountPercentage::from_whole(pct).unwrap(),
            start_date: now - Duration::days(1),
            end_date: Some(now + Duration::days(1)),
            is_active: true,
            applies_to_all_products: true,
            product_refs: BTreeSet::new(),
            category_refs: BTreeSet::new(),
            created_at: now - Duration::days(10),
            updated_at: now - Duration::days(10),
        }
    }

    fn paper() -> ProductRef {
        ProductRef::from("paper")
    }

    #[test]
    fn test_empty_applicability_matches_nothing() {
        let mut p = promo("p1", 50);
        p.applies_to_all_products = false;

        for product in ["paper", "toner", "pens"] {
            let category = CategoryRef::from("office");
            assert!(resolve(
                [&p],
                &ProductRef::from(product),
                Some(&category),
                None,
                Utc::now()
            )
            .is_none());
        }
    }

    #[test]
    fn test_product_and_category_sets() {
        let mut by_product = promo("p1", 10);
        by_product.applies_to_all_products = false;
        by_product.product_refs.insert(paper());

        let mut by_category = promo("p2", 15);
        by_category.applies_to_all_products = false;
        by_category.category_refs.insert(CategoryRef::from("ink"));

        assert!(by_product.matches_product(&paper(), None));
        assert!(!by_product.matches_product(&ProductRef::from("toner"), None));
        assert!(by_category.matches_product(&ProductRef::from("toner"), Some(&CategoryRef::from("ink"))));
        assert!(!by_category.matches_product(&ProductRef::from("toner"), None));
    }

    #[test]
    fn test_inactive_and_out_of_window_discarded() {
        let now = Utc::now();

        let mut off = promo("off", 30);
        off.is_active = false;

        let mut upcoming = promo("upcoming", 40);
        upcoming.start_date = now + Duration::days(2);
        upcoming.end_date = None;

        let mut expired = promo("expired", 50);
        expired.end_date = Some(now - Duration::hours(1));

        let kept = promo("kept", 5);

        let pick = resolve([&off, &upcoming, &expired, &kept], &paper(), None, None, now).unwrap();
        assert_eq!(pick.promotion_id, PromotionId::from("kept"));

        assert_eq!(upcoming.temporal_state(now), PromotionTemporalState::Upcoming);
        assert_eq!(expired.temporal_state(now), PromotionTemporalState::Expired);
        assert_eq!(kept.temporal_state(now), PromotionTemporalState::Active);
    }

    #[test]
    fn test_window_bounds_inclusive() {
        let p = promo("p", 10);
        assert!(p.is_time_valid(p.start_date));
        assert!(p.is_time_valid(p.end_date.unwrap()));
        assert!(!p.is_time_valid(p.end_date.unwrap() + Duration::seconds(1)));
    }

    #[test]
    fn test_company_scope() {
        let acme = CompanyRef::from("acme");
        let mut scoped = promo("scoped", 20);
        scoped.scope = PromotionScope::Company(acme.clone());
        let global = promo("global", 10);

        assert!(scoped.matches_scope(Some(&acme)));
        assert!(!scoped.matches_scope(Some(&CompanyRef::from("globex"))));
        assert!(!scoped.matches_scope(None));
        assert!(global.matches_scope(None));

        let pick = resolve([&scoped, &global], &paper(), None, None, Utc::now()).unwrap();
        assert_eq!(pick.promotion_id, PromotionId::from("global"));

        let pick = resolve([&scoped, &global], &paper(), None, Some(&acme), Utc::now()).unwrap();
        assert_eq!(pick.promotion_id, PromotionId::from("scoped"));
    }

    #[test]
    fn test_highest_discount_wins() {
        let small = promo("a", 10);
        let big = promo("b", 25);
        let pick = resolve([&small, &big], &paper(), None, None, Utc::now()).unwrap();
        assert_eq!(pick.discount_percentage, DiscountPercentage::from_whole(25).unwrap());
    }

    #[test]
    fn test_tie_break_is_order_independent() {
        let older = promo("z-older", 20);
        let mut newer = promo("a-newer", 20);
        newer.created_at = older.created_at + Duration::days(1);

        let mut same_time = promo("b-same", 20);
        same_time.created_at = newer.created_at;

        let candidates = [&older, &newer, &same_time];
        let forward = resolve(candidates, &paper(), None, None, Utc::now()).unwrap();
        let backward = resolve(
            candidates.iter().rev().copied(),
            &paper(),
            None,
            None,
            Utc::now(),
        )
        .unwrap();

        // Newest wins; between the two newest, the greater id.
        assert_eq!(forward.promotion_id, PromotionId::from("b-same"));
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_classify() {
        let now = Utc::now();
        let mut upcoming = promo("u", 10);
        upcoming.start_date = now + Duration::days(1);
        let mut off = promo("off", 10);
        off.is_active = false;

        let classified = classify([&upcoming, &off], now);
        assert_eq!(classified[0].1, PromotionTemporalState::Upcoming);
        // Discarded by the kill switch but still classified.
        assert_eq!(classified[1].1, PromotionTemporalState::Active);
    }

    #[test]
    fn test_draft_validation() {
        let now = Utc::now();
        let draft = PromotionDraft {
            scope: PromotionScope::Global,
            name: "  Rentrée  ".to_string(),
            description: Some("".to_string()),
            discount_percentage: DiscountPercentage::from_whole(15).unwrap(),
            start_date: now,
            end_date: Some(now + Duration::days(30)),
            is_active: true,
            applies_to_all_products: false,
            product_refs: BTreeSet::from([paper()]),
            category_refs: BTreeSet::new(),
        };

        let promotion = Promotion::from_draft(draft.clone(), now).unwrap();
        assert_eq!(promotion.name, "Rentrée");
        assert_eq!(promotion.description, None);
        assert_eq!(promotion.created_at, now);

        let mut backwards = draft.clone();
        backwards.end_date = Some(now - Duration::days(1));
        assert!(Promotion::from_draft(backwards, now).is_err());

        let mut unnamed = draft;
        unnamed.name = " ".to_string();
        assert!(Promotion::from_draft(unnamed, now).is_err());
    }
}
