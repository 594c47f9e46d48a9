//! # Settlement
//!
//! Computes per-line and cart totals after promotions.
//!
//! ## Per-Line Math
//! ```text
//! gross    = unit_price × quantity
//! discount = gross × pct / 100        (pct from the resolver, 0 if none)
//! net      = gross − discount
//!
//! subtotal       = Σ gross
//! discount_total = Σ discount
//! grand_total    = Σ net
//! ```
//!
//! Nothing is rounded here. A line whose product has vanished from the
//! catalog contributes zero and is flagged instead of failing the cart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cart::CartItem;
use crate::money::Money;
use crate::promotion::{resolve, Promotion, PromotionMatch};
use crate::types::{CompanyRef, ProductInfo, ProductRef};

/// A cart item joined with its catalog record (`None` if it no longer exists).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementLine {
    pub item: CartItem,
    pub product: Option<ProductInfo>,
}

/// Settlement of one line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSettlement {
    pub product_ref: ProductRef,
    pub product_name: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub gross: Money,
    pub discount: Money,
    pub net: Money,
    pub promotion: Option<PromotionMatch>,
    pub missing_product: bool,
}

/// Settlement of a whole cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub lines: Vec<LineSettlement>,
    pub subtotal: Money,
    pub discount_total: Money,
    pub grand_total: Money,
    pub settled_at: DateTime<Utc>,
}

impl Settlement {
    /// Lines that received a promotion.
    pub fn discounted_lines(&self) -> impl Iterator<Item = &LineSettlement> {
        self.lines
            .iter()
            .filter(|l| l.promotion.is_some() && !l.missing_product)
    }

    /// Lines whose product is gone from the catalog.
    pub fn missing_products(&self) -> Vec<&ProductRef> {
        self.lines
            .iter()
            .filter(|l| l.missing_product)
            .map(|l| &l.product_ref)
            .collect()
    }
}

fn settle_line(
    line: &SettlementLine,
    promotions: &[Promotion],
    company: Option<&CompanyRef>,
    at: DateTime<Utc>,
) -> LineSettlement {
    let item = &line.item;

    let Some(product) = &line.product else {
        return LineSettlement {
            product_ref: item.product_ref.clone(),
            product_name: None,
            quantity: item.quantity,
            unit_price: item.unit_price,
            gross: Money::zero(),
            discount: Money::zero(),
            net: Money::zero(),
            promotion: None,
            missing_product: true,
        };
    };

    let gross = item.gross();
    let promotion = resolve(
        promotions,
        &item.product_ref,
        product.category_ref.as_ref(),
        company,
        at,
    );
    let discount = promotion
        .as_ref()
        .map(|m| gross.percentage_of(m.discount_percentage))
        .unwrap_or_default();

    LineSettlement {
        product_ref: item.product_ref.clone(),
        product_name: Some(product.name.clone()),
        quantity: item.quantity,
        unit_price: item.unit_price,
        gross,
        discount,
        net: gross - discount,
        promotion,
        missing_product: false,
    }
}

/// Settles a cart.
///
/// `company` is the owner's company and `at` the instant promotions are
/// evaluated at. Pure: the same inputs always give the same output, and
/// `grand_total` does not depend on line order.
pub fn settle(
    lines: &[SettlementLine],
    promotions: &[Promotion],
    company: Option<&CompanyRef>,
    at: DateTime<Utc>,
) -> Settlement {
    let lines: Vec<LineSettlement> = lines
        .iter()
        .map(|line| settle_line(line, promotions, company, at))
        .collect();

    let subtotal = lines.iter().map(|l| l.gross).sum();
    let discount_total = lines.iter().map(|l| l.discount).sum();
    let grand_total = lines.iter().map(|l| l.net).sum();

    Settlement {
        lines,
        subtotal,
        discount_total,
        grand_total,
        settled_at: at,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::DiscountPercentage;
    use crate::promotion::PromotionScope;
    use crate::types::{CategoryRef, PromotionId};
    use chrono::Duration;
    use std::collections::BTreeSet;

    fn product(id: &str, cents: u64, category: &str) -> ProductInfo {
        ProductInfo {
            id: ProductRef::from(id),
            name: id.to_uppercase(),
            price: Money::from_cents(cents),
            category_ref: Some(CategoryRef::from(category)),
            brand_ref: None,
        }
    }

    fn line(info: &ProductInfo, quantity: i64) -> SettlementLine {
        SettlementLine {
            item: CartItem {
                product_ref: info.id.clone(),
                quantity,
                unit_price: info.price,
                line_reference: None,
            },
            product: Some(info.clone()),
        }
    }

    fn category_promo(category: &str, pct: u32) -> Promotion {
        let now = Utc::now();
        Promotion {
            id: PromotionId::from("rentree"),
            scope: PromotionScope::Global,
            name: "Rentrée".to_string(),
            description: None,
            discount_percentage: DiscountPercentage::from_whole(pct).unwrap(),
            start_date: now - Duration::days(1),
            end_date: None,
            is_active: true,
            applies_to_all_products: false,
            product_refs: BTreeSet::new(),
            category_refs: BTreeSet::from([CategoryRef::from(category)]),
            created_at: now - Duration::days(1),
            updated_at: now - Duration::days(1),
        }
    }

    /// 10.00 × 2 plus 25.00 × 1 with 20% off the second item's category.
    #[test]
    fn test_two_lines_one_discounted() {
        let paper = product("paper", 1000, "paper");
        let toner = product("toner", 2500, "ink");
        let lines = vec![line(&paper, 2), line(&toner, 1)];
        let promotions = vec![category_promo("ink", 20)];

        let settlement = settle(&lines, &promotions, None, Utc::now());

        assert_eq!(settlement.lines[0].net, Money::from_cents(2000));
        assert!(settlement.lines[0].promotion.is_none());
        assert_eq!(settlement.lines[1].gross, Money::from_cents(2500));
        assert_eq!(settlement.lines[1].discount, Money::from_cents(500));
        assert_eq!(settlement.lines[1].net, Money::from_cents(2000));
        assert_eq!(settlement.subtotal, Money::from_cents(4500));
        assert_eq!(settlement.discount_total, Money::from_cents(500));
        assert_eq!(settlement.grand_total, Money::from_cents(4000));
        assert_eq!(settlement.discounted_lines().count(), 1);
    }

    #[test]
    fn test_order_independent_and_idempotent() {
        let paper = product("paper", 1099, "paper");
        let toner = product("toner", 2599, "ink");
        let pens = product("pens", 333, "ink");
        let promotions = vec![category_promo("ink", 15)];
        let at = Utc::now();

        let forward = vec![line(&paper, 3), line(&toner, 2), line(&pens, 7)];
        let mut reversed = forward.clone();
        reversed.reverse();

        let a = settle(&forward, &promotions, None, at);
        let b = settle(&reversed, &promotions, None, at);
        assert_eq!(a.grand_total, b.grand_total);
        assert_eq!(a.discount_total, b.discount_total);

        assert_eq!(a, settle(&forward, &promotions, None, at));
    }

    #[test]
    fn test_missing_product_contributes_zero() {
        let paper = product("paper", 1000, "paper");
        let mut ghost = line(&product("ghost", 5000, "paper"), 1);
        ghost.product = None;

        let settlement = settle(&[line(&paper, 1), ghost], &[], None, Utc::now());

        assert_eq!(settlement.grand_total, Money::from_cents(1000));
        assert!(settlement.lines[1].missing_product);
        assert_eq!(settlement.lines[1].net, Money::zero());
        assert_eq!(settlement.missing_products(), vec![&ProductRef::from("ghost")]);
    }

    #[test]
    fn test_fractional_discount_not_rounded() {
        let pens = product("pens", 99, "ink");
        let mut promo = category_promo("ink", 0);
        promo.discount_percentage = "12.5".parse().unwrap();

        let settlement = settle(&[line(&pens, 1)], &[promo], None, Utc::now());
        assert_eq!(settlement.discount_total.to_string(), "0.12");
        assert_eq!(
            settlement.grand_total.amount(),
            rust_decimal::Decimal::new(86625, 5)
        );
    }

    #[test]
    fn test_huge_quantities_saturate_without_panicking() {
        let mut press = product("press", 0, "ink");
        press.price = Money::new(crate::money::MAX_AMOUNT).unwrap();
        let lines = vec![line(&press, i64::MAX), line(&press, i64::MAX), line(&press, 3)];

        let settled = settle(&lines, &[category_promo("ink", 10)], None, Utc::now());
        assert_eq!(settled.subtotal.amount(), rust_decimal::Decimal::MAX);
        assert!(settled.discount_total > Money::zero());
        assert!(settled.grand_total <= settled.subtotal);
    }
}
