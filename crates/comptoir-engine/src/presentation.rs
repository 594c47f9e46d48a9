//! # Presentation Boundary
//!
//! Turns a [`SettledCart`] into a display-ready view. Settlement always
//! computes full totals; whether a given audience sees them is decided here,
//! by an explicit [`PriceVisibility`].
//!
//! ```text
//! SettledCart ──► CartView::render(&settled, PriceVisibility::Hidden, "€")
//!                   │
//!                   ├── quantities, names, status label   (always)
//!                   └── unit prices, discounts, totals    (Visible only)
//! ```
//!
//! Amounts are rounded to two decimals here and nowhere else.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use comptoir_core::{CartStatus, Money, ValidationError};

use crate::engine::SettledCart;

/// Whether prices are shown to the viewer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceVisibility {
    #[default]
    Visible,
    Hidden,
}

impl fmt::Display for PriceVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceVisibility::Visible => f.write_str("visible"),
            PriceVisibility::Hidden => f.write_str("hidden"),
        }
    }
}

impl FromStr for PriceVisibility {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "visible" => Ok(PriceVisibility::Visible),
            "hidden" => Ok(PriceVisibility::Hidden),
            other => Err(ValidationError::InvalidFormat {
                field: "price_visibility".to_string(),
                reason: format!("expected 'visible' or 'hidden', got '{}'", other),
            }),
        }
    }
}

/// One line as displayed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineView {
    pub product_ref: String,
    /// `None` when the product left the catalog.
    pub product_name: Option<String>,
    pub quantity: i64,
    pub line_reference: Option<String>,
    pub promotion_name: Option<String>,
    pub discount_percentage: Option<String>,
    pub unit_price: Option<String>,
    pub discount: Option<String>,
    pub net: Option<String>,
    pub missing_product: bool,
}

/// A cart as displayed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub cart_id: String,
    pub owner_ref: String,
    pub status: CartStatus,
    pub status_label: &'static str,
    pub notes: Option<String>,
    pub order_reference: Option<String>,
    pub item_count: usize,
    pub total_quantity: i64,
    pub lines: Vec<LineView>,
    pub prices_visible: bool,
    pub subtotal: Option<String>,
    pub discount_total: Option<String>,
    pub grand_total: Option<String>,
}

impl CartView {
    /// Renders a settled cart for a viewer.
    pub fn render(settled: &SettledCart, visibility: PriceVisibility, currency_symbol: &str) -> Self {
        let visible = visibility == PriceVisibility::Visible;
        let amount = |money: Money| visible.then(|| format_money(money, currency_symbol));

        let lines = settled
            .settlement
            .lines
            .iter()
            .map(|line| {
                let item = settled.cart.item(&line.product_ref);
                LineView {
                    product_ref: line.product_ref.to_string(),
                    product_name: line.product_name.clone(),
                    quantity: line.quantity,
                    line_reference: item.and_then(|i| i.line_reference.clone()),
                    promotion_name: line.promotion.as_ref().map(|p| p.name.clone()),
                    discount_percentage: line
                        .promotion
                        .as_ref()
                        .filter(|_| visible)
                        .map(|p| format_percentage(p.discount_percentage.value())),
                    unit_price: amount(line.unit_price),
                    discount: amount(line.discount),
                    net: amount(line.net),
                    missing_product: line.missing_product,
                }
            })
            .collect();

        CartView {
            cart_id: settled.cart.id.to_string(),
            owner_ref: settled.cart.owner_ref.to_string(),
            status: settled.cart.status,
            status_label: settled.cart.status.label_fr(),
            notes: settled.cart.notes.clone(),
            order_reference: settled.cart.order_reference.clone(),
            item_count: settled.cart.item_count(),
            total_quantity: settled.cart.total_quantity(),
            lines,
            prices_visible: visible,
            subtotal: amount(settled.settlement.subtotal),
            discount_total: amount(settled.settlement.discount_total),
            grand_total: amount(settled.settlement.grand_total),
        }
    }
}

fn format_money(money: Money, currency_symbol: &str) -> String {
    format!("{} {}", money.rounded(), currency_symbol)
}

fn format_percentage(value: Decimal) -> String {
    format!("{}%", value.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use comptoir_core::settlement::settle;
    use comptoir_core::{
        ActorKind, Cart, CartItem, CategoryRef, DiscountPercentage, ProductInfo, ProductRef,
        Promotion, PromotionDraft, PromotionScope, SettlementLine, UserRef,
    };
    use std::collections::BTreeSet;

    fn settled() -> SettledCart {
        let now = Utc::now();
        let mut cart = Cart::new(UserRef::from("alice"), ActorKind::Owner, now);
        cart.items = vec![
            CartItem {
                product_ref: ProductRef::from("paper"),
                quantity: 3,
                unit_price: "3.33".parse().unwrap(),
                line_reference: Some("PO-1".to_string()),
            },
            CartItem {
                product_ref: ProductRef::from("ghost"),
                quantity: 1,
                unit_price: Money::from_cents(500),
                line_reference: None,
            },
        ];

        let promotion = Promotion::from_draft(
            PromotionDraft {
                scope: PromotionScope::Global,
                name: "Papeterie".to_string(),
                description: None,
                discount_percentage: "12.5".parse::<DiscountPercentage>().unwrap(),
                start_date: now - chrono::Duration::days(1),
                end_date: None,
                is_active: true,
                applies_to_all_products: false,
                product_refs: BTreeSet::new(),
                category_refs: BTreeSet::from([CategoryRef::from("paper")]),
            },
            now,
        )
        .unwrap();

        let lines = vec![
            SettlementLine {
                item: cart.items[0].clone(),
                product: Some(ProductInfo {
                    id: ProductRef::from("paper"),
                    name: "Ramette A4".to_string(),
                    price: "3.33".parse().unwrap(),
                    category_ref: Some(CategoryRef::from("paper")),
                    brand_ref: None,
                }),
            },
            SettlementLine {
                item: cart.items[1].clone(),
                product: None,
            },
        ];
        let settlement = settle(&lines, &[promotion], None, now);
        SettledCart { cart, settlement }
    }

    #[test]
    fn test_visible_prices_are_rounded_for_display() {
        let view = CartView::render(&settled(), PriceVisibility::Visible, "€");

        // 9.99 - 12.5% = 8.74125
        assert_eq!(view.lines[0].net.as_deref(), Some("8.74 €"));
        assert_eq!(view.lines[0].discount_percentage.as_deref(), Some("12.5%"));
        assert_eq!(view.lines[0].line_reference.as_deref(), Some("PO-1"));
        assert_eq!(view.grand_total.as_deref(), Some("8.74 €"));
        assert_eq!(view.status_label, "en_cours");
    }

    #[test]
    fn test_hidden_prices_keep_quantities() {
        let view = CartView::render(&settled(), PriceVisibility::Hidden, "€");

        assert!(!view.prices_visible);
        assert!(view.grand_total.is_none());
        assert!(view.lines.iter().all(|l| l.unit_price.is_none() && l.net.is_none()));
        assert_eq!(view.lines[0].quantity, 3);
        assert_eq!(view.lines[0].promotion_name.as_deref(), Some("Papeterie"));
        assert!(view.lines[0].discount_percentage.is_none());
        assert_eq!(view.total_quantity, 4);
    }

    #[test]
    fn test_missing_product_flagged() {
        let view = CartView::render(&settled(), PriceVisibility::Visible, "€");
        let ghost = &view.lines[1];
        assert!(ghost.missing_product);
        assert!(ghost.product_name.is_none());
        assert_eq!(ghost.net.as_deref(), Some("0.00 €"));
    }

    #[test]
    fn test_visibility_parsing() {
        assert_eq!("Hidden".parse::<PriceVisibility>().unwrap(), PriceVisibility::Hidden);
        assert!("maybe".parse::<PriceVisibility>().is_err());
    }
}
