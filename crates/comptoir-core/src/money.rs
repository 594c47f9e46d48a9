//! # Money Module
//!
//! Provides the `Money` and `DiscountPercentage` types for exact monetary math.
//!
//! ## Why Decimal Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In binary floating point:                                              │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  THE CENTS PROBLEM                                                      │
//! │    12.5% of 0.99 = 0.12375 → cents can't hold it, rounding per line    │
//! │    drifts once many lines are summed                                    │
//! │                                                                         │
//! │  OUR SOLUTION: base-10 Decimal, rounded only for display               │
//! │    lines accumulate exactly, Display rounds to 2 places once           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use comptoir_core::money::Money;
//!
//! let price = Money::from_cents(1099); // 10.99
//! let line = price.times(3);           // 32.97
//! assert_eq!(line.to_string(), "32.97");
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;

use crate::error::ValidationError;
use crate::validation::ValidationResult;

/// Decimal places shown at display boundaries.
pub const DISPLAY_DECIMAL_PLACES: u32 = 2;

/// Largest amount [`Money::new`] accepts: one trillion.
///
/// Line and cart totals past this stay representable for any sane quantity;
/// beyond that, multiplication and addition saturate at `Decimal::MAX`.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

// =============================================================================
// Money Type
// =============================================================================

/// A non-negative amount in the shop's single currency.
///
/// ## Design Decisions
/// - **Decimal inner value**: exact base-10 arithmetic, no scale is forced
///   until [`Money::rounded`] is called
/// - **Bounded**: construction from untrusted input goes through
///   [`Money::new`], which accepts `0..=MAX_AMOUNT`; subtraction saturates
///   at zero, multiplication and addition at `Decimal::MAX`
/// - **Serde**: serialized as a decimal string, deserialization rejects
///   negative amounts
///
/// ## Where Money Flows
/// ```text
/// ProductInfo.price ──► CartItem.unit_price (snapshot) ──► line gross
///                                                             │
///                         DiscountPercentage ──► line discount │
///                                                             ▼
///                                     line net ──► Settlement.grand_total
///                                                             │
///                                                  Cart.total (persisted)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Creates Money from a decimal amount, rejecting negative values and
    /// values above [`MAX_AMOUNT`].
    ///
    /// ## Example
    /// ```rust
    /// use comptoir_core::money::Money;
    /// use rust_decimal::Decimal;
    ///
    /// assert!(Money::new(Decimal::new(1099, 2)).is_ok());
    /// assert!(Money::new(Decimal::new(-1, 0)).is_err());
    /// assert!(Money::new(Decimal::MAX).is_err());
    /// ```
    pub fn new(amount: Decimal) -> ValidationResult<Self> {
        if (amount.is_sign_negative() && !amount.is_zero()) || amount > MAX_AMOUNT {
            return Err(ValidationError::out_of_range("amount", 0, MAX_AMOUNT));
        }
        Ok(Money(amount))
    }

    /// Parses a computed total (line, discount or cart total).
    ///
    /// Totals are sums and products of bounded prices, so only the sign is
    /// checked; they may exceed [`MAX_AMOUNT`].
    pub fn parse_total(s: &str) -> ValidationResult<Self> {
        let amount = parse_decimal(s)?;
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(ValidationError::out_of_range("amount", 0, Decimal::MAX));
        }
        Ok(Money(amount))
    }

    /// Creates Money from cents (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use comptoir_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.to_string(), "10.99");
    /// ```
    #[inline]
    pub fn from_cents(cents: u64) -> Self {
        Money(Decimal::from(cents) / Decimal::ONE_HUNDRED)
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    /// Checks if the value is zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns the exact, unrounded amount.
    #[inline]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Rounds to two decimal places (half away from zero).
    ///
    /// Only call this at display or export boundaries; settlement keeps the
    /// exact value so that summing many lines never drifts.
    pub fn rounded(&self) -> Money {
        Money(
            self.0
                .round_dp_with_strategy(DISPLAY_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Multiplies a unit price by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use comptoir_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299);
    /// assert_eq!(unit_price.times(3), Money::from_cents(897));
    /// ```
    #[inline]
    pub fn times(&self, quantity: i64) -> Money {
        Money(self.0.saturating_mul(Decimal::from(quantity.max(0))))
    }

    /// Returns `percentage` of this amount, unrounded.
    ///
    /// ## Example
    /// ```rust
    /// use comptoir_core::money::{DiscountPercentage, Money};
    /// use rust_decimal::Decimal;
    ///
    /// let gross = Money::from_cents(99);
    /// let pct = DiscountPercentage::new(Decimal::new(125, 1)).unwrap(); // 12.5%
    /// assert_eq!(gross.percentage_of(pct).amount(), Decimal::new(12375, 5));
    /// ```
    pub fn percentage_of(&self, percentage: DiscountPercentage) -> Money {
        let value = percentage.value();
        match self.0.checked_mul(value) {
            Some(scaled) => Money(scaled / Decimal::ONE_HUNDRED),
            None => Money((self.0 / Decimal::ONE_HUNDRED).saturating_mul(value)),
        }
    }

    /// Splits the amount evenly across `parts`, unrounded. Zero parts yields zero.
    pub fn divided_by(&self, parts: u64) -> Money {
        if parts == 0 {
            return Money::zero();
        }
        Money(self.0 / Decimal::from(parts))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows the amount rounded to two places, without a currency symbol.
///
/// ## Note
/// The currency symbol is a presentation concern handled by the engine's
/// presentation module.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.rounded().0)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl TryFrom<Decimal> for Money {
    type Error = ValidationError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::new(parse_decimal(s)?)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

/// Subtraction saturates at zero: Money is never negative.
impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money((self.0 - other.0).max(Decimal::ZERO))
    }
}

fn parse_decimal(s: &str) -> ValidationResult<Decimal> {
    Decimal::from_str(s.trim()).map_err(|e| ValidationError::InvalidFormat {
        field: "amount".to_string(),
        reason: e.to_string(),
    })
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Discount Percentage
// =============================================================================

/// A percentage off, between 0 and 100 inclusive.
///
/// Fractional percentages (12.5) are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct DiscountPercentage(Decimal);

impl DiscountPercentage {
    /// Creates a percentage, rejecting values outside `[0, 100]`.
    pub fn new(value: Decimal) -> ValidationResult<Self> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(ValidationError::out_of_range("discount_percentage", 0, 100));
        }
        Ok(DiscountPercentage(value))
    }

    /// Creates a percentage from a whole number (20 = 20%).
    pub fn from_whole(value: u32) -> ValidationResult<Self> {
        DiscountPercentage::new(Decimal::from(value))
    }

    /// No discount.
    #[inline]
    pub const fn zero() -> Self {
        DiscountPercentage(Decimal::ZERO)
    }

    /// Returns the percentage value (20 for 20%).
    #[inline]
    pub const fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for DiscountPercentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0.normalize())
    }
}

impl TryFrom<Decimal> for DiscountPercentage {
    type Error = ValidationError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        DiscountPercentage::new(value)
    }
}

impl From<DiscountPercentage> for Decimal {
    fn from(pct: DiscountPercentage) -> Self {
        pct.0
    }
}

impl FromStr for DiscountPercentage {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|e| ValidationError::InvalidFormat {
            field: "discount_percentage".to_string(),
            reason: e.to_string(),
        })?;
        DiscountPercentage::new(value)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.amount(), Decimal::new(1099, 2));
        assert_eq!(money.to_string(), "10.99");
    }

    #[test]
    fn test_negative_rejected() {
        assert!(Money::new(Decimal::new(-5, 1)).is_err());
        assert!(Money::new(Decimal::ZERO).is_ok());
        assert!("-3.00".parse::<Money>().is_err());
        assert_eq!("3.5".parse::<Money>().unwrap(), Money::from_cents(350));
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::zero().to_string(), "0.00");
        assert_eq!(Money::new(Decimal::new(12375, 5)).unwrap().to_string(), "0.12");
        assert_eq!(Money::new(Decimal::new(125, 3)).unwrap().to_string(), "0.13");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!(a + b, Money::from_cents(1500));
        assert_eq!(a - b, Money::from_cents(500));
        assert_eq!(b - a, Money::zero());
        assert_eq!(a.times(3), Money::from_cents(3000));

        let total: Money = [a, b, b].iter().sum();
        assert_eq!(total, Money::from_cents(2000));

        assert_eq!(total.divided_by(4), Money::from_cents(500));
        assert_eq!(total.divided_by(0), Money::zero());
    }

    #[test]
    fn test_percentage_of() {
        let gross = Money::from_cents(2500);
        let pct = DiscountPercentage::from_whole(20).unwrap();
        assert_eq!(gross.percentage_of(pct), Money::from_cents(500));
        assert_eq!(
            gross.percentage_of(DiscountPercentage::zero()),
            Money::zero()
        );
        assert_eq!(
            gross.percentage_of(DiscountPercentage::from_whole(100).unwrap()),
            gross
        );
    }

    /// Fractional-cent discounts accumulate exactly across many lines.
    #[test]
    fn test_no_drift_across_many_lines() {
        let pct = DiscountPercentage::new(Decimal::new(125, 1)).unwrap(); // 12.5%
        let line = Money::from_cents(99);
        let discount_per_line = line.percentage_of(pct);

        let total: Money = (0..1000).map(|_| discount_per_line).sum();
        assert_eq!(total.amount(), Decimal::new(12375, 2)); // 123.75 exactly
        assert_eq!(total.to_string(), "123.75");
    }

    #[test]
    fn test_discount_percentage_bounds() {
        assert!(DiscountPercentage::from_whole(0).is_ok());
        assert!(DiscountPercentage::from_whole(100).is_ok());
        assert!(DiscountPercentage::from_whole(101).is_err());
        assert!(DiscountPercentage::new(Decimal::new(-1, 0)).is_err());
        assert!("12.5".parse::<DiscountPercentage>().is_ok());
        assert!("abc".parse::<DiscountPercentage>().is_err());
    }

    #[test]
    fn test_serde_rejects_negative() {
        let ok: Money = serde_json::from_str("\"12.50\"").unwrap();
        assert_eq!(ok, Money::from_cents(1250));
        assert!(serde_json::from_str::<Money>("\"-1\"").is_err());
        assert!(serde_json::from_str::<DiscountPercentage>("\"150\"").is_err());
    }

    #[test]
    fn test_amounts_above_bound_rejected() {
        assert!(Money::new(MAX_AMOUNT).is_ok());
        assert!(matches!(
            Money::new(Decimal::MAX / Decimal::TWO),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!("1000000000000.01".parse::<Money>().is_err());
        assert!(serde_json::from_str::<Money>("\"99999999999999999999\"").is_err());
    }

    #[test]
    fn test_totals_may_exceed_bound() {
        let total = Money::parse_total("5000000000000.50").unwrap();
        assert!(total.amount() > MAX_AMOUNT);
        assert!(Money::parse_total("-0.01").is_err());
        assert!(Money::parse_total("lots").is_err());
    }

    #[test]
    fn test_arithmetic_saturates_instead_of_panicking() {
        let huge = Money::new(MAX_AMOUNT).unwrap().times(i64::MAX);
        let doubled = huge.times(i64::MAX);
        assert_eq!(doubled.amount(), Decimal::MAX);
        assert_eq!((doubled + doubled).amount(), Decimal::MAX);

        let half = doubled.percentage_of(DiscountPercentage::from_whole(50).unwrap());
        assert!(half < doubled);
        assert!(half.amount() > Decimal::ZERO);

        let total: Money = vec![doubled; 3].into_iter().sum();
        assert_eq!(total.amount(), Decimal::MAX);
    }
}
