//! Value Objects for the storefront

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Largest quantity a single order or cart line may carry.
pub const MAX_LINE_QUANTITY: u32 = 100;

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > 50 { return Err(SkuError::TooLong); }
        Ok(Self(value))
    }

    /// `TRD-` followed by eight random digits.
    pub fn generate() -> Self { Self(format!("TRD-{:08}", rand::random::<u32>() % 100_000_000)) }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_inner(self) -> String { self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkuError {
    #[error("SKU empty")]
    Empty,
    #[error("SKU too long")]
    TooLong,
}

/// Money value object, held in minor units (kobo for NGN).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: i64, currency: String }

impl Money {
    pub fn new(amount: i64, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn ngn(amount: i64) -> Self { Self::new(amount, "NGN") }
    pub fn zero(currency: &str) -> Self { Self::new(0, currency) }
    pub fn amount(&self) -> i64 { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn is_zero(&self) -> bool { self.amount == 0 }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.same_currency(other)?;
        Ok(Money::new(self.amount.saturating_add(other.amount), &self.currency))
    }

    /// Subtracts, flooring at zero.
    pub fn subtract(&self, other: &Money) -> Result<Money, MoneyError> {
        self.same_currency(other)?;
        Ok(Money::new((self.amount - other.amount).max(0), &self.currency))
    }

    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.amount.saturating_mul(i64::from(qty)), &self.currency) }

    /// `percent`% of this amount, rounded down to the minor unit.
    pub fn percentage(&self, percent: i64) -> Money { Money::new(self.amount.saturating_mul(percent) / 100, &self.currency) }

    pub fn min(&self, other: &Money) -> Money { if other.amount < self.amount { other.clone() } else { self.clone() } }

    fn same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch { left: self.currency.clone(), right: other.currency.clone() });
        }
        Ok(())
    }
}

impl Default for Money { fn default() -> Self { Self::zero("NGN") } }

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{:02}", self.currency, self.amount / 100, (self.amount % 100).abs())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },
}

/// Quantity value object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    /// A quantity acceptable on a cart or order line.
    pub fn line(value: i64) -> Result<Self, QuantityError> {
        if value < 1 || value > i64::from(MAX_LINE_QUANTITY) { return Err(QuantityError::OutOfRange(value)); }
        Ok(Self(value as u32))
    }

    pub fn value(&self) -> u32 { self.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity {0} must be between 1 and {MAX_LINE_QUANTITY}")]
    OutOfRange(i64),
}

/// Coupon code, compared case-insensitively.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CouponCode(String);

impl CouponCode {
    pub fn parse(raw: &str) -> Option<Self> {
        let code = raw.trim().to_uppercase();
        if code.is_empty() || code.len() > 40 || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return None;
        }
        Some(Self(code))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_sku() { let sku = Sku::new("prod-001").unwrap(); assert_eq!(sku.as_str(), "PROD-001"); }
    #[test]
    fn test_generated_sku_shape() {
        let sku = Sku::generate();
        assert!(sku.as_str().starts_with("TRD-"));
        assert_eq!(sku.as_str().len(), 12);
    }
    #[test]
    fn test_money_add() {
        let a = Money::ngn(10_000);
        let b = Money::ngn(5_000);
        assert_eq!(a.add(&b).unwrap().amount(), 15_000);
        assert!(a.add(&Money::new(1, "USD")).is_err());
    }
    #[test]
    fn test_money_subtract_floors_at_zero() {
        assert_eq!(Money::ngn(500).subtract(&Money::ngn(800)).unwrap().amount(), 0);
    }
    #[test]
    fn test_percentage_rounds_down() {
        assert_eq!(Money::ngn(999).percentage(15).amount(), 149);
    }
    #[test]
    fn test_line_quantity_bounds() {
        assert!(Quantity::line(0).is_err());
        assert!(Quantity::line(101).is_err());
        assert_eq!(Quantity::line(100).unwrap().value(), 100);
    }
    #[test]
    fn test_coupon_code_normalized() {
        assert_eq!(CouponCode::parse("  save10 ").unwrap().as_str(), "SAVE10");
        assert!(CouponCode::parse("bad code").is_none());
        assert!(CouponCode::parse("").is_none());
    }
    #[test]
    fn test_money_display() { assert_eq!(Money::ngn(150_050).to_string(), "NGN 1500.50"); }
}
