//! Coupon Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::{CouponCode, Money};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub kind: CouponKind,
    pub value: i64,
    pub min_order_amount: i64,
    pub max_discount: Option<i64>,
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponKind { Percentage, Fixed }

impl CouponKind {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Percentage => "PERCENTAGE", Self::Fixed => "FIXED" }
    }
}

impl FromStr for CouponKind {
    type Err = CouponError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PERCENTAGE" => Ok(Self::Percentage),
            "FIXED" => Ok(Self::Fixed),
            other => Err(CouponError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CouponDraft {
    pub code: String,
    pub kind: CouponKind,
    pub value: i64,
    pub min_order_amount: i64,
    pub max_discount: Option<i64>,
    pub usage_limit: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Coupon {
    pub fn create(draft: CouponDraft, now: DateTime<Utc>) -> Result<Self, CouponError> {
        let code = CouponCode::parse(&draft.code).ok_or(CouponError::InvalidCode)?;
        match draft.kind {
            CouponKind::Percentage if !(1..=100).contains(&draft.value) => return Err(CouponError::InvalidValue(draft.value)),
            CouponKind::Fixed if draft.value <= 0 => return Err(CouponError::InvalidValue(draft.value)),
            _ => {}
        }
        if let (Some(start), Some(end)) = (draft.starts_at, draft.expires_at) {
            if end <= start { return Err(CouponError::InvalidWindow); }
        }
        Ok(Self {
            id: Uuid::now_v7(), code: code.as_str().to_string(), kind: draft.kind, value: draft.value,
            min_order_amount: draft.min_order_amount.max(0), max_discount: draft.max_discount,
            usage_limit: draft.usage_limit, usage_count: 0, starts_at: draft.starts_at,
            expires_at: draft.expires_at, is_active: true, created_at: now,
        })
    }

    /// Checks eligibility against `subtotal` and returns the discount it grants.
    pub fn discount_for(&self, subtotal: &Money, now: DateTime<Utc>) -> Result<Money, CouponError> {
        if !self.is_active { return Err(CouponError::Inactive); }
        if self.starts_at.is_some_and(|s| now < s) { return Err(CouponError::NotStarted); }
        if self.expires_at.is_some_and(|e| now > e) { return Err(CouponError::Expired); }
        if self.usage_limit.is_some_and(|limit| self.usage_count >= limit) { return Err(CouponError::UsageLimitReached); }
        if subtotal.amount() < self.min_order_amount {
            return Err(CouponError::BelowMinimum { minimum: self.min_order_amount, subtotal: subtotal.amount() });
        }
        let discount = match self.kind {
            CouponKind::Percentage => {
                let raw = subtotal.percentage(self.value);
                match self.max_discount {
                    Some(cap) => raw.min(&Money::new(cap, subtotal.currency())),
                    None => raw,
                }
            }
            CouponKind::Fixed => Money::new(self.value, subtotal.currency()).min(subtotal),
        };
        Ok(discount)
    }

    pub fn redeem(&mut self) { self.usage_count += 1; }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("coupon not found")]
    NotFound,
    #[error("coupon code is malformed")]
    InvalidCode,
    #[error("coupon is no longer active")]
    Inactive,
    #[error("coupon is not yet valid")]
    NotStarted,
    #[error("coupon has expired")]
    Expired,
    #[error("coupon usage limit reached")]
    UsageLimitReached,
    #[error("order subtotal {subtotal} is below the coupon minimum {minimum}")]
    BelowMinimum { minimum: i64, subtotal: i64 },
    #[error("invalid coupon value {0}")]
    InvalidValue(i64),
    #[error("coupon must expire after it starts")]
    InvalidWindow,
    #[error("unknown coupon kind {0}")]
    UnknownKind(String),
}
