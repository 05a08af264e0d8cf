//! Delivery drivers and the stages they report for an order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub vehicle: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default)]
pub struct DriverDraft {
    pub name: String,
    pub phone: String,
    pub vehicle: Option<String>,
    pub is_active: bool,
}

impl Driver {
    pub fn create(draft: DriverDraft, now: DateTime<Utc>) -> Result<Self, DriverError> {
        let (name, phone) = Self::check(&draft)?;
        Ok(Self {
            id: Uuid::now_v7(), name, phone, vehicle: draft.vehicle, is_active: draft.is_active,
            created_at: now, updated_at: now,
        })
    }

    pub fn apply(&mut self, draft: DriverDraft, now: DateTime<Utc>) -> Result<(), DriverError> {
        let (name, phone) = Self::check(&draft)?;
        self.name = name;
        self.phone = phone;
        self.vehicle = draft.vehicle;
        self.is_active = draft.is_active;
        self.updated_at = now;
        Ok(())
    }

    /// Drivers are never removed; orders keep pointing at them.
    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.updated_at = now;
    }

    fn check(draft: &DriverDraft) -> Result<(String, String), DriverError> {
        let name = draft.name.trim();
        if name.is_empty() { return Err(DriverError::MissingName); }
        Ok((name.to_string(), normalize_phone(&draft.phone)?))
    }
}

/// Strips spaces and dashes; keeps an optional leading `+` and 7 to 15 digits.
fn normalize_phone(raw: &str) -> Result<String, DriverError> {
    let compact: String = raw.trim().chars().filter(|c| !matches!(c, ' ' | '-')).collect();
    let digits = compact.strip_prefix('+').unwrap_or(&compact);
    if !(7..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(DriverError::InvalidPhone(raw.to_string()));
    }
    Ok(compact)
}

/// A point on the delivery trail, reported while a driver holds the order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStage { PickedUp, InTransit, OutForDelivery, Attempted }

impl DeliveryStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PickedUp => "PICKED_UP",
            Self::InTransit => "IN_TRANSIT",
            Self::OutForDelivery => "OUT_FOR_DELIVERY",
            Self::Attempted => "ATTEMPTED",
        }
    }
}

impl FromStr for DeliveryStage {
    type Err = DriverError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PICKED_UP" => Ok(Self::PickedUp),
            "IN_TRANSIT" => Ok(Self::InTransit),
            "OUT_FOR_DELIVERY" => Ok(Self::OutForDelivery),
            "ATTEMPTED" => Ok(Self::Attempted),
            other => Err(DriverError::UnknownStage(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("driver name is required")]
    MissingName,
    #[error("invalid phone number {0:?}")]
    InvalidPhone(String),
    #[error("unknown delivery stage {0}")]
    UnknownStage(String),
}
