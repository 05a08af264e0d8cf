//! Payment records and gateway outcomes

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use super::OrderError;

/// The single payment row kept per order. Re-initializing replaces the reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub reference: String,
    pub status: PaymentRecordStatus,
    pub amount: i64,
    pub currency: String,
    pub channel: Option<String>,
    pub gateway_response: Option<String>,
    pub authorization_url: Option<String>,
    pub access_code: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentRecordStatus { #[default] Pending, Success, Failed }

impl PaymentRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "PENDING", Self::Success => "SUCCESS", Self::Failed => "FAILED" }
    }
}

impl FromStr for PaymentRecordStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

impl Payment {
    pub fn new(order_id: Uuid, reference: &str, amount: i64, currency: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(), order_id, reference: reference.to_string(), status: PaymentRecordStatus::Pending,
            amount, currency: currency.to_string(), channel: None, gateway_response: None,
            authorization_url: None, access_code: None, paid_at: None, created_at: now, updated_at: now,
        }
    }

    /// Overwrites the row with what the gateway reported.
    pub fn record(&mut self, outcome: &GatewayOutcome, status: PaymentRecordStatus, now: DateTime<Utc>) {
        self.reference = outcome.reference.clone();
        self.status = status;
        self.amount = outcome.amount;
        self.currency = outcome.currency.clone();
        if outcome.channel.is_some() { self.channel = outcome.channel.clone(); }
        if outcome.gateway_response.is_some() { self.gateway_response = outcome.gateway_response.clone(); }
        if status == PaymentRecordStatus::Success { self.paid_at = Some(outcome.paid_at.unwrap_or(now)); }
        self.updated_at = now;
    }
}

/// `<order_number>-` followed by six random uppercase alphanumerics.
pub fn generate_reference(order_number: &str) -> String {
    let suffix: String = rand::thread_rng().sample_iter(&Alphanumeric).take(6).map(char::from).collect();
    format!("{}-{}", order_number, suffix.to_uppercase())
}

pub const MAX_REFERENCE_LEN: usize = 100;

/// Gateway references are `[A-Za-z0-9._=-]{1,100}` with at least one letter or digit.
pub fn is_valid_reference(reference: &str) -> bool {
    (1..=MAX_REFERENCE_LEN).contains(&reference.len())
        && reference.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '=' | '-'))
        && reference.chars().any(|c| c.is_ascii_alphanumeric())
}

/// Transaction status as reported by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus { Success, Failed, Reversed, Abandoned, Pending }

impl GatewayStatus {
    /// Unrecognized statuses (`ongoing`, `queued`, `send_otp`, ...) are still in flight.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "success" => Self::Success,
            "failed" => Self::Failed,
            "reversed" => Self::Reversed,
            "abandoned" => Self::Abandoned,
            _ => Self::Pending,
        }
    }

    pub fn is_failure(&self) -> bool { matches!(self, Self::Failed | Self::Reversed) }
    pub fn is_in_flight(&self) -> bool { matches!(self, Self::Pending | Self::Abandoned) }
}

/// What the gateway said about one transaction, from a webhook or a verify call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOutcome {
    pub reference: String,
    pub status: GatewayStatus,
    pub raw_status: String,
    pub amount: i64,
    pub currency: String,
    pub channel: Option<String>,
    pub gateway_response: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub order_id: Option<Uuid>,
}
