//! Domain events
//!
//! Every order mutation records its events in the `order_events` audit table
//! inside the same transaction; committed events are then published.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub order_id: Uuid,
    pub event: OrderEvent,
    pub at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(order_id: Uuid, event: OrderEvent, at: DateTime<Utc>) -> Self { Self { order_id, event, at } }

    /// NATS subject for this event.
    pub fn subject(&self) -> String { format!("trendify.orders.{}", self.event.kind()) }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_number: String, total: i64, coupon_code: Option<String> },
    PaymentInitialized { reference: String, amount: i64 },
    PaymentSucceeded { reference: String, amount: i64, channel: Option<String> },
    PaymentFailed { reference: String, gateway_status: String },
    AmountMismatch { reference: String, expected: i64, received: i64, currency: String },
    RefundRequired { reference: String, reason: String },
    StockReserved { units: i32 },
    StockRestored { units: i32 },
    CouponRedeemed { code: String },
    Cancelled { reason: String },
    StatusChanged { from: String, to: String },
    ReturnRequested { reason: String },
    ReturnResolved { approved: bool },
    DriverAssigned { driver_id: Uuid, driver_name: String },
    DeliveryUpdated { stage: String, driver_id: Uuid, note: Option<String> },
}

impl OrderEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Placed { .. } => "placed",
            Self::PaymentInitialized { .. } => "payment_initialized",
            Self::PaymentSucceeded { .. } => "payment_succeeded",
            Self::PaymentFailed { .. } => "payment_failed",
            Self::AmountMismatch { .. } => "amount_mismatch",
            Self::RefundRequired { .. } => "refund_required",
            Self::StockReserved { .. } => "stock_reserved",
            Self::StockRestored { .. } => "stock_restored",
            Self::CouponRedeemed { .. } => "coupon_redeemed",
            Self::Cancelled { .. } => "cancelled",
            Self::StatusChanged { .. } => "status_changed",
            Self::ReturnRequested { .. } => "return_requested",
            Self::ReturnResolved { .. } => "return_resolved",
            Self::DriverAssigned { .. } => "driver_assigned",
            Self::DeliveryUpdated { .. } => "delivery_updated",
        }
    }
}

/// An audit row as stored.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub kind: String,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<&DomainEvent> for AuditEntry {
    fn from(e: &DomainEvent) -> Self {
        Self {
            id: Uuid::now_v7(),
            order_id: e.order_id,
            kind: e.event.kind().to_string(),
            detail: serde_json::to_value(&e.event).unwrap_or(serde_json::Value::Null),
            created_at: e.at,
        }
    }
}
