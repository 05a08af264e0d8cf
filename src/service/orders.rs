//! Checkout and order lifecycle commands.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::CommerceService;
use crate::domain::aggregates::{Order, OrderError, OrderStatus, Placement};
use crate::domain::events::AuditEntry;
use crate::domain::reconcile::{OrderMutation, OrderState};
use crate::error::{CommerceError, Result};
use crate::store::{OrderKey, OrderQuery, Page, PlaceOrder, PlacedOrder};

/// Checkout input. Either `lines` or `cart_session` supplies the items.
#[derive(Debug, Clone, Default)]
pub struct NewOrder {
    pub customer_email: String,
    pub user_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub lines: Vec<(Uuid, i64)>,
    pub cart_session: Option<String>,
    pub shipping_address: serde_json::Value,
    pub coupon_code: Option<String>,
}

/// An order with its lines, payment and audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub state: OrderState,
    pub events: Vec<AuditEntry>,
}

impl CommerceService {
    pub async fn place_order(&self, req: NewOrder) -> Result<PlacedOrder> {
        let (lines, cart_session) = if req.lines.is_empty() {
            match req.cart_session.as_deref() {
                Some(session) => {
                    let cart = self.cart(session).await?;
                    if let Some(item) = cart.items().iter().find(|i| !i.available) {
                        return Err(OrderError::ProductUnavailable(item.product_id).into());
                    }
                    (cart.order_lines(), Some(session.to_string()))
                }
                None => (vec![], None),
            }
        } else {
            (req.lines, None)
        };

        let placed = self
            .store
            .place_order(PlaceOrder {
                placement: Placement {
                    customer_email: req.customer_email,
                    user_id: req.user_id,
                    idempotency_key: req.idempotency_key,
                    lines,
                    shipping_address: req.shipping_address,
                    coupon_code: req.coupon_code,
                },
                cart_session,
                pricing: self.config.pricing(),
                now: Utc::now(),
            })
            .await?;

        let order = &placed.state.order;
        if placed.created {
            info!(order_id = %order.id, order_number = %order.order_number, total = order.total, "order placed");
            self.events.publish(&placed.events).await;
        } else {
            info!(order_id = %order.id, idempotency_key = ?order.idempotency_key, "idempotent replay; returning existing order");
        }
        Ok(placed)
    }

    pub async fn order_detail(&self, id: Uuid) -> Result<OrderDetail> {
        let state = self.store.load_order(&OrderKey::Id(id)).await?.ok_or(CommerceError::NotFound("order"))?;
        let events = self.store.order_events(id).await?;
        Ok(OrderDetail { state, events })
    }

    pub async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>> {
        Ok(self.store.list_orders(query).await?)
    }

    pub async fn cancel_order(&self, id: Uuid, reason: Option<String>) -> Result<OrderState> {
        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()).unwrap_or_else(|| "cancelled by customer".into());
        self.mutate(id, OrderMutation::Cancel { reason }).await
    }

    pub async fn advance_order(&self, id: Uuid, to: OrderStatus) -> Result<OrderState> {
        self.mutate(id, OrderMutation::Advance(to)).await
    }

    pub async fn request_return(&self, id: Uuid, reason: &str) -> Result<OrderState> {
        let window_days = self.config.return_window_days;
        self.mutate(id, OrderMutation::RequestReturn { reason: reason.to_string(), window_days }).await
    }

    pub async fn resolve_return(&self, id: Uuid, approve: bool) -> Result<OrderState> {
        self.mutate(id, OrderMutation::ResolveReturn { approve }).await
    }

    pub(super) async fn mutate(&self, id: Uuid, mutation: OrderMutation) -> Result<OrderState> {
        let label = mutation_label(&mutation);
        match self.store.mutate_order(&OrderKey::Id(id), mutation, Utc::now()).await {
            Ok((state, outcome)) => {
                info!(order_id = %id, command = label, status = state.order.status.as_str(), "order updated");
                self.events.publish(&outcome.events).await;
                Ok(state)
            }
            Err(e) => {
                warn!(order_id = %id, command = label, error = %e, "order command rejected");
                Err(e.into())
            }
        }
    }
}

fn mutation_label(m: &OrderMutation) -> &'static str {
    match m {
        OrderMutation::AttachPayment(_) => "attach_payment",
        OrderMutation::Settle(_) => "settle",
        OrderMutation::Cancel { .. } => "cancel",
        OrderMutation::Advance(_) => "advance",
        OrderMutation::RequestReturn { .. } => "request_return",
        OrderMutation::ResolveReturn { .. } => "resolve_return",
        OrderMutation::AssignDriver(_) => "assign_driver",
        OrderMutation::RecordDelivery { .. } => "record_delivery",
    }
}
