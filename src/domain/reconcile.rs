//! Order mutations applied under the order lock.
//!
//! Stores load an [`OrderState`] and a [`StockBook`] for the order's products
//! inside one transaction, call [`apply`], and persist whatever changed. The
//! rules live here so every store settles payments the same way.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use crate::domain::aggregates::{
    DeliveryStage, Driver, GatewayOutcome, GatewayStatus, Order, OrderError, OrderItem, OrderStatus, Payment, PaymentRecordStatus,
    PaymentStatus, StockBook,
};
use crate::domain::events::{DomainEvent, OrderEvent};

/// An order together with its lines and payment row, as loaded under lock.
#[derive(Clone, Debug, Serialize)]
pub struct OrderState {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payment: Option<Payment>,
}

/// A freshly initialized gateway transaction to attach to an order.
#[derive(Clone, Debug)]
pub struct PaymentInit {
    pub reference: String,
    pub authorization_url: String,
    pub access_code: String,
}

#[derive(Clone, Debug)]
pub enum OrderMutation {
    AttachPayment(PaymentInit),
    Settle(GatewayOutcome),
    Cancel { reason: String },
    Advance(OrderStatus),
    RequestReturn { reason: String, window_days: i64 },
    ResolveReturn { approve: bool },
    AssignDriver(Driver),
    RecordDelivery { stage: DeliveryStage, note: Option<String> },
}

/// How a gateway report was reconciled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    Paid,
    Failed,
    StillPending,
    AlreadySettled,
    /// A failure for a reference the order has since replaced.
    Superseded,
    AmountMismatch,
    RefundRequired,
}

#[derive(Clone, Debug, Default)]
pub struct MutationOutcome {
    pub settlement: Option<Settlement>,
    /// Coupon whose usage count must go up by one.
    pub redeemed_coupon: Option<String>,
    pub events: Vec<DomainEvent>,
}

pub fn apply(state: &mut OrderState, book: &mut StockBook, mutation: OrderMutation, now: DateTime<Utc>) -> Result<MutationOutcome, OrderError> {
    let mut outcome = MutationOutcome::default();
    match mutation {
        OrderMutation::AttachPayment(init) => attach_payment(state, init, now)?,
        OrderMutation::Settle(report) => {
            let settlement = settle(state, book, &report, now);
            if settlement == Settlement::Paid {
                outcome.redeemed_coupon = state.order.coupon_code.clone();
            }
            outcome.settlement = Some(settlement);
        }
        OrderMutation::Cancel { reason } => state.order.cancel(&reason, &state.items, book, now)?,
        OrderMutation::Advance(to) => state.order.advance(to, now)?,
        OrderMutation::RequestReturn { reason, window_days } => state.order.request_return(&reason, window_days, now)?,
        OrderMutation::ResolveReturn { approve } => state.order.resolve_return(approve, &state.items, book, now)?,
        OrderMutation::AssignDriver(driver) => state.order.assign_driver(&driver, now)?,
        OrderMutation::RecordDelivery { stage, note } => state.order.record_delivery(stage, note, now)?,
    }
    if let Some(code) = &outcome.redeemed_coupon {
        state.order.raise_event(OrderEvent::CouponRedeemed { code: code.clone() }, now);
    }
    outcome.events = state.order.take_events();
    Ok(outcome)
}

fn attach_payment(state: &mut OrderState, init: PaymentInit, now: DateTime<Utc>) -> Result<(), OrderError> {
    let order = &mut state.order;
    order.ensure_payable()?;
    let payment = state.payment.get_or_insert_with(|| Payment::new(order.id, &init.reference, order.total, &order.currency, now));
    payment.reference = init.reference.clone();
    payment.status = PaymentRecordStatus::Pending;
    payment.amount = order.total;
    payment.currency = order.currency.clone();
    payment.authorization_url = Some(init.authorization_url);
    payment.access_code = Some(init.access_code);
    payment.gateway_response = None;
    payment.paid_at = None;
    payment.updated_at = now;
    order.raise_event(OrderEvent::PaymentInitialized { reference: init.reference, amount: order.total }, now);
    Ok(())
}

/// Reconciles one gateway report. Repeating a report, or delivering reports
/// out of order, never moves money-bearing state twice.
fn settle(state: &mut OrderState, book: &mut StockBook, report: &GatewayOutcome, now: DateTime<Utc>) -> Settlement {
    let order = &mut state.order;
    if order.payment_status.is_settled() {
        info!(order_id = %order.id, reference = %report.reference, "payment already settled; ignoring report");
        return Settlement::AlreadySettled;
    }

    if report.status.is_in_flight() {
        if let Some(p) = state.payment.as_mut().filter(|p| p.reference == report.reference) {
            p.gateway_response = report.gateway_response.clone().or_else(|| Some(report.raw_status.clone()));
            p.updated_at = now;
        }
        return Settlement::StillPending;
    }

    let current_reference = state.payment.as_ref().map(|p| p.reference.clone());
    let payment = state.payment.get_or_insert_with(|| Payment::new(order.id, &report.reference, report.amount, &report.currency, now));

    if report.status.is_failure() {
        if current_reference.as_deref().is_some_and(|r| r != report.reference) {
            warn!(order_id = %order.id, reference = %report.reference, "failure for a superseded reference");
            return Settlement::Superseded;
        }
        payment.record(report, PaymentRecordStatus::Failed, now);
        if order.status != OrderStatus::Pending {
            return Settlement::AlreadySettled;
        }
        order.payment_status = PaymentStatus::Failed;
        order.raise_event(OrderEvent::PaymentFailed { reference: report.reference.clone(), gateway_status: report.raw_status.clone() }, now);
        order.void("payment failed", &state.items, book, now);
        return Settlement::Failed;
    }

    debug_assert_eq!(report.status, GatewayStatus::Success);
    payment.record(report, PaymentRecordStatus::Success, now);

    if report.currency != order.currency || report.amount < order.total {
        warn!(order_id = %order.id, reference = %report.reference, expected = order.total, received = report.amount, "paid amount does not cover the order");
        order.payment_status = PaymentStatus::RefundDue;
        order.raise_event(OrderEvent::AmountMismatch {
            reference: report.reference.clone(), expected: order.total, received: report.amount, currency: report.currency.clone(),
        }, now);
        order.raise_event(OrderEvent::RefundRequired { reference: report.reference.clone(), reason: "amount mismatch".into() }, now);
        if order.status == OrderStatus::Pending {
            order.void("payment amount mismatch", &state.items, book, now);
        }
        return Settlement::AmountMismatch;
    }

    if order.status == OrderStatus::Cancelled {
        if let Err(e) = order.reclaim_stock(&state.items, book, now) {
            warn!(order_id = %order.id, reference = %report.reference, error = %e, "late payment for a cancelled order; stock is gone");
            order.payment_status = PaymentStatus::RefundDue;
            order.raise_event(OrderEvent::RefundRequired { reference: report.reference.clone(), reason: e.to_string() }, now);
            return Settlement::RefundRequired;
        }
    }

    order.mark_paid(payment.paid_at.unwrap_or(now));
    order.raise_event(OrderEvent::PaymentSucceeded { reference: report.reference.clone(), amount: report.amount, channel: report.channel.clone() }, now);
    Settlement::Paid
}
