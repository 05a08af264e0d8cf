//! Payment initialization and finalization.
//!
//! A payment can be finalized three ways: the Paystack webhook, the client
//! calling verify after the redirect, and the sweeper polling stale orders.
//! All three end in [`CommerceService::settle`], which reconciles under the
//! order lock, so they may race or repeat freely.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::CommerceService;
use crate::domain::aggregates::{generate_reference, is_valid_reference, GatewayOutcome};
use crate::domain::reconcile::{OrderMutation, OrderState, PaymentInit, Settlement};
use crate::error::{CommerceError, Result};
use crate::gateway::signature::verify_signature;
use crate::gateway::{InitializeRequest, InitializedTransaction, PaystackEvent};
use crate::store::OrderKey;

#[derive(Debug, Clone, Serialize)]
pub struct SettlementReport {
    pub settlement: Settlement,
    #[serde(flatten)]
    pub state: OrderState,
}

/// What happened to a webhook delivery. Every variant is acknowledged with 200.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookAck {
    Settled { settlement: Settlement },
    Ignored { event: String },
    UnknownReference { reference: String },
}

impl CommerceService {
    pub async fn initialize_payment(&self, order_id: Uuid) -> Result<InitializedTransaction> {
        let state = self.store.load_order(&OrderKey::Id(order_id)).await?.ok_or(CommerceError::NotFound("order"))?;
        let order = &state.order;
        order.ensure_payable()?;

        let reference = generate_reference(&order.order_number);
        let tx = self
            .gateway
            .initialize(InitializeRequest {
                email: order.customer_email.clone(),
                amount: order.total,
                currency: order.currency.clone(),
                reference: reference.clone(),
                callback_url: self.config.paystack_callback_url.clone(),
                order_id: order.id,
                order_number: order.order_number.clone(),
            })
            .await
            .map_err(|e| {
                warn!(order_id = %order_id, %reference, gateway = self.gateway.name(), error = %e, "payment initialization failed");
                e
            })?;

        // The order may have been cancelled while the gateway call was in flight.
        let init = PaymentInit { reference: tx.reference.clone(), authorization_url: tx.authorization_url.clone(), access_code: tx.access_code.clone() };
        let (_, outcome) = self.store.mutate_order(&OrderKey::Id(order_id), OrderMutation::AttachPayment(init), Utc::now()).await?;
        info!(order_id = %order_id, reference = %tx.reference, "payment initialized");
        self.events.publish(&outcome.events).await;
        Ok(tx)
    }

    /// Client-side verification after the checkout redirect.
    pub async fn verify_payment(&self, reference: &str) -> Result<SettlementReport> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(CommerceError::Invalid("reference is required".into()));
        }
        if !is_valid_reference(reference) {
            return Err(CommerceError::Invalid("reference may only contain letters, digits, '.', '_', '=' and '-' (at most 100)".into()));
        }
        let outcome = self.gateway.verify(reference).await.map_err(|e| {
            warn!(%reference, error = %e, "payment verification failed");
            e
        })?;
        self.settle(outcome).await
    }

    /// Authenticates and reconciles one Paystack webhook delivery.
    pub async fn handle_webhook(&self, body: &[u8], signature: Option<&str>) -> Result<WebhookAck> {
        let valid = signature.is_some_and(|sig| verify_signature(&self.config.paystack_secret_key, body, sig));
        if !valid {
            warn!(signature_present = signature.is_some(), "webhook rejected: bad signature");
            return Err(CommerceError::InvalidSignature);
        }
        let event: PaystackEvent = serde_json::from_slice(body).map_err(|e| CommerceError::Invalid(format!("malformed webhook payload: {e}")))?;
        if !event.is_charge_outcome() {
            info!(event = %event.event, "webhook event ignored");
            return Ok(WebhookAck::Ignored { event: event.event });
        }
        let outcome = event.data.into_outcome();
        let reference = outcome.reference.clone();
        match self.settle(outcome).await {
            Ok(report) => Ok(WebhookAck::Settled { settlement: report.settlement }),
            Err(CommerceError::NotFound(_)) => {
                warn!(%reference, "webhook for unknown reference acknowledged");
                Ok(WebhookAck::UnknownReference { reference })
            }
            Err(e) => Err(e),
        }
    }

    /// Reconciles a gateway report against its order.
    pub async fn settle(&self, outcome: GatewayOutcome) -> Result<SettlementReport> {
        let key = OrderKey::Reference { reference: outcome.reference.clone(), order_id: outcome.order_id };
        let reference = outcome.reference.clone();
        let gateway_status = outcome.raw_status.clone();
        let (state, result) = self.store.mutate_order(&key, OrderMutation::Settle(outcome), Utc::now()).await?;
        let settlement = result.settlement.unwrap_or(Settlement::StillPending);
        info!(
            order_id = %state.order.id,
            %reference,
            %gateway_status,
            outcome = ?settlement,
            payment_status = state.order.payment_status.as_str(),
            "payment reconciled"
        );
        self.events.publish(&result.events).await;
        Ok(SettlementReport { settlement, state })
    }
}
