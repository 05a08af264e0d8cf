//! Payment gateway boundary.
//!
//! The service talks to the gateway through [`PaymentGateway`]; Paystack is
//! the production implementation. Tests substitute a scripted gateway.

pub mod paystack;
pub mod signature;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::GatewayOutcome;

pub use paystack::{PaystackClient, PaystackEvent};

/// Parameters for starting a hosted-checkout transaction.
#[derive(Debug, Clone)]
pub struct InitializeRequest {
    pub email: String,
    /// Minor units.
    pub amount: i64,
    pub currency: String,
    pub reference: String,
    pub callback_url: Option<String>,
    pub order_id: Uuid,
    pub order_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitializedTransaction {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn initialize(&self, req: InitializeRequest) -> Result<InitializedTransaction, GatewayError>;

    async fn verify(&self, reference: &str) -> Result<GatewayOutcome, GatewayError>;
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Transport(String),
    #[error("gateway rejected request (http {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("gateway response could not be decoded: {0}")]
    Decode(String),
    #[error("transaction {0} not found at gateway")]
    UnknownReference(String),
}
