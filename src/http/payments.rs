//! Payment and webhook handlers.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use super::api_types::{InitializePaymentRequest, VerifyParams};
use super::error::ApiError;
use super::extract::{ApiJson, ApiQuery, ClientAddr};
use super::AppState;
use crate::gateway::signature::SIGNATURE_HEADER;
use crate::gateway::InitializedTransaction;
use crate::service::{SettlementReport, WebhookAck};

type ApiResult<T> = Result<T, ApiError>;

pub(crate) async fn initialize_payment(
    State(s): State<AppState>,
    ClientAddr(client): ClientAddr,
    ApiJson(r): ApiJson<InitializePaymentRequest>,
) -> ApiResult<Json<InitializedTransaction>> {
    s.limiter.check(&client).map_err(ApiError::rate_limited)?;
    Ok(Json(s.service.initialize_payment(r.order_id).await?))
}

pub(crate) async fn verify_payment(
    State(s): State<AppState>,
    ClientAddr(client): ClientAddr,
    ApiQuery(p): ApiQuery<VerifyParams>,
) -> ApiResult<Json<SettlementReport>> {
    s.limiter.check(&client).map_err(ApiError::rate_limited)?;
    Ok(Json(s.service.verify_payment(&p.reference).await?))
}

/// The body is taken raw: the signature covers the exact bytes Paystack sent.
pub(crate) async fn paystack_webhook(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Json<WebhookAck>> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    Ok(Json(s.service.handle_webhook(&body, signature).await?))
}
