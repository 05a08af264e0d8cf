//! Checkout and order handlers.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use super::api_types::{AdvanceRequest, CancelRequest, ListParams, OrderResponse, PlaceOrderRequest, ResolveReturnRequest, ReturnRequest};
use super::error::ApiError;
use super::extract::{AdminGuard, ApiJson, ApiPath, ApiQuery, ClientAddr, ValidatedJson};
use super::AppState;
use crate::domain::aggregates::Order;
use crate::domain::reconcile::OrderState;
use crate::service::{NewOrder, OrderDetail};
use crate::store::{OrderQuery, Page};

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";
const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

type ApiResult<T> = Result<T, ApiError>;

pub(crate) async fn place_order(
    State(s): State<AppState>,
    ClientAddr(client): ClientAddr,
    headers: HeaderMap,
    ValidatedJson(r): ValidatedJson<PlaceOrderRequest>,
) -> ApiResult<(StatusCode, Json<OrderResponse>)> {
    s.limiter.check(&client).map_err(ApiError::rate_limited)?;
    let idempotency_key = idempotency_key(&headers)?;

    let placed = s
        .service
        .place_order(NewOrder {
            customer_email: r.customer_email,
            user_id: r.user_id,
            idempotency_key,
            lines: r.items.iter().map(|l| (l.product_id, l.quantity)).collect(),
            cart_session: r.cart_session,
            shipping_address: r.shipping_address,
            coupon_code: r.coupon_code,
        })
        .await?;
    let status = if placed.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(OrderResponse { state: placed.state, created: placed.created })))
}

fn idempotency_key(headers: &HeaderMap) -> ApiResult<Option<String>> {
    let Some(raw) = headers.get(IDEMPOTENCY_HEADER) else { return Ok(None) };
    let key = raw.to_str().map_err(|_| ApiError::bad_request("Idempotency-Key must be visible ASCII"))?.trim();
    if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(ApiError::bad_request(format!("Idempotency-Key must be 1 to {MAX_IDEMPOTENCY_KEY_LEN} characters")));
    }
    Ok(Some(key.to_string()))
}

pub(crate) async fn list_customer_orders(State(s): State<AppState>, ApiQuery(p): ApiQuery<ListParams>) -> ApiResult<Json<Page<Order>>> {
    let email = p.email.clone().map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty()).ok_or_else(|| ApiError::bad_request("email is required"))?;
    let query = OrderQuery { page: p.page(), per_page: p.per_page(), email: Some(email), status: p.status };
    Ok(Json(s.service.list_orders(&query).await?))
}

pub(crate) async fn get_order(State(s): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ApiResult<Json<OrderDetail>> {
    Ok(Json(s.service.order_detail(id).await?))
}

pub(crate) async fn cancel_order(State(s): State<AppState>, ApiPath(id): ApiPath<Uuid>, body: Option<Json<CancelRequest>>) -> ApiResult<Json<OrderState>> {
    let reason = body.and_then(|Json(b)| b.reason);
    Ok(Json(s.service.cancel_order(id, reason).await?))
}

pub(crate) async fn request_return(
    State(s): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ValidatedJson(r): ValidatedJson<ReturnRequest>,
) -> ApiResult<Json<OrderState>> {
    Ok(Json(s.service.request_return(id, &r.reason).await?))
}

pub(crate) async fn list_all_orders(State(s): State<AppState>, _: AdminGuard, ApiQuery(p): ApiQuery<ListParams>) -> ApiResult<Json<Page<Order>>> {
    let query = OrderQuery { page: p.page(), per_page: p.per_page(), email: p.email.clone(), status: p.status };
    Ok(Json(s.service.list_orders(&query).await?))
}

pub(crate) async fn advance_order(
    State(s): State<AppState>,
    _: AdminGuard,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(r): ApiJson<AdvanceRequest>,
) -> ApiResult<Json<OrderState>> {
    Ok(Json(s.service.advance_order(id, r.status).await?))
}

pub(crate) async fn resolve_return(
    State(s): State<AppState>,
    _: AdminGuard,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(r): ApiJson<ResolveReturnRequest>,
) -> ApiResult<Json<OrderState>> {
    Ok(Json(s.service.resolve_return(id, r.approve).await?))
}
