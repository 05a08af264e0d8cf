//! HTTP error mapping.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::domain::aggregates::{CouponError, OrderError, ProductError, ReviewError, StockError};
use crate::error::CommerceError;
use crate::gateway::GatewayError;
use crate::store::StoreError;

/// A JSON error response: `{"error": "<message>", "code": "<machine_code>"}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into(), retry_after: None }
    }

    pub fn bad_request(message: impl Into<String>) -> Self { Self::new(StatusCode::BAD_REQUEST, "invalid_request", message) }
    pub fn unauthorized() -> Self { Self::new(StatusCode::UNAUTHORIZED, "unauthorized", "missing credentials") }
    pub fn forbidden() -> Self { Self::new(StatusCode::FORBIDDEN, "forbidden", "invalid credentials") }

    pub fn rate_limited(retry_after: u64) -> Self {
        Self { retry_after: Some(retry_after), ..Self::new(StatusCode::TOO_MANY_REQUESTS, "rate_limited", "too many requests") }
    }

    fn internal(detail: &dyn std::fmt::Display) -> Self {
        error!(error = %detail, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", "internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut resp = (self.status, Json(json!({ "error": self.message, "code": self.code }))).into_response();
        if let Some(secs) = self.retry_after {
            if let Ok(v) = HeaderValue::from_str(&secs.to_string()) {
                resp.headers_mut().insert(header::RETRY_AFTER, v);
            }
        }
        resp
    }
}

impl From<CommerceError> for ApiError {
    fn from(e: CommerceError) -> Self {
        let message = e.to_string();
        match e {
            CommerceError::Invalid(_) => Self::bad_request(message),
            CommerceError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "not_found", message),
            CommerceError::InvalidSignature => Self::new(StatusCode::UNAUTHORIZED, "invalid_signature", message),
            CommerceError::Order(e) => order_error(e, message),
            CommerceError::Coupon(e) => coupon_error(&e, message),
            CommerceError::Product(ProductError::NegativeStock { .. }) => Self::new(StatusCode::CONFLICT, "insufficient_stock", message),
            CommerceError::Product(_) => Self::bad_request(message),
            CommerceError::Review(ReviewError::InvalidRating(_)) | CommerceError::Driver(_) => Self::bad_request(message),
            CommerceError::Review(ReviewError::NotYourOrder) => Self::new(StatusCode::FORBIDDEN, "not_your_order", message),
            CommerceError::Review(_) => Self::new(StatusCode::CONFLICT, "not_reviewable", message),
            CommerceError::Gateway(GatewayError::UnknownReference(_)) => Self::new(StatusCode::NOT_FOUND, "unknown_reference", message),
            CommerceError::Gateway(e) => {
                error!(error = %e, "payment gateway failure");
                Self::new(StatusCode::BAD_GATEWAY, "gateway_error", "payment gateway unavailable")
            }
            CommerceError::Store(StoreError::Conflict(_)) => Self::new(StatusCode::CONFLICT, "conflict", message),
            CommerceError::Store(e) => Self::internal(&e),
        }
    }
}

fn order_error(e: OrderError, message: String) -> ApiError {
    match e {
        OrderError::Stock(StockError::Insufficient { .. }) => ApiError::new(StatusCode::CONFLICT, "insufficient_stock", message),
        OrderError::Stock(StockError::Untracked(_)) | OrderError::ProductUnavailable(_) => {
            ApiError::new(StatusCode::BAD_REQUEST, "product_unavailable", message)
        }
        OrderError::Coupon(c) => coupon_error(&c, message),
        OrderError::InvalidTransition { .. } => ApiError::new(StatusCode::CONFLICT, "invalid_transition", message),
        OrderError::NotPayable { .. } => ApiError::new(StatusCode::CONFLICT, "not_payable", message),
        OrderError::ReturnWindowClosed { .. } => ApiError::new(StatusCode::CONFLICT, "return_window_closed", message),
        OrderError::NotDispatchable { .. } => ApiError::new(StatusCode::CONFLICT, "not_dispatchable", message),
        OrderError::DriverInactive(_) => ApiError::new(StatusCode::CONFLICT, "driver_inactive", message),
        OrderError::NoDriver => ApiError::new(StatusCode::CONFLICT, "no_driver", message),
        OrderError::NoItems | OrderError::InvalidQuantity(_) | OrderError::MissingReason | OrderError::UnknownStatus(_) => {
            ApiError::bad_request(message)
        }
        OrderError::Money(_) => ApiError::bad_request(message),
    }
}

fn coupon_error(e: &CouponError, message: String) -> ApiError {
    match e {
        CouponError::NotFound => ApiError::new(StatusCode::NOT_FOUND, "coupon_not_found", message),
        CouponError::Inactive
        | CouponError::NotStarted
        | CouponError::Expired
        | CouponError::UsageLimitReached
        | CouponError::BelowMinimum { .. } => ApiError::new(StatusCode::BAD_REQUEST, "coupon_rejected", message),
        _ => ApiError::bad_request(message),
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self { Self::bad_request(e.to_string()) }
}

// Malformed paths, queries and bodies are all plain 400s.

impl From<PathRejection> for ApiError {
    fn from(e: PathRejection) -> Self { Self::bad_request(e.body_text()) }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self { Self::bad_request(e.body_text()) }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self { Self::bad_request(e.body_text()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::OrderStatus;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(CommerceError, StatusCode, &str)> = vec![
            (CommerceError::Invalid("x".into()), StatusCode::BAD_REQUEST, "invalid_request"),
            (CommerceError::NotFound("order"), StatusCode::NOT_FOUND, "not_found"),
            (CommerceError::InvalidSignature, StatusCode::UNAUTHORIZED, "invalid_signature"),
            (
                OrderError::InvalidTransition { from: OrderStatus::Pending, to: OrderStatus::Shipped }.into(),
                StatusCode::CONFLICT,
                "invalid_transition",
            ),
            (
                OrderError::Stock(StockError::Insufficient { product_id: uuid::Uuid::nil(), requested: 2, available: 1 }).into(),
                StatusCode::CONFLICT,
                "insufficient_stock",
            ),
            (CouponError::Expired.into(), StatusCode::BAD_REQUEST, "coupon_rejected"),
            (GatewayError::Transport("down".into()).into(), StatusCode::BAD_GATEWAY, "gateway_error"),
            (CommerceError::Store(StoreError::Conflict("key".into())), StatusCode::CONFLICT, "conflict"),
            (ReviewError::InvalidRating(9).into(), StatusCode::BAD_REQUEST, "invalid_request"),
            (ReviewError::NotYourOrder.into(), StatusCode::FORBIDDEN, "not_your_order"),
            (ReviewError::NotDelivered.into(), StatusCode::CONFLICT, "not_reviewable"),
            (OrderError::NoDriver.into(), StatusCode::CONFLICT, "no_driver"),
            (CommerceError::Store(StoreError::Corrupt("bad".into())), StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        ];
        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!((api.status, api.code), (status, code));
        }
    }

    #[test]
    fn test_internal_errors_hide_detail() {
        let api = ApiError::from(CommerceError::Store(StoreError::Corrupt("secret row".into())));
        assert_eq!(api.message, "internal server error");
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let resp = ApiError::rate_limited(17).into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()[header::RETRY_AFTER], "17");
    }
}
