//! Driver roster and dispatch handlers. All admin-only.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use super::api_types::{AssignDriverRequest, DeliveryUpdateRequest, DriverRequest};
use super::error::ApiError;
use super::extract::{AdminGuard, ApiJson, ApiPath, ValidatedJson};
use super::AppState;
use crate::domain::aggregates::Driver;
use crate::domain::reconcile::OrderState;

type ApiResult<T> = Result<T, ApiError>;

pub(crate) async fn list_drivers(State(s): State<AppState>, _: AdminGuard) -> ApiResult<Json<Vec<Driver>>> {
    Ok(Json(s.service.list_drivers().await?))
}

pub(crate) async fn create_driver(
    State(s): State<AppState>,
    _: AdminGuard,
    ValidatedJson(r): ValidatedJson<DriverRequest>,
) -> ApiResult<(StatusCode, Json<Driver>)> {
    Ok((StatusCode::CREATED, Json(s.service.create_driver(r.into()).await?)))
}

pub(crate) async fn get_driver(State(s): State<AppState>, _: AdminGuard, ApiPath(id): ApiPath<Uuid>) -> ApiResult<Json<Driver>> {
    Ok(Json(s.service.get_driver(id).await?))
}

pub(crate) async fn update_driver(
    State(s): State<AppState>,
    _: AdminGuard,
    ApiPath(id): ApiPath<Uuid>,
    ValidatedJson(r): ValidatedJson<DriverRequest>,
) -> ApiResult<Json<Driver>> {
    Ok(Json(s.service.update_driver(id, r.into()).await?))
}

pub(crate) async fn deactivate_driver(State(s): State<AppState>, _: AdminGuard, ApiPath(id): ApiPath<Uuid>) -> ApiResult<Json<Driver>> {
    Ok(Json(s.service.deactivate_driver(id).await?))
}

pub(crate) async fn assign_driver(
    State(s): State<AppState>,
    _: AdminGuard,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(r): ApiJson<AssignDriverRequest>,
) -> ApiResult<Json<OrderState>> {
    Ok(Json(s.service.assign_driver(id, r.driver_id).await?))
}

pub(crate) async fn record_delivery(
    State(s): State<AppState>,
    _: AdminGuard,
    ApiPath(id): ApiPath<Uuid>,
    ValidatedJson(r): ValidatedJson<DeliveryUpdateRequest>,
) -> ApiResult<Json<OrderState>> {
    Ok(Json(s.service.record_delivery(id, r.stage, r.note).await?))
}
