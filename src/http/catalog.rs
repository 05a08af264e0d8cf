//! Catalog, cart and coupon handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use super::api_types::{
    AddToCartRequest, CategoryRequest, CouponRequest, ListParams, ProductRequest, ReviewRequest, SetQuantityRequest,
    StockAdjustmentRequest, ValidateCouponRequest,
};
use super::error::ApiError;
use super::extract::{AdminGuard, ApiJson, ApiPath, ApiQuery, ValidatedJson};
use super::AppState;
use crate::domain::aggregates::{Cart, Category, Coupon, Product, ProductReviews, Review};
use crate::service::CouponQuote;
use crate::store::{Page, ProductQuery};

type ApiResult<T> = Result<T, ApiError>;

pub(crate) async fn list_products(
    State(s): State<AppState>,
    admin: Option<AdminGuard>,
    ApiQuery(p): ApiQuery<ListParams>,
) -> ApiResult<Json<Page<Product>>> {
    let query = ProductQuery {
        page: p.page(),
        per_page: p.per_page(),
        category: p.category,
        search: p.search.clone().filter(|s| !s.trim().is_empty()),
        include_inactive: p.include_inactive && admin.is_some(),
    };
    Ok(Json(s.service.list_products(&query).await?))
}

pub(crate) async fn get_product(State(s): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ApiResult<Json<Product>> {
    Ok(Json(s.service.get_product(id).await?))
}

pub(crate) async fn create_product(
    State(s): State<AppState>,
    _: AdminGuard,
    ValidatedJson(r): ValidatedJson<ProductRequest>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    Ok((StatusCode::CREATED, Json(s.service.create_product(r.into()).await?)))
}

pub(crate) async fn update_product(
    State(s): State<AppState>,
    _: AdminGuard,
    ApiPath(id): ApiPath<Uuid>,
    ValidatedJson(r): ValidatedJson<ProductRequest>,
) -> ApiResult<Json<Product>> {
    Ok(Json(s.service.update_product(id, r.into()).await?))
}

pub(crate) async fn delete_product(State(s): State<AppState>, _: AdminGuard, ApiPath(id): ApiPath<Uuid>) -> ApiResult<StatusCode> {
    s.service.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn adjust_stock(
    State(s): State<AppState>,
    _: AdminGuard,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(r): ApiJson<StockAdjustmentRequest>,
) -> ApiResult<Json<Product>> {
    Ok(Json(s.service.adjust_stock(id, r.delta).await?))
}

pub(crate) async fn list_reviews(State(s): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> ApiResult<Json<ProductReviews>> {
    Ok(Json(s.service.product_reviews(id).await?))
}

pub(crate) async fn create_review(
    State(s): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ValidatedJson(r): ValidatedJson<ReviewRequest>,
) -> ApiResult<(StatusCode, Json<Review>)> {
    Ok((StatusCode::CREATED, Json(s.service.create_review(id, r.into()).await?)))
}

pub(crate) async fn list_categories(State(s): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(s.service.list_categories().await?))
}

pub(crate) async fn create_category(
    State(s): State<AppState>,
    _: AdminGuard,
    ValidatedJson(r): ValidatedJson<CategoryRequest>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    let c = s.service.create_category(&r.name, r.description, r.parent_id).await?;
    Ok((StatusCode::CREATED, Json(c)))
}

pub(crate) async fn get_cart(State(s): State<AppState>, ApiPath(session): ApiPath<String>) -> ApiResult<Json<Cart>> {
    Ok(Json(s.service.cart(&session).await?))
}

pub(crate) async fn add_to_cart(
    State(s): State<AppState>,
    ApiPath(session): ApiPath<String>,
    ValidatedJson(r): ValidatedJson<AddToCartRequest>,
) -> ApiResult<(StatusCode, Json<Cart>)> {
    Ok((StatusCode::CREATED, Json(s.service.add_to_cart(&session, r.product_id, r.quantity).await?)))
}

pub(crate) async fn set_cart_quantity(
    State(s): State<AppState>,
    ApiPath((session, product_id)): ApiPath<(String, Uuid)>,
    ValidatedJson(r): ValidatedJson<SetQuantityRequest>,
) -> ApiResult<Json<Cart>> {
    Ok(Json(s.service.set_cart_quantity(&session, product_id, r.quantity).await?))
}

pub(crate) async fn remove_cart_line(State(s): State<AppState>, ApiPath((session, product_id)): ApiPath<(String, Uuid)>) -> ApiResult<Json<Cart>> {
    Ok(Json(s.service.set_cart_quantity(&session, product_id, 0).await?))
}

pub(crate) async fn clear_cart(State(s): State<AppState>, ApiPath(session): ApiPath<String>) -> ApiResult<StatusCode> {
    s.service.clear_cart(&session).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn validate_coupon(State(s): State<AppState>, ValidatedJson(r): ValidatedJson<ValidateCouponRequest>) -> ApiResult<Json<CouponQuote>> {
    Ok(Json(s.service.validate_coupon(&r.code, r.subtotal).await?))
}

pub(crate) async fn list_coupons(State(s): State<AppState>, _: AdminGuard) -> ApiResult<Json<Vec<Coupon>>> {
    Ok(Json(s.service.list_coupons().await?))
}

pub(crate) async fn create_coupon(
    State(s): State<AppState>,
    _: AdminGuard,
    ValidatedJson(r): ValidatedJson<CouponRequest>,
) -> ApiResult<(StatusCode, Json<Coupon>)> {
    Ok((StatusCode::CREATED, Json(s.service.create_coupon(r.into()).await?)))
}

pub(crate) async fn deactivate_coupon(State(s): State<AppState>, _: AdminGuard, ApiPath(code): ApiPath<String>) -> ApiResult<Json<Coupon>> {
    Ok(Json(s.service.deactivate_coupon(&code).await?))
}
