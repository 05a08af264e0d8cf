//! Request and response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{
    CouponDraft, CouponKind, DeliveryStage, DriverDraft, OrderStatus, ProductDraft, ProductStatus, ReviewDraft,
};
use crate::domain::reconcile::OrderState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub store: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub category: Option<Uuid>,
    pub search: Option<String>,
    pub email: Option<String>,
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub include_inactive: bool,
}

impl ListParams {
    pub fn page(&self) -> u32 { self.page.unwrap_or(1).max(1) }
    pub fn per_page(&self) -> u32 { self.per_page.unwrap_or(20).clamp(1, 100) }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductRequest {
    #[validate(length(min = 1, max = 64))]
    pub sku: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 1))]
    pub price: i64,
    #[validate(range(min = 1))]
    pub compare_at_price: Option<i64>,
    pub category_id: Option<Uuid>,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    pub status: Option<ProductStatus>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl From<ProductRequest> for ProductDraft {
    fn from(r: ProductRequest) -> Self {
        Self {
            sku: r.sku,
            name: r.name,
            description: r.description,
            price: r.price,
            compare_at_price: r.compare_at_price,
            category_id: r.category_id,
            stock: r.stock.unwrap_or(0),
            status: r.status.unwrap_or(ProductStatus::Active),
            images: r.images,
            tags: r.tags,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StockAdjustmentRequest {
    pub delta: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CategoryRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 100))]
    pub quantity: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetQuantityRequest {
    #[validate(range(min = 0, max = 100))]
    pub quantity: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, max = 40))]
    pub code: String,
    #[validate(range(min = 0))]
    pub subtotal: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CouponRequest {
    #[validate(length(min = 1, max = 40))]
    pub code: String,
    pub kind: CouponKind,
    #[validate(range(min = 1))]
    pub value: i64,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub min_order_amount: i64,
    #[validate(range(min = 1))]
    pub max_discount: Option<i64>,
    #[validate(range(min = 1))]
    pub usage_limit: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<CouponRequest> for CouponDraft {
    fn from(r: CouponRequest) -> Self {
        Self {
            code: r.code,
            kind: r.kind,
            value: r.value,
            min_order_amount: r.min_order_amount,
            max_discount: r.max_discount,
            usage_limit: r.usage_limit,
            starts_at: r.starts_at,
            expires_at: r.expires_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 100))]
    pub quantity: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PlaceOrderRequest {
    #[validate(email)]
    pub customer_email: String,
    pub user_id: Option<String>,
    #[serde(default)]
    #[validate]
    pub items: Vec<OrderLineRequest>,
    /// Used when `items` is empty.
    pub cart_session: Option<String>,
    #[serde(default)]
    pub shipping_address: serde_json::Value,
    #[validate(length(min = 1, max = 40))]
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub state: OrderState,
    pub created: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReturnRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct ResolveReturnRequest {
    pub approve: bool,
}

#[derive(Debug, Deserialize)]
pub struct InitializePaymentRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    pub reference: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    pub order_id: Uuid,
    #[validate(email)]
    pub customer_email: String,
    #[validate(range(min = 1, max = 5))]
    pub rating: i16,
    #[validate(length(max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub body: Option<String>,
}

impl From<ReviewRequest> for ReviewDraft {
    fn from(r: ReviewRequest) -> Self {
        Self { order_id: r.order_id, customer_email: r.customer_email, rating: r.rating, title: r.title, body: r.body }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct DriverRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 7, max = 32))]
    pub phone: String,
    #[validate(length(max = 120))]
    pub vehicle: Option<String>,
    pub is_active: Option<bool>,
}

impl From<DriverRequest> for DriverDraft {
    fn from(r: DriverRequest) -> Self {
        Self { name: r.name, phone: r.phone, vehicle: r.vehicle, is_active: r.is_active.unwrap_or(true) }
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignDriverRequest {
    pub driver_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DeliveryUpdateRequest {
    pub stage: DeliveryStage,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}
