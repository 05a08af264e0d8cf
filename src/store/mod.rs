//! Persistence boundary.
//!
//! [`Store`] is implemented by [`PgStore`] for production and by
//! [`MemoryStore`] for tests and database-less local runs. Every order
//! mutation goes through [`Store::mutate_order`], which runs
//! [`crate::domain::reconcile::apply`] inside one transaction holding the
//! order lock and the locks on the order's product rows.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::domain::aggregates::{
    CartLine, Category, Coupon, Driver, Order, OrderError, OrderStatus, Placement, Pricing, Product, ProductError, Review,
};
use crate::domain::events::{AuditEntry, DomainEvent};
use crate::domain::reconcile::{MutationOutcome, OrderMutation, OrderState};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn offset(page: u32, per_page: u32) -> i64 { i64::from(page.saturating_sub(1)) * i64::from(per_page) }
}

#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    pub page: u32,
    pub per_page: u32,
    pub category: Option<Uuid>,
    pub search: Option<String>,
    /// Admin listings also show drafts and archived products.
    pub include_inactive: bool,
}

impl ProductQuery {
    pub fn matches(&self, p: &Product) -> bool {
        if p.is_deleted { return false; }
        if !self.include_inactive && !p.is_purchasable() { return false; }
        if self.category.is_some() && p.category_id != self.category { return false; }
        match self.search.as_deref().map(str::to_lowercase) {
            Some(term) => p.name.to_lowercase().contains(&term) || p.sku.to_lowercase().contains(&term),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub page: u32,
    pub per_page: u32,
    pub email: Option<String>,
    pub status: Option<OrderStatus>,
}

impl OrderQuery {
    pub fn matches(&self, o: &Order) -> bool {
        self.email.as_deref().map_or(true, |e| o.customer_email.eq_ignore_ascii_case(e))
            && self.status.map_or(true, |s| o.status == s)
    }
}

/// How an order is addressed for a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderKey {
    Id(Uuid),
    /// Payment reference, falling back to the order id carried in gateway metadata.
    Reference { reference: String, order_id: Option<Uuid> },
}

#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub placement: Placement,
    /// Cart emptied in the same transaction once the order exists.
    pub cart_session: Option<String>,
    pub pricing: Pricing,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub state: OrderState,
    /// False when an earlier order with the same idempotency key was returned.
    pub created: bool,
    pub events: Vec<DomainEvent>,
}

/// A PENDING order the sweeper should look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleOrder {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub reference: Option<String>,
}

impl StaleOrder {
    /// Keyset position of this row; the next page starts strictly after it.
    pub fn cursor(&self) -> (DateTime<Utc>, Uuid) { (self.created_at, self.id) }
}

/// Fresh order numbers drawn before a placement gives up.
pub const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Runs `attempt` again while it fails with [`StoreError::OrderNumberTaken`].
/// Each attempt prices the order anew and so draws a new number.
pub async fn retry_order_number<T, F, Fut>(mut attempt: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    for n in 1..=ORDER_NUMBER_ATTEMPTS {
        match attempt().await {
            Err(StoreError::OrderNumberTaken) => warn!(attempt = n, "order number already taken; drawing another"),
            other => return other,
        }
    }
    Err(StoreError::Conflict("could not allocate a unique order number".into()))
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Product(#[from] ProductError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("order number already taken")]
    OrderNumberTaken,
}

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    fn backend(&self) -> &'static str;
    async fn ping(&self) -> Result<(), StoreError>;

    async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>, StoreError>;
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError>;
    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Product>, StoreError>;
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError>;
    /// Writes every attribute except stock, which only moves through reservations and adjustments.
    async fn update_product(&self, product: &Product) -> Result<(), StoreError>;
    async fn adjust_stock(&self, id: Uuid, delta: i32, now: DateTime<Utc>) -> Result<Product, StoreError>;

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError>;
    async fn insert_category(&self, category: &Category) -> Result<(), StoreError>;

    async fn cart_lines(&self, session: &str) -> Result<Vec<CartLine>, StoreError>;
    /// Adds to an existing line for the same product, or creates one.
    async fn add_to_cart(&self, session: &str, product_id: Uuid, quantity: i32, now: DateTime<Utc>) -> Result<CartLine, StoreError>;
    /// Zero removes the line.
    async fn set_cart_quantity(&self, session: &str, product_id: Uuid, quantity: i32) -> Result<Option<CartLine>, StoreError>;
    async fn clear_cart(&self, session: &str) -> Result<(), StoreError>;

    async fn find_coupon(&self, code: &str) -> Result<Option<Coupon>, StoreError>;
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<(), StoreError>;
    async fn list_coupons(&self) -> Result<Vec<Coupon>, StoreError>;
    async fn deactivate_coupon(&self, code: &str) -> Result<Coupon, StoreError>;

    async fn place_order(&self, req: PlaceOrder) -> Result<PlacedOrder, StoreError>;
    async fn load_order(&self, key: &OrderKey) -> Result<Option<OrderState>, StoreError>;
    async fn mutate_order(&self, key: &OrderKey, mutation: OrderMutation, now: DateTime<Utc>) -> Result<(OrderState, MutationOutcome), StoreError>;
    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>, StoreError>;
    async fn order_events(&self, order_id: Uuid) -> Result<Vec<AuditEntry>, StoreError>;
    /// PENDING orders created before `cutoff`, ordered by `(created_at, id)`
    /// and starting strictly after `after`, with their current payment reference.
    async fn stale_pending_orders(&self, cutoff: DateTime<Utc>, after: Option<(DateTime<Utc>, Uuid)>, limit: i64) -> Result<Vec<StaleOrder>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the customer already reviewed the product.
    async fn insert_review(&self, review: &Review) -> Result<(), StoreError>;
    async fn product_reviews(&self, product_id: Uuid) -> Result<Vec<Review>, StoreError>;

    async fn list_drivers(&self) -> Result<Vec<Driver>, StoreError>;
    async fn get_driver(&self, id: Uuid) -> Result<Option<Driver>, StoreError>;
    async fn insert_driver(&self, driver: &Driver) -> Result<(), StoreError>;
    async fn update_driver(&self, driver: &Driver) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_order_number_collision_draws_again() {
        let calls = AtomicUsize::new(0);
        let placed = retry_order_number(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err(StoreError::OrderNumberTaken) } else { Ok(n) } }
        }).await.unwrap();
        assert_eq!(placed, 2);
    }

    #[tokio::test]
    async fn test_order_number_retries_are_bounded() {
        let calls = AtomicUsize::new(0);
        let err = retry_order_number(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(StoreError::OrderNumberTaken) }
        }).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(calls.load(Ordering::SeqCst), ORDER_NUMBER_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let err = retry_order_number(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(StoreError::NotFound("product")) }
        }).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound("product")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
