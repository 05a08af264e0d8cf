//! Axum router and handlers.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! the tracing layer, so the scenario tests in `tests/` can use the bare
//! router. The public API lives under `/api` and is mirrored under
//! `/api/mobile` with permissive CORS for the mobile apps.

pub mod api_types;
mod catalog;
mod drivers;
pub mod error;
pub mod extract;
mod orders;
mod payments;
pub mod rate_limit;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::config::Config;
use crate::service::CommerceService;
use api_types::HealthResponse;
use rate_limit::RateLimiter;

pub use error::ApiError;
pub use orders::IDEMPOTENCY_HEADER;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CommerceService>,
    pub config: Arc<Config>,
    /// Guards checkout and payment endpoints.
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(service: Arc<CommerceService>, config: Arc<Config>) -> Self {
        let limiter = Arc::new(RateLimiter::per_minute(config.rate_limit_per_minute));
        Self { service, config, limiter }
    }
}

/// Build the complete application router wired to the given shared state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes())
        .nest("/api/mobile", api_routes().layer(CorsLayer::permissive()))
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(catalog::list_products).post(catalog::create_product))
        .route(
            "/products/:id",
            get(catalog::get_product).put(catalog::update_product).delete(catalog::delete_product),
        )
        .route("/products/:id/stock", post(catalog::adjust_stock))
        .route("/products/:id/reviews", get(catalog::list_reviews).post(catalog::create_review))
        .route("/categories", get(catalog::list_categories).post(catalog::create_category))
        .route("/cart/:session", get(catalog::get_cart).post(catalog::add_to_cart).delete(catalog::clear_cart))
        .route("/cart/:session/:product_id", put(catalog::set_cart_quantity).delete(catalog::remove_cart_line))
        .route("/coupons/validate", post(catalog::validate_coupon))
        .route("/admin/coupons", get(catalog::list_coupons).post(catalog::create_coupon))
        .route("/admin/coupons/:code/deactivate", post(catalog::deactivate_coupon))
        .route("/orders", get(orders::list_customer_orders).post(orders::place_order))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/cancel", post(orders::cancel_order))
        .route("/orders/:id/return", post(orders::request_return))
        .route("/admin/orders", get(orders::list_all_orders))
        .route("/admin/orders/:id/status", post(orders::advance_order))
        .route("/admin/orders/:id/return", post(orders::resolve_return))
        .route("/admin/orders/:id/driver", post(drivers::assign_driver))
        .route("/admin/orders/:id/delivery", post(drivers::record_delivery))
        .route("/admin/drivers", get(drivers::list_drivers).post(drivers::create_driver))
        .route(
            "/admin/drivers/:id",
            get(drivers::get_driver).put(drivers::update_driver).delete(drivers::deactivate_driver),
        )
        .route("/payments/initialize", post(payments::initialize_payment))
        .route("/payments/verify", get(payments::verify_payment))
        .route("/webhooks/paystack", post(payments::paystack_webhook))
}

async fn health(State(s): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store = s.service.store();
    let (code, status) = match store.ping().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => {
            warn!(error = %e, "health check: store unreachable");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };
    let body = HealthResponse { status, service: env!("CARGO_PKG_NAME"), version: env!("CARGO_PKG_VERSION"), store: store.backend() };
    (code, Json(body))
}
