//! Trendify Commerce
//!
//! Storefront backend for Trendify: catalog, carts, coupons, orders and
//! Paystack payments.
//!
//! ## Features
//! - Order placement with server-side pricing, stock reservation and idempotency keys
//! - Paystack payment initialization and verification
//! - Payment finalization that is safe under concurrent and repeated webhook,
//!   verify and sweeper deliveries
//! - Customer cancellation, fulfilment status updates and returns
//! - Coupon validation and redemption
//! - Mobile API mirror with permissive CORS

pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod http;
pub mod service;
pub mod store;

pub use error::{CommerceError, Result};
