//! Crate-level error type returned by the service layer.

use thiserror::Error;

use crate::domain::aggregates::{CouponError, DriverError, OrderError, ProductError, ReviewError, StockError};
use crate::gateway::GatewayError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum CommerceError {
    #[error("{0}")]
    Invalid(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error(transparent)]
    Product(#[from] ProductError),

    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for CommerceError {
    /// Lifts domain errors out of the store so callers match on one level.
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Order(e) => Self::Order(e),
            StoreError::Product(e) => Self::Product(e),
            other => Self::Store(other),
        }
    }
}

impl From<StockError> for CommerceError {
    fn from(e: StockError) -> Self { Self::Order(OrderError::Stock(e)) }
}

pub type Result<T> = std::result::Result<T, CommerceError>;
