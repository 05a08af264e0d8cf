//! Product reviews from customers with a delivered order

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use super::{Order, OrderItem};

pub const MIN_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub order_id: Uuid,
    pub customer_email: String,
    pub rating: i16,
    pub title: Option<String>,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct ReviewDraft {
    pub order_id: Uuid,
    pub customer_email: String,
    pub rating: i16,
    pub title: Option<String>,
    pub body: Option<String>,
}

impl Review {
    /// Accepts a review of `product_id` backed by `order`: the reviewer must
    /// own the order, the order must have been delivered and must contain
    /// the product.
    pub fn create(product_id: Uuid, draft: ReviewDraft, order: &Order, items: &[OrderItem], now: DateTime<Utc>) -> Result<Self, ReviewError> {
        if !(MIN_RATING..=MAX_RATING).contains(&draft.rating) {
            return Err(ReviewError::InvalidRating(draft.rating));
        }
        let email = draft.customer_email.trim().to_lowercase();
        if draft.order_id != order.id || email != order.customer_email {
            return Err(ReviewError::NotYourOrder);
        }
        if order.delivered_at.is_none() {
            return Err(ReviewError::NotDelivered);
        }
        if !items.iter().any(|i| i.product_id == product_id) {
            return Err(ReviewError::NotPurchased);
        }
        Ok(Self {
            id: Uuid::now_v7(), product_id, order_id: order.id, customer_email: email, rating: draft.rating,
            title: trimmed(draft.title), body: trimmed(draft.body), created_at: now,
        })
    }
}

fn trimmed(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// Reviews of one product, newest first, with the mean rating.
#[derive(Clone, Debug, Serialize)]
pub struct ProductReviews {
    pub product_id: Uuid,
    pub count: usize,
    pub average_rating: Option<f64>,
    pub reviews: Vec<Review>,
}

impl ProductReviews {
    pub fn new(product_id: Uuid, mut reviews: Vec<Review>) -> Self {
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let average_rating = (!reviews.is_empty()).then(|| {
            let sum: i64 = reviews.iter().map(|r| i64::from(r.rating)).sum();
            (sum as f64 / reviews.len() as f64 * 10.0).round() / 10.0
        });
        Self { product_id, count: reviews.len(), average_rating, reviews }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewError {
    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(i16),
    #[error("order does not belong to this customer")]
    NotYourOrder,
    #[error("only delivered orders can be reviewed")]
    NotDelivered,
    #[error("product is not part of this order")]
    NotPurchased,
}
