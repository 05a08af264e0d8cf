//! Product reviews.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::CommerceService;
use crate::domain::aggregates::{ProductReviews, Review, ReviewDraft};
use crate::error::{CommerceError, Result};
use crate::store::OrderKey;

impl CommerceService {
    /// Records a review backed by one of the customer's delivered orders.
    /// A customer reviews a product at most once.
    pub async fn create_review(&self, product_id: Uuid, draft: ReviewDraft) -> Result<Review> {
        self.get_product(product_id).await?;
        let state = self.store.load_order(&OrderKey::Id(draft.order_id)).await?.ok_or(CommerceError::NotFound("order"))?;
        let review = Review::create(product_id, draft, &state.order, &state.items, Utc::now())?;
        self.store.insert_review(&review).await?;
        info!(review_id = %review.id, %product_id, rating = review.rating, "review recorded");
        Ok(review)
    }

    pub async fn product_reviews(&self, product_id: Uuid) -> Result<ProductReviews> {
        self.get_product(product_id).await?;
        let reviews = self.store.product_reviews(product_id).await?;
        Ok(ProductReviews::new(product_id, reviews))
    }
}
