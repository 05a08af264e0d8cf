//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::{Money, Sku};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub compare_at_price: Option<i64>,
    pub currency: String,
    pub category_id: Option<Uuid>,
    pub stock: i32,
    pub status: ProductStatus,
    pub is_deleted: bool,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus { #[default] Draft, Active, Archived }

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Draft => "DRAFT", Self::Active => "ACTIVE", Self::Archived => "ARCHIVED" }
    }
}

impl FromStr for ProductStatus {
    type Err = ProductError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "ACTIVE" => Ok(Self::Active),
            "ARCHIVED" => Ok(Self::Archived),
            other => Err(ProductError::UnknownStatus(other.to_string())),
        }
    }
}

/// Editable product attributes, as supplied by the admin surface.
#[derive(Clone, Debug, Default)]
pub struct ProductDraft {
    pub sku: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub compare_at_price: Option<i64>,
    pub category_id: Option<Uuid>,
    pub stock: i32,
    pub status: ProductStatus,
    pub images: Vec<String>,
    pub tags: Vec<String>,
}

impl Product {
    pub fn create(draft: ProductDraft, currency: &str, now: DateTime<Utc>) -> Result<Self, ProductError> {
        Self::check(&draft)?;
        let sku = match draft.sku.as_deref() {
            Some(raw) => Sku::new(raw).map_err(|e| ProductError::InvalidSku(e.to_string()))?,
            None => Sku::generate(),
        };
        Ok(Self {
            id: Uuid::now_v7(), sku: sku.into_inner(), name: draft.name.trim().to_string(), description: draft.description,
            price: draft.price, compare_at_price: draft.compare_at_price, currency: currency.to_string(),
            category_id: draft.category_id, stock: draft.stock, status: draft.status, is_deleted: false,
            images: draft.images, tags: draft.tags, created_at: now, updated_at: now,
        })
    }

    /// Replaces the editable attributes. The SKU is kept unless a new one is
    /// given; stock only moves through [`Product::adjust_stock`] and orders.
    pub fn apply(&mut self, draft: ProductDraft, now: DateTime<Utc>) -> Result<(), ProductError> {
        Self::check(&draft)?;
        if let Some(raw) = draft.sku.as_deref() {
            self.sku = Sku::new(raw).map_err(|e| ProductError::InvalidSku(e.to_string()))?.into_inner();
        }
        self.name = draft.name.trim().to_string();
        self.description = draft.description;
        self.price = draft.price;
        self.compare_at_price = draft.compare_at_price;
        self.category_id = draft.category_id;
        self.status = draft.status;
        self.images = draft.images;
        self.tags = draft.tags;
        self.updated_at = now;
        Ok(())
    }

    pub fn unit_price(&self) -> Money { Money::new(self.price, &self.currency) }
    pub fn is_purchasable(&self) -> bool { self.status == ProductStatus::Active && !self.is_deleted }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) {
        self.is_deleted = true;
        self.status = ProductStatus::Archived;
        self.updated_at = now;
    }

    pub fn adjust_stock(&mut self, delta: i32, now: DateTime<Utc>) -> Result<(), ProductError> {
        let next = self.stock.checked_add(delta).filter(|s| *s >= 0)
            .ok_or(ProductError::NegativeStock { product_id: self.id, stock: self.stock, delta })?;
        self.stock = next;
        self.updated_at = now;
        Ok(())
    }

    fn check(draft: &ProductDraft) -> Result<(), ProductError> {
        if draft.name.trim().is_empty() { return Err(ProductError::MissingName); }
        if draft.price <= 0 { return Err(ProductError::InvalidPrice(draft.price)); }
        if draft.stock < 0 { return Err(ProductError::NegativeStock { product_id: Uuid::nil(), stock: 0, delta: draft.stock }); }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn create(name: &str, description: Option<String>, parent_id: Option<Uuid>, now: DateTime<Utc>) -> Result<Self, ProductError> {
        let name = name.trim();
        if name.is_empty() { return Err(ProductError::MissingName); }
        Ok(Self { id: Uuid::now_v7(), name: name.to_string(), slug: slugify(name), description, parent_id, created_at: now })
    }
}

pub fn slugify(name: &str) -> String {
    name.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("-")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("Missing name")]
    MissingName,
    #[error("Price must be positive, got {0}")]
    InvalidPrice(i64),
    #[error("Invalid SKU: {0}")]
    InvalidSku(String),
    #[error("Stock for {product_id} cannot go below zero (stock {stock}, delta {delta})")]
    NegativeStock { product_id: Uuid, stock: i32, delta: i32 },
    #[error("Unknown product status {0}")]
    UnknownStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ProductDraft {
        ProductDraft { name: "Ankara Shirt".into(), price: 1_250_000, stock: 10, status: ProductStatus::Active, ..Default::default() }
    }

    #[test]
    fn test_product_create() {
        let p = Product::create(draft(), "NGN", Utc::now()).unwrap();
        assert_eq!(p.name, "Ankara Shirt");
        assert!(p.sku.starts_with("TRD-"));
        assert!(p.is_purchasable());
    }

    #[test]
    fn test_rejects_bad_drafts() {
        let mut d = draft();
        d.name = "  ".into();
        assert_eq!(Product::create(d, "NGN", Utc::now()), Err(ProductError::MissingName));
        let mut d = draft();
        d.price = 0;
        assert_eq!(Product::create(d, "NGN", Utc::now()), Err(ProductError::InvalidPrice(0)));
    }

    #[test]
    fn test_stock_adjustment() {
        let mut p = Product::create(draft(), "NGN", Utc::now()).unwrap();
        p.adjust_stock(-4, Utc::now()).unwrap();
        assert_eq!(p.stock, 6);
        assert!(p.adjust_stock(-7, Utc::now()).is_err());
        assert_eq!(p.stock, 6);
    }

    #[test]
    fn test_soft_delete_hides_product() {
        let mut p = Product::create(draft(), "NGN", Utc::now()).unwrap();
        p.soft_delete(Utc::now());
        assert!(!p.is_purchasable());
    }

    #[test]
    fn test_slug() { assert_eq!(slugify(" Men  Shoes "), "men-shoes"); }
}
