//! Products, categories, carts and coupons.

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::CommerceService;
use crate::domain::aggregates::{Cart, Category, Coupon, CouponDraft, CouponError, Product, ProductDraft};
use crate::domain::value_objects::{CouponCode, Money, Quantity};
use crate::error::{CommerceError, Result};
use crate::store::{Page, ProductQuery};

/// The result of checking a coupon against a prospective subtotal.
#[derive(Debug, Clone, Serialize)]
pub struct CouponQuote {
    pub code: String,
    pub subtotal: i64,
    pub discount: i64,
    pub total_after_discount: i64,
    pub currency: String,
}

impl CommerceService {
    pub async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>> {
        Ok(self.store.list_products(query).await?)
    }

    pub async fn get_product(&self, id: Uuid) -> Result<Product> {
        self.store.get_product(id).await?.ok_or(CommerceError::NotFound("product"))
    }

    pub async fn create_product(&self, draft: ProductDraft) -> Result<Product> {
        let product = Product::create(draft, &self.config.currency, Utc::now())?;
        self.store.insert_product(&product).await?;
        info!(product_id = %product.id, sku = %product.sku, "product created");
        Ok(product)
    }

    pub async fn update_product(&self, id: Uuid, draft: ProductDraft) -> Result<Product> {
        let mut product = self.get_product(id).await?;
        product.apply(draft, Utc::now())?;
        self.store.update_product(&product).await?;
        Ok(product)
    }

    pub async fn delete_product(&self, id: Uuid) -> Result<()> {
        let mut product = self.get_product(id).await?;
        product.soft_delete(Utc::now());
        self.store.update_product(&product).await?;
        info!(product_id = %id, "product archived");
        Ok(())
    }

    pub async fn adjust_stock(&self, id: Uuid, delta: i32) -> Result<Product> {
        let product = self.store.adjust_stock(id, delta, Utc::now()).await?;
        info!(product_id = %id, delta, stock = product.stock, "stock adjusted");
        Ok(product)
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        Ok(self.store.list_categories().await?)
    }

    pub async fn create_category(&self, name: &str, description: Option<String>, parent_id: Option<Uuid>) -> Result<Category> {
        let category = Category::create(name, description, parent_id, Utc::now())?;
        self.store.insert_category(&category).await?;
        Ok(category)
    }

    pub async fn cart(&self, session: &str) -> Result<Cart> {
        let lines = self.store.cart_lines(session).await?;
        let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
        let products = self.store.products_by_ids(&ids).await?;
        Ok(Cart::assemble(session, &lines, &products, &self.config.currency))
    }

    pub async fn add_to_cart(&self, session: &str, product_id: Uuid, quantity: i64) -> Result<Cart> {
        let quantity = Quantity::line(quantity).map_err(|e| CommerceError::Invalid(e.to_string()))?;
        let product = self.get_product(product_id).await?;
        if !product.is_purchasable() {
            return Err(CommerceError::NotFound("product"));
        }
        self.store.add_to_cart(session, product_id, quantity.value() as i32, Utc::now()).await?;
        self.cart(session).await
    }

    /// Zero removes the line.
    pub async fn set_cart_quantity(&self, session: &str, product_id: Uuid, quantity: i64) -> Result<Cart> {
        if quantity != 0 {
            Quantity::line(quantity).map_err(|e| CommerceError::Invalid(e.to_string()))?;
        }
        self.store.set_cart_quantity(session, product_id, quantity as i32).await?;
        self.cart(session).await
    }

    pub async fn clear_cart(&self, session: &str) -> Result<()> {
        Ok(self.store.clear_cart(session).await?)
    }

    pub async fn validate_coupon(&self, code: &str, subtotal: i64) -> Result<CouponQuote> {
        let code = CouponCode::parse(code).ok_or(CouponError::InvalidCode)?;
        let coupon = self.store.find_coupon(code.as_str()).await?.ok_or(CouponError::NotFound)?;
        let subtotal = Money::new(subtotal.max(0), &self.config.currency);
        let discount = coupon.discount_for(&subtotal, Utc::now())?;
        let after = subtotal.subtract(&discount).map_err(|e| CommerceError::Invalid(e.to_string()))?;
        Ok(CouponQuote {
            code: coupon.code,
            subtotal: subtotal.amount(),
            discount: discount.amount(),
            total_after_discount: after.amount(),
            currency: self.config.currency.clone(),
        })
    }

    pub async fn create_coupon(&self, draft: CouponDraft) -> Result<Coupon> {
        let coupon = Coupon::create(draft, Utc::now())?;
        self.store.insert_coupon(&coupon).await?;
        info!(code = %coupon.code, kind = coupon.kind.as_str(), value = coupon.value, "coupon created");
        Ok(coupon)
    }

    pub async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        Ok(self.store.list_coupons().await?)
    }

    pub async fn deactivate_coupon(&self, code: &str) -> Result<Coupon> {
        let code = CouponCode::parse(code).ok_or(CouponError::InvalidCode)?;
        let coupon = self.store.deactivate_coupon(code.as_str()).await.map_err(|e| match e {
            crate::store::StoreError::NotFound(_) => CommerceError::Coupon(CouponError::NotFound),
            other => other.into(),
        })?;
        info!(code = %coupon.code, "coupon deactivated");
        Ok(coupon)
    }
}
