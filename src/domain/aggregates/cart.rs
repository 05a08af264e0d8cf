//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use crate::domain::value_objects::Money;
use super::Product;

/// A stored cart row: one product in one browsing session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartLine { pub id: Uuid, pub session_id: String, pub product_id: Uuid, pub quantity: i32, pub created_at: DateTime<Utc> }

/// A cart priced against the current catalog.
#[derive(Clone, Debug, Serialize)]
pub struct Cart {
    session_id: String,
    items: Vec<CartItem>,
    subtotal: Money,
}

#[derive(Clone, Debug, Serialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    /// False when the product was withdrawn or has less stock than requested.
    pub available: bool,
}

impl Cart {
    /// Prices `lines` using `products`. Lines whose product has vanished are dropped.
    pub fn assemble(session_id: &str, lines: &[CartLine], products: &HashMap<Uuid, Product>, currency: &str) -> Self {
        let mut cart = Self { session_id: session_id.to_string(), items: vec![], subtotal: Money::zero(currency) };
        for line in lines {
            let Some(product) = products.get(&line.product_id) else { continue };
            let quantity = line.quantity.max(0) as u32;
            let unit_price = product.unit_price();
            cart.items.push(CartItem {
                product_id: product.id, name: product.name.clone(), sku: product.sku.clone(), quantity,
                line_total: unit_price.multiply(quantity), unit_price,
                available: product.is_purchasable() && product.stock >= line.quantity,
            });
        }
        cart.recalculate();
        cart
    }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// `(product_id, quantity)` pairs for placing an order.
    pub fn order_lines(&self) -> Vec<(Uuid, i64)> {
        self.items.iter().map(|i| (i.product_id, i64::from(i.quantity))).collect()
    }

    fn recalculate(&mut self) {
        let currency = self.subtotal.currency().to_string();
        self.subtotal = self.items.iter().filter(|i| i.available)
            .fold(Money::zero(&currency), |acc, i| acc.add(&i.line_total).unwrap_or(acc));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{ProductDraft, ProductStatus};

    fn product(price: i64, stock: i32) -> Product {
        Product::create(ProductDraft { name: "Widget".into(), price, stock, status: ProductStatus::Active, ..Default::default() }, "NGN", Utc::now()).unwrap()
    }

    fn line(product: &Product, quantity: i32) -> CartLine {
        CartLine { id: Uuid::now_v7(), session_id: "s1".into(), product_id: product.id, quantity, created_at: Utc::now() }
    }

    #[test]
    fn test_cart_totals() {
        let (a, b) = (product(10_000, 5), product(2_500, 1));
        let lines = vec![line(&a, 2), line(&b, 3)];
        let products = HashMap::from([(a.id, a.clone()), (b.id, b.clone())]);
        let cart = Cart::assemble("s1", &lines, &products, "NGN");
        assert_eq!(cart.item_count(), 2);
        assert!(!cart.items()[1].available);
        // Unavailable lines do not count towards the subtotal.
        assert_eq!(cart.subtotal().amount(), 20_000);
        assert_eq!(cart.order_lines()[0], (a.id, 2));
    }

    #[test]
    fn test_missing_products_are_dropped() {
        let a = product(10_000, 5);
        let cart = Cart::assemble("s1", &[line(&a, 1)], &HashMap::new(), "NGN");
        assert!(cart.is_empty());
        assert!(cart.subtotal().is_zero());
    }
}
