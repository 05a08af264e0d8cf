//! In-process store. One mutex serializes every operation, so each call
//! behaves like a serializable transaction: work happens on copies that are
//! written back only when the whole operation succeeds.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    retry_order_number, OrderKey, OrderQuery, Page, PlaceOrder, PlacedOrder, ProductQuery, StaleOrder, Store, StoreError,
};
use crate::domain::aggregates::{
    CartLine, Category, Coupon, Driver, Order, OrderError, OrderItem, OrderStatus, Payment, Product, Review, StockBook,
};
use crate::domain::value_objects::Quantity;
use crate::domain::events::{AuditEntry, DomainEvent};
use crate::domain::reconcile::{self, MutationOutcome, OrderMutation, OrderState};

#[derive(Default)]
struct State {
    products: HashMap<Uuid, Product>,
    categories: Vec<Category>,
    cart: Vec<CartLine>,
    coupons: HashMap<String, Coupon>,
    orders: HashMap<Uuid, Order>,
    items: HashMap<Uuid, Vec<OrderItem>>,
    payments: HashMap<Uuid, Payment>,
    events: Vec<AuditEntry>,
    reviews: Vec<Review>,
    drivers: HashMap<Uuid, Driver>,
}

impl State {
    fn resolve(&self, key: &OrderKey) -> Option<Uuid> {
        match key {
            OrderKey::Id(id) => self.orders.contains_key(id).then_some(*id),
            OrderKey::Reference { reference, order_id } => self
                .payments
                .values()
                .find(|p| &p.reference == reference)
                .map(|p| p.order_id)
                .or_else(|| order_id.filter(|id| self.orders.contains_key(id))),
        }
    }

    fn snapshot(&self, id: Uuid) -> Option<OrderState> {
        Some(OrderState {
            order: self.orders.get(&id)?.clone(),
            items: self.items.get(&id).cloned().unwrap_or_default(),
            payment: self.payments.get(&id).cloned(),
        })
    }

    fn book_for(&self, ids: impl Iterator<Item = Uuid>) -> StockBook {
        let mut book = StockBook::new();
        for id in ids {
            if let Some(p) = self.products.get(&id) {
                book.load(id, p.stock);
            }
        }
        book
    }

    fn write_stock(&mut self, book: &StockBook, now: DateTime<Utc>) {
        for (id, level) in book.changes() {
            if let Some(p) = self.products.get_mut(&id) {
                p.stock = level;
                p.updated_at = now;
            }
        }
    }

    fn record(&mut self, events: &[DomainEvent]) {
        self.events.extend(events.iter().map(AuditEntry::from));
    }

    fn place(&mut self, req: &PlaceOrder) -> Result<PlacedOrder, StoreError> {
        if let Some(key) = req.placement.idempotency_key.as_deref() {
            if let Some(existing) = self.orders.values().find(|o| o.idempotency_key.as_deref() == Some(key)) {
                if !existing.customer_email.eq_ignore_ascii_case(req.placement.customer_email.trim()) {
                    return Err(StoreError::Conflict("idempotency key already used for another customer".into()));
                }
                let id = existing.id;
                let state = self.snapshot(id).ok_or(StoreError::NotFound("order"))?;
                return Ok(PlacedOrder { state, created: false, events: vec![] });
            }
        }

        let coupon = match req.placement.coupon_code.as_deref() {
            Some(code) => self.coupons.get(&code.trim().to_uppercase()).cloned(),
            None => None,
        };
        let ids: Vec<Uuid> = req.placement.lines.iter().map(|(id, _)| *id).collect();
        let products: HashMap<Uuid, Product> = ids.iter().filter_map(|id| self.products.get(id).map(|p| (*id, p.clone()))).collect();
        let mut book = self.book_for(ids.into_iter());
        let (mut order, items) = Order::place(&req.placement, &products, &mut book, coupon.as_ref(), &req.pricing, req.now)?;
        if self.orders.values().any(|o| o.order_number == order.order_number) {
            return Err(StoreError::OrderNumberTaken);
        }
        let events = order.take_events();

        self.write_stock(&book, req.now);
        if let Some(session) = req.cart_session.as_deref() {
            self.cart.retain(|l| l.session_id != session);
        }
        self.record(&events);
        self.items.insert(order.id, items.clone());
        self.orders.insert(order.id, order.clone());
        Ok(PlacedOrder { state: OrderState { order, items, payment: None }, created: true, events })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

fn paginate<T: Clone>(mut rows: Vec<T>, page: u32, per_page: u32) -> Page<T> {
    let total = rows.len() as i64;
    let start = (Page::<T>::offset(page, per_page) as usize).min(rows.len());
    let end = (start + per_page as usize).min(rows.len());
    Page { data: rows.drain(start..end).collect(), total, page, per_page }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str { "memory" }

    async fn ping(&self) -> Result<(), StoreError> { Ok(()) }

    async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>, StoreError> {
        let st = self.state.lock().await;
        let mut rows: Vec<Product> = st.products.values().filter(|p| query.matches(p)).cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(rows, query.page, query.per_page))
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.state.lock().await.products.get(&id).filter(|p| !p.is_deleted).cloned())
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Product>, StoreError> {
        let st = self.state.lock().await;
        Ok(ids.iter().filter_map(|id| st.products.get(id).map(|p| (*id, p.clone()))).collect())
    }

    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut st = self.state.lock().await;
        if st.products.values().any(|p| p.sku == product.sku) {
            return Err(StoreError::Conflict(format!("sku {} already exists", product.sku)));
        }
        st.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut st = self.state.lock().await;
        if st.products.values().any(|p| p.sku == product.sku && p.id != product.id) {
            return Err(StoreError::Conflict(format!("sku {} already exists", product.sku)));
        }
        let existing = st.products.get_mut(&product.id).ok_or(StoreError::NotFound("product"))?;
        let stock = existing.stock;
        *existing = Product { stock, ..product.clone() };
        Ok(())
    }

    async fn adjust_stock(&self, id: Uuid, delta: i32, now: DateTime<Utc>) -> Result<Product, StoreError> {
        let mut st = self.state.lock().await;
        let product = st.products.get_mut(&id).filter(|p| !p.is_deleted).ok_or(StoreError::NotFound("product"))?;
        product.adjust_stock(delta, now)?;
        Ok(product.clone())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let mut rows = self.state.lock().await.categories.clone();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn insert_category(&self, category: &Category) -> Result<(), StoreError> {
        let mut st = self.state.lock().await;
        if st.categories.iter().any(|c| c.slug == category.slug) {
            return Err(StoreError::Conflict(format!("category {} already exists", category.slug)));
        }
        st.categories.push(category.clone());
        Ok(())
    }

    async fn cart_lines(&self, session: &str) -> Result<Vec<CartLine>, StoreError> {
        let st = self.state.lock().await;
        Ok(st.cart.iter().filter(|l| l.session_id == session).cloned().collect())
    }

    async fn add_to_cart(&self, session: &str, product_id: Uuid, quantity: i32, now: DateTime<Utc>) -> Result<CartLine, StoreError> {
        let mut st = self.state.lock().await;
        if let Some(line) = st.cart.iter_mut().find(|l| l.session_id == session && l.product_id == product_id) {
            let merged = Quantity::line(i64::from(line.quantity) + i64::from(quantity)).map_err(OrderError::InvalidQuantity)?;
            line.quantity = merged.value() as i32;
            return Ok(line.clone());
        }
        let line = CartLine { id: Uuid::now_v7(), session_id: session.to_string(), product_id, quantity, created_at: now };
        st.cart.push(line.clone());
        Ok(line)
    }

    async fn set_cart_quantity(&self, session: &str, product_id: Uuid, quantity: i32) -> Result<Option<CartLine>, StoreError> {
        let mut st = self.state.lock().await;
        if quantity <= 0 {
            st.cart.retain(|l| !(l.session_id == session && l.product_id == product_id));
            return Ok(None);
        }
        let line = st
            .cart
            .iter_mut()
            .find(|l| l.session_id == session && l.product_id == product_id)
            .ok_or(StoreError::NotFound("cart line"))?;
        line.quantity = quantity;
        Ok(Some(line.clone()))
    }

    async fn clear_cart(&self, session: &str) -> Result<(), StoreError> {
        self.state.lock().await.cart.retain(|l| l.session_id != session);
        Ok(())
    }

    async fn find_coupon(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        Ok(self.state.lock().await.coupons.get(&code.trim().to_uppercase()).cloned())
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> Result<(), StoreError> {
        let mut st = self.state.lock().await;
        if st.coupons.contains_key(&coupon.code) {
            return Err(StoreError::Conflict(format!("coupon {} already exists", coupon.code)));
        }
        st.coupons.insert(coupon.code.clone(), coupon.clone());
        Ok(())
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>, StoreError> {
        let mut rows: Vec<Coupon> = self.state.lock().await.coupons.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn deactivate_coupon(&self, code: &str) -> Result<Coupon, StoreError> {
        let mut st = self.state.lock().await;
        let coupon = st.coupons.get_mut(&code.trim().to_uppercase()).ok_or(StoreError::NotFound("coupon"))?;
        coupon.is_active = false;
        Ok(coupon.clone())
    }

    async fn place_order(&self, req: PlaceOrder) -> Result<PlacedOrder, StoreError> {
        let req = &req;
        retry_order_number(|| async move { self.state.lock().await.place(req) }).await
    }

    async fn load_order(&self, key: &OrderKey) -> Result<Option<OrderState>, StoreError> {
        let st = self.state.lock().await;
        Ok(st.resolve(key).and_then(|id| st.snapshot(id)))
    }

    async fn mutate_order(&self, key: &OrderKey, mutation: OrderMutation, now: DateTime<Utc>) -> Result<(OrderState, MutationOutcome), StoreError> {
        let mut st = self.state.lock().await;
        let id = st.resolve(key).ok_or(StoreError::NotFound("order"))?;
        let mut state = st.snapshot(id).ok_or(StoreError::NotFound("order"))?;
        let mut book = st.book_for(state.items.iter().map(|i| i.product_id));
        let outcome = reconcile::apply(&mut state, &mut book, mutation, now)?;

        st.write_stock(&book, now);
        if let Some(code) = outcome.redeemed_coupon.as_deref() {
            if let Some(c) = st.coupons.get_mut(code) {
                c.redeem();
            }
        }
        st.record(&outcome.events);
        st.orders.insert(id, state.order.clone());
        if let Some(p) = &state.payment {
            st.payments.insert(id, p.clone());
        }
        Ok((state, outcome))
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>, StoreError> {
        let st = self.state.lock().await;
        let mut rows: Vec<Order> = st.orders.values().filter(|o| query.matches(o)).cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(rows, query.page, query.per_page))
    }

    async fn order_events(&self, order_id: Uuid) -> Result<Vec<AuditEntry>, StoreError> {
        let st = self.state.lock().await;
        Ok(st.events.iter().filter(|e| e.order_id == order_id).cloned().collect())
    }

    async fn stale_pending_orders(&self, cutoff: DateTime<Utc>, after: Option<(DateTime<Utc>, Uuid)>, limit: i64) -> Result<Vec<StaleOrder>, StoreError> {
        let st = self.state.lock().await;
        let mut rows: Vec<StaleOrder> = st
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && !o.payment_status.is_settled() && o.created_at < cutoff)
            .filter(|o| after.map_or(true, |cursor| (o.created_at, o.id) > cursor))
            .map(|o| StaleOrder { id: o.id, created_at: o.created_at, reference: st.payments.get(&o.id).map(|p| p.reference.clone()) })
            .collect();
        rows.sort_by_key(StaleOrder::cursor);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn insert_review(&self, review: &Review) -> Result<(), StoreError> {
        let mut st = self.state.lock().await;
        if st.reviews.iter().any(|r| r.product_id == review.product_id && r.customer_email == review.customer_email) {
            return Err(StoreError::Conflict("product already reviewed by this customer".into()));
        }
        st.reviews.push(review.clone());
        Ok(())
    }

    async fn product_reviews(&self, product_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let st = self.state.lock().await;
        Ok(st.reviews.iter().filter(|r| r.product_id == product_id).cloned().collect())
    }

    async fn list_drivers(&self) -> Result<Vec<Driver>, StoreError> {
        let mut rows: Vec<Driver> = self.state.lock().await.drivers.values().cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn get_driver(&self, id: Uuid) -> Result<Option<Driver>, StoreError> {
        Ok(self.state.lock().await.drivers.get(&id).cloned())
    }

    async fn insert_driver(&self, driver: &Driver) -> Result<(), StoreError> {
        let mut st = self.state.lock().await;
        if st.drivers.values().any(|d| d.phone == driver.phone) {
            return Err(StoreError::Conflict(format!("driver with phone {} already exists", driver.phone)));
        }
        st.drivers.insert(driver.id, driver.clone());
        Ok(())
    }

    async fn update_driver(&self, driver: &Driver) -> Result<(), StoreError> {
        let mut st = self.state.lock().await;
        if st.drivers.values().any(|d| d.phone == driver.phone && d.id != driver.id) {
            return Err(StoreError::Conflict(format!("driver with phone {} already exists", driver.phone)));
        }
        let existing = st.drivers.get_mut(&driver.id).ok_or(StoreError::NotFound("driver"))?;
        *existing = driver.clone();
        Ok(())
    }
}
