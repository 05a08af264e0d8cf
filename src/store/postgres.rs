//! PostgreSQL store.
//!
//! Order mutations lock the order row, then the order's product rows in
//! ascending id order. Placing an order only locks product rows, so the two
//! paths cannot deadlock against each other.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::PgConnection;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    retry_order_number, OrderKey, OrderQuery, Page, PlaceOrder, PlacedOrder, ProductQuery, StaleOrder, Store, StoreError,
};
use crate::domain::aggregates::{
    CartLine, Category, Coupon, Driver, Order, OrderError, OrderItem, Payment, Product, Review, StockBook,
};
use crate::domain::value_objects::{Quantity, MAX_LINE_QUANTITY};
use crate::domain::events::{AuditEntry, DomainEvent};
use crate::domain::reconcile::{self, MutationOutcome, OrderMutation, OrderState};

const IDEMPOTENCY_CONSTRAINT: &str = "orders_idempotency_key_key";
const ORDER_NUMBER_CONSTRAINT: &str = "orders_order_number_key";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn place_once(&self, req: &PlaceOrder) -> Result<PlacedOrder, StoreError> {
        match self.place_in_tx(req).await {
            // A concurrent request with the same key committed first.
            Err(StoreError::Database(sqlx::Error::Database(db))) if db.constraint() == Some(IDEMPOTENCY_CONSTRAINT) => {
                let key = req.placement.idempotency_key.as_deref().unwrap_or_default();
                info!(idempotency_key = key, "lost idempotent insert race; returning winner");
                let mut conn = self.pool.acquire().await?;
                existing_for_key(&mut conn, key, &req.placement.customer_email)
                    .await?
                    .ok_or(StoreError::NotFound("order"))
            }
            other => other,
        }
    }

    async fn place_in_tx(&self, req: &PlaceOrder) -> Result<PlacedOrder, StoreError> {
        let mut tx = self.pool.begin().await?;
        let placement = &req.placement;

        if let Some(key) = placement.idempotency_key.as_deref() {
            if let Some(existing) = existing_for_key(&mut tx, key, &placement.customer_email).await? {
                return Ok(existing);
            }
        }

        let coupon = match placement.coupon_code.as_deref() {
            Some(code) => sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE code = $1")
                .bind(code.trim().to_uppercase())
                .fetch_optional(&mut *tx)
                .await?
                .map(CouponRow::into_domain)
                .transpose()?,
            None => None,
        };

        let mut ids: Vec<Uuid> = placement.lines.iter().map(|(id, _)| *id).collect();
        ids.sort();
        ids.dedup();
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await?;
        let mut products = HashMap::with_capacity(rows.len());
        let mut book = StockBook::new();
        for row in rows {
            let p = row.into_domain()?;
            book.load(p.id, p.stock);
            products.insert(p.id, p);
        }

        let (mut order, items) = Order::place(placement, &products, &mut book, coupon.as_ref(), &req.pricing, req.now)?;
        let events = order.take_events();

        insert_order(&mut tx, &order).await?;
        for item in &items {
            sqlx::query("INSERT INTO order_items (id, order_id, product_id, sku, name, quantity, unit_price, total) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
                .bind(item.id).bind(item.order_id).bind(item.product_id).bind(&item.sku).bind(&item.name)
                .bind(item.quantity).bind(item.unit_price).bind(item.total)
                .execute(&mut *tx)
                .await?;
        }
        write_stock(&mut tx, &book, req.now).await?;
        write_events(&mut tx, &events).await?;
        if let Some(session) = req.cart_session.as_deref() {
            sqlx::query("DELETE FROM cart_items WHERE session_id = $1").bind(session).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(PlacedOrder { state: OrderState { order, items, payment: None }, created: true, events })
    }
}

#[async_trait::async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str { "postgres" }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list_products(&self, q: &ProductQuery) -> Result<Page<Product>, StoreError> {
        const FILTER: &str = "WHERE is_deleted = FALSE AND ($1 OR status = 'ACTIVE') \
             AND ($2::uuid IS NULL OR category_id = $2) \
             AND ($3::text IS NULL OR name ILIKE '%' || $3 || '%' OR sku ILIKE '%' || $3 || '%')";
        let rows = sqlx::query_as::<_, ProductRow>(&format!("SELECT * FROM products {FILTER} ORDER BY created_at DESC, id DESC LIMIT $4 OFFSET $5"))
            .bind(q.include_inactive).bind(q.category).bind(&q.search)
            .bind(i64::from(q.per_page)).bind(Page::<Product>::offset(q.page, q.per_page))
            .fetch_all(&self.pool)
            .await?;
        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM products {FILTER}"))
            .bind(q.include_inactive).bind(q.category).bind(&q.search)
            .fetch_one(&self.pool)
            .await?;
        let data = rows.into_iter().map(ProductRow::into_domain).collect::<Result<Vec<_>, _>>()?;
        Ok(Page { data, total: total.0, page: q.page, per_page: q.per_page })
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1 AND is_deleted = FALSE")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(ProductRow::into_domain)
            .transpose()
    }

    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Product>, StoreError> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| r.into_domain().map(|p| (p.id, p))).collect()
    }

    async fn insert_product(&self, p: &Product) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO products (id, sku, name, description, price, compare_at_price, currency, category_id, stock, status, is_deleted, images, tags, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)")
            .bind(p.id).bind(&p.sku).bind(&p.name).bind(&p.description).bind(p.price).bind(p.compare_at_price)
            .bind(&p.currency).bind(p.category_id).bind(p.stock).bind(p.status.as_str()).bind(p.is_deleted)
            .bind(&p.images).bind(&p.tags).bind(p.created_at).bind(p.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, format!("sku {} already exists", p.sku)))?;
        Ok(())
    }

    async fn update_product(&self, p: &Product) -> Result<(), StoreError> {
        let done = sqlx::query("UPDATE products SET sku = $2, name = $3, description = $4, price = $5, compare_at_price = $6, category_id = $7, status = $8, is_deleted = $9, images = $10, tags = $11, updated_at = $12 WHERE id = $1")
            .bind(p.id).bind(&p.sku).bind(&p.name).bind(&p.description).bind(p.price).bind(p.compare_at_price)
            .bind(p.category_id).bind(p.status.as_str()).bind(p.is_deleted).bind(&p.images).bind(&p.tags).bind(p.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, format!("sku {} already exists", p.sku)))?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound("product"));
        }
        Ok(())
    }

    async fn adjust_stock(&self, id: Uuid, delta: i32, now: DateTime<Utc>) -> Result<Product, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut product = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1 AND is_deleted = FALSE FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound("product"))?
            .into_domain()?;
        product.adjust_stock(delta, now)?;
        sqlx::query("UPDATE products SET stock = $2, updated_at = $3 WHERE id = $1")
            .bind(id).bind(product.stock).bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(product)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        Ok(sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name").fetch_all(&self.pool).await?)
    }

    async fn insert_category(&self, c: &Category) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO categories (id, name, slug, description, parent_id, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(c.id).bind(&c.name).bind(&c.slug).bind(&c.description).bind(c.parent_id).bind(c.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, format!("category {} already exists", c.slug)))?;
        Ok(())
    }

    async fn cart_lines(&self, session: &str) -> Result<Vec<CartLine>, StoreError> {
        Ok(sqlx::query_as::<_, CartLine>("SELECT * FROM cart_items WHERE session_id = $1 ORDER BY created_at")
            .bind(session)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn add_to_cart(&self, session: &str, product_id: Uuid, quantity: i32, now: DateTime<Utc>) -> Result<CartLine, StoreError> {
        let line = sqlx::query_as::<_, CartLine>("INSERT INTO cart_items (id, session_id, product_id, quantity, created_at) VALUES ($1, $2, $3, $4, $5) ON CONFLICT (session_id, product_id) DO UPDATE SET quantity = cart_items.quantity + $4 WHERE cart_items.quantity + $4 <= $6 RETURNING *")
            .bind(Uuid::now_v7()).bind(session).bind(product_id).bind(quantity).bind(now).bind(MAX_LINE_QUANTITY as i32)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(line) = line {
            return Ok(line);
        }
        // The conflict branch declined the update: the merged line would be too large.
        let (current,): (i32,) = sqlx::query_as("SELECT quantity FROM cart_items WHERE session_id = $1 AND product_id = $2")
            .bind(session).bind(product_id)
            .fetch_one(&self.pool)
            .await?;
        let merged = Quantity::line(i64::from(current) + i64::from(quantity)).map_err(OrderError::InvalidQuantity)?;
        Err(StoreError::Conflict(format!("cart line changed concurrently (now {})", merged.value())))
    }

    async fn set_cart_quantity(&self, session: &str, product_id: Uuid, quantity: i32) -> Result<Option<CartLine>, StoreError> {
        if quantity <= 0 {
            sqlx::query("DELETE FROM cart_items WHERE session_id = $1 AND product_id = $2")
                .bind(session).bind(product_id)
                .execute(&self.pool)
                .await?;
            return Ok(None);
        }
        let line = sqlx::query_as::<_, CartLine>("UPDATE cart_items SET quantity = $3 WHERE session_id = $1 AND product_id = $2 RETURNING *")
            .bind(session).bind(product_id).bind(quantity)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound("cart line"))?;
        Ok(Some(line))
    }

    async fn clear_cart(&self, session: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM cart_items WHERE session_id = $1").bind(session).execute(&self.pool).await?;
        Ok(())
    }

    async fn find_coupon(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE code = $1")
            .bind(code.trim().to_uppercase())
            .fetch_optional(&self.pool)
            .await?
            .map(CouponRow::into_domain)
            .transpose()
    }

    async fn insert_coupon(&self, c: &Coupon) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO coupons (id, code, kind, value, min_order_amount, max_discount, usage_limit, usage_count, starts_at, expires_at, is_active, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)")
            .bind(c.id).bind(&c.code).bind(c.kind.as_str()).bind(c.value).bind(c.min_order_amount).bind(c.max_discount)
            .bind(c.usage_limit).bind(c.usage_count).bind(c.starts_at).bind(c.expires_at).bind(c.is_active).bind(c.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, format!("coupon {} already exists", c.code)))?;
        Ok(())
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>, StoreError> {
        sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(CouponRow::into_domain)
            .collect()
    }

    async fn deactivate_coupon(&self, code: &str) -> Result<Coupon, StoreError> {
        sqlx::query_as::<_, CouponRow>("UPDATE coupons SET is_active = FALSE WHERE code = $1 RETURNING *")
            .bind(code.trim().to_uppercase())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound("coupon"))?
            .into_domain()
    }

    async fn place_order(&self, req: PlaceOrder) -> Result<PlacedOrder, StoreError> {
        let req = &req;
        retry_order_number(|| async move { self.place_once(req).await }).await
    }

    async fn load_order(&self, key: &OrderKey) -> Result<Option<OrderState>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        match resolve(&mut conn, key).await? {
            Some(id) => fetch_state(&mut conn, id, false).await,
            None => Ok(None),
        }
    }

    async fn mutate_order(&self, key: &OrderKey, mutation: OrderMutation, now: DateTime<Utc>) -> Result<(OrderState, MutationOutcome), StoreError> {
        let mut tx = self.pool.begin().await?;
        let id = resolve(&mut tx, key).await?.ok_or(StoreError::NotFound("order"))?;
        let mut state = fetch_state(&mut tx, id, true).await?.ok_or(StoreError::NotFound("order"))?;

        let ids: Vec<Uuid> = state.items.iter().map(|i| i.product_id).collect();
        let levels: Vec<(Uuid, i32)> = sqlx::query_as("SELECT id, stock FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await?;
        let mut book = StockBook::new();
        for (product_id, level) in levels {
            book.load(product_id, level);
        }

        let outcome = reconcile::apply(&mut state, &mut book, mutation, now)?;

        let o = &state.order;
        sqlx::query("UPDATE orders SET status = $2, payment_status = $3, stock_reserved = $4, cancel_reason = $5, return_reason = $6, updated_at = $7, paid_at = $8, cancelled_at = $9, delivered_at = $10, driver_id = $11 WHERE id = $1")
            .bind(o.id).bind(o.status.as_str()).bind(o.payment_status.as_str()).bind(o.stock_reserved)
            .bind(&o.cancel_reason).bind(&o.return_reason).bind(o.updated_at).bind(o.paid_at).bind(o.cancelled_at).bind(o.delivered_at)
            .bind(o.driver_id)
            .execute(&mut *tx)
            .await?;
        if let Some(p) = &state.payment {
            upsert_payment(&mut tx, p).await?;
        }
        write_stock(&mut tx, &book, now).await?;
        if let Some(code) = outcome.redeemed_coupon.as_deref() {
            sqlx::query("UPDATE coupons SET usage_count = usage_count + 1 WHERE code = $1").bind(code).execute(&mut *tx).await?;
        }
        write_events(&mut tx, &outcome.events).await?;
        tx.commit().await?;
        debug!(order_id = %id, events = outcome.events.len(), "order mutation committed");
        Ok((state, outcome))
    }

    async fn list_orders(&self, q: &OrderQuery) -> Result<Page<Order>, StoreError> {
        const FILTER: &str = "WHERE ($1::text IS NULL OR lower(customer_email) = lower($1)) AND ($2::text IS NULL OR status = $2)";
        let status = q.status.map(|s| s.as_str());
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT * FROM orders {FILTER} ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4"))
            .bind(&q.email).bind(status)
            .bind(i64::from(q.per_page)).bind(Page::<Order>::offset(q.page, q.per_page))
            .fetch_all(&self.pool)
            .await?;
        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM orders {FILTER}"))
            .bind(&q.email).bind(status)
            .fetch_one(&self.pool)
            .await?;
        let data = rows.into_iter().map(OrderRow::into_domain).collect::<Result<Vec<_>, _>>()?;
        Ok(Page { data, total: total.0, page: q.page, per_page: q.per_page })
    }

    async fn order_events(&self, order_id: Uuid) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(sqlx::query_as::<_, AuditEntry>("SELECT * FROM order_events WHERE order_id = $1 ORDER BY created_at, id")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn stale_pending_orders(&self, cutoff: DateTime<Utc>, after: Option<(DateTime<Utc>, Uuid)>, limit: i64) -> Result<Vec<StaleOrder>, StoreError> {
        let (after_at, after_id) = after.unzip();
        let rows = sqlx::query_as::<_, (Uuid, DateTime<Utc>, Option<String>)>(
            "SELECT o.id, o.created_at, p.reference FROM orders o LEFT JOIN payments p ON p.order_id = o.id \
             WHERE o.status = 'PENDING' AND o.payment_status NOT IN ('PAID', 'REFUND_DUE', 'REFUNDED') AND o.created_at < $1 \
             AND ($2::timestamptz IS NULL OR (o.created_at, o.id) > ($2, $3::uuid)) \
             ORDER BY o.created_at, o.id LIMIT $4",
        )
        .bind(cutoff)
        .bind(after_at)
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id, created_at, reference)| StaleOrder { id, created_at, reference }).collect())
    }

    async fn insert_review(&self, r: &Review) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO reviews (id, product_id, order_id, customer_email, rating, title, body, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(r.id).bind(r.product_id).bind(r.order_id).bind(&r.customer_email).bind(r.rating)
            .bind(&r.title).bind(&r.body).bind(r.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, "product already reviewed by this customer".into()))?;
        Ok(())
    }

    async fn product_reviews(&self, product_id: Uuid) -> Result<Vec<Review>, StoreError> {
        Ok(sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE product_id = $1 ORDER BY created_at DESC")
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_drivers(&self) -> Result<Vec<Driver>, StoreError> {
        Ok(sqlx::query_as::<_, Driver>("SELECT * FROM drivers ORDER BY name, id").fetch_all(&self.pool).await?)
    }

    async fn get_driver(&self, id: Uuid) -> Result<Option<Driver>, StoreError> {
        Ok(sqlx::query_as::<_, Driver>("SELECT * FROM drivers WHERE id = $1").bind(id).fetch_optional(&self.pool).await?)
    }

    async fn insert_driver(&self, d: &Driver) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO drivers (id, name, phone, vehicle, is_active, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(d.id).bind(&d.name).bind(&d.phone).bind(&d.vehicle).bind(d.is_active).bind(d.created_at).bind(d.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, format!("driver with phone {} already exists", d.phone)))?;
        Ok(())
    }

    async fn update_driver(&self, d: &Driver) -> Result<(), StoreError> {
        let done = sqlx::query("UPDATE drivers SET name = $2, phone = $3, vehicle = $4, is_active = $5, updated_at = $6 WHERE id = $1")
            .bind(d.id).bind(&d.name).bind(&d.phone).bind(&d.vehicle).bind(d.is_active).bind(d.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, format!("driver with phone {} already exists", d.phone)))?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound("driver"));
        }
        Ok(())
    }
}

fn conflict_or(e: sqlx::Error, message: String) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(message),
        _ => StoreError::Database(e),
    }
}

async fn existing_for_key(conn: &mut PgConnection, key: &str, email: &str) -> Result<Option<PlacedOrder>, StoreError> {
    let id: Option<(Uuid, String)> = sqlx::query_as("SELECT id, customer_email FROM orders WHERE idempotency_key = $1")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;
    let Some((id, existing_email)) = id else { return Ok(None) };
    if !existing_email.eq_ignore_ascii_case(email.trim()) {
        return Err(StoreError::Conflict("idempotency key already used for another customer".into()));
    }
    let state = fetch_state(conn, id, false).await?.ok_or(StoreError::NotFound("order"))?;
    Ok(Some(PlacedOrder { state, created: false, events: vec![] }))
}

async fn resolve(conn: &mut PgConnection, key: &OrderKey) -> Result<Option<Uuid>, StoreError> {
    match key {
        OrderKey::Id(id) => Ok(Some(*id)),
        OrderKey::Reference { reference, order_id } => {
            let by_reference: Option<(Uuid,)> = sqlx::query_as("SELECT order_id FROM payments WHERE reference = $1")
                .bind(reference)
                .fetch_optional(&mut *conn)
                .await?;
            Ok(by_reference.map(|r| r.0).or(*order_id))
        }
    }
}

async fn fetch_state(conn: &mut PgConnection, id: Uuid, lock: bool) -> Result<Option<OrderState>, StoreError> {
    let suffix = if lock { " FOR UPDATE" } else { "" };
    let Some(row) = sqlx::query_as::<_, OrderRow>(&format!("SELECT * FROM orders WHERE id = $1{suffix}"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY product_id")
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;
    let payment = sqlx::query_as::<_, PaymentRow>(&format!("SELECT * FROM payments WHERE order_id = $1{suffix}"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(PaymentRow::into_domain)
        .transpose()?;
    Ok(Some(OrderState { order: row.into_domain()?, items, payment }))
}

async fn insert_order(conn: &mut PgConnection, o: &Order) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO orders (id, order_number, idempotency_key, customer_email, user_id, status, payment_status, subtotal, discount, shipping, total, currency, coupon_code, shipping_address, stock_reserved, cancel_reason, return_reason, created_at, updated_at, paid_at, cancelled_at, delivered_at, driver_id) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)")
        .bind(o.id).bind(&o.order_number).bind(&o.idempotency_key).bind(&o.customer_email).bind(&o.user_id)
        .bind(o.status.as_str()).bind(o.payment_status.as_str()).bind(o.subtotal).bind(o.discount).bind(o.shipping)
        .bind(o.total).bind(&o.currency).bind(&o.coupon_code).bind(&o.shipping_address).bind(o.stock_reserved)
        .bind(&o.cancel_reason).bind(&o.return_reason).bind(o.created_at).bind(o.updated_at).bind(o.paid_at)
        .bind(o.cancelled_at).bind(o.delivered_at).bind(o.driver_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.constraint() == Some(ORDER_NUMBER_CONSTRAINT) => StoreError::OrderNumberTaken,
            _ => StoreError::Database(e),
        })?;
    Ok(())
}

async fn upsert_payment(conn: &mut PgConnection, p: &Payment) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO payments (id, order_id, reference, status, amount, currency, channel, gateway_response, authorization_url, access_code, paid_at, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         ON CONFLICT (order_id) DO UPDATE SET reference = EXCLUDED.reference, status = EXCLUDED.status, amount = EXCLUDED.amount, \
         currency = EXCLUDED.currency, channel = EXCLUDED.channel, gateway_response = EXCLUDED.gateway_response, \
         authorization_url = EXCLUDED.authorization_url, access_code = EXCLUDED.access_code, paid_at = EXCLUDED.paid_at, \
         updated_at = EXCLUDED.updated_at",
    )
    .bind(p.id).bind(p.order_id).bind(&p.reference).bind(p.status.as_str()).bind(p.amount).bind(&p.currency)
    .bind(&p.channel).bind(&p.gateway_response).bind(&p.authorization_url).bind(&p.access_code).bind(p.paid_at)
    .bind(p.created_at).bind(p.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn write_stock(conn: &mut PgConnection, book: &StockBook, now: DateTime<Utc>) -> Result<(), StoreError> {
    for (id, level) in book.changes() {
        sqlx::query("UPDATE products SET stock = $2, updated_at = $3 WHERE id = $1")
            .bind(id).bind(level).bind(now)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn write_events(conn: &mut PgConnection, events: &[DomainEvent]) -> Result<(), StoreError> {
    for e in events.iter().map(AuditEntry::from) {
        sqlx::query("INSERT INTO order_events (id, order_id, kind, detail, created_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(e.id).bind(e.order_id).bind(&e.kind).bind(&e.detail).bind(e.created_at)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Rows. Status columns are TEXT and parsed into the domain enums here.
// ---------------------------------------------------------------------------

fn corrupt(e: impl std::fmt::Display) -> StoreError { StoreError::Corrupt(e.to_string()) }

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, sku: String, name: String, description: Option<String>, price: i64, compare_at_price: Option<i64>,
    currency: String, category_id: Option<Uuid>, stock: i32, status: String, is_deleted: bool,
    images: Vec<String>, tags: Vec<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_domain(self) -> Result<Product, StoreError> {
        Ok(Product {
            status: self.status.parse().map_err(corrupt)?,
            id: self.id, sku: self.sku, name: self.name, description: self.description, price: self.price,
            compare_at_price: self.compare_at_price, currency: self.currency, category_id: self.category_id,
            stock: self.stock, is_deleted: self.is_deleted, images: self.images, tags: self.tags,
            created_at: self.created_at, updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: Uuid, code: String, kind: String, value: i64, min_order_amount: i64, max_discount: Option<i64>,
    usage_limit: Option<i32>, usage_count: i32, starts_at: Option<DateTime<Utc>>, expires_at: Option<DateTime<Utc>>,
    is_active: bool, created_at: DateTime<Utc>,
}

impl CouponRow {
    fn into_domain(self) -> Result<Coupon, StoreError> {
        Ok(Coupon {
            kind: self.kind.parse().map_err(corrupt)?,
            id: self.id, code: self.code, value: self.value, min_order_amount: self.min_order_amount,
            max_discount: self.max_discount, usage_limit: self.usage_limit, usage_count: self.usage_count,
            starts_at: self.starts_at, expires_at: self.expires_at, is_active: self.is_active, created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, order_number: String, idempotency_key: Option<String>, customer_email: String, user_id: Option<String>,
    status: String, payment_status: String, subtotal: i64, discount: i64, shipping: i64, total: i64, currency: String,
    coupon_code: Option<String>, shipping_address: serde_json::Value, stock_reserved: bool,
    cancel_reason: Option<String>, return_reason: Option<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>, cancelled_at: Option<DateTime<Utc>>, delivered_at: Option<DateTime<Utc>>,
    driver_id: Option<Uuid>,
}

impl OrderRow {
    fn into_domain(self) -> Result<Order, StoreError> {
        Ok(Order {
            status: self.status.parse().map_err(corrupt)?,
            payment_status: self.payment_status.parse().map_err(corrupt)?,
            id: self.id, order_number: self.order_number, idempotency_key: self.idempotency_key,
            customer_email: self.customer_email, user_id: self.user_id, subtotal: self.subtotal, discount: self.discount,
            shipping: self.shipping, total: self.total, currency: self.currency, coupon_code: self.coupon_code,
            shipping_address: self.shipping_address, stock_reserved: self.stock_reserved, cancel_reason: self.cancel_reason,
            return_reason: self.return_reason, created_at: self.created_at, updated_at: self.updated_at, paid_at: self.paid_at,
            cancelled_at: self.cancelled_at, delivered_at: self.delivered_at, driver_id: self.driver_id, events: vec![],
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid, order_id: Uuid, reference: String, status: String, amount: i64, currency: String,
    channel: Option<String>, gateway_response: Option<String>, authorization_url: Option<String>,
    access_code: Option<String>, paid_at: Option<DateTime<Utc>>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_domain(self) -> Result<Payment, StoreError> {
        Ok(Payment {
            status: self.status.parse().map_err(corrupt)?,
            id: self.id, order_id: self.order_id, reference: self.reference, amount: self.amount, currency: self.currency,
            channel: self.channel, gateway_response: self.gateway_response, authorization_url: self.authorization_url,
            access_code: self.access_code, paid_at: self.paid_at, created_at: self.created_at, updated_at: self.updated_at,
        })
    }
}
