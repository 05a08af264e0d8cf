//! Order Aggregate

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Money, MoneyError, Quantity, QuantityError};
use super::{Coupon, CouponError, DeliveryStage, Driver, Product, StockBook, StockError, StockLine};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub idempotency_key: Option<String>,
    pub customer_email: String,
    pub user_id: Option<String>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: i64,
    pub discount: i64,
    pub shipping: i64,
    pub total: i64,
    pub currency: String,
    pub coupon_code: Option<String>,
    pub shipping_address: serde_json::Value,
    pub stock_reserved: bool,
    pub cancel_reason: Option<String>,
    pub return_reason: Option<String>,
    pub driver_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem { pub id: Uuid, pub order_id: Uuid, pub product_id: Uuid, pub sku: String, pub name: String, pub quantity: i32, pub unit_price: i64, pub total: i64 }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus { #[default] Pending, Processing, Shipped, Delivered, Cancelled, ReturnRequested, Returned }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus { #[default] Pending, Paid, Failed, RefundDue, Refunded }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
            Self::ReturnRequested => "RETURN_REQUESTED",
            Self::Returned => "RETURNED",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "SHIPPED" => Ok(Self::Shipped),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELLED" => Ok(Self::Cancelled),
            "RETURN_REQUESTED" => Ok(Self::ReturnRequested),
            "RETURNED" => Ok(Self::Returned),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
            Self::RefundDue => "REFUND_DUE",
            Self::Refunded => "REFUNDED",
        }
    }

    /// Money has moved for this order; later gateway reports change nothing.
    pub fn is_settled(&self) -> bool { matches!(self, Self::Paid | Self::RefundDue | Self::Refunded) }
}

impl FromStr for PaymentStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "FAILED" => Ok(Self::Failed),
            "REFUND_DUE" => Ok(Self::RefundDue),
            "REFUNDED" => Ok(Self::Refunded),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

/// Shop-wide pricing rules applied when an order is placed.
#[derive(Clone, Debug)]
pub struct Pricing {
    pub currency: String,
    pub shipping_flat_fee: i64,
    pub free_shipping_threshold: i64,
}

impl Pricing {
    pub fn shipping_for(&self, discounted_subtotal: &Money) -> Money {
        if discounted_subtotal.amount() >= self.free_shipping_threshold { Money::zero(&self.currency) }
        else { Money::new(self.shipping_flat_fee, &self.currency) }
    }
}

/// Everything needed to place an order, already resolved by the caller.
#[derive(Clone, Debug)]
pub struct Placement {
    pub customer_email: String,
    pub user_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub lines: Vec<(Uuid, i64)>,
    pub shipping_address: serde_json::Value,
    pub coupon_code: Option<String>,
}

impl Placement {
    /// Merges duplicate products and validates quantities, ordered by product id.
    pub fn merged_lines(&self) -> Result<Vec<(Uuid, Quantity)>, OrderError> {
        let mut merged: BTreeMap<Uuid, i64> = BTreeMap::new();
        for (product_id, quantity) in &self.lines {
            if *quantity < 1 { return Err(OrderError::InvalidQuantity(QuantityError::OutOfRange(*quantity))); }
            *merged.entry(*product_id).or_default() += quantity;
        }
        if merged.is_empty() { return Err(OrderError::NoItems); }
        merged.into_iter()
            .map(|(id, q)| Quantity::line(q).map(|q| (id, q)).map_err(OrderError::InvalidQuantity))
            .collect()
    }
}

impl Order {
    /// Prices `placement` against `products`, applies `coupon`, and reserves
    /// stock in `book`. Nothing in `book` changes unless the whole order fits.
    pub fn place(
        placement: &Placement,
        products: &HashMap<Uuid, Product>,
        book: &mut StockBook,
        coupon: Option<&Coupon>,
        pricing: &Pricing,
        now: DateTime<Utc>,
    ) -> Result<(Order, Vec<OrderItem>), OrderError> {
        let lines = placement.merged_lines()?;
        let id = Uuid::now_v7();
        let mut items = Vec::with_capacity(lines.len());
        let mut subtotal = Money::zero(&pricing.currency);
        for (product_id, quantity) in &lines {
            let product = products.get(product_id).filter(|p| p.is_purchasable())
                .ok_or(OrderError::ProductUnavailable(*product_id))?;
            let line_total = product.unit_price().multiply(quantity.value());
            subtotal = subtotal.add(&line_total)?;
            items.push(OrderItem {
                id: Uuid::now_v7(), order_id: id, product_id: product.id, sku: product.sku.clone(),
                name: product.name.clone(), quantity: quantity.value() as i32, unit_price: product.price,
                total: line_total.amount(),
            });
        }

        let discount = match (placement.coupon_code.as_deref(), coupon) {
            (Some(_), Some(c)) => c.discount_for(&subtotal, now)?,
            (Some(_), None) => return Err(OrderError::Coupon(CouponError::NotFound)),
            (None, _) => Money::zero(&pricing.currency),
        };
        let discounted = subtotal.subtract(&discount)?;
        let shipping = pricing.shipping_for(&discounted);
        let total = discounted.add(&shipping)?;

        let stock_lines: Vec<StockLine> = items.iter().map(OrderItem::stock_line).collect();
        book.reserve(&stock_lines)?;

        let mut order = Order {
            id, order_number: generate_order_number(), idempotency_key: placement.idempotency_key.clone(),
            customer_email: placement.customer_email.trim().to_lowercase(), user_id: placement.user_id.clone(),
            status: OrderStatus::Pending, payment_status: PaymentStatus::Pending,
            subtotal: subtotal.amount(), discount: discount.amount(), shipping: shipping.amount(), total: total.amount(),
            currency: pricing.currency.clone(), coupon_code: coupon.map(|c| c.code.clone()),
            shipping_address: placement.shipping_address.clone(), stock_reserved: true,
            cancel_reason: None, return_reason: None, driver_id: None, created_at: now, updated_at: now,
            paid_at: None, cancelled_at: None, delivered_at: None, events: vec![],
        };
        order.raise_event(OrderEvent::Placed { order_number: order.order_number.clone(), total: order.total, coupon_code: order.coupon_code.clone() }, now);
        order.raise_event(OrderEvent::StockReserved { units: units(&stock_lines) }, now);
        Ok((order, items))
    }

    pub fn total_money(&self) -> Money { Money::new(self.total, &self.currency) }

    /// Can a fresh payment attempt be started for this order?
    pub fn is_payable(&self) -> bool { self.status == OrderStatus::Pending && self.payment_status == PaymentStatus::Pending }

    pub fn ensure_payable(&self) -> Result<(), OrderError> {
        if self.is_payable() { Ok(()) } else { Err(OrderError::NotPayable { status: self.status, payment_status: self.payment_status }) }
    }

    /// Customer or sweeper cancellation of an unpaid order.
    pub fn cancel(&mut self, reason: &str, items: &[OrderItem], book: &mut StockBook, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status != OrderStatus::Pending || self.payment_status.is_settled() {
            return Err(OrderError::InvalidTransition { from: self.status, to: OrderStatus::Cancelled });
        }
        self.void(reason, items, book, now);
        Ok(())
    }

    /// Moves a paid order along the fulfilment path.
    pub fn advance(&mut self, to: OrderStatus, now: DateTime<Utc>) -> Result<(), OrderError> {
        let allowed = match (self.status, to) {
            (OrderStatus::Pending, OrderStatus::Processing) => self.payment_status == PaymentStatus::Paid,
            (OrderStatus::Processing, OrderStatus::Shipped) => true,
            (OrderStatus::Shipped, OrderStatus::Delivered) => true,
            _ => false,
        };
        if !allowed { return Err(OrderError::InvalidTransition { from: self.status, to }); }
        let from = self.status;
        self.status = to;
        if to == OrderStatus::Delivered { self.delivered_at = Some(now); }
        self.raise_event(OrderEvent::StatusChanged { from: from.as_str().into(), to: to.as_str().into() }, now);
        self.touch(now);
        Ok(())
    }

    pub fn request_return(&mut self, reason: &str, window_days: i64, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status != OrderStatus::Delivered {
            return Err(OrderError::InvalidTransition { from: self.status, to: OrderStatus::ReturnRequested });
        }
        let reason = reason.trim();
        if reason.is_empty() { return Err(OrderError::MissingReason); }
        let delivered = self.delivered_at.unwrap_or(self.updated_at);
        if now > delivered + Duration::days(window_days) { return Err(OrderError::ReturnWindowClosed { days: window_days }); }
        self.status = OrderStatus::ReturnRequested;
        self.return_reason = Some(reason.to_string());
        self.raise_event(OrderEvent::ReturnRequested { reason: reason.to_string() }, now);
        self.touch(now);
        Ok(())
    }

    pub fn resolve_return(&mut self, approve: bool, items: &[OrderItem], book: &mut StockBook, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status != OrderStatus::ReturnRequested {
            let to = if approve { OrderStatus::Returned } else { OrderStatus::Delivered };
            return Err(OrderError::InvalidTransition { from: self.status, to });
        }
        if approve {
            self.status = OrderStatus::Returned;
            self.payment_status = PaymentStatus::Refunded;
            self.release_stock(items, book, now);
        } else {
            self.status = OrderStatus::Delivered;
        }
        self.raise_event(OrderEvent::ReturnResolved { approved: approve }, now);
        self.touch(now);
        Ok(())
    }

    /// Hands a paid order that is being prepared or is on the road to `driver`.
    pub fn assign_driver(&mut self, driver: &Driver, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.ensure_dispatchable()?;
        if !driver.is_active { return Err(OrderError::DriverInactive(driver.id)); }
        if self.driver_id == Some(driver.id) { return Ok(()); }
        self.driver_id = Some(driver.id);
        self.raise_event(OrderEvent::DriverAssigned { driver_id: driver.id, driver_name: driver.name.clone() }, now);
        self.touch(now);
        Ok(())
    }

    /// Appends a stage to the delivery trail reported by the assigned driver.
    pub fn record_delivery(&mut self, stage: DeliveryStage, note: Option<String>, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.ensure_dispatchable()?;
        let driver_id = self.driver_id.ok_or(OrderError::NoDriver)?;
        let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        self.raise_event(OrderEvent::DeliveryUpdated { stage: stage.as_str().into(), driver_id, note }, now);
        self.touch(now);
        Ok(())
    }

    fn ensure_dispatchable(&self) -> Result<(), OrderError> {
        if matches!(self.status, OrderStatus::Processing | OrderStatus::Shipped) { Ok(()) }
        else { Err(OrderError::NotDispatchable { status: self.status }) }
    }

    pub(crate) fn mark_paid(&mut self, now: DateTime<Utc>) {
        self.payment_status = PaymentStatus::Paid;
        self.status = OrderStatus::Processing;
        self.paid_at = Some(now);
        self.cancel_reason = None;
        self.cancelled_at = None;
        self.touch(now);
    }

    /// Cancels and gives reserved stock back; no transition checks.
    pub(crate) fn void(&mut self, reason: &str, items: &[OrderItem], book: &mut StockBook, now: DateTime<Utc>) {
        self.status = OrderStatus::Cancelled;
        self.cancel_reason = Some(reason.to_string());
        self.cancelled_at = Some(now);
        self.raise_event(OrderEvent::Cancelled { reason: reason.to_string() }, now);
        self.release_stock(items, book, now);
        self.touch(now);
    }

    /// Re-takes stock for a cancelled order whose payment came through late.
    pub(crate) fn reclaim_stock(&mut self, items: &[OrderItem], book: &mut StockBook, now: DateTime<Utc>) -> Result<(), StockError> {
        if self.stock_reserved { return Ok(()); }
        let lines: Vec<StockLine> = items.iter().map(OrderItem::stock_line).collect();
        book.reserve(&lines)?;
        self.stock_reserved = true;
        self.raise_event(OrderEvent::StockReserved { units: units(&lines) }, now);
        Ok(())
    }

    fn release_stock(&mut self, items: &[OrderItem], book: &mut StockBook, now: DateTime<Utc>) {
        if !self.stock_reserved { return; }
        let lines: Vec<StockLine> = items.iter().map(OrderItem::stock_line).collect();
        book.restore(&lines);
        self.stock_reserved = false;
        self.raise_event(OrderEvent::StockRestored { units: units(&lines) }, now);
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    pub(crate) fn raise_event(&mut self, e: OrderEvent, at: DateTime<Utc>) { self.events.push(DomainEvent::new(self.id, e, at)); }
    fn touch(&mut self, now: DateTime<Utc>) { self.updated_at = now; }
}

impl OrderItem {
    pub fn stock_line(&self) -> StockLine { StockLine { product_id: self.product_id, quantity: self.quantity } }
}

fn units(lines: &[StockLine]) -> i32 { lines.iter().map(|l| l.quantity).sum() }

/// `TRD-` followed by eight random digits.
pub fn generate_order_number() -> String { format!("TRD-{:08}", rand::random::<u32>() % 100_000_000) }

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error(transparent)]
    InvalidQuantity(#[from] QuantityError),
    #[error("product {0} is not available")]
    ProductUnavailable(Uuid),
    #[error(transparent)]
    Stock(#[from] StockError),
    #[error(transparent)]
    Coupon(#[from] CouponError),
    #[error(transparent)]
    Money(#[from] MoneyError),
    #[error("cannot move order from {from:?} to {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("order is not payable (status {status:?}, payment {payment_status:?})")]
    NotPayable { status: OrderStatus, payment_status: PaymentStatus },
    #[error("returns must be requested within {days} days of delivery")]
    ReturnWindowClosed { days: i64 },
    #[error("a reason is required")]
    MissingReason,
    #[error("order in status {status:?} cannot be handed to a driver")]
    NotDispatchable { status: OrderStatus },
    #[error("driver {0} is inactive")]
    DriverInactive(Uuid),
    #[error("no driver is assigned to this order")]
    NoDriver,
    #[error("unknown status {0}")]
    UnknownStatus(String),
}
