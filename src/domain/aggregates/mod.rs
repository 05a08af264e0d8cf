//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod coupon;
pub mod payment;
pub mod stock;
pub mod review;
pub mod driver;

pub use product::{slugify, Category, Product, ProductDraft, ProductError, ProductStatus};
pub use order::{generate_order_number, Order, OrderError, OrderItem, OrderStatus, PaymentStatus, Placement, Pricing};
pub use cart::{Cart, CartItem, CartLine};
pub use coupon::{Coupon, CouponDraft, CouponError, CouponKind};
pub use payment::{generate_reference, is_valid_reference, GatewayOutcome, GatewayStatus, Payment, PaymentRecordStatus};
pub use stock::{StockBook, StockError, StockLine};
pub use review::{ProductReviews, Review, ReviewDraft, ReviewError};
pub use driver::{DeliveryStage, Driver, DriverDraft, DriverError};
