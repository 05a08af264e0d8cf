//! Application services: the operations the HTTP layer exposes.
//!
//! [`CommerceService`] owns the store, the payment gateway and the event
//! publisher. Order-changing operations commit through the store first and
//! publish the resulting events afterwards.

pub mod catalog;
pub mod drivers;
pub mod events;
pub mod orders;
pub mod payments;
pub mod reviews;
pub mod sweeper;

use std::sync::Arc;

use crate::config::Config;
use crate::gateway::PaymentGateway;
use crate::store::Store;

pub use catalog::CouponQuote;
pub use events::EventPublisher;
pub use orders::{NewOrder, OrderDetail};
pub use payments::{SettlementReport, WebhookAck};
pub use sweeper::{spawn_sweeper, SweepReport};

#[derive(Clone)]
pub struct CommerceService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    events: EventPublisher,
    config: Arc<Config>,
}

impl CommerceService {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>, events: EventPublisher, config: Arc<Config>) -> Self {
        Self { store, gateway, events, config }
    }

    pub fn store(&self) -> &Arc<dyn Store> { &self.store }
    pub fn config(&self) -> &Config { &self.config }
}
