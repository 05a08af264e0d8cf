//! Best-effort publication of committed order events to NATS.

use tracing::{debug, warn};

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    pub fn disabled() -> Self { Self::default() }

    pub fn is_enabled(&self) -> bool { self.nats.is_some() }

    /// Events are already durable in the audit table, so failures are logged and dropped.
    pub async fn publish(&self, events: &[DomainEvent]) {
        let Some(client) = &self.nats else { return };
        for event in events {
            let payload = match serde_json::to_vec(event) {
                Ok(p) => p,
                Err(e) => {
                    warn!(order_id = %event.order_id, error = %e, "event serialization failed");
                    continue;
                }
            };
            let subject = event.subject();
            match client.publish(subject.clone(), payload.into()).await {
                Ok(()) => debug!(%subject, order_id = %event.order_id, "event published"),
                Err(e) => warn!(%subject, order_id = %event.order_id, error = %e, "event publish failed"),
            }
        }
    }
}
