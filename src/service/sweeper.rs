//! Periodic sweep of unpaid orders past their payment window.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::CommerceService;
use crate::domain::aggregates::{OrderError, OrderStatus};
use crate::domain::reconcile::{OrderMutation, Settlement};
use crate::error::{CommerceError, Result};
use crate::gateway::GatewayError;
use crate::store::{OrderKey, StaleOrder};

pub const EXPIRED_REASON: &str = "payment window expired";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub settled: usize,
    pub cancelled: usize,
    pub skipped: usize,
}

impl CommerceService {
    /// One pass over stale PENDING orders: poll the gateway for those holding a
    /// reference, then cancel whatever is still unpaid.
    ///
    /// Orders are read in `(created_at, id)` pages of `sweep_batch_size`. Each
    /// page starts after the last row of the previous one, so orders skipped
    /// because the gateway was unreachable never hold back newer ones.
    pub async fn sweep_stale_orders(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let cutoff = now - chrono::Duration::minutes(self.config.payment_window_minutes);
        let batch = self.config.sweep_batch_size.max(1);
        let mut report = SweepReport::default();
        let mut after = None;

        loop {
            let page = self.store.stale_pending_orders(cutoff, after, batch).await?;
            let Some(last) = page.last() else { break };
            after = Some(last.cursor());
            let full = page.len() as i64 == batch;
            report.examined += page.len();
            for order in page {
                self.sweep_one(order, now, &mut report).await;
            }
            if !full {
                break;
            }
        }

        if report.examined > 0 {
            info!(examined = report.examined, settled = report.settled, cancelled = report.cancelled, skipped = report.skipped, "sweep finished");
        }
        Ok(report)
    }

    async fn sweep_one(&self, order: StaleOrder, now: DateTime<Utc>, report: &mut SweepReport) {
        let order_id = order.id;
        if let Some(reference) = order.reference {
            match self.gateway.verify(&reference).await {
                Ok(outcome) => match self.settle(outcome).await {
                    Ok(r) if r.settlement == Settlement::StillPending => {}
                    Ok(r) if r.state.order.status != OrderStatus::Pending => {
                        report.settled += 1;
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(%order_id, %reference, error = %e, "sweeper reconciliation failed");
                        report.skipped += 1;
                        return;
                    }
                },
                Err(GatewayError::UnknownReference(_)) => {
                    debug!(%order_id, %reference, "reference unknown at gateway");
                }
                Err(e) => {
                    // Leave the order alone until the gateway can answer.
                    warn!(%order_id, %reference, error = %e, "sweeper could not poll gateway");
                    report.skipped += 1;
                    return;
                }
            }
        }
        match self.expire(order_id, now).await {
            Ok(()) => report.cancelled += 1,
            Err(_) => report.skipped += 1,
        }
    }

    async fn expire(&self, order_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mutation = OrderMutation::Cancel { reason: EXPIRED_REASON.to_string() };
        match self.store.mutate_order(&OrderKey::Id(order_id), mutation, now).await.map_err(CommerceError::from) {
            Ok((_, outcome)) => {
                info!(%order_id, "unpaid order expired");
                self.events.publish(&outcome.events).await;
                Ok(())
            }
            Err(e @ CommerceError::Order(OrderError::InvalidTransition { .. })) => {
                debug!(%order_id, "order settled before expiry; skipped");
                Err(e)
            }
            Err(e) => {
                warn!(%order_id, error = %e, "expiring order failed");
                Err(e)
            }
        }
    }
}

/// Runs [`CommerceService::sweep_stale_orders`] every `every` until the runtime shuts down.
pub fn spawn_sweeper(service: Arc<CommerceService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = service.sweep_stale_orders(Utc::now()).await {
                warn!(error = %e, "sweep failed");
            }
        }
    })
}
