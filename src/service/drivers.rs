//! Driver roster and delivery dispatch.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::CommerceService;
use crate::domain::aggregates::{DeliveryStage, Driver, DriverDraft};
use crate::domain::reconcile::{OrderMutation, OrderState};
use crate::error::{CommerceError, Result};

impl CommerceService {
    pub async fn list_drivers(&self) -> Result<Vec<Driver>> {
        Ok(self.store.list_drivers().await?)
    }

    pub async fn get_driver(&self, id: Uuid) -> Result<Driver> {
        self.store.get_driver(id).await?.ok_or(CommerceError::NotFound("driver"))
    }

    pub async fn create_driver(&self, draft: DriverDraft) -> Result<Driver> {
        let driver = Driver::create(draft, Utc::now())?;
        self.store.insert_driver(&driver).await?;
        info!(driver_id = %driver.id, "driver registered");
        Ok(driver)
    }

    pub async fn update_driver(&self, id: Uuid, draft: DriverDraft) -> Result<Driver> {
        let mut driver = self.get_driver(id).await?;
        driver.apply(draft, Utc::now())?;
        self.store.update_driver(&driver).await?;
        Ok(driver)
    }

    /// Drivers stay on record for the orders they carried.
    pub async fn deactivate_driver(&self, id: Uuid) -> Result<Driver> {
        let mut driver = self.get_driver(id).await?;
        driver.deactivate(Utc::now());
        self.store.update_driver(&driver).await?;
        info!(driver_id = %id, "driver deactivated");
        Ok(driver)
    }

    pub async fn assign_driver(&self, order_id: Uuid, driver_id: Uuid) -> Result<OrderState> {
        let driver = self.get_driver(driver_id).await?;
        self.mutate(order_id, OrderMutation::AssignDriver(driver)).await
    }

    pub async fn record_delivery(&self, order_id: Uuid, stage: DeliveryStage, note: Option<String>) -> Result<OrderState> {
        self.mutate(order_id, OrderMutation::RecordDelivery { stage, note }).await
    }
}
