//! Status projection: mirrors authoritative lifecycle transitions into the
//! entities that track them as derived state.
//!
//! The transport lifecycle owns `in_transit`/`delivered`; the return
//! lifecycle owns `returned`. Package and order rows mirror those states
//! here, event-driven, never by cross-writes from the owning services.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Event, EventHandler};
use crate::entities::batch_allocation;
use crate::entities::order::{self, OrderStatus};
use crate::entities::package::{self, PackageStatus};
use crate::entities::transport::TransportStatus;

#[derive(Clone)]
pub struct StatusProjector {
    db: Arc<DatabaseConnection>,
}

impl StatusProjector {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Advances a package to `target` when the edge is legal. Re-delivered
    /// events find the package already at the target and are no-ops.
    async fn advance_package(
        &self,
        package_id: Uuid,
        target: PackageStatus,
    ) -> Result<Option<package::Model>, String> {
        let db = &*self.db;
        let package = package::Entity::find_by_id(package_id)
            .one(db)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("package {} not found for projection", package_id))?;

        if package.status == target {
            return Ok(None);
        }
        if !package.status.can_transition_to(target) {
            warn!(
                package_id = %package_id,
                current = %package.status,
                target = %target,
                "Skipping package projection for illegal edge"
            );
            return Ok(None);
        }

        let mut active: package::ActiveModel = package.into();
        active.status = Set(target);
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await.map_err(|e| e.to_string())?;

        info!(package_id = %package_id, status = %target, "Projected package status");
        Ok(Some(updated))
    }

    /// Advances the order that owns `package` to `target`, same edge rules.
    async fn advance_order(&self, order_id: Uuid, target: OrderStatus) -> Result<(), String> {
        let db = &*self.db;
        let order = order::Entity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("order {} not found for projection", order_id))?;

        if order.status == target {
            return Ok(());
        }
        if !order.status.can_transition_to(target) {
            warn!(
                order_id = %order_id,
                current = %order.status,
                target = %target,
                "Skipping order projection for illegal edge"
            );
            return Ok(());
        }

        let old_status = order.status;
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(target);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        active.update(db).await.map_err(|e| e.to_string())?;

        info!(
            order_id = %order_id,
            old_status = %old_status,
            new_status = %target,
            "Projected order status"
        );
        Ok(())
    }

    /// True when every allocated unit on the package has been returned.
    async fn fully_returned(&self, package_id: Uuid) -> Result<bool, String> {
        let db = &*self.db;
        let allocations = batch_allocation::Entity::find()
            .filter(batch_allocation::Column::PackageId.eq(package_id))
            .all(db)
            .await
            .map_err(|e| e.to_string())?;
        Ok(allocations
            .iter()
            .all(|a| a.returned_quantity >= a.quantity))
    }

    async fn order_id_for_package(&self, package_id: Uuid) -> Result<Uuid, String> {
        let db = &*self.db;
        package::Entity::find_by_id(package_id)
            .one(db)
            .await
            .map_err(|e| e.to_string())?
            .map(|p| p.order_id)
            .ok_or_else(|| format!("package {} not found for projection", package_id))
    }
}

#[async_trait]
impl EventHandler for StatusProjector {
    async fn handle_event(&self, event: Event) -> Result<(), String> {
        match event {
            Event::TransportStatusChanged {
                package_id,
                new_status,
                is_return_leg,
                ..
            } => {
                // Reverse-leg movement never advances the forward lifecycle.
                if is_return_leg {
                    return Ok(());
                }
                match new_status {
                    TransportStatus::InTransit => {
                        self.advance_package(package_id, PackageStatus::InTransit)
                            .await?;
                    }
                    TransportStatus::Delivered => {
                        let order_id = self.order_id_for_package(package_id).await?;
                        self.advance_package(package_id, PackageStatus::Delivered)
                            .await?;
                        self.advance_order(order_id, OrderStatus::Delivered).await?;
                    }
                    TransportStatus::Dispatched => {}
                }
                Ok(())
            }
            Event::ReturnProcessed { package_id, .. } => {
                // A package is `returned` once nothing of its allocation is
                // still out; a partial return leaves it `delivered` so the
                // remainder can still come back.
                if self.fully_returned(package_id).await? {
                    let order_id = self.order_id_for_package(package_id).await?;
                    self.advance_package(package_id, PackageStatus::Returned)
                        .await?;
                    self.advance_order(order_id, OrderStatus::Returned).await?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
