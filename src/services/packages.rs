//! Package lifecycle: packing readiness and transport assignment.
//!
//! States beyond `dispatched` are projections of the transport lifecycle and
//! are written by the status projector, never here.

use crate::{
    db::DbPool,
    entities::package::{self, Entity as PackageEntity, PackageStatus},
    entities::package_item::{self, Entity as PackageItemEntity},
    entities::transport::{self, TransportStatus},
    entities::transport_event,
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PackageResponse {
    pub id: Uuid,
    pub package_code: String,
    pub order_id: Uuid,
    pub status: PackageStatus,
    pub total_value: Decimal,
    pub weight_kg: Option<Decimal>,
    pub dimensions_cm: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<package::Model> for PackageResponse {
    fn from(model: package::Model) -> Self {
        Self {
            id: model.id,
            package_code: model.package_code,
            order_id: model.order_id,
            status: model.status,
            total_value: model.total_value,
            weight_kg: model.weight_kg,
            dimensions_cm: model.dimensions_cm,
            notes: model.notes,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Service for managing packages.
#[derive(Clone)]
pub struct PackageService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl PackageService {
    /// Creates a new package service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Flags a pending package as assembled and ready for dispatch.
    /// No inventory effect; allocation already happened at creation.
    #[instrument(skip(self, notes), fields(package_id = %package_id))]
    pub async fn mark_ready(
        &self,
        package_id: Uuid,
        notes: Option<String>,
    ) -> Result<package::Model, ServiceError> {
        let db = &*self.db_pool;

        let found = PackageEntity::find_by_id(package_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Package {} not found", package_id)))?;

        if found.status != PackageStatus::Pending {
            return Err(ServiceError::InvalidTransition(format!(
                "Package {} cannot be marked ready from status '{}'; expected 'pending'",
                found.package_code, found.status
            )));
        }

        let mut active: package::ActiveModel = found.into();
        active.status = Set(PackageStatus::ReadyForDispatch);
        active.updated_at = Set(Utc::now());
        if let Some(notes) = notes {
            active.notes = Set(Some(notes));
        }
        let updated = active.update(db).await?;

        info!(package_id = %package_id, "Package marked ready for dispatch");

        if let Err(e) = self.event_sender.send(Event::PackageReady(package_id)).await {
            warn!(package_id = %package_id, error = %e, "Failed to send package ready event");
        }

        Ok(updated)
    }

    /// Generic status PATCH entry point. The only caller-writable state is
    /// `ready_for_dispatch`; everything else belongs to transport assignment
    /// or the projector and is rejected with the actual status so the caller
    /// can resynchronize.
    #[instrument(skip(self, notes), fields(package_id = %package_id))]
    pub async fn update_status(
        &self,
        package_id: Uuid,
        target: PackageStatus,
        notes: Option<String>,
    ) -> Result<package::Model, ServiceError> {
        match target {
            PackageStatus::ReadyForDispatch => self.mark_ready(package_id, notes).await,
            _ => {
                let db = &*self.db_pool;
                let current = PackageEntity::find_by_id(package_id)
                    .one(db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Package {} not found", package_id))
                    })?;
                Err(ServiceError::InvalidTransition(format!(
                    "Package status '{}' is owned by the transport workflow and cannot be set directly; current status '{}'",
                    target, current.status
                )))
            }
        }
    }

    /// Assigns a transporter to a ready package: creates the transport with
    /// its first history entry and flips the package to `dispatched`, in one
    /// transaction.
    #[instrument(skip(self, notes), fields(package_id = %package_id, transporter_id = %transporter_id))]
    pub async fn assign_transport(
        &self,
        package_id: Uuid,
        transporter_id: Uuid,
        notes: Option<String>,
    ) -> Result<(transport::Model, package::Model), ServiceError> {
        if transporter_id.is_nil() {
            return Err(ServiceError::NotFound(
                "Transporter id must be provided".to_string(),
            ));
        }

        let db = &*self.db_pool;

        let found = PackageEntity::find_by_id(package_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Package {} not found", package_id)))?;

        if found.status != PackageStatus::ReadyForDispatch {
            return Err(ServiceError::InvalidTransition(format!(
                "Package {} cannot be assigned transport from status '{}'; expected 'ready_for_dispatch'",
                found.package_code, found.status
            )));
        }

        let now = Utc::now();
        let transport_id = Uuid::new_v4();

        let txn = db.begin().await?;

        let created_transport = transport::ActiveModel {
            id: Set(transport_id),
            package_id: Set(package_id),
            transporter_id: Set(transporter_id),
            status: Set(TransportStatus::Dispatched),
            is_return_leg: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        transport_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            transport_id: Set(transport_id),
            status: Set(TransportStatus::Dispatched),
            location: Set(None),
            notes: Set(notes),
            updated_by: Set(None),
            recorded_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut active: package::ActiveModel = found.into();
        active.status = Set(PackageStatus::Dispatched);
        active.updated_at = Set(now);
        let updated_package = active.update(&txn).await?;

        txn.commit().await?;

        info!(
            package_id = %package_id,
            transport_id = %transport_id,
            "Transport assigned, package dispatched"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::TransportAssigned {
                package_id,
                transport_id,
                transporter_id,
            })
            .await
        {
            warn!(package_id = %package_id, error = %e, "Failed to send transport assigned event");
        }

        Ok((created_transport, updated_package))
    }

    /// Retrieves a package with its assembled items.
    #[instrument(skip(self))]
    pub async fn get_package(
        &self,
        package_id: Uuid,
    ) -> Result<Option<(package::Model, Vec<package_item::Model>)>, ServiceError> {
        let db = &*self.db_pool;

        let Some(found) = PackageEntity::find_by_id(package_id).one(db).await? else {
            return Ok(None);
        };

        let items = PackageItemEntity::find()
            .filter(package_item::Column::PackageId.eq(package_id))
            .all(db)
            .await?;

        Ok(Some((found, items)))
    }

    /// Retrieves the package assembled for an order, if any.
    #[instrument(skip(self))]
    pub async fn get_package_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<package::Model>, ServiceError> {
        let db = &*self.db_pool;
        Ok(PackageEntity::find()
            .filter(package::Column::OrderId.eq(order_id))
            .one(db)
            .await?)
    }

    /// Lists packages with pagination and an optional status filter.
    #[instrument(skip(self))]
    pub async fn list_packages(
        &self,
        page: u64,
        limit: u64,
        status: Option<String>,
    ) -> Result<(Vec<package::Model>, u64), ServiceError> {
        let db = &*self.db_pool;

        let mut query = PackageEntity::find();

        if let Some(status_filter) = status {
            match status_filter.parse::<PackageStatus>() {
                Ok(parsed) => query = query.filter(package::Column::Status.eq(parsed)),
                // An unknown status matches nothing.
                Err(_) => return Ok((vec![], 0)),
            }
        }

        let paginator = query
            .order_by_desc(package::Column::CreatedAt)
            .paginate(db, limit);

        let total = paginator.num_items().await?;
        let packages = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((packages, total))
    }
}
