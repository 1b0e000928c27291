//! Transport lifecycle: the authoritative record of a package's movement.
//!
//! Every successful transition appends an immutable entry to the transport's
//! status history; the history is never edited or truncated. Reaching
//! `delivered` publishes the event the package and order projections consume.

use crate::{
    db::DbPool,
    entities::transport::{self, Entity as TransportEntity, TransportStatus},
    entities::transport_event::{self, Entity as TransportEventEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
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
pub struct TransportEventResponse {
    pub status: TransportStatus,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub updated_by: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl From<transport_event::Model> for TransportEventResponse {
    fn from(model: transport_event::Model) -> Self {
        Self {
            status: model.status,
            location: model.location,
            notes: model.notes,
            updated_by: model.updated_by,
            recorded_at: model.recorded_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransportResponse {
    pub id: Uuid,
    pub package_id: Uuid,
    pub transporter_id: Uuid,
    pub status: TransportStatus,
    pub is_return_leg: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status_history: Vec<TransportEventResponse>,
}

impl TransportResponse {
    pub fn from_parts(model: transport::Model, events: Vec<transport_event::Model>) -> Self {
        Self {
            id: model.id,
            package_id: model.package_id,
            transporter_id: model.transporter_id,
            status: model.status,
            is_return_leg: model.is_return_leg,
            created_at: model.created_at,
            updated_at: model.updated_at,
            status_history: events.into_iter().map(Into::into).collect(),
        }
    }
}

/// Service for managing transports.
#[derive(Clone)]
pub struct TransportService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl TransportService {
    /// Creates a new transport service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Advances a transport along `dispatched → in_transit → delivered`.
    ///
    /// Rejects any other requested edge with the transport's actual status.
    /// The transition and its history entry commit together.
    #[instrument(skip(self, location, notes, updated_by), fields(transport_id = %transport_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        transport_id: Uuid,
        new_status: TransportStatus,
        location: Option<String>,
        notes: Option<String>,
        updated_by: Option<String>,
    ) -> Result<TransportResponse, ServiceError> {
        let db = &*self.db_pool;

        let found = TransportEntity::find_by_id(transport_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Transport {} not found", transport_id))
            })?;

        let old_status = found.status;
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidTransition(format!(
                "Transport {} cannot move from '{}' to '{}'",
                transport_id, old_status, new_status
            )));
        }

        let now = Utc::now();
        let package_id = found.package_id;
        let is_return_leg = found.is_return_leg;

        let txn = db.begin().await?;

        let mut active: transport::ActiveModel = found.into();
        active.status = Set(new_status);
        active.updated_at = Set(now);
        let updated = active.update(&txn).await?;

        transport_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            transport_id: Set(transport_id),
            status: Set(new_status),
            location: Set(location),
            notes: Set(notes),
            updated_by: Set(updated_by),
            recorded_at: Set(now),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        info!(
            transport_id = %transport_id,
            old_status = %old_status,
            new_status = %new_status,
            "Transport status updated"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::TransportStatusChanged {
                transport_id,
                package_id,
                old_status,
                new_status,
                is_return_leg,
            })
            .await
        {
            warn!(transport_id = %transport_id, error = %e, "Failed to send transport status changed event");
        }

        let events = self.history(transport_id).await?;
        Ok(TransportResponse::from_parts(updated, events))
    }

    /// Retrieves a transport with its ordered status history.
    #[instrument(skip(self))]
    pub async fn get_transport(
        &self,
        transport_id: Uuid,
    ) -> Result<Option<TransportResponse>, ServiceError> {
        let db = &*self.db_pool;

        let Some(found) = TransportEntity::find_by_id(transport_id).one(db).await? else {
            return Ok(None);
        };

        let events = self.history(transport_id).await?;
        Ok(Some(TransportResponse::from_parts(found, events)))
    }

    /// Lists transports with pagination.
    #[instrument(skip(self))]
    pub async fn list_transports(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<transport::Model>, u64), ServiceError> {
        let db = &*self.db_pool;

        let paginator = TransportEntity::find()
            .order_by_desc(transport::Column::CreatedAt)
            .paginate(db, limit);

        let total = paginator.num_items().await?;
        let transports = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((transports, total))
    }

    async fn history(
        &self,
        transport_id: Uuid,
    ) -> Result<Vec<transport_event::Model>, ServiceError> {
        let db = &*self.db_pool;
        Ok(TransportEventEntity::find()
            .filter(transport_event::Column::TransportId.eq(transport_id))
            .order_by_asc(transport_event::Column::RecordedAt)
            .all(db)
            .await?)
    }
}
