//! Domain events.
//!
//! Authoritative lifecycles (transport for delivery, the return workflow for
//! restock) publish events; dependent entities consume them through the
//! [`StatusProjector`] rather than being cross-written in place.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub mod projections;

pub use projections::StatusProjector;

use crate::entities::order::OrderStatus;
use crate::entities::return_entity::ReturnStatus;
use crate::entities::transport::TransportStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// The events that can occur in the fulfillment and reverse-logistics flow.
#[derive(Debug, Clone, Serialize, Deserialize, strum::AsRefStr)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderProcessed {
        order_id: Uuid,
        package_id: Uuid,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },

    // Inventory events
    BatchReceived {
        batch_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    BatchDamaged {
        batch_id: Uuid,
        quantity: i32,
    },
    LowStockDetected {
        product_id: Uuid,
        available: i32,
        threshold: i32,
    },

    // Package events
    PackageReady(Uuid),
    TransportAssigned {
        package_id: Uuid,
        transport_id: Uuid,
        transporter_id: Uuid,
    },

    // Transport events
    TransportStatusChanged {
        transport_id: Uuid,
        package_id: Uuid,
        old_status: TransportStatus,
        new_status: TransportStatus,
        is_return_leg: bool,
    },

    // Return events
    ReturnInitiated {
        return_id: Uuid,
        package_id: Uuid,
    },
    ReturnStatusChanged {
        return_id: Uuid,
        old_status: ReturnStatus,
        new_status: ReturnStatus,
    },
    ReturnProcessed {
        return_id: Uuid,
        package_id: Uuid,
    },
}

/// Handlers implementing this trait process events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Processes incoming events and feeds them to the status projector.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, projector: StatusProjector) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        let kind = event.as_ref().to_string();

        match &event {
            Event::LowStockDetected {
                product_id,
                available,
                threshold,
            } => {
                warn!(
                    product_id = %product_id,
                    available = available,
                    threshold = threshold,
                    "Low inventory alert: product at or below reorder threshold"
                );
            }
            _ => {
                info!(event = %kind, "Received event");
            }
        }

        if let Err(e) = projector.handle_event(event).await {
            error!(event = %kind, error = %e, "Failed to project event");
        }
    }

    warn!("Event processing loop has ended");
}
