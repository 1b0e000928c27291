pub mod inventory;
pub mod orders;
pub mod packages;
pub mod returns;
pub mod transports;

use crate::db::DbPool;
use crate::events::EventSender;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub inventory: Arc<crate::services::inventory::InventoryService>,
    pub orders: Arc<crate::services::orders::OrderService>,
    pub packages: Arc<crate::services::packages::PackageService>,
    pub transports: Arc<crate::services::transports::TransportService>,
    pub returns: Arc<crate::services::returns::ReturnService>,
}

impl AppServices {
    /// Build the services container over one connection pool and one event
    /// channel.
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        let inventory = Arc::new(crate::services::inventory::InventoryService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let orders = Arc::new(crate::services::orders::OrderService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let packages = Arc::new(crate::services::packages::PackageService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let transports = Arc::new(crate::services::transports::TransportService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let returns = Arc::new(crate::services::returns::ReturnService::new(
            db_pool,
            event_sender,
        ));

        Self {
            inventory,
            orders,
            packages,
            transports,
            returns,
        }
    }
}
