//! The inventory ledger: exclusive owner of batch quantity state.
//!
//! Every mutation of a batch's quantities goes through this module. The
//! primitive operations are generic over the connection so the allocator and
//! the returns workflow can compose them inside their own transactions.
//!
//! Linearization: `reserve` and `mark_damaged` are single conditional
//! UPDATEs whose guard makes concurrent overdraw impossible; `release` and
//! `restock` use a bounded compare-and-swap retry on `current_quantity`.

use crate::{
    db::DbPool,
    entities::batch_allocation::{self, Entity as BatchAllocationEntity},
    entities::inventory_batch::{self, Entity as InventoryBatchEntity},
    entities::package::{self, Entity as PackageEntity},
    entities::product::{self, Entity as ProductEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Retry bound for the compare-and-swap quantity updates.
const CAS_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReceiveBatchRequest {
    pub product_id: Uuid,
    #[validate(length(min = 1, message = "Batch number is required"))]
    pub batch_number: String,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
    pub manufacture_date: Option<NaiveDate>,
    pub expiration_date: NaiveDate,
    pub supplier_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterProductRequest {
    #[validate(length(min = 1, message = "SKU is required"))]
    pub sku: String,
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    pub unit_price: Decimal,
    #[validate(range(min = 0, message = "Threshold cannot be negative"))]
    pub reorder_threshold: i32,
    pub shelf_life_days: Option<i32>,
}

/// One allocation line in a batch tracking snapshot.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchAllocationBreakdown {
    pub package_id: Uuid,
    pub package_code: String,
    pub product_id: Uuid,
    pub quantity: i32,
    pub returned_quantity: i32,
}

/// Point-in-time snapshot of a batch plus its derived items breakdown.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchTrackingResponse {
    pub batch: inventory_batch::Model,
    pub allocations: Vec<BatchAllocationBreakdown>,
    /// Units currently bound to packages and not yet returned.
    pub allocated_outstanding: i32,
    /// Units already restocked through processed returns.
    pub returned_total: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchAvailability {
    pub batch_id: Uuid,
    pub batch_number: String,
    pub expiration_date: NaiveDate,
    pub current_quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductAvailability {
    pub product_id: Uuid,
    pub total_available: i32,
    pub reorder_threshold: i32,
    pub batches: Vec<BatchAvailability>,
}

/// Service for managing batch-level inventory.
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl InventoryService {
    /// Creates a new inventory service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Registers a product. Catalog administration proper lives elsewhere;
    /// this is the minimum the allocation flows need.
    #[instrument(skip(self, request), fields(sku = %request.sku))]
    pub async fn register_product(
        &self,
        request: RegisterProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request.validate()?;

        let db = &*self.db_pool;

        let existing = ProductEntity::find()
            .filter(product::Column::Sku.eq(request.sku.clone()))
            .one(db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "Product with SKU {} already exists",
                request.sku
            )));
        }

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(request.sku),
            name: Set(request.name),
            unit_price: Set(request.unit_price),
            reorder_threshold: Set(request.reorder_threshold),
            shelf_life_days: Set(request.shelf_life_days),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(db).await?;
        info!(product_id = %created.id, sku = %created.sku, "Product registered");
        Ok(created)
    }

    /// Receives new supply into the warehouse as a fresh batch.
    #[instrument(skip(self, request), fields(batch_number = %request.batch_number))]
    pub async fn receive_batch(
        &self,
        request: ReceiveBatchRequest,
    ) -> Result<inventory_batch::Model, ServiceError> {
        request.validate()?;

        let db = &*self.db_pool;

        let product = ProductEntity::find_by_id(request.product_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", request.product_id))
            })?;

        let duplicate = InventoryBatchEntity::find()
            .filter(inventory_batch::Column::BatchNumber.eq(request.batch_number.clone()))
            .one(db)
            .await?;
        if duplicate.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "Batch number {} already exists",
                request.batch_number
            )));
        }

        let now = Utc::now();
        let batch = inventory_batch::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            batch_number: Set(request.batch_number),
            original_quantity: Set(request.quantity),
            current_quantity: Set(request.quantity),
            damaged_quantity: Set(0),
            manufacture_date: Set(request.manufacture_date),
            expiration_date: Set(request.expiration_date),
            supplier_id: Set(request.supplier_id),
            warehouse_id: Set(request.warehouse_id),
            received_at: Set(now),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = batch.insert(db).await?;

        info!(
            batch_id = %created.id,
            product_id = %created.product_id,
            quantity = created.original_quantity,
            "Batch received into inventory"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::BatchReceived {
                batch_id: created.id,
                product_id: created.product_id,
                quantity: created.original_quantity,
            })
            .await
        {
            warn!(batch_id = %created.id, error = %e, "Failed to send batch received event");
        }

        Ok(created)
    }

    /// Reserves quantity from a specific batch. See [`reserve_on`].
    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        product_id: Uuid,
        batch_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        reserve_on(&*self.db_pool, product_id, batch_id, quantity).await
    }

    /// Releases previously reserved quantity back to a batch. See [`release_on`].
    #[instrument(skip(self))]
    pub async fn release(&self, batch_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        release_on(&*self.db_pool, batch_id, quantity).await
    }

    /// Moves quantity from current stock to the damaged count.
    #[instrument(skip(self))]
    pub async fn mark_damaged(&self, batch_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        mark_damaged_on(&*self.db_pool, batch_id, quantity).await?;

        if let Err(e) = self
            .event_sender
            .send(Event::BatchDamaged {
                batch_id,
                quantity,
            })
            .await
        {
            warn!(batch_id = %batch_id, error = %e, "Failed to send batch damaged event");
        }
        Ok(())
    }

    /// Restocks quantity returned through a processed return. See [`restock_on`].
    #[instrument(skip(self))]
    pub async fn restock(&self, batch_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        restock_on(&*self.db_pool, batch_id, quantity).await
    }

    /// Read-only tracking snapshot of a batch by its human batch number.
    #[instrument(skip(self))]
    pub async fn track_batch(
        &self,
        batch_number: &str,
    ) -> Result<BatchTrackingResponse, ServiceError> {
        let db = &*self.db_pool;

        let batch = InventoryBatchEntity::find()
            .filter(inventory_batch::Column::BatchNumber.eq(batch_number.to_string()))
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Batch {} not found", batch_number))
            })?;

        let allocations = BatchAllocationEntity::find()
            .filter(batch_allocation::Column::BatchId.eq(batch.id))
            .order_by_asc(batch_allocation::Column::AllocatedAt)
            .all(db)
            .await?;

        let package_ids: Vec<Uuid> = allocations.iter().map(|a| a.package_id).collect();
        let packages: HashMap<Uuid, String> = if package_ids.is_empty() {
            HashMap::new()
        } else {
            PackageEntity::find()
                .filter(package::Column::Id.is_in(package_ids))
                .all(db)
                .await?
                .into_iter()
                .map(|p| (p.id, p.package_code))
                .collect()
        };

        let mut allocated_outstanding = 0;
        let mut returned_total = 0;
        let breakdown = allocations
            .into_iter()
            .map(|a| {
                allocated_outstanding += a.quantity - a.returned_quantity;
                returned_total += a.returned_quantity;
                BatchAllocationBreakdown {
                    package_id: a.package_id,
                    package_code: packages
                        .get(&a.package_id)
                        .cloned()
                        .unwrap_or_default(),
                    product_id: a.product_id,
                    quantity: a.quantity,
                    returned_quantity: a.returned_quantity,
                }
            })
            .collect();

        Ok(BatchTrackingResponse {
            batch,
            allocations: breakdown,
            allocated_outstanding,
            returned_total,
        })
    }

    /// Current availability of a product across all of its batches.
    #[instrument(skip(self))]
    pub async fn product_availability(
        &self,
        product_id: Uuid,
    ) -> Result<ProductAvailability, ServiceError> {
        let db = &*self.db_pool;

        let product = ProductEntity::find_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let batches = InventoryBatchEntity::find()
            .filter(inventory_batch::Column::ProductId.eq(product_id))
            .order_by_asc(inventory_batch::Column::ExpirationDate)
            .order_by_asc(inventory_batch::Column::BatchNumber)
            .all(db)
            .await?;

        let total_available = batches.iter().map(|b| b.current_quantity).sum();
        let batches = batches
            .into_iter()
            .map(|b| BatchAvailability {
                batch_id: b.id,
                batch_number: b.batch_number,
                expiration_date: b.expiration_date,
                current_quantity: b.current_quantity,
            })
            .collect();

        Ok(ProductAvailability {
            product_id,
            total_available,
            reorder_threshold: product.reorder_threshold,
            batches,
        })
    }

    /// Lists batches with pagination and an optional product filter.
    #[instrument(skip(self))]
    pub async fn list_batches(
        &self,
        page: u64,
        limit: u64,
        product_id: Option<Uuid>,
    ) -> Result<(Vec<inventory_batch::Model>, u64), ServiceError> {
        let db = &*self.db_pool;

        let mut query = InventoryBatchEntity::find();
        if let Some(product_id) = product_id {
            query = query.filter(inventory_batch::Column::ProductId.eq(product_id));
        }

        let paginator = query
            .order_by_asc(inventory_batch::Column::ExpirationDate)
            .order_by_asc(inventory_batch::Column::BatchNumber)
            .paginate(db, limit);

        let total = paginator.num_items().await?;
        let batches = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((batches, total))
    }
}

/// Atomically decrements `current_quantity` of the named batch.
///
/// The decrement and its `current_quantity >= qty` guard are one UPDATE
/// statement, so concurrent reserves on the same batch can never jointly
/// overdraw it.
pub(crate) async fn reserve_on<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    batch_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "Reserve quantity must be positive".to_string(),
        ));
    }

    let result = InventoryBatchEntity::update_many()
        .col_expr(
            inventory_batch::Column::CurrentQuantity,
            Expr::col(inventory_batch::Column::CurrentQuantity).sub(quantity),
        )
        .col_expr(
            inventory_batch::Column::UpdatedAt,
            Expr::value(Utc::now()),
        )
        .filter(inventory_batch::Column::Id.eq(batch_id))
        .filter(inventory_batch::Column::ProductId.eq(product_id))
        .filter(inventory_batch::Column::CurrentQuantity.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 1 {
        return Ok(());
    }

    // The guard failed: distinguish a missing batch from a stock shortfall.
    let batch = InventoryBatchEntity::find_by_id(batch_id).one(conn).await?;
    match batch {
        Some(b) if b.product_id == product_id => Err(ServiceError::InsufficientStock(format!(
            "Batch {}: requested {}, available {}",
            b.batch_number, quantity, b.current_quantity
        ))),
        _ => Err(ServiceError::NotFound(format!(
            "Batch {} not found for product {}",
            batch_id, product_id
        ))),
    }
}

/// Returns previously reserved quantity to a batch, capped so current stock
/// never exceeds `original_quantity - damaged_quantity`.
pub(crate) async fn release_on<C: ConnectionTrait>(
    conn: &C,
    batch_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "Release quantity must be positive".to_string(),
        ));
    }

    for _ in 0..CAS_MAX_ATTEMPTS {
        let batch = InventoryBatchEntity::find_by_id(batch_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Batch {} not found", batch_id)))?;

        let cap = batch.original_quantity - batch.damaged_quantity;
        let new_current = (batch.current_quantity + quantity).min(cap);
        if new_current == batch.current_quantity {
            return Ok(());
        }

        let result = InventoryBatchEntity::update_many()
            .col_expr(
                inventory_batch::Column::CurrentQuantity,
                Expr::value(new_current),
            )
            .col_expr(
                inventory_batch::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(inventory_batch::Column::Id.eq(batch_id))
            .filter(inventory_batch::Column::CurrentQuantity.eq(batch.current_quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 1 {
            return Ok(());
        }
        // Lost the race against another writer; re-read and try again.
    }

    error!(batch_id = %batch_id, "Release retry limit reached");
    Err(ServiceError::InternalError(format!(
        "Batch {} is under heavy contention; release retry limit reached",
        batch_id
    )))
}

/// Moves quantity from current stock to the damaged count in one statement.
pub(crate) async fn mark_damaged_on<C: ConnectionTrait>(
    conn: &C,
    batch_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "Damaged quantity must be positive".to_string(),
        ));
    }

    let result = InventoryBatchEntity::update_many()
        .col_expr(
            inventory_batch::Column::CurrentQuantity,
            Expr::col(inventory_batch::Column::CurrentQuantity).sub(quantity),
        )
        .col_expr(
            inventory_batch::Column::DamagedQuantity,
            Expr::col(inventory_batch::Column::DamagedQuantity).add(quantity),
        )
        .col_expr(
            inventory_batch::Column::UpdatedAt,
            Expr::value(Utc::now()),
        )
        .filter(inventory_batch::Column::Id.eq(batch_id))
        .filter(inventory_batch::Column::CurrentQuantity.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 1 {
        return Ok(());
    }

    let batch = InventoryBatchEntity::find_by_id(batch_id).one(conn).await?;
    match batch {
        Some(b) => Err(ServiceError::InsufficientStock(format!(
            "Batch {}: cannot damage {}, only {} in stock",
            b.batch_number, quantity, b.current_quantity
        ))),
        None => Err(ServiceError::NotFound(format!(
            "Batch {} not found",
            batch_id
        ))),
    }
}

/// Increments `current_quantity` for goods restocked by a processed return.
///
/// Guarded against over-restock: the increment may never exceed the batch's
/// outstanding allocated-and-not-yet-returned total, tracked via its
/// allocation records.
pub(crate) async fn restock_on<C: ConnectionTrait>(
    conn: &C,
    batch_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "Restock quantity must be positive".to_string(),
        ));
    }

    for _ in 0..CAS_MAX_ATTEMPTS {
        let batch = InventoryBatchEntity::find_by_id(batch_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Batch {} not found", batch_id)))?;

        let allocations = BatchAllocationEntity::find()
            .filter(batch_allocation::Column::BatchId.eq(batch_id))
            .all(conn)
            .await?;
        let outstanding: i32 = allocations
            .iter()
            .map(|a| a.quantity - a.returned_quantity)
            .sum();

        if quantity > outstanding {
            return Err(ServiceError::OverRestock(format!(
                "Batch {}: cannot restock {}, only {} allocated and not yet returned",
                batch.batch_number, quantity, outstanding
            )));
        }

        let result = InventoryBatchEntity::update_many()
            .col_expr(
                inventory_batch::Column::CurrentQuantity,
                Expr::value(batch.current_quantity + quantity),
            )
            .col_expr(
                inventory_batch::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(inventory_batch::Column::Id.eq(batch_id))
            .filter(inventory_batch::Column::CurrentQuantity.eq(batch.current_quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 1 {
            return Ok(());
        }
    }

    error!(batch_id = %batch_id, "Restock retry limit reached");
    Err(ServiceError::InternalError(format!(
        "Batch {} is under heavy contention; restock retry limit reached",
        batch_id
    )))
}

/// Total available quantity of a product across batches, on any connection.
pub(crate) async fn availability_on<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<i32, ServiceError> {
    let batches = InventoryBatchEntity::find()
        .filter(inventory_batch::Column::ProductId.eq(product_id))
        .all(conn)
        .await?;
    Ok(batches.iter().map(|b| b.current_quantity).sum())
}
