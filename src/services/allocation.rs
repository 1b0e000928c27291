//! FEFO batch selection and the reservation unit that applies it.
//!
//! Planning is a pure function over a snapshot of a product's batches so the
//! pick order is reproducible: ascending expiration date, ties broken by
//! ascending batch number. Applying a plan goes through
//! [`ReservationTransaction`], which rolls back every already-applied
//! reservation (compensating release) if any later step fails, making a
//! multi-batch, multi-line allocation all-or-nothing without relying on
//! multi-row transaction support in the store.

use chrono::NaiveDate;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::inventory_batch::{self, Entity as InventoryBatchEntity};
use crate::errors::ServiceError;
use crate::services::inventory;

/// One planned reservation: this much from this batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationDraft {
    pub product_id: Uuid,
    pub batch_id: Uuid,
    pub batch_number: String,
    pub quantity: i32,
}

/// Snapshot of a batch as seen by the planner.
#[derive(Debug, Clone)]
pub struct BatchPick {
    pub batch_id: Uuid,
    pub batch_number: String,
    pub expiration_date: NaiveDate,
    pub available: i32,
}

impl From<&inventory_batch::Model> for BatchPick {
    fn from(batch: &inventory_batch::Model) -> Self {
        Self {
            batch_id: batch.id,
            batch_number: batch.batch_number.clone(),
            expiration_date: batch.expiration_date,
            available: batch.current_quantity,
        }
    }
}

/// Selects batches first-expiring-first-out until `requested` is satisfied.
///
/// Returns the ordered drafts, or `Err(total_available)` when the snapshot
/// cannot cover the request; in that case nothing is reserved anywhere.
pub fn plan_fefo(
    product_id: Uuid,
    batches: &[BatchPick],
    requested: i32,
) -> Result<Vec<AllocationDraft>, i32> {
    let mut picks: Vec<&BatchPick> = batches.iter().filter(|b| b.available > 0).collect();
    picks.sort_by(|a, b| {
        a.expiration_date
            .cmp(&b.expiration_date)
            .then_with(|| a.batch_number.cmp(&b.batch_number))
    });

    let total_available: i32 = picks.iter().map(|b| b.available).sum();
    if total_available < requested {
        return Err(total_available);
    }

    let mut drafts = Vec::new();
    let mut remaining = requested;
    for pick in picks {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(pick.available);
        drafts.push(AllocationDraft {
            product_id,
            batch_id: pick.batch_id,
            batch_number: pick.batch_number.clone(),
            quantity: take,
        });
        remaining -= take;
    }

    Ok(drafts)
}

/// Stateless facade over the planner, reading the batch snapshot from the
/// store.
pub struct BatchAllocator;

impl BatchAllocator {
    /// Plans a FEFO allocation for one order line.
    #[instrument(skip(conn))]
    pub async fn plan_for_product<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<Vec<AllocationDraft>, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Allocation quantity must be positive".to_string(),
            ));
        }

        let batches = InventoryBatchEntity::find()
            .filter(inventory_batch::Column::ProductId.eq(product_id))
            .filter(inventory_batch::Column::CurrentQuantity.gt(0))
            .order_by_asc(inventory_batch::Column::ExpirationDate)
            .order_by_asc(inventory_batch::Column::BatchNumber)
            .all(conn)
            .await?;

        let picks: Vec<BatchPick> = batches.iter().map(BatchPick::from).collect();

        plan_fefo(product_id, &picks, quantity).map_err(|available| {
            ServiceError::InsufficientStock(format!(
                "Product {}: requested {}, available {}",
                product_id, quantity, available
            ))
        })
    }
}

/// Collects applied reservations and compensates them as a unit.
///
/// Every successfully applied draft is remembered; `rollback` releases them
/// in reverse order. Dropping the transaction without `commit` does NOT
/// release anything — callers own the rollback decision explicitly.
pub struct ReservationTransaction<'a> {
    db: &'a DbPool,
    applied: Vec<AllocationDraft>,
}

impl<'a> ReservationTransaction<'a> {
    pub fn new(db: &'a DbPool) -> Self {
        Self {
            db,
            applied: Vec::new(),
        }
    }

    /// Applies one draft against the ledger and records it for compensation.
    pub async fn reserve(&mut self, draft: AllocationDraft) -> Result<(), ServiceError> {
        inventory::reserve_on(self.db, draft.product_id, draft.batch_id, draft.quantity).await?;
        self.applied.push(draft);
        Ok(())
    }

    /// Releases every applied reservation, most recent first.
    pub async fn rollback(&mut self) {
        while let Some(draft) = self.applied.pop() {
            if let Err(e) = inventory::release_on(self.db, draft.batch_id, draft.quantity).await {
                // Nothing sensible left to do but record it loudly.
                error!(
                    batch_id = %draft.batch_id,
                    quantity = draft.quantity,
                    error = %e,
                    "Failed to release reservation during rollback"
                );
            } else {
                warn!(
                    batch_id = %draft.batch_id,
                    quantity = draft.quantity,
                    "Rolled back reservation"
                );
            }
        }
    }

    /// Finalizes the unit and hands the applied drafts to the caller.
    pub fn commit(mut self) -> Vec<AllocationDraft> {
        std::mem::take(&mut self.applied)
    }

    pub fn applied(&self) -> &[AllocationDraft] {
        &self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn pick(batch_number: &str, exp: (i32, u32, u32), available: i32) -> BatchPick {
        BatchPick {
            batch_id: Uuid::new_v4(),
            batch_number: batch_number.to_string(),
            expiration_date: NaiveDate::from_ymd_opt(exp.0, exp.1, exp.2).unwrap(),
            available,
        }
    }

    #[test]
    fn fefo_prefers_the_soonest_expiry() {
        let product_id = Uuid::new_v4();
        let b1 = pick("B-001", (2025, 1, 1), 5);
        let b2 = pick("B-002", (2025, 2, 1), 5);
        // Deliberately out of order in the snapshot.
        let drafts = plan_fefo(product_id, &[b2.clone(), b1.clone()], 7).unwrap();

        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].batch_id, b1.batch_id);
        assert_eq!(drafts[0].quantity, 5);
        assert_eq!(drafts[1].batch_id, b2.batch_id);
        assert_eq!(drafts[1].quantity, 2);
    }

    #[test]
    fn fefo_breaks_expiry_ties_by_batch_number() {
        let product_id = Uuid::new_v4();
        let later = pick("LOT-B", (2025, 3, 1), 4);
        let earlier = pick("LOT-A", (2025, 3, 1), 4);
        let drafts = plan_fefo(product_id, &[later.clone(), earlier.clone()], 6).unwrap();

        assert_eq!(drafts[0].batch_number, "LOT-A");
        assert_eq!(drafts[0].quantity, 4);
        assert_eq!(drafts[1].batch_number, "LOT-B");
        assert_eq!(drafts[1].quantity, 2);
    }

    #[test]
    fn fefo_skips_empty_batches() {
        let product_id = Uuid::new_v4();
        let empty = pick("LOT-A", (2025, 1, 1), 0);
        let stocked = pick("LOT-B", (2025, 2, 1), 3);
        let drafts = plan_fefo(product_id, &[empty, stocked.clone()], 2).unwrap();

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].batch_id, stocked.batch_id);
        assert_eq!(drafts[0].quantity, 2);
    }

    #[test]
    fn fefo_reports_the_shortfall_without_partial_plans() {
        let product_id = Uuid::new_v4();
        let b1 = pick("LOT-A", (2025, 1, 1), 3);
        let b2 = pick("LOT-B", (2025, 2, 1), 2);
        let err = plan_fefo(product_id, &[b1, b2], 6).unwrap_err();
        assert_eq!(err, 5);
    }

    #[test]
    fn fefo_is_deterministic_for_the_same_snapshot() {
        let product_id = Uuid::new_v4();
        let batches = vec![
            pick("LOT-C", (2025, 5, 1), 4),
            pick("LOT-A", (2025, 4, 1), 2),
            pick("LOT-B", (2025, 4, 1), 6),
        ];
        let first = plan_fefo(product_id, &batches, 9).unwrap();
        let second = plan_fefo(product_id, &batches, 9).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.iter().map(|d| d.quantity).sum::<i32>(),
            9,
            "plan must cover the full request"
        );
    }
}
