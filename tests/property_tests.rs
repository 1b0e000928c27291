//! Property-based checks for the FEFO planner.

use chrono::NaiveDate;
use proptest::prelude::*;
use uuid::Uuid;
use warehouse_api::services::allocation::{plan_fefo, BatchPick};

fn arb_batch() -> impl Strategy<Value = BatchPick> {
    (0i64..720, 0i32..50, "[A-Z]{3}-[0-9]{4}").prop_map(|(day_offset, available, number)| {
        let base = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        BatchPick {
            batch_id: Uuid::new_v4(),
            batch_number: number,
            expiration_date: base + chrono::Duration::days(day_offset),
            available,
        }
    })
}

proptest! {
    /// A successful plan covers exactly the requested quantity, never takes
    /// more from a batch than it holds, and never picks an empty batch.
    #[test]
    fn plans_cover_the_request_exactly(
        batches in proptest::collection::vec(arb_batch(), 0..12),
        requested in 1i32..100,
    ) {
        match plan_fefo(Uuid::new_v4(), &batches, requested) {
            Ok(drafts) => {
                let picked: i32 = drafts.iter().map(|d| d.quantity).sum();
                prop_assert_eq!(picked, requested);

                for draft in &drafts {
                    let source = batches
                        .iter()
                        .find(|b| b.batch_id == draft.batch_id)
                        .expect("draft references a snapshot batch");
                    prop_assert!(draft.quantity >= 1);
                    prop_assert!(draft.quantity <= source.available);
                }

                // No batch appears twice.
                let mut ids: Vec<_> = drafts.iter().map(|d| d.batch_id).collect();
                ids.sort();
                ids.dedup();
                prop_assert_eq!(ids.len(), drafts.len());
            }
            Err(available) => {
                let total: i32 = batches.iter().filter(|b| b.available > 0).map(|b| b.available).sum();
                prop_assert_eq!(available, total);
                prop_assert!(total < requested);
            }
        }
    }

    /// Drafts come out ordered by (expiration date, batch number), and every
    /// draft except the last one drains its batch completely.
    #[test]
    fn plans_respect_fefo_order(
        batches in proptest::collection::vec(arb_batch(), 1..12),
        requested in 1i32..100,
    ) {
        if let Ok(drafts) = plan_fefo(Uuid::new_v4(), &batches, requested) {
            let keys: Vec<_> = drafts
                .iter()
                .map(|d| {
                    let b = batches.iter().find(|b| b.batch_id == d.batch_id).unwrap();
                    (b.expiration_date, b.batch_number.clone())
                })
                .collect();
            let mut sorted = keys.clone();
            sorted.sort();
            prop_assert_eq!(&keys, &sorted);

            for (i, draft) in drafts.iter().enumerate() {
                if i + 1 < drafts.len() {
                    let source = batches.iter().find(|b| b.batch_id == draft.batch_id).unwrap();
                    prop_assert_eq!(
                        draft.quantity, source.available,
                        "only the final pick may be partial"
                    );
                }
            }
        }
    }

    /// Planning is a pure function of the snapshot.
    #[test]
    fn plans_are_deterministic(
        batches in proptest::collection::vec(arb_batch(), 0..12),
        requested in 1i32..100,
    ) {
        let product_id = Uuid::new_v4();
        let first = plan_fefo(product_id, &batches, requested);
        let second = plan_fefo(product_id, &batches, requested);
        match (first, second) {
            (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
            (Err(a), Err(b)) => prop_assert_eq!(a, b),
            _ => prop_assert!(false, "determinism violated"),
        }
    }
}
