//! FIFO allocation across stock batches
//!
//! Pure planning: given an item's batches and a requested quantity, decide
//! how much to take from each batch. Applying the plan is the ledger's job.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{Batch, BatchId};

/// Quantity taken from one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub batch_id: BatchId,
    pub batch_number: String,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    /// `quantity * unit_cost`
    pub cost: Decimal,
    /// What the batch holds after this allocation
    pub remaining_after: Decimal,
}

/// Allocation of a withdrawal across batches, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FifoPlan {
    pub allocations: Vec<Allocation>,
    pub total_quantity: Decimal,
    pub total_cost: Decimal,
}

impl FifoPlan {
    /// Total cost over total quantity, across every batch touched
    pub fn weighted_average_cost(&self) -> Decimal {
        if self.total_quantity.is_zero() {
            return Decimal::ZERO;
        }
        self.total_cost / self.total_quantity
    }
}

/// Not enough stock to cover the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub requested: Decimal,
    pub available: Decimal,
}

/// Consumption order: purchase date ascending, ties by batch id ascending
pub fn consumption_order(a: &Batch, b: &Batch) -> Ordering {
    a.purchase_date
        .cmp(&b.purchase_date)
        .then_with(|| a.id.cmp(&b.id))
}

/// Sum of what can be consumed right now
pub fn available_quantity(batches: &[Batch]) -> Decimal {
    batches
        .iter()
        .filter(|b| b.is_consumable())
        .map(|b| b.remaining_qty)
        .sum()
}

/// Plan a FIFO withdrawal of `quantity`
///
/// Inactive and empty batches are skipped. Either the whole quantity is
/// covered or a [`Shortfall`] is returned; there is no partial plan. The walk
/// stops at the batch that satisfies the request, so no zero-quantity
/// allocation is ever produced.
pub fn plan(batches: &[Batch], quantity: Decimal) -> Result<FifoPlan, Shortfall> {
    let mut eligible: Vec<&Batch> = batches.iter().filter(|b| b.is_consumable()).collect();
    eligible.sort_by(|a, b| consumption_order(a, b));

    let available: Decimal = eligible.iter().map(|b| b.remaining_qty).sum();
    if quantity > available {
        return Err(Shortfall {
            requested: quantity,
            available,
        });
    }

    let mut remaining_to_deduct = quantity;
    let mut allocations = Vec::new();
    let mut total_cost = Decimal::ZERO;

    for batch in eligible {
        if remaining_to_deduct <= Decimal::ZERO {
            break;
        }

        let to_take = remaining_to_deduct.min(batch.remaining_qty);
        let cost = to_take * batch.unit_cost;

        allocations.push(Allocation {
            batch_id: batch.id,
            batch_number: batch.batch_number.clone(),
            quantity: to_take,
            unit_cost: batch.unit_cost,
            cost,
            remaining_after: batch.remaining_qty - to_take,
        });

        total_cost += cost;
        remaining_to_deduct -= to_take;
    }

    Ok(FifoPlan {
        allocations,
        total_quantity: quantity,
        total_cost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use proptest::prelude::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn batch(id: BatchId, day: u32, remaining: &str, cost: &str) -> Batch {
        Batch {
            id,
            item_id: 1,
            batch_number: format!("LOT-{:03}", id),
            quantity_received: dec(remaining),
            remaining_qty: dec(remaining),
            unit_cost: dec(cost),
            purchase_date: NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
            expiry_date: None,
            supplier_id: None,
            purchase_order_id: None,
            is_active: true,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_oldest_batch_consumed_first() {
        let batches = vec![batch(2, 10, "10", "8"), batch(1, 1, "10", "5")];
        let plan = plan(&batches, dec("15")).unwrap();

        assert_eq!(plan.allocations.len(), 2);
        assert_eq!(plan.allocations[0].batch_id, 1);
        assert_eq!(plan.allocations[0].quantity, dec("10"));
        assert_eq!(plan.allocations[1].batch_id, 2);
        assert_eq!(plan.allocations[1].quantity, dec("5"));
        assert_eq!(plan.total_cost, dec("90"));
        assert_eq!(plan.weighted_average_cost(), dec("6"));
    }

    #[test]
    fn test_same_date_ties_broken_by_id() {
        let batches = vec![batch(7, 3, "5", "9"), batch(4, 3, "5", "2")];
        let plan = plan(&batches, dec("6")).unwrap();
        assert_eq!(plan.allocations[0].batch_id, 4);
        assert_eq!(plan.allocations[1].batch_id, 7);
        assert_eq!(plan.allocations[1].quantity, dec("1"));
    }

    #[test]
    fn test_exact_fit_stops_without_zero_allocation() {
        let batches = vec![
            batch(1, 1, "10", "5"),
            batch(2, 2, "10", "6"),
            batch(3, 3, "10", "7"),
        ];
        let plan = plan(&batches, dec("20")).unwrap();
        assert_eq!(plan.allocations.len(), 2);
        assert!(plan.allocations.iter().all(|a| a.quantity > Decimal::ZERO));
        assert_eq!(plan.allocations[1].remaining_after, Decimal::ZERO);
    }

    #[test]
    fn test_empty_and_inactive_batches_skipped() {
        let mut inactive = batch(1, 1, "10", "1");
        inactive.is_active = false;
        let mut empty = batch(2, 2, "10", "2");
        empty.remaining_qty = Decimal::ZERO;
        let batches = vec![inactive, empty, batch(3, 3, "10", "3")];

        let plan = plan(&batches, dec("4")).unwrap();
        assert_eq!(plan.allocations.len(), 1);
        assert_eq!(plan.allocations[0].batch_id, 3);
    }

    #[test]
    fn test_shortfall_reports_available() {
        let batches = vec![batch(1, 1, "10", "5"), batch(2, 2, "5", "8")];
        let err = plan(&batches, dec("15.5")).unwrap_err();
        assert_eq!(err.requested, dec("15.5"));
        assert_eq!(err.available, dec("15"));
    }

    #[test]
    fn test_biofloc_scenario_weighted_average() {
        let batches = vec![batch(1, 1, "100", "5"), batch(2, 10, "50", "8")];
        let plan = plan(&batches, dec("120")).unwrap();
        assert_eq!(plan.total_cost, dec("660"));
        assert_eq!(plan.weighted_average_cost(), dec("5.5"));
        assert_eq!(plan.allocations[1].remaining_after, dec("30"));
    }

    fn batches_strategy() -> impl Strategy<Value = Vec<Batch>> {
        prop::collection::vec((1u32..=28, 1i64..=500, 1i64..=5000), 1..8).prop_map(|specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (day, qty, cost))| {
                    let mut b = batch(i as BatchId + 1, day, "1", "1");
                    b.quantity_received = Decimal::new(qty, 1);
                    b.remaining_qty = Decimal::new(qty, 1);
                    b.unit_cost = Decimal::new(cost, 2);
                    b
                })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Allocations always sum to the request and never overdraw a batch
        #[test]
        fn prop_allocations_cover_request(
            batches in batches_strategy(),
            fraction in 1u32..=100u32
        ) {
            let available = available_quantity(&batches);
            let requested = (available * Decimal::from(fraction) / Decimal::from(100)).round_dp(1);
            prop_assume!(requested > Decimal::ZERO);

            let plan = plan(&batches, requested).unwrap();
            let allocated: Decimal = plan.allocations.iter().map(|a| a.quantity).sum();
            prop_assert_eq!(allocated, requested);

            for alloc in &plan.allocations {
                let source = batches.iter().find(|b| b.id == alloc.batch_id).unwrap();
                prop_assert!(alloc.quantity > Decimal::ZERO);
                prop_assert!(alloc.quantity <= source.remaining_qty);
            }
        }

        /// A later batch is touched only after every earlier one is emptied
        #[test]
        fn prop_earlier_batches_drained_first(batches in batches_strategy()) {
            let available = available_quantity(&batches);
            let requested = (available / Decimal::from(2)).round_dp(1);
            prop_assume!(requested > Decimal::ZERO);

            let plan = plan(&batches, requested).unwrap();
            let (last, earlier) = plan.allocations.split_last().unwrap();
            prop_assert!(last.remaining_after >= Decimal::ZERO);
            for alloc in earlier {
                prop_assert_eq!(alloc.remaining_after, Decimal::ZERO);
            }
        }

        /// Weighted average lies between the cheapest and dearest batch used
        #[test]
        fn prop_weighted_average_bounded(batches in batches_strategy()) {
            let available = available_quantity(&batches);
            let plan = plan(&batches, available).unwrap();
            let min = plan.allocations.iter().map(|a| a.unit_cost).min().unwrap();
            let max = plan.allocations.iter().map(|a| a.unit_cost).max().unwrap();
            let avg = plan.weighted_average_cost();
            prop_assert!(avg >= min - dec("0.0000001"));
            prop_assert!(avg <= max + dec("0.0000001"));
        }

        #[test]
        fn prop_over_request_is_shortfall(batches in batches_strategy(), extra in 1i64..1000) {
            let available = available_quantity(&batches);
            let requested = available + Decimal::new(extra, 1);
            prop_assert!(plan(&batches, requested).is_err());
        }
    }
}
