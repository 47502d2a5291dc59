//! Stock batch (lot) models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{BatchId, ItemId, PurchaseOrderId, SupplierId};

/// A discrete quantity of an item received at one time at one unit cost
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Batch {
    pub id: BatchId,
    pub item_id: ItemId,
    /// Operator-supplied lot number, unique per item
    pub batch_number: String,
    pub quantity_received: Decimal,
    /// Never increases; floor 0
    pub remaining_qty: Decimal,
    /// Fixed at receipt
    pub unit_cost: Decimal,
    pub purchase_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub supplier_id: Option<SupplierId>,
    pub purchase_order_id: Option<PurchaseOrderId>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Batch {
    /// Active with stock left
    pub fn is_consumable(&self) -> bool {
        self.is_active && self.remaining_qty > Decimal::ZERO
    }

    /// Value of what is left in the batch
    pub fn remaining_value(&self) -> Decimal {
        self.remaining_qty * self.unit_cost
    }

    pub fn consumed_qty(&self) -> Decimal {
        self.quantity_received - self.remaining_qty
    }

    /// Calendar days from `today` until expiry; negative once expired
    pub fn days_until_expiry(&self, today: NaiveDate) -> Option<i64> {
        self.expiry_date.map(|expiry| (expiry - today).num_days())
    }
}

/// Input for receiving a new batch of stock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveBatch {
    pub item_id: ItemId,
    pub batch_number: String,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub purchase_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub supplier_id: Option<SupplierId>,
    pub notes: Option<String>,
    /// User performing the receipt
    pub actor: Uuid,
}

/// Row written by storage when a batch is created
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub item_id: ItemId,
    pub batch_number: String,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub purchase_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub supplier_id: Option<SupplierId>,
    pub purchase_order_id: Option<PurchaseOrderId>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(remaining: i64, expiry: Option<NaiveDate>) -> Batch {
        Batch {
            id: 1,
            item_id: 1,
            batch_number: "LOT-001".into(),
            quantity_received: Decimal::from(100),
            remaining_qty: Decimal::from(remaining),
            unit_cost: Decimal::from(5),
            purchase_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            expiry_date: expiry,
            supplier_id: None,
            purchase_order_id: None,
            is_active: true,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_remaining_value_and_consumed() {
        let b = batch(40, None);
        assert_eq!(b.remaining_value(), Decimal::from(200));
        assert_eq!(b.consumed_qty(), Decimal::from(60));
    }

    #[test]
    fn test_empty_batch_is_not_consumable() {
        assert!(!batch(0, None).is_consumable());
        assert!(batch(1, None).is_consumable());
    }

    #[test]
    fn test_days_until_expiry() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let b = batch(1, NaiveDate::from_ymd_opt(2025, 3, 8));
        assert_eq!(b.days_until_expiry(today), Some(7));

        let expired = batch(1, NaiveDate::from_ymd_opt(2025, 2, 27));
        assert_eq!(expired.days_until_expiry(today), Some(-2));

        assert_eq!(batch(1, None).days_until_expiry(today), None);
    }
}
