//! Ledger transaction and adjustment models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AdjustmentId, BatchId, ItemId, PurchaseOrderId, TransactionId};

/// Kind of stock-affecting operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "stock_transaction_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Receive,
    Deduct,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Receive => "receive",
            TransactionType::Deduct => "deduct",
            TransactionType::Adjustment => "adjustment",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only ledger entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockTransaction {
    pub id: TransactionId,
    pub item_id: ItemId,
    pub batch_id: Option<BatchId>,
    pub transaction_type: TransactionType,
    /// Signed: positive for receipts, negative for deductions and losses
    pub quantity_change: Decimal,
    /// Item `current_qty` immediately after this entry
    pub new_balance: Decimal,
    pub unit_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    /// Module or purpose that consumed the stock
    pub module_reference: Option<String>,
    pub adjustment_id: Option<AdjustmentId>,
    pub purchase_order_id: Option<PurchaseOrderId>,
    pub actor: Uuid,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Row written by storage when a ledger entry is appended
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub item_id: ItemId,
    pub batch_id: Option<BatchId>,
    pub transaction_type: TransactionType,
    pub quantity_change: Decimal,
    pub new_balance: Decimal,
    pub unit_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub module_reference: Option<String>,
    pub adjustment_id: Option<AdjustmentId>,
    pub purchase_order_id: Option<PurchaseOrderId>,
    pub actor: Uuid,
    pub notes: Option<String>,
}

/// Input for a stock deduction
///
/// Draws FIFO across the item's batches unless `batch_id` names the one
/// batch to take from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeductStock {
    pub item_id: ItemId,
    #[serde(default)]
    pub batch_id: Option<BatchId>,
    pub quantity: Decimal,
    /// Consuming module or purpose, e.g. "biofloc"
    #[serde(alias = "purpose", alias = "module_name")]
    pub module_reference: String,
    pub actor: Uuid,
    pub notes: Option<String>,
}

/// Reason code for a stock loss
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "adjustment_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    Damage,
    Wastage,
    Theft,
    Correction,
    Other,
}

impl AdjustmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentType::Damage => "damage",
            AdjustmentType::Wastage => "wastage",
            AdjustmentType::Theft => "theft",
            AdjustmentType::Correction => "correction",
            AdjustmentType::Other => "other",
        }
    }
}

impl std::fmt::Display for AdjustmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorded stock loss. Adjustments only ever reduce stock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Adjustment {
    pub id: AdjustmentId,
    pub item_id: ItemId,
    /// `None` when the loss was not attributed to a specific batch
    pub batch_id: Option<BatchId>,
    pub adjustment_type: AdjustmentType,
    pub quantity: Decimal,
    pub old_qty: Decimal,
    pub new_qty: Decimal,
    pub reason: String,
    pub reference_id: Option<String>,
    pub adjustment_date: NaiveDate,
    pub actor: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Row written by storage when an adjustment is recorded
#[derive(Debug, Clone)]
pub struct NewAdjustment {
    pub item_id: ItemId,
    pub batch_id: Option<BatchId>,
    pub adjustment_type: AdjustmentType,
    pub quantity: Decimal,
    pub old_qty: Decimal,
    pub new_qty: Decimal,
    pub reason: String,
    pub reference_id: Option<String>,
    pub adjustment_date: NaiveDate,
    pub actor: Uuid,
}

/// Input for recording a loss
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustStock {
    pub item_id: ItemId,
    pub batch_id: Option<BatchId>,
    pub adjustment_type: AdjustmentType,
    pub quantity: Decimal,
    pub reason: String,
    pub reference_id: Option<String>,
    /// Defaults to today
    pub adjustment_date: Option<NaiveDate>,
    pub actor: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_type_serde_names() {
        for (t, name) in [
            (TransactionType::Receive, "\"receive\""),
            (TransactionType::Deduct, "\"deduct\""),
            (TransactionType::Adjustment, "\"adjustment\""),
        ] {
            assert_eq!(serde_json::to_string(&t).unwrap(), name);
        }
    }

    #[test]
    fn test_adjustment_type_parses_from_snake_case() {
        let t: AdjustmentType = serde_json::from_str("\"wastage\"").unwrap();
        assert_eq!(t, AdjustmentType::Wastage);
        assert!(serde_json::from_str::<AdjustmentType>("\"gift\"").is_err());
    }

    #[test]
    fn test_deduct_accepts_purpose_alias() {
        let json = format!(
            r#"{{"item_id": 42, "quantity": "5", "purpose": "biofloc", "actor": "{}"}}"#,
            Uuid::nil()
        );
        let req: DeductStock = serde_json::from_str(&json).unwrap();
        assert_eq!(req.module_reference, "biofloc");
        assert_eq!(req.batch_id, None);
    }
}
