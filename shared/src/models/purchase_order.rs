//! Purchase order models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::{BatchId, ItemId, PurchaseOrderId, PurchaseOrderLineId, SupplierId};

/// Lifecycle of a purchase order
///
/// `pending → approved → ordered → received → closed`, or `pending → cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "purchase_order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PoStatus {
    Pending,
    Approved,
    Ordered,
    Received,
    Closed,
    Cancelled,
}

impl PoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoStatus::Pending => "pending",
            PoStatus::Approved => "approved",
            PoStatus::Ordered => "ordered",
            PoStatus::Received => "received",
            PoStatus::Closed => "closed",
            PoStatus::Cancelled => "cancelled",
        }
    }

    /// Edges an operator may request directly. `Received` is reached only
    /// by receiving every line.
    pub fn can_transition_to(&self, next: PoStatus) -> bool {
        matches!(
            (self, next),
            (PoStatus::Pending, PoStatus::Approved)
                | (PoStatus::Approved, PoStatus::Ordered)
                | (PoStatus::Pending, PoStatus::Cancelled)
                | (PoStatus::Received, PoStatus::Closed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PoStatus::Closed | PoStatus::Cancelled)
    }
}

impl std::fmt::Display for PoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown purchase order status '{0}'")]
pub struct ParseStatusError(pub String);

impl std::str::FromStr for PoStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(PoStatus::Pending),
            "approved" => Ok(PoStatus::Approved),
            "ordered" => Ok(PoStatus::Ordered),
            "received" => Ok(PoStatus::Received),
            "closed" => Ok(PoStatus::Closed),
            "cancelled" | "canceled" => Ok(PoStatus::Cancelled),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Purchase order header
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PurchaseOrder {
    pub id: PurchaseOrderId,
    pub po_number: String,
    pub supplier_id: SupplierId,
    pub po_date: NaiveDate,
    pub expected_delivery: Option<NaiveDate>,
    pub status: PoStatus,
    pub total_cost: Decimal,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of a purchase order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PurchaseOrderLine {
    pub id: PurchaseOrderLineId,
    pub purchase_order_id: PurchaseOrderId,
    pub item_id: ItemId,
    pub ordered_qty: Decimal,
    pub received_qty: Decimal,
    pub unit_cost: Decimal,
}

impl PurchaseOrderLine {
    pub fn outstanding_qty(&self) -> Decimal {
        (self.ordered_qty - self.received_qty).max(Decimal::ZERO)
    }

    pub fn is_fully_received(&self) -> bool {
        self.received_qty >= self.ordered_qty
    }

    pub fn line_total(&self) -> Decimal {
        self.ordered_qty * self.unit_cost
    }
}

/// Header plus lines
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseOrderDetail {
    pub order: PurchaseOrder,
    pub lines: Vec<PurchaseOrderLine>,
}

impl PurchaseOrderDetail {
    pub fn is_fully_received(&self) -> bool {
        self.lines.iter().all(PurchaseOrderLine::is_fully_received)
    }

    pub fn line(&self, line_id: PurchaseOrderLineId) -> Option<&PurchaseOrderLine> {
        self.lines.iter().find(|l| l.id == line_id)
    }
}

/// Input for creating a purchase order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPurchaseOrder {
    /// Generated when absent
    pub po_number: Option<String>,
    pub supplier_id: SupplierId,
    pub po_date: NaiveDate,
    pub expected_delivery: Option<NaiveDate>,
    pub notes: Option<String>,
    pub lines: Vec<NewPurchaseOrderLine>,
    pub actor: Uuid,
}

/// Input line for a new purchase order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPurchaseOrderLine {
    pub item_id: ItemId,
    pub ordered_qty: Decimal,
    pub unit_cost: Decimal,
}

/// Header row written by storage
#[derive(Debug, Clone)]
pub struct PurchaseOrderRow {
    pub po_number: String,
    pub supplier_id: SupplierId,
    pub po_date: NaiveDate,
    pub expected_delivery: Option<NaiveDate>,
    pub total_cost: Decimal,
    pub notes: Option<String>,
    pub created_by: Uuid,
}

/// Input for receiving one purchase order line into stock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveLine {
    pub batch_number: String,
    /// Defaults to the outstanding quantity
    pub quantity: Option<Decimal>,
    pub purchase_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub actor: Uuid,
}

/// Result of receiving a purchase order line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineReceipt {
    pub purchase_order_id: PurchaseOrderId,
    pub line_id: PurchaseOrderLineId,
    pub batch_id: BatchId,
    pub transaction_id: crate::types::TransactionId,
    pub quantity: Decimal,
    pub status: PoStatus,
}

/// Default purchase order number, e.g. `PO-20250112-093015`
pub fn generate_po_number(at: DateTime<Utc>) -> String {
    format!("PO-{}", at.format("%Y%m%d-%H%M%S"))
}
