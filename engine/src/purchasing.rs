//! Purchase orders and their receipt into stock batches

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use shared::{
    extended_cost, generate_po_number, validate_batch_number, validate_expiry, validate_quantity,
    validate_unit_cost, LineReceipt, NewBatch, NewPurchaseOrder, PoStatus, PurchaseOrder,
    PurchaseOrderDetail, PurchaseOrderId, PurchaseOrderLineId, PurchaseOrderRow, ReceiveLine,
    MAX_EXTENDED_COST,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::activity::{self, Action};
use crate::config::LedgerRules;
use crate::error::{check_field, LedgerError, LedgerResult};
use crate::ledger::{apply_receipt, lock_item};
use crate::store::LedgerStore;

/// Purchase order service
#[derive(Clone)]
pub struct PurchaseOrderService {
    store: Arc<dyn LedgerStore>,
    rules: LedgerRules,
}

impl PurchaseOrderService {
    pub fn new(store: Arc<dyn LedgerStore>, rules: LedgerRules) -> Self {
        Self { store, rules }
    }

    /// Create a pending purchase order
    #[instrument(skip(self, input), fields(supplier_id = input.supplier_id))]
    pub async fn create_purchase_order(
        &self,
        input: NewPurchaseOrder,
    ) -> LedgerResult<PurchaseOrderDetail> {
        if input.lines.is_empty() {
            return Err(LedgerError::validation(
                "lines",
                "A purchase order needs at least one line",
            ));
        }
        let mut total_cost = Decimal::ZERO;
        for line in &input.lines {
            check_field("ordered_qty", validate_quantity(line.ordered_qty))?;
            check_field("unit_cost", validate_unit_cost(line.unit_cost))?;
            let line_cost = extended_cost(line.ordered_qty, line.unit_cost)
                .map_err(|message| LedgerError::validation("ordered_qty", message))?;
            total_cost += line_cost;
            if total_cost > MAX_EXTENDED_COST {
                return Err(LedgerError::validation(
                    "lines",
                    "Order total exceeds the largest storable amount",
                ));
            }
        }
        if let Some(expected) = input.expected_delivery {
            if expected < input.po_date {
                return Err(LedgerError::validation(
                    "expected_delivery",
                    "Expected delivery cannot be before the order date",
                ));
            }
        }

        let po_number = input
            .po_number
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| generate_po_number(Utc::now()));

        let mut tx = self.store.begin().await?;

        if tx.po_number_exists(&po_number).await? {
            return Err(LedgerError::conflict(
                "po_number",
                format!("PO number '{}' already exists", po_number),
            ));
        }

        let supplier = tx
            .lock_supplier(input.supplier_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Supplier {}", input.supplier_id)))?;
        if !supplier.is_active {
            return Err(LedgerError::validation("supplier_id", "Supplier is inactive"));
        }

        for line in &input.lines {
            let item = lock_item(tx.as_mut(), line.item_id).await?;
            if !item.is_active {
                return Err(LedgerError::validation(
                    "item_id",
                    format!("Item {} is inactive", item.name),
                ));
            }
        }

        let detail = tx
            .insert_purchase_order(
                &PurchaseOrderRow {
                    po_number,
                    supplier_id: supplier.id,
                    po_date: input.po_date,
                    expected_delivery: input.expected_delivery,
                    total_cost,
                    notes: input.notes.clone(),
                    created_by: input.actor,
                },
                &input.lines,
            )
            .await?;

        tx.insert_activity(&activity::entry(
            input.actor,
            Action::CreatePurchaseOrder,
            format!(
                "Created purchase order {} for {}",
                detail.order.po_number, supplier.name
            ),
            json!({
                "purchase_order_id": detail.order.id,
                "lines": detail.lines.len(),
                "total_cost": total_cost,
            }),
        ))
        .await?;

        tx.commit().await?;

        info!(
            "Created purchase order {} with {} lines, total {}",
            detail.order.po_number,
            detail.lines.len(),
            total_cost
        );
        Ok(detail)
    }

    /// Move a purchase order along its lifecycle
    ///
    /// `received` is reached only through [`Self::receive_line`].
    #[instrument(skip(self))]
    pub async fn transition(
        &self,
        po_id: PurchaseOrderId,
        next: PoStatus,
        actor: Uuid,
    ) -> LedgerResult<PurchaseOrder> {
        let mut tx = self.store.begin().await?;

        let detail = tx
            .lock_purchase_order(po_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Purchase order {}", po_id)))?;
        let current = detail.order.status;
        if !current.can_transition_to(next) {
            return Err(LedgerError::InvalidStateTransition {
                from: current,
                to: next,
            });
        }

        tx.set_purchase_order_status(po_id, next).await?;
        tx.insert_activity(&activity::entry(
            actor,
            Action::UpdatePurchaseOrderStatus,
            format!(
                "Purchase order {}: {} -> {}",
                detail.order.po_number, current, next
            ),
            json!({ "purchase_order_id": po_id, "from": current, "to": next }),
        ))
        .await?;

        tx.commit().await?;

        info!("Purchase order {} moved {} -> {}", po_id, current, next);
        Ok(PurchaseOrder {
            status: next,
            ..detail.order
        })
    }

    /// Receive one line into a new batch
    ///
    /// Quantity defaults to what is still outstanding on the line. The order
    /// becomes `received` once every line is complete.
    #[instrument(skip(self, input), fields(batch_number = %input.batch_number))]
    pub async fn receive_line(
        &self,
        po_id: PurchaseOrderId,
        line_id: PurchaseOrderLineId,
        input: ReceiveLine,
    ) -> LedgerResult<LineReceipt> {
        let batch_number = input.batch_number.trim().to_string();
        check_field(
            "batch_number",
            validate_batch_number(&batch_number, self.rules.batch_number_min_len),
        )?;
        check_field(
            "expiry_date",
            validate_expiry(input.purchase_date, input.expiry_date),
        )?;
        if let Some(quantity) = input.quantity {
            check_field("quantity", validate_quantity(quantity))?;
        }

        let mut tx = self.store.begin().await?;

        let detail = tx
            .lock_purchase_order(po_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Purchase order {}", po_id)))?;
        if detail.order.status != PoStatus::Ordered {
            return Err(LedgerError::InvalidStateTransition {
                from: detail.order.status,
                to: PoStatus::Received,
            });
        }

        let line = detail
            .line(line_id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found(format!("Purchase order line {}", line_id)))?;
        let outstanding = line.outstanding_qty();
        if outstanding.is_zero() {
            return Err(LedgerError::conflict(
                "purchase_order_line",
                "Line is already fully received",
            ));
        }
        let quantity = input.quantity.unwrap_or(outstanding);
        if quantity > outstanding {
            return Err(LedgerError::validation(
                "quantity",
                format!("Only {} is outstanding on this line", outstanding),
            ));
        }

        let item = lock_item(tx.as_mut(), line.item_id).await?;
        if !item.is_active {
            return Err(LedgerError::validation(
                "item_id",
                "Cannot receive stock for an inactive item",
            ));
        }
        let receipt = apply_receipt(
            tx.as_mut(),
            &item,
            NewBatch {
                item_id: item.id,
                batch_number,
                quantity,
                unit_cost: line.unit_cost,
                purchase_date: input.purchase_date,
                expiry_date: input.expiry_date,
                supplier_id: Some(detail.order.supplier_id),
                purchase_order_id: Some(po_id),
                notes: input.notes.clone(),
            },
            input.actor,
        )
        .await?;

        tx.add_line_received(line_id, quantity).await?;

        let all_received = detail.lines.iter().all(|l| {
            if l.id == line_id {
                l.received_qty + quantity >= l.ordered_qty
            } else {
                l.is_fully_received()
            }
        });
        let status = if all_received {
            tx.set_purchase_order_status(po_id, PoStatus::Received)
                .await?;
            PoStatus::Received
        } else {
            detail.order.status
        };

        tx.insert_activity(&activity::entry(
            input.actor,
            Action::ReceivePurchaseOrderLine,
            format!(
                "Received {} {} of {} on {}",
                quantity, item.unit, item.name, detail.order.po_number
            ),
            json!({
                "purchase_order_id": po_id,
                "line_id": line_id,
                "batch_id": receipt.batch.id,
                "quantity": quantity,
            }),
        ))
        .await?;

        tx.commit().await?;

        info!(
            "Received {} on purchase order {} line {} into batch {}",
            quantity, po_id, line_id, receipt.batch.id
        );

        Ok(LineReceipt {
            purchase_order_id: po_id,
            line_id,
            batch_id: receipt.batch.id,
            transaction_id: receipt.transaction.id,
            quantity,
            status,
        })
    }

    /// Only pending orders can be deleted
    pub async fn delete_purchase_order(
        &self,
        po_id: PurchaseOrderId,
        actor: Uuid,
    ) -> LedgerResult<()> {
        let mut tx = self.store.begin().await?;

        let detail = tx
            .lock_purchase_order(po_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Purchase order {}", po_id)))?;
        if detail.order.status != PoStatus::Pending {
            return Err(LedgerError::conflict(
                "purchase_order",
                format!(
                    "Purchase order is {}; only pending orders can be deleted",
                    detail.order.status
                ),
            ));
        }

        tx.delete_purchase_order(po_id).await?;
        tx.insert_activity(&activity::entry(
            actor,
            Action::DeletePurchaseOrder,
            format!("Deleted purchase order {}", detail.order.po_number),
            json!({ "purchase_order_id": po_id }),
        ))
        .await?;

        tx.commit().await
    }

    pub async fn get_purchase_order(
        &self,
        po_id: PurchaseOrderId,
    ) -> LedgerResult<PurchaseOrderDetail> {
        self.store
            .purchase_order(po_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Purchase order {}", po_id)))
    }

    pub async fn list_purchase_orders(
        &self,
        status: Option<PoStatus>,
    ) -> LedgerResult<Vec<PurchaseOrder>> {
        self.store.purchase_orders(status).await
    }
}
