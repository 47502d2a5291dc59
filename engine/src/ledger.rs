//! Stock ledger: receipt, FIFO deduction and loss adjustment
//!
//! Every mutation runs in one unit of work that first locks the item row,
//! checks that the item's recorded quantity still equals what its active
//! batches hold, applies the batch changes, appends ledger rows and finally
//! rewrites the item quantity from the batches it just changed. Any failure
//! drops the unit of work and nothing is applied.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::{
    checked_balance, extended_cost, normalize_module_reference, validate_adjustment_reason,
    validate_batch_number, validate_expiry, validate_module_reference, validate_not_future,
    validate_quantity, validate_unit_cost, AdjustStock, AdjustmentId, Batch, BatchId, DeductStock,
    Item, ItemId, NewAdjustment, NewBatch, NewTransaction, ReceiveBatch, StockStatus,
    StockTransaction, TransactionId, TransactionQuery, TransactionType,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::activity::{self, Action};
use crate::config::LedgerRules;
use crate::error::{check_field, LedgerError, LedgerResult};
use crate::fifo::{self, Allocation};
use crate::store::{LedgerStore, LedgerTx};

/// Result of a stock receipt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptOutcome {
    pub item_id: ItemId,
    pub batch_id: BatchId,
    pub transaction_id: TransactionId,
    pub new_balance: Decimal,
}

/// Result of a FIFO deduction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeductionOutcome {
    pub item_id: ItemId,
    pub module_reference: String,
    pub allocations: Vec<Allocation>,
    pub total_quantity: Decimal,
    pub total_cost: Decimal,
    pub weighted_average_cost: Decimal,
    /// Item quantity after the deduction
    pub remaining_stock: Decimal,
    /// One per batch touched, in consumption order
    pub transaction_ids: Vec<TransactionId>,
}

/// Result of a loss adjustment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdjustmentOutcome {
    pub adjustment_id: AdjustmentId,
    pub item_id: ItemId,
    pub batch_id: Option<BatchId>,
    pub quantity: Decimal,
    /// Batch quantity for a targeted adjustment, item quantity otherwise
    pub old_qty: Decimal,
    pub new_qty: Decimal,
    pub total_cost: Decimal,
    pub remaining_stock: Decimal,
    pub transaction_ids: Vec<TransactionId>,
}

/// Stock held in one batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchBalance {
    pub batch_id: BatchId,
    pub batch_number: String,
    pub remaining_qty: Decimal,
    pub unit_cost: Decimal,
    pub purchase_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
}

impl From<&Batch> for BatchBalance {
    fn from(batch: &Batch) -> Self {
        Self {
            batch_id: batch.id,
            batch_number: batch.batch_number.clone(),
            remaining_qty: batch.remaining_qty,
            unit_cost: batch.unit_cost,
            purchase_date: batch.purchase_date,
            expiry_date: batch.expiry_date,
        }
    }
}

/// Current stock of one item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockLevel {
    pub item_id: ItemId,
    pub name: String,
    pub sku: String,
    pub unit: String,
    pub current_qty: Decimal,
    pub reorder_threshold: Decimal,
    pub minimum_stock_level: Decimal,
    pub status: StockStatus,
    pub is_low: bool,
    /// Batches that still hold stock, in consumption order
    pub batches: Vec<BatchBalance>,
}

/// A batch and every ledger row that touched it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchLifecycle {
    pub batch: Batch,
    pub item_name: String,
    pub transactions: Vec<StockTransaction>,
    pub consumed_qty: Decimal,
    /// Σ quantity changes equals the batch's remaining quantity
    pub reconciles: bool,
}

/// Replay of an item's ledger against its stored state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerAudit {
    pub item_id: ItemId,
    pub recorded_qty: Decimal,
    pub batch_total: Decimal,
    pub replayed_qty: Decimal,
    pub last_recorded_balance: Decimal,
    pub transaction_count: usize,
    /// Rows whose `new_balance` differs from the running sum at that point
    pub balance_breaks: Vec<TransactionId>,
    pub is_consistent: bool,
}

/// A receipt applied inside a unit of work
pub(crate) struct AppliedReceipt {
    pub batch: Batch,
    pub transaction: StockTransaction,
}

/// Stock ledger service
#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn LedgerStore>,
    rules: LedgerRules,
}

impl StockLedger {
    pub fn new(store: Arc<dyn LedgerStore>, rules: LedgerRules) -> Self {
        Self { store, rules }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn rules(&self) -> &LedgerRules {
        &self.rules
    }

    /// Receive a new batch of stock
    #[instrument(
        skip(self, input),
        fields(item_id = input.item_id, batch_number = %input.batch_number)
    )]
    pub async fn receive_batch(&self, input: ReceiveBatch) -> LedgerResult<ReceiptOutcome> {
        let batch_number = input.batch_number.trim().to_string();
        check_field(
            "batch_number",
            validate_batch_number(&batch_number, self.rules.batch_number_min_len),
        )?;
        check_field("quantity", validate_quantity(input.quantity))?;
        check_field("unit_cost", validate_unit_cost(input.unit_cost))?;
        check_field(
            "quantity",
            extended_cost(input.quantity, input.unit_cost).map(|_| ()),
        )?;
        check_field(
            "expiry_date",
            validate_expiry(input.purchase_date, input.expiry_date),
        )?;

        let mut tx = self.store.begin().await?;

        let item = lock_item(tx.as_mut(), input.item_id).await?;
        if !item.is_active {
            return Err(LedgerError::validation(
                "item_id",
                "Cannot receive stock for an inactive item",
            ));
        }

        if let Some(supplier_id) = input.supplier_id {
            let supplier = tx
                .lock_supplier(supplier_id)
                .await?
                .ok_or_else(|| LedgerError::not_found(format!("Supplier {}", supplier_id)))?;
            if !supplier.is_active {
                return Err(LedgerError::validation(
                    "supplier_id",
                    "Supplier is inactive",
                ));
            }
        }

        let receipt = apply_receipt(
            tx.as_mut(),
            &item,
            NewBatch {
                item_id: item.id,
                batch_number,
                quantity: input.quantity,
                unit_cost: input.unit_cost,
                purchase_date: input.purchase_date,
                expiry_date: input.expiry_date,
                supplier_id: input.supplier_id,
                purchase_order_id: None,
                notes: input.notes.clone(),
            },
            input.actor,
        )
        .await?;

        tx.insert_activity(&activity::entry(
            input.actor,
            Action::ReceiveStock,
            format!(
                "Received {} {} of {} (batch {})",
                input.quantity, item.unit, item.name, receipt.batch.batch_number
            ),
            json!({
                "item_id": item.id,
                "batch_id": receipt.batch.id,
                "quantity": input.quantity,
                "unit_cost": input.unit_cost,
            }),
        ))
        .await?;

        tx.commit().await?;

        info!(
            "Received {} into batch {} of item {}, balance {}",
            input.quantity, receipt.batch.id, item.id, receipt.transaction.new_balance
        );

        Ok(ReceiptOutcome {
            item_id: item.id,
            batch_id: receipt.batch.id,
            transaction_id: receipt.transaction.id,
            new_balance: receipt.transaction.new_balance,
        })
    }

    /// Withdraw stock oldest batch first, or from the one batch named in
    /// the input
    ///
    /// All or nothing: when the batches cannot cover the request the call
    /// fails with [`LedgerError::InsufficientStock`] and nothing changes.
    #[instrument(
        skip(self, input),
        fields(item_id = input.item_id, batch_id = ?input.batch_id, quantity = %input.quantity)
    )]
    pub async fn deduct_fifo(&self, input: DeductStock) -> LedgerResult<DeductionOutcome> {
        check_field("quantity", validate_quantity(input.quantity))?;
        check_field(
            "module_reference",
            validate_module_reference(&input.module_reference),
        )?;
        let module_reference = normalize_module_reference(&input.module_reference);

        let mut tx = self.store.begin().await?;

        let item = lock_item(tx.as_mut(), input.item_id).await?;
        ensure_in_sync(tx.as_mut(), &item).await?;

        let batches = match input.batch_id {
            Some(batch_id) => vec![lock_item_batch(tx.as_mut(), &item, batch_id).await?],
            None => tx.lock_consumable_batches(item.id).await?,
        };
        let plan = fifo::plan(&batches, input.quantity).map_err(|shortfall| {
            LedgerError::InsufficientStock {
                item_id: item.id,
                requested: shortfall.requested,
                available: shortfall.available,
            }
        })?;

        let mut balance = item.current_qty;
        let mut transaction_ids = Vec::with_capacity(plan.allocations.len());

        for alloc in &plan.allocations {
            tx.set_batch_remaining(alloc.batch_id, alloc.remaining_after)
                .await?;
            balance -= alloc.quantity;

            let txn = tx
                .insert_transaction(&NewTransaction {
                    item_id: item.id,
                    batch_id: Some(alloc.batch_id),
                    transaction_type: TransactionType::Deduct,
                    quantity_change: -alloc.quantity,
                    new_balance: balance,
                    unit_cost: Some(alloc.unit_cost),
                    total_cost: Some(alloc.cost),
                    module_reference: Some(module_reference.clone()),
                    adjustment_id: None,
                    purchase_order_id: None,
                    actor: input.actor,
                    notes: input.notes.clone(),
                })
                .await?;
            transaction_ids.push(txn.id);
        }

        write_item_quantity(tx.as_mut(), item.id, balance).await?;

        let weighted_average_cost = plan.weighted_average_cost();
        tx.insert_activity(&activity::entry(
            input.actor,
            Action::UseStock,
            format!(
                "Used {} {} of {} for {}",
                input.quantity, item.unit, item.name, module_reference
            ),
            json!({
                "item_id": item.id,
                "quantity": input.quantity,
                "module_reference": module_reference,
                "batch_id": input.batch_id,
                "total_cost": plan.total_cost,
                "batches": plan.allocations.len(),
            }),
        ))
        .await?;

        tx.commit().await?;

        info!(
            "Deducted {} of item {} across {} batches for {}, cost {}",
            plan.total_quantity,
            item.id,
            plan.allocations.len(),
            module_reference,
            plan.total_cost
        );

        Ok(DeductionOutcome {
            item_id: item.id,
            module_reference,
            total_quantity: plan.total_quantity,
            total_cost: plan.total_cost,
            weighted_average_cost,
            allocations: plan.allocations,
            remaining_stock: balance,
            transaction_ids,
        })
    }

    /// Record a loss against one batch, or against the item's batches in
    /// FIFO order when no batch is given
    #[instrument(skip(self, input), fields(item_id = input.item_id, batch_id = ?input.batch_id))]
    pub async fn log_adjustment(&self, input: AdjustStock) -> LedgerResult<AdjustmentOutcome> {
        check_field("quantity", validate_quantity(input.quantity))?;
        check_field(
            "reason",
            validate_adjustment_reason(&input.reason, self.rules.adjustment_reason_min_len),
        )?;
        let today = Utc::now().date_naive();
        let adjustment_date = input.adjustment_date.unwrap_or(today);
        check_field("adjustment_date", validate_not_future(adjustment_date, today))?;
        let reason = input.reason.trim().to_string();
        let reference_id = input
            .reference_id
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        let mut tx = self.store.begin().await?;

        let item = lock_item(tx.as_mut(), input.item_id).await?;
        ensure_in_sync(tx.as_mut(), &item).await?;

        let mut balance = item.current_qty;
        let mut transaction_ids = Vec::new();
        let mut total_cost = Decimal::ZERO;

        let (adjustment, old_qty, new_qty) = match input.batch_id {
            Some(batch_id) => {
                let batch = lock_item_batch(tx.as_mut(), &item, batch_id).await?;
                if input.quantity > batch.remaining_qty {
                    return Err(LedgerError::AdjustmentExceedsStock {
                        requested: input.quantity,
                        available: batch.remaining_qty,
                    });
                }

                let remaining = batch.remaining_qty - input.quantity;
                let adjustment = tx
                    .insert_adjustment(&NewAdjustment {
                        item_id: item.id,
                        batch_id: Some(batch.id),
                        adjustment_type: input.adjustment_type,
                        quantity: input.quantity,
                        old_qty: batch.remaining_qty,
                        new_qty: remaining,
                        reason: reason.clone(),
                        reference_id: reference_id.clone(),
                        adjustment_date,
                        actor: input.actor,
                    })
                    .await?;

                tx.set_batch_remaining(batch.id, remaining).await?;
                balance -= input.quantity;
                let cost = input.quantity * batch.unit_cost;
                total_cost += cost;

                let txn = tx
                    .insert_transaction(&NewTransaction {
                        item_id: item.id,
                        batch_id: Some(batch.id),
                        transaction_type: TransactionType::Adjustment,
                        quantity_change: -input.quantity,
                        new_balance: balance,
                        unit_cost: Some(batch.unit_cost),
                        total_cost: Some(cost),
                        module_reference: None,
                        adjustment_id: Some(adjustment.id),
                        purchase_order_id: None,
                        actor: input.actor,
                        notes: Some(reason.clone()),
                    })
                    .await?;
                transaction_ids.push(txn.id);

                (adjustment, batch.remaining_qty, remaining)
            }
            None => {
                let batches = tx.lock_consumable_batches(item.id).await?;
                let plan = fifo::plan(&batches, input.quantity).map_err(|shortfall| {
                    LedgerError::AdjustmentExceedsStock {
                        requested: shortfall.requested,
                        available: shortfall.available,
                    }
                })?;

                let new_qty = item.current_qty - input.quantity;
                let adjustment = tx
                    .insert_adjustment(&NewAdjustment {
                        item_id: item.id,
                        batch_id: None,
                        adjustment_type: input.adjustment_type,
                        quantity: input.quantity,
                        old_qty: item.current_qty,
                        new_qty,
                        reason: reason.clone(),
                        reference_id: reference_id.clone(),
                        adjustment_date,
                        actor: input.actor,
                    })
                    .await?;

                for alloc in &plan.allocations {
                    tx.set_batch_remaining(alloc.batch_id, alloc.remaining_after)
                        .await?;
                    balance -= alloc.quantity;

                    let txn = tx
                        .insert_transaction(&NewTransaction {
                            item_id: item.id,
                            batch_id: Some(alloc.batch_id),
                            transaction_type: TransactionType::Adjustment,
                            quantity_change: -alloc.quantity,
                            new_balance: balance,
                            unit_cost: Some(alloc.unit_cost),
                            total_cost: Some(alloc.cost),
                            module_reference: None,
                            adjustment_id: Some(adjustment.id),
                            purchase_order_id: None,
                            actor: input.actor,
                            notes: Some(reason.clone()),
                        })
                        .await?;
                    transaction_ids.push(txn.id);
                }
                total_cost = plan.total_cost;

                (adjustment, item.current_qty, new_qty)
            }
        };

        write_item_quantity(tx.as_mut(), item.id, balance).await?;

        tx.insert_activity(&activity::entry(
            input.actor,
            Action::Adjustment,
            format!(
                "Adjusted {} {} of {} ({})",
                input.quantity, item.unit, item.name, input.adjustment_type
            ),
            json!({
                "item_id": item.id,
                "batch_id": input.batch_id,
                "adjustment_id": adjustment.id,
                "adjustment_type": input.adjustment_type,
                "quantity": input.quantity,
                "reason": reason,
            }),
        ))
        .await?;

        tx.commit().await?;

        info!(
            "Adjustment {} removed {} of item {} ({}), balance {}",
            adjustment.id, input.quantity, item.id, input.adjustment_type, balance
        );

        Ok(AdjustmentOutcome {
            adjustment_id: adjustment.id,
            item_id: item.id,
            batch_id: input.batch_id,
            quantity: input.quantity,
            old_qty,
            new_qty,
            total_cost,
            remaining_stock: balance,
            transaction_ids,
        })
    }

    /// Current quantity, thresholds and the batches holding stock
    pub async fn stock_level(&self, item_id: ItemId) -> LedgerResult<StockLevel> {
        let item = self
            .store
            .item(item_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Item {}", item_id)))?;
        let batches = self.store.batches(Some(item_id)).await?;

        let status = item.stock_status();
        Ok(StockLevel {
            item_id: item.id,
            is_low: status != StockStatus::Ok,
            status,
            batches: batches
                .iter()
                .filter(|b| b.is_consumable())
                .map(BatchBalance::from)
                .collect(),
            name: item.name,
            sku: item.sku,
            unit: item.unit,
            current_qty: item.current_qty,
            reorder_threshold: item.reorder_threshold,
            minimum_stock_level: item.minimum_stock_level,
        })
    }

    /// Receipt details of a batch plus every ledger row against it, oldest first
    pub async fn batch_lifecycle(&self, batch_id: BatchId) -> LedgerResult<BatchLifecycle> {
        let batch = self
            .store
            .batch(batch_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Batch {}", batch_id)))?;
        let item = self
            .store
            .item(batch.item_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Item {}", batch.item_id)))?;
        let transactions = self
            .store
            .transactions(&TransactionQuery::for_batch(batch_id))
            .await?;

        let net: Decimal = transactions.iter().map(|t| t.quantity_change).sum();
        Ok(BatchLifecycle {
            consumed_qty: batch.consumed_qty(),
            reconciles: net == batch.remaining_qty,
            item_name: item.name,
            transactions,
            batch,
        })
    }

    /// Replay an item's ledger and compare it with the stored quantities
    pub async fn audit_item(&self, item_id: ItemId) -> LedgerResult<LedgerAudit> {
        let item = self
            .store
            .item(item_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Item {}", item_id)))?;
        let batches = self.store.batches(Some(item_id)).await?;
        let transactions = self
            .store
            .transactions(&TransactionQuery::replay(item_id))
            .await?;

        let batch_total: Decimal = batches
            .iter()
            .filter(|b| b.is_active)
            .map(|b| b.remaining_qty)
            .sum();

        let mut replayed = Decimal::ZERO;
        let mut balance_breaks = Vec::new();
        for txn in &transactions {
            replayed += txn.quantity_change;
            if txn.new_balance != replayed {
                balance_breaks.push(txn.id);
            }
        }
        let last_recorded_balance = transactions
            .last()
            .map(|t| t.new_balance)
            .unwrap_or(Decimal::ZERO);

        let is_consistent = balance_breaks.is_empty()
            && replayed == item.current_qty
            && batch_total == item.current_qty
            && last_recorded_balance == item.current_qty;
        if !is_consistent {
            warn!(
                "Ledger audit mismatch for item {}: recorded {}, batches {}, replayed {}",
                item.id, item.current_qty, batch_total, replayed
            );
        }

        Ok(LedgerAudit {
            item_id: item.id,
            recorded_qty: item.current_qty,
            batch_total,
            replayed_qty: replayed,
            last_recorded_balance,
            transaction_count: transactions.len(),
            balance_breaks,
            is_consistent,
        })
    }
}

pub(crate) async fn lock_item(tx: &mut dyn LedgerTx, item_id: ItemId) -> LedgerResult<Item> {
    tx.lock_item(item_id)
        .await?
        .ok_or_else(|| LedgerError::not_found(format!("Item {}", item_id)))
}

/// Lock one batch and check that it is an active batch of `item`
pub(crate) async fn lock_item_batch(
    tx: &mut dyn LedgerTx,
    item: &Item,
    batch_id: BatchId,
) -> LedgerResult<Batch> {
    let batch = tx
        .lock_batch(batch_id)
        .await?
        .ok_or_else(|| LedgerError::not_found(format!("Batch {}", batch_id)))?;
    if batch.item_id != item.id {
        return Err(LedgerError::validation(
            "batch_id",
            "Batch does not belong to this item",
        ));
    }
    if !batch.is_active {
        return Err(LedgerError::validation("batch_id", "Batch is inactive"));
    }
    Ok(batch)
}

/// Refuse to build on an item whose stored quantity has drifted from its batches
pub(crate) async fn ensure_in_sync(tx: &mut dyn LedgerTx, item: &Item) -> LedgerResult<()> {
    let batch_total = tx.active_batch_total(item.id).await?;
    if batch_total != item.current_qty {
        warn!(
            "Item {} records {} but its active batches hold {}",
            item.id, item.current_qty, batch_total
        );
        return Err(LedgerError::IntegrityViolation(format!(
            "item {} records quantity {} but its active batches hold {}",
            item.id, item.current_qty, batch_total
        )));
    }
    Ok(())
}

/// Derive the item quantity from its batches, checking it against the
/// balance the ledger rows were written with
pub(crate) async fn write_item_quantity(
    tx: &mut dyn LedgerTx,
    item_id: ItemId,
    expected: Decimal,
) -> LedgerResult<()> {
    let batch_total = tx.active_batch_total(item_id).await?;
    if batch_total != expected {
        return Err(LedgerError::IntegrityViolation(format!(
            "item {} batches hold {} after the update, ledger balance is {}",
            item_id, batch_total, expected
        )));
    }
    tx.set_item_quantity(item_id, batch_total).await
}

/// Create a batch and its receipt row for an item locked by the caller
///
/// Shared by direct receipt and purchase-order receipt.
pub(crate) async fn apply_receipt(
    tx: &mut dyn LedgerTx,
    item: &Item,
    batch: NewBatch,
    actor: Uuid,
) -> LedgerResult<AppliedReceipt> {
    ensure_in_sync(tx, item).await?;

    if tx
        .batch_number_exists(item.id, &batch.batch_number)
        .await?
    {
        return Err(LedgerError::DuplicateBatchNumber {
            item_id: item.id,
            batch_number: batch.batch_number,
        });
    }

    let total_cost = extended_cost(batch.quantity, batch.unit_cost)
        .map_err(|message| LedgerError::validation("quantity", message))?;
    let new_balance = checked_balance(item.current_qty, batch.quantity)
        .map_err(|message| LedgerError::validation("quantity", message))?;

    let created = tx.insert_batch(&batch).await?;

    write_item_quantity(tx, item.id, new_balance).await?;

    let transaction = tx
        .insert_transaction(&NewTransaction {
            item_id: item.id,
            batch_id: Some(created.id),
            transaction_type: TransactionType::Receive,
            quantity_change: created.quantity_received,
            new_balance,
            unit_cost: Some(created.unit_cost),
            total_cost: Some(total_cost),
            module_reference: None,
            adjustment_id: None,
            purchase_order_id: batch.purchase_order_id,
            actor,
            notes: batch.notes.clone(),
        })
        .await?;

    Ok(AppliedReceipt {
        batch: created,
        transaction,
    })
}
