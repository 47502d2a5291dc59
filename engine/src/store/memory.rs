//! In-process ledger storage
//!
//! Units of work run against a private copy of the state while holding the
//! store-wide lock, then swap it in on commit. Dropping a unit of work
//! discards the copy, so nothing partial is ever visible.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use shared::{
    ActivityEntry, Adjustment, Batch, BatchId, Category, CategoryId, Item, ItemId, ItemUpdate,
    NewActivity, NewAdjustment, NewBatch, NewCategory, NewItem, NewPurchaseOrderLine,
    NewSupplier, NewTransaction, PoStatus, PurchaseOrder, PurchaseOrderDetail, PurchaseOrderId,
    PurchaseOrderLine, PurchaseOrderLineId, PurchaseOrderRow, StockTransaction, Supplier,
    SupplierId, SupplierUpdate, TransactionQuery,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{LedgerStore, LedgerTx};
use crate::error::{LedgerError, LedgerResult};
use crate::fifo::consumption_order;

#[derive(Debug, Clone, Default)]
struct Sequences {
    item: i64,
    category: i64,
    supplier: i64,
    batch: i64,
    transaction: i64,
    adjustment: i64,
    purchase_order: i64,
    po_line: i64,
    activity: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    seq: Sequences,
    items: BTreeMap<ItemId, Item>,
    categories: BTreeMap<CategoryId, Category>,
    suppliers: BTreeMap<SupplierId, Supplier>,
    batches: BTreeMap<BatchId, Batch>,
    transactions: Vec<StockTransaction>,
    adjustments: Vec<Adjustment>,
    purchase_orders: BTreeMap<PurchaseOrderId, PurchaseOrder>,
    po_lines: BTreeMap<PurchaseOrderLineId, PurchaseOrderLine>,
    activity: Vec<ActivityEntry>,
}

impl MemoryState {
    fn po_detail(&self, id: PurchaseOrderId) -> Option<PurchaseOrderDetail> {
        let order = self.purchase_orders.get(&id)?.clone();
        let lines = self
            .po_lines
            .values()
            .filter(|l| l.purchase_order_id == id)
            .cloned()
            .collect();
        Some(PurchaseOrderDetail { order, lines })
    }
}

/// Ledger storage held in process memory
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    lock_timeout: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl MemoryStore {
    /// `lock_timeout` bounds how long a caller waits for another unit of work
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            lock_timeout,
        }
    }

    async fn acquire(&self) -> LedgerResult<OwnedMutexGuard<MemoryState>> {
        tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| LedgerError::Timeout("timed out waiting for the ledger lock".into()))
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>> {
        let guard = self.acquire().await?;
        let working = (*guard).clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn item(&self, id: ItemId) -> LedgerResult<Option<Item>> {
        Ok(self.acquire().await?.items.get(&id).cloned())
    }

    async fn items(&self, active_only: bool) -> LedgerResult<Vec<Item>> {
        let state = self.acquire().await?;
        let mut items: Vec<Item> = state
            .items
            .values()
            .filter(|i| !active_only || i.is_active)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn categories(&self) -> LedgerResult<Vec<Category>> {
        let state = self.acquire().await?;
        let mut categories: Vec<Category> = state.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn suppliers(&self, active_only: bool) -> LedgerResult<Vec<Supplier>> {
        let state = self.acquire().await?;
        let mut suppliers: Vec<Supplier> = state
            .suppliers
            .values()
            .filter(|s| !active_only || s.is_active)
            .cloned()
            .collect();
        suppliers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(suppliers)
    }

    async fn batch(&self, id: BatchId) -> LedgerResult<Option<Batch>> {
        Ok(self.acquire().await?.batches.get(&id).cloned())
    }

    async fn batches(&self, item_id: Option<ItemId>) -> LedgerResult<Vec<Batch>> {
        let state = self.acquire().await?;
        let mut batches: Vec<Batch> = state
            .batches
            .values()
            .filter(|b| item_id.map_or(true, |id| b.item_id == id))
            .cloned()
            .collect();
        batches.sort_by(|a, b| a.item_id.cmp(&b.item_id).then_with(|| consumption_order(a, b)));
        Ok(batches)
    }

    async fn transactions(&self, query: &TransactionQuery) -> LedgerResult<Vec<StockTransaction>> {
        let state = self.acquire().await?;
        let mut txns: Vec<StockTransaction> = state
            .transactions
            .iter()
            .filter(|t| query.item_id.map_or(true, |id| t.item_id == id))
            .filter(|t| query.batch_id.map_or(true, |id| t.batch_id == Some(id)))
            .filter(|t| query.since.map_or(true, |d| t.created_at.date_naive() >= d))
            .cloned()
            .collect();

        txns.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if query.newest_first {
            txns.reverse();
        }
        if let Some(limit) = query.limit {
            txns.truncate(limit.max(0) as usize);
        }
        Ok(txns)
    }

    async fn adjustments(&self, limit: i64) -> LedgerResult<Vec<Adjustment>> {
        let state = self.acquire().await?;
        Ok(state
            .adjustments
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn purchase_order(
        &self,
        id: PurchaseOrderId,
    ) -> LedgerResult<Option<PurchaseOrderDetail>> {
        Ok(self.acquire().await?.po_detail(id))
    }

    async fn purchase_orders(&self, status: Option<PoStatus>) -> LedgerResult<Vec<PurchaseOrder>> {
        let state = self.acquire().await?;
        Ok(state
            .purchase_orders
            .values()
            .rev()
            .filter(|po| status.map_or(true, |s| po.status == s))
            .cloned()
            .collect())
    }

    async fn activity(&self, limit: i64) -> LedgerResult<Vec<ActivityEntry>> {
        let state = self.acquire().await?;
        Ok(state
            .activity
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

/// Unit of work over a private copy of the state
struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl MemoryTx {
    fn item_mut(&mut self, id: ItemId) -> LedgerResult<&mut Item> {
        self.working
            .items
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found("Item"))
    }

    fn supplier_mut(&mut self, id: SupplierId) -> LedgerResult<&mut Supplier> {
        self.working
            .suppliers
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found("Supplier"))
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_item(&mut self, id: ItemId) -> LedgerResult<Option<Item>> {
        Ok(self.working.items.get(&id).cloned())
    }

    async fn item_by_sku(&mut self, sku: &str) -> LedgerResult<Option<Item>> {
        Ok(self
            .working
            .items
            .values()
            .find(|i| i.sku == sku)
            .cloned())
    }

    async fn insert_item(
        &mut self,
        item: &NewItem,
        category_id: Option<CategoryId>,
    ) -> LedgerResult<Item> {
        if self.working.items.values().any(|i| i.sku == item.sku) {
            return Err(LedgerError::conflict("items_sku_key", "SKU already exists"));
        }
        let now = Utc::now();
        let created = Item {
            id: next(&mut self.working.seq.item),
            name: item.name.clone(),
            sku: item.sku.clone(),
            category_id,
            unit: item.unit.clone(),
            reorder_threshold: item.reorder_threshold,
            minimum_stock_level: item.minimum_stock_level,
            is_active: true,
            default_supplier_id: item.default_supplier_id,
            current_qty: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        };
        self.working.items.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_item(
        &mut self,
        id: ItemId,
        update: &ItemUpdate,
        category_id: Option<Option<CategoryId>>,
    ) -> LedgerResult<Item> {
        let item = self.item_mut(id)?;
        if let Some(name) = &update.name {
            item.name = name.clone();
        }
        if let Some(unit) = &update.unit {
            item.unit = unit.clone();
        }
        if let Some(threshold) = update.reorder_threshold {
            item.reorder_threshold = threshold;
        }
        if let Some(minimum) = update.minimum_stock_level {
            item.minimum_stock_level = minimum;
        }
        if let Some(supplier_id) = update.default_supplier_id {
            item.default_supplier_id = Some(supplier_id);
        }
        if let Some(category_id) = category_id {
            item.category_id = category_id;
        }
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn set_item_active(&mut self, id: ItemId, active: bool) -> LedgerResult<()> {
        let item = self.item_mut(id)?;
        item.is_active = active;
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn set_item_quantity(&mut self, id: ItemId, quantity: Decimal) -> LedgerResult<()> {
        let item = self.item_mut(id)?;
        item.current_qty = quantity;
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn category_by_name(&mut self, name: &str) -> LedgerResult<Option<Category>> {
        Ok(self
            .working
            .categories
            .values()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn insert_category(&mut self, category: &NewCategory) -> LedgerResult<Category> {
        if self
            .working
            .categories
            .values()
            .any(|c| c.name.eq_ignore_ascii_case(&category.name))
        {
            return Err(LedgerError::conflict(
                "categories_name_key",
                "Category already exists",
            ));
        }
        let created = Category {
            id: next(&mut self.working.seq.category),
            name: category.name.clone(),
            description: category.description.clone(),
            created_at: Utc::now(),
        };
        self.working.categories.insert(created.id, created.clone());
        Ok(created)
    }

    async fn lock_category(&mut self, id: CategoryId) -> LedgerResult<Option<Category>> {
        Ok(self.working.categories.get(&id).cloned())
    }

    async fn update_category(&mut self, category: &Category) -> LedgerResult<Category> {
        if self
            .working
            .categories
            .values()
            .any(|c| c.id != category.id && c.name.eq_ignore_ascii_case(&category.name))
        {
            return Err(LedgerError::conflict(
                "categories_name_key",
                "Category already exists",
            ));
        }
        let stored = self
            .working
            .categories
            .get_mut(&category.id)
            .ok_or_else(|| LedgerError::not_found(format!("Category {}", category.id)))?;
        stored.name = category.name.clone();
        stored.description = category.description.clone();
        Ok(stored.clone())
    }

    async fn items_in_category(&mut self, id: CategoryId) -> LedgerResult<i64> {
        Ok(self
            .working
            .items
            .values()
            .filter(|i| i.category_id == Some(id))
            .count() as i64)
    }

    async fn delete_category(&mut self, id: CategoryId) -> LedgerResult<bool> {
        Ok(self.working.categories.remove(&id).is_some())
    }

    async fn lock_supplier(&mut self, id: SupplierId) -> LedgerResult<Option<Supplier>> {
        Ok(self.working.suppliers.get(&id).cloned())
    }

    async fn insert_supplier(&mut self, supplier: &NewSupplier) -> LedgerResult<Supplier> {
        let now = Utc::now();
        let created = Supplier {
            id: next(&mut self.working.seq.supplier),
            name: supplier.name.clone(),
            contact_person: supplier.contact_person.clone(),
            phone: supplier.phone.clone(),
            email: supplier.email.clone(),
            address: supplier.address.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.working.suppliers.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_supplier(
        &mut self,
        id: SupplierId,
        update: &SupplierUpdate,
    ) -> LedgerResult<Supplier> {
        let supplier = self.supplier_mut(id)?;
        if let Some(name) = &update.name {
            supplier.name = name.clone();
        }
        if update.contact_person.is_some() {
            supplier.contact_person = update.contact_person.clone();
        }
        if update.phone.is_some() {
            supplier.phone = update.phone.clone();
        }
        if update.email.is_some() {
            supplier.email = update.email.clone();
        }
        if update.address.is_some() {
            supplier.address = update.address.clone();
        }
        supplier.updated_at = Utc::now();
        Ok(supplier.clone())
    }

    async fn set_supplier_active(&mut self, id: SupplierId, active: bool) -> LedgerResult<()> {
        let supplier = self.supplier_mut(id)?;
        supplier.is_active = active;
        supplier.updated_at = Utc::now();
        Ok(())
    }

    async fn supplier_references(&mut self, id: SupplierId) -> LedgerResult<i64> {
        let state = &self.working;
        let items = state
            .items
            .values()
            .filter(|i| i.default_supplier_id == Some(id))
            .count();
        let batches = state
            .batches
            .values()
            .filter(|b| b.supplier_id == Some(id))
            .count();
        let orders = state
            .purchase_orders
            .values()
            .filter(|po| po.supplier_id == id)
            .count();
        Ok((items + batches + orders) as i64)
    }

    async fn delete_supplier(&mut self, id: SupplierId) -> LedgerResult<bool> {
        Ok(self.working.suppliers.remove(&id).is_some())
    }

    async fn batch_number_exists(
        &mut self,
        item_id: ItemId,
        batch_number: &str,
    ) -> LedgerResult<bool> {
        Ok(self
            .working
            .batches
            .values()
            .any(|b| b.item_id == item_id && b.batch_number == batch_number))
    }

    async fn insert_batch(&mut self, batch: &NewBatch) -> LedgerResult<Batch> {
        if self
            .batch_number_exists(batch.item_id, &batch.batch_number)
            .await?
        {
            return Err(LedgerError::DuplicateBatchNumber {
                item_id: batch.item_id,
                batch_number: batch.batch_number.clone(),
            });
        }
        let created = Batch {
            id: next(&mut self.working.seq.batch),
            item_id: batch.item_id,
            batch_number: batch.batch_number.clone(),
            quantity_received: batch.quantity,
            remaining_qty: batch.quantity,
            unit_cost: batch.unit_cost,
            purchase_date: batch.purchase_date,
            expiry_date: batch.expiry_date,
            supplier_id: batch.supplier_id,
            purchase_order_id: batch.purchase_order_id,
            is_active: true,
            notes: batch.notes.clone(),
            created_at: Utc::now(),
        };
        self.working.batches.insert(created.id, created.clone());
        Ok(created)
    }

    async fn lock_batch(&mut self, id: BatchId) -> LedgerResult<Option<Batch>> {
        Ok(self.working.batches.get(&id).cloned())
    }

    async fn lock_consumable_batches(&mut self, item_id: ItemId) -> LedgerResult<Vec<Batch>> {
        let mut batches: Vec<Batch> = self
            .working
            .batches
            .values()
            .filter(|b| b.item_id == item_id && b.is_consumable())
            .cloned()
            .collect();
        batches.sort_by(consumption_order);
        Ok(batches)
    }

    async fn set_batch_remaining(&mut self, id: BatchId, remaining: Decimal) -> LedgerResult<()> {
        let batch = self
            .working
            .batches
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found("Batch"))?;
        batch.remaining_qty = remaining;
        Ok(())
    }

    async fn active_batch_total(&mut self, item_id: ItemId) -> LedgerResult<Decimal> {
        Ok(self
            .working
            .batches
            .values()
            .filter(|b| b.item_id == item_id && b.is_active)
            .map(|b| b.remaining_qty)
            .sum())
    }

    async fn insert_transaction(
        &mut self,
        txn: &NewTransaction,
    ) -> LedgerResult<StockTransaction> {
        let created = StockTransaction {
            id: next(&mut self.working.seq.transaction),
            item_id: txn.item_id,
            batch_id: txn.batch_id,
            transaction_type: txn.transaction_type,
            quantity_change: txn.quantity_change,
            new_balance: txn.new_balance,
            unit_cost: txn.unit_cost,
            total_cost: txn.total_cost,
            module_reference: txn.module_reference.clone(),
            adjustment_id: txn.adjustment_id,
            purchase_order_id: txn.purchase_order_id,
            actor: txn.actor,
            notes: txn.notes.clone(),
            created_at: Utc::now(),
        };
        self.working.transactions.push(created.clone());
        Ok(created)
    }

    async fn insert_adjustment(&mut self, adjustment: &NewAdjustment) -> LedgerResult<Adjustment> {
        let created = Adjustment {
            id: next(&mut self.working.seq.adjustment),
            item_id: adjustment.item_id,
            batch_id: adjustment.batch_id,
            adjustment_type: adjustment.adjustment_type,
            quantity: adjustment.quantity,
            old_qty: adjustment.old_qty,
            new_qty: adjustment.new_qty,
            reason: adjustment.reason.clone(),
            reference_id: adjustment.reference_id.clone(),
            adjustment_date: adjustment.adjustment_date,
            actor: adjustment.actor,
            created_at: Utc::now(),
        };
        self.working.adjustments.push(created.clone());
        Ok(created)
    }

    async fn lock_purchase_order(
        &mut self,
        id: PurchaseOrderId,
    ) -> LedgerResult<Option<PurchaseOrderDetail>> {
        Ok(self.working.po_detail(id))
    }

    async fn po_number_exists(&mut self, po_number: &str) -> LedgerResult<bool> {
        Ok(self
            .working
            .purchase_orders
            .values()
            .any(|po| po.po_number == po_number))
    }

    async fn insert_purchase_order(
        &mut self,
        header: &PurchaseOrderRow,
        lines: &[NewPurchaseOrderLine],
    ) -> LedgerResult<PurchaseOrderDetail> {
        if self.po_number_exists(&header.po_number).await? {
            return Err(LedgerError::conflict(
                "purchase_orders_po_number_key",
                "PO number already exists",
            ));
        }
        let now = Utc::now();
        let id = next(&mut self.working.seq.purchase_order);
        self.working.purchase_orders.insert(
            id,
            PurchaseOrder {
                id,
                po_number: header.po_number.clone(),
                supplier_id: header.supplier_id,
                po_date: header.po_date,
                expected_delivery: header.expected_delivery,
                status: PoStatus::Pending,
                total_cost: header.total_cost,
                notes: header.notes.clone(),
                created_by: header.created_by,
                created_at: now,
                updated_at: now,
            },
        );
        for line in lines {
            let line_id = next(&mut self.working.seq.po_line);
            self.working.po_lines.insert(
                line_id,
                PurchaseOrderLine {
                    id: line_id,
                    purchase_order_id: id,
                    item_id: line.item_id,
                    ordered_qty: line.ordered_qty,
                    received_qty: Decimal::ZERO,
                    unit_cost: line.unit_cost,
                },
            );
        }
        self.working
            .po_detail(id)
            .ok_or_else(|| LedgerError::not_found("Purchase order"))
    }

    async fn set_purchase_order_status(
        &mut self,
        id: PurchaseOrderId,
        status: PoStatus,
    ) -> LedgerResult<()> {
        let po = self
            .working
            .purchase_orders
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found("Purchase order"))?;
        po.status = status;
        po.updated_at = Utc::now();
        Ok(())
    }

    async fn add_line_received(
        &mut self,
        line_id: PurchaseOrderLineId,
        quantity: Decimal,
    ) -> LedgerResult<()> {
        let line = self
            .working
            .po_lines
            .get_mut(&line_id)
            .ok_or_else(|| LedgerError::not_found("Purchase order line"))?;
        line.received_qty += quantity;
        Ok(())
    }

    async fn delete_purchase_order(&mut self, id: PurchaseOrderId) -> LedgerResult<bool> {
        let removed = self.working.purchase_orders.remove(&id).is_some();
        self.working.po_lines.retain(|_, l| l.purchase_order_id != id);
        Ok(removed)
    }

    async fn insert_activity(&mut self, entry: &NewActivity) -> LedgerResult<()> {
        let id = next(&mut self.working.seq.activity);
        self.working.activity.push(ActivityEntry {
            id,
            actor: entry.actor,
            action: entry.action.clone(),
            module_key: entry.module_key.clone(),
            description: entry.description.clone(),
            metadata: entry.metadata.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
