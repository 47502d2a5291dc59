//! Storage seam for the ledger
//!
//! [`LedgerStore`] serves plain reads and opens units of work.
//! [`LedgerTx`] is one unit of work: locked reads and writes that become
//! visible together on [`LedgerTx::commit`] and vanish if it is dropped.
//! Row locks taken through `lock_*` are held until the unit of work ends, so
//! two deductions against the same item are serialized.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::{
    ActivityEntry, Adjustment, Batch, BatchId, Category, CategoryId, Item, ItemId, ItemUpdate,
    NewActivity, NewAdjustment, NewBatch, NewCategory, NewItem, NewPurchaseOrderLine,
    NewSupplier, NewTransaction, PoStatus, PurchaseOrder, PurchaseOrderDetail, PurchaseOrderId,
    PurchaseOrderLineId, PurchaseOrderRow, StockTransaction, Supplier, SupplierId,
    SupplierUpdate, TransactionQuery,
};

use crate::error::LedgerResult;

/// Reads and unit-of-work factory
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a unit of work
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>>;

    async fn item(&self, id: ItemId) -> LedgerResult<Option<Item>>;

    async fn items(&self, active_only: bool) -> LedgerResult<Vec<Item>>;

    async fn categories(&self) -> LedgerResult<Vec<Category>>;

    async fn suppliers(&self, active_only: bool) -> LedgerResult<Vec<Supplier>>;

    async fn batch(&self, id: BatchId) -> LedgerResult<Option<Batch>>;

    /// Batches of one item, or of every item, in consumption order
    async fn batches(&self, item_id: Option<ItemId>) -> LedgerResult<Vec<Batch>>;

    /// Ties on `created_at` are ordered by id
    async fn transactions(&self, query: &TransactionQuery) -> LedgerResult<Vec<StockTransaction>>;

    /// Newest first
    async fn adjustments(&self, limit: i64) -> LedgerResult<Vec<Adjustment>>;

    async fn purchase_order(&self, id: PurchaseOrderId)
        -> LedgerResult<Option<PurchaseOrderDetail>>;

    /// Newest first
    async fn purchase_orders(&self, status: Option<PoStatus>) -> LedgerResult<Vec<PurchaseOrder>>;

    /// Newest first
    async fn activity(&self, limit: i64) -> LedgerResult<Vec<ActivityEntry>>;
}

/// One atomic unit of work
#[async_trait]
pub trait LedgerTx: Send {
    // Items
    /// Read an item and hold its row lock until the unit of work ends
    async fn lock_item(&mut self, id: ItemId) -> LedgerResult<Option<Item>>;

    async fn item_by_sku(&mut self, sku: &str) -> LedgerResult<Option<Item>>;

    /// `item` must already be normalized; `current_qty` starts at zero
    async fn insert_item(&mut self, item: &NewItem, category_id: Option<CategoryId>)
        -> LedgerResult<Item>;

    /// Writes master fields only; `current_qty` is untouched
    async fn update_item(
        &mut self,
        id: ItemId,
        update: &ItemUpdate,
        category_id: Option<Option<CategoryId>>,
    ) -> LedgerResult<Item>;

    async fn set_item_active(&mut self, id: ItemId, active: bool) -> LedgerResult<()>;

    /// The only writer of the derived quantity
    async fn set_item_quantity(&mut self, id: ItemId, quantity: Decimal) -> LedgerResult<()>;

    // Categories
    async fn category_by_name(&mut self, name: &str) -> LedgerResult<Option<Category>>;

    async fn insert_category(&mut self, category: &NewCategory) -> LedgerResult<Category>;

    async fn lock_category(&mut self, id: CategoryId) -> LedgerResult<Option<Category>>;

    /// Writes name and description as given
    async fn update_category(&mut self, category: &Category) -> LedgerResult<Category>;

    async fn items_in_category(&mut self, id: CategoryId) -> LedgerResult<i64>;

    /// Returns false when nothing was deleted
    async fn delete_category(&mut self, id: CategoryId) -> LedgerResult<bool>;

    // Suppliers
    async fn lock_supplier(&mut self, id: SupplierId) -> LedgerResult<Option<Supplier>>;

    async fn insert_supplier(&mut self, supplier: &NewSupplier) -> LedgerResult<Supplier>;

    async fn update_supplier(
        &mut self,
        id: SupplierId,
        update: &SupplierUpdate,
    ) -> LedgerResult<Supplier>;

    async fn set_supplier_active(&mut self, id: SupplierId, active: bool) -> LedgerResult<()>;

    /// Items, batches and purchase orders pointing at the supplier
    async fn supplier_references(&mut self, id: SupplierId) -> LedgerResult<i64>;

    async fn delete_supplier(&mut self, id: SupplierId) -> LedgerResult<bool>;

    // Batches
    async fn batch_number_exists(&mut self, item_id: ItemId, batch_number: &str)
        -> LedgerResult<bool>;

    async fn insert_batch(&mut self, batch: &NewBatch) -> LedgerResult<Batch>;

    /// Read a batch and hold its row lock
    async fn lock_batch(&mut self, id: BatchId) -> LedgerResult<Option<Batch>>;

    /// Active batches with stock left, locked, in consumption order
    async fn lock_consumable_batches(&mut self, item_id: ItemId) -> LedgerResult<Vec<Batch>>;

    async fn set_batch_remaining(&mut self, id: BatchId, remaining: Decimal) -> LedgerResult<()>;

    /// Σ remaining over the item's active batches, as seen inside this unit of work
    async fn active_batch_total(&mut self, item_id: ItemId) -> LedgerResult<Decimal>;

    // Ledger
    async fn insert_transaction(&mut self, txn: &NewTransaction)
        -> LedgerResult<StockTransaction>;

    async fn insert_adjustment(&mut self, adjustment: &NewAdjustment)
        -> LedgerResult<Adjustment>;

    // Purchase orders
    async fn lock_purchase_order(
        &mut self,
        id: PurchaseOrderId,
    ) -> LedgerResult<Option<PurchaseOrderDetail>>;

    async fn po_number_exists(&mut self, po_number: &str) -> LedgerResult<bool>;

    async fn insert_purchase_order(
        &mut self,
        header: &PurchaseOrderRow,
        lines: &[NewPurchaseOrderLine],
    ) -> LedgerResult<PurchaseOrderDetail>;

    async fn set_purchase_order_status(
        &mut self,
        id: PurchaseOrderId,
        status: PoStatus,
    ) -> LedgerResult<()>;

    async fn add_line_received(
        &mut self,
        line_id: PurchaseOrderLineId,
        quantity: Decimal,
    ) -> LedgerResult<()>;

    async fn delete_purchase_order(&mut self, id: PurchaseOrderId) -> LedgerResult<bool>;

    // Audit trail
    async fn insert_activity(&mut self, entry: &NewActivity) -> LedgerResult<()>;

    /// Make every write visible atomically
    async fn commit(self: Box<Self>) -> LedgerResult<()>;
}
