//! PostgreSQL ledger storage
//!
//! Each unit of work is one database transaction with `lock_timeout` and
//! `statement_timeout` set locally, so a blocked row lock surfaces as a
//! retryable timeout instead of hanging the caller.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::{
    ActivityEntry, Adjustment, Batch, BatchId, Category, CategoryId, Item, ItemId, ItemUpdate,
    NewActivity, NewAdjustment, NewBatch, NewCategory, NewItem, NewPurchaseOrderLine,
    NewSupplier, NewTransaction, PoStatus, PurchaseOrder, PurchaseOrderDetail, PurchaseOrderId,
    PurchaseOrderLine, PurchaseOrderLineId, PurchaseOrderRow, StockTransaction, Supplier,
    SupplierId, SupplierUpdate, TransactionQuery,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};

use super::{LedgerStore, LedgerTx};
use crate::config::{DatabaseConfig, StorageConfig};
use crate::error::{LedgerError, LedgerResult};

const ITEM_COLUMNS: &str = "id, name, sku, category_id, unit, reorder_threshold, \
    minimum_stock_level, is_active, default_supplier_id, current_qty, created_at, updated_at";

const SUPPLIER_COLUMNS: &str =
    "id, name, contact_person, phone, email, address, is_active, created_at, updated_at";

const BATCH_COLUMNS: &str = "id, item_id, batch_number, quantity_received, remaining_qty, \
    unit_cost, purchase_date, expiry_date, supplier_id, purchase_order_id, is_active, notes, \
    created_at";

const TRANSACTION_COLUMNS: &str = "id, item_id, batch_id, transaction_type, quantity_change, \
    new_balance, unit_cost, total_cost, module_reference, adjustment_id, purchase_order_id, \
    actor, notes, created_at";

const ADJUSTMENT_COLUMNS: &str = "id, item_id, batch_id, adjustment_type, quantity, old_qty, \
    new_qty, reason, reference_id, adjustment_date, actor, created_at";

const PO_COLUMNS: &str = "id, po_number, supplier_id, po_date, expected_delivery, status, \
    total_cost, notes, created_by, created_at, updated_at";

const PO_LINE_COLUMNS: &str =
    "id, purchase_order_id, item_id, ordered_qty, received_qty, unit_cost";

/// Ledger storage backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
    storage: StorageConfig,
}

impl PgStore {
    pub fn new(db: PgPool, storage: StorageConfig) -> Self {
        Self { db, storage }
    }

    /// Build a pool from configuration
    pub async fn connect(database: &DatabaseConfig, storage: StorageConfig) -> LedgerResult<Self> {
        let db = PgPoolOptions::new()
            .max_connections(database.max_connections)
            .min_connections(database.min_connections)
            .acquire_timeout(Duration::from_secs(database.acquire_timeout_secs))
            .connect(&database.url)
            .await?;
        Ok(Self::new(db, storage))
    }

    pub async fn migrate(&self) -> LedgerResult<()> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTx>> {
        let mut tx = self.db.begin().await?;

        // SET does not take bind parameters; both values are integers
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.storage.lock_timeout_ms
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = '{}ms'",
            self.storage.statement_timeout_ms
        ))
        .execute(&mut *tx)
        .await?;

        Ok(Box::new(PgTx { tx }))
    }

    async fn item(&self, id: ItemId) -> LedgerResult<Option<Item>> {
        let item = sqlx::query_as::<_, Item>(&format!(
            "SELECT {} FROM items WHERE id = $1",
            ITEM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(item)
    }

    async fn items(&self, active_only: bool) -> LedgerResult<Vec<Item>> {
        let items = sqlx::query_as::<_, Item>(&format!(
            "SELECT {} FROM items WHERE ($1 = FALSE OR is_active) ORDER BY name, id",
            ITEM_COLUMNS
        ))
        .bind(active_only)
        .fetch_all(&self.db)
        .await?;
        Ok(items)
    }

    async fn categories(&self) -> LedgerResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT id, name, description, created_at FROM categories ORDER BY name",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(categories)
    }

    async fn suppliers(&self, active_only: bool) -> LedgerResult<Vec<Supplier>> {
        let suppliers = sqlx::query_as::<_, Supplier>(&format!(
            "SELECT {} FROM suppliers WHERE ($1 = FALSE OR is_active) ORDER BY name",
            SUPPLIER_COLUMNS
        ))
        .bind(active_only)
        .fetch_all(&self.db)
        .await?;
        Ok(suppliers)
    }

    async fn batch(&self, id: BatchId) -> LedgerResult<Option<Batch>> {
        let batch = sqlx::query_as::<_, Batch>(&format!(
            "SELECT {} FROM batches WHERE id = $1",
            BATCH_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(batch)
    }

    async fn batches(&self, item_id: Option<ItemId>) -> LedgerResult<Vec<Batch>> {
        let batches = sqlx::query_as::<_, Batch>(&format!(
            r#"
            SELECT {}
            FROM batches
            WHERE ($1::BIGINT IS NULL OR item_id = $1)
            ORDER BY item_id, purchase_date, id
            "#,
            BATCH_COLUMNS
        ))
        .bind(item_id)
        .fetch_all(&self.db)
        .await?;
        Ok(batches)
    }

    async fn transactions(&self, query: &TransactionQuery) -> LedgerResult<Vec<StockTransaction>> {
        let direction = if query.newest_first { "DESC" } else { "ASC" };
        // LIMIT NULL is no limit
        let txns = sqlx::query_as::<_, StockTransaction>(&format!(
            r#"
            SELECT {columns}
            FROM transactions
            WHERE ($1::BIGINT IS NULL OR item_id = $1)
              AND ($2::BIGINT IS NULL OR batch_id = $2)
              AND ($3::DATE IS NULL OR created_at::date >= $3)
            ORDER BY created_at {dir}, id {dir}
            LIMIT $4
            "#,
            columns = TRANSACTION_COLUMNS,
            dir = direction
        ))
        .bind(query.item_id)
        .bind(query.batch_id)
        .bind(query.since)
        .bind(query.limit)
        .fetch_all(&self.db)
        .await?;
        Ok(txns)
    }

    async fn adjustments(&self, limit: i64) -> LedgerResult<Vec<Adjustment>> {
        let adjustments = sqlx::query_as::<_, Adjustment>(&format!(
            "SELECT {} FROM adjustments ORDER BY created_at DESC, id DESC LIMIT $1",
            ADJUSTMENT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(adjustments)
    }

    async fn purchase_order(
        &self,
        id: PurchaseOrderId,
    ) -> LedgerResult<Option<PurchaseOrderDetail>> {
        let order = sqlx::query_as::<_, PurchaseOrder>(&format!(
            "SELECT {} FROM purchase_orders WHERE id = $1",
            PO_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        let Some(order) = order else {
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, PurchaseOrderLine>(&format!(
            "SELECT {} FROM purchase_order_items WHERE purchase_order_id = $1 ORDER BY id",
            PO_LINE_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.db)
        .await?;

        Ok(Some(PurchaseOrderDetail { order, lines }))
    }

    async fn purchase_orders(&self, status: Option<PoStatus>) -> LedgerResult<Vec<PurchaseOrder>> {
        let orders = sqlx::query_as::<_, PurchaseOrder>(&format!(
            r#"
            SELECT {}
            FROM purchase_orders
            WHERE ($1::purchase_order_status IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            "#,
            PO_COLUMNS
        ))
        .bind(status)
        .fetch_all(&self.db)
        .await?;
        Ok(orders)
    }

    async fn activity(&self, limit: i64) -> LedgerResult<Vec<ActivityEntry>> {
        let entries = sqlx::query_as::<_, ActivityEntry>(
            r#"
            SELECT id, actor, action, module_key, description, metadata, created_at
            FROM activity_logs
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(entries)
    }
}

/// One database transaction
struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgTx {
    async fn lock_item(&mut self, id: ItemId) -> LedgerResult<Option<Item>> {
        let item = sqlx::query_as::<_, Item>(&format!(
            "SELECT {} FROM items WHERE id = $1 FOR UPDATE",
            ITEM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(item)
    }

    async fn item_by_sku(&mut self, sku: &str) -> LedgerResult<Option<Item>> {
        let item = sqlx::query_as::<_, Item>(&format!(
            "SELECT {} FROM items WHERE sku = $1",
            ITEM_COLUMNS
        ))
        .bind(sku)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(item)
    }

    async fn insert_item(
        &mut self,
        item: &NewItem,
        category_id: Option<CategoryId>,
    ) -> LedgerResult<Item> {
        let created = sqlx::query_as::<_, Item>(&format!(
            r#"
            INSERT INTO items (name, sku, category_id, unit, reorder_threshold,
                               minimum_stock_level, default_supplier_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            ITEM_COLUMNS
        ))
        .bind(&item.name)
        .bind(&item.sku)
        .bind(category_id)
        .bind(&item.unit)
        .bind(item.reorder_threshold)
        .bind(item.minimum_stock_level)
        .bind(item.default_supplier_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(created)
    }

    async fn update_item(
        &mut self,
        id: ItemId,
        update: &ItemUpdate,
        category_id: Option<Option<CategoryId>>,
    ) -> LedgerResult<Item> {
        let updated = sqlx::query_as::<_, Item>(&format!(
            r#"
            UPDATE items
            SET name = COALESCE($2, name),
                unit = COALESCE($3, unit),
                reorder_threshold = COALESCE($4, reorder_threshold),
                minimum_stock_level = COALESCE($5, minimum_stock_level),
                default_supplier_id = COALESCE($6, default_supplier_id),
                category_id = CASE WHEN $7 THEN $8 ELSE category_id END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            ITEM_COLUMNS
        ))
        .bind(id)
        .bind(&update.name)
        .bind(&update.unit)
        .bind(update.reorder_threshold)
        .bind(update.minimum_stock_level)
        .bind(update.default_supplier_id)
        .bind(category_id.is_some())
        .bind(category_id.flatten())
        .fetch_optional(&mut *self.tx)
        .await?;
        updated.ok_or_else(|| LedgerError::not_found("Item"))
    }

    async fn set_item_active(&mut self, id: ItemId, active: bool) -> LedgerResult<()> {
        sqlx::query("UPDATE items SET is_active = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn set_item_quantity(&mut self, id: ItemId, quantity: Decimal) -> LedgerResult<()> {
        sqlx::query("UPDATE items SET current_qty = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(quantity)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn category_by_name(&mut self, name: &str) -> LedgerResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            SELECT id, name, description, created_at
            FROM categories
            WHERE LOWER(name) = LOWER($1)
            "#,
        )
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(category)
    }

    async fn insert_category(&mut self, category: &NewCategory) -> LedgerResult<Category> {
        let created = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (name, description)
            VALUES ($1, $2)
            RETURNING id, name, description, created_at
            "#,
        )
        .bind(&category.name)
        .bind(&category.description)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(created)
    }

    async fn lock_category(&mut self, id: CategoryId) -> LedgerResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(
            "SELECT id, name, description, created_at FROM categories WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(category)
    }

    async fn update_category(&mut self, category: &Category) -> LedgerResult<Category> {
        let updated = sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories SET name = $2, description = $3
            WHERE id = $1
            RETURNING id, name, description, created_at
            "#,
        )
        .bind(category.id)
        .bind(&category.name)
        .bind(&category.description)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(updated)
    }

    async fn items_in_category(&mut self, id: CategoryId) -> LedgerResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE category_id = $1")
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count)
    }

    async fn delete_category(&mut self, id: CategoryId) -> LedgerResult<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn lock_supplier(&mut self, id: SupplierId) -> LedgerResult<Option<Supplier>> {
        let supplier = sqlx::query_as::<_, Supplier>(&format!(
            "SELECT {} FROM suppliers WHERE id = $1 FOR UPDATE",
            SUPPLIER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(supplier)
    }

    async fn insert_supplier(&mut self, supplier: &NewSupplier) -> LedgerResult<Supplier> {
        let created = sqlx::query_as::<_, Supplier>(&format!(
            r#"
            INSERT INTO suppliers (name, contact_person, phone, email, address)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            SUPPLIER_COLUMNS
        ))
        .bind(&supplier.name)
        .bind(&supplier.contact_person)
        .bind(&supplier.phone)
        .bind(&supplier.email)
        .bind(&supplier.address)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(created)
    }

    async fn update_supplier(
        &mut self,
        id: SupplierId,
        update: &SupplierUpdate,
    ) -> LedgerResult<Supplier> {
        let updated = sqlx::query_as::<_, Supplier>(&format!(
            r#"
            UPDATE suppliers
            SET name = COALESCE($2, name),
                contact_person = COALESCE($3, contact_person),
                phone = COALESCE($4, phone),
                email = COALESCE($5, email),
                address = COALESCE($6, address),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SUPPLIER_COLUMNS
        ))
        .bind(id)
        .bind(&update.name)
        .bind(&update.contact_person)
        .bind(&update.phone)
        .bind(&update.email)
        .bind(&update.address)
        .fetch_optional(&mut *self.tx)
        .await?;
        updated.ok_or_else(|| LedgerError::not_found("Supplier"))
    }

    async fn set_supplier_active(&mut self, id: SupplierId, active: bool) -> LedgerResult<()> {
        sqlx::query("UPDATE suppliers SET is_active = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn supplier_references(&mut self, id: SupplierId) -> LedgerResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT (SELECT COUNT(*) FROM items WHERE default_supplier_id = $1)
                 + (SELECT COUNT(*) FROM batches WHERE supplier_id = $1)
                 + (SELECT COUNT(*) FROM purchase_orders WHERE supplier_id = $1)
            "#,
        )
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn delete_supplier(&mut self, id: SupplierId) -> LedgerResult<bool> {
        let result = sqlx::query("DELETE FROM suppliers WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn batch_number_exists(
        &mut self,
        item_id: ItemId,
        batch_number: &str,
    ) -> LedgerResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM batches WHERE item_id = $1 AND batch_number = $2)",
        )
        .bind(item_id)
        .bind(batch_number)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn insert_batch(&mut self, batch: &NewBatch) -> LedgerResult<Batch> {
        let created = sqlx::query_as::<_, Batch>(&format!(
            r#"
            INSERT INTO batches (item_id, batch_number, quantity_received, remaining_qty,
                                 unit_cost, purchase_date, expiry_date, supplier_id,
                                 purchase_order_id, notes)
            VALUES ($1, $2, $3, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            BATCH_COLUMNS
        ))
        .bind(batch.item_id)
        .bind(&batch.batch_number)
        .bind(batch.quantity)
        .bind(batch.unit_cost)
        .bind(batch.purchase_date)
        .bind(batch.expiry_date)
        .bind(batch.supplier_id)
        .bind(batch.purchase_order_id)
        .bind(&batch.notes)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| match LedgerError::from_sqlx(e) {
            LedgerError::Conflict { .. } => LedgerError::DuplicateBatchNumber {
                item_id: batch.item_id,
                batch_number: batch.batch_number.clone(),
            },
            other => other,
        })?;
        Ok(created)
    }

    async fn lock_batch(&mut self, id: BatchId) -> LedgerResult<Option<Batch>> {
        let batch = sqlx::query_as::<_, Batch>(&format!(
            "SELECT {} FROM batches WHERE id = $1 FOR UPDATE",
            BATCH_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(batch)
    }

    async fn lock_consumable_batches(&mut self, item_id: ItemId) -> LedgerResult<Vec<Batch>> {
        let batches = sqlx::query_as::<_, Batch>(&format!(
            r#"
            SELECT {}
            FROM batches
            WHERE item_id = $1 AND is_active AND remaining_qty > 0
            ORDER BY purchase_date ASC, id ASC
            FOR UPDATE
            "#,
            BATCH_COLUMNS
        ))
        .bind(item_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(batches)
    }

    async fn set_batch_remaining(&mut self, id: BatchId, remaining: Decimal) -> LedgerResult<()> {
        let result = sqlx::query("UPDATE batches SET remaining_qty = $2 WHERE id = $1")
            .bind(id)
            .bind(remaining)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found("Batch"));
        }
        Ok(())
    }

    async fn active_batch_total(&mut self, item_id: ItemId) -> LedgerResult<Decimal> {
        let total: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(remaining_qty), 0) FROM batches WHERE item_id = $1 AND is_active",
        )
        .bind(item_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(total)
    }

    async fn insert_transaction(
        &mut self,
        txn: &NewTransaction,
    ) -> LedgerResult<StockTransaction> {
        let created = sqlx::query_as::<_, StockTransaction>(&format!(
            r#"
            INSERT INTO transactions (item_id, batch_id, transaction_type, quantity_change,
                                      new_balance, unit_cost, total_cost, module_reference,
                                      adjustment_id, purchase_order_id, actor, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(txn.item_id)
        .bind(txn.batch_id)
        .bind(txn.transaction_type)
        .bind(txn.quantity_change)
        .bind(txn.new_balance)
        .bind(txn.unit_cost)
        .bind(txn.total_cost)
        .bind(&txn.module_reference)
        .bind(txn.adjustment_id)
        .bind(txn.purchase_order_id)
        .bind(txn.actor)
        .bind(&txn.notes)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(created)
    }

    async fn insert_adjustment(&mut self, adjustment: &NewAdjustment) -> LedgerResult<Adjustment> {
        let created = sqlx::query_as::<_, Adjustment>(&format!(
            r#"
            INSERT INTO adjustments (item_id, batch_id, adjustment_type, quantity, old_qty,
                                     new_qty, reason, reference_id, adjustment_date, actor)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            ADJUSTMENT_COLUMNS
        ))
        .bind(adjustment.item_id)
        .bind(adjustment.batch_id)
        .bind(adjustment.adjustment_type)
        .bind(adjustment.quantity)
        .bind(adjustment.old_qty)
        .bind(adjustment.new_qty)
        .bind(&adjustment.reason)
        .bind(&adjustment.reference_id)
        .bind(adjustment.adjustment_date)
        .bind(adjustment.actor)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(created)
    }

    async fn lock_purchase_order(
        &mut self,
        id: PurchaseOrderId,
    ) -> LedgerResult<Option<PurchaseOrderDetail>> {
        let order = sqlx::query_as::<_, PurchaseOrder>(&format!(
            "SELECT {} FROM purchase_orders WHERE id = $1 FOR UPDATE",
            PO_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(order) = order else {
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, PurchaseOrderLine>(&format!(
            r#"
            SELECT {}
            FROM purchase_order_items
            WHERE purchase_order_id = $1
            ORDER BY id
            FOR UPDATE
            "#,
            PO_LINE_COLUMNS
        ))
        .bind(id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(Some(PurchaseOrderDetail { order, lines }))
    }

    async fn po_number_exists(&mut self, po_number: &str) -> LedgerResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM purchase_orders WHERE po_number = $1)")
                .bind(po_number)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(exists)
    }

    async fn insert_purchase_order(
        &mut self,
        header: &PurchaseOrderRow,
        lines: &[NewPurchaseOrderLine],
    ) -> LedgerResult<PurchaseOrderDetail> {
        let order = sqlx::query_as::<_, PurchaseOrder>(&format!(
            r#"
            INSERT INTO purchase_orders (po_number, supplier_id, po_date, expected_delivery,
                                         total_cost, notes, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            PO_COLUMNS
        ))
        .bind(&header.po_number)
        .bind(header.supplier_id)
        .bind(header.po_date)
        .bind(header.expected_delivery)
        .bind(header.total_cost)
        .bind(&header.notes)
        .bind(header.created_by)
        .fetch_one(&mut *self.tx)
        .await?;

        let mut created = Vec::with_capacity(lines.len());
        for line in lines {
            let row = sqlx::query_as::<_, PurchaseOrderLine>(&format!(
                r#"
                INSERT INTO purchase_order_items
                    (purchase_order_id, item_id, ordered_qty, unit_cost)
                VALUES ($1, $2, $3, $4)
                RETURNING {}
                "#,
                PO_LINE_COLUMNS
            ))
            .bind(order.id)
            .bind(line.item_id)
            .bind(line.ordered_qty)
            .bind(line.unit_cost)
            .fetch_one(&mut *self.tx)
            .await?;
            created.push(row);
        }

        Ok(PurchaseOrderDetail {
            order,
            lines: created,
        })
    }

    async fn set_purchase_order_status(
        &mut self,
        id: PurchaseOrderId,
        status: PoStatus,
    ) -> LedgerResult<()> {
        sqlx::query("UPDATE purchase_orders SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn add_line_received(
        &mut self,
        line_id: PurchaseOrderLineId,
        quantity: Decimal,
    ) -> LedgerResult<()> {
        sqlx::query(
            "UPDATE purchase_order_items SET received_qty = received_qty + $2 WHERE id = $1",
        )
        .bind(line_id)
        .bind(quantity)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_purchase_order(&mut self, id: PurchaseOrderId) -> LedgerResult<bool> {
        // Lines go with the header via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM purchase_orders WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_activity(&mut self, entry: &NewActivity) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_logs (actor, action, module_key, description, metadata)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.actor)
        .bind(&entry.action)
        .bind(&entry.module_key)
        .bind(&entry.description)
        .bind(&entry.metadata)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
