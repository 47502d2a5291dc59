//! Item master, categories and suppliers

use std::sync::Arc;

use serde_json::json;
use shared::{
    normalize_optional, validate_stock_levels, Category, CategoryId, CategoryUpdate, Item, ItemId,
    ItemUpdate, NewCategory, NewItem, NewSupplier, Supplier, SupplierId, SupplierUpdate,
};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::activity::{self, Action};
use crate::error::{check_field, LedgerError, LedgerResult};
use crate::store::{LedgerStore, LedgerTx};

/// Catalog service
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn LedgerStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    // ========================================================================
    // Items
    // ========================================================================

    /// Create an item; its category is created by name when missing
    #[instrument(skip(self, input), fields(sku = %input.sku))]
    pub async fn create_item(&self, input: NewItem, actor: Uuid) -> LedgerResult<Item> {
        let input = input.normalized();
        input.validate()?;
        check_field(
            "minimum_stock_level",
            validate_stock_levels(input.reorder_threshold, input.minimum_stock_level),
        )?;

        let mut tx = self.store.begin().await?;

        if tx.item_by_sku(&input.sku).await?.is_some() {
            return Err(LedgerError::conflict(
                "sku",
                format!("SKU '{}' already exists", input.sku),
            ));
        }
        if let Some(supplier_id) = input.default_supplier_id {
            require_active_supplier(tx.as_mut(), supplier_id).await?;
        }

        let category_id = match &input.category {
            Some(name) => Some(category_id_for(tx.as_mut(), name).await?),
            None => None,
        };

        let item = tx.insert_item(&input, category_id).await?;

        tx.insert_activity(&activity::entry(
            actor,
            Action::CreateItem,
            format!("Created item {} ({})", item.name, item.sku),
            json!({ "item_id": item.id, "sku": item.sku }),
        ))
        .await?;

        tx.commit().await?;

        info!("Created item {} with SKU {}", item.id, item.sku);
        Ok(item)
    }

    /// Patch master fields; stock quantity is never touched here
    #[instrument(skip(self, update))]
    pub async fn update_item(
        &self,
        item_id: ItemId,
        update: ItemUpdate,
        actor: Uuid,
    ) -> LedgerResult<Item> {
        let update = ItemUpdate {
            name: normalize_optional(update.name),
            unit: normalize_optional(update.unit),
            category: update.category.map(|c| c.trim().to_string()),
            ..update
        };

        let mut tx = self.store.begin().await?;

        let current = tx
            .lock_item(item_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Item {}", item_id)))?;

        check_field(
            "minimum_stock_level",
            validate_stock_levels(
                update.reorder_threshold.unwrap_or(current.reorder_threshold),
                update
                    .minimum_stock_level
                    .unwrap_or(current.minimum_stock_level),
            ),
        )?;
        if let Some(supplier_id) = update.default_supplier_id {
            require_active_supplier(tx.as_mut(), supplier_id).await?;
        }

        let category_id = match update.category.as_deref() {
            None => None,
            Some("") => Some(None),
            Some(name) => Some(Some(category_id_for(tx.as_mut(), name).await?)),
        };

        let item = tx.update_item(item_id, &update, category_id).await?;

        tx.insert_activity(&activity::entry(
            actor,
            Action::UpdateItem,
            format!("Updated item {}", item.name),
            json!({ "item_id": item.id }),
        ))
        .await?;

        tx.commit().await?;
        Ok(item)
    }

    /// Soft delete: history keeps resolving, new receipts are refused
    pub async fn deactivate_item(&self, item_id: ItemId, actor: Uuid) -> LedgerResult<()> {
        self.set_item_active(item_id, false, actor).await
    }

    pub async fn reactivate_item(&self, item_id: ItemId, actor: Uuid) -> LedgerResult<()> {
        self.set_item_active(item_id, true, actor).await
    }

    async fn set_item_active(
        &self,
        item_id: ItemId,
        active: bool,
        actor: Uuid,
    ) -> LedgerResult<()> {
        let mut tx = self.store.begin().await?;

        let item = tx
            .lock_item(item_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Item {}", item_id)))?;
        tx.set_item_active(item_id, active).await?;

        let (action, verb) = if active {
            (Action::ReactivateItem, "Reactivated")
        } else {
            (Action::DeactivateItem, "Deactivated")
        };
        tx.insert_activity(&activity::entry(
            actor,
            action,
            format!("{} item {}", verb, item.name),
            json!({ "item_id": item_id }),
        ))
        .await?;

        tx.commit().await?;
        info!("{} item {}", verb, item_id);
        Ok(())
    }

    pub async fn get_item(&self, item_id: ItemId) -> LedgerResult<Item> {
        self.store
            .item(item_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Item {}", item_id)))
    }

    /// Case-insensitive exact name match among active items
    pub async fn find_item_by_name(&self, name: &str) -> LedgerResult<Option<Item>> {
        let wanted = name.trim().to_lowercase();
        let items = self.store.items(true).await?;
        Ok(items.into_iter().find(|i| i.name.to_lowercase() == wanted))
    }

    pub async fn find_item_by_sku(&self, sku: &str) -> LedgerResult<Option<Item>> {
        let wanted = shared::normalize_sku(sku);
        let items = self.store.items(false).await?;
        Ok(items.into_iter().find(|i| i.sku == wanted))
    }

    pub async fn list_items(&self, active_only: bool) -> LedgerResult<Vec<Item>> {
        self.store.items(active_only).await
    }

    // ========================================================================
    // Categories
    // ========================================================================

    pub async fn create_category(&self, input: NewCategory, actor: Uuid) -> LedgerResult<Category> {
        let input = NewCategory {
            name: input.name.trim().to_string(),
            description: normalize_optional(input.description),
        };
        input.validate()?;

        let mut tx = self.store.begin().await?;

        if tx.category_by_name(&input.name).await?.is_some() {
            return Err(LedgerError::conflict(
                "category",
                format!("Category '{}' already exists", input.name),
            ));
        }
        let category = tx.insert_category(&input).await?;

        tx.insert_activity(&activity::entry(
            actor,
            Action::CreateCategory,
            format!("Created category {}", category.name),
            json!({ "category_id": category.id }),
        ))
        .await?;

        tx.commit().await?;
        Ok(category)
    }

    /// Rename or re-describe a category; names stay unique ignoring case
    pub async fn update_category(
        &self,
        category_id: CategoryId,
        update: CategoryUpdate,
        actor: Uuid,
    ) -> LedgerResult<Category> {
        let update = CategoryUpdate {
            name: update.name.map(|n| n.trim().to_string()),
            description: update.description.map(|d| d.trim().to_string()),
        };
        update.validate()?;

        let mut tx = self.store.begin().await?;

        let mut category = tx
            .lock_category(category_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Category {}", category_id)))?;
        let previous_name = category.name.clone();

        if let Some(name) = update.name {
            if let Some(existing) = tx.category_by_name(&name).await? {
                if existing.id != category_id {
                    return Err(LedgerError::conflict(
                        "category",
                        format!("Category '{}' already exists", name),
                    ));
                }
            }
            category.name = name;
        }
        if let Some(description) = update.description {
            category.description = Some(description).filter(|d| !d.is_empty());
        }
        let category = tx.update_category(&category).await?;

        tx.insert_activity(&activity::entry(
            actor,
            Action::UpdateCategory,
            format!("Updated category {}", category.name),
            json!({ "category_id": category.id, "previous_name": previous_name }),
        ))
        .await?;

        tx.commit().await?;
        info!("Updated category {}", category.id);
        Ok(category)
    }

    pub async fn list_categories(&self) -> LedgerResult<Vec<Category>> {
        self.store.categories().await
    }

    /// Refused while any item still points at the category
    pub async fn delete_category(&self, category_id: CategoryId, actor: Uuid) -> LedgerResult<()> {
        let mut tx = self.store.begin().await?;

        let in_use = tx.items_in_category(category_id).await?;
        if in_use > 0 {
            return Err(LedgerError::conflict(
                "category",
                format!("Category is used by {} item(s)", in_use),
            ));
        }
        if !tx.delete_category(category_id).await? {
            return Err(LedgerError::not_found(format!("Category {}", category_id)));
        }

        tx.insert_activity(&activity::entry(
            actor,
            Action::DeleteCategory,
            format!("Deleted category {}", category_id),
            json!({ "category_id": category_id }),
        ))
        .await?;

        tx.commit().await
    }

    // ========================================================================
    // Suppliers
    // ========================================================================

    pub async fn create_supplier(&self, input: NewSupplier, actor: Uuid) -> LedgerResult<Supplier> {
        let input = NewSupplier {
            name: input.name.trim().to_string(),
            contact_person: normalize_optional(input.contact_person),
            phone: normalize_optional(input.phone),
            email: normalize_optional(input.email),
            address: normalize_optional(input.address),
        };
        input.validate()?;

        let mut tx = self.store.begin().await?;
        let supplier = tx.insert_supplier(&input).await?;

        tx.insert_activity(&activity::entry(
            actor,
            Action::CreateSupplier,
            format!("Created supplier {}", supplier.name),
            json!({ "supplier_id": supplier.id }),
        ))
        .await?;

        tx.commit().await?;
        info!("Created supplier {}", supplier.id);
        Ok(supplier)
    }

    pub async fn update_supplier(
        &self,
        supplier_id: SupplierId,
        update: SupplierUpdate,
        actor: Uuid,
    ) -> LedgerResult<Supplier> {
        let update = SupplierUpdate {
            name: update.name.map(|n| n.trim().to_string()),
            contact_person: normalize_optional(update.contact_person),
            phone: normalize_optional(update.phone),
            email: normalize_optional(update.email),
            address: normalize_optional(update.address),
        };
        update.validate()?;

        let mut tx = self.store.begin().await?;

        if tx.lock_supplier(supplier_id).await?.is_none() {
            return Err(LedgerError::not_found(format!("Supplier {}", supplier_id)));
        }
        let supplier = tx.update_supplier(supplier_id, &update).await?;

        tx.insert_activity(&activity::entry(
            actor,
            Action::UpdateSupplier,
            format!("Updated supplier {}", supplier.name),
            json!({ "supplier_id": supplier_id }),
        ))
        .await?;

        tx.commit().await?;
        Ok(supplier)
    }

    pub async fn deactivate_supplier(
        &self,
        supplier_id: SupplierId,
        actor: Uuid,
    ) -> LedgerResult<()> {
        let mut tx = self.store.begin().await?;

        let supplier = tx
            .lock_supplier(supplier_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Supplier {}", supplier_id)))?;
        tx.set_supplier_active(supplier_id, false).await?;

        tx.insert_activity(&activity::entry(
            actor,
            Action::DeactivateSupplier,
            format!("Deactivated supplier {}", supplier.name),
            json!({ "supplier_id": supplier_id }),
        ))
        .await?;

        tx.commit().await
    }

    /// Refused while items, batches or purchase orders reference the supplier
    pub async fn delete_supplier(&self, supplier_id: SupplierId, actor: Uuid) -> LedgerResult<()> {
        let mut tx = self.store.begin().await?;

        let supplier = tx
            .lock_supplier(supplier_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("Supplier {}", supplier_id)))?;

        let references = tx.supplier_references(supplier_id).await?;
        if references > 0 {
            return Err(LedgerError::conflict(
                "supplier",
                format!(
                    "Supplier {} is referenced by {} record(s); deactivate it instead",
                    supplier.name, references
                ),
            ));
        }
        tx.delete_supplier(supplier_id).await?;

        tx.insert_activity(&activity::entry(
            actor,
            Action::DeleteSupplier,
            format!("Deleted supplier {}", supplier.name),
            json!({ "supplier_id": supplier_id }),
        ))
        .await?;

        tx.commit().await
    }

    pub async fn list_suppliers(&self, active_only: bool) -> LedgerResult<Vec<Supplier>> {
        self.store.suppliers(active_only).await
    }
}

/// Look a category up by name, creating it inside the caller's unit of work
async fn category_id_for(tx: &mut dyn LedgerTx, name: &str) -> LedgerResult<CategoryId> {
    if let Some(existing) = tx.category_by_name(name).await? {
        return Ok(existing.id);
    }
    let category = NewCategory {
        name: name.to_string(),
        description: None,
    };
    category.validate()?;
    Ok(tx.insert_category(&category).await?.id)
}

async fn require_active_supplier(
    tx: &mut dyn LedgerTx,
    supplier_id: SupplierId,
) -> LedgerResult<()> {
    let supplier = tx
        .lock_supplier(supplier_id)
        .await?
        .ok_or_else(|| LedgerError::not_found(format!("Supplier {}", supplier_id)))?;
    if !supplier.is_active {
        return Err(LedgerError::validation(
            "default_supplier_id",
            "Supplier is inactive",
        ));
    }
    Ok(())
}
