//! Activity log entries written alongside every mutation

use serde_json::Value;
use shared::NewActivity;
use uuid::Uuid;

/// Module key for everything the ledger records
pub const INVENTORY_MODULE: &str = "inventory";

/// What an activity entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ReceiveStock,
    UseStock,
    Adjustment,
    CreateItem,
    UpdateItem,
    DeactivateItem,
    ReactivateItem,
    CreateCategory,
    UpdateCategory,
    DeleteCategory,
    CreateSupplier,
    UpdateSupplier,
    DeactivateSupplier,
    DeleteSupplier,
    CreatePurchaseOrder,
    UpdatePurchaseOrderStatus,
    ReceivePurchaseOrderLine,
    DeletePurchaseOrder,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ReceiveStock => "receive_stock",
            Action::UseStock => "use_stock",
            Action::Adjustment => "adjustment",
            Action::CreateItem => "create_item",
            Action::UpdateItem => "update_item",
            Action::DeactivateItem => "deactivate_item",
            Action::ReactivateItem => "reactivate_item",
            Action::CreateCategory => "create_category",
            Action::UpdateCategory => "update_category",
            Action::DeleteCategory => "delete_category",
            Action::CreateSupplier => "create_supplier",
            Action::UpdateSupplier => "update_supplier",
            Action::DeactivateSupplier => "deactivate_supplier",
            Action::DeleteSupplier => "delete_supplier",
            Action::CreatePurchaseOrder => "create_po",
            Action::UpdatePurchaseOrderStatus => "update_po_status",
            Action::ReceivePurchaseOrderLine => "receive_po_line",
            Action::DeletePurchaseOrder => "delete_po",
        }
    }
}

pub(crate) fn entry(
    actor: Uuid,
    action: Action,
    description: impl Into<String>,
    metadata: Value,
) -> NewActivity {
    NewActivity {
        actor,
        action: action.as_str().to_string(),
        module_key: INVENTORY_MODULE.to_string(),
        description: description.into(),
        metadata,
    }
}
