//! Item master and category models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::types::{CategoryId, ItemId, SupplierId};

/// Item master: the definition of a stock-keeping unit
///
/// `current_qty` is derived from the item's active batches and is only ever
/// written by the ledger as part of a batch mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub sku: String,
    pub category_id: Option<CategoryId>,
    pub unit: String,
    pub reorder_threshold: Decimal,
    pub minimum_stock_level: Decimal,
    pub is_active: bool,
    pub default_supplier_id: Option<SupplierId>,
    pub current_qty: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    pub fn stock_status(&self) -> StockStatus {
        StockStatus::classify(
            self.current_qty,
            self.reorder_threshold,
            self.minimum_stock_level,
        )
    }
}

/// Two-tier low stock signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    /// At or below the minimum stock level
    Critical,
    /// At or below the reorder threshold
    Low,
    Ok,
}

impl StockStatus {
    /// Both boundaries are inclusive.
    pub fn classify(current: Decimal, reorder_threshold: Decimal, minimum: Decimal) -> Self {
        if current <= minimum {
            StockStatus::Critical
        } else if current <= reorder_threshold {
            StockStatus::Low
        } else {
            StockStatus::Ok
        }
    }
}

/// Input for creating an item
///
/// Older callers send `item_name`, `reorder_level`, `min_stock_level` and
/// `unit_of_measure`; those names are accepted here and nowhere else.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewItem {
    #[serde(alias = "item_name")]
    #[validate(length(min = 1, max = 200, message = "Item name is required"))]
    pub name: String,

    #[validate(length(min = 1, max = 64, message = "SKU is required"))]
    pub sku: String,

    /// Category name; created if it does not exist yet
    pub category: Option<String>,

    #[serde(alias = "unit_of_measure")]
    #[validate(length(min = 1, max = 32, message = "Unit of measure is required"))]
    pub unit: String,

    #[serde(alias = "reorder_level", default)]
    pub reorder_threshold: Decimal,

    #[serde(alias = "min_stock_level", default)]
    pub minimum_stock_level: Decimal,

    pub default_supplier_id: Option<SupplierId>,
}

impl NewItem {
    /// Trim text fields and upper-case the SKU
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.sku = normalize_sku(&self.sku);
        self.unit = self.unit.trim().to_string();
        self.category = normalize_optional(self.category);
        self
    }
}

/// Patch for item master fields; stock quantity is not part of it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemUpdate {
    #[serde(alias = "item_name")]
    pub name: Option<String>,
    /// `Some("")` clears the category
    pub category: Option<String>,
    #[serde(alias = "unit_of_measure")]
    pub unit: Option<String>,
    #[serde(alias = "reorder_level")]
    pub reorder_threshold: Option<Decimal>,
    #[serde(alias = "min_stock_level")]
    pub minimum_stock_level: Option<Decimal>,
    pub default_supplier_id: Option<SupplierId>,
}

/// Item category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a category
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewCategory {
    #[serde(alias = "category_name")]
    #[validate(length(min = 1, max = 100, message = "Category name is required"))]
    pub name: String,
    pub description: Option<String>,
}

/// Patch for a category
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CategoryUpdate {
    #[serde(alias = "category_name")]
    #[validate(length(min = 1, max = 100, message = "Category name is required"))]
    pub name: Option<String>,
    /// `Some("")` clears the description
    pub description: Option<String>,
}

pub fn normalize_sku(sku: &str) -> String {
    sku.trim().to_uppercase()
}

/// Trim, and treat blank text as absent
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_stock_status_boundaries() {
        let threshold = dec("20");
        let minimum = dec("5");
        assert_eq!(StockStatus::classify(dec("20"), threshold, minimum), StockStatus::Low);
        assert_eq!(StockStatus::classify(dec("20.01"), threshold, minimum), StockStatus::Ok);
        assert_eq!(StockStatus::classify(dec("5"), threshold, minimum), StockStatus::Critical);
        assert_eq!(StockStatus::classify(dec("5.5"), threshold, minimum), StockStatus::Low);
    }

    #[test]
    fn test_legacy_aliases_are_accepted() {
        let json = r#"{
            "item_name": "Fish Feed - Premium",
            "sku": " ff-001 ",
            "unit_of_measure": "kg",
            "reorder_level": "50",
            "min_stock_level": "10"
        }"#;
        let item: NewItem = serde_json::from_str(json).unwrap();
        let item = item.normalized();
        assert_eq!(item.name, "Fish Feed - Premium");
        assert_eq!(item.sku, "FF-001");
        assert_eq!(item.reorder_threshold, dec("50"));
        assert_eq!(item.minimum_stock_level, dec("10"));
        assert!(item.category.is_none());
    }

    #[test]
    fn test_blank_name_fails_validation() {
        let item = NewItem {
            name: "   ".into(),
            sku: "X-1".into(),
            category: None,
            unit: "kg".into(),
            reorder_threshold: Decimal::ZERO,
            minimum_stock_level: Decimal::ZERO,
            default_supplier_id: None,
        }
        .normalized();
        assert!(item.validate().is_err());
    }
}
