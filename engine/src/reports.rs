//! Derived views over the ledger
//!
//! The view functions are pure: they take rows already read from storage and
//! compute the report. [`ReportService`] does the reading.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    normalize_module_reference, ActivityEntry, Adjustment, Batch, BatchId, Category, CategoryId,
    DateRange, Item, ItemId, StockStatus, StockTransaction, TransactionQuery, TransactionType,
    ValuationGroupBy,
};

use crate::config::LedgerRules;
use crate::error::{LedgerError, LedgerResult};
use crate::store::LedgerStore;

// ============================================================================
// Low stock
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LowStockEntry {
    pub item_id: ItemId,
    pub name: String,
    pub sku: String,
    pub unit: String,
    pub current_qty: Decimal,
    pub reorder_threshold: Decimal,
    pub minimum_stock_level: Decimal,
    pub status: StockStatus,
    /// How far below the reorder threshold the item sits
    pub shortfall: Decimal,
}

/// Active items at or below their reorder threshold, critical ones first
pub fn low_stock_items(items: &[Item]) -> Vec<LowStockEntry> {
    let mut entries: Vec<LowStockEntry> = items
        .iter()
        .filter(|i| i.is_active)
        .filter_map(|i| {
            let status = i.stock_status();
            if status == StockStatus::Ok {
                return None;
            }
            Some(LowStockEntry {
                item_id: i.id,
                name: i.name.clone(),
                sku: i.sku.clone(),
                unit: i.unit.clone(),
                current_qty: i.current_qty,
                reorder_threshold: i.reorder_threshold,
                minimum_stock_level: i.minimum_stock_level,
                status,
                shortfall: i.reorder_threshold - i.current_qty,
            })
        })
        .collect();

    entries.sort_by(|a, b| a.status.cmp(&b.status).then_with(|| a.name.cmp(&b.name)));
    entries
}

// ============================================================================
// Expiry
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryTier {
    /// Expired, or expiring within the critical window
    Critical,
    Warning,
    Informational,
}

impl ExpiryTier {
    pub fn classify(days_left: i64, rules: &LedgerRules) -> Self {
        if days_left <= rules.expiry_critical_days {
            ExpiryTier::Critical
        } else if days_left <= rules.expiry_warning_days {
            ExpiryTier::Warning
        } else {
            ExpiryTier::Informational
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpiringBatch {
    pub item_id: ItemId,
    pub item_name: String,
    pub unit: String,
    pub batch_id: BatchId,
    pub batch_number: String,
    pub remaining_qty: Decimal,
    pub expiry_date: NaiveDate,
    /// Negative once the batch has expired
    pub days_left: i64,
    pub tier: ExpiryTier,
}

/// Batches still holding stock whose expiry falls within `horizon_days` of
/// `today`, soonest first. Already expired batches are included.
pub fn expiring_items(
    items: &[Item],
    batches: &[Batch],
    today: NaiveDate,
    horizon_days: i64,
    rules: &LedgerRules,
) -> Vec<ExpiringBatch> {
    let by_id: HashMap<ItemId, &Item> = items.iter().map(|i| (i.id, i)).collect();

    let mut expiring: Vec<ExpiringBatch> = batches
        .iter()
        .filter(|b| b.is_consumable())
        .filter_map(|b| {
            let expiry_date = b.expiry_date?;
            let days_left = b.days_until_expiry(today)?;
            if days_left > horizon_days {
                return None;
            }
            let item = by_id.get(&b.item_id)?;
            Some(ExpiringBatch {
                item_id: item.id,
                item_name: item.name.clone(),
                unit: item.unit.clone(),
                batch_id: b.id,
                batch_number: b.batch_number.clone(),
                remaining_qty: b.remaining_qty,
                expiry_date,
                days_left,
                tier: ExpiryTier::classify(days_left, rules),
            })
        })
        .collect();

    expiring.sort_by(|a, b| {
        a.expiry_date
            .cmp(&b.expiry_date)
            .then_with(|| a.batch_id.cmp(&b.batch_id))
    });
    expiring
}

// ============================================================================
// Consumption by module
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumptionLine {
    pub module_reference: String,
    pub item_id: ItemId,
    pub item_name: String,
    pub unit: String,
    pub quantity: Decimal,
    pub total_cost: Decimal,
    pub transaction_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumptionReport {
    /// `None` reports every module
    pub module_reference: Option<String>,
    pub range: DateRange,
    pub lines: Vec<ConsumptionLine>,
    pub total_cost: Decimal,
}

/// Sum deductions per module and item over an inclusive date range
pub fn consumption_by_module(
    transactions: &[StockTransaction],
    items: &[Item],
    module: Option<&str>,
    range: DateRange,
) -> ConsumptionReport {
    let module = module.map(normalize_module_reference);
    let by_id: HashMap<ItemId, &Item> = items.iter().map(|i| (i.id, i)).collect();

    let mut grouped: BTreeMap<(String, ItemId), (Decimal, Decimal, usize)> = BTreeMap::new();
    for txn in transactions {
        if txn.transaction_type != TransactionType::Deduct {
            continue;
        }
        if !range.contains(txn.created_at.date_naive()) {
            continue;
        }
        let txn_module = txn.module_reference.clone().unwrap_or_default();
        if let Some(wanted) = &module {
            if &txn_module != wanted {
                continue;
            }
        }

        let entry = grouped
            .entry((txn_module, txn.item_id))
            .or_insert((Decimal::ZERO, Decimal::ZERO, 0));
        entry.0 += -txn.quantity_change;
        entry.1 += txn.total_cost.unwrap_or(Decimal::ZERO);
        entry.2 += 1;
    }

    let lines: Vec<ConsumptionLine> = grouped
        .into_iter()
        .map(|((module_reference, item_id), (quantity, total_cost, count))| {
            let item = by_id.get(&item_id);
            ConsumptionLine {
                module_reference,
                item_id,
                item_name: item.map(|i| i.name.clone()).unwrap_or_default(),
                unit: item.map(|i| i.unit.clone()).unwrap_or_default(),
                quantity,
                total_cost,
                transaction_count: count,
            }
        })
        .collect();

    ConsumptionReport {
        total_cost: lines.iter().map(|l| l.total_cost).sum(),
        module_reference: module,
        range,
        lines,
    }
}

// ============================================================================
// Valuation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValuationLine {
    pub key: String,
    pub item_id: Option<ItemId>,
    pub category_id: Option<CategoryId>,
    /// Only meaningful per item; categories mix units
    pub quantity: Option<Decimal>,
    pub value: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryValuation {
    pub group_by: ValuationGroupBy,
    pub total_value: Decimal,
    pub lines: Vec<ValuationLine>,
}

/// Σ remaining × unit cost over active batches
pub fn valuation(
    items: &[Item],
    categories: &[Category],
    batches: &[Batch],
    group_by: ValuationGroupBy,
) -> InventoryValuation {
    let active: Vec<&Batch> = batches.iter().filter(|b| b.is_active).collect();
    let total_value: Decimal = active.iter().map(|b| b.remaining_value()).sum();
    let by_id: HashMap<ItemId, &Item> = items.iter().map(|i| (i.id, i)).collect();

    let lines = match group_by {
        ValuationGroupBy::None => Vec::new(),
        ValuationGroupBy::Item => {
            let mut per_item: BTreeMap<ItemId, (Decimal, Decimal)> = BTreeMap::new();
            for b in &active {
                let entry = per_item.entry(b.item_id).or_default();
                entry.0 += b.remaining_qty;
                entry.1 += b.remaining_value();
            }
            per_item
                .into_iter()
                .map(|(item_id, (quantity, value))| ValuationLine {
                    key: by_id
                        .get(&item_id)
                        .map(|i| i.name.clone())
                        .unwrap_or_else(|| format!("Item {}", item_id)),
                    item_id: Some(item_id),
                    category_id: by_id.get(&item_id).and_then(|i| i.category_id),
                    quantity: Some(quantity),
                    value,
                })
                .collect()
        }
        ValuationGroupBy::Category => {
            let names: HashMap<CategoryId, &str> =
                categories.iter().map(|c| (c.id, c.name.as_str())).collect();
            let mut per_category: BTreeMap<Option<CategoryId>, Decimal> = BTreeMap::new();
            for b in &active {
                let category_id = by_id.get(&b.item_id).and_then(|i| i.category_id);
                *per_category.entry(category_id).or_default() += b.remaining_value();
            }
            per_category
                .into_iter()
                .map(|(category_id, value)| ValuationLine {
                    key: category_id
                        .and_then(|id| names.get(&id).map(|n| n.to_string()))
                        .unwrap_or_else(|| "Uncategorized".to_string()),
                    item_id: None,
                    category_id,
                    quantity: None,
                    value,
                })
                .collect()
        }
    };

    InventoryValuation {
        group_by,
        total_value,
        lines,
    }
}

// ============================================================================
// Service
// ============================================================================

/// Read-only reporting over a store
#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn LedgerStore>,
    rules: LedgerRules,
}

impl ReportService {
    pub fn new(store: Arc<dyn LedgerStore>, rules: LedgerRules) -> Self {
        Self { store, rules }
    }

    pub async fn low_stock_items(&self) -> LedgerResult<Vec<LowStockEntry>> {
        let items = self.store.items(true).await?;
        Ok(low_stock_items(&items))
    }

    /// Uses the configured default horizon when `days_ahead` is `None`
    pub async fn expiring_items(
        &self,
        days_ahead: Option<i64>,
    ) -> LedgerResult<Vec<ExpiringBatch>> {
        self.expiring_items_as_of(days_ahead, Utc::now().date_naive())
            .await
    }

    pub async fn expiring_items_as_of(
        &self,
        days_ahead: Option<i64>,
        today: NaiveDate,
    ) -> LedgerResult<Vec<ExpiringBatch>> {
        let horizon = days_ahead.unwrap_or(self.rules.default_expiry_horizon_days);
        if horizon < 0 {
            return Err(LedgerError::validation(
                "days_ahead",
                "Horizon cannot be negative",
            ));
        }
        let items = self.store.items(false).await?;
        let batches = self.store.batches(None).await?;
        Ok(expiring_items(&items, &batches, today, horizon, &self.rules))
    }

    pub async fn consumption_by_module(
        &self,
        module: Option<&str>,
        range: DateRange,
    ) -> LedgerResult<ConsumptionReport> {
        if !range.is_valid() {
            return Err(LedgerError::validation(
                "range",
                "Start date must not be after end date",
            ));
        }
        let transactions = self
            .store
            .transactions(&TransactionQuery {
                since: Some(range.start),
                newest_first: false,
                limit: None,
                ..TransactionQuery::default()
            })
            .await?;
        let items = self.store.items(false).await?;
        Ok(consumption_by_module(&transactions, &items, module, range))
    }

    pub async fn inventory_valuation(
        &self,
        group_by: ValuationGroupBy,
    ) -> LedgerResult<InventoryValuation> {
        let items = self.store.items(false).await?;
        let categories = self.store.categories().await?;
        let batches = self.store.batches(None).await?;
        Ok(valuation(&items, &categories, &batches, group_by))
    }

    /// Newest first unless the query says otherwise
    pub async fn transaction_history(
        &self,
        query: &TransactionQuery,
    ) -> LedgerResult<Vec<StockTransaction>> {
        self.store.transactions(query).await
    }

    pub async fn recent_adjustments(&self, limit: i64) -> LedgerResult<Vec<Adjustment>> {
        self.store.adjustments(limit).await
    }

    pub async fn recent_activity(&self, limit: i64) -> LedgerResult<Vec<ActivityEntry>> {
        self.store.activity(limit).await
    }
}
