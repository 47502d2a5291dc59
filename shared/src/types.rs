//! Common types used across the ledger

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type ItemId = i64;
pub type BatchId = i64;
pub type TransactionId = i64;
pub type AdjustmentId = i64;
pub type CategoryId = i64;
pub type SupplierId = i64;
pub type PurchaseOrderId = i64;
pub type PurchaseOrderLineId = i64;

/// Inclusive date range for queries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Single-day range
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }
}

/// Grouping key for inventory valuation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValuationGroupBy {
    /// Single total line
    #[default]
    None,
    Item,
    Category,
}

impl std::str::FromStr for ValuationGroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "total" => Ok(ValuationGroupBy::None),
            "item" => Ok(ValuationGroupBy::Item),
            "category" => Ok(ValuationGroupBy::Category),
            other => Err(format!("unknown valuation grouping '{}'", other)),
        }
    }
}

/// Filter for reading the transaction log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionQuery {
    pub item_id: Option<ItemId>,
    pub batch_id: Option<BatchId>,
    /// Only transactions created on or after this date
    pub since: Option<NaiveDate>,
    /// Newest first when set; oldest first otherwise
    pub newest_first: bool,
    pub limit: Option<i64>,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            item_id: None,
            batch_id: None,
            since: None,
            newest_first: true,
            limit: Some(100),
        }
    }
}

impl TransactionQuery {
    /// Every transaction for one item, oldest first, no limit (replay order)
    pub fn replay(item_id: ItemId) -> Self {
        Self {
            item_id: Some(item_id),
            batch_id: None,
            since: None,
            newest_first: false,
            limit: None,
        }
    }

    /// Every transaction touching one batch, oldest first
    pub fn for_batch(batch_id: BatchId) -> Self {
        Self {
            item_id: None,
            batch_id: Some(batch_id),
            since: None,
            newest_first: false,
            limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_range_is_inclusive() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
        );
        assert!(range.contains(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()));
        assert!(range.contains(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()));
    }

    #[test]
    fn test_group_by_parsing() {
        assert_eq!("item".parse::<ValuationGroupBy>().unwrap(), ValuationGroupBy::Item);
        assert_eq!("Category".parse::<ValuationGroupBy>().unwrap(), ValuationGroupBy::Category);
        assert_eq!("".parse::<ValuationGroupBy>().unwrap(), ValuationGroupBy::None);
        assert!("supplier".parse::<ValuationGroupBy>().is_err());
    }
}
