//! Farm Stock Ledger
//!
//! Batch-based inventory for farm operations: items, FIFO stock batches, an
//! append-only movement ledger, loss adjustments, purchase orders and the
//! reports derived from them. Calling modules (inventory screens, farm
//! modules consuming feed and inputs) go through the services here instead
//! of writing storage directly.

pub mod activity;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fifo;
pub mod ledger;
pub mod purchasing;
pub mod reports;
pub mod store;

use std::sync::Arc;

pub use catalog::CatalogService;
pub use config::{Config, LedgerRules};
pub use error::{ErrorDetail, ErrorKind, LedgerError, LedgerResult};
pub use ledger::{
    AdjustmentOutcome, BatchLifecycle, DeductionOutcome, LedgerAudit, ReceiptOutcome,
    StockLedger, StockLevel,
};
pub use purchasing::PurchaseOrderService;
pub use reports::ReportService;
pub use store::{LedgerStore, LedgerTx, MemoryStore, PgStore};

/// Every service wired to one store
#[derive(Clone)]
pub struct Engine {
    pub ledger: StockLedger,
    pub catalog: CatalogService,
    pub purchasing: PurchaseOrderService,
    pub reports: ReportService,
}

impl Engine {
    pub fn new(store: Arc<dyn LedgerStore>, rules: LedgerRules) -> Self {
        Self {
            ledger: StockLedger::new(store.clone(), rules.clone()),
            catalog: CatalogService::new(store.clone()),
            purchasing: PurchaseOrderService::new(store.clone(), rules.clone()),
            reports: ReportService::new(store, rules),
        }
    }

    /// In-process engine with default rules
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::default()), LedgerRules::default())
    }
}
