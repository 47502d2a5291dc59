//! Domain models for the farm stock ledger

mod activity;
mod batch;
mod item;
mod purchase_order;
mod supplier;
mod transaction;

pub use activity::*;
pub use batch::*;
pub use item::*;
pub use purchase_order::*;
pub use supplier::*;
pub use transaction::*;
