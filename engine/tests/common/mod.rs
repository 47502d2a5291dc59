//! Fixtures shared by the integration tests

#![allow(dead_code)]

use std::str::FromStr;

use chrono::NaiveDate;
use farm_stock_ledger::{Engine, ReceiptOutcome};
use rust_decimal::Decimal;
use shared::{AdjustStock, AdjustmentType, DeductStock, Item, ItemId, NewItem, ReceiveBatch};
use uuid::Uuid;

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn actor() -> Uuid {
    Uuid::from_u128(0x0f00_d5ee_d000_0000_0000_0000_0000_0001)
}

pub fn new_item(name: &str, sku: &str) -> NewItem {
    NewItem {
        name: name.to_string(),
        sku: sku.to_string(),
        category: Some("Aquaculture".to_string()),
        unit: "kg".to_string(),
        reorder_threshold: dec("20"),
        minimum_stock_level: dec("5"),
        default_supplier_id: None,
    }
}

pub async fn seed_item(engine: &Engine, name: &str, sku: &str) -> Item {
    engine
        .catalog
        .create_item(new_item(name, sku), actor())
        .await
        .unwrap()
}

pub fn receipt(
    item_id: ItemId,
    batch_number: &str,
    qty: &str,
    cost: &str,
    on: NaiveDate,
) -> ReceiveBatch {
    ReceiveBatch {
        item_id,
        batch_number: batch_number.to_string(),
        quantity: dec(qty),
        unit_cost: dec(cost),
        purchase_date: on,
        expiry_date: None,
        supplier_id: None,
        notes: None,
        actor: actor(),
    }
}

pub async fn receive(
    engine: &Engine,
    item_id: ItemId,
    batch_number: &str,
    qty: &str,
    cost: &str,
    on: NaiveDate,
) -> ReceiptOutcome {
    engine
        .ledger
        .receive_batch(receipt(item_id, batch_number, qty, cost, on))
        .await
        .unwrap()
}

pub fn deduction(item_id: ItemId, qty: &str, module: &str) -> DeductStock {
    DeductStock {
        item_id,
        batch_id: None,
        quantity: dec(qty),
        module_reference: module.to_string(),
        actor: actor(),
        notes: None,
    }
}

pub fn adjustment(item_id: ItemId, batch_id: Option<i64>, qty: &str) -> AdjustStock {
    AdjustStock {
        item_id,
        batch_id,
        adjustment_type: AdjustmentType::Damage,
        quantity: dec(qty),
        reason: "Bags torn during unloading".to_string(),
        reference_id: None,
        adjustment_date: None,
        actor: actor(),
    }
}

/// Σ remaining over the item's active batches
pub async fn batch_total(engine: &Engine, item_id: ItemId) -> Decimal {
    engine
        .ledger
        .store()
        .batches(Some(item_id))
        .await
        .unwrap()
        .iter()
        .filter(|b| b.is_active)
        .map(|b| b.remaining_qty)
        .sum()
}
