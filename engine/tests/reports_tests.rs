//! Report tests against the in-memory store

mod common;

use chrono::Utc;
use common::*;
use farm_stock_ledger::reports::ExpiryTier;
use farm_stock_ledger::{Engine, ErrorKind};
use shared::{DateRange, StockStatus, TransactionQuery, TransactionType, ValuationGroupBy};

#[tokio::test]
async fn test_low_stock_after_deduction() {
    let engine = Engine::in_memory();
    let feed = seed_item(&engine, "Fish Feed", "FF-001").await;
    let salt = seed_item(&engine, "Salt", "SL-001").await;
    let lime = seed_item(&engine, "Lime", "LM-001").await;
    receive(&engine, feed.id, "FEED-1", "21", "5", date(2025, 1, 1)).await;
    receive(&engine, salt.id, "SALT-1", "20", "2", date(2025, 1, 1)).await;
    receive(&engine, lime.id, "LIME-1", "6", "1", date(2025, 1, 1)).await;

    let low = engine.reports.low_stock_items().await.unwrap();
    let ids: Vec<i64> = low.iter().map(|e| e.item_id).collect();
    assert_eq!(ids, vec![lime.id, salt.id]);
    assert_eq!(low[0].status, StockStatus::Low);

    engine
        .ledger
        .deduct_fifo(deduction(lime.id, "1", "nursery"))
        .await
        .unwrap();
    engine
        .ledger
        .deduct_fifo(deduction(feed.id, "1", "biofloc"))
        .await
        .unwrap();

    let low = engine.reports.low_stock_items().await.unwrap();
    assert_eq!(low.len(), 3);
    assert_eq!(low[0].item_id, lime.id);
    assert_eq!(low[0].status, StockStatus::Critical);
    assert_eq!(low[1].name, "Fish Feed");
}

#[tokio::test]
async fn test_expiring_items_tiers() {
    let engine = Engine::in_memory();
    let probiotic = seed_item(&engine, "Probiotic", "PB-001").await;
    let today = date(2025, 3, 1);
    for (batch, expiry) in [
        ("PB-7", date(2025, 3, 8)),
        ("PB-8", date(2025, 3, 9)),
        ("PB-30", date(2025, 3, 31)),
        ("PB-31", date(2025, 4, 1)),
    ] {
        let mut input = receipt(probiotic.id, batch, "5", "10", date(2025, 2, 1));
        input.expiry_date = Some(expiry);
        engine.ledger.receive_batch(input).await.unwrap();
    }

    let report = engine
        .reports
        .expiring_items_as_of(None, today)
        .await
        .unwrap();
    let tiers: Vec<(&str, ExpiryTier)> = report
        .iter()
        .map(|e| (e.batch_number.as_str(), e.tier))
        .collect();
    assert_eq!(
        tiers,
        vec![
            ("PB-7", ExpiryTier::Critical),
            ("PB-8", ExpiryTier::Warning),
            ("PB-30", ExpiryTier::Warning),
        ]
    );

    let wide = engine
        .reports
        .expiring_items_as_of(Some(31), today)
        .await
        .unwrap();
    assert_eq!(wide.len(), 4);
    assert_eq!(wide[3].tier, ExpiryTier::Informational);

    let err = engine
        .reports
        .expiring_items_as_of(Some(-1), today)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_drained_batch_drops_out_of_expiry_report() {
    let engine = Engine::in_memory();
    let probiotic = seed_item(&engine, "Probiotic", "PB-001").await;
    let mut input = receipt(probiotic.id, "PB-OLD", "5", "10", date(2025, 2, 1));
    input.expiry_date = Some(date(2025, 3, 3));
    engine.ledger.receive_batch(input).await.unwrap();

    engine
        .ledger
        .deduct_fifo(deduction(probiotic.id, "5", "ras"))
        .await
        .unwrap();

    let report = engine
        .reports
        .expiring_items_as_of(None, date(2025, 3, 1))
        .await
        .unwrap();
    assert!(report.is_empty());
}

#[tokio::test]
async fn test_consumption_by_module() {
    let engine = Engine::in_memory();
    let feed = seed_item(&engine, "Fish Feed", "FF-001").await;
    receive(&engine, feed.id, "FEED-1", "30", "5", date(2025, 1, 1)).await;
    receive(&engine, feed.id, "FEED-2", "20", "8", date(2025, 1, 2)).await;

    engine
        .ledger
        .deduct_fifo(deduction(feed.id, "35", "Biofloc"))
        .await
        .unwrap();
    engine
        .ledger
        .deduct_fifo(deduction(feed.id, "5", "ras"))
        .await
        .unwrap();

    let today = Utc::now().date_naive();
    let report = engine
        .reports
        .consumption_by_module(Some("biofloc"), DateRange::day(today))
        .await
        .unwrap();
    assert_eq!(report.lines.len(), 1);
    assert_eq!(report.lines[0].quantity, dec("35"));
    assert_eq!(report.lines[0].total_cost, dec("190"));
    assert_eq!(report.lines[0].transaction_count, 2);
    assert_eq!(report.total_cost, dec("190"));

    let all = engine
        .reports
        .consumption_by_module(None, DateRange::day(today))
        .await
        .unwrap();
    assert_eq!(all.lines.len(), 2);
    assert_eq!(all.total_cost, dec("230"));

    let yesterday = today.pred_opt().unwrap();
    let empty = engine
        .reports
        .consumption_by_module(None, DateRange::day(yesterday))
        .await
        .unwrap();
    assert!(empty.lines.is_empty());

    let err = engine
        .reports
        .consumption_by_module(None, DateRange::new(today, yesterday))
        .await
        .unwrap_err();
    assert_eq!(err.detail().field.as_deref(), Some("range"));
}

#[tokio::test]
async fn test_inventory_valuation() {
    let engine = Engine::in_memory();
    let feed = seed_item(&engine, "Fish Feed", "FF-001").await;
    let mut input = new_item("Shovel", "TL-001");
    input.category = None;
    let shovel = engine.catalog.create_item(input, actor()).await.unwrap();

    receive(&engine, feed.id, "FEED-1", "30", "5", date(2025, 1, 1)).await;
    receive(&engine, feed.id, "FEED-2", "20", "8", date(2025, 1, 2)).await;
    receive(&engine, shovel.id, "TL-1", "2", "15", date(2025, 1, 2)).await;
    engine
        .ledger
        .deduct_fifo(deduction(feed.id, "35", "biofloc"))
        .await
        .unwrap();

    let total = engine
        .reports
        .inventory_valuation(ValuationGroupBy::None)
        .await
        .unwrap();
    assert_eq!(total.total_value, dec("150"));

    let per_item = engine
        .reports
        .inventory_valuation(ValuationGroupBy::Item)
        .await
        .unwrap();
    assert_eq!(per_item.lines[0].item_id, Some(feed.id));
    assert_eq!(per_item.lines[0].quantity, Some(dec("15")));
    assert_eq!(per_item.lines[0].value, dec("120"));

    let per_category = engine
        .reports
        .inventory_valuation(ValuationGroupBy::Category)
        .await
        .unwrap();
    let lines: Vec<(&str, _)> = per_category
        .lines
        .iter()
        .map(|l| (l.key.as_str(), l.value))
        .collect();
    assert_eq!(lines, vec![("Uncategorized", dec("30")), ("Aquaculture", dec("120"))]);
}

#[tokio::test]
async fn test_transaction_history_queries() {
    let engine = Engine::in_memory();
    let feed = seed_item(&engine, "Fish Feed", "FF-001").await;
    let first = receive(&engine, feed.id, "FEED-1", "30", "5", date(2025, 1, 1)).await;
    receive(&engine, feed.id, "FEED-2", "20", "8", date(2025, 1, 2)).await;
    engine
        .ledger
        .deduct_fifo(deduction(feed.id, "10", "biofloc"))
        .await
        .unwrap();

    let latest = engine
        .reports
        .transaction_history(&TransactionQuery {
            item_id: Some(feed.id),
            limit: Some(2),
            ..TransactionQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0].transaction_type, TransactionType::Deduct);
    assert_eq!(latest[0].new_balance, dec("40"));

    let for_batch = engine
        .reports
        .transaction_history(&TransactionQuery::for_batch(first.batch_id))
        .await
        .unwrap();
    let kinds: Vec<TransactionType> = for_batch.iter().map(|t| t.transaction_type).collect();
    assert_eq!(kinds, vec![TransactionType::Receive, TransactionType::Deduct]);
}

#[tokio::test]
async fn test_recent_adjustments_and_activity() {
    let engine = Engine::in_memory();
    let feed = seed_item(&engine, "Fish Feed", "FF-001").await;
    let received = receive(&engine, feed.id, "FEED-1", "30", "5", date(2025, 1, 1)).await;
    engine
        .ledger
        .log_adjustment(adjustment(feed.id, Some(received.batch_id), "4"))
        .await
        .unwrap();

    let adjustments = engine.reports.recent_adjustments(10).await.unwrap();
    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0].quantity, dec("4"));

    let activity = engine.reports.recent_activity(2).await.unwrap();
    assert_eq!(activity.len(), 2);
    assert_eq!(activity[0].action, "adjustment");
}
