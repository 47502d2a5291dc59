//! Purchase order lifecycle and receipt tests

mod common;

use common::*;
use farm_stock_ledger::{Engine, ErrorKind, LedgerError};
use rust_decimal::Decimal;
use shared::{
    NewPurchaseOrder, NewPurchaseOrderLine, NewSupplier, PoStatus, PurchaseOrderDetail,
    ReceiveLine, TransactionQuery, TransactionType,
};

async fn supplier_id(engine: &Engine) -> i64 {
    engine
        .catalog
        .create_supplier(
            NewSupplier {
                name: "Aqua Feeds Ltd".into(),
                contact_person: None,
                phone: None,
                email: None,
                address: None,
            },
            actor(),
        )
        .await
        .unwrap()
        .id
}

async fn ordered_po(engine: &Engine, lines: Vec<NewPurchaseOrderLine>) -> PurchaseOrderDetail {
    let supplier_id = supplier_id(engine).await;
    let po = engine
        .purchasing
        .create_purchase_order(NewPurchaseOrder {
            po_number: Some("PO-TEST-001".into()),
            supplier_id,
            po_date: date(2025, 1, 5),
            expected_delivery: Some(date(2025, 1, 12)),
            notes: None,
            lines,
            actor: actor(),
        })
        .await
        .unwrap();
    engine
        .purchasing
        .transition(po.order.id, PoStatus::Approved, actor())
        .await
        .unwrap();
    engine
        .purchasing
        .transition(po.order.id, PoStatus::Ordered, actor())
        .await
        .unwrap();
    engine.purchasing.get_purchase_order(po.order.id).await.unwrap()
}

fn line(item_id: i64, qty: &str, cost: &str) -> NewPurchaseOrderLine {
    NewPurchaseOrderLine {
        item_id,
        ordered_qty: dec(qty),
        unit_cost: dec(cost),
    }
}

fn receive_line(batch_number: &str, qty: Option<&str>) -> ReceiveLine {
    ReceiveLine {
        batch_number: batch_number.into(),
        quantity: qty.map(dec),
        purchase_date: date(2025, 1, 12),
        expiry_date: Some(date(2025, 7, 12)),
        notes: None,
        actor: actor(),
    }
}

#[tokio::test]
async fn test_create_purchase_order_totals_lines() {
    let engine = Engine::in_memory();
    let feed = seed_item(&engine, "Fish Feed", "FF-001").await;
    let salt = seed_item(&engine, "Salt", "SL-001").await;
    let supplier_id = supplier_id(&engine).await;

    let po = engine
        .purchasing
        .create_purchase_order(NewPurchaseOrder {
            po_number: None,
            supplier_id,
            po_date: date(2025, 1, 5),
            expected_delivery: None,
            notes: Some("Monthly restock".into()),
            lines: vec![line(feed.id, "100", "5"), line(salt.id, "20", "2.5")],
            actor: actor(),
        })
        .await
        .unwrap();

    assert_eq!(po.order.status, PoStatus::Pending);
    assert!(po.order.po_number.starts_with("PO-"));
    assert_eq!(po.order.total_cost, dec("550"));
    assert_eq!(po.lines.len(), 2);
    assert!(po.lines.iter().all(|l| l.received_qty == Decimal::ZERO));
}

#[tokio::test]
async fn test_create_purchase_order_validation() {
    let engine = Engine::in_memory();
    let feed = seed_item(&engine, "Fish Feed", "FF-001").await;
    let supplier_id = supplier_id(&engine).await;
    let base = NewPurchaseOrder {
        po_number: Some("PO-1".into()),
        supplier_id,
        po_date: date(2025, 1, 5),
        expected_delivery: None,
        notes: None,
        lines: vec![],
        actor: actor(),
    };

    let err = engine
        .purchasing
        .create_purchase_order(base.clone())
        .await
        .unwrap_err();
    assert_eq!(err.detail().field.as_deref(), Some("lines"));

    let err = engine
        .purchasing
        .create_purchase_order(NewPurchaseOrder {
            lines: vec![line(feed.id, "0", "5")],
            ..base.clone()
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = engine
        .purchasing
        .create_purchase_order(NewPurchaseOrder {
            lines: vec![line(9_999, "1", "5")],
            ..base.clone()
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    engine
        .purchasing
        .create_purchase_order(NewPurchaseOrder {
            lines: vec![line(feed.id, "1", "5")],
            ..base.clone()
        })
        .await
        .unwrap();
    let err = engine
        .purchasing
        .create_purchase_order(NewPurchaseOrder {
            lines: vec![line(feed.id, "1", "5")],
            ..base
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Conflict { .. }));
}

#[tokio::test]
async fn test_status_transitions() {
    let engine = Engine::in_memory();
    let feed = seed_item(&engine, "Fish Feed", "FF-001").await;
    let supplier_id = supplier_id(&engine).await;
    let po = engine
        .purchasing
        .create_purchase_order(NewPurchaseOrder {
            po_number: None,
            supplier_id,
            po_date: date(2025, 1, 5),
            expected_delivery: None,
            notes: None,
            lines: vec![line(feed.id, "10", "5")],
            actor: actor(),
        })
        .await
        .unwrap();

    let err = engine
        .purchasing
        .transition(po.order.id, PoStatus::Ordered, actor())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InvalidStateTransition {
            from: PoStatus::Pending,
            to: PoStatus::Ordered
        }
    ));

    let err = engine
        .purchasing
        .transition(po.order.id, PoStatus::Received, actor())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let cancelled = engine
        .purchasing
        .transition(po.order.id, PoStatus::Cancelled, actor())
        .await
        .unwrap();
    assert_eq!(cancelled.status, PoStatus::Cancelled);
    assert!(cancelled.status.is_terminal());

    let pending = engine
        .purchasing
        .list_purchase_orders(Some(PoStatus::Pending))
        .await
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_receive_lines_creates_batches_and_completes_order() {
    let engine = Engine::in_memory();
    let feed = seed_item(&engine, "Fish Feed", "FF-001").await;
    let salt = seed_item(&engine, "Salt", "SL-001").await;
    let po = ordered_po(&engine, vec![line(feed.id, "100", "5"), line(salt.id, "20", "2")]).await;
    let feed_line = po.lines[0].id;
    let salt_line = po.lines[1].id;

    let first = engine
        .purchasing
        .receive_line(po.order.id, feed_line, receive_line("PO1-FEED-A", Some("60")))
        .await
        .unwrap();
    assert_eq!(first.status, PoStatus::Ordered);
    assert_eq!(first.quantity, dec("60"));

    let second = engine
        .purchasing
        .receive_line(po.order.id, feed_line, receive_line("PO1-FEED-B", None))
        .await
        .unwrap();
    assert_eq!(second.quantity, dec("40"));
    assert_eq!(second.status, PoStatus::Ordered);

    let last = engine
        .purchasing
        .receive_line(po.order.id, salt_line, receive_line("PO1-SALT", None))
        .await
        .unwrap();
    assert_eq!(last.status, PoStatus::Received);

    let batch = engine.ledger.store().batch(first.batch_id).await.unwrap().unwrap();
    assert_eq!(batch.unit_cost, dec("5"));
    assert_eq!(batch.purchase_order_id, Some(po.order.id));
    assert_eq!(batch.supplier_id, Some(po.order.supplier_id));

    let history = engine
        .reports
        .transaction_history(&TransactionQuery::replay(feed.id))
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert!(history
        .iter()
        .all(|t| t.transaction_type == TransactionType::Receive
            && t.purchase_order_id == Some(po.order.id)));
    assert_eq!(engine.catalog.get_item(feed.id).await.unwrap().current_qty, dec("100"));

    let detail = engine.purchasing.get_purchase_order(po.order.id).await.unwrap();
    assert!(detail.is_fully_received());
    assert_eq!(detail.order.status, PoStatus::Received);

    let closed = engine
        .purchasing
        .transition(po.order.id, PoStatus::Closed, actor())
        .await
        .unwrap();
    assert_eq!(closed.status, PoStatus::Closed);
}

#[tokio::test]
async fn test_receive_line_rules() {
    let engine = Engine::in_memory();
    let feed = seed_item(&engine, "Fish Feed", "FF-001").await;
    let po = ordered_po(&engine, vec![line(feed.id, "10", "5")]).await;
    let line_id = po.lines[0].id;

    let err = engine
        .purchasing
        .receive_line(po.order.id, line_id, receive_line("PO1-FEED", Some("11")))
        .await
        .unwrap_err();
    assert_eq!(err.detail().field.as_deref(), Some("quantity"));

    let err = engine
        .purchasing
        .receive_line(po.order.id, 9_999, receive_line("PO1-FEED", None))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // Batch number collision rolls back the line and the order together
    receive(&engine, feed.id, "PO1-FEED", "1", "5", date(2025, 1, 1)).await;
    let err = engine
        .purchasing
        .receive_line(po.order.id, line_id, receive_line("PO1-FEED", None))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateBatchNumber { .. }));
    let detail = engine.purchasing.get_purchase_order(po.order.id).await.unwrap();
    assert_eq!(detail.lines[0].received_qty, Decimal::ZERO);
    assert_eq!(detail.order.status, PoStatus::Ordered);
}

#[tokio::test]
async fn test_receive_requires_ordered_status() {
    let engine = Engine::in_memory();
    let feed = seed_item(&engine, "Fish Feed", "FF-001").await;
    let supplier_id = supplier_id(&engine).await;
    let po = engine
        .purchasing
        .create_purchase_order(NewPurchaseOrder {
            po_number: None,
            supplier_id,
            po_date: date(2025, 1, 5),
            expected_delivery: None,
            notes: None,
            lines: vec![line(feed.id, "10", "5")],
            actor: actor(),
        })
        .await
        .unwrap();

    let err = engine
        .purchasing
        .receive_line(po.order.id, po.lines[0].id, receive_line("PO1-FEED", None))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidStateTransition { .. }));
    assert!(engine.ledger.store().batches(Some(feed.id)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_only_pending() {
    let engine = Engine::in_memory();
    let feed = seed_item(&engine, "Fish Feed", "FF-001").await;
    let po = ordered_po(&engine, vec![line(feed.id, "10", "5")]).await;

    let err = engine
        .purchasing
        .delete_purchase_order(po.order.id, actor())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let supplier_id = po.order.supplier_id;
    let pending = engine
        .purchasing
        .create_purchase_order(NewPurchaseOrder {
            po_number: Some("PO-TEST-002".into()),
            supplier_id,
            po_date: date(2025, 1, 6),
            expected_delivery: None,
            notes: None,
            lines: vec![line(feed.id, "5", "5")],
            actor: actor(),
        })
        .await
        .unwrap();
    engine
        .purchasing
        .delete_purchase_order(pending.order.id, actor())
        .await
        .unwrap();

    let err = engine
        .purchasing
        .get_purchase_order(pending.order.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(engine.purchasing.list_purchase_orders(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_order_totals_stay_storable() {
    let engine = Engine::in_memory();
    let feed = seed_item(&engine, "Fish Feed", "FF-001").await;
    let supplier_id = supplier_id(&engine).await;
    let order = |lines: Vec<NewPurchaseOrderLine>| NewPurchaseOrder {
        po_number: None,
        supplier_id,
        po_date: date(2025, 1, 5),
        expected_delivery: None,
        notes: None,
        lines,
        actor: actor(),
    };

    let err = engine
        .purchasing
        .create_purchase_order(order(vec![line(feed.id, "99999999999", "9999999999")]))
        .await
        .unwrap_err();
    assert_eq!(err.detail().field.as_deref(), Some("ordered_qty"));

    let err = engine
        .purchasing
        .create_purchase_order(order(vec![line(feed.id, "10.0001", "5")]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert!(engine.purchasing.list_purchase_orders(None).await.unwrap().is_empty());
}
