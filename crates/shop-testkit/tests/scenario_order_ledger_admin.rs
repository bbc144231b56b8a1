//! Scenario: order ledger reads and admin writes.
//!
//! # Invariants under test
//!
//! 1. Listing is newest first; a user filter only returns that user's orders.
//! 2. Items are attached only when asked for.
//! 3. Status updates and deletes report whether the order existed.
//! 4. Deleting an order removes its lines but does not restock products.
//!
//! All tests are pure in-process; no DB or network required.

use std::sync::Arc;

use shop_checkout::{
    CheckoutEngine, OrderFilter, OrderId, OrderLedger, OrderStatus, RawCartItem, Settlement,
    UserId,
};
use shop_testkit::{money, MemoryStore};

async fn seeded() -> anyhow::Result<(MemoryStore, Vec<OrderId>)> {
    let store = MemoryStore::new();
    store.seed_product(1, "tea", money("3.00"), 50);
    let engine = CheckoutEngine::new(Arc::new(store.clone()), Settlement::Deferred);

    let mut ids = Vec::new();
    for user in [1, 2, 1] {
        let placed = engine
            .place_order(Some(UserId(user)), &[RawCartItem::new(1, 1)])
            .await?;
        ids.push(placed.id);
    }
    Ok((store, ids))
}

#[tokio::test]
async fn listing_is_newest_first_and_filtered_by_user() -> anyhow::Result<()> {
    let (store, ids) = seeded().await?;

    let all = store.list_orders(&OrderFilter::default()).await?;
    let listed: Vec<OrderId> = all.iter().map(|o| o.id).collect();
    assert_eq!(listed, vec![ids[2], ids[1], ids[0]]);
    assert!(all.iter().all(|o| o.items.is_empty()));

    let mine = store
        .list_orders(&OrderFilter {
            user: Some(UserId(1)),
            include_items: true,
        })
        .await?;
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().all(|o| o.user_id == UserId(1)));
    assert!(mine.iter().all(|o| o.items.len() == 1));
    Ok(())
}

#[tokio::test]
async fn status_update_and_delete_report_existence() -> anyhow::Result<()> {
    let (store, ids) = seeded().await?;

    assert!(store.set_order_status(ids[0], OrderStatus::Paid).await?);
    assert!(!store.set_order_status(OrderId(9_999), OrderStatus::Paid).await?);
    let first = store.fetch_order(ids[0]).await?.expect("order exists");
    assert_eq!(first.status, OrderStatus::Paid);
    assert!(first.updated_at >= first.created_at);

    let lines_before = store.line_count();
    assert!(store.delete_order(ids[1]).await?);
    assert!(!store.delete_order(ids[1]).await?);
    assert_eq!(store.fetch_order(ids[1]).await?, None);
    assert_eq!(store.line_count(), lines_before - 1);

    // Deleting is bookkeeping only; stock stays consumed.
    assert_eq!(store.stock_of(1).await, Some(47));
    Ok(())
}
