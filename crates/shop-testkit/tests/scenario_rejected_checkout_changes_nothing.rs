//! Scenario: a rejected checkout leaves no trace.
//!
//! # Invariants under test
//!
//! 1. Insufficient stock: no order, no lines, stock untouched.
//! 2. Unknown product: every missing id reported, nothing written, stock of
//!    the known products untouched.
//! 3. A storage failure after the order row was written rolls back the order
//!    row and every stock change.
//! 4. A lock wait that exceeds the limit surfaces as a retryable
//!    TransactionFailed and writes nothing.
//! 5. Invalid input never reaches storage.
//!
//! All tests are pure in-process; no DB or network required.

use std::sync::Arc;
use std::time::Duration;

use shop_checkout::{CheckoutEngine, CheckoutError, ProductId, RawCartItem, Settlement, UserId};
use shop_testkit::{money, MemoryStore};

fn engine(store: &MemoryStore) -> CheckoutEngine {
    CheckoutEngine::new(Arc::new(store.clone()), Settlement::Instant)
}

async fn assert_untouched(store: &MemoryStore, id: i64, stock: i32) {
    assert_eq!(store.stock_of(id).await, Some(stock), "stock of {id} changed");
    assert_eq!(store.order_count(), 0, "order row leaked");
    assert_eq!(store.line_count(), 0, "order lines leaked");
}

// ---------------------------------------------------------------------------
// 1. Insufficient stock
// ---------------------------------------------------------------------------

#[tokio::test]
async fn insufficient_stock_is_rejected_whole() {
    let store = MemoryStore::new();
    store.seed_product(1, "lamp", money("30.00"), 1);
    store.seed_product(2, "bulb", money("2.00"), 10);

    let err = engine(&store)
        .place_order(
            Some(UserId(3)),
            &[RawCartItem::new(2, 4), RawCartItem::new(1, 2)],
        )
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CheckoutError::InsufficientStock {
            product_id: ProductId(1),
            available: 1,
            requested: 2,
        }
    );
    assert!(err.to_string().contains("available: 1"));
    assert_untouched(&store, 1, 1).await;
    assert_eq!(store.stock_of(2).await, Some(10));
}

// ---------------------------------------------------------------------------
// 2. Unknown product
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_product_is_rejected_whole() {
    let store = MemoryStore::new();
    store.seed_product(1, "lamp", money("30.00"), 5);

    let err = engine(&store)
        .place_order(
            Some(UserId(3)),
            &[RawCartItem::new(1, 1), RawCartItem::new(9999, 1)],
        )
        .await
        .unwrap_err();

    assert_eq!(err, CheckoutError::ProductNotFound(vec![ProductId(9999)]));
    assert_eq!(err.kind(), "ProductNotFound");
    assert_untouched(&store, 1, 5).await;
}

// ---------------------------------------------------------------------------
// 3. Failure mid-transaction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn line_insert_failure_rolls_back_order_row() {
    let store = MemoryStore::new();
    store.seed_product(1, "lamp", money("30.00"), 5);
    store.seed_product(2, "bulb", money("2.00"), 5);
    store.fail_next_line_insert();

    let err = engine(&store)
        .place_order(
            Some(UserId(3)),
            &[RawCartItem::new(1, 1), RawCartItem::new(2, 1)],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::TransactionFailed(_)), "{err:?}");
    assert!(err.is_retryable());
    assert_untouched(&store, 1, 5).await;
    assert_eq!(store.stock_of(2).await, Some(5));

    // The fault was one-shot; the same cart now succeeds.
    let placed = engine(&store)
        .place_order(
            Some(UserId(3)),
            &[RawCartItem::new(1, 1), RawCartItem::new(2, 1)],
        )
        .await
        .unwrap();
    assert_eq!(placed.total_amount, money("32.00"));
    assert_eq!(store.order_count(), 1);
}

// ---------------------------------------------------------------------------
// 4. Lock timeout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lock_timeout_is_retryable_and_writes_nothing() {
    let store = MemoryStore::with_lock_timeout(Duration::from_millis(50));
    store.seed_product(1, "lamp", money("30.00"), 5);

    let held = store.lock_row(1).await.expect("row exists");

    let err = engine(&store)
        .place_order(Some(UserId(3)), &[RawCartItem::new(1, 1)])
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::TransactionFailed(_)), "{err:?}");
    assert!(err.to_string().contains("lock wait timed out"));
    assert!(err.is_retryable());

    drop(held);
    assert_untouched(&store, 1, 5).await;
}

// ---------------------------------------------------------------------------
// 5. Invalid input
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_items_never_open_a_transaction() {
    let store = MemoryStore::with_lock_timeout(Duration::from_millis(50));
    store.seed_product(1, "lamp", money("30.00"), 5);

    // A held row would turn any storage access into a timeout.
    let held = store.lock_row(1).await.expect("row exists");

    for (items, detail) in [
        (vec![], "cart has no items"),
        (vec![RawCartItem::new(1, 0)], "invalid quantity for product_id 1: 0"),
        (vec![RawCartItem::new("abc", 1)], "invalid product_id: abc"),
    ] {
        let err = engine(&store)
            .place_order(Some(UserId(3)), &items)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidItem", "{err:?}");
        assert_eq!(err.to_string(), detail);
    }

    let err = engine(&store)
        .place_order(None, &[RawCartItem::new(1, 1)])
        .await
        .unwrap_err();
    assert_eq!(err, CheckoutError::Unauthenticated);

    drop(held);
    assert_untouched(&store, 1, 5).await;
}
