use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use shop_checkout::{
    CheckoutStore, CheckoutTx, LockedProduct, OrderFilter, OrderHeader, OrderId, OrderLedger,
    OrderLineRecord, OrderRecord, OrderStatus, PricedLine, ProductId, Quantity, StoreError,
    UserId,
};
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use tracing::debug;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Parse a decimal money literal. Fixture helper: panics on malformed input.
pub fn money(s: &str) -> Decimal {
    Decimal::from_str_exact(s).unwrap_or_else(|e| panic!("invalid money literal {s:?}: {e}"))
}

/// One row of the in-memory `products` table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductRow {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
}

struct Inner {
    products: Mutex<BTreeMap<ProductId, Arc<RowLock<ProductRow>>>>,
    orders: Mutex<BTreeMap<OrderId, OrderRecord>>,
    next_order_id: AtomicI64,
    next_line_id: AtomicI64,
    lock_timeout: Duration,
    fail_next_line_insert: AtomicBool,
}

/// Cheaply cloneable handle; clones share the same tables.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                products: Mutex::new(BTreeMap::new()),
                orders: Mutex::new(BTreeMap::new()),
                next_order_id: AtomicI64::new(1),
                next_line_id: AtomicI64::new(1),
                lock_timeout,
                fail_next_line_insert: AtomicBool::new(false),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Inventory fixtures
    // -----------------------------------------------------------------------

    /// Insert or replace a product row.
    pub fn seed_product(&self, id: i64, name: &str, price: Decimal, stock: i32) {
        let row = ProductRow {
            id: ProductId(id),
            name: name.to_string(),
            price,
            stock,
        };
        lock_table(&self.inner.products).insert(ProductId(id), Arc::new(RowLock::new(row)));
    }

    fn row(&self, id: ProductId) -> Option<Arc<RowLock<ProductRow>>> {
        lock_table(&self.inner.products).get(&id).cloned()
    }

    /// Committed stock. Waits for any transaction holding the row.
    pub async fn stock_of(&self, id: i64) -> Option<i32> {
        let row = self.row(ProductId(id))?;
        let stock = row.lock().await.stock;
        Some(stock)
    }

    pub async fn price_of(&self, id: i64) -> Option<Decimal> {
        let row = self.row(ProductId(id))?;
        let price = row.lock().await.price;
        Some(price)
    }

    /// Reprice a product (waits for the row like an UPDATE would).
    pub async fn set_price(&self, id: i64, price: Decimal) -> bool {
        match self.row(ProductId(id)) {
            Some(row) => {
                row.lock().await.price = price;
                true
            }
            None => false,
        }
    }

    /// Hold a row lock from outside any checkout (simulates a slow writer).
    pub async fn lock_row(&self, id: i64) -> Option<OwnedMutexGuard<ProductRow>> {
        let row = self.row(ProductId(id))?;
        Some(row.lock_owned().await)
    }

    // -----------------------------------------------------------------------
    // Order table inspection
    // -----------------------------------------------------------------------

    pub fn order_count(&self) -> usize {
        lock_table(&self.inner.orders).len()
    }

    pub fn line_count(&self) -> usize {
        lock_table(&self.inner.orders)
            .values()
            .map(|o| o.items.len())
            .sum()
    }

    /// Sum of committed quantities for one product across all orders.
    pub fn committed_quantity(&self, id: i64) -> i64 {
        lock_table(&self.inner.orders)
            .values()
            .flat_map(|o| o.items.iter())
            .filter(|l| l.product_id == ProductId(id))
            .map(|l| i64::from(l.quantity))
            .sum()
    }

    // -----------------------------------------------------------------------
    // Fault injection
    // -----------------------------------------------------------------------

    /// The next `insert_line` in any transaction fails with a backend error.
    pub fn fail_next_line_insert(&self) {
        self.inner.fail_next_line_insert.store(true, Ordering::SeqCst);
    }
}

fn lock_table<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Checkout transaction
// ---------------------------------------------------------------------------

struct MemoryTx {
    inner: Arc<Inner>,
    held: BTreeMap<ProductId, OwnedMutexGuard<ProductRow>>,
    staged_stock: BTreeMap<ProductId, i32>,
    staged_order: Option<OrderRecord>,
}

impl MemoryTx {
    fn visible_stock(&self, id: ProductId, guard: &ProductRow) -> i32 {
        self.staged_stock.get(&id).copied().unwrap_or(guard.stock)
    }
}

#[async_trait]
impl CheckoutStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn CheckoutTx>, StoreError> {
        Ok(Box::new(MemoryTx {
            inner: Arc::clone(&self.inner),
            held: BTreeMap::new(),
            staged_stock: BTreeMap::new(),
            staged_order: None,
        }))
    }
}

#[async_trait]
impl CheckoutTx for MemoryTx {
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<LockedProduct>, StoreError> {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut out = Vec::with_capacity(sorted.len());
        for id in sorted {
            if !self.held.contains_key(&id) {
                let Some(row) = lock_table(&self.inner.products).get(&id).cloned() else {
                    continue;
                };
                let guard = tokio::time::timeout(self.inner.lock_timeout, row.lock_owned())
                    .await
                    .map_err(|_| {
                        StoreError::LockTimeout(format!(
                            "product row {id} still locked after {:?}",
                            self.inner.lock_timeout
                        ))
                    })?;
                self.held.insert(id, guard);
            }
            let guard = &self.held[&id];
            out.push(LockedProduct {
                id,
                price: guard.price,
                stock: self.visible_stock(id, guard),
            });
        }
        debug!(requested = ids.len(), locked = out.len(), "memory rows locked");
        Ok(out)
    }

    async fn insert_order(
        &mut self,
        user: UserId,
        status: OrderStatus,
        total_amount: Decimal,
    ) -> Result<OrderHeader, StoreError> {
        if self.staged_order.is_some() {
            return Err(StoreError::Backend(
                "transaction already inserted an order".to_string(),
            ));
        }
        let id = OrderId(self.inner.next_order_id.fetch_add(1, Ordering::SeqCst));
        let now = Utc::now();
        self.staged_order = Some(OrderRecord {
            id,
            user_id: user,
            status,
            total_amount,
            created_at: now,
            updated_at: now,
            items: Vec::new(),
        });
        Ok(OrderHeader { id, created_at: now })
    }

    async fn insert_line(&mut self, order_id: OrderId, line: &PricedLine) -> Result<(), StoreError> {
        if self.inner.fail_next_line_insert.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("injected order_items insert failure".to_string()));
        }
        let name = match self.held.get(&line.product_id) {
            Some(guard) => guard.name.clone(),
            None => {
                return Err(StoreError::Backend(format!(
                    "order line for product {} outside the locked set",
                    line.product_id
                )))
            }
        };
        let order = match self.staged_order.as_mut() {
            Some(o) if o.id == order_id => o,
            _ => {
                return Err(StoreError::Backend(format!(
                    "order_items.order_id {order_id} references no order in this transaction"
                )))
            }
        };
        order.items.push(OrderLineRecord {
            id: self.inner.next_line_id.fetch_add(1, Ordering::SeqCst),
            order_id,
            product_id: line.product_id,
            product_name: name,
            quantity: line.quantity.get(),
            unit_price: line.unit_price,
        });
        Ok(())
    }

    async fn decrement_stock(&mut self, id: ProductId, qty: Quantity) -> Result<bool, StoreError> {
        let current = match self.held.get(&id) {
            Some(guard) => self.visible_stock(id, guard),
            None => {
                return Err(StoreError::Backend(format!(
                    "decrement of product row {id} without holding its lock"
                )))
            }
        };
        if current < qty.get() {
            return Ok(false);
        }
        self.staged_stock.insert(id, current - qty.get());
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx {
            inner,
            mut held,
            staged_stock,
            staged_order,
        } = *self;

        for (id, stock) in staged_stock {
            if let Some(guard) = held.get_mut(&id) {
                guard.stock = stock;
            }
        }
        if let Some(order) = staged_order {
            lock_table(&inner.orders).insert(order.id, order);
        }
        // Row locks release here, after every write is visible.
        drop(held);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[async_trait]
impl OrderLedger for MemoryStore {
    async fn fetch_order(&self, id: OrderId) -> Result<Option<OrderRecord>, StoreError> {
        Ok(lock_table(&self.inner.orders).get(&id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<OrderRecord>, StoreError> {
        let mut out: Vec<OrderRecord> = lock_table(&self.inner.orders)
            .values()
            .filter(|o| filter.user.map_or(true, |u| o.user_id == u))
            .cloned()
            .map(|mut o| {
                if !filter.include_items {
                    o.items.clear();
                }
                o
            })
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn set_order_status(&self, id: OrderId, status: OrderStatus) -> Result<bool, StoreError> {
        match lock_table(&self.inner.orders).get_mut(&id) {
            Some(o) => {
                o.status = status;
                o.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_order(&self, id: OrderId) -> Result<bool, StoreError> {
        Ok(lock_table(&self.inner.orders).remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropped_transaction_discards_staged_writes_and_releases_locks() {
        let store = MemoryStore::new();
        store.seed_product(1, "mug", money("4.00"), 3);

        {
            let mut tx = store.begin().await.unwrap();
            let locked = tx.lock_products(&[ProductId(1)]).await.unwrap();
            assert_eq!(locked[0].stock, 3);
            assert!(tx.decrement_stock(ProductId(1), Quantity::new(2).unwrap()).await.unwrap());
            tx.insert_order(UserId(5), OrderStatus::Paid, money("8.00"))
                .await
                .unwrap();
        }

        assert_eq!(store.stock_of(1).await, Some(3));
        assert_eq!(store.order_count(), 0);
    }

    #[tokio::test]
    async fn decrement_requires_the_row_lock() {
        let store = MemoryStore::new();
        store.seed_product(1, "mug", money("4.00"), 3);

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .decrement_stock(ProductId(1), Quantity::new(1).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn guarded_decrement_refuses_to_go_negative() {
        let store = MemoryStore::new();
        store.seed_product(1, "mug", money("4.00"), 1);

        let mut tx = store.begin().await.unwrap();
        tx.lock_products(&[ProductId(1)]).await.unwrap();
        assert!(!tx.decrement_stock(ProductId(1), Quantity::new(2).unwrap()).await.unwrap());
        tx.commit().await.unwrap();
        assert_eq!(store.stock_of(1).await, Some(1));
    }

    #[tokio::test]
    async fn unknown_rows_are_simply_absent() {
        let store = MemoryStore::new();
        store.seed_product(2, "cup", money("1.00"), 1);

        let mut tx = store.begin().await.unwrap();
        let locked = tx
            .lock_products(&[ProductId(9999), ProductId(2)])
            .await
            .unwrap();
        assert_eq!(locked.len(), 1);
        assert_eq!(locked[0].id, ProductId(2));
    }
}
