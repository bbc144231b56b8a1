//! Storage seams used by the engine and the HTTP layer.
//!
//! Implementations: `shop_db::PgOrderStore` (Postgres, `FOR UPDATE`) and
//! `shop_testkit::MemoryStore` (per-row async mutexes). Both must honour the
//! same contract:
//! - `lock_products` holds exclusive locks on the returned rows until the
//!   transaction resolves.
//! - Nothing written through a `CheckoutTx` is visible to anyone else before
//!   `commit`.
//! - Dropping a `CheckoutTx` without `commit` is a rollback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::cart::{ProductId, Quantity, UserId};
use crate::order::{OrderFilter, OrderId, OrderRecord, OrderStatus};
use crate::pricing::{LockedProduct, PricedLine};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Lock wait exceeded the configured limit.
    #[error("lock wait timed out: {0}")]
    LockTimeout(String),

    #[error("storage failure: {0}")]
    Backend(String),
}

/// Id and creation time assigned by the store when the order row is inserted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OrderHeader {
    pub id: OrderId,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait CheckoutStore: Send + Sync {
    /// Open one atomic checkout transaction.
    async fn begin(&self) -> Result<Box<dyn CheckoutTx>, StoreError>;
}

#[async_trait]
pub trait CheckoutTx: Send {
    /// Lock exactly the rows for `ids` (ascending) and return those that exist.
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<LockedProduct>, StoreError>;

    async fn insert_order(
        &mut self,
        user: UserId,
        status: OrderStatus,
        total_amount: Decimal,
    ) -> Result<OrderHeader, StoreError>;

    async fn insert_line(&mut self, order_id: OrderId, line: &PricedLine) -> Result<(), StoreError>;

    /// Guarded decrement (`stock >= qty`). `Ok(false)` when the guard refused.
    async fn decrement_stock(&mut self, id: ProductId, qty: Quantity) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Order reads and admin writes outside the checkout transaction.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Single order with its items.
    async fn fetch_order(&self, id: OrderId) -> Result<Option<OrderRecord>, StoreError>;

    /// Newest first.
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<OrderRecord>, StoreError>;

    /// Returns false when the order does not exist.
    async fn set_order_status(&self, id: OrderId, status: OrderStatus) -> Result<bool, StoreError>;

    /// Deletes the order and its lines. Returns false when it did not exist.
    async fn delete_order(&self, id: OrderId) -> Result<bool, StoreError>;
}
