//! shop-testkit
//!
//! In-memory inventory + order store for scenario tests. It implements the
//! same seams as the Postgres adapter and keeps the same guarantees, so the
//! engine's invariants can be proven without a database:
//! - every product row sits behind its own async mutex; a checkout holds the
//!   guards of the rows it locked until it commits, rolls back or is dropped
//! - writes are staged inside the transaction and applied only on commit
//! - lock waits are bounded by `lock_timeout`

mod memory_store;

pub use memory_store::{money, MemoryStore, ProductRow};
