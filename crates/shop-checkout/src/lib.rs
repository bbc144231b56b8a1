//! shop-checkout
//!
//! Order placement core for the storefront.
//! - Loosely typed cart payloads are normalized into a strict `Cart` before
//!   any storage is touched.
//! - `CheckoutEngine::place_order` runs one locked transaction per checkout:
//!   lock rows, check stock, price, insert order + lines, decrement stock,
//!   commit. Any failure rolls the whole attempt back.
//! - Storage is reached only through the `CheckoutStore` / `OrderLedger`
//!   seams; Postgres lives in `shop-db`, the in-memory store in `shop-testkit`.

mod cart;
mod engine;
mod error;
mod order;
mod pricing;
mod store;

pub use cart::{normalize_cart, parse_items_payload, Cart, ProductId, Quantity, RawCartItem, UserId};

pub use engine::{CheckoutEngine, Settlement};

pub use error::CheckoutError;

pub use order::{OrderFilter, OrderId, OrderLineRecord, OrderRecord, OrderStatus, PlacedOrder};

pub use pricing::{price_cart, LockedProduct, PricedLine, PricedOrder};

pub use store::{CheckoutStore, CheckoutTx, OrderHeader, OrderLedger, StoreError};
