//! Shared runtime state for shop-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The engine and ledger
//! are trait objects so tests can run the router on `shop_testkit::MemoryStore`.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shop_checkout::{
    CheckoutEngine, CheckoutStore, OrderId, OrderLedger, OrderStatus, Settlement, UserId,
};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat {
        ts_millis: i64,
    },
    OrderPlaced {
        order_id: OrderId,
        user_id: UserId,
        total_amount: Decimal,
        status: OrderStatus,
    },
    OrderStatus {
        order_id: OrderId,
        status: OrderStatus,
    },
    OrderDeleted {
        order_id: OrderId,
    },
}

impl BusMsg {
    /// SSE `event:` name.
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::OrderPlaced { .. } => "order_placed",
            BusMsg::OrderStatus { .. } => "order_status",
            BusMsg::OrderDeleted { .. } => "order_deleted",
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub engine: CheckoutEngine,
    pub ledger: Arc<dyn OrderLedger>,
}

impl AppState {
    pub fn new(engine: CheckoutEngine, ledger: Arc<dyn OrderLedger>) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "shop-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            engine,
            ledger,
        }
    }

    /// Wire engine and ledger to one store that implements both seams.
    pub fn from_store<S>(store: Arc<S>, settlement: Settlement) -> Self
    where
        S: CheckoutStore + OrderLedger + 'static,
    {
        let engine = CheckoutEngine::new(store.clone(), settlement);
        Self::new(engine, store)
    }

    /// Fire-and-forget; no subscribers is not an error.
    pub fn publish(&self, msg: BusMsg) {
        let _ = self.bus.send(msg);
    }
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
