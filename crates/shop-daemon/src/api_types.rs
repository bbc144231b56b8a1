//! Request and response types for all shop-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shop_checkout::{OrderId, OrderStatus};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error kind, e.g. "InsufficientStock" | "Unauthenticated" | "NotFound".
    pub error: String,
    pub detail: String,
}

// ---------------------------------------------------------------------------
// POST /v1/orders
// ---------------------------------------------------------------------------

/// 201 body. `total_amount` serializes as a decimal string ("20.00").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderResponse {
    pub id: OrderId,
    pub total_amount: Decimal,
    pub status: OrderStatus,
}

// ---------------------------------------------------------------------------
// GET /v1/orders, GET /v1/orders/:id
// ---------------------------------------------------------------------------

/// `include_items` is a loose flag: only a case-insensitive "true" turns it
/// on, any other value (or none) means off.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListOrdersQuery {
    #[serde(default)]
    pub include_items: Option<String>,
}

impl ListOrdersQuery {
    pub fn wants_items(&self) -> bool {
        self.include_items
            .as_deref()
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

// ---------------------------------------------------------------------------
// PUT /v1/orders/:id/status, DELETE /v1/orders/:id
// ---------------------------------------------------------------------------

/// Status is taken as a raw string so an unknown value gets a 400 with a
/// readable detail instead of a deserializer rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
