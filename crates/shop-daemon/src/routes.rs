//! Axum router and all HTTP handlers for shop-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Handlers only translate between HTTP and the engine /
//! ledger; no inventory logic lives here.

use std::{convert::Infallible, sync::Arc};

use axum::{
    body::Bytes,
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, put},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use shop_checkout::{
    parse_items_payload, CheckoutError, OrderFilter, OrderId, OrderStatus, StoreError,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::{
    api_types::{
        DataResponse, ErrorResponse, HealthResponse, ListOrdersQuery, MessageResponse,
        PlaceOrderResponse, SetStatusRequest,
    },
    identity::Caller,
    state::{AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/stream", get(stream))
        .route("/v1/orders", get(list_orders).post(place_order))
        .route("/v1/orders/:id", get(get_order).delete(delete_order))
        .route("/v1/orders/:id/status", put(set_order_status))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

pub(crate) struct ApiError {
    status: StatusCode,
    error: &'static str,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, detail: impl Into<String>) -> Self {
        Self {
            status,
            error,
            detail: detail.into(),
        }
    }

    fn unauthenticated() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthenticated", "not authenticated")
    }

    fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "Forbidden", "admin role required")
    }

    fn invalid_order_id(rejection: PathRejection) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "InvalidOrderId",
            format!("order id must be an integer: {}", rejection.body_text()),
        )
    }

    fn order_not_found(id: OrderId) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NotFound", format!("order {id} not found"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.error.to_string(),
                detail: self.detail,
            }),
        )
            .into_response()
    }
}

impl From<CheckoutError> for ApiError {
    fn from(e: CheckoutError) -> Self {
        let status = match &e {
            CheckoutError::Unauthenticated => StatusCode::UNAUTHORIZED,
            CheckoutError::InvalidItem(_)
            | CheckoutError::ProductNotFound(_)
            | CheckoutError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
            CheckoutError::TransactionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.kind(), e.to_string())
    }
}

/// Ledger reads/writes outside checkout.
impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        warn!(error = %e, "order ledger failure");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "StorageFailure", e.to_string())
    }
}

/// Path id extraction that keeps the `{ error, detail }` body on failure.
fn order_id(path: Result<Path<i64>, PathRejection>) -> Result<OrderId, ApiError> {
    path.map(|Path(id)| OrderId(id))
        .map_err(ApiError::invalid_order_id)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/orders
// ---------------------------------------------------------------------------

/// Checkout. The body is parsed by hand so that malformed JSON gets the same
/// `{ error, detail }` shape as every other rejection.
pub(crate) async fn place_order(
    State(st): State<Arc<AppState>>,
    caller: Caller,
    body: Bytes,
) -> Result<(StatusCode, Json<PlaceOrderResponse>), ApiError> {
    if caller.user.is_none() {
        return Err(CheckoutError::Unauthenticated.into());
    }

    let body: Value = serde_json::from_slice(&body).map_err(|e| {
        ApiError::from(CheckoutError::InvalidItem(format!(
            "request body is not valid JSON: {e}"
        )))
    })?;
    let items = parse_items_payload(&body)?;

    let placed = st.engine.place_order(caller.user, &items).await?;

    st.publish(BusMsg::OrderPlaced {
        order_id: placed.id,
        user_id: placed.user_id,
        total_amount: placed.total_amount,
        status: placed.status,
    });

    Ok((
        StatusCode::CREATED,
        Json(PlaceOrderResponse {
            id: placed.id,
            total_amount: placed.total_amount,
            status: placed.status,
        }),
    ))
}

// ---------------------------------------------------------------------------
// GET /v1/orders
// ---------------------------------------------------------------------------

/// Customers see their own orders; admins see all.
pub(crate) async fn list_orders(
    State(st): State<Arc<AppState>>,
    caller: Caller,
    query: Result<Query<ListOrdersQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let user = caller.user.ok_or_else(ApiError::unauthenticated)?;
    // Unparseable query strings are treated like an absent flag.
    let include_items = query.map(|Query(q)| q.wants_items()).unwrap_or(false);

    let filter = OrderFilter {
        user: (!caller.is_admin()).then_some(user),
        include_items,
    };
    let orders = st.ledger.list_orders(&filter).await?;

    Ok((StatusCode::OK, Json(DataResponse { data: orders })).into_response())
}

// ---------------------------------------------------------------------------
// GET /v1/orders/:id
// ---------------------------------------------------------------------------

/// A customer asking for someone else's order gets the same 404 as for a
/// missing one.
pub(crate) async fn get_order(
    State(st): State<Arc<AppState>>,
    caller: Caller,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let user = caller.user.ok_or_else(ApiError::unauthenticated)?;
    let id = order_id(id)?;

    let order = st
        .ledger
        .fetch_order(id)
        .await?
        .filter(|o| caller.is_admin() || o.user_id == user)
        .ok_or_else(|| ApiError::order_not_found(id))?;

    Ok((StatusCode::OK, Json(DataResponse { data: order })).into_response())
}

// ---------------------------------------------------------------------------
// PUT /v1/orders/:id/status  (admin)
// ---------------------------------------------------------------------------

pub(crate) async fn set_order_status(
    State(st): State<Arc<AppState>>,
    caller: Caller,
    id: Result<Path<i64>, PathRejection>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    if caller.user.is_none() {
        return Err(ApiError::unauthenticated());
    }
    if !caller.is_admin() {
        return Err(ApiError::forbidden());
    }
    let id = order_id(id)?;

    let req: SetStatusRequest = serde_json::from_slice(&body).map_err(|e| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "InvalidStatus",
            format!("body must be {{\"status\": \"pending\" | \"paid\"}}: {e}"),
        )
    })?;
    let status = OrderStatus::parse(&req.status).ok_or_else(|| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "InvalidStatus",
            format!("unknown order status: {}", req.status),
        )
    })?;

    if !st.ledger.set_order_status(id, status).await? {
        return Err(ApiError::order_not_found(id));
    }

    info!(order_id = %id, status = %status, "order status updated");
    st.publish(BusMsg::OrderStatus {
        order_id: id,
        status,
    });

    Ok(Json(MessageResponse {
        message: format!("order {id} status set to {status}"),
    }))
}

// ---------------------------------------------------------------------------
// DELETE /v1/orders/:id  (admin)
// ---------------------------------------------------------------------------

/// Removes the order and its lines. Stock is not returned to inventory.
pub(crate) async fn delete_order(
    State(st): State<Arc<AppState>>,
    caller: Caller,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    if caller.user.is_none() {
        return Err(ApiError::unauthenticated());
    }
    if !caller.is_admin() {
        return Err(ApiError::forbidden());
    }
    let id = order_id(id)?;

    if !st.ledger.delete_order(id).await? {
        return Err(ApiError::order_not_found(id));
    }

    info!(order_id = %id, "order deleted");
    st.publish(BusMsg::OrderDeleted { order_id: id });

    Ok(Json(MessageResponse {
        message: format!("order {id} deleted"),
    }))
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(m.event_name()).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
