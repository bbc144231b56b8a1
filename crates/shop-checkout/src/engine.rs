//! Order Placement Engine.
//!
//! Flow of one checkout:
//! 1. identity present, cart normalized (no side effects yet)
//! 2. begin transaction
//! 3. lock exactly the requested product rows
//! 4. existence + stock check, pricing from the locked read
//! 5. insert order, insert lines, decrement stock
//! 6. commit
//!
//! Any failure after (2) rolls back explicitly; a dropped transaction rolls
//! back as well, so cancellation of the calling task cannot leak a partial
//! order.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cart::{normalize_cart, Cart, RawCartItem, UserId};
use crate::error::CheckoutError;
use crate::order::{OrderStatus, PlacedOrder};
use crate::pricing::price_cart;
use crate::store::{CheckoutStore, CheckoutTx};

/// How a new order is settled at checkout.
///
/// `Instant` simulates immediate payment success (orders are created `paid`).
/// `Deferred` creates `pending` orders that an external payment confirmation
/// later moves to `paid` through the ledger status update.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Settlement {
    #[default]
    Instant,
    Deferred,
}

impl Settlement {
    pub fn initial_status(self) -> OrderStatus {
        match self {
            Settlement::Instant => OrderStatus::Paid,
            Settlement::Deferred => OrderStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Settlement::Instant => "instant",
            Settlement::Deferred => "deferred",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "instant" => Some(Settlement::Instant),
            "deferred" => Some(Settlement::Deferred),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct CheckoutEngine {
    store: Arc<dyn CheckoutStore>,
    settlement: Settlement,
}

impl CheckoutEngine {
    pub fn new(store: Arc<dyn CheckoutStore>, settlement: Settlement) -> Self {
        Self { store, settlement }
    }

    pub fn settlement(&self) -> Settlement {
        self.settlement
    }

    /// Validate, price and commit one order, or change nothing at all.
    pub async fn place_order(
        &self,
        user: Option<UserId>,
        items: &[RawCartItem],
    ) -> Result<PlacedOrder, CheckoutError> {
        let user = user.ok_or(CheckoutError::Unauthenticated)?;
        let cart = normalize_cart(items).inspect_err(|e| {
            debug!(user_id = %user, detail = %e, "cart rejected before transaction");
        })?;

        let mut tx = self.store.begin().await.map_err(|e| {
            warn!(user_id = %user, error = %e, "checkout could not open transaction");
            CheckoutError::from(e)
        })?;

        let status = self.settlement.initial_status();
        match locked_phase(&mut *tx, user, &cart, status).await {
            Ok(placed) => {
                tx.commit().await.map_err(|e| {
                    warn!(user_id = %user, order_id = %placed.id, error = %e, "checkout commit failed");
                    CheckoutError::from(e)
                })?;
                info!(
                    user_id = %user,
                    order_id = %placed.id,
                    lines = placed.lines.len(),
                    total = %placed.total_amount,
                    status = %placed.status,
                    "order placed"
                );
                Ok(placed)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    // The dropped connection still discards the work.
                    warn!(user_id = %user, error = %rb, "explicit rollback failed");
                }
                warn!(user_id = %user, kind = e.kind(), detail = %e, "checkout rolled back");
                Err(e)
            }
        }
    }
}

/// Steps 3-5. Runs entirely inside the caller's transaction.
async fn locked_phase(
    tx: &mut dyn CheckoutTx,
    user: UserId,
    cart: &Cart,
    status: OrderStatus,
) -> Result<PlacedOrder, CheckoutError> {
    let ids = cart.product_ids();
    let locked = tx.lock_products(&ids).await?;
    let priced = price_cart(cart, &locked)?;

    let header = tx.insert_order(user, status, priced.total_amount).await?;

    for line in &priced.lines {
        tx.insert_line(header.id, line).await?;
    }

    for line in &priced.lines {
        if !tx.decrement_stock(line.product_id, line.quantity).await? {
            return Err(CheckoutError::TransactionFailed(format!(
                "stock guard refused decrement for product {} under lock",
                line.product_id
            )));
        }
    }

    Ok(PlacedOrder {
        id: header.id,
        user_id: user,
        status,
        total_amount: priced.total_amount,
        created_at: header.created_at,
        lines: priced.lines,
    })
}
