//! Locked-read validation and totals.
//!
//! Pure: takes the cart and the rows returned by the locked read, decides
//! whether the order can be fulfilled in full, and prices it. Prices used
//! here must come from the same transaction that holds the row locks.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cart::{Cart, ProductId, Quantity};
use crate::error::CheckoutError;

/// One product row as read under `FOR UPDATE` (or equivalent).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedProduct {
    pub id: ProductId,
    pub price: Decimal,
    pub stock: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricedOrder {
    /// Ascending by product id.
    pub lines: Vec<PricedLine>,
    pub total_amount: Decimal,
}

/// Check existence and stock for every cart line, then compute totals.
///
/// - Any requested id absent from `locked` => `ProductNotFound` listing all of them.
/// - First product (ascending id) short on stock => `InsufficientStock`.
/// - Rows for ids that were not requested are ignored.
pub fn price_cart(cart: &Cart, locked: &[LockedProduct]) -> Result<PricedOrder, CheckoutError> {
    let by_id: BTreeMap<ProductId, &LockedProduct> = locked.iter().map(|p| (p.id, p)).collect();

    let missing: BTreeSet<ProductId> = cart
        .product_ids()
        .into_iter()
        .filter(|id| !by_id.contains_key(id))
        .collect();
    if !missing.is_empty() {
        return Err(CheckoutError::ProductNotFound(missing.into_iter().collect()));
    }

    let mut lines = Vec::with_capacity(cart.len());
    for (id, qty) in cart.lines() {
        let row = by_id[&id];
        if row.stock < qty.get() {
            return Err(CheckoutError::InsufficientStock {
                product_id: id,
                available: row.stock,
                requested: qty.get(),
            });
        }
        lines.push(PricedLine {
            product_id: id,
            quantity: qty,
            unit_price: row.price,
            line_total: row.price * Decimal::from(qty.get()),
        });
    }

    let total_amount = lines.iter().map(|l| l.line_total).sum();
    Ok(PricedOrder {
        lines,
        total_amount,
    })
}
