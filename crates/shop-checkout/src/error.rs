use thiserror::Error;

use crate::cart::ProductId;
use crate::store::StoreError;

/// Every way a checkout can fail.
///
/// All variants leave inventory and order tables unchanged: validation
/// failures happen before the transaction opens, everything later rolls back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// No caller identity was supplied.
    #[error("not authenticated")]
    Unauthenticated,

    /// Malformed cart line; retrying unchanged will fail again.
    #[error("{0}")]
    InvalidItem(String),

    /// Referenced products do not exist (ascending ids).
    #[error("unknown product(s): {}", join_ids(.0))]
    ProductNotFound(Vec<ProductId>),

    #[error("insufficient stock for product {product_id} (available: {available}, requested: {requested})")]
    InsufficientStock {
        product_id: ProductId,
        available: i32,
        requested: i32,
    },

    /// Storage fault, lock timeout or commit failure. Nothing was committed.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),
}

impl CheckoutError {
    /// Stable kind name surfaced on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckoutError::Unauthenticated => "Unauthenticated",
            CheckoutError::InvalidItem(_) => "InvalidItem",
            CheckoutError::ProductNotFound(_) => "ProductNotFound",
            CheckoutError::InsufficientStock { .. } => "InsufficientStock",
            CheckoutError::TransactionFailed(_) => "TransactionFailed",
        }
    }

    /// True when the identical request may simply be resent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckoutError::TransactionFailed(_))
    }
}

impl From<StoreError> for CheckoutError {
    fn from(e: StoreError) -> Self {
        CheckoutError::TransactionFailed(e.to_string())
    }
}

fn join_ids(ids: &[ProductId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
