//! Crate-wide error taxonomy.
//!
//! One enum for every failure the core can surface; the HTTP boundary owns
//! the translation to status codes. The conversion engine retries store
//! contention once internally and never retries business-rule failures.

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid quantity: {quantity}")]
    InvalidQuantity { quantity: i64 },

    #[error("no active cart for this user")]
    CartNotFound,

    #[error("cart item {item_id} not found")]
    ItemNotFound { item_id: Uuid },

    #[error("product variation {variation_id} not found")]
    VariationNotFound { variation_id: Uuid },

    #[error("cart is empty")]
    EmptyCart,

    #[error("insufficient stock for variation {variation_id}: requested {requested}, available {available}")]
    InsufficientStock {
        variation_id: Uuid,
        requested: u32,
        available: u32,
    },

    #[error("cart has already been converted to an order")]
    AlreadyConverted,

    #[error("lost a concurrent conversion race; retry the order")]
    Conflict,

    #[error("not authorized")]
    Unauthorized,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store error: {0}")]
    Store(String),
}

impl Error {
    /// Failures a client may safely retry verbatim.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflict_is_retryable() {
        assert!(Error::Conflict.is_retryable());
        assert!(!Error::AlreadyConverted.is_retryable());
        assert!(!Error::InsufficientStock {
            variation_id: Uuid::new_v4(),
            requested: 3,
            available: 2
        }
        .is_retryable());
    }
}
