//! Stock error taxonomy.

use stockbook_core::DomainError;
use thiserror::Error;

/// Failures raised while selling against product inventory.
///
/// `InsufficientStock` and `InsufficientInventory` are deliberately distinct:
/// the former is the fast precheck against the denormalized on-hand count and
/// is an ordinary, recoverable user error; the latter means the authoritative
/// lot walk disagreed with a count that had already passed, i.e. the two
/// sources of truth diverged. Callers must log the latter as an integrity
/// anomaly, not show it as a stock message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// Requested quantity was zero or negative. Never retried.
    #[error("quantity must be a positive integer (got {0})")]
    InvalidQuantity(i64),

    /// The referenced product was never registered. Never retried.
    #[error("product not found")]
    ProductNotFound,

    /// The on-hand count cannot cover the request. Carries what is available
    /// so the caller can offer a corrected amount.
    #[error("not enough stock available ({available} on hand)")]
    InsufficientStock { available: i64 },

    /// The purchase lots cannot cover the request even though the on-hand
    /// count allowed it.
    #[error("purchase lots cover only {available} of {requested} requested units")]
    InsufficientInventory { requested: i64, available: i64 },

    /// Non-stock validation/invariant failures (registration, purchases, edits).
    #[error(transparent)]
    Domain(#[from] DomainError),
}
