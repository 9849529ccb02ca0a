//! Projection implementations (read model builders).
//!
//! Projections consume domain events and build query-optimized read models.
//! All projections are:
//! - **Rebuildable**: can be reconstructed from the event streams
//! - **Idempotent**: safe for at-least-once delivery (duplicates are skipped
//!   via per-stream cursors)

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use stockbook_core::AggregateId;

pub mod expense_book;
pub mod product_catalog;
pub mod purchase_log;
pub mod sales_ledger;

pub use expense_book::{ExpenseBookProjection, ExpenseRecord};
pub use product_catalog::{ProductCatalogProjection, ProductRecord};
pub use purchase_log::{PurchaseKey, PurchaseLogProjection, PurchaseRecord};
pub use sales_ledger::{SaleRecord, SalesLedgerProjection};

/// Failure while applying an envelope to a read model.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("event does not match its envelope: {0}")]
    EnvelopeMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Per-stream sequence cursors shared by all projections.
///
/// Tracks the last processed sequence number per aggregate so replays are
/// no-ops and gaps are surfaced instead of silently skipped.
#[derive(Debug, Default)]
pub(crate) struct StreamCursors {
    inner: RwLock<HashMap<AggregateId, u64>>,
}

impl StreamCursors {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns `Ok(true)` if the event advances the stream (process it),
    /// `Ok(false)` for an already-seen duplicate (skip it).
    pub(crate) fn observe(
        &self,
        aggregate_id: AggregateId,
        sequence_number: u64,
    ) -> Result<bool, ProjectionError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| ProjectionError::EnvelopeMismatch("cursor lock poisoned".to_string()))?;

        let last = map.get(&aggregate_id).copied().unwrap_or(0);
        if sequence_number == 0 {
            return Err(ProjectionError::NonMonotonicSequence {
                last,
                found: sequence_number,
            });
        }
        if sequence_number <= last {
            return Ok(false);
        }
        // A fresh cursor may start mid-stream (rebuild from a later offset);
        // an established cursor must advance one step at a time.
        if last != 0 && sequence_number != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence {
                last,
                found: sequence_number,
            });
        }

        map.insert(aggregate_id, sequence_number);
        Ok(true)
    }

    pub(crate) fn clear(&self) {
        if let Ok(mut map) = self.inner.write() {
            map.clear();
        }
    }
}
