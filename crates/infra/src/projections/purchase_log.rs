//! Purchase log read model.
//!
//! One record per purchase lot across all products, keyed by its position in
//! the owning product's stream. Feeds the operating-expense side of the
//! financial rollups (incidental expenses, raw acquisition cost).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockbook_core::{AggregateId, Money};
use stockbook_events::EventEnvelope;
use stockbook_finance::{DateWindow, PurchaseFigures};
use stockbook_inventory::{ProductEvent, ProductId};

use crate::PRODUCT_AGGREGATE_TYPE;
use crate::projections::{ProjectionError, StreamCursors};
use crate::read_model::ReadModelStore;

/// (product stream, sequence number) — stable identity for one purchase.
pub type PurchaseKey = (AggregateId, u64);

/// Read model: one recorded purchase lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_cost: Money,
    pub incidental_expenses: Money,
    pub supplier: Option<String>,
    pub purchased_at: DateTime<Utc>,
}

impl PurchaseRecord {
    /// The slice of this record the financial rollups need.
    pub fn figures(&self) -> PurchaseFigures {
        PurchaseFigures {
            purchased_at: self.purchased_at,
            quantity: self.quantity,
            unit_cost: self.unit_cost,
            incidental_expenses: self.incidental_expenses,
        }
    }
}

/// Purchase log projection, fed by product events.
#[derive(Debug)]
pub struct PurchaseLogProjection<S>
where
    S: ReadModelStore<PurchaseKey, PurchaseRecord>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> PurchaseLogProjection<S>
where
    S: ReadModelStore<PurchaseKey, PurchaseRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    /// All purchases, oldest first.
    pub fn list(&self) -> Vec<PurchaseRecord> {
        let mut records = self.store.list();
        records.sort_by_key(|r| r.purchased_at);
        records
    }

    /// Purchases dated within the window, oldest first.
    pub fn in_window(&self, window: &DateWindow) -> Vec<PurchaseRecord> {
        self.list()
            .into_iter()
            .filter(|r| window.contains(r.purchased_at))
            .collect()
    }

    /// Rollup inputs for every recorded purchase.
    pub fn figures(&self) -> Vec<PurchaseFigures> {
        self.store
            .list()
            .iter()
            .map(PurchaseRecord::figures)
            .collect()
    }

    /// Apply one published envelope. Non-product envelopes are ignored;
    /// product events other than purchases only advance the cursor.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != PRODUCT_AGGREGATE_TYPE {
            return Ok(());
        }

        let event: ProductEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        if let ProductEvent::PurchaseRecorded(e) = &event {
            if e.product_id.0 != envelope.aggregate_id() {
                return Err(ProjectionError::EnvelopeMismatch(
                    "event product_id does not match envelope aggregate_id".to_string(),
                ));
            }
        }

        if !self
            .cursors
            .observe(envelope.aggregate_id(), envelope.sequence_number())?
        {
            return Ok(());
        }

        if let ProductEvent::PurchaseRecorded(e) = event {
            self.store.upsert(
                (envelope.aggregate_id(), envelope.sequence_number()),
                PurchaseRecord {
                    product_id: e.product_id,
                    quantity: e.quantity,
                    unit_cost: e.unit_cost,
                    incidental_expenses: e.incidental_expenses,
                    supplier: e.supplier,
                    purchased_at: e.occurred_at,
                },
            );
        }

        Ok(())
    }

    /// Rebuild the read model from scratch.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.store.clear();
        self.cursors.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
