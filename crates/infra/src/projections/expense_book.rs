//! Expense book read model.
//!
//! One record per standalone operating expense. Feeds the expense side of
//! the financial rollups and the expense listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockbook_core::Money;
use stockbook_events::EventEnvelope;
use stockbook_finance::{DateWindow, ExpenseEvent, ExpenseFigures, ExpenseId};

use crate::EXPENSE_AGGREGATE_TYPE;
use crate::projections::{ProjectionError, StreamCursors};
use crate::read_model::ReadModelStore;

/// Read model: one recorded expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub expense_id: ExpenseId,
    pub category: String,
    pub amount: Money,
    pub description: Option<String>,
    pub incurred_at: DateTime<Utc>,
}

impl ExpenseRecord {
    /// The slice of this record the financial rollups need.
    pub fn figures(&self) -> ExpenseFigures {
        ExpenseFigures {
            incurred_at: self.incurred_at,
            amount: self.amount,
        }
    }
}

/// Expense book projection, fed by expense events.
#[derive(Debug)]
pub struct ExpenseBookProjection<S>
where
    S: ReadModelStore<ExpenseId, ExpenseRecord>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> ExpenseBookProjection<S>
where
    S: ReadModelStore<ExpenseId, ExpenseRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, expense_id: &ExpenseId) -> Option<ExpenseRecord> {
        self.store.get(expense_id)
    }

    /// All expenses, newest first.
    pub fn list(&self) -> Vec<ExpenseRecord> {
        let mut records = self.store.list();
        records.sort_by(|a, b| {
            b.incurred_at
                .cmp(&a.incurred_at)
                .then_with(|| b.expense_id.0.as_uuid().cmp(a.expense_id.0.as_uuid()))
        });
        records
    }

    /// Expenses dated within the window, newest first.
    pub fn in_window(&self, window: &DateWindow) -> Vec<ExpenseRecord> {
        self.list()
            .into_iter()
            .filter(|r| window.contains(r.incurred_at))
            .collect()
    }

    /// Rollup inputs for every recorded expense.
    pub fn figures(&self) -> Vec<ExpenseFigures> {
        self.store
            .list()
            .iter()
            .map(ExpenseRecord::figures)
            .collect()
    }

    /// Apply one published envelope. Non-expense envelopes are ignored.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != EXPENSE_AGGREGATE_TYPE {
            return Ok(());
        }

        let event: ExpenseEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let ExpenseEvent::ExpenseRecorded(e) = &event;
        if e.expense_id.0 != envelope.aggregate_id() {
            return Err(ProjectionError::EnvelopeMismatch(
                "event expense_id does not match envelope aggregate_id".to_string(),
            ));
        }

        if !self
            .cursors
            .observe(envelope.aggregate_id(), envelope.sequence_number())?
        {
            return Ok(());
        }

        let ExpenseEvent::ExpenseRecorded(e) = event;
        self.store.upsert(
            e.expense_id,
            ExpenseRecord {
                expense_id: e.expense_id,
                category: e.category,
                amount: e.amount,
                description: e.description,
                incurred_at: e.occurred_at,
            },
        );

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
