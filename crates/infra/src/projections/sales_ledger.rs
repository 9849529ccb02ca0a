//! Sales ledger read model.
//!
//! One record per sale: the immutable financial snapshot plus the current
//! order status. Backs the sales listing, customer purchase history, and the
//! financial rollups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockbook_core::{CustomerInfo, Money};
use stockbook_events::EventEnvelope;
use stockbook_finance::{DateWindow, SaleFigures};
use stockbook_inventory::ProductId;
use stockbook_sales::{OrderStatus, SaleEvent, SaleId};

use crate::SALE_AGGREGATE_TYPE;
use crate::projections::{ProjectionError, StreamCursors};
use crate::read_model::ReadModelStore;

/// Read model: one sale, suitable for direct serialization to a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub sale_id: SaleId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i64,
    pub unit_sale_price: Money,
    pub total_price: Money,
    pub total_cost: Money,
    pub customer: Option<CustomerInfo>,
    pub status: OrderStatus,
    pub rejection_reason: Option<String>,
    pub sale_date: DateTime<Utc>,
}

impl SaleRecord {
    /// The slice of this record the financial rollups need.
    pub fn figures(&self) -> SaleFigures {
        SaleFigures {
            sale_date: self.sale_date,
            status: self.status,
            total_price: self.total_price,
            total_cost: self.total_cost,
        }
    }
}

/// Sales ledger projection, fed by sale events.
#[derive(Debug)]
pub struct SalesLedgerProjection<S>
where
    S: ReadModelStore<SaleId, SaleRecord>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> SalesLedgerProjection<S>
where
    S: ReadModelStore<SaleId, SaleRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, sale_id: &SaleId) -> Option<SaleRecord> {
        self.store.get(sale_id)
    }

    /// All sales, newest first.
    pub fn list(&self) -> Vec<SaleRecord> {
        let mut records = self.store.list();
        records.sort_by(|a, b| {
            b.sale_date
                .cmp(&a.sale_date)
                .then_with(|| b.sale_id.0.as_uuid().cmp(a.sale_id.0.as_uuid()))
        });
        records
    }

    /// The `limit` most recent sales.
    pub fn recent(&self, limit: usize) -> Vec<SaleRecord> {
        let mut records = self.list();
        records.truncate(limit);
        records
    }

    /// A customer's purchases, newest first.
    pub fn by_customer_email(&self, email: &str) -> Vec<SaleRecord> {
        self.list()
            .into_iter()
            .filter(|r| r.customer.as_ref().is_some_and(|c| c.email == email))
            .collect()
    }

    /// Sales dated within the window, any status, newest first.
    pub fn in_window(&self, window: &DateWindow) -> Vec<SaleRecord> {
        self.list()
            .into_iter()
            .filter(|r| window.contains(r.sale_date))
            .collect()
    }

    /// Rollup inputs for every recorded sale.
    pub fn figures(&self) -> Vec<SaleFigures> {
        self.store.list().iter().map(SaleRecord::figures).collect()
    }

    /// Apply one published envelope. Non-sale envelopes are ignored.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != SALE_AGGREGATE_TYPE {
            return Ok(());
        }

        let event: SaleEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let sale_id = match &event {
            SaleEvent::SaleRecorded(e) => e.sale_id,
            SaleEvent::OrderStatusChanged(e) => e.sale_id,
        };
        if sale_id.0 != envelope.aggregate_id() {
            return Err(ProjectionError::EnvelopeMismatch(
                "event sale_id does not match envelope aggregate_id".to_string(),
            ));
        }

        if !self
            .cursors
            .observe(envelope.aggregate_id(), envelope.sequence_number())?
        {
            return Ok(());
        }

        match event {
            SaleEvent::SaleRecorded(e) => {
                self.store.upsert(
                    e.sale_id,
                    SaleRecord {
                        sale_id: e.sale_id,
                        product_id: e.product_id,
                        product_name: e.product_name,
                        quantity: e.quantity,
                        unit_sale_price: e.unit_sale_price,
                        total_price: e.total_price,
                        total_cost: e.total_cost,
                        customer: e.customer,
                        status: e.status,
                        rejection_reason: None,
                        sale_date: e.occurred_at,
                    },
                );
            }
            SaleEvent::OrderStatusChanged(e) => {
                if let Some(mut record) = self.store.get(&e.sale_id) {
                    record.status = e.status;
                    if e.status == OrderStatus::Cancelled {
                        record.rejection_reason = e.reason;
                    }
                    self.store.upsert(e.sale_id, record);
                }
            }
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
