//! Product catalog read model.
//!
//! One record per product: current details, price, and on-hand quantity.
//! Backs the catalog listing, in-stock filtering, and the low-inventory view.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockbook_core::Money;
use stockbook_events::EventEnvelope;
use stockbook_inventory::{ProductEvent, ProductId};

use crate::PRODUCT_AGGREGATE_TYPE;
use crate::projections::{ProjectionError, StreamCursors};
use crate::read_model::ReadModelStore;

/// Read model: one product as the catalog sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub quantity: i64,
}

/// Product catalog projection, fed by product events.
#[derive(Debug)]
pub struct ProductCatalogProjection<S>
where
    S: ReadModelStore<ProductId, ProductRecord>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> ProductCatalogProjection<S>
where
    S: ReadModelStore<ProductId, ProductRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, product_id: &ProductId) -> Option<ProductRecord> {
        self.store.get(product_id)
    }

    /// All products, name order.
    pub fn list(&self) -> Vec<ProductRecord> {
        let mut records = self.store.list();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Products with stock on hand, name order.
    pub fn list_in_stock(&self) -> Vec<ProductRecord> {
        self.list().into_iter().filter(|p| p.quantity > 0).collect()
    }

    /// The `limit` products closest to running out.
    pub fn lowest_stock(&self, limit: usize) -> Vec<ProductRecord> {
        let mut records = self.store.list();
        records.sort_by(|a, b| a.quantity.cmp(&b.quantity).then(a.name.cmp(&b.name)));
        records.truncate(limit);
        records
    }

    /// Apply one published envelope. Non-product envelopes are ignored.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != PRODUCT_AGGREGATE_TYPE {
            return Ok(());
        }

        let event: ProductEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let product_id = match &event {
            ProductEvent::ProductRegistered(e) => e.product_id,
            ProductEvent::PurchaseRecorded(e) => e.product_id,
            ProductEvent::DetailsUpdated(e) => e.product_id,
            ProductEvent::StockConsumed(e) => e.product_id,
        };
        if product_id.0 != envelope.aggregate_id() {
            return Err(ProjectionError::EnvelopeMismatch(
                "event product_id does not match envelope aggregate_id".to_string(),
            ));
        }

        if !self
            .cursors
            .observe(envelope.aggregate_id(), envelope.sequence_number())?
        {
            return Ok(());
        }

        match event {
            ProductEvent::ProductRegistered(e) => {
                self.store.upsert(
                    e.product_id,
                    ProductRecord {
                        product_id: e.product_id,
                        name: e.name,
                        description: e.description,
                        price: e.price,
                        quantity: 0,
                    },
                );
            }
            ProductEvent::PurchaseRecorded(e) => {
                if let Some(mut record) = self.store.get(&e.product_id) {
                    record.quantity += e.quantity;
                    if let Some(price) = e.new_price {
                        record.price = price;
                    }
                    self.store.upsert(e.product_id, record);
                }
            }
            ProductEvent::DetailsUpdated(e) => {
                if let Some(mut record) = self.store.get(&e.product_id) {
                    if let Some(name) = e.name {
                        record.name = name;
                    }
                    if let Some(description) = e.description {
                        record.description = Some(description);
                    }
                    if let Some(price) = e.price {
                        record.price = price;
                    }
                    self.store.upsert(e.product_id, record);
                }
            }
            ProductEvent::StockConsumed(e) => {
                if let Some(mut record) = self.store.get(&e.product_id) {
                    record.quantity -= e.quantity;
                    self.store.upsert(e.product_id, record);
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
