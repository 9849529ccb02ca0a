//! Sale settlement orchestration.
//!
//! A settlement is two dispatches: consume stock on the product stream, then
//! record the sale on its own stream. The first append carries the complete
//! sale snapshot (price, cost, buyer) in one `StockConsumed` event, so the
//! inventory effect is atomic and the product stream doubles as the intent
//! log — if the process dies between the two dispatches, the sale can always
//! be rolled forward from what already committed.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

use stockbook_core::{AggregateId, CustomerInfo, DomainError};
use stockbook_events::{EventBus, EventEnvelope};
use stockbook_inventory::{ConsumeStock, Product, ProductCommand, ProductEvent, ProductId, StockConsumed, StockError};
use stockbook_sales::{OrderStatus, RecordSale, Sale, SaleCommand, SaleId, SaleRecorded};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, EventStoreError};
use crate::{PRODUCT_AGGREGATE_TYPE, SALE_AGGREGATE_TYPE};

/// Total dispatch attempts per settlement before giving up on a product
/// stream that keeps moving underneath us.
const MAX_ATTEMPTS: u32 = 3;

/// Failures surfaced by [`SettlementService`].
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Deterministic stock rejection; surfaced verbatim to the caller.
    #[error(transparent)]
    Stock(#[from] StockError),

    /// The product stream changed on every attempt.
    #[error("settlement abandoned after {attempts} attempts: product {product_id} kept changing")]
    ConcurrentModification { product_id: ProductId, attempts: u32 },

    /// Stock was consumed but the sale record was rejected. The consumption
    /// stays committed; recovery completes the sale later.
    #[error("sale could not be recorded: {0}")]
    SaleRecording(DomainError),

    /// Event store failure.
    #[error("event store failure: {0}")]
    Store(#[from] EventStoreError),

    /// Events were committed but publication to the bus failed; read models
    /// lag until the events are republished.
    #[error("event publication failed: {0}")]
    Publish(String),

    /// A committed event could not be read back — storage corruption.
    #[error("committed settlement event was malformed: {0}")]
    Corrupt(String),
}

/// Orchestrates sale settlement and its crash recovery.
pub struct SettlementService<S, B> {
    store: S,
    dispatcher: CommandDispatcher<S, B>,
}

impl<S, B> SettlementService<S, B>
where
    S: EventStore + Clone,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store: store.clone(),
            dispatcher: CommandDispatcher::new(store, bus),
        }
    }

    /// Settle a sale: consume `quantity` units of `product_id` FIFO, record
    /// the sale as `completed`, and return the recorded sale fact.
    ///
    /// On a concurrency conflict the consume dispatch is retried against a
    /// fresh load, up to [`MAX_ATTEMPTS`] total. Nothing is committed on any
    /// failure path before the consume append succeeds.
    pub fn settle(
        &self,
        product_id: ProductId,
        quantity: i64,
        customer: Option<CustomerInfo>,
        now: DateTime<Utc>,
    ) -> Result<SaleRecorded, SettlementError> {
        let sale_id = SaleId::new(AggregateId::new());

        let mut attempts = 0;
        let committed = loop {
            attempts += 1;
            let command = ProductCommand::ConsumeStock(ConsumeStock {
                product_id,
                sale_id: sale_id.0,
                quantity,
                customer: customer.clone(),
                occurred_at: now,
            });

            match self.dispatcher.dispatch::<Product>(
                product_id.0,
                PRODUCT_AGGREGATE_TYPE,
                command,
                |id| Product::empty(ProductId::new(id)),
            ) {
                Ok(events) => break events,
                Err(DispatchError::Concurrency(msg)) if attempts < MAX_ATTEMPTS => {
                    debug!(%product_id, attempt = attempts, %msg, "retrying settlement after concurrent modification");
                }
                Err(DispatchError::Concurrency(_)) => {
                    warn!(%product_id, attempts, "settlement abandoned: optimistic retries exhausted");
                    return Err(SettlementError::ConcurrentModification { product_id, attempts });
                }
                Err(DispatchError::Domain(err)) => {
                    if let StockError::InsufficientInventory { requested, available } = &err {
                        // The on-hand precheck passed but the lots disagreed:
                        // the denormalized count and the lot ground truth have
                        // diverged. Operator follow-up, not a user error.
                        warn!(
                            %product_id,
                            requested,
                            available,
                            "integrity anomaly: on-hand count does not match lot remainders"
                        );
                    }
                    return Err(SettlementError::Stock(err));
                }
                Err(DispatchError::Deserialize(msg)) => return Err(SettlementError::Corrupt(msg)),
                Err(DispatchError::Store(err)) => return Err(SettlementError::Store(err)),
                Err(DispatchError::Publish(msg)) => {
                    // The consumption is committed; recovery will finish the
                    // sale once the events are republished.
                    warn!(%product_id, %sale_id, %msg, "stock consumed but publication failed");
                    return Err(SettlementError::Publish(msg));
                }
            }
        };

        let consumed = extract_consumption(committed.first().map(|e| &e.payload))?;
        let recorded = self.record_sale(&consumed)?;
        Ok(recorded)
    }

    /// Complete settlements whose stock consumption committed but whose sale
    /// was never recorded (crash or failure between the two appends).
    ///
    /// Idempotent: consumptions whose sale stream already exists are skipped.
    /// Returns the ids of the sales recovered by this pass.
    pub fn recover_unrecorded_sales(&self) -> Result<Vec<SaleId>, SettlementError> {
        let mut recovered = Vec::new();

        for product_stream in self.store.list_streams(PRODUCT_AGGREGATE_TYPE)? {
            for stored in self.store.load_stream(product_stream)? {
                let event: ProductEvent = match serde_json::from_value(stored.payload.clone()) {
                    Ok(ev) => ev,
                    Err(err) => return Err(SettlementError::Corrupt(err.to_string())),
                };
                let ProductEvent::StockConsumed(consumed) = event else {
                    continue;
                };

                if !self.store.load_stream(consumed.sale_id)?.is_empty() {
                    continue;
                }

                warn!(
                    sale_id = %consumed.sale_id,
                    product_id = %consumed.product_id,
                    "completing settlement that consumed stock but never recorded its sale"
                );
                self.record_sale(&consumed)?;
                recovered.push(SaleId::new(consumed.sale_id));
            }
        }

        Ok(recovered)
    }

    /// Administrative order-status transition on a recorded sale.
    pub fn update_order_status(
        &self,
        sale_id: SaleId,
        status: OrderStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), SettlementError> {
        let command = SaleCommand::UpdateOrderStatus(stockbook_sales::UpdateOrderStatus {
            sale_id,
            status,
            reason,
            occurred_at: now,
        });

        match self
            .dispatcher
            .dispatch::<Sale>(sale_id.0, SALE_AGGREGATE_TYPE, command, |id| {
                Sale::empty(SaleId::new(id))
            }) {
            Ok(_) => Ok(()),
            Err(DispatchError::Domain(err)) => Err(SettlementError::SaleRecording(err)),
            Err(DispatchError::Concurrency(msg)) => Err(SettlementError::Store(
                EventStoreError::Concurrency(msg),
            )),
            Err(DispatchError::Deserialize(msg)) => Err(SettlementError::Corrupt(msg)),
            Err(DispatchError::Store(err)) => Err(SettlementError::Store(err)),
            Err(DispatchError::Publish(msg)) => Err(SettlementError::Publish(msg)),
        }
    }

    /// Record the sale derived from a committed consumption. Idempotent: an
    /// already-recorded sale (recovery racing a live settlement) is success.
    fn record_sale(&self, consumed: &StockConsumed) -> Result<SaleRecorded, SettlementError> {
        let record = RecordSale {
            sale_id: SaleId::new(consumed.sale_id),
            product_id: consumed.product_id,
            product_name: consumed.product_name.clone(),
            quantity: consumed.quantity,
            unit_sale_price: consumed.unit_sale_price,
            total_price: consumed.total_price,
            total_cost: consumed.total_cost,
            customer: consumed.customer.clone(),
            status: OrderStatus::Completed,
            occurred_at: consumed.occurred_at,
        };

        let recorded = SaleRecorded {
            sale_id: record.sale_id,
            product_id: record.product_id,
            product_name: record.product_name.clone(),
            quantity: record.quantity,
            unit_sale_price: record.unit_sale_price,
            total_price: record.total_price,
            total_cost: record.total_cost,
            customer: record.customer.clone(),
            status: record.status,
            occurred_at: record.occurred_at,
        };

        match self.dispatcher.dispatch::<Sale>(
            consumed.sale_id,
            SALE_AGGREGATE_TYPE,
            SaleCommand::RecordSale(record),
            |id| Sale::empty(SaleId::new(id)),
        ) {
            Ok(_) => Ok(recorded),
            // Someone (a recovery pass, or the settlement we are recovering)
            // already recorded this sale.
            Err(DispatchError::Domain(DomainError::Conflict(_)))
            | Err(DispatchError::Concurrency(_)) => Ok(recorded),
            Err(DispatchError::Domain(err)) => Err(SettlementError::SaleRecording(err)),
            Err(DispatchError::Deserialize(msg)) => Err(SettlementError::Corrupt(msg)),
            Err(DispatchError::Store(err)) => Err(SettlementError::Store(err)),
            Err(DispatchError::Publish(msg)) => Err(SettlementError::Publish(msg)),
        }
    }
}

fn extract_consumption(payload: Option<&JsonValue>) -> Result<StockConsumed, SettlementError> {
    let payload = payload.ok_or_else(|| {
        SettlementError::Corrupt("consume dispatch committed no events".to_string())
    })?;

    match serde_json::from_value::<ProductEvent>(payload.clone()) {
        Ok(ProductEvent::StockConsumed(consumed)) => Ok(consumed),
        Ok(other) => Err(SettlementError::Corrupt(format!(
            "expected a stock consumption, found {other:?}"
        ))),
        Err(err) => Err(SettlementError::Corrupt(err.to_string())),
    }
}
