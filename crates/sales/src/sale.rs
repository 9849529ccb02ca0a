use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{Aggregate, AggregateId, AggregateRoot, CustomerInfo, DomainError, Money};
use stockbook_events::Event;
use stockbook_inventory::ProductId;

/// Sale identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaleId(pub AggregateId);

impl SaleId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SaleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Administrative transitions only; none of them touch inventory.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Cancelled)
                | (Processing, Refunded)
                | (Completed, Cancelled)
                | (Completed, Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// Aggregate root: Sale.
///
/// Created once by sale settlement with its financial figures already
/// computed (price snapshot, exact FIFO cost). Those figures are immutable
/// facts: there is no command that changes them, only the order status and
/// its rejection reason move after recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    id: SaleId,
    product_id: Option<ProductId>,
    product_name: String,
    quantity: i64,
    unit_sale_price: Money,
    total_price: Money,
    total_cost: Money,
    customer: Option<CustomerInfo>,
    status: OrderStatus,
    rejection_reason: Option<String>,
    sale_date: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Sale {
    /// Create an empty, not-yet-recorded aggregate instance for rehydration.
    pub fn empty(id: SaleId) -> Self {
        Self {
            id,
            product_id: None,
            product_name: String::new(),
            quantity: 0,
            unit_sale_price: Money::zero(),
            total_price: Money::zero(),
            total_cost: Money::zero(),
            customer: None,
            status: OrderStatus::Pending,
            rejection_reason: None,
            sale_date: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SaleId {
        self.id
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn unit_sale_price(&self) -> Money {
        self.unit_sale_price
    }

    pub fn total_price(&self) -> Money {
        self.total_price
    }

    /// Exact FIFO cost charged to this sale.
    pub fn total_cost(&self) -> Money {
        self.total_cost
    }

    /// Per-unit cost rounded to the nearest cent. Display only — reporting
    /// always works from the exact `total_cost`.
    pub fn unit_cost(&self) -> Money {
        if self.quantity == 0 {
            return Money::zero();
        }
        Money::from_cents((self.total_cost.cents() + self.quantity / 2) / self.quantity)
    }

    pub fn customer(&self) -> Option<&CustomerInfo> {
        self.customer.as_ref()
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn sale_date(&self) -> Option<DateTime<Utc>> {
        self.sale_date
    }
}

impl AggregateRoot for Sale {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordSale (issued by settlement after stock was consumed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSale {
    pub sale_id: SaleId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i64,
    pub unit_sale_price: Money,
    pub total_price: Money,
    pub total_cost: Money,
    pub customer: Option<CustomerInfo>,
    pub status: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateOrderStatus (administrative).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOrderStatus {
    pub sale_id: SaleId,
    pub status: OrderStatus,
    /// Only meaningful when cancelling.
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleCommand {
    RecordSale(RecordSale),
    UpdateOrderStatus(UpdateOrderStatus),
}

/// Event: SaleRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecorded {
    pub sale_id: SaleId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i64,
    pub unit_sale_price: Money,
    pub total_price: Money,
    pub total_cost: Money,
    pub customer: Option<CustomerInfo>,
    pub status: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub sale_id: SaleId,
    pub status: OrderStatus,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleEvent {
    SaleRecorded(SaleRecorded),
    OrderStatusChanged(OrderStatusChanged),
}

impl Event for SaleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::SaleRecorded(_) => "sales.sale.recorded",
            SaleEvent::OrderStatusChanged(_) => "sales.sale.status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleEvent::SaleRecorded(e) => e.occurred_at,
            SaleEvent::OrderStatusChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Sale {
    type Command = SaleCommand;
    type Event = SaleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SaleEvent::SaleRecorded(e) => {
                self.id = e.sale_id;
                self.product_id = Some(e.product_id);
                self.product_name = e.product_name.clone();
                self.quantity = e.quantity;
                self.unit_sale_price = e.unit_sale_price;
                self.total_price = e.total_price;
                self.total_cost = e.total_cost;
                self.customer = e.customer.clone();
                self.status = e.status;
                self.rejection_reason = None;
                self.sale_date = Some(e.occurred_at);
                self.created = true;
            }
            SaleEvent::OrderStatusChanged(e) => {
                self.status = e.status;
                if e.status == OrderStatus::Cancelled {
                    self.rejection_reason = e.reason.clone();
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SaleCommand::RecordSale(cmd) => self.handle_record(cmd),
            SaleCommand::UpdateOrderStatus(cmd) => self.handle_update_status(cmd),
        }
    }
}

impl Sale {
    fn ensure_sale_id(&self, sale_id: SaleId) -> Result<(), DomainError> {
        if self.id != sale_id {
            return Err(DomainError::invariant("sale_id mismatch"));
        }
        Ok(())
    }

    fn handle_record(&self, cmd: &RecordSale) -> Result<Vec<SaleEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sale already recorded"));
        }

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if cmd.unit_sale_price.is_negative() || cmd.total_cost.is_negative() {
            return Err(DomainError::validation("amounts cannot be negative"));
        }
        let expected_total = cmd
            .unit_sale_price
            .times(cmd.quantity)
            .ok_or_else(|| DomainError::invariant("total price overflows"))?;
        if cmd.total_price != expected_total {
            return Err(DomainError::invariant(
                "total price must equal unit price times quantity",
            ));
        }

        Ok(vec![SaleEvent::SaleRecorded(SaleRecorded {
            sale_id: cmd.sale_id,
            product_id: cmd.product_id,
            product_name: cmd.product_name.clone(),
            quantity: cmd.quantity,
            unit_sale_price: cmd.unit_sale_price,
            total_price: cmd.total_price,
            total_cost: cmd.total_cost,
            customer: cmd.customer.clone(),
            status: cmd.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_status(&self, cmd: &UpdateOrderStatus) -> Result<Vec<SaleEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_sale_id(cmd.sale_id)?;

        if cmd.reason.is_some() && cmd.status != OrderStatus::Cancelled {
            return Err(DomainError::validation(
                "a rejection reason only applies to cancelled orders",
            ));
        }
        if cmd.status == self.status {
            return Err(DomainError::conflict(format!(
                "sale is already {}",
                self.status
            )));
        }
        if !self.status.can_transition_to(cmd.status) {
            return Err(DomainError::invariant(format!(
                "cannot move a {} sale to {}",
                self.status, cmd.status
            )));
        }

        Ok(vec![SaleEvent::OrderStatusChanged(OrderStatusChanged {
            sale_id: cmd.sale_id,
            status: cmd.status,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
