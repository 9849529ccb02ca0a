use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{Aggregate, AggregateId, AggregateRoot, CustomerInfo, DomainError, Money};
use stockbook_events::Event;

use crate::error::StockError;
use crate::fifo::{LotDraw, plan_consumption};

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A batch of inventory acquired in one purchase event.
///
/// Lots are append-only: once created, only `remaining` ever changes, and it
/// only decreases. Depleted lots stay in the list as the historical cost
/// basis of past sales.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLot {
    pub purchased_at: DateTime<Utc>,
    pub quantity: i64,
    pub unit_cost: Money,
    /// Incidental acquisition expenses (freight etc.). Recorded for the
    /// operating-expense rollup; never amortized into the per-unit cost.
    pub incidental_expenses: Money,
    pub supplier: Option<String>,
    pub remaining: i64,
}

/// Aggregate root: Product.
///
/// `quantity` is the denormalized on-hand count. It is only ever changed by
/// applying the same events that change the lots, so it cannot drift from the
/// lot-remainder sum within this model; the consumption path still verifies
/// both independently (see `StockError`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    name: String,
    description: Option<String>,
    price: Money,
    quantity: i64,
    lots: Vec<PurchaseLot>,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            name: String::new(),
            description: None,
            price: Money::zero(),
            quantity: 0,
            lots: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Current list price.
    pub fn price(&self) -> Money {
        self.price
    }

    /// Denormalized on-hand count.
    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn lots(&self) -> &[PurchaseLot] {
        &self.lots
    }

    /// Ground truth: units remaining across all lots.
    pub fn lot_remaining_total(&self) -> i64 {
        self.lots.iter().map(|l| l.remaining).sum()
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProduct {
    pub product_id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPurchase (adds a lot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPurchase {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_cost: Money,
    pub incidental_expenses: Money,
    pub supplier: Option<String>,
    /// Optionally reprice the product along with the purchase.
    pub new_price: Option<Money>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateDetails (name/description/price edits).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub product_id: ProductId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConsumeStock (FIFO, issued by sale settlement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeStock {
    pub product_id: ProductId,
    /// Identifier under which the settlement records the resulting sale.
    pub sale_id: AggregateId,
    pub quantity: i64,
    /// Buyer contact for external sales; passed through into the event so the
    /// committed settlement carries everything the sale record needs.
    pub customer: Option<CustomerInfo>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    RegisterProduct(RegisterProduct),
    RecordPurchase(RecordPurchase),
    UpdateDetails(UpdateDetails),
    ConsumeStock(ConsumeStock),
}

/// Event: ProductRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRegistered {
    pub product_id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecorded {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_cost: Money,
    pub incidental_expenses: Money,
    pub supplier: Option<String>,
    pub new_price: Option<Money>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DetailsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsUpdated {
    pub product_id: ProductId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockConsumed.
///
/// One settlement is one event: the lot draws, the exact FIFO cost, and the
/// price/name snapshots the sale needs all commit together or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockConsumed {
    pub product_id: ProductId,
    pub sale_id: AggregateId,
    pub quantity: i64,
    pub draws: Vec<LotDraw>,
    /// Exact FIFO cost of the consumed units (no per-lot rounding).
    pub total_cost: Money,
    /// List price at the instant of consumption.
    pub unit_sale_price: Money,
    pub total_price: Money,
    /// Name snapshot; later edits must not rewrite historical sales.
    pub product_name: String,
    pub customer: Option<CustomerInfo>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductRegistered(ProductRegistered),
    PurchaseRecorded(PurchaseRecorded),
    DetailsUpdated(DetailsUpdated),
    StockConsumed(StockConsumed),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductRegistered(_) => "inventory.product.registered",
            ProductEvent::PurchaseRecorded(_) => "inventory.product.purchase_recorded",
            ProductEvent::DetailsUpdated(_) => "inventory.product.details_updated",
            ProductEvent::StockConsumed(_) => "inventory.product.stock_consumed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductRegistered(e) => e.occurred_at,
            ProductEvent::PurchaseRecorded(e) => e.occurred_at,
            ProductEvent::DetailsUpdated(e) => e.occurred_at,
            ProductEvent::StockConsumed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = StockError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductRegistered(e) => {
                self.id = e.product_id;
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.price = e.price;
                self.quantity = 0;
                self.lots.clear();
                self.created = true;
            }
            ProductEvent::PurchaseRecorded(e) => {
                self.lots.push(PurchaseLot {
                    purchased_at: e.occurred_at,
                    quantity: e.quantity,
                    unit_cost: e.unit_cost,
                    incidental_expenses: e.incidental_expenses,
                    supplier: e.supplier.clone(),
                    remaining: e.quantity,
                });
                self.quantity += e.quantity;
                if let Some(price) = e.new_price {
                    self.price = price;
                }
            }
            ProductEvent::DetailsUpdated(e) => {
                if let Some(name) = &e.name {
                    self.name = name.clone();
                }
                if let Some(description) = &e.description {
                    self.description = Some(description.clone());
                }
                if let Some(price) = e.price {
                    self.price = price;
                }
            }
            ProductEvent::StockConsumed(e) => {
                for draw in &e.draws {
                    self.lots[draw.lot].remaining -= draw.quantity;
                }
                self.quantity -= e.quantity;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::RegisterProduct(cmd) => self.handle_register(cmd),
            ProductCommand::RecordPurchase(cmd) => self.handle_purchase(cmd),
            ProductCommand::UpdateDetails(cmd) => self.handle_update(cmd),
            ProductCommand::ConsumeStock(cmd) => self.handle_consume(cmd),
        }
    }
}

impl Product {
    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), StockError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch").into());
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterProduct) -> Result<Vec<ProductEvent>, StockError> {
        if self.created {
            return Err(DomainError::conflict("product already exists").into());
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty").into());
        }
        if !cmd.price.is_positive() {
            return Err(DomainError::validation("price must be positive").into());
        }

        Ok(vec![ProductEvent::ProductRegistered(ProductRegistered {
            product_id: cmd.product_id,
            name: cmd.name.clone(),
            description: cmd.description.clone(),
            price: cmd.price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_purchase(&self, cmd: &RecordPurchase) -> Result<Vec<ProductEvent>, StockError> {
        if !self.created {
            return Err(StockError::ProductNotFound);
        }
        self.ensure_product_id(cmd.product_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("purchase quantity must be positive").into());
        }
        if cmd.unit_cost.is_negative() {
            return Err(DomainError::validation("unit cost cannot be negative").into());
        }
        if cmd.incidental_expenses.is_negative() {
            return Err(DomainError::validation("incidental expenses cannot be negative").into());
        }
        if let Some(price) = cmd.new_price {
            if !price.is_positive() {
                return Err(DomainError::validation("price must be positive").into());
            }
        }

        Ok(vec![ProductEvent::PurchaseRecorded(PurchaseRecorded {
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            unit_cost: cmd.unit_cost,
            incidental_expenses: cmd.incidental_expenses,
            supplier: cmd.supplier.clone(),
            new_price: cmd.new_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateDetails) -> Result<Vec<ProductEvent>, StockError> {
        if !self.created {
            return Err(StockError::ProductNotFound);
        }
        self.ensure_product_id(cmd.product_id)?;

        if cmd.name.is_none() && cmd.description.is_none() && cmd.price.is_none() {
            return Ok(vec![]);
        }
        if let Some(name) = &cmd.name {
            if name.trim().is_empty() {
                return Err(DomainError::validation("name cannot be empty").into());
            }
        }
        if let Some(price) = cmd.price {
            if !price.is_positive() {
                return Err(DomainError::validation("price must be positive").into());
            }
        }

        Ok(vec![ProductEvent::DetailsUpdated(DetailsUpdated {
            product_id: cmd.product_id,
            name: cmd.name.clone(),
            description: cmd.description.clone(),
            price: cmd.price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_consume(&self, cmd: &ConsumeStock) -> Result<Vec<ProductEvent>, StockError> {
        if !self.created {
            return Err(StockError::ProductNotFound);
        }
        self.ensure_product_id(cmd.product_id)?;

        if cmd.quantity <= 0 {
            return Err(StockError::InvalidQuantity(cmd.quantity));
        }

        // Fast precheck against the on-hand count; the lot walk below is the
        // authoritative guard. Both must agree on a consistent aggregate.
        if cmd.quantity > self.quantity {
            return Err(StockError::InsufficientStock {
                available: self.quantity,
            });
        }

        let plan = plan_consumption(&self.lots, cmd.quantity)?;

        let total_price = self
            .price
            .times(cmd.quantity)
            .ok_or_else(|| StockError::from(DomainError::invariant("total price overflows")))?;

        Ok(vec![ProductEvent::StockConsumed(StockConsumed {
            product_id: cmd.product_id,
            sale_id: cmd.sale_id,
            quantity: cmd.quantity,
            draws: plan.draws,
            total_cost: plan.total_cost,
            unit_sale_price: self.price,
            total_price,
            product_name: self.name.clone(),
            customer: cmd.customer.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    /// A registered product with the given list price, empty lot history.
    fn registered(price_cents: i64) -> (Product, ProductId) {
        let product_id = test_product_id();
        let mut product = Product::empty(product_id);
        let events = product
            .handle(&ProductCommand::RegisterProduct(RegisterProduct {
                product_id,
                name: "Widget".to_string(),
                description: None,
                price: Money::from_cents(price_cents),
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);
        (product, product_id)
    }

    fn purchase(
        product: &mut Product,
        product_id: ProductId,
        quantity: i64,
        unit_cost_cents: i64,
        at: DateTime<Utc>,
    ) {
        let events = product
            .handle(&ProductCommand::RecordPurchase(RecordPurchase {
                product_id,
                quantity,
                unit_cost: Money::from_cents(unit_cost_cents),
                incidental_expenses: Money::zero(),
                supplier: None,
                new_price: None,
                occurred_at: at,
            }))
            .unwrap();
        product.apply(&events[0]);
    }

    fn consume(product: &mut Product, product_id: ProductId, quantity: i64) -> StockConsumed {
        let events = product
            .handle(&ProductCommand::ConsumeStock(ConsumeStock {
                product_id,
                sale_id: AggregateId::new(),
                customer: None,
                quantity,
                occurred_at: test_time(),
            }))
            .unwrap();
        let consumed = match &events[0] {
            ProductEvent::StockConsumed(e) => e.clone(),
            other => panic!("expected StockConsumed, got {other:?}"),
        };
        product.apply(&events[0]);
        consumed
    }

    #[test]
    fn register_product_emits_registered_event() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);

        let events = product
            .handle(&ProductCommand::RegisterProduct(RegisterProduct {
                product_id,
                name: "Widget".to_string(),
                description: Some("A widget".to_string()),
                price: Money::from_cents(999),
                occurred_at: test_time(),
            }))
            .unwrap();

        assert_eq!(events.len(), 1);
        match &events[0] {
            ProductEvent::ProductRegistered(e) => {
                assert_eq!(e.product_id, product_id);
                assert_eq!(e.name, "Widget");
                assert_eq!(e.price, Money::from_cents(999));
            }
            _ => panic!("Expected ProductRegistered event"),
        }
    }

    #[test]
    fn register_rejects_non_positive_price() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);

        let err = product
            .handle(&ProductCommand::RegisterProduct(RegisterProduct {
                product_id,
                name: "Widget".to_string(),
                description: None,
                price: Money::zero(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, StockError::Domain(DomainError::Validation(_))));
    }

    #[test]
    fn purchase_creates_lot_and_raises_on_hand_count() {
        let (mut product, product_id) = registered(999);
        purchase(&mut product, product_id, 10, 500, test_time());

        assert_eq!(product.quantity(), 10);
        assert_eq!(product.lots().len(), 1);
        assert_eq!(product.lots()[0].remaining, 10);
        assert_eq!(product.lot_remaining_total(), product.quantity());
    }

    #[test]
    fn purchase_can_reprice_the_product() {
        let (mut product, product_id) = registered(999);

        let events = product
            .handle(&ProductCommand::RecordPurchase(RecordPurchase {
                product_id,
                quantity: 5,
                unit_cost: Money::from_cents(400),
                incidental_expenses: Money::from_cents(250),
                supplier: Some("Acme Supply".to_string()),
                new_price: Some(Money::from_cents(1_299)),
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);

        assert_eq!(product.price(), Money::from_cents(1_299));
        assert_eq!(product.lots()[0].supplier.as_deref(), Some("Acme Supply"));
    }

    #[test]
    fn consume_exactly_depletes_a_single_lot() {
        let (mut product, product_id) = registered(999);
        purchase(&mut product, product_id, 10, 500, test_time());

        let consumed = consume(&mut product, product_id, 10);

        assert_eq!(consumed.total_cost, Money::from_cents(5_000));
        assert_eq!(product.lots()[0].remaining, 0);
        assert_eq!(product.quantity(), 0);
    }

    #[test]
    fn consume_draws_from_oldest_lot_first() {
        let (mut product, product_id) = registered(999);
        let t0 = test_time();
        // Older lot: 3 at 4.00; newer lot: 10 at 6.00.
        purchase(&mut product, product_id, 3, 400, t0);
        purchase(&mut product, product_id, 10, 600, t0 + Duration::days(1));

        let consumed = consume(&mut product, product_id, 5);

        // 3 × 4.00 + 2 × 6.00 = 24.00.
        assert_eq!(consumed.total_cost, Money::from_cents(2_400));
        assert_eq!(product.lots()[0].remaining, 0);
        assert_eq!(product.lots()[1].remaining, 8);
        assert_eq!(product.quantity(), 8);
    }

    #[test]
    fn consume_captures_price_and_name_snapshots() {
        let (mut product, product_id) = registered(1_000);
        purchase(&mut product, product_id, 10, 500, test_time());

        let consumed = consume(&mut product, product_id, 2);
        assert_eq!(consumed.unit_sale_price, Money::from_cents(1_000));
        assert_eq!(consumed.total_price, Money::from_cents(2_000));
        assert_eq!(consumed.product_name, "Widget");

        // A later reprice must not have affected the captured snapshot.
        let events = product
            .handle(&ProductCommand::UpdateDetails(UpdateDetails {
                product_id,
                name: None,
                description: None,
                price: Some(Money::from_cents(2_000)),
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);
        assert_eq!(consumed.unit_sale_price, Money::from_cents(1_000));
    }

    #[test]
    fn consume_more_than_on_hand_reports_available() {
        let (mut product, product_id) = registered(999);
        purchase(&mut product, product_id, 4, 500, test_time());

        let before = product.clone();
        let err = product
            .handle(&ProductCommand::ConsumeStock(ConsumeStock {
                product_id,
                sale_id: AggregateId::new(),
                customer: None,
                quantity: 5,
                occurred_at: test_time(),
            }))
            .unwrap_err();

        assert_eq!(err, StockError::InsufficientStock { available: 4 });
        // All-or-nothing: the failed attempt left no trace.
        assert_eq!(product, before);
    }

    #[test]
    fn consume_zero_or_negative_is_invalid() {
        let (mut product, product_id) = registered(999);
        purchase(&mut product, product_id, 4, 500, test_time());

        for quantity in [0, -3] {
            let err = product
                .handle(&ProductCommand::ConsumeStock(ConsumeStock {
                    product_id,
                    sale_id: AggregateId::new(),
                    customer: None,
                    quantity,
                    occurred_at: test_time(),
                }))
                .unwrap_err();
            assert_eq!(err, StockError::InvalidQuantity(quantity));
        }
    }

    #[test]
    fn consume_on_unregistered_product_is_not_found() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);

        let err = product
            .handle(&ProductCommand::ConsumeStock(ConsumeStock {
                product_id,
                sale_id: AggregateId::new(),
                customer: None,
                quantity: 1,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, StockError::ProductNotFound);
    }

    #[test]
    fn successive_settlements_respect_prior_depletion() {
        let (mut product, product_id) = registered(999);
        let t0 = test_time();
        purchase(&mut product, product_id, 3, 400, t0);
        purchase(&mut product, product_id, 10, 600, t0 + Duration::days(1));

        let first = consume(&mut product, product_id, 2);
        assert_eq!(first.total_cost, Money::from_cents(800));

        // The older lot has 1 unit left; the next sale spans into the newer lot.
        let second = consume(&mut product, product_id, 4);
        assert_eq!(second.total_cost, Money::from_cents(400 + 3 * 600));
        assert_eq!(product.lots()[0].remaining, 0);
        assert_eq!(product.lots()[1].remaining, 7);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let (mut product, product_id) = registered(999);
        purchase(&mut product, product_id, 10, 500, test_time());
        let snapshot = product.clone();

        let cmd = ProductCommand::ConsumeStock(ConsumeStock {
            product_id,
            sale_id: AggregateId::new(),
            customer: None,
            quantity: 5,
            occurred_at: test_time(),
        });

        let events1 = product.handle(&cmd).unwrap();
        let events2 = product.handle(&cmd).unwrap();

        assert_eq!(product, snapshot);
        assert_eq!(events1, events2);
    }

    #[test]
    fn apply_is_deterministic() {
        let product_id = test_product_id();
        let t0 = test_time();

        let registered = ProductEvent::ProductRegistered(ProductRegistered {
            product_id,
            name: "Widget".to_string(),
            description: None,
            price: Money::from_cents(999),
            occurred_at: t0,
        });
        let purchased = ProductEvent::PurchaseRecorded(PurchaseRecorded {
            product_id,
            quantity: 10,
            unit_cost: Money::from_cents(500),
            incidental_expenses: Money::zero(),
            supplier: None,
            new_price: None,
            occurred_at: t0,
        });

        let mut a = Product::empty(product_id);
        let mut b = Product::empty(product_id);
        for ev in [&registered, &purchased] {
            a.apply(ev);
            b.apply(ev);
        }

        assert_eq!(a, b);
        assert_eq!(a.version(), 2);
    }

    #[test]
    fn empty_update_emits_nothing() {
        let (product, product_id) = registered(999);

        let events = product
            .handle(&ProductCommand::UpdateDetails(UpdateDetails {
                product_id,
                name: None,
                description: None,
                price: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }
}
