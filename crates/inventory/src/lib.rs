//! Inventory domain module (event-sourced).
//!
//! This crate contains business rules for products and their purchase-lot
//! history, implemented purely as deterministic domain logic (no IO, no HTTP,
//! no storage). Cost of goods is attributed FIFO: oldest lot first.

pub mod error;
pub mod fifo;
pub mod product;

pub use error::StockError;
pub use fifo::{ConsumptionPlan, LotDraw, plan_consumption};
pub use product::{
    ConsumeStock, DetailsUpdated, Product, ProductCommand, ProductEvent, ProductId,
    ProductRegistered, PurchaseLot, PurchaseRecorded, RecordPurchase, RegisterProduct,
    StockConsumed, UpdateDetails,
};
