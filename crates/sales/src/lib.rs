//! Sales domain module (event-sourced).
//!
//! This crate contains business rules for recorded sales, implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage). A sale's
//! financial figures are frozen at settlement; only its order status moves
//! afterwards.

pub mod sale;

pub use sale::{
    OrderStatus, OrderStatusChanged, RecordSale, Sale, SaleCommand, SaleEvent, SaleId,
    SaleRecorded, UpdateOrderStatus,
};
