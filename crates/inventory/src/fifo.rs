//! FIFO consumption planning.
//!
//! The planner is pure: it inspects a product's lots and produces a plan
//! (which lot gives up how many units, at what cost), never mutating
//! anything. The `Product` aggregate turns an accepted plan into a single
//! event, and only `apply` touches lot state — so a rejected plan cannot
//! leave partial consumption behind.

use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, Money};

use crate::error::StockError;
use crate::product::PurchaseLot;

/// Units drawn from one lot, identified by its position in the product's
/// append-only lot list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotDraw {
    pub lot: usize,
    pub quantity: i64,
    pub unit_cost: Money,
}

impl LotDraw {
    /// Exact cost of this draw.
    pub fn cost(&self) -> Money {
        // Bounded by the plan total, which is overflow-checked at build time.
        Money::from_cents(self.quantity * self.unit_cost.cents())
    }
}

/// The outcome of a FIFO walk: per-lot draws and the exact total cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumptionPlan {
    pub draws: Vec<LotDraw>,
    pub total_cost: Money,
}

/// Plan the FIFO consumption of `quantity` units from `lots`.
///
/// Lots with stock remaining are visited oldest purchase first; ties on the
/// purchase timestamp fall back to insertion order (stable sort). Each lot
/// gives up `min(needed, remaining)` units at its own unit cost; costs are
/// accumulated exactly, with no per-lot rounding.
///
/// Errors:
/// - `InvalidQuantity` if `quantity` ≤ 0 — a zero consumption is a caller
///   bug, not a no-op.
/// - `InsufficientInventory` if the lots cannot cover the request; no
///   partial plan is returned.
pub fn plan_consumption(lots: &[PurchaseLot], quantity: i64) -> Result<ConsumptionPlan, StockError> {
    if quantity <= 0 {
        return Err(StockError::InvalidQuantity(quantity));
    }

    let mut open: Vec<usize> = (0..lots.len())
        .filter(|&i| lots[i].remaining > 0)
        .collect();
    open.sort_by_key(|&i| lots[i].purchased_at);

    let mut needed = quantity;
    let mut total: i128 = 0;
    let mut draws = Vec::new();

    for i in open {
        if needed == 0 {
            break;
        }
        let lot = &lots[i];
        let take = needed.min(lot.remaining);
        total += i128::from(take) * i128::from(lot.unit_cost.cents());
        draws.push(LotDraw {
            lot: i,
            quantity: take,
            unit_cost: lot.unit_cost,
        });
        needed -= take;
    }

    if needed > 0 {
        return Err(StockError::InsufficientInventory {
            requested: quantity,
            available: quantity - needed,
        });
    }

    let total_cost = i64::try_from(total)
        .map(Money::from_cents)
        .map_err(|_| DomainError::invariant("total consumption cost overflows"))?;

    Ok(ConsumptionPlan { draws, total_cost })
}
