//! Period financial rollups.
//!
//! Pure functions over explicit record slices. Cost of goods sold always
//! comes from the cost recorded on each sale at settlement time — never from
//! a fresh walk of today's lots — so later inventory activity cannot rewrite
//! a period that already closed.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::Money;
use stockbook_sales::OrderStatus;

use crate::period::DateWindow;

/// The slice of a sale that reporting needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaleFigures {
    pub sale_date: DateTime<Utc>,
    pub status: OrderStatus,
    pub total_price: Money,
    /// Exact FIFO cost recorded at settlement.
    pub total_cost: Money,
}

/// The slice of a purchase lot that reporting needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseFigures {
    pub purchased_at: DateTime<Utc>,
    pub quantity: i64,
    pub unit_cost: Money,
    pub incidental_expenses: Money,
}

/// The slice of a standalone expense that reporting needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpenseFigures {
    pub incurred_at: DateTime<Utc>,
    pub amount: Money,
}

/// Where the period's operating money went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseBreakdown {
    /// Incidental expenses on lots purchased in the window.
    pub purchase_incidentals: Money,
    /// Standalone expenses dated in the window.
    pub standalone_expenses: Money,
    /// Raw quantity × unit-cost total of lots purchased in the window.
    /// Informational: not part of operating expenses (it is inventory, and
    /// reaches the P&L through COGS as the units sell).
    pub purchase_unit_costs: Money,
}

/// Revenue / cost / profit rollup for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub revenue: Money,
    pub cost_of_goods_sold: Money,
    pub gross_profit: Money,
    pub operating_expenses: Money,
    pub net_profit: Money,
    pub expense_breakdown: ExpenseBreakdown,
}

/// Completed-sales rollup for one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlySales {
    pub year: i32,
    pub month: u32,
    pub total_sales: Money,
    pub total_cost: Money,
    pub gross_profit: Money,
}

/// Persisted income-statement snapshot, keyed by (year, month).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeStatement {
    pub year: i32,
    pub month: u32,
    pub revenue: Money,
    pub cost_of_goods_sold: Money,
    pub gross_profit: Money,
    pub operating_expenses: Money,
    pub net_profit: Money,
    pub generated_at: DateTime<Utc>,
}

impl IncomeStatement {
    pub fn from_summary(
        year: i32,
        month: u32,
        summary: &FinancialSummary,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            year,
            month,
            revenue: summary.revenue,
            cost_of_goods_sold: summary.cost_of_goods_sold,
            gross_profit: summary.gross_profit,
            operating_expenses: summary.operating_expenses,
            net_profit: summary.net_profit,
            generated_at,
        }
    }
}

/// Roll up one window. Idempotent and side-effect free; an empty window
/// produces an all-zero summary, never an error.
pub fn summarize(
    window: &DateWindow,
    sales: &[SaleFigures],
    purchases: &[PurchaseFigures],
    expenses: &[ExpenseFigures],
) -> FinancialSummary {
    let mut revenue = Money::zero();
    let mut cost_of_goods_sold = Money::zero();

    for sale in sales {
        if sale.status != OrderStatus::Completed || !window.contains(sale.sale_date) {
            continue;
        }
        revenue += sale.total_price;
        cost_of_goods_sold += sale.total_cost;
    }

    let mut purchase_incidentals = Money::zero();
    let mut unit_cost_total: i128 = 0;
    for purchase in purchases {
        if !window.contains(purchase.purchased_at) {
            continue;
        }
        purchase_incidentals += purchase.incidental_expenses;
        unit_cost_total +=
            i128::from(purchase.quantity) * i128::from(purchase.unit_cost.cents());
    }
    let purchase_unit_costs =
        Money::from_cents(i64::try_from(unit_cost_total).unwrap_or(i64::MAX));

    let standalone_expenses: Money = expenses
        .iter()
        .filter(|e| window.contains(e.incurred_at))
        .map(|e| e.amount)
        .sum();

    let gross_profit = revenue - cost_of_goods_sold;
    let operating_expenses = purchase_incidentals + standalone_expenses;
    let net_profit = gross_profit - operating_expenses;

    FinancialSummary {
        revenue,
        cost_of_goods_sold,
        gross_profit,
        operating_expenses,
        net_profit,
        expense_breakdown: ExpenseBreakdown {
            purchase_incidentals,
            standalone_expenses,
            purchase_unit_costs,
        },
    }
}

/// Roll up completed sales per calendar month, sorted ascending.
pub fn monthly_breakdown(sales: &[SaleFigures]) -> Vec<MonthlySales> {
    let mut months: BTreeMap<(i32, u32), (Money, Money)> = BTreeMap::new();

    for sale in sales {
        if sale.status != OrderStatus::Completed {
            continue;
        }
        let key = (sale.sale_date.year(), sale.sale_date.month());
        let entry = months.entry(key).or_insert((Money::zero(), Money::zero()));
        entry.0 += sale.total_price;
        entry.1 += sale.total_cost;
    }

    months
        .into_iter()
        .map(|((year, month), (total_sales, total_cost))| MonthlySales {
            year,
            month,
            total_sales,
            total_cost,
            gross_profit: total_sales - total_cost,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().to_utc()
    }

    fn completed(date: &str, price_cents: i64, cost_cents: i64) -> SaleFigures {
        SaleFigures {
            sale_date: at(date),
            status: OrderStatus::Completed,
            total_price: Money::from_cents(price_cents),
            total_cost: Money::from_cents(cost_cents),
        }
    }

    #[test]
    fn january_rollup_matches_hand_computation() {
        // Two completed January sales (100.00 / 50.00 revenue, 60.00 / 20.00
        // cost) and one 10.00 January expense.
        let window = DateWindow::month(2024, 1).unwrap();
        let sales = vec![
            completed("2024-01-05T10:00:00Z", 10_000, 6_000),
            completed("2024-01-20T10:00:00Z", 5_000, 2_000),
        ];
        let expenses = vec![ExpenseFigures {
            incurred_at: at("2024-01-12T09:00:00Z"),
            amount: Money::from_cents(1_000),
        }];

        let summary = summarize(&window, &sales, &[], &expenses);

        assert_eq!(summary.revenue, Money::from_cents(15_000));
        assert_eq!(summary.cost_of_goods_sold, Money::from_cents(8_000));
        assert_eq!(summary.gross_profit, Money::from_cents(7_000));
        assert_eq!(summary.operating_expenses, Money::from_cents(1_000));
        assert_eq!(summary.net_profit, Money::from_cents(6_000));
    }

    #[test]
    fn summaries_are_idempotent() {
        let window = DateWindow::month(2024, 1).unwrap();
        let sales = vec![completed("2024-01-05T10:00:00Z", 10_000, 6_000)];
        let purchases = vec![PurchaseFigures {
            purchased_at: at("2024-01-03T10:00:00Z"),
            quantity: 10,
            unit_cost: Money::from_cents(500),
            incidental_expenses: Money::from_cents(200),
        }];
        let expenses = vec![ExpenseFigures {
            incurred_at: at("2024-01-12T09:00:00Z"),
            amount: Money::from_cents(1_000),
        }];

        let first = summarize(&window, &sales, &purchases, &expenses);
        let second = summarize(&window, &sales, &purchases, &expenses);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_window_is_all_zero_not_an_error() {
        let window = DateWindow::month(2031, 6).unwrap();
        let summary = summarize(&window, &[], &[], &[]);

        assert_eq!(summary.revenue, Money::zero());
        assert_eq!(summary.cost_of_goods_sold, Money::zero());
        assert_eq!(summary.gross_profit, Money::zero());
        assert_eq!(summary.operating_expenses, Money::zero());
        assert_eq!(summary.net_profit, Money::zero());
    }

    #[test]
    fn non_completed_sales_are_excluded() {
        let window = DateWindow::month(2024, 1).unwrap();
        let mut cancelled = completed("2024-01-05T10:00:00Z", 10_000, 6_000);
        cancelled.status = OrderStatus::Cancelled;
        let mut refunded = completed("2024-01-06T10:00:00Z", 4_000, 1_000);
        refunded.status = OrderStatus::Refunded;

        let summary = summarize(&window, &[cancelled, refunded], &[], &[]);
        assert_eq!(summary.revenue, Money::zero());
    }

    #[test]
    fn records_outside_the_window_are_excluded() {
        let window = DateWindow::month(2024, 1).unwrap();
        let sales = vec![
            completed("2023-12-31T23:59:59Z", 9_999, 1),
            completed("2024-02-01T00:00:00Z", 8_888, 1),
            completed("2024-01-15T12:00:00Z", 1_000, 400),
        ];

        let summary = summarize(&window, &sales, &[], &[]);
        assert_eq!(summary.revenue, Money::from_cents(1_000));
        assert_eq!(summary.cost_of_goods_sold, Money::from_cents(400));
    }

    #[test]
    fn breakdown_separates_incidentals_from_inventory_cost() {
        let window = DateWindow::month(2024, 1).unwrap();
        let purchases = vec![
            PurchaseFigures {
                purchased_at: at("2024-01-03T10:00:00Z"),
                quantity: 10,
                unit_cost: Money::from_cents(500),
                incidental_expenses: Money::from_cents(300),
            },
            PurchaseFigures {
                purchased_at: at("2024-01-09T10:00:00Z"),
                quantity: 4,
                unit_cost: Money::from_cents(250),
                incidental_expenses: Money::zero(),
            },
        ];
        let expenses = vec![ExpenseFigures {
            incurred_at: at("2024-01-12T09:00:00Z"),
            amount: Money::from_cents(700),
        }];

        let summary = summarize(&window, &[], &purchases, &expenses);

        assert_eq!(summary.expense_breakdown.purchase_incidentals, Money::from_cents(300));
        assert_eq!(summary.expense_breakdown.standalone_expenses, Money::from_cents(700));
        assert_eq!(summary.expense_breakdown.purchase_unit_costs, Money::from_cents(6_000));
        // Operating expenses exclude the raw inventory cost.
        assert_eq!(summary.operating_expenses, Money::from_cents(1_000));
    }

    #[test]
    fn monthly_breakdown_groups_and_sorts() {
        let sales = vec![
            completed("2024-03-05T10:00:00Z", 2_000, 900),
            completed("2024-01-05T10:00:00Z", 10_000, 6_000),
            completed("2024-01-20T10:00:00Z", 5_000, 2_000),
            completed("2023-11-02T10:00:00Z", 700, 100),
        ];

        let rollup = monthly_breakdown(&sales);
        assert_eq!(rollup.len(), 3);
        assert_eq!((rollup[0].year, rollup[0].month), (2023, 11));
        assert_eq!((rollup[1].year, rollup[1].month), (2024, 1));
        assert_eq!(rollup[1].total_sales, Money::from_cents(15_000));
        assert_eq!(rollup[1].gross_profit, Money::from_cents(7_000));
        assert_eq!((rollup[2].year, rollup[2].month), (2024, 3));
    }

    #[test]
    fn income_statement_snapshot_carries_the_summary() {
        let window = DateWindow::month(2024, 1).unwrap();
        let sales = vec![completed("2024-01-05T10:00:00Z", 10_000, 6_000)];
        let summary = summarize(&window, &sales, &[], &[]);

        let statement =
            IncomeStatement::from_summary(2024, 1, &summary, at("2024-02-01T08:00:00Z"));
        assert_eq!(statement.revenue, summary.revenue);
        assert_eq!(statement.net_profit, summary.net_profit);
        assert_eq!((statement.year, statement.month), (2024, 1));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the profit identities hold for any mix of records.
        #[test]
        fn profit_identities_hold(
            sale_amounts in prop::collection::vec((0i64..1_000_000, 0i64..1_000_000), 0..20),
            expense_amounts in prop::collection::vec(1i64..1_000_000, 0..10),
        ) {
            let window = DateWindow::month(2024, 1).unwrap();
            let sales: Vec<SaleFigures> = sale_amounts
                .iter()
                .map(|&(price, cost)| completed("2024-01-10T00:00:00Z", price, cost))
                .collect();
            let expenses: Vec<ExpenseFigures> = expense_amounts
                .iter()
                .map(|&amount| ExpenseFigures {
                    incurred_at: at("2024-01-10T00:00:00Z"),
                    amount: Money::from_cents(amount),
                })
                .collect();

            let summary = summarize(&window, &sales, &[], &expenses);

            prop_assert_eq!(summary.gross_profit, summary.revenue - summary.cost_of_goods_sold);
            prop_assert_eq!(summary.net_profit, summary.gross_profit - summary.operating_expenses);
            prop_assert_eq!(
                summary.operating_expenses,
                summary.expense_breakdown.purchase_incidentals
                    + summary.expense_breakdown.standalone_expenses
            );
        }
    }
}
