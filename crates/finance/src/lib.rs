//! Finance domain module.
//!
//! Operating expenses (event-sourced) plus the pure period-rollup functions:
//! revenue / cost-of-goods-sold / profit summaries, monthly sales breakdowns,
//! and income-statement snapshots. The rollups are plain functions of their
//! inputs — no storage, no clock, no hidden state.

pub mod expense;
pub mod period;
pub mod summary;

pub use expense::{Expense, ExpenseCommand, ExpenseEvent, ExpenseId, ExpenseRecorded, RecordExpense};
pub use period::{DateWindow, ReportingPeriod};
pub use summary::{
    ExpenseBreakdown, ExpenseFigures, FinancialSummary, IncomeStatement, MonthlySales,
    PurchaseFigures, SaleFigures, monthly_breakdown, summarize,
};
