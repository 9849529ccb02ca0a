//! Financial reporting over the read models.
//!
//! Live summaries always recompute from the current records. The only cached
//! artifact is the income-statement snapshot, written on an explicit generate
//! request and read back verbatim — never consulted by live queries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use stockbook_finance::{
    DateWindow, ExpenseId, FinancialSummary, IncomeStatement, MonthlySales, ReportingPeriod,
    monthly_breakdown, summarize,
};
use stockbook_sales::SaleId;

use crate::projections::{
    ExpenseBookProjection, ExpenseRecord, PurchaseKey, PurchaseLogProjection, PurchaseRecord,
    SaleRecord, SalesLedgerProjection,
};
use crate::read_model::ReadModelStore;

/// Snapshot key: (year, month).
pub type StatementKey = (i32, u32);

#[derive(Debug, Error)]
pub enum ReportingError {
    #[error("invalid reporting month: {year}-{month:02}")]
    InvalidMonth { year: i32, month: u32 },
}

/// Read-only reporting facade composing the financial read models.
pub struct ReportingService<SL, PL, EB, ST>
where
    SL: ReadModelStore<SaleId, SaleRecord>,
    PL: ReadModelStore<PurchaseKey, PurchaseRecord>,
    EB: ReadModelStore<ExpenseId, ExpenseRecord>,
    ST: ReadModelStore<StatementKey, IncomeStatement>,
{
    sales: Arc<SalesLedgerProjection<SL>>,
    purchases: Arc<PurchaseLogProjection<PL>>,
    expenses: Arc<ExpenseBookProjection<EB>>,
    statements: ST,
}

impl<SL, PL, EB, ST> ReportingService<SL, PL, EB, ST>
where
    SL: ReadModelStore<SaleId, SaleRecord>,
    PL: ReadModelStore<PurchaseKey, PurchaseRecord>,
    EB: ReadModelStore<ExpenseId, ExpenseRecord>,
    ST: ReadModelStore<StatementKey, IncomeStatement>,
{
    pub fn new(
        sales: Arc<SalesLedgerProjection<SL>>,
        purchases: Arc<PurchaseLogProjection<PL>>,
        expenses: Arc<ExpenseBookProjection<EB>>,
        statements: ST,
    ) -> Self {
        Self {
            sales,
            purchases,
            expenses,
            statements,
        }
    }

    /// Roll up an explicit window. Always recomputed from source records.
    pub fn window_summary(&self, window: &DateWindow) -> FinancialSummary {
        summarize(
            window,
            &self.sales.figures(),
            &self.purchases.figures(),
            &self.expenses.figures(),
        )
    }

    /// Roll up the calendar period containing `now`.
    pub fn period_summary(&self, period: ReportingPeriod, now: DateTime<Utc>) -> FinancialSummary {
        self.window_summary(&period.window_containing(now))
    }

    /// Completed-sales rollup per calendar month, ascending.
    pub fn monthly_sales(&self) -> Vec<MonthlySales> {
        monthly_breakdown(&self.sales.figures())
    }

    /// Compute the month's summary and upsert the income-statement snapshot.
    pub fn generate_income_statement(
        &self,
        year: i32,
        month: u32,
        now: DateTime<Utc>,
    ) -> Result<IncomeStatement, ReportingError> {
        let window =
            DateWindow::month(year, month).ok_or(ReportingError::InvalidMonth { year, month })?;

        let summary = self.window_summary(&window);
        let statement = IncomeStatement::from_summary(year, month, &summary, now);

        debug!(year, month, "generated income statement snapshot");
        self.statements.upsert((year, month), statement.clone());
        Ok(statement)
    }

    /// Read back a previously generated snapshot. Does not recompute.
    pub fn income_statement(&self, year: i32, month: u32) -> Option<IncomeStatement> {
        self.statements.get(&(year, month))
    }
}
