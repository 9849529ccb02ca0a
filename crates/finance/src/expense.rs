use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money};
use stockbook_events::Event;

/// Expense identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpenseId(pub AggregateId);

impl ExpenseId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Expense (standalone operating expense).
///
/// Independent of products and sales; simple record-once lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expense {
    id: ExpenseId,
    category: String,
    amount: Money,
    description: Option<String>,
    incurred_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Expense {
    /// Create an empty, not-yet-recorded aggregate instance for rehydration.
    pub fn empty(id: ExpenseId) -> Self {
        Self {
            id,
            category: String::new(),
            amount: Money::zero(),
            description: None,
            incurred_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ExpenseId {
        self.id
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn incurred_at(&self) -> Option<DateTime<Utc>> {
        self.incurred_at
    }
}

impl AggregateRoot for Expense {
    type Id = ExpenseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordExpense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordExpense {
    pub expense_id: ExpenseId,
    pub category: String,
    pub amount: Money,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseCommand {
    RecordExpense(RecordExpense),
}

/// Event: ExpenseRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRecorded {
    pub expense_id: ExpenseId,
    pub category: String,
    pub amount: Money,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseEvent {
    ExpenseRecorded(ExpenseRecorded),
}

impl Event for ExpenseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ExpenseEvent::ExpenseRecorded(_) => "finance.expense.recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ExpenseEvent::ExpenseRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Expense {
    type Command = ExpenseCommand;
    type Event = ExpenseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ExpenseEvent::ExpenseRecorded(e) => {
                self.id = e.expense_id;
                self.category = e.category.clone();
                self.amount = e.amount;
                self.description = e.description.clone();
                self.incurred_at = Some(e.occurred_at);
                self.created = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ExpenseCommand::RecordExpense(cmd) => self.handle_record(cmd),
        }
    }
}

impl Expense {
    fn handle_record(&self, cmd: &RecordExpense) -> Result<Vec<ExpenseEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("expense already recorded"));
        }
        if cmd.category.trim().is_empty() {
            return Err(DomainError::validation("category cannot be empty"));
        }
        if !cmd.amount.is_positive() {
            return Err(DomainError::validation("amount must be positive"));
        }

        Ok(vec![ExpenseEvent::ExpenseRecorded(ExpenseRecorded {
            expense_id: cmd.expense_id,
            category: cmd.category.clone(),
            amount: cmd.amount,
            description: cmd.description.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_expense_id() -> ExpenseId {
        ExpenseId::new(AggregateId::new())
    }

    #[test]
    fn record_expense_emits_event() {
        let expense_id = test_expense_id();
        let expense = Expense::empty(expense_id);

        let events = expense
            .handle(&ExpenseCommand::RecordExpense(RecordExpense {
                expense_id,
                category: "rent".to_string(),
                amount: Money::from_cents(95_000),
                description: Some("August office rent".to_string()),
                occurred_at: Utc::now(),
            }))
            .unwrap();

        assert_eq!(events.len(), 1);
        match &events[0] {
            ExpenseEvent::ExpenseRecorded(e) => {
                assert_eq!(e.category, "rent");
                assert_eq!(e.amount, Money::from_cents(95_000));
            }
        }
    }

    #[test]
    fn empty_category_and_non_positive_amount_are_rejected() {
        let expense_id = test_expense_id();
        let expense = Expense::empty(expense_id);

        let err = expense
            .handle(&ExpenseCommand::RecordExpense(RecordExpense {
                expense_id,
                category: "  ".to_string(),
                amount: Money::from_cents(100),
                description: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = expense
            .handle(&ExpenseCommand::RecordExpense(RecordExpense {
                expense_id,
                category: "rent".to_string(),
                amount: Money::zero(),
                description: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
