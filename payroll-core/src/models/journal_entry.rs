use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What produced a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntrySource {
    Manual,
    Payroll,
    PayrollReversal,
}

impl EntrySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Payroll => "payroll",
            Self::PayrollReversal => "payroll_reversal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "payroll" => Some(Self::Payroll),
            "payroll_reversal" => Some(Self::PayrollReversal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryLine {
    pub id: i64,
    pub account_id: i64,
    pub debit: Decimal,
    pub credit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    pub company_id: i64,
    /// Per-company sequence, never reused.
    pub entry_number: i64,
    pub entry_date: NaiveDate,
    pub memo: String,
    pub reference: Option<String>,
    pub source: EntrySource,
    pub lines: Vec<JournalEntryLine>,
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn total_debits(&self) -> Decimal {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credits(&self) -> Decimal {
        self.lines.iter().map(|l| l.credit).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJournalEntryLine {
    pub account_id: i64,
    pub debit: Decimal,
    pub credit: Decimal,
}

impl NewJournalEntryLine {
    pub fn debit(
        account_id: i64,
        amount: Decimal,
    ) -> Self {
        Self {
            account_id,
            debit: amount,
            credit: Decimal::ZERO,
        }
    }

    pub fn credit(
        account_id: i64,
        amount: Decimal,
    ) -> Self {
        Self {
            account_id,
            debit: Decimal::ZERO,
            credit: amount,
        }
    }
}

/// For creating new entries (no id, no number; the number is allocated
/// when the entry is persisted)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJournalEntry {
    pub company_id: i64,
    pub entry_date: NaiveDate,
    pub memo: String,
    pub reference: Option<String>,
    pub source: EntrySource,
    pub lines: Vec<NewJournalEntryLine>,
}
