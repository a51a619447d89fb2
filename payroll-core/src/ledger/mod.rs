pub mod bridge;
pub mod reports;
pub mod service;
pub mod validation;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::db::RepositoryError;

pub use bridge::{
    EntryHeader, PayrollAccountCodes, PayrollEntryDraft, PayrollTotals, ROUNDING_TOLERANCE,
    default_payroll_accounts, draft_payroll_entry,
};
pub use reports::{
    AccountBalance, BalanceSheet, GeneralLedger, GeneralLedgerAccount, GeneralLedgerLine,
    ProfitAndLoss, TrialBalance, TrialBalanceRow,
};
pub use service::LedgerService;
pub use validation::{JournalValidationError, ValidationErrorKind, validate_journal_entry};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] JournalValidationError),

    #[error("account {account_id} cannot be posted to: {reason}")]
    InvalidAccount { account_id: i64, reason: String },

    /// A payroll batch missed balance by more than the rounding tolerance.
    #[error("payroll entry out of balance by {difference} (debits {total_debits}, credits {total_credits})")]
    Unbalanced {
        total_debits: Decimal,
        total_credits: Decimal,
        difference: Decimal,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
