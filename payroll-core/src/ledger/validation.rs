//! Journal entry validation.
//!
//! An entry is accepted only when it has at least two lines, every line
//! posts a positive amount to exactly one side, and total debits equal total
//! credits within one cent.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::NewJournalEntryLine;
use crate::calculations::common::CENT;

/// Why an entry was rejected. Line indexes are zero-based.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ValidationErrorKind {
    #[error("entry needs at least 2 lines, got {count}")]
    TooFewLines { count: usize },

    #[error("line {line} has both a debit and a credit")]
    LineHasBothSides { line: usize },

    #[error("line {line} has neither a debit nor a credit")]
    LineHasNeitherSide { line: usize },

    #[error("line {line} has a negative amount")]
    NegativeAmount { line: usize },

    #[error("debits and credits do not balance")]
    Unbalanced,
}

/// A rejected journal entry, with the totals that were computed for it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid journal entry: {kind} (debits {total_debits}, credits {total_credits})")]
pub struct JournalValidationError {
    pub kind: ValidationErrorKind,
    pub total_debits: Decimal,
    pub total_credits: Decimal,
}

pub fn validate_journal_entry(lines: &[NewJournalEntryLine]) -> Result<(), JournalValidationError> {
    let total_debits: Decimal = lines.iter().map(|l| l.debit).sum();
    let total_credits: Decimal = lines.iter().map(|l| l.credit).sum();
    let reject = |kind| {
        Err(JournalValidationError {
            kind,
            total_debits,
            total_credits,
        })
    };

    if lines.len() < 2 {
        return reject(ValidationErrorKind::TooFewLines { count: lines.len() });
    }

    for (line, l) in lines.iter().enumerate() {
        if l.debit < Decimal::ZERO || l.credit < Decimal::ZERO {
            return reject(ValidationErrorKind::NegativeAmount { line });
        }
        match (l.debit.is_zero(), l.credit.is_zero()) {
            (false, false) => return reject(ValidationErrorKind::LineHasBothSides { line }),
            (true, true) => return reject(ValidationErrorKind::LineHasNeitherSide { line }),
            _ => {}
        }
    }

    if (total_debits - total_credits).abs() > CENT {
        return reject(ValidationErrorKind::Unbalanced);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    fn debit(amount: Decimal) -> NewJournalEntryLine {
        NewJournalEntryLine::debit(1, amount)
    }

    fn credit(amount: Decimal) -> NewJournalEntryLine {
        NewJournalEntryLine::credit(2, amount)
    }

    #[test]
    fn balanced_split_entry_is_accepted() {
        let lines = vec![debit(dec!(500)), credit(dec!(300)), credit(dec!(200))];

        assert_eq!(validate_journal_entry(&lines), Ok(()));
    }

    #[test]
    fn off_by_a_dollar_is_rejected_with_totals() {
        let lines = vec![debit(dec!(500)), credit(dec!(300)), credit(dec!(199))];

        assert_eq!(
            validate_journal_entry(&lines),
            Err(JournalValidationError {
                kind: ValidationErrorKind::Unbalanced,
                total_debits: dec!(500),
                total_credits: dec!(499),
            })
        );
    }

    #[test]
    fn one_cent_difference_is_tolerated() {
        let lines = vec![debit(dec!(100.01)), credit(dec!(100.00))];

        assert_eq!(validate_journal_entry(&lines), Ok(()));
    }

    #[test]
    fn two_cent_difference_is_rejected() {
        let lines = vec![debit(dec!(100.02)), credit(dec!(100.00))];

        assert_eq!(
            validate_journal_entry(&lines).map_err(|e| e.kind),
            Err(ValidationErrorKind::Unbalanced)
        );
    }

    #[test]
    fn single_line_is_rejected() {
        let lines = vec![debit(dec!(100))];

        assert_eq!(
            validate_journal_entry(&lines).map_err(|e| e.kind),
            Err(ValidationErrorKind::TooFewLines { count: 1 })
        );
    }

    #[test]
    fn empty_entry_is_rejected() {
        assert_eq!(
            validate_journal_entry(&[]).map_err(|e| e.kind),
            Err(ValidationErrorKind::TooFewLines { count: 0 })
        );
    }

    #[test]
    fn line_with_both_sides_is_rejected() {
        let lines = vec![
            NewJournalEntryLine {
                account_id: 1,
                debit: dec!(10),
                credit: dec!(10),
            },
            debit(dec!(5)),
            credit(dec!(5)),
        ];

        assert_eq!(
            validate_journal_entry(&lines).map_err(|e| e.kind),
            Err(ValidationErrorKind::LineHasBothSides { line: 0 })
        );
    }

    #[test]
    fn zero_line_is_rejected() {
        let lines = vec![debit(dec!(5)), credit(dec!(5)), debit(dec!(0))];

        assert_eq!(
            validate_journal_entry(&lines).map_err(|e| e.kind),
            Err(ValidationErrorKind::LineHasNeitherSide { line: 2 })
        );
    }

    #[test]
    fn negative_amount_is_rejected() {
        let lines = vec![debit(dec!(-5)), credit(dec!(-5))];

        assert_eq!(
            validate_journal_entry(&lines).map_err(|e| e.kind),
            Err(ValidationErrorKind::NegativeAmount { line: 0 })
        );
    }
}
