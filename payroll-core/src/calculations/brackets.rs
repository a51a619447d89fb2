//! Progressive bracket tax evaluation.
//!
//! A schedule is an ordered list of brackets, each carrying its lower bound,
//! marginal rate and the cumulative tax owed at that lower bound. The same
//! evaluator serves every jurisdiction; only the table differs.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use payroll_core::calculations::BracketSchedule;
//! use payroll_core::{FilingStatus, Jurisdiction, TaxBracket};
//!
//! let brackets = vec![
//!     TaxBracket {
//!         tax_year: 2025,
//!         jurisdiction: Jurisdiction::Federal,
//!         filing_status: FilingStatus::Single,
//!         min_income: dec!(0),
//!         max_income: Some(dec!(11925)),
//!         tax_rate: dec!(0.10),
//!         base_tax: dec!(0),
//!     },
//!     TaxBracket {
//!         tax_year: 2025,
//!         jurisdiction: Jurisdiction::Federal,
//!         filing_status: FilingStatus::Single,
//!         min_income: dec!(11925),
//!         max_income: None,
//!         tax_rate: dec!(0.12),
//!         base_tax: dec!(1192.50),
//!     },
//! ];
//!
//! let schedule = BracketSchedule::new(&brackets);
//! assert_eq!(schedule.annual_tax(dec!(30000)), dec!(3361.50));
//! ```

use rust_decimal::Decimal;

use crate::TaxBracket;
use crate::calculations::common::{max, round_half_up};

/// Evaluator over one jurisdiction/filing-status bracket table.
#[derive(Debug, Clone)]
pub struct BracketSchedule<'a> {
    brackets: &'a [TaxBracket],
}

impl<'a> BracketSchedule<'a> {
    /// Brackets must be sorted by `min_income` ascending; the last one is
    /// treated as unbounded regardless of its `max_income`.
    pub fn new(brackets: &'a [TaxBracket]) -> Self {
        Self { brackets }
    }

    /// Annual tax on `income`, unrounded.
    ///
    /// Income at or below zero, or an empty table, yields zero.
    pub fn annual_tax(
        &self,
        income: Decimal,
    ) -> Decimal {
        if income <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        match self.brackets.iter().rev().find(|b| b.min_income <= income) {
            Some(bracket) => bracket.base_tax + (income - bracket.min_income) * bracket.tax_rate,
            None => Decimal::ZERO,
        }
    }

    /// Per-period withholding for `period_wages` taxable wages.
    ///
    /// Wages are annualized over `periods_per_year`, reduced by the annual
    /// allowance exemption, taxed, and divided back down. Zero periods
    /// yields zero.
    pub fn period_tax(
        &self,
        period_wages: Decimal,
        periods_per_year: u32,
        allowance_exemption: Decimal,
    ) -> Decimal {
        if periods_per_year == 0 {
            return Decimal::ZERO;
        }
        let periods = Decimal::from(periods_per_year);
        let annual_income = max(period_wages * periods - allowance_exemption, Decimal::ZERO);

        round_half_up(self.annual_tax(annual_income) / periods)
    }
}
