//! Payroll calculation modules.
//!
//! Pure, synchronous functions: bracket evaluation, deduction processing
//! and the gross-to-net engine that combines them.

pub mod brackets;
pub mod common;
pub mod deductions;
pub mod payroll;

pub use brackets::BracketSchedule;
pub use deductions::{DeductionLine, DeductionSet, deduction_amount, process_deductions};
pub use payroll::{
    EmployerContributions, PayrollCalculator, PayrollInput, PayrollResult, TaxWithholdings,
};
