//! Payroll engine: gross-to-net calculation, payroll record lifecycle and a
//! double-entry ledger with its reports.
//!
//! Calculation is synchronous and free of I/O. Persistence goes through
//! [`db::PayrollRepository`]; the services in [`records`] and [`ledger`]
//! orchestrate the two.

pub mod calculations;
pub mod db;
pub mod ledger;
pub mod models;
pub mod records;

#[cfg(test)]
mod test_support;

pub use db::repository::{PayrollRepository, RepositoryError};
pub use ledger::{JournalValidationError, LedgerError};
pub use models::*;
pub use records::{LifecycleError, PayrollError};
