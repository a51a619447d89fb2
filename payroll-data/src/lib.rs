//! Data loading for the payroll engine: tax bracket tables and charts of
//! accounts from CSV, plus the logging setup shared by the CLI.

mod accounts;
mod brackets;
pub mod logging;

pub use accounts::{AccountLoader, AccountLoaderError, AccountRecord};
pub use brackets::{BracketLoader, BracketLoaderError, BracketRecord};
