//! SQLite storage backend for the payroll engine.
//!
//! Money and rates are stored as exact decimal TEXT, and each payroll run,
//! void or correction is committed in a single transaction.

mod decimal;
mod factory;
mod repository;

pub use factory::SqliteRepositoryFactory;
pub use repository::SqliteRepository;
