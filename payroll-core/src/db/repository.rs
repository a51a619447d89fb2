use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{
    Account, Employee, EmployeeDeduction, FilingStatus, JournalEntry, Jurisdiction, NewAccount,
    NewEmployee, NewEmployeeDeduction, NewJournalEntry, NewPayrollRecord, PayrollRecord,
    TaxBracket, TaxYearConfig,
};
use crate::records::{CorrectionPlan, VoidPlan, YtdAdjustment};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Record not found")]
    NotFound,

    /// A status or uniqueness check failed at commit time.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Persistence for everything payroll touches.
///
/// The `commit_*` methods are all-or-nothing: either every write in the
/// batch lands or none does.
#[async_trait]
pub trait PayrollRepository: Send + Sync {
    // Tax tables
    async fn get_tax_year_config(&self, year: i32) -> Result<TaxYearConfig, RepositoryError>;
    async fn list_tax_years(&self) -> Result<Vec<i32>, RepositoryError>;
    /// Inserts or replaces the configuration for `config.tax_year`.
    async fn save_tax_year_config(&self, config: &TaxYearConfig) -> Result<(), RepositoryError>;
    async fn get_tax_brackets(&self, year: i32) -> Result<Vec<TaxBracket>, RepositoryError>;
    async fn insert_tax_bracket(&self, bracket: &TaxBracket) -> Result<(), RepositoryError>;
    async fn delete_tax_brackets(
        &self,
        year: i32,
        jurisdiction: Jurisdiction,
        filing_status: FilingStatus,
    ) -> Result<(), RepositoryError>;

    // Employees and their deductions
    async fn create_employee(&self, employee: NewEmployee) -> Result<Employee, RepositoryError>;
    async fn get_employee(&self, id: i64) -> Result<Employee, RepositoryError>;
    async fn create_deduction(
        &self,
        deduction: NewEmployeeDeduction,
    ) -> Result<EmployeeDeduction, RepositoryError>;
    async fn set_deduction_active(&self, id: i64, is_active: bool) -> Result<(), RepositoryError>;
    async fn list_deductions(
        &self,
        employee_id: i64,
    ) -> Result<Vec<EmployeeDeduction>, RepositoryError>;

    // Payroll records
    async fn get_payroll_record(&self, id: i64) -> Result<PayrollRecord, RepositoryError>;

    /// Every record for the employee whose pay date falls in `year`,
    /// ordered by pay date then id.
    async fn list_payroll_records(
        &self,
        employee_id: i64,
        year: i32,
    ) -> Result<Vec<PayrollRecord>, RepositoryError>;

    /// The records among `ids` that exist; unknown ids are skipped.
    async fn get_payroll_records(
        &self,
        ids: &[i64],
    ) -> Result<Vec<PayrollRecord>, RepositoryError>;

    /// Insert a batch of records and bump deduction YTD totals.
    async fn commit_payroll_run(
        &self,
        records: Vec<NewPayrollRecord>,
        adjustments: Vec<YtdAdjustment>,
    ) -> Result<Vec<PayrollRecord>, RepositoryError>;

    async fn link_journal_entry(
        &self,
        record_ids: &[i64],
        journal_entry_id: i64,
    ) -> Result<(), RepositoryError>;

    /// Fails with [`RepositoryError::Conflict`] unless the record is still
    /// active when the write happens.
    async fn commit_void(&self, plan: VoidPlan) -> Result<PayrollRecord, RepositoryError>;

    /// Returns `(corrected original, replacement)`. Same conflict rule as
    /// [`PayrollRepository::commit_void`].
    async fn commit_correction(
        &self,
        plan: CorrectionPlan,
    ) -> Result<(PayrollRecord, PayrollRecord), RepositoryError>;

    // Ledger
    async fn create_account(&self, account: NewAccount) -> Result<Account, RepositoryError>;
    async fn list_accounts(&self, company_id: i64) -> Result<Vec<Account>, RepositoryError>;

    /// Assigns the next entry number for the company.
    async fn create_journal_entry(
        &self,
        entry: NewJournalEntry,
    ) -> Result<JournalEntry, RepositoryError>;

    /// Entries dated within the inclusive range; `None` leaves a side open.
    async fn list_journal_entries(
        &self,
        company_id: i64,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<JournalEntry>, RepositoryError>;
}
