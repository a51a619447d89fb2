mod account;
mod deduction;
mod employee;
mod filing_status;
mod journal_entry;
mod pay_period;
mod payroll_record;
mod tax_bracket;
mod tax_year_config;
mod ytd;

pub use account::{Account, AccountType, NewAccount, NormalBalance};
pub use deduction::{AmountType, DeductionDefinition, EmployeeDeduction, NewEmployeeDeduction};
pub use employee::{
    CompanyRates, Employee, EmployeeTaxProfile, LocalJurisdiction, NewEmployee, PayType, Residency,
    WithholdingElections,
};
pub use filing_status::FilingStatus;
pub use journal_entry::{
    EntrySource, JournalEntry, JournalEntryLine, NewJournalEntry, NewJournalEntryLine,
};
pub use pay_period::{InvalidPayPeriod, PayPeriod};
pub use payroll_record::{
    NewPayrollRecord, PayrollRecord, PayrollStatus, StatusChange, accumulate_ytd,
};
pub use tax_bracket::{Jurisdiction, TaxBracket};
pub use tax_year_config::{TaxTables, TaxYearConfig};
pub use ytd::YtdAccumulators;
