//! Process-local backend.
//!
//! All state sits behind one mutex, so every trait call (and in particular
//! every `commit_*` call) is applied atomically and entry numbers are handed
//! out one at a time.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};

use super::factory::{DbConfig, RepositoryFactory};
use super::repository::{PayrollRepository, RepositoryError};
use crate::models::{
    Account, Employee, EmployeeDeduction, FilingStatus, JournalEntry, JournalEntryLine,
    Jurisdiction, NewAccount, NewEmployee, NewEmployeeDeduction, NewJournalEntry,
    NewPayrollRecord, PayrollRecord, PayrollStatus, StatusChange, TaxBracket, TaxYearConfig,
};
use crate::records::{CorrectionPlan, VoidPlan, YtdAdjustment, adjust_deductions};

#[derive(Debug, Default)]
struct State {
    last_id: i64,
    configs: BTreeMap<i32, TaxYearConfig>,
    brackets: Vec<TaxBracket>,
    employees: BTreeMap<i64, Employee>,
    deductions: BTreeMap<i64, EmployeeDeduction>,
    records: BTreeMap<i64, PayrollRecord>,
    accounts: BTreeMap<i64, Account>,
    entries: BTreeMap<i64, JournalEntry>,
    /// Last entry number issued per company.
    entry_numbers: HashMap<i64, i64>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn apply_adjustments(
        &mut self,
        adjustments: &[YtdAdjustment],
    ) {
        adjust_deductions(self.deductions.values_mut(), adjustments);
    }

    fn insert_record(
        &mut self,
        record: NewPayrollRecord,
    ) -> PayrollRecord {
        let record = PayrollRecord {
            id: self.next_id(),
            employee_id: record.employee_id,
            company_id: record.company_id,
            period: record.period,
            result: record.result,
            status: PayrollStatus::Active,
            status_change: None,
            original_record_id: record.original_record_id,
            replacement_record_id: None,
            journal_entry_id: None,
            created_at: Utc::now(),
        };
        self.records.insert(record.id, record.clone());
        record
    }

    fn insert_entry(
        &mut self,
        entry: NewJournalEntry,
    ) -> JournalEntry {
        let number = self.entry_numbers.entry(entry.company_id).or_insert(0);
        *number += 1;
        let entry_number = *number;

        let lines = entry
            .lines
            .into_iter()
            .map(|line| JournalEntryLine {
                id: self.next_id(),
                account_id: line.account_id,
                debit: line.debit,
                credit: line.credit,
            })
            .collect();
        let entry = JournalEntry {
            id: self.next_id(),
            company_id: entry.company_id,
            entry_number,
            entry_date: entry.entry_date,
            memo: entry.memo,
            reference: entry.reference,
            source: entry.source,
            lines,
            created_at: Utc::now(),
        };
        self.entries.insert(entry.id, entry.clone());
        entry
    }

    fn active_record(
        &self,
        id: i64,
    ) -> Result<&PayrollRecord, RepositoryError> {
        let record = self.records.get(&id).ok_or(RepositoryError::NotFound)?;
        if !record.is_active() {
            return Err(RepositoryError::Conflict(format!(
                "payroll record {id} is {}",
                record.status
            )));
        }
        Ok(record)
    }

    fn close_record(
        &mut self,
        id: i64,
        status: PayrollStatus,
        change: StatusChange,
    ) -> Result<&mut PayrollRecord, RepositoryError> {
        let record = self.records.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        record.status = status;
        record.status_change = Some(change);
        Ok(record)
    }
}

/// Backend that keeps everything in memory; registered as `"memory"`.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, RepositoryError> {
        self.state
            .lock()
            .map_err(|e| RepositoryError::Connection(e.to_string()))
    }
}

#[async_trait]
impl PayrollRepository for MemoryRepository {
    async fn get_tax_year_config(
        &self,
        year: i32,
    ) -> Result<TaxYearConfig, RepositoryError> {
        self.state()?
            .configs
            .get(&year)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_tax_years(&self) -> Result<Vec<i32>, RepositoryError> {
        Ok(self.state()?.configs.keys().rev().copied().collect())
    }

    async fn save_tax_year_config(
        &self,
        config: &TaxYearConfig,
    ) -> Result<(), RepositoryError> {
        self.state()?
            .configs
            .insert(config.tax_year, config.clone());
        Ok(())
    }

    async fn get_tax_brackets(
        &self,
        year: i32,
    ) -> Result<Vec<TaxBracket>, RepositoryError> {
        let mut brackets: Vec<TaxBracket> = self
            .state()?
            .brackets
            .iter()
            .filter(|b| b.tax_year == year)
            .cloned()
            .collect();
        brackets.sort_by(|a, b| a.min_income.cmp(&b.min_income));
        Ok(brackets)
    }

    async fn insert_tax_bracket(
        &self,
        bracket: &TaxBracket,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let duplicate = state.brackets.iter().any(|b| {
            b.tax_year == bracket.tax_year
                && b.jurisdiction == bracket.jurisdiction
                && b.filing_status == bracket.filing_status
                && b.min_income == bracket.min_income
        });
        if duplicate {
            return Err(RepositoryError::Conflict(format!(
                "{} {} bracket at {} already exists for {}",
                bracket.jurisdiction.as_str(),
                bracket.filing_status.as_str(),
                bracket.min_income,
                bracket.tax_year
            )));
        }
        state.brackets.push(bracket.clone());
        Ok(())
    }

    async fn delete_tax_brackets(
        &self,
        year: i32,
        jurisdiction: Jurisdiction,
        filing_status: FilingStatus,
    ) -> Result<(), RepositoryError> {
        self.state()?.brackets.retain(|b| {
            !(b.tax_year == year
                && b.jurisdiction == jurisdiction
                && b.filing_status == filing_status)
        });
        Ok(())
    }

    async fn create_employee(
        &self,
        employee: NewEmployee,
    ) -> Result<Employee, RepositoryError> {
        let mut state = self.state()?;
        let employee = Employee {
            id: state.next_id(),
            company_id: employee.company_id,
            name: employee.name,
            profile: employee.profile,
            rates: employee.rates,
        };
        state.employees.insert(employee.id, employee.clone());
        Ok(employee)
    }

    async fn get_employee(
        &self,
        id: i64,
    ) -> Result<Employee, RepositoryError> {
        self.state()?
            .employees
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn create_deduction(
        &self,
        deduction: NewEmployeeDeduction,
    ) -> Result<EmployeeDeduction, RepositoryError> {
        let mut state = self.state()?;
        if !state.employees.contains_key(&deduction.employee_id) {
            return Err(RepositoryError::NotFound);
        }
        let deduction = EmployeeDeduction {
            id: state.next_id(),
            employee_id: deduction.employee_id,
            is_active: true,
            definition: deduction.definition,
        };
        state.deductions.insert(deduction.id, deduction.clone());
        Ok(deduction)
    }

    async fn set_deduction_active(
        &self,
        id: i64,
        is_active: bool,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let deduction = state
            .deductions
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        deduction.is_active = is_active;
        Ok(())
    }

    async fn list_deductions(
        &self,
        employee_id: i64,
    ) -> Result<Vec<EmployeeDeduction>, RepositoryError> {
        Ok(self
            .state()?
            .deductions
            .values()
            .filter(|d| d.employee_id == employee_id)
            .cloned()
            .collect())
    }

    async fn get_payroll_record(
        &self,
        id: i64,
    ) -> Result<PayrollRecord, RepositoryError> {
        self.state()?
            .records
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_payroll_records(
        &self,
        employee_id: i64,
        year: i32,
    ) -> Result<Vec<PayrollRecord>, RepositoryError> {
        let mut records: Vec<PayrollRecord> = self
            .state()?
            .records
            .values()
            .filter(|r| r.employee_id == employee_id && r.period.pay_date.year() == year)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.period.pay_date, r.id));
        Ok(records)
    }

    async fn get_payroll_records(
        &self,
        ids: &[i64],
    ) -> Result<Vec<PayrollRecord>, RepositoryError> {
        let state = self.state()?;
        let mut records: Vec<PayrollRecord> = ids
            .iter()
            .filter_map(|id| state.records.get(id).cloned())
            .collect();
        records.sort_by_key(|r| r.id);
        records.dedup_by_key(|r| r.id);
        Ok(records)
    }

    async fn commit_payroll_run(
        &self,
        records: Vec<NewPayrollRecord>,
        adjustments: Vec<YtdAdjustment>,
    ) -> Result<Vec<PayrollRecord>, RepositoryError> {
        let mut state = self.state()?;
        let created: Vec<PayrollRecord> = records
            .into_iter()
            .map(|record| state.insert_record(record))
            .collect();
        state.apply_adjustments(&adjustments);
        Ok(created)
    }

    async fn link_journal_entry(
        &self,
        record_ids: &[i64],
        journal_entry_id: i64,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        if record_ids.iter().any(|id| !state.records.contains_key(id)) {
            return Err(RepositoryError::NotFound);
        }
        for id in record_ids {
            if let Some(record) = state.records.get_mut(id) {
                record.journal_entry_id = Some(journal_entry_id);
            }
        }
        Ok(())
    }

    async fn commit_void(
        &self,
        plan: VoidPlan,
    ) -> Result<PayrollRecord, RepositoryError> {
        let mut state = self.state()?;
        state.active_record(plan.record_id)?;

        state.apply_adjustments(&plan.reversals);
        if let Some(entry) = plan.reversal_entry {
            state.insert_entry(entry);
        }
        let voided = state.close_record(plan.record_id, PayrollStatus::Voided, plan.change)?;
        Ok(voided.clone())
    }

    async fn commit_correction(
        &self,
        plan: CorrectionPlan,
    ) -> Result<(PayrollRecord, PayrollRecord), RepositoryError> {
        let mut state = self.state()?;
        state.active_record(plan.record_id)?;

        state.apply_adjustments(&plan.reversals);
        let mut replacement = state.insert_record(plan.replacement);
        state.apply_adjustments(&plan.reapplications);
        if let Some(entry) = plan.reversal_entry {
            state.insert_entry(entry);
        }
        if let Some(entry) = plan.replacement_entry {
            let entry = state.insert_entry(entry);
            replacement.journal_entry_id = Some(entry.id);
            state.records.insert(replacement.id, replacement.clone());
        }

        let corrected =
            state.close_record(plan.record_id, PayrollStatus::Corrected, plan.change)?;
        corrected.replacement_record_id = Some(replacement.id);
        Ok((corrected.clone(), replacement))
    }

    async fn create_account(
        &self,
        account: NewAccount,
    ) -> Result<Account, RepositoryError> {
        let mut state = self.state()?;
        if state
            .accounts
            .values()
            .any(|a| a.company_id == account.company_id && a.code == account.code)
        {
            return Err(RepositoryError::Conflict(format!(
                "account code {} already exists for company {}",
                account.code, account.company_id
            )));
        }
        let account = Account {
            id: state.next_id(),
            company_id: account.company_id,
            code: account.code,
            name: account.name,
            account_type: account.account_type,
            subtype: account.subtype,
            is_active: true,
        };
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn list_accounts(
        &self,
        company_id: i64,
    ) -> Result<Vec<Account>, RepositoryError> {
        let mut accounts: Vec<Account> = self
            .state()?
            .accounts
            .values()
            .filter(|a| a.company_id == company_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(accounts)
    }

    async fn create_journal_entry(
        &self,
        entry: NewJournalEntry,
    ) -> Result<JournalEntry, RepositoryError> {
        Ok(self.state()?.insert_entry(entry))
    }

    async fn list_journal_entries(
        &self,
        company_id: i64,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<JournalEntry>, RepositoryError> {
        let mut entries: Vec<JournalEntry> = self
            .state()?
            .entries
            .values()
            .filter(|e| {
                e.company_id == company_id
                    && start.is_none_or(|s| e.entry_date >= s)
                    && end.is_none_or(|d| e.entry_date <= d)
            })
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.entry_number);
        Ok(entries)
    }
}

/// Registers [`MemoryRepository`] under the `"memory"` backend name. The
/// connection string is ignored.
pub struct MemoryRepositoryFactory;

#[async_trait]
impl RepositoryFactory for MemoryRepositoryFactory {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn create(
        &self,
        _config: &DbConfig,
    ) -> Result<Box<dyn PayrollRepository>, RepositoryError> {
        Ok(Box::new(MemoryRepository::new()))
    }
}
