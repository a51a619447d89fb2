use std::collections::HashSet;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::lifecycle::{
    LifecycleError, YtdAdjustment, adjust_deductions, ensure_active, plan_correction, plan_void,
    ytd_applications, ytd_reversals,
};
use crate::calculations::{PayrollCalculator, PayrollInput, PayrollResult};
use crate::db::{PayrollRepository, RepositoryError};
use crate::ledger::{LedgerError, LedgerService, PayrollAccountCodes};
use crate::{
    Employee, JournalEntry, NewPayrollRecord, PayPeriod, PayrollRecord, StatusChange, TaxTables,
    YtdAccumulators, accumulate_ytd,
};

#[derive(Debug, Error)]
pub enum PayrollError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("employee {employee_id} does not belong to company {company_id}")]
    ForeignEmployee { employee_id: i64, company_id: i64 },

    #[error("employee {employee_id} has more than one timesheet in the pay run")]
    DuplicateTimesheet { employee_id: i64 },
}

/// Hours worked by one employee in a pay period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timesheet {
    pub employee_id: i64,
    pub regular_hours: Decimal,
    pub overtime_hours: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayRun {
    pub records: Vec<PayrollRecord>,
    /// `None` when the company has no payroll chart of accounts.
    pub journal_entry: Option<JournalEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoidOutcome {
    pub voided: PayrollRecord,
    pub reversals: Vec<YtdAdjustment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionOutcome {
    /// The original, now in `Corrected` status.
    pub voided: PayrollRecord,
    /// The active replacement.
    pub corrected: PayrollRecord,
}

/// Runs payroll and drives records through their lifecycle.
pub struct PayrollService<'a, R: PayrollRepository + ?Sized> {
    repo: &'a R,
    ledger: LedgerService<'a, R>,
}

impl<'a, R: PayrollRepository + ?Sized> PayrollService<'a, R> {
    pub fn new(repo: &'a R) -> Self {
        Self {
            repo,
            ledger: LedgerService::new(repo),
        }
    }

    pub fn with_codes(
        repo: &'a R,
        codes: PayrollAccountCodes,
    ) -> Self {
        Self {
            repo,
            ledger: LedgerService::with_codes(repo, codes),
        }
    }

    pub fn ledger(&self) -> &LedgerService<'a, R> {
        &self.ledger
    }

    pub async fn load_tables(
        &self,
        year: i32,
    ) -> Result<TaxTables, PayrollError> {
        let config = self.repo.get_tax_year_config(year).await?;
        let brackets = self.repo.get_tax_brackets(year).await?;
        Ok(TaxTables::new(config, brackets))
    }

    /// Totals of the employee's active records paid earlier in the same
    /// calendar year as `period`. Active records already sharing its pay
    /// date count too, since a new record is created after them.
    pub async fn prior_ytd(
        &self,
        employee_id: i64,
        period: &PayPeriod,
    ) -> Result<YtdAccumulators, PayrollError> {
        self.ytd_before(employee_id, period, None).await
    }

    /// Records are ordered by (pay date, id); `record_id` is the position
    /// being computed, or `None` for a record not yet created.
    async fn ytd_before(
        &self,
        employee_id: i64,
        period: &PayPeriod,
        record_id: Option<i64>,
    ) -> Result<YtdAccumulators, PayrollError> {
        let position = (period.pay_date, record_id.unwrap_or(i64::MAX));
        let records = self
            .repo
            .list_payroll_records(employee_id, period.tax_year())
            .await?;
        Ok(accumulate_ytd(
            records
                .iter()
                .filter(|r| r.is_active() && (r.period.pay_date, r.id) < position),
        ))
    }

    /// Computes pay for one employee without persisting anything.
    pub async fn calculate(
        &self,
        employee_id: i64,
        period: &PayPeriod,
        regular_hours: Decimal,
        overtime_hours: Decimal,
    ) -> Result<PayrollResult, PayrollError> {
        let employee = self.repo.get_employee(employee_id).await?;
        let tables = self.load_tables(period.tax_year()).await?;
        self.compute(&employee, &tables, period, regular_hours, overtime_hours, None)
            .await
    }

    /// With `replacing`, the result is computed as if that record had never
    /// been paid: its deductions are backed out of the YTD amounts first and
    /// only records ahead of it count towards prior YTD.
    async fn compute(
        &self,
        employee: &Employee,
        tables: &TaxTables,
        period: &PayPeriod,
        regular_hours: Decimal,
        overtime_hours: Decimal,
        replacing: Option<&PayrollRecord>,
    ) -> Result<PayrollResult, PayrollError> {
        let mut deductions: Vec<_> = self
            .repo
            .list_deductions(employee.id)
            .await?
            .into_iter()
            .filter(|d| d.is_active)
            .collect();
        let ytd = match replacing {
            Some(record) => {
                adjust_deductions(&mut deductions, &ytd_reversals(record));
                self.ytd_before(employee.id, period, Some(record.id)).await?
            }
            None => self.prior_ytd(employee.id, period).await?,
        };

        Ok(PayrollCalculator::new(tables).calculate(&PayrollInput {
            profile: &employee.profile,
            rates: employee.rates,
            regular_hours,
            overtime_hours,
            ytd,
            deductions: &deductions,
        }))
    }

    /// Pays every timesheet for `period` and posts the batch to the ledger.
    ///
    /// Records and their YTD deduction updates are committed together; the
    /// journal entry follows and is skipped when the chart is incomplete.
    pub async fn run_pay_period(
        &self,
        company_id: i64,
        period: &PayPeriod,
        timesheets: &[Timesheet],
    ) -> Result<PayRun, PayrollError> {
        let mut seen = HashSet::with_capacity(timesheets.len());
        if let Some(sheet) = timesheets.iter().find(|t| !seen.insert(t.employee_id)) {
            return Err(PayrollError::DuplicateTimesheet {
                employee_id: sheet.employee_id,
            });
        }
        let tables = self.load_tables(period.tax_year()).await?;

        let mut new_records = Vec::with_capacity(timesheets.len());
        let mut adjustments = Vec::new();
        for sheet in timesheets {
            let employee = self.repo.get_employee(sheet.employee_id).await?;
            if employee.company_id != company_id {
                return Err(PayrollError::ForeignEmployee {
                    employee_id: employee.id,
                    company_id,
                });
            }
            let result = self
                .compute(
                    &employee,
                    &tables,
                    period,
                    sheet.regular_hours,
                    sheet.overtime_hours,
                    None,
                )
                .await?;
            adjustments.extend(ytd_applications(employee.id, &result));
            new_records.push(NewPayrollRecord {
                employee_id: employee.id,
                company_id,
                period: *period,
                result,
                original_record_id: None,
            });
        }

        let mut records = self
            .repo
            .commit_payroll_run(new_records, adjustments)
            .await?;
        info!(company_id, period = %period.label(), count = records.len(), "payroll run committed");

        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        let journal_entry = self
            .ledger
            .create_payroll_journal_entries(company_id, &ids, period.pay_date, &period.label())
            .await?;
        if let Some(entry) = &journal_entry {
            for record in &mut records {
                record.journal_entry_id = Some(entry.id);
            }
        }

        Ok(PayRun {
            records,
            journal_entry,
        })
    }

    /// Voids an active record, backing its deductions out of YTD and its
    /// amounts out of the ledger.
    pub async fn void_payroll_record(
        &self,
        record_id: i64,
        reason: &str,
        actor: &str,
    ) -> Result<VoidOutcome, PayrollError> {
        let record = self.repo.get_payroll_record(record_id).await?;
        let change = status_change(reason, actor);
        let entry_date = change.at.date_naive();

        let mut plan = plan_void(&record, change)?;
        plan.reversal_entry = self
            .ledger
            .draft_reversal(&record, entry_date, reason)
            .await?;
        let reversals = plan.reversals.clone();

        let voided = self.repo.commit_void(plan).await?;
        info!(record_id, actor, reason, "payroll record voided");

        Ok(VoidOutcome { voided, reversals })
    }

    /// Replaces an active record with one recomputed from the employee's
    /// current configuration, using the tax tables of the original pay date.
    pub async fn correct_payroll_record(
        &self,
        record_id: i64,
        reason: &str,
        actor: &str,
    ) -> Result<CorrectionOutcome, PayrollError> {
        let record = self.repo.get_payroll_record(record_id).await?;
        ensure_active(&record)?;

        let employee = self.repo.get_employee(record.employee_id).await?;
        let tables = self.load_tables(record.period.tax_year()).await?;
        let result = self
            .compute(
                &employee,
                &tables,
                &record.period,
                record.result.regular_hours,
                record.result.overtime_hours,
                Some(&record),
            )
            .await?;

        let change = status_change(reason, actor);
        let entry_date = change.at.date_naive();
        let mut plan = plan_correction(&record, change, result)?;
        plan.reversal_entry = self
            .ledger
            .draft_reversal(&record, entry_date, reason)
            .await?;
        if plan.reversal_entry.is_some() {
            plan.replacement_entry = self
                .ledger
                .draft_record_entry(record.company_id, record.id, &plan.replacement.result, entry_date)
                .await?;
        }

        let (voided, corrected) = self.repo.commit_correction(plan).await?;
        info!(
            record_id,
            replacement_id = corrected.id,
            actor,
            reason,
            "payroll record corrected"
        );

        Ok(CorrectionOutcome { voided, corrected })
    }
}

fn status_change(
    reason: &str,
    actor: &str,
) -> StatusChange {
    StatusChange {
        actor: actor.to_string(),
        reason: reason.to_string(),
        at: Utc::now(),
    }
}
