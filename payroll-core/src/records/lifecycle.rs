//! Void and correction planning.
//!
//! Planning is pure: it checks the record's status and works out every
//! write the transition needs. A repository then applies the whole plan in
//! one atomic commit.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calculations::PayrollResult;
use crate::{
    EmployeeDeduction, NewJournalEntry, NewPayrollRecord, PayrollRecord, PayrollStatus,
    StatusChange,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("payroll record {record_id} is {status}; only active records can be voided or corrected")]
    NotActive {
        record_id: i64,
        status: PayrollStatus,
    },
}

/// A change to the YTD amount of an employee's active deductions.
///
/// With a `deduction_id` only that deduction moves; without one, every
/// active deduction of `deduction_type` does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YtdAdjustment {
    pub employee_id: i64,
    pub deduction_id: Option<i64>,
    pub deduction_type: String,
    /// Negative when backing an amount out.
    pub delta: Decimal,
}

impl YtdAdjustment {
    pub fn applies_to(
        &self,
        deduction: &EmployeeDeduction,
    ) -> bool {
        deduction.is_active
            && deduction.employee_id == self.employee_id
            && match self.deduction_id {
                Some(id) => deduction.id == id,
                None => deduction.definition.deduction_type == self.deduction_type,
            }
    }
}

/// New YTD amount after `delta`, never below zero.
pub fn apply_ytd_adjustment(
    current: Decimal,
    delta: Decimal,
) -> Decimal {
    (current + delta).max(Decimal::ZERO)
}

/// Applies each adjustment, in order, to every deduction it matches.
pub fn adjust_deductions<'d>(
    deductions: impl IntoIterator<Item = &'d mut EmployeeDeduction>,
    adjustments: &[YtdAdjustment],
) {
    for deduction in deductions {
        for adjustment in adjustments {
            if adjustment.applies_to(deduction) {
                deduction.definition.ytd_amount =
                    apply_ytd_adjustment(deduction.definition.ytd_amount, adjustment.delta);
            }
        }
    }
}

/// One adjustment per deduction line, so two deductions sharing a type
/// each move by their own amount.
fn adjustments(
    employee_id: i64,
    result: &PayrollResult,
    sign: Decimal,
) -> Vec<YtdAdjustment> {
    result
        .deduction_lines()
        .filter(|line| !line.amount.is_zero())
        .map(|line| YtdAdjustment {
            employee_id,
            deduction_id: line.deduction_id,
            deduction_type: line.deduction_type.clone(),
            delta: line.amount * sign,
        })
        .collect()
}

/// Adds the deductions `result` took to the employee's YTD amounts.
pub fn ytd_applications(
    employee_id: i64,
    result: &PayrollResult,
) -> Vec<YtdAdjustment> {
    adjustments(employee_id, result, Decimal::ONE)
}

/// Backs out the deductions `record` contributed.
pub fn ytd_reversals(record: &PayrollRecord) -> Vec<YtdAdjustment> {
    adjustments(record.employee_id, &record.result, Decimal::NEGATIVE_ONE)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoidPlan {
    pub record_id: i64,
    pub change: StatusChange,
    pub reversals: Vec<YtdAdjustment>,
    /// Backs the record out of the ledger; `None` when nothing is posted.
    pub reversal_entry: Option<NewJournalEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionPlan {
    pub record_id: i64,
    pub change: StatusChange,
    /// Always active and pointing back at `record_id`.
    pub replacement: NewPayrollRecord,
    pub reversals: Vec<YtdAdjustment>,
    pub reapplications: Vec<YtdAdjustment>,
    pub reversal_entry: Option<NewJournalEntry>,
    pub replacement_entry: Option<NewJournalEntry>,
}

/// Only active records may be voided or corrected.
pub fn ensure_active(record: &PayrollRecord) -> Result<(), LifecycleError> {
    if record.is_active() {
        Ok(())
    } else {
        Err(LifecycleError::NotActive {
            record_id: record.id,
            status: record.status,
        })
    }
}

pub fn plan_void(
    record: &PayrollRecord,
    change: StatusChange,
) -> Result<VoidPlan, LifecycleError> {
    ensure_active(record)?;

    Ok(VoidPlan {
        record_id: record.id,
        change,
        reversals: ytd_reversals(record),
        reversal_entry: None,
    })
}

/// Plans replacing `record` with `new_result`, computed by the caller from
/// the employee's current configuration for the same period.
pub fn plan_correction(
    record: &PayrollRecord,
    change: StatusChange,
    new_result: PayrollResult,
) -> Result<CorrectionPlan, LifecycleError> {
    ensure_active(record)?;

    let reapplications = ytd_applications(record.employee_id, &new_result);
    Ok(CorrectionPlan {
        record_id: record.id,
        change,
        replacement: NewPayrollRecord {
            employee_id: record.employee_id,
            company_id: record.company_id,
            period: record.period,
            result: new_result,
            original_record_id: Some(record.id),
        },
        reversals: ytd_reversals(record),
        reapplications,
        reversal_entry: None,
        replacement_entry: None,
    })
}
