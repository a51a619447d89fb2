use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PayPeriod, YtdAccumulators};
use crate::calculations::PayrollResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayrollStatus {
    Active,
    Voided,
    Corrected,
}

impl PayrollStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Voided => "voided",
            Self::Corrected => "corrected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "voided" => Some(Self::Voided),
            "corrected" => Some(Self::Corrected),
            _ => None,
        }
    }
}

impl std::fmt::Display for PayrollStatus {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who voided or corrected a record, when, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub actor: String,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollRecord {
    pub id: i64,
    pub employee_id: i64,
    pub company_id: i64,
    pub period: PayPeriod,
    pub result: PayrollResult,
    pub status: PayrollStatus,
    pub status_change: Option<StatusChange>,
    /// Set on a replacement record: the record it corrects.
    pub original_record_id: Option<i64>,
    /// Set on a corrected record: the record that replaced it.
    pub replacement_record_id: Option<i64>,
    pub journal_entry_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl PayrollRecord {
    pub fn is_active(&self) -> bool {
        self.status == PayrollStatus::Active
    }
}

/// For creating new records (no id, always active)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayrollRecord {
    pub employee_id: i64,
    pub company_id: i64,
    pub period: PayPeriod,
    pub result: PayrollResult,
    pub original_record_id: Option<i64>,
}

/// Sums the contributions of `records` into year-to-date totals.
///
/// Callers are expected to pass only active records of one calendar year.
pub fn accumulate_ytd<'a>(records: impl IntoIterator<Item = &'a PayrollRecord>) -> YtdAccumulators {
    records
        .into_iter()
        .fold(YtdAccumulators::default(), |mut ytd, record| {
            let result = &record.result;
            ytd.gross_pay += result.gross_pay;
            ytd.social_security += result.taxes.social_security;
            ytd.medicare += result.taxes.medicare + result.taxes.additional_medicare;
            ytd.sdi += result.taxes.sdi;
            ytd.pfl += result.taxes.pfl;
            ytd
        })
}
