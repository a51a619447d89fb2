use std::collections::HashMap;
use std::io::Read;

use payroll_core::{FilingStatus, Jurisdiction, PayrollRepository, RepositoryError, TaxBracket};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

/// Errors that can occur when loading tax bracket tables.
#[derive(Debug, Error)]
pub enum BracketLoaderError {
    #[error("CSV parse error: {0}")]
    CsvParse(String),

    #[error("Unknown jurisdiction '{0}' (expected federal or state)")]
    InvalidJurisdiction(String),

    #[error("Unknown filing status '{0}' (expected S, M or HOH)")]
    InvalidFilingStatus(String),

    #[error("Invalid schedule for {tax_year} {jurisdiction} {filing_status}: {reason}")]
    InvalidSchedule {
        tax_year: i32,
        jurisdiction: &'static str,
        filing_status: &'static str,
        reason: String,
    },

    #[error("Tax year {0} not found in database (have you run the seeds?)")]
    TaxYearNotFound(i32),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<csv::Error> for BracketLoaderError {
    fn from(err: csv::Error) -> Self {
        BracketLoaderError::CsvParse(err.to_string())
    }
}

/// One row of a bracket CSV.
///
/// Columns: `tax_year, jurisdiction, filing_status, min_income, max_income,
/// base_tax, rate`. `max_income` is empty for the top bracket; `rate` is a
/// fraction (0.22, not 22).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BracketRecord {
    pub tax_year: i32,
    pub jurisdiction: String,
    pub filing_status: String,
    pub min_income: Decimal,
    #[serde(deserialize_with = "deserialize_optional_decimal")]
    pub max_income: Option<Decimal>,
    pub base_tax: Decimal,
    pub rate: Decimal,
}

impl BracketRecord {
    pub fn to_bracket(&self) -> Result<TaxBracket, BracketLoaderError> {
        let jurisdiction = Jurisdiction::parse(self.jurisdiction.trim())
            .ok_or_else(|| BracketLoaderError::InvalidJurisdiction(self.jurisdiction.clone()))?;
        let filing_status = FilingStatus::parse(self.filing_status.trim())
            .ok_or_else(|| BracketLoaderError::InvalidFilingStatus(self.filing_status.clone()))?;
        Ok(TaxBracket {
            tax_year: self.tax_year,
            jurisdiction,
            filing_status,
            min_income: self.min_income,
            max_income: self.max_income,
            tax_rate: self.rate,
            base_tax: self.base_tax,
        })
    }
}

fn deserialize_optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .parse::<Decimal>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// A schedule must start at zero, have no gaps or overlaps, and end with a
/// single unbounded bracket.
fn check_schedule(brackets: &mut [TaxBracket]) -> Result<(), BracketLoaderError> {
    brackets.sort_by_key(|b| b.min_income);
    let Some(first) = brackets.first() else {
        return Ok(());
    };
    let invalid = |reason: String| BracketLoaderError::InvalidSchedule {
        tax_year: first.tax_year,
        jurisdiction: first.jurisdiction.as_str(),
        filing_status: first.filing_status.as_str(),
        reason,
    };

    if first.min_income != Decimal::ZERO {
        return Err(invalid(format!("first bracket starts at {}", first.min_income)));
    }
    for pair in brackets.windows(2) {
        if pair[0].max_income != Some(pair[1].min_income) {
            return Err(invalid(format!(
                "bracket starting at {} does not end where {} begins",
                pair[0].min_income, pair[1].min_income
            )));
        }
    }
    if brackets.last().is_some_and(|b| b.max_income.is_some()) {
        return Err(invalid("top bracket must have no max_income".to_string()));
    }
    Ok(())
}

/// Loads bracket tables from CSV through any [`PayrollRepository`].
pub struct BracketLoader;

impl BracketLoader {
    /// Parse bracket rows from any reader (a file, a byte slice).
    pub fn parse<R: Read>(reader: R) -> Result<Vec<BracketRecord>, BracketLoaderError> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut records = Vec::new();

        for result in csv_reader.deserialize() {
            let record: BracketRecord = result?;
            records.push(record);
        }

        Ok(records)
    }

    /// Replace the stored schedules with the ones in `records`.
    ///
    /// Rows are grouped by (tax year, jurisdiction, filing status). Every
    /// group is validated before anything is written; each group then
    /// replaces the stored schedule for that key, so loading the same file
    /// twice leaves the same tables behind. Returns the number of brackets
    /// inserted.
    pub async fn load<R: PayrollRepository + ?Sized>(
        repo: &R,
        records: &[BracketRecord],
    ) -> Result<usize, BracketLoaderError> {
        let mut groups: HashMap<(i32, Jurisdiction, FilingStatus), Vec<TaxBracket>> =
            HashMap::new();
        for record in records {
            let bracket = record.to_bracket()?;
            groups
                .entry((bracket.tax_year, bracket.jurisdiction, bracket.filing_status))
                .or_default()
                .push(bracket);
        }
        for schedule in groups.values_mut() {
            check_schedule(schedule)?;
        }

        let mut inserted = 0;
        for ((tax_year, jurisdiction, filing_status), brackets) in groups {
            repo.get_tax_year_config(tax_year)
                .await
                .map_err(|e| match e {
                    RepositoryError::NotFound => BracketLoaderError::TaxYearNotFound(tax_year),
                    other => BracketLoaderError::Repository(other),
                })?;

            repo.delete_tax_brackets(tax_year, jurisdiction, filing_status)
                .await?;
            for bracket in &brackets {
                repo.insert_tax_bracket(bracket).await?;
                inserted += 1;
            }
            info!(
                tax_year,
                jurisdiction = jurisdiction.as_str(),
                filing_status = filing_status.as_str(),
                count = brackets.len(),
                "replaced bracket schedule"
            );
        }

        Ok(inserted)
    }
}
