use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{FilingStatus, Jurisdiction, TaxBracket};

/// Statutory constants for one tax year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxYearConfig {
    pub tax_year: i32,
    pub periods_per_year: u32,
    pub standard_weekly_hours: Decimal,
    pub overtime_multiplier: Decimal,

    pub social_security_rate: Decimal,
    pub social_security_wage_base: Decimal,
    pub medicare_rate: Decimal,
    pub additional_medicare_rate: Decimal,
    pub additional_medicare_threshold: Decimal,

    pub futa_default_rate: Decimal,
    pub futa_wage_base: Decimal,
    pub sui_wage_base: Decimal,

    pub sdi_rate: Decimal,
    pub sdi_weekly_max: Decimal,
    pub sdi_annual_max: Decimal,
    pub pfl_rate: Decimal,
    pub pfl_annual_max: Decimal,

    pub nyc_rate: Decimal,
    pub yonkers_surcharge_rate: Decimal,

    /// Annual income exempted per allowance claimed.
    pub federal_allowance_amount: Decimal,
    pub state_allowance_amount: Decimal,
}

/// One tax year's constants together with its bracket tables.
///
/// Payroll for a given pay date is always computed against the tables of
/// that pay date's calendar year, so recomputing an old record uses the
/// rules that applied at the time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxTables {
    pub config: TaxYearConfig,
    pub brackets: Vec<TaxBracket>,
}

impl TaxTables {
    pub fn new(
        config: TaxYearConfig,
        brackets: Vec<TaxBracket>,
    ) -> Self {
        Self { config, brackets }
    }

    /// Brackets for one jurisdiction and filing status, ordered by
    /// `min_income`.
    pub fn brackets_for(
        &self,
        jurisdiction: Jurisdiction,
        filing_status: FilingStatus,
    ) -> Vec<TaxBracket> {
        let mut brackets: Vec<TaxBracket> = self
            .brackets
            .iter()
            .filter(|b| {
                b.tax_year == self.config.tax_year
                    && b.jurisdiction == jurisdiction
                    && b.filing_status == filing_status
            })
            .cloned()
            .collect();
        brackets.sort_by(|a, b| a.min_income.cmp(&b.min_income));
        brackets
    }
}
