//! Gross-to-net payroll calculation.
//!
//! [`PayrollCalculator`] is a pure function of its inputs: the tax year's
//! [`TaxTables`], the employee's profile and deductions, company rates, the
//! hours worked and the prior year-to-date totals. It never fails; missing
//! rates default to zero (FUTA to the tax year's default) and every cap is
//! clamped at zero.
//!
//! # Calculation order
//!
//! | Step | Description |
//! |------|-------------|
//! | 1    | Gross pay (salary normalized to the standard week) |
//! | 2    | Pre-tax deductions, giving taxable wages |
//! | 3    | Wage-base limited: Social Security, SUI, FUTA (on gross) |
//! | 4    | Fixed rate: Medicare, SDI, PFL (on gross, capped) |
//! | 5    | Additional Medicare above the YTD threshold |
//! | 6    | Federal and state income tax on taxable wages |
//! | 7    | Local tax: NYC flat rate or Yonkers surcharge |
//! | 8    | Post-tax deductions |
//! | 9    | Totals and net pay |
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use payroll_core::calculations::{PayrollCalculator, PayrollInput};
//! use payroll_core::{
//!     CompanyRates, EmployeeTaxProfile, FilingStatus, PayType, Residency, TaxTables,
//!     TaxYearConfig, WithholdingElections, YtdAccumulators,
//! };
//!
//! let config = TaxYearConfig {
//!     tax_year: 2025,
//!     periods_per_year: 52,
//!     standard_weekly_hours: dec!(40),
//!     overtime_multiplier: dec!(1.5),
//!     social_security_rate: dec!(0.062),
//!     social_security_wage_base: dec!(176100),
//!     medicare_rate: dec!(0.0145),
//!     additional_medicare_rate: dec!(0.009),
//!     additional_medicare_threshold: dec!(200000),
//!     futa_default_rate: dec!(0.006),
//!     futa_wage_base: dec!(7000),
//!     sui_wage_base: dec!(12800),
//!     sdi_rate: dec!(0.005),
//!     sdi_weekly_max: dec!(0.60),
//!     sdi_annual_max: dec!(31.20),
//!     pfl_rate: dec!(0.00388),
//!     pfl_annual_max: dec!(354.53),
//!     nyc_rate: dec!(0.03876),
//!     yonkers_surcharge_rate: dec!(0.1675),
//!     federal_allowance_amount: dec!(0),
//!     state_allowance_amount: dec!(1000),
//! };
//! let tables = TaxTables::new(config, Vec::new());
//!
//! let profile = EmployeeTaxProfile {
//!     filing_status: FilingStatus::Single,
//!     allowances: 0,
//!     residency: Residency::default(),
//!     withholding: WithholdingElections::default(),
//!     pay: PayType::Hourly { rate: dec!(25) },
//! };
//!
//! let input = PayrollInput {
//!     profile: &profile,
//!     rates: CompanyRates::default(),
//!     regular_hours: dec!(40),
//!     overtime_hours: dec!(0),
//!     ytd: YtdAccumulators::default(),
//!     deductions: &[],
//! };
//!
//! let result = PayrollCalculator::new(&tables).calculate(&input);
//!
//! assert_eq!(result.gross_pay, dec!(1000.00));
//! assert_eq!(result.taxes.social_security, dec!(62.00));
//! assert_eq!(result.taxes.medicare, dec!(14.50));
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calculations::brackets::BracketSchedule;
use crate::calculations::common::{max, remaining, round_half_up};
use crate::calculations::deductions::{DeductionLine, process_deductions};
use crate::{
    CompanyRates, EmployeeDeduction, EmployeeTaxProfile, Jurisdiction, LocalJurisdiction,
    PayType, TaxTables, YtdAccumulators,
};

/// Everything the engine needs for one employee and one period.
#[derive(Debug, Clone)]
pub struct PayrollInput<'a> {
    pub profile: &'a EmployeeTaxProfile,
    pub rates: CompanyRates,
    /// Ignored for salaried employees.
    pub regular_hours: Decimal,
    /// Ignored for salaried employees.
    pub overtime_hours: Decimal,
    pub ytd: YtdAccumulators,
    /// Processed in order; pre-tax and post-tax may be interleaved.
    pub deductions: &'a [EmployeeDeduction],
}

/// Employee-side withholdings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaxWithholdings {
    pub federal_income_tax: Decimal,
    pub state_income_tax: Decimal,
    pub local_tax: Decimal,
    pub social_security: Decimal,
    pub medicare: Decimal,
    pub additional_medicare: Decimal,
    pub sdi: Decimal,
    pub pfl: Decimal,
}

impl TaxWithholdings {
    pub fn total(&self) -> Decimal {
        self.federal_income_tax
            + self.state_income_tax
            + self.local_tax
            + self.social_security
            + self.medicare
            + self.additional_medicare
            + self.sdi
            + self.pfl
    }
}

/// Employer-side costs on top of gross pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmployerContributions {
    pub social_security: Decimal,
    pub medicare: Decimal,
    pub futa: Decimal,
    pub sui: Decimal,
}

impl EmployerContributions {
    pub fn total(&self) -> Decimal {
        self.social_security + self.medicare + self.futa + self.sui
    }
}

/// Full gross-to-net breakdown for one period. Every amount is in cents.
///
/// `net_pay == gross_pay - total_pre_tax_deductions - total_tax_withholdings
/// - total_post_tax_deductions` holds exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollResult {
    pub regular_hours: Decimal,
    pub overtime_hours: Decimal,
    pub regular_pay: Decimal,
    pub overtime_pay: Decimal,
    pub gross_pay: Decimal,

    pub pre_tax_deductions: Vec<DeductionLine>,
    pub total_pre_tax_deductions: Decimal,
    pub taxable_wages: Decimal,

    pub taxes: TaxWithholdings,
    pub total_tax_withholdings: Decimal,

    pub post_tax_deductions: Vec<DeductionLine>,
    pub total_post_tax_deductions: Decimal,

    pub net_pay: Decimal,

    pub employer: EmployerContributions,
    pub total_employer_cost: Decimal,
}

impl PayrollResult {
    /// Pre-tax lines followed by post-tax lines.
    pub fn deduction_lines(&self) -> impl Iterator<Item = &DeductionLine> {
        self.pre_tax_deductions
            .iter()
            .chain(self.post_tax_deductions.iter())
    }
}

/// Calculator bound to one tax year's tables.
#[derive(Debug, Clone)]
pub struct PayrollCalculator<'a> {
    tables: &'a TaxTables,
}

impl<'a> PayrollCalculator<'a> {
    pub fn new(tables: &'a TaxTables) -> Self {
        Self { tables }
    }

    pub fn calculate(
        &self,
        input: &PayrollInput<'_>,
    ) -> PayrollResult {
        let config = &self.tables.config;
        let profile = input.profile;
        let ytd = &input.ytd;

        let (regular_hours, overtime_hours, hourly_rate) = self.normalize_hours(input);
        let regular_pay = round_half_up(regular_hours * hourly_rate);
        let overtime_pay =
            round_half_up(overtime_hours * hourly_rate * config.overtime_multiplier);
        let gross_pay = regular_pay + overtime_pay;

        let pre_tax = process_deductions(input.deductions, gross_pay, true);
        let taxable_wages = max(gross_pay - pre_tax.total, Decimal::ZERO);

        // Wage-base limited, always on gross pay.
        let ss_taxable = self.wage_base_taxable(
            gross_pay,
            config.social_security_wage_base,
            ytd.gross_pay,
        );
        let social_security = self.social_security_employee(ss_taxable, ytd.social_security);
        let employer_social_security = round_half_up(ss_taxable * config.social_security_rate);

        let futa_rate = input.rates.futa_rate.unwrap_or(config.futa_default_rate);
        let futa = round_half_up(
            self.wage_base_taxable(gross_pay, config.futa_wage_base, ytd.gross_pay) * futa_rate,
        );
        let sui_rate = input.rates.sui_rate.unwrap_or(Decimal::ZERO);
        let sui = round_half_up(
            self.wage_base_taxable(gross_pay, config.sui_wage_base, ytd.gross_pay) * sui_rate,
        );

        // Fixed rate.
        let medicare = round_half_up(gross_pay * config.medicare_rate);
        let employer_medicare = medicare;
        let sdi = if profile.withholding.disability {
            self.sdi(gross_pay, ytd.sdi)
        } else {
            Decimal::ZERO
        };
        let pfl = if profile.withholding.paid_family_leave {
            self.pfl(gross_pay, ytd.pfl)
        } else {
            Decimal::ZERO
        };

        let additional_medicare = self.additional_medicare(gross_pay, ytd.gross_pay);

        let federal_income_tax = if profile.withholding.federal {
            self.income_tax(Jurisdiction::Federal, profile, taxable_wages)
        } else {
            Decimal::ZERO
        };
        let state_income_tax = if profile.withholding.state {
            self.income_tax(Jurisdiction::State, profile, taxable_wages)
        } else {
            Decimal::ZERO
        };
        let local_tax = self.local_tax(profile, taxable_wages, state_income_tax);

        let post_tax = process_deductions(input.deductions, gross_pay, false);

        let taxes = TaxWithholdings {
            federal_income_tax,
            state_income_tax,
            local_tax,
            social_security,
            medicare,
            additional_medicare,
            sdi,
            pfl,
        };
        let total_tax_withholdings = taxes.total();
        let net_pay = gross_pay - pre_tax.total - total_tax_withholdings - post_tax.total;

        let employer = EmployerContributions {
            social_security: employer_social_security,
            medicare: employer_medicare,
            futa,
            sui,
        };

        PayrollResult {
            regular_hours,
            overtime_hours,
            regular_pay,
            overtime_pay,
            gross_pay,
            pre_tax_deductions: pre_tax.lines,
            total_pre_tax_deductions: pre_tax.total,
            taxable_wages,
            taxes,
            total_tax_withholdings,
            post_tax_deductions: post_tax.lines,
            total_post_tax_deductions: post_tax.total,
            net_pay,
            total_employer_cost: employer.total(),
            employer,
        }
    }

    /// Returns `(regular_hours, overtime_hours, hourly_rate)`.
    ///
    /// Salaried employees are paid a standard week at a synthetic rate of
    /// annual salary / periods per year / standard weekly hours.
    fn normalize_hours(
        &self,
        input: &PayrollInput<'_>,
    ) -> (Decimal, Decimal, Decimal) {
        let config = &self.tables.config;
        match input.profile.pay {
            PayType::Hourly { rate } => (input.regular_hours, input.overtime_hours, rate),
            PayType::Salary { annual_salary } => {
                let hours = config.standard_weekly_hours;
                let per_year = Decimal::from(config.periods_per_year) * hours;
                let rate = if per_year.is_zero() {
                    Decimal::ZERO
                } else {
                    annual_salary / per_year
                };
                (hours, Decimal::ZERO, rate)
            }
        }
    }

    /// Portion of this period's gross still under `wage_base`.
    fn wage_base_taxable(
        &self,
        gross_pay: Decimal,
        wage_base: Decimal,
        ytd_gross: Decimal,
    ) -> Decimal {
        gross_pay.min(remaining(wage_base, ytd_gross))
    }

    /// Employee Social Security, also held under the annual maximum tax.
    fn social_security_employee(
        &self,
        taxable: Decimal,
        ytd_withheld: Decimal,
    ) -> Decimal {
        let config = &self.tables.config;
        let max_tax = round_half_up(config.social_security_wage_base * config.social_security_rate);
        round_half_up(taxable * config.social_security_rate).min(remaining(max_tax, ytd_withheld))
    }

    fn sdi(
        &self,
        gross_pay: Decimal,
        ytd_sdi: Decimal,
    ) -> Decimal {
        let config = &self.tables.config;
        round_half_up(gross_pay * config.sdi_rate)
            .min(config.sdi_weekly_max)
            .min(remaining(config.sdi_annual_max, ytd_sdi))
    }

    /// PFL held under the annual maximum using the YTD amount withheld.
    fn pfl(
        &self,
        gross_pay: Decimal,
        ytd_pfl: Decimal,
    ) -> Decimal {
        let config = &self.tables.config;
        round_half_up(gross_pay * config.pfl_rate).min(remaining(config.pfl_annual_max, ytd_pfl))
    }

    /// Additional Medicare on the part of this period's gross above the
    /// threshold. If YTD is already past it, the whole period is taxed.
    fn additional_medicare(
        &self,
        gross_pay: Decimal,
        ytd_gross: Decimal,
    ) -> Decimal {
        let config = &self.tables.config;
        let threshold = config.additional_medicare_threshold;
        let excess = if ytd_gross >= threshold {
            gross_pay
        } else {
            max(ytd_gross + gross_pay - threshold, Decimal::ZERO)
        };
        round_half_up(excess * config.additional_medicare_rate)
    }

    fn income_tax(
        &self,
        jurisdiction: Jurisdiction,
        profile: &EmployeeTaxProfile,
        taxable_wages: Decimal,
    ) -> Decimal {
        let config = &self.tables.config;
        let allowance_amount = match jurisdiction {
            Jurisdiction::Federal => config.federal_allowance_amount,
            Jurisdiction::State => config.state_allowance_amount,
        };
        let exemption = Decimal::from(profile.allowances) * allowance_amount;
        let brackets = self
            .tables
            .brackets_for(jurisdiction, profile.filing_status);

        BracketSchedule::new(&brackets).period_tax(
            taxable_wages,
            config.periods_per_year,
            exemption,
        )
    }

    fn local_tax(
        &self,
        profile: &EmployeeTaxProfile,
        taxable_wages: Decimal,
        state_income_tax: Decimal,
    ) -> Decimal {
        if !profile.residency.state_resident {
            return Decimal::ZERO;
        }
        let config = &self.tables.config;

        match profile.residency.local {
            Some(LocalJurisdiction::Nyc) => {
                if config.periods_per_year == 0 {
                    return Decimal::ZERO;
                }
                let periods = Decimal::from(config.periods_per_year);
                let annual = taxable_wages * periods;
                round_half_up(annual * config.nyc_rate / periods)
            }
            Some(LocalJurisdiction::Yonkers) => {
                round_half_up(state_income_tax * config.yonkers_surcharge_rate)
            }
            None => Decimal::ZERO,
        }
    }
}
