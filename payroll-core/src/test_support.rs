use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::calculations::{PayrollCalculator, PayrollInput, PayrollResult};
use crate::{
    AmountType, CompanyRates, DeductionDefinition, EmployeeDeduction, EmployeeTaxProfile,
    FilingStatus, Jurisdiction, PayType, Residency, TaxBracket, TaxTables, TaxYearConfig,
    WithholdingElections, YtdAccumulators,
};

pub fn config_2025() -> TaxYearConfig {
    TaxYearConfig {
        tax_year: 2025,
        periods_per_year: 52,
        standard_weekly_hours: dec!(40),
        overtime_multiplier: dec!(1.5),
        social_security_rate: dec!(0.062),
        social_security_wage_base: dec!(176100),
        medicare_rate: dec!(0.0145),
        additional_medicare_rate: dec!(0.009),
        additional_medicare_threshold: dec!(200000),
        futa_default_rate: dec!(0.006),
        futa_wage_base: dec!(7000),
        sui_wage_base: dec!(12800),
        sdi_rate: dec!(0.005),
        sdi_weekly_max: dec!(0.60),
        sdi_annual_max: dec!(31.20),
        pfl_rate: dec!(0.00388),
        pfl_annual_max: dec!(354.53),
        nyc_rate: dec!(0.03876),
        yonkers_surcharge_rate: dec!(0.1675),
        federal_allowance_amount: dec!(0),
        state_allowance_amount: dec!(1000),
    }
}

fn bracket(
    jurisdiction: Jurisdiction,
    min_income: Decimal,
    max_income: Option<Decimal>,
    tax_rate: Decimal,
    base_tax: Decimal,
) -> TaxBracket {
    TaxBracket {
        tax_year: 2025,
        jurisdiction,
        filing_status: FilingStatus::Single,
        min_income,
        max_income,
        tax_rate,
        base_tax,
    }
}

/// 2025 single-filer federal and NY tables.
pub fn tables_2025() -> TaxTables {
    use Jurisdiction::{Federal, State};

    let brackets = vec![
        bracket(Federal, dec!(0), Some(dec!(11925)), dec!(0.10), dec!(0)),
        bracket(Federal, dec!(11925), Some(dec!(48475)), dec!(0.12), dec!(1192.50)),
        bracket(Federal, dec!(48475), Some(dec!(103350)), dec!(0.22), dec!(5578.50)),
        bracket(Federal, dec!(103350), Some(dec!(197300)), dec!(0.24), dec!(17651)),
        bracket(Federal, dec!(197300), Some(dec!(250525)), dec!(0.32), dec!(40199)),
        bracket(Federal, dec!(250525), Some(dec!(626350)), dec!(0.35), dec!(57231)),
        bracket(Federal, dec!(626350), None, dec!(0.37), dec!(188769.75)),
        bracket(State, dec!(0), Some(dec!(8500)), dec!(0.04), dec!(0)),
        bracket(State, dec!(8500), Some(dec!(11700)), dec!(0.045), dec!(340)),
        bracket(State, dec!(11700), Some(dec!(13900)), dec!(0.0525), dec!(484)),
        bracket(State, dec!(13900), Some(dec!(80650)), dec!(0.055), dec!(599.50)),
        bracket(State, dec!(80650), Some(dec!(215400)), dec!(0.06), dec!(4270.75)),
        bracket(State, dec!(215400), None, dec!(0.0685), dec!(12355.75)),
    ];

    TaxTables::new(config_2025(), brackets)
}

pub fn hourly_profile(rate: Decimal) -> EmployeeTaxProfile {
    EmployeeTaxProfile {
        filing_status: FilingStatus::Single,
        allowances: 0,
        residency: Residency {
            state_resident: true,
            local: None,
        },
        withholding: WithholdingElections::default(),
        pay: PayType::Hourly { rate },
    }
}

pub fn salaried_profile(annual_salary: Decimal) -> EmployeeTaxProfile {
    EmployeeTaxProfile {
        pay: PayType::Salary { annual_salary },
        ..hourly_profile(Decimal::ZERO)
    }
}

pub fn deduction(
    deduction_type: &str,
    amount_type: AmountType,
    amount: Decimal,
    pre_tax: bool,
) -> DeductionDefinition {
    DeductionDefinition {
        deduction_type: deduction_type.to_string(),
        name: deduction_type.to_string(),
        amount_type,
        amount,
        pre_tax,
        annual_limit: None,
        ytd_amount: dec!(0),
    }
}

pub fn elected(
    id: i64,
    definition: DeductionDefinition,
) -> EmployeeDeduction {
    EmployeeDeduction {
        id,
        employee_id: 3,
        is_active: true,
        definition,
    }
}

/// 40 hours at $25 with a 5% pre-tax 401k and a $10 post-tax union due.
pub fn sample_result() -> PayrollResult {
    let tables = tables_2025();
    let profile = hourly_profile(dec!(25));
    let deductions = vec![
        elected(11, deduction("401k", AmountType::Percentage, dec!(5), true)),
        elected(12, deduction("union", AmountType::Fixed, dec!(10), false)),
    ];

    PayrollCalculator::new(&tables).calculate(&PayrollInput {
        profile: &profile,
        rates: CompanyRates::default(),
        regular_hours: dec!(40),
        overtime_hours: dec!(0),
        ytd: YtdAccumulators::default(),
        deductions: &deductions,
    })
}
