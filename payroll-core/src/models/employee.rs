use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::FilingStatus;

/// Local taxing authority an employee resides in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalJurisdiction {
    /// Flat rate on annualized taxable wages.
    Nyc,
    /// Surcharge on the state income tax.
    Yonkers,
}

impl LocalJurisdiction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nyc => "nyc",
            Self::Yonkers => "yonkers",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "nyc" => Some(Self::Nyc),
            "yonkers" => Some(Self::Yonkers),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Residency {
    pub state_resident: bool,
    /// Local taxes only apply to state residents.
    pub local: Option<LocalJurisdiction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithholdingElections {
    pub federal: bool,
    pub state: bool,
    pub disability: bool,
    pub paid_family_leave: bool,
}

impl Default for WithholdingElections {
    fn default() -> Self {
        Self {
            federal: true,
            state: true,
            disability: true,
            paid_family_leave: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayType {
    Hourly { rate: Decimal },
    Salary { annual_salary: Decimal },
}

impl PayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly { .. } => "hourly",
            Self::Salary { .. } => "salary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeTaxProfile {
    pub filing_status: FilingStatus,
    pub allowances: u32,
    pub residency: Residency,
    pub withholding: WithholdingElections,
    pub pay: PayType,
}

/// Employer rates that vary by company rather than by tax year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompanyRates {
    /// State unemployment insurance rate. Missing means 0.
    pub sui_rate: Option<Decimal>,
    /// Federal unemployment rate. Missing means the tax year's default.
    pub futa_rate: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub profile: EmployeeTaxProfile,
    pub rates: CompanyRates,
}

/// For creating new employees (no id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEmployee {
    pub company_id: i64,
    pub name: String,
    pub profile: EmployeeTaxProfile,
    pub rates: CompanyRates,
}
