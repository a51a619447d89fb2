use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmountType {
    Fixed,
    /// Percent points of gross pay (`5` is 5%).
    Percentage,
}

impl AmountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Percentage => "percentage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fixed" => Some(Self::Fixed),
            "percentage" => Some(Self::Percentage),
            _ => None,
        }
    }
}

/// A recurring deduction as elected by an employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionDefinition {
    /// Grouping key, e.g. `"401k"` or `"health"`. YTD reversals match on it.
    pub deduction_type: String,
    pub name: String,
    pub amount_type: AmountType,
    pub amount: Decimal,
    pub pre_tax: bool,
    pub annual_limit: Option<Decimal>,
    pub ytd_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeDeduction {
    pub id: i64,
    pub employee_id: i64,
    pub is_active: bool,
    pub definition: DeductionDefinition,
}

/// For creating new deductions (no id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEmployeeDeduction {
    pub employee_id: i64,
    pub definition: DeductionDefinition,
}
