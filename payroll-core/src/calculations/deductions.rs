//! Recurring deduction processing.
//!
//! Pre-tax deductions are resolved before any withholding is computed so
//! that they can reduce taxable wages; post-tax deductions come out of what
//! is left. Each deduction is clipped to the headroom under its annual limit.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calculations::common::{remaining, round_half_up};
use crate::{AmountType, DeductionDefinition, EmployeeDeduction};

/// One deduction actually taken in a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionLine {
    /// The employee deduction the amount was taken for. Forward YTD
    /// updates go to this deduction alone.
    #[serde(default)]
    pub deduction_id: Option<i64>,
    pub deduction_type: String,
    pub name: String,
    pub amount: Decimal,
    pub pre_tax: bool,
}

/// Lines and total for one side (pre-tax or post-tax).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeductionSet {
    pub lines: Vec<DeductionLine>,
    pub total: Decimal,
}

/// Amount `definition` takes from `gross_pay` this period, after the annual
/// limit and rounded to the cent.
pub fn deduction_amount(
    definition: &DeductionDefinition,
    gross_pay: Decimal,
) -> Decimal {
    let raw = match definition.amount_type {
        AmountType::Fixed => definition.amount,
        AmountType::Percentage => gross_pay * definition.amount / Decimal::ONE_HUNDRED,
    };
    let raw = round_half_up(raw);

    match definition.annual_limit {
        Some(limit) => raw.min(remaining(limit, definition.ytd_amount)),
        None => raw,
    }
}

/// Applies every deduction on the `pre_tax` side, in order.
///
/// A line is emitted only when the clipped amount is positive.
pub fn process_deductions(
    deductions: &[EmployeeDeduction],
    gross_pay: Decimal,
    pre_tax: bool,
) -> DeductionSet {
    let mut set = DeductionSet::default();

    for deduction in deductions.iter().filter(|d| d.definition.pre_tax == pre_tax) {
        let definition = &deduction.definition;
        let amount = deduction_amount(definition, gross_pay);
        if amount <= Decimal::ZERO {
            continue;
        }
        set.total += amount;
        set.lines.push(DeductionLine {
            deduction_id: Some(deduction.id),
            deduction_type: definition.deduction_type.clone(),
            name: definition.name.clone(),
            amount,
            pre_tax,
        });
    }

    set
}
