use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Running totals for one employee within one calendar year, up to but not
/// including the period being calculated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct YtdAccumulators {
    pub gross_pay: Decimal,
    pub social_security: Decimal,
    pub medicare: Decimal,
    pub sdi: Decimal,
    pub pfl: Decimal,
}
