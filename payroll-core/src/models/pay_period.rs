use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("pay period starts {start} after it ends {end}")]
pub struct InvalidPayPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub pay_date: NaiveDate,
}

impl PayPeriod {
    pub fn new(
        start: NaiveDate,
        end: NaiveDate,
        pay_date: NaiveDate,
    ) -> Result<Self, InvalidPayPeriod> {
        if start > end {
            return Err(InvalidPayPeriod { start, end });
        }
        Ok(Self {
            start,
            end,
            pay_date,
        })
    }

    /// Calendar year whose wage bases and tables apply.
    pub fn tax_year(&self) -> i32 {
        self.pay_date.year()
    }

    pub fn label(&self) -> String {
        format!("{} to {}", self.start, self.end)
    }
}
