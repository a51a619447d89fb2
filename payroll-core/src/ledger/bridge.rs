//! Turns payroll results into journal entries.
//!
//! A whole pay-period batch becomes one entry:
//!
//! | Side   | Account                         | Amount |
//! |--------|---------------------------------|--------|
//! | Debit  | Wages expense                   | gross pay |
//! | Debit  | Employer payroll tax expense    | employer contributions |
//! | Credit | Federal withholding payable     | federal income tax |
//! | Credit | State/local withholding payable | state + local tax |
//! | Credit | Social Security payable         | employee + employer |
//! | Credit | Medicare payable                | employee + additional + employer |
//! | Credit | FUTA / SUI / SDI / PFL payable  | each component |
//! | Credit | Deductions payable              | pre-tax + post-tax deductions |
//! | Credit | Net pay payable                 | net pay |
//!
//! Zero lines are left out. A rounding difference of up to two cents is
//! absorbed into the net pay line; anything larger is an error.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::LedgerError;
use crate::calculations::PayrollResult;
use crate::{
    Account, AccountType, EntrySource, NewAccount, NewJournalEntry, NewJournalEntryLine,
};

/// Largest imbalance the bridge will absorb into the net pay line.
pub const ROUNDING_TOLERANCE: Decimal = Decimal::from_parts(2, 0, 0, false, 2);

/// Chart-of-accounts codes the bridge posts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollAccountCodes {
    pub wages_expense: String,
    pub employer_tax_expense: String,
    pub federal_withholding: String,
    pub state_withholding: String,
    pub social_security: String,
    pub medicare: String,
    pub futa: String,
    pub sui: String,
    pub sdi: String,
    pub pfl: String,
    pub deductions: String,
    pub net_pay: String,
}

impl Default for PayrollAccountCodes {
    fn default() -> Self {
        Self {
            wages_expense: "5000".to_string(),
            employer_tax_expense: "5100".to_string(),
            federal_withholding: "2100".to_string(),
            state_withholding: "2110".to_string(),
            social_security: "2120".to_string(),
            medicare: "2130".to_string(),
            futa: "2140".to_string(),
            sui: "2150".to_string(),
            sdi: "2160".to_string(),
            pfl: "2170".to_string(),
            deductions: "2180".to_string(),
            net_pay: "2200".to_string(),
        }
    }
}

/// The accounts [`PayrollAccountCodes::default`] expects, ready to create.
pub fn default_payroll_accounts(company_id: i64) -> Vec<NewAccount> {
    let codes = PayrollAccountCodes::default();
    let account = |code: &str, name: &str, account_type: AccountType, subtype: &str| NewAccount {
        company_id,
        code: code.to_string(),
        name: name.to_string(),
        account_type,
        subtype: Some(subtype.to_string()),
    };

    vec![
        account(&codes.wages_expense, "Wages Expense", AccountType::Expense, "payroll"),
        account(
            &codes.employer_tax_expense,
            "Employer Payroll Tax Expense",
            AccountType::Expense,
            "payroll",
        ),
        account(
            &codes.federal_withholding,
            "Federal Income Tax Withheld",
            AccountType::Liability,
            "payroll_tax",
        ),
        account(
            &codes.state_withholding,
            "State and Local Income Tax Withheld",
            AccountType::Liability,
            "payroll_tax",
        ),
        account(
            &codes.social_security,
            "Social Security Payable",
            AccountType::Liability,
            "payroll_tax",
        ),
        account(&codes.medicare, "Medicare Payable", AccountType::Liability, "payroll_tax"),
        account(&codes.futa, "FUTA Payable", AccountType::Liability, "payroll_tax"),
        account(&codes.sui, "SUI Payable", AccountType::Liability, "payroll_tax"),
        account(&codes.sdi, "SDI Payable", AccountType::Liability, "payroll_tax"),
        account(&codes.pfl, "PFL Payable", AccountType::Liability, "payroll_tax"),
        account(
            &codes.deductions,
            "Employee Deductions Payable",
            AccountType::Liability,
            "payroll",
        ),
        account(&codes.net_pay, "Net Wages Payable", AccountType::Liability, "payroll"),
    ]
}

/// Ledger-relevant sums over a batch of payroll results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PayrollTotals {
    pub gross_pay: Decimal,
    pub employer_taxes: Decimal,
    pub federal_withholding: Decimal,
    pub state_and_local_withholding: Decimal,
    pub social_security: Decimal,
    pub medicare: Decimal,
    pub futa: Decimal,
    pub sui: Decimal,
    pub sdi: Decimal,
    pub pfl: Decimal,
    pub deductions: Decimal,
    pub net_pay: Decimal,
}

impl PayrollTotals {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a PayrollResult>) -> Self {
        results.into_iter().fold(Self::default(), |mut t, r| {
            t.gross_pay += r.gross_pay;
            t.employer_taxes += r.total_employer_cost;
            t.federal_withholding += r.taxes.federal_income_tax;
            t.state_and_local_withholding += r.taxes.state_income_tax + r.taxes.local_tax;
            t.social_security += r.taxes.social_security + r.employer.social_security;
            t.medicare += r.taxes.medicare + r.taxes.additional_medicare + r.employer.medicare;
            t.futa += r.employer.futa;
            t.sui += r.employer.sui;
            t.sdi += r.taxes.sdi;
            t.pfl += r.taxes.pfl;
            t.deductions += r.total_pre_tax_deductions + r.total_post_tax_deductions;
            t.net_pay += r.net_pay;
            t
        })
    }

    fn is_empty(&self) -> bool {
        self.gross_pay.is_zero() && self.employer_taxes.is_zero()
    }
}

/// Result of drafting a payroll entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayrollEntryDraft {
    Ready(NewJournalEntry),
    /// Codes that a non-zero line needed but the chart does not have.
    MissingAccounts(Vec<String>),
    /// Nothing to post.
    Empty,
}

/// Header fields for a drafted entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    pub company_id: i64,
    pub entry_date: NaiveDate,
    pub memo: String,
    pub reference: Option<String>,
}

/// Builds the balanced payroll entry for `totals`.
///
/// With `reverse` set, every debit becomes a credit and vice versa, which
/// backs the batch out of the ledger.
///
/// # Errors
///
/// [`LedgerError::Unbalanced`] when the lines miss balance by more than
/// [`ROUNDING_TOLERANCE`].
pub fn draft_payroll_entry(
    header: EntryHeader,
    totals: &PayrollTotals,
    accounts: &[Account],
    codes: &PayrollAccountCodes,
    reverse: bool,
) -> Result<PayrollEntryDraft, LedgerError> {
    if totals.is_empty() {
        return Ok(PayrollEntryDraft::Empty);
    }

    let debits = [
        (&codes.wages_expense, totals.gross_pay),
        (&codes.employer_tax_expense, totals.employer_taxes),
    ];
    let credits = [
        (&codes.federal_withholding, totals.federal_withholding),
        (&codes.state_withholding, totals.state_and_local_withholding),
        (&codes.social_security, totals.social_security),
        (&codes.medicare, totals.medicare),
        (&codes.futa, totals.futa),
        (&codes.sui, totals.sui),
        (&codes.sdi, totals.sdi),
        (&codes.pfl, totals.pfl),
        (&codes.deductions, totals.deductions),
    ];

    let mut missing = Vec::new();
    let mut resolve = |code: &String| -> Option<i64> {
        let found = accounts
            .iter()
            .find(|a| a.is_active && a.company_id == header.company_id && &a.code == code)
            .map(|a| a.id);
        if found.is_none() && !missing.contains(code) {
            missing.push(code.clone());
        }
        found
    };

    let mut debit_lines = Vec::new();
    for (code, amount) in debits.into_iter().filter(|(_, a)| !a.is_zero()) {
        if let Some(account_id) = resolve(code) {
            debit_lines.push((account_id, amount));
        }
    }
    let mut credit_lines = Vec::new();
    for (code, amount) in credits.into_iter().filter(|(_, a)| !a.is_zero()) {
        if let Some(account_id) = resolve(code) {
            credit_lines.push((account_id, amount));
        }
    }
    let net_pay_account = resolve(&codes.net_pay);

    let Some(net_pay_account) = net_pay_account.filter(|_| missing.is_empty()) else {
        return Ok(PayrollEntryDraft::MissingAccounts(missing));
    };

    let total_debits: Decimal = debit_lines.iter().map(|(_, a)| *a).sum();
    let other_credits: Decimal = credit_lines.iter().map(|(_, a)| *a).sum();
    let difference = total_debits - (other_credits + totals.net_pay);
    if difference.abs() > ROUNDING_TOLERANCE {
        return Err(LedgerError::Unbalanced {
            total_debits,
            total_credits: other_credits + totals.net_pay,
            difference,
        });
    }
    let net_pay = totals.net_pay + difference;
    if !net_pay.is_zero() {
        credit_lines.push((net_pay_account, net_pay));
    }

    let side = |account_id: i64, amount: Decimal, is_debit: bool| {
        if is_debit != reverse {
            NewJournalEntryLine::debit(account_id, amount)
        } else {
            NewJournalEntryLine::credit(account_id, amount)
        }
    };
    let lines = debit_lines
        .into_iter()
        .map(|(id, amount)| side(id, amount, true))
        .chain(credit_lines.into_iter().map(|(id, amount)| side(id, amount, false)))
        .collect();

    Ok(PayrollEntryDraft::Ready(NewJournalEntry {
        company_id: header.company_id,
        entry_date: header.entry_date,
        memo: header.memo,
        reference: header.reference,
        source: if reverse {
            EntrySource::PayrollReversal
        } else {
            EntrySource::Payroll
        },
        lines,
    }))
}
