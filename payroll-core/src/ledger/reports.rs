//! Financial reports rebuilt from posted journal entries.
//!
//! Nothing here reads a stored balance: every figure is summed from entry
//! lines, read on the account type's normal side.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calculations::common::CENT;
use crate::{Account, AccountType, JournalEntry, NormalBalance};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account_id: i64,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub debit_total: Decimal,
    pub credit_total: Decimal,
    /// Positive on the account's normal side.
    pub balance: Decimal,
}

impl AccountBalance {
    pub fn has_activity(&self) -> bool {
        !self.debit_total.is_zero() || !self.credit_total.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceRow {
    pub account_id: i64,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub debit: Decimal,
    pub credit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub rows: Vec<TrialBalanceRow>,
    pub total_debits: Decimal,
    pub total_credits: Decimal,
    pub is_balanced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitAndLoss {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub revenue: Vec<AccountBalance>,
    pub expenses: Vec<AccountBalance>,
    pub total_revenue: Decimal,
    pub total_expenses: Decimal,
    pub net_income: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub as_of: NaiveDate,
    pub assets: Vec<AccountBalance>,
    pub liabilities: Vec<AccountBalance>,
    pub equity: Vec<AccountBalance>,
    pub total_assets: Decimal,
    pub total_liabilities: Decimal,
    pub total_equity: Decimal,
    /// Revenue minus expenses over all history up to `as_of`.
    pub retained_earnings: Decimal,
    pub is_balanced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralLedgerLine {
    pub entry_id: i64,
    pub entry_number: i64,
    pub entry_date: NaiveDate,
    pub memo: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub running_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralLedgerAccount {
    pub account_id: i64,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    /// Balance of everything posted before the range start.
    pub opening_balance: Decimal,
    pub lines: Vec<GeneralLedgerLine>,
    pub closing_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralLedger {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub accounts: Vec<GeneralLedgerAccount>,
}

fn in_range(
    date: NaiveDate,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> bool {
    start.is_none_or(|s| date >= s) && end.is_none_or(|e| date <= e)
}

/// Debit/credit totals per account over entries dated within the range.
fn line_totals(
    entries: &[JournalEntry],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> HashMap<i64, (Decimal, Decimal)> {
    let mut totals: HashMap<i64, (Decimal, Decimal)> = HashMap::new();
    for entry in entries.iter().filter(|e| in_range(e.entry_date, start, end)) {
        for line in &entry.lines {
            let t = totals.entry(line.account_id).or_default();
            t.0 += line.debit;
            t.1 += line.credit;
        }
    }
    totals
}

/// Balance of every active account over the range, ordered by code.
pub fn account_balances(
    accounts: &[Account],
    entries: &[JournalEntry],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Vec<AccountBalance> {
    let totals = line_totals(entries, start, end);
    let mut balances: Vec<AccountBalance> = accounts
        .iter()
        .filter(|a| a.is_active)
        .map(|a| {
            let (debit_total, credit_total) = totals.get(&a.id).copied().unwrap_or_default();
            AccountBalance {
                account_id: a.id,
                code: a.code.clone(),
                name: a.name.clone(),
                account_type: a.account_type,
                debit_total,
                credit_total,
                balance: a.account_type.signed_balance(debit_total, credit_total),
            }
        })
        .collect();
    balances.sort_by(|a, b| a.code.cmp(&b.code));
    balances
}

/// Accounts with activity, each balance placed in the debit or credit column.
///
/// A debit-normal account with a negative balance lands in the credit
/// column, and a credit-normal one with a negative balance in the debit
/// column.
pub fn trial_balance(
    accounts: &[Account],
    entries: &[JournalEntry],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> TrialBalance {
    let mut rows = Vec::new();
    let mut total_debits = Decimal::ZERO;
    let mut total_credits = Decimal::ZERO;

    for balance in account_balances(accounts, entries, start, end)
        .into_iter()
        .filter(AccountBalance::has_activity)
    {
        let on_normal_side = balance.balance >= Decimal::ZERO;
        let amount = balance.balance.abs();
        let is_debit = match balance.account_type.normal_balance() {
            NormalBalance::Debit => on_normal_side,
            NormalBalance::Credit => !on_normal_side,
        };
        let (debit, credit) = if is_debit {
            (amount, Decimal::ZERO)
        } else {
            (Decimal::ZERO, amount)
        };
        total_debits += debit;
        total_credits += credit;
        rows.push(TrialBalanceRow {
            account_id: balance.account_id,
            code: balance.code,
            name: balance.name,
            account_type: balance.account_type,
            debit,
            credit,
        });
    }

    TrialBalance {
        start,
        end,
        rows,
        total_debits,
        total_credits,
        is_balanced: (total_debits - total_credits).abs() < CENT,
    }
}

fn of_type(
    balances: &[AccountBalance],
    account_type: AccountType,
) -> Vec<AccountBalance> {
    balances
        .iter()
        .filter(|b| b.account_type == account_type)
        .cloned()
        .collect()
}

fn sum(balances: &[AccountBalance]) -> Decimal {
    balances.iter().map(|b| b.balance).sum()
}

pub fn profit_and_loss(
    accounts: &[Account],
    entries: &[JournalEntry],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> ProfitAndLoss {
    let balances = account_balances(accounts, entries, start, end);
    let revenue = of_type(&balances, AccountType::Revenue);
    let expenses = of_type(&balances, AccountType::Expense);
    let total_revenue = sum(&revenue);
    let total_expenses = sum(&expenses);

    ProfitAndLoss {
        start,
        end,
        revenue,
        expenses,
        total_revenue,
        total_expenses,
        net_income: total_revenue - total_expenses,
    }
}

/// Position as of `as_of`, over all history up to and including that date.
pub fn balance_sheet(
    accounts: &[Account],
    entries: &[JournalEntry],
    as_of: NaiveDate,
) -> BalanceSheet {
    let balances = account_balances(accounts, entries, None, Some(as_of));
    let assets = of_type(&balances, AccountType::Asset);
    let liabilities = of_type(&balances, AccountType::Liability);
    let equity = of_type(&balances, AccountType::Equity);
    let total_assets = sum(&assets);
    let total_liabilities = sum(&liabilities);
    let total_equity = sum(&equity);
    let retained_earnings = sum(&of_type(&balances, AccountType::Revenue))
        - sum(&of_type(&balances, AccountType::Expense));

    BalanceSheet {
        as_of,
        is_balanced: (total_assets - (total_liabilities + total_equity + retained_earnings)).abs()
            < CENT,
        assets,
        liabilities,
        equity,
        total_assets,
        total_liabilities,
        total_equity,
        retained_earnings,
    }
}

/// Chronological postings per account with a running balance.
///
/// Accounts with no postings in the range and a zero opening balance are
/// omitted. `account_id` narrows the report to a single account.
pub fn general_ledger(
    accounts: &[Account],
    entries: &[JournalEntry],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    account_id: Option<i64>,
) -> GeneralLedger {
    let mut ordered: Vec<&JournalEntry> = entries.iter().collect();
    ordered.sort_by_key(|e| (e.entry_date, e.entry_number));

    let opening_totals = match start {
        Some(s) => line_totals(entries, None, s.pred_opt()),
        None => HashMap::new(),
    };

    let mut selected: Vec<&Account> = accounts
        .iter()
        .filter(|a| account_id.is_none_or(|id| a.id == id))
        .collect();
    selected.sort_by(|a, b| a.code.cmp(&b.code));

    let mut sections = Vec::new();
    for account in selected {
        let (opening_debits, opening_credits) = opening_totals
            .get(&account.id)
            .copied()
            .unwrap_or_default();
        let opening_balance = account
            .account_type
            .signed_balance(opening_debits, opening_credits);

        let mut running_balance = opening_balance;
        let mut lines = Vec::new();
        for entry in ordered
            .iter()
            .filter(|e| in_range(e.entry_date, start, end))
        {
            for line in entry.lines.iter().filter(|l| l.account_id == account.id) {
                running_balance += account.account_type.signed_balance(line.debit, line.credit);
                lines.push(GeneralLedgerLine {
                    entry_id: entry.id,
                    entry_number: entry.entry_number,
                    entry_date: entry.entry_date,
                    memo: entry.memo.clone(),
                    debit: line.debit,
                    credit: line.credit,
                    running_balance,
                });
            }
        }

        if lines.is_empty() && opening_balance.is_zero() {
            continue;
        }
        sections.push(GeneralLedgerAccount {
            account_id: account.id,
            code: account.code.clone(),
            name: account.name.clone(),
            account_type: account.account_type,
            opening_balance,
            lines,
            closing_balance: running_balance,
        });
    }

    GeneralLedger {
        start,
        end,
        accounts: sections,
    }
}
