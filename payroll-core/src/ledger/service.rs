use chrono::NaiveDate;
use tracing::{error, info, warn};

use super::bridge::{
    EntryHeader, PayrollAccountCodes, PayrollEntryDraft, PayrollTotals, default_payroll_accounts,
    draft_payroll_entry,
};
use super::reports::{self, AccountBalance, BalanceSheet, GeneralLedger, ProfitAndLoss, TrialBalance};
use super::{LedgerError, validate_journal_entry};
use crate::calculations::PayrollResult;
use crate::db::PayrollRepository;
use crate::{Account, JournalEntry, NewJournalEntry, PayrollRecord};

/// Posting and reporting over a company's chart of accounts.
pub struct LedgerService<'a, R: PayrollRepository + ?Sized> {
    repo: &'a R,
    codes: PayrollAccountCodes,
}

impl<'a, R: PayrollRepository + ?Sized> LedgerService<'a, R> {
    pub fn new(repo: &'a R) -> Self {
        Self::with_codes(repo, PayrollAccountCodes::default())
    }

    pub fn with_codes(
        repo: &'a R,
        codes: PayrollAccountCodes,
    ) -> Self {
        Self { repo, codes }
    }

    pub fn codes(&self) -> &PayrollAccountCodes {
        &self.codes
    }

    /// Creates whichever default payroll accounts the company lacks.
    /// Returns the accounts that were created.
    pub async fn install_default_accounts(
        &self,
        company_id: i64,
    ) -> Result<Vec<Account>, LedgerError> {
        let existing = self.repo.list_accounts(company_id).await?;
        let mut created = Vec::new();
        for account in default_payroll_accounts(company_id) {
            if existing.iter().any(|a| a.code == account.code) {
                continue;
            }
            created.push(self.repo.create_account(account).await?);
        }
        if !created.is_empty() {
            info!(company_id, count = created.len(), "installed default payroll accounts");
        }
        Ok(created)
    }

    /// Validates and posts a journal entry.
    ///
    /// # Errors
    ///
    /// * [`LedgerError::Validation`] for a malformed or unbalanced entry.
    /// * [`LedgerError::InvalidAccount`] when a line targets an account
    ///   that is missing, inactive, or owned by another company.
    pub async fn create_journal_entry(
        &self,
        entry: NewJournalEntry,
    ) -> Result<JournalEntry, LedgerError> {
        validate_journal_entry(&entry.lines)?;
        let accounts = self.repo.list_accounts(entry.company_id).await?;
        check_accounts(&entry, &accounts)?;

        let created = self.repo.create_journal_entry(entry).await?;
        info!(
            company_id = created.company_id,
            entry_number = created.entry_number,
            source = created.source.as_str(),
            total = %created.total_debits(),
            "posted journal entry"
        );
        Ok(created)
    }

    /// Posts one entry for the active records among `record_ids` and links
    /// them to it.
    ///
    /// Returns `Ok(None)` when the chart of accounts lacks a required code
    /// or there is nothing to post; payroll stands without a ledger entry
    /// in that case.
    pub async fn create_payroll_journal_entries(
        &self,
        company_id: i64,
        record_ids: &[i64],
        pay_date: NaiveDate,
        period_label: &str,
    ) -> Result<Option<JournalEntry>, LedgerError> {
        let records = self.repo.get_payroll_records(record_ids).await?;
        let batch: Vec<&PayrollRecord> = records
            .iter()
            .filter(|r| r.is_active() && r.company_id == company_id)
            .collect();
        let totals = PayrollTotals::from_results(batch.iter().map(|r| &r.result));
        let header = EntryHeader {
            company_id,
            entry_date: pay_date,
            memo: format!("Payroll {period_label}"),
            reference: Some(format!("payroll:{period_label}")),
        };

        let Some(entry) = self.draft_entry(header, &totals, false).await? else {
            return Ok(None);
        };
        let created = self.create_journal_entry(entry).await?;
        let ids: Vec<i64> = batch.iter().map(|r| r.id).collect();
        self.repo.link_journal_entry(&ids, created.id).await?;
        Ok(Some(created))
    }

    /// Entry backing `record` out of the ledger, if it was ever posted.
    pub async fn draft_reversal(
        &self,
        record: &PayrollRecord,
        entry_date: NaiveDate,
        reason: &str,
    ) -> Result<Option<NewJournalEntry>, LedgerError> {
        if record.journal_entry_id.is_none() {
            return Ok(None);
        }
        let header = EntryHeader {
            company_id: record.company_id,
            entry_date,
            memo: format!("Reverse payroll record {}: {reason}", record.id),
            reference: Some(format!("payroll-record:{}", record.id)),
        };
        let totals = PayrollTotals::from_results([&record.result]);
        self.draft_entry(header, &totals, true).await
    }

    /// Entry posting a single record on its own, used for replacements.
    pub async fn draft_record_entry(
        &self,
        company_id: i64,
        original_record_id: i64,
        result: &PayrollResult,
        entry_date: NaiveDate,
    ) -> Result<Option<NewJournalEntry>, LedgerError> {
        let header = EntryHeader {
            company_id,
            entry_date,
            memo: format!("Corrected payroll for record {original_record_id}"),
            reference: Some(format!("payroll-record:{original_record_id}")),
        };
        let totals = PayrollTotals::from_results([result]);
        self.draft_entry(header, &totals, false).await
    }

    async fn draft_entry(
        &self,
        header: EntryHeader,
        totals: &PayrollTotals,
        reverse: bool,
    ) -> Result<Option<NewJournalEntry>, LedgerError> {
        let company_id = header.company_id;
        let accounts = self.repo.list_accounts(company_id).await?;

        match draft_payroll_entry(header, totals, &accounts, &self.codes, reverse) {
            Ok(PayrollEntryDraft::Ready(entry)) => {
                validate_journal_entry(&entry.lines)?;
                Ok(Some(entry))
            }
            Ok(PayrollEntryDraft::MissingAccounts(codes)) => {
                warn!(company_id, ?codes, "payroll accounts missing; skipping ledger posting");
                Ok(None)
            }
            Ok(PayrollEntryDraft::Empty) => Ok(None),
            Err(e) => {
                error!(company_id, error = %e, "payroll entry not posted");
                Err(e)
            }
        }
    }

    pub async fn account_balances(
        &self,
        company_id: i64,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<AccountBalance>, LedgerError> {
        let accounts = self.repo.list_accounts(company_id).await?;
        let entries = self.repo.list_journal_entries(company_id, start, end).await?;
        Ok(reports::account_balances(&accounts, &entries, start, end))
    }

    pub async fn trial_balance(
        &self,
        company_id: i64,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TrialBalance, LedgerError> {
        let accounts = self.repo.list_accounts(company_id).await?;
        let entries = self.repo.list_journal_entries(company_id, start, end).await?;
        Ok(reports::trial_balance(&accounts, &entries, start, end))
    }

    pub async fn profit_and_loss(
        &self,
        company_id: i64,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<ProfitAndLoss, LedgerError> {
        let accounts = self.repo.list_accounts(company_id).await?;
        let entries = self.repo.list_journal_entries(company_id, start, end).await?;
        Ok(reports::profit_and_loss(&accounts, &entries, start, end))
    }

    pub async fn balance_sheet(
        &self,
        company_id: i64,
        as_of: NaiveDate,
    ) -> Result<BalanceSheet, LedgerError> {
        let accounts = self.repo.list_accounts(company_id).await?;
        let entries = self
            .repo
            .list_journal_entries(company_id, None, Some(as_of))
            .await?;
        Ok(reports::balance_sheet(&accounts, &entries, as_of))
    }

    pub async fn general_ledger(
        &self,
        company_id: i64,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        account_id: Option<i64>,
    ) -> Result<GeneralLedger, LedgerError> {
        let accounts = self.repo.list_accounts(company_id).await?;
        // Opening balances need everything before `start` as well.
        let entries = self.repo.list_journal_entries(company_id, None, end).await?;
        Ok(reports::general_ledger(&accounts, &entries, start, end, account_id))
    }
}

fn check_accounts(
    entry: &NewJournalEntry,
    accounts: &[Account],
) -> Result<(), LedgerError> {
    for line in &entry.lines {
        let account = accounts
            .iter()
            .find(|a| a.id == line.account_id && a.company_id == entry.company_id)
            .ok_or_else(|| LedgerError::InvalidAccount {
                account_id: line.account_id,
                reason: format!("not in the chart of company {}", entry.company_id),
            })?;
        if !account.is_active {
            return Err(LedgerError::InvalidAccount {
                account_id: account.id,
                reason: "account is inactive".to_string(),
            });
        }
    }
    Ok(())
}
