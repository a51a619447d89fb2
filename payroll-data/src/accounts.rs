use std::collections::HashSet;
use std::io::Read;

use payroll_core::{AccountType, NewAccount, PayrollRepository, RepositoryError};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum AccountLoaderError {
    #[error("CSV parse error: {0}")]
    CsvParse(String),

    #[error("Unknown account type '{account_type}' for account {code}")]
    InvalidAccountType { code: String, account_type: String },

    #[error("Account code {0} appears more than once")]
    DuplicateCode(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<csv::Error> for AccountLoaderError {
    fn from(err: csv::Error) -> Self {
        AccountLoaderError::CsvParse(err.to_string())
    }
}

/// One row of a chart-of-accounts CSV: `code, name, account_type, subtype`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AccountRecord {
    pub code: String,
    pub name: String,
    pub account_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
}

impl AccountRecord {
    pub fn to_account(
        &self,
        company_id: i64,
    ) -> Result<NewAccount, AccountLoaderError> {
        let account_type = AccountType::parse(self.account_type.trim().to_lowercase().as_str())
            .ok_or_else(|| AccountLoaderError::InvalidAccountType {
                code: self.code.clone(),
                account_type: self.account_type.clone(),
            })?;
        Ok(NewAccount {
            company_id,
            code: self.code.trim().to_string(),
            name: self.name.trim().to_string(),
            account_type,
            subtype: self
                .subtype
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }
}

/// Loads a company's chart of accounts from CSV.
pub struct AccountLoader;

impl AccountLoader {
    pub fn parse<R: Read>(reader: R) -> Result<Vec<AccountRecord>, AccountLoaderError> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut records = Vec::new();

        for result in csv_reader.deserialize() {
            let record: AccountRecord = result?;
            records.push(record);
        }

        Ok(records)
    }

    /// Create the accounts the company does not have yet. Codes that already
    /// exist are left untouched, so reloading a file is harmless. Returns
    /// the number of accounts created.
    pub async fn load<R: PayrollRepository + ?Sized>(
        repo: &R,
        company_id: i64,
        records: &[AccountRecord],
    ) -> Result<usize, AccountLoaderError> {
        let mut seen = HashSet::new();
        let mut accounts = Vec::with_capacity(records.len());
        for record in records {
            let account = record.to_account(company_id)?;
            if !seen.insert(account.code.clone()) {
                return Err(AccountLoaderError::DuplicateCode(account.code));
            }
            accounts.push(account);
        }

        let existing: HashSet<String> = repo
            .list_accounts(company_id)
            .await?
            .into_iter()
            .map(|a| a.code)
            .collect();

        let mut created = 0;
        for account in accounts {
            if existing.contains(&account.code) {
                debug!(code = %account.code, "account already exists");
                continue;
            }
            repo.create_account(account).await?;
            created += 1;
        }

        info!(company_id, created, "loaded chart of accounts");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use payroll_core::db::MemoryRepository;
    use pretty_assertions::assert_eq;

    use super::*;

    const CHART: &str = "code,name,account_type,subtype
1000,Cash,asset,bank
2100,Federal Withholding Payable,Liability,
3000,Owner Equity,equity,
6000,Wages Expense,expense,payroll
";

    #[test]
    fn parses_rows_and_normalizes_type() {
        let records = AccountLoader::parse(CHART.as_bytes()).unwrap();

        let account = records[1].to_account(4).unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(account.account_type, AccountType::Liability);
        assert_eq!(account.subtype, None);
        assert_eq!(account.company_id, 4);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let records = AccountLoader::parse("code,name,account_type,subtype\n9000,Misc,other,".as_bytes())
            .unwrap();

        assert!(matches!(
            records[0].to_account(1),
            Err(AccountLoaderError::InvalidAccountType { code, .. }) if code == "9000"
        ));
    }

    #[tokio::test]
    async fn load_skips_existing_codes() {
        let repo = MemoryRepository::new();
        let records = AccountLoader::parse(CHART.as_bytes()).unwrap();

        let first = AccountLoader::load(&repo, 1, &records).await.unwrap();
        let second = AccountLoader::load(&repo, 1, &records).await.unwrap();

        assert_eq!((first, second), (4, 0));
        let codes: Vec<_> = repo
            .list_accounts(1)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.code)
            .collect();
        assert_eq!(codes, vec!["1000", "2100", "3000", "6000"]);
    }

    #[tokio::test]
    async fn duplicate_codes_in_file_write_nothing() {
        let repo = MemoryRepository::new();
        let records = AccountLoader::parse(
            "code,name,account_type,subtype\n1000,Cash,asset,\n1000,Petty Cash,asset,".as_bytes(),
        )
        .unwrap();

        let err = AccountLoader::load(&repo, 1, &records).await.unwrap_err();

        assert!(matches!(err, AccountLoaderError::DuplicateCode(code) if code == "1000"));
        assert!(repo.list_accounts(1).await.unwrap().is_empty());
    }
}
