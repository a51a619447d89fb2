use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use payroll_core::db::{DbConfig, RepositoryRegistry};
use payroll_core::ledger::{AccountBalance, LedgerService};
use payroll_data::logging::init_logging;
use payroll_data::{AccountLoader, BracketLoader};
use payroll_db_sqlite::SqliteRepositoryFactory;
use tracing::info;

/// Load payroll reference data and print ledger reports.
///
/// The database is migrated and seeded on open, so a fresh file is ready
/// for use immediately.
#[derive(Parser, Debug)]
#[command(name = "payroll-data-loader")]
#[command(version, about, long_about = None)]
struct Args {
    /// Storage backend (`sqlite` or `memory`)
    #[arg(short, long, default_value = "sqlite")]
    backend: String,

    /// Database path, `sqlite:` URL or `:memory:`
    #[arg(short, long, default_value = "payroll.db")]
    database: String,

    /// Also append log output to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace bracket schedules with the ones in a CSV file
    /// (tax_year, jurisdiction, filing_status, min_income, max_income, base_tax, rate)
    Brackets {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Add accounts to a company's chart; without --file, installs the
    /// default payroll accounts
    Accounts {
        #[arg(short, long)]
        company: i64,
        /// CSV with columns code, name, account_type, subtype
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Print debit and credit totals per account
    TrialBalance {
        #[arg(short, long)]
        company: i64,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Print assets, liabilities and equity as of a date
    BalanceSheet {
        #[arg(short, long)]
        company: i64,
        #[arg(long)]
        as_of: NaiveDate,
    },
}

fn print_section(
    title: &str,
    balances: &[AccountBalance],
) {
    println!("{title}");
    for b in balances.iter().filter(|b| !b.balance.is_zero()) {
        println!("  {:<8} {:<36} {:>14}", b.code, b.name, b.balance);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;

    let mut registry = RepositoryRegistry::with_builtin();
    registry.register(Box::new(SqliteRepositoryFactory));
    let config = DbConfig {
        backend: args.backend.clone(),
        connection_string: args.database.clone(),
    };
    let repo = registry
        .create(&config)
        .await
        .with_context(|| format!("Failed to open {} database: {}", args.backend, args.database))?;

    match args.command {
        Command::Brackets { file } => {
            let reader = File::open(&file)
                .with_context(|| format!("Failed to open: {}", file.display()))?;
            let records = BracketLoader::parse(reader)
                .with_context(|| format!("Failed to parse CSV: {}", file.display()))?;
            info!(rows = records.len(), file = %file.display(), "parsed bracket CSV");

            let inserted = BracketLoader::load(repo.as_ref(), &records)
                .await
                .context("Failed to load tax brackets")?;
            println!("Loaded {inserted} tax brackets.");
        }
        Command::Accounts { company, file } => {
            let created = match file {
                Some(file) => {
                    let reader = File::open(&file)
                        .with_context(|| format!("Failed to open: {}", file.display()))?;
                    let records = AccountLoader::parse(reader)
                        .with_context(|| format!("Failed to parse CSV: {}", file.display()))?;
                    AccountLoader::load(repo.as_ref(), company, &records)
                        .await
                        .context("Failed to load accounts")?
                }
                None => LedgerService::new(repo.as_ref())
                    .install_default_accounts(company)
                    .await
                    .context("Failed to install default payroll accounts")?
                    .len(),
            };
            println!("Created {created} accounts for company {company}.");
        }
        Command::TrialBalance {
            company,
            start,
            end,
        } => {
            let trial = LedgerService::new(repo.as_ref())
                .trial_balance(company, start, end)
                .await?;
            println!("{:<8} {:<36} {:>14} {:>14}", "Code", "Account", "Debit", "Credit");
            for row in &trial.rows {
                println!(
                    "{:<8} {:<36} {:>14} {:>14}",
                    row.code, row.name, row.debit, row.credit
                );
            }
            println!(
                "{:<45} {:>14} {:>14}",
                "Total", trial.total_debits, trial.total_credits
            );
            if !trial.is_balanced {
                println!("WARNING: trial balance is out of balance");
            }
        }
        Command::BalanceSheet { company, as_of } => {
            let sheet = LedgerService::new(repo.as_ref())
                .balance_sheet(company, as_of)
                .await?;
            println!("Balance sheet as of {}", sheet.as_of);
            print_section("Assets", &sheet.assets);
            println!("  {:<45} {:>14}", "Total assets", sheet.total_assets);
            print_section("Liabilities", &sheet.liabilities);
            println!("  {:<45} {:>14}", "Total liabilities", sheet.total_liabilities);
            print_section("Equity", &sheet.equity);
            println!("  {:<45} {:>14}", "Total equity", sheet.total_equity);
            println!("  {:<45} {:>14}", "Retained earnings", sheet.retained_earnings);
            if !sheet.is_balanced {
                println!("WARNING: assets do not equal liabilities plus equity");
            }
        }
    }

    Ok(())
}
