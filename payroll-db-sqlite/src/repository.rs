use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use payroll_core::calculations::PayrollResult;
use payroll_core::records::{CorrectionPlan, VoidPlan, YtdAdjustment, apply_ytd_adjustment};
use payroll_core::{
    Account, AccountType, AmountType, CompanyRates, DeductionDefinition, Employee,
    EmployeeDeduction, EmployeeTaxProfile, EntrySource, FilingStatus, JournalEntry,
    JournalEntryLine, Jurisdiction, LocalJurisdiction, NewAccount, NewEmployee,
    NewEmployeeDeduction, NewJournalEntry, NewPayrollRecord, PayPeriod, PayType,
    PayrollRecord, PayrollRepository, PayrollStatus, RepositoryError, Residency, StatusChange,
    TaxBracket, TaxYearConfig, WithholdingElections,
};
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::decimal::{decimal_to_text, get_decimal, get_optional_decimal};

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Connect to `database_url`.
    ///
    /// Accepts a sqlx URL (`sqlite:...`), a bare file path (created if
    /// missing) or `:memory:`. An in-memory database is held on a single
    /// connection that is never recycled, since each connection would
    /// otherwise see its own empty database.
    pub async fn new(database_url: &str) -> Result<Self> {
        let (url, in_memory) = match database_url {
            ":memory:" | "sqlite::memory:" => ("sqlite::memory:".to_string(), true),
            url if url.starts_with("sqlite:") => (url.to_string(), false),
            path => (format!("sqlite://{path}?mode=rwc"), false),
        };

        let options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
        };
        let pool = options
            .connect(&url)
            .await
            .with_context(|| format!("Failed to connect to database: {}", database_url))?;
        debug!(url = %url, "connected to sqlite");
        Ok(Self { pool })
    }

    pub async fn new_with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Load and execute all SQL seed files from the specified directory.
    /// Files are executed in alphabetical order by filename.
    pub async fn run_seeds(
        &self,
        seeds_dir: &Path,
    ) -> Result<()> {
        let mut entries: Vec<_> = std::fs::read_dir(seeds_dir)
            .with_context(|| format!("Failed to read seeds directory '{}'", seeds_dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "sql"))
            .collect();

        entries.sort_by_key(|entry| entry.file_name());

        for entry in &entries {
            let path = entry.path();
            let sql = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read seed file '{}'", path.display()))?;

            sqlx::raw_sql(&sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to execute seed file '{}'", path.display()))?;
        }

        info!(seeds_dir = %seeds_dir.display(), count = entries.len(), "applied seed files");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn db_err(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Database(e.to_string())
}

/// Unique-constraint violations become [`RepositoryError::Conflict`].
fn write_err(e: sqlx::Error) -> RepositoryError {
    let conflict = e
        .as_database_error()
        .filter(|db| db.is_unique_violation())
        .map(|db| db.message().to_string());
    match conflict {
        Some(message) => RepositoryError::Conflict(message),
        None => db_err(e),
    }
}

fn get<'r, T>(
    row: &'r SqliteRow,
    column: &str,
) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| RepositoryError::Database(format!("Failed to get {}: {}", column, e)))
}

fn get_u32(
    row: &SqliteRow,
    column: &str,
) -> Result<u32, RepositoryError> {
    let value: i64 = get(row, column)?;
    u32::try_from(value)
        .map_err(|_| RepositoryError::Database(format!("{} out of range: {}", column, value)))
}

fn parse_code<T>(
    value: String,
    column: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, RepositoryError> {
    parse(&value)
        .ok_or_else(|| RepositoryError::Database(format!("Unknown {} '{}'", column, value)))
}

fn optional_text(d: Option<rust_decimal::Decimal>) -> Option<String> {
    d.map(decimal_to_text)
}

// ── row mapping ──────────────────────────────────────────────────────────

fn row_to_config(row: &SqliteRow) -> Result<TaxYearConfig, RepositoryError> {
    Ok(TaxYearConfig {
        tax_year: get(row, "tax_year")?,
        periods_per_year: get_u32(row, "periods_per_year")?,
        standard_weekly_hours: get_decimal(row, "standard_weekly_hours")?,
        overtime_multiplier: get_decimal(row, "overtime_multiplier")?,
        social_security_rate: get_decimal(row, "social_security_rate")?,
        social_security_wage_base: get_decimal(row, "social_security_wage_base")?,
        medicare_rate: get_decimal(row, "medicare_rate")?,
        additional_medicare_rate: get_decimal(row, "additional_medicare_rate")?,
        additional_medicare_threshold: get_decimal(row, "additional_medicare_threshold")?,
        futa_default_rate: get_decimal(row, "futa_default_rate")?,
        futa_wage_base: get_decimal(row, "futa_wage_base")?,
        sui_wage_base: get_decimal(row, "sui_wage_base")?,
        sdi_rate: get_decimal(row, "sdi_rate")?,
        sdi_weekly_max: get_decimal(row, "sdi_weekly_max")?,
        sdi_annual_max: get_decimal(row, "sdi_annual_max")?,
        pfl_rate: get_decimal(row, "pfl_rate")?,
        pfl_annual_max: get_decimal(row, "pfl_annual_max")?,
        nyc_rate: get_decimal(row, "nyc_rate")?,
        yonkers_surcharge_rate: get_decimal(row, "yonkers_surcharge_rate")?,
        federal_allowance_amount: get_decimal(row, "federal_allowance_amount")?,
        state_allowance_amount: get_decimal(row, "state_allowance_amount")?,
    })
}

fn row_to_bracket(row: &SqliteRow) -> Result<TaxBracket, RepositoryError> {
    Ok(TaxBracket {
        tax_year: get(row, "tax_year")?,
        jurisdiction: parse_code(get(row, "jurisdiction")?, "jurisdiction", Jurisdiction::parse)?,
        filing_status: parse_code(
            get(row, "filing_status")?,
            "filing_status",
            FilingStatus::parse,
        )?,
        min_income: get_decimal(row, "min_income")?,
        max_income: get_optional_decimal(row, "max_income")?,
        tax_rate: get_decimal(row, "tax_rate")?,
        base_tax: get_decimal(row, "base_tax")?,
    })
}

fn row_to_employee(row: &SqliteRow) -> Result<Employee, RepositoryError> {
    let pay_amount = get_decimal(row, "pay_amount")?;
    let pay_type: String = get(row, "pay_type")?;
    let pay = match pay_type.as_str() {
        "hourly" => PayType::Hourly { rate: pay_amount },
        "salary" => PayType::Salary {
            annual_salary: pay_amount,
        },
        other => {
            return Err(RepositoryError::Database(format!("Unknown pay_type '{}'", other)));
        }
    };
    let local = get::<Option<String>>(row, "local_jurisdiction")?
        .map(|code| parse_code(code, "local_jurisdiction", LocalJurisdiction::parse))
        .transpose()?;

    Ok(Employee {
        id: get(row, "id")?,
        company_id: get(row, "company_id")?,
        name: get(row, "name")?,
        profile: EmployeeTaxProfile {
            filing_status: parse_code(
                get(row, "filing_status")?,
                "filing_status",
                FilingStatus::parse,
            )?,
            allowances: get_u32(row, "allowances")?,
            residency: Residency {
                state_resident: get(row, "state_resident")?,
                local,
            },
            withholding: WithholdingElections {
                federal: get(row, "withhold_federal")?,
                state: get(row, "withhold_state")?,
                disability: get(row, "withhold_sdi")?,
                paid_family_leave: get(row, "withhold_pfl")?,
            },
            pay,
        },
        rates: CompanyRates {
            sui_rate: get_optional_decimal(row, "sui_rate")?,
            futa_rate: get_optional_decimal(row, "futa_rate")?,
        },
    })
}

fn row_to_deduction(row: &SqliteRow) -> Result<EmployeeDeduction, RepositoryError> {
    Ok(EmployeeDeduction {
        id: get(row, "id")?,
        employee_id: get(row, "employee_id")?,
        is_active: get(row, "is_active")?,
        definition: DeductionDefinition {
            deduction_type: get(row, "deduction_type")?,
            name: get(row, "name")?,
            amount_type: parse_code(get(row, "amount_type")?, "amount_type", AmountType::parse)?,
            amount: get_decimal(row, "amount")?,
            pre_tax: get(row, "pre_tax")?,
            annual_limit: get_optional_decimal(row, "annual_limit")?,
            ytd_amount: get_decimal(row, "ytd_amount")?,
        },
    })
}

const RECORD_COLUMNS: &str = "id, employee_id, company_id, period_start, period_end, pay_date,
    result, status, status_actor, status_reason, status_at, original_record_id,
    replacement_record_id, journal_entry_id, created_at";

fn row_to_record(row: &SqliteRow) -> Result<PayrollRecord, RepositoryError> {
    let result_json: String = get(row, "result")?;
    let result: PayrollResult = serde_json::from_str(&result_json)
        .map_err(|e| RepositoryError::Database(format!("Invalid payroll result: {}", e)))?;

    let status_change = match (
        get::<Option<String>>(row, "status_actor")?,
        get::<Option<String>>(row, "status_reason")?,
        get::<Option<DateTime<Utc>>>(row, "status_at")?,
    ) {
        (Some(actor), Some(reason), Some(at)) => Some(StatusChange { actor, reason, at }),
        _ => None,
    };

    Ok(PayrollRecord {
        id: get(row, "id")?,
        employee_id: get(row, "employee_id")?,
        company_id: get(row, "company_id")?,
        period: PayPeriod {
            start: get(row, "period_start")?,
            end: get(row, "period_end")?,
            pay_date: get(row, "pay_date")?,
        },
        result,
        status: parse_code(get(row, "status")?, "status", PayrollStatus::parse)?,
        status_change,
        original_record_id: get(row, "original_record_id")?,
        replacement_record_id: get(row, "replacement_record_id")?,
        journal_entry_id: get(row, "journal_entry_id")?,
        created_at: get(row, "created_at")?,
    })
}

fn row_to_account(row: &SqliteRow) -> Result<Account, RepositoryError> {
    Ok(Account {
        id: get(row, "id")?,
        company_id: get(row, "company_id")?,
        code: get(row, "code")?,
        name: get(row, "name")?,
        account_type: parse_code(get(row, "account_type")?, "account_type", AccountType::parse)?,
        subtype: get(row, "subtype")?,
        is_active: get(row, "is_active")?,
    })
}

// ── statements shared by the transactional commits ───────────────────────

async fn insert_record(
    conn: &mut SqliteConnection,
    record: &NewPayrollRecord,
) -> Result<i64, RepositoryError> {
    let result = serde_json::to_string(&record.result).map_err(db_err)?;
    let inserted = sqlx::query(
        "INSERT INTO payroll_records
            (employee_id, company_id, period_start, period_end, pay_date, result,
             gross_pay, net_pay, status, original_record_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?)",
    )
    .bind(record.employee_id)
    .bind(record.company_id)
    .bind(record.period.start)
    .bind(record.period.end)
    .bind(record.period.pay_date)
    .bind(result)
    .bind(decimal_to_text(record.result.gross_pay))
    .bind(decimal_to_text(record.result.net_pay))
    .bind(record.original_record_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(write_err)?;
    Ok(inserted.last_insert_rowid())
}

/// Read-modify-write on each matching deduction; amounts never pass
/// through SQLite arithmetic. An adjustment with a deduction id touches that
/// row only, otherwise every active row of its type.
async fn apply_adjustments(
    conn: &mut SqliteConnection,
    adjustments: &[YtdAdjustment],
) -> Result<(), RepositoryError> {
    for adjustment in adjustments {
        let rows = sqlx::query(
            "SELECT id, ytd_amount FROM employee_deductions
             WHERE employee_id = ? AND is_active = 1
               AND ((? IS NOT NULL AND id = ?) OR (? IS NULL AND deduction_type = ?))",
        )
        .bind(adjustment.employee_id)
        .bind(adjustment.deduction_id)
        .bind(adjustment.deduction_id)
        .bind(adjustment.deduction_id)
        .bind(&adjustment.deduction_type)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;

        for row in rows {
            let id: i64 = get(&row, "id")?;
            let ytd = apply_ytd_adjustment(get_decimal(&row, "ytd_amount")?, adjustment.delta);
            sqlx::query("UPDATE employee_deductions SET ytd_amount = ? WHERE id = ?")
                .bind(decimal_to_text(ytd))
                .bind(id)
                .execute(&mut *conn)
                .await
                .map_err(db_err)?;
        }
    }
    Ok(())
}

/// Allocates the company's next entry number and writes the entry with its
/// lines. Must run inside the caller's transaction.
async fn insert_entry(
    conn: &mut SqliteConnection,
    entry: NewJournalEntry,
) -> Result<JournalEntry, RepositoryError> {
    let entry_number: i64 = sqlx::query_scalar(
        "INSERT INTO journal_entry_counters (company_id, last_number) VALUES (?, 1)
         ON CONFLICT(company_id) DO UPDATE SET last_number = last_number + 1
         RETURNING last_number",
    )
    .bind(entry.company_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err)?;

    let created_at = Utc::now();
    let id = sqlx::query(
        "INSERT INTO journal_entries
            (company_id, entry_number, entry_date, memo, reference, source, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.company_id)
    .bind(entry_number)
    .bind(entry.entry_date)
    .bind(&entry.memo)
    .bind(&entry.reference)
    .bind(entry.source.as_str())
    .bind(created_at)
    .execute(&mut *conn)
    .await
    .map_err(write_err)?
    .last_insert_rowid();

    let mut lines = Vec::with_capacity(entry.lines.len());
    for line in entry.lines {
        let line_id = sqlx::query(
            "INSERT INTO journal_entry_lines (journal_entry_id, account_id, debit, credit)
             VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(line.account_id)
        .bind(decimal_to_text(line.debit))
        .bind(decimal_to_text(line.credit))
        .execute(&mut *conn)
        .await
        .map_err(db_err)?
        .last_insert_rowid();
        lines.push(JournalEntryLine {
            id: line_id,
            account_id: line.account_id,
            debit: line.debit,
            credit: line.credit,
        });
    }

    Ok(JournalEntry {
        id,
        company_id: entry.company_id,
        entry_number,
        entry_date: entry.entry_date,
        memo: entry.memo,
        reference: entry.reference,
        source: entry.source,
        lines,
        created_at,
    })
}

/// Moves an active record to `status`. A record that is no longer active is
/// a conflict, which is what keeps concurrent voids from both applying.
async fn close_record(
    conn: &mut SqliteConnection,
    record_id: i64,
    status: PayrollStatus,
    change: &StatusChange,
) -> Result<(), RepositoryError> {
    let updated = sqlx::query(
        "UPDATE payroll_records
         SET status = ?, status_actor = ?, status_reason = ?, status_at = ?
         WHERE id = ? AND status = 'active'",
    )
    .bind(status.as_str())
    .bind(&change.actor)
    .bind(&change.reason)
    .bind(change.at)
    .bind(record_id)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    if updated.rows_affected() == 1 {
        return Ok(());
    }
    let current: Option<String> =
        sqlx::query_scalar("SELECT status FROM payroll_records WHERE id = ?")
            .bind(record_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err)?;
    match current {
        Some(current) => Err(RepositoryError::Conflict(format!(
            "payroll record {} is {}",
            record_id, current
        ))),
        None => Err(RepositoryError::NotFound),
    }
}

async fn link_entry(
    conn: &mut SqliteConnection,
    record_id: i64,
    journal_entry_id: i64,
) -> Result<u64, RepositoryError> {
    let updated = sqlx::query("UPDATE payroll_records SET journal_entry_id = ? WHERE id = ?")
        .bind(journal_entry_id)
        .bind(record_id)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(updated.rows_affected())
}

#[async_trait]
impl PayrollRepository for SqliteRepository {
    async fn get_tax_year_config(
        &self,
        year: i32,
    ) -> Result<TaxYearConfig, RepositoryError> {
        let row = sqlx::query("SELECT * FROM tax_year_config WHERE tax_year = ?")
            .bind(year)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(RepositoryError::NotFound)?;
        row_to_config(&row)
    }

    async fn list_tax_years(&self) -> Result<Vec<i32>, RepositoryError> {
        sqlx::query_scalar("SELECT tax_year FROM tax_year_config ORDER BY tax_year DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn save_tax_year_config(
        &self,
        config: &TaxYearConfig,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT OR REPLACE INTO tax_year_config (
                tax_year, periods_per_year, standard_weekly_hours, overtime_multiplier,
                social_security_rate, social_security_wage_base, medicare_rate,
                additional_medicare_rate, additional_medicare_threshold,
                futa_default_rate, futa_wage_base, sui_wage_base,
                sdi_rate, sdi_weekly_max, sdi_annual_max, pfl_rate, pfl_annual_max,
                nyc_rate, yonkers_surcharge_rate, federal_allowance_amount, state_allowance_amount
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(config.tax_year)
        .bind(i64::from(config.periods_per_year))
        .bind(decimal_to_text(config.standard_weekly_hours))
        .bind(decimal_to_text(config.overtime_multiplier))
        .bind(decimal_to_text(config.social_security_rate))
        .bind(decimal_to_text(config.social_security_wage_base))
        .bind(decimal_to_text(config.medicare_rate))
        .bind(decimal_to_text(config.additional_medicare_rate))
        .bind(decimal_to_text(config.additional_medicare_threshold))
        .bind(decimal_to_text(config.futa_default_rate))
        .bind(decimal_to_text(config.futa_wage_base))
        .bind(decimal_to_text(config.sui_wage_base))
        .bind(decimal_to_text(config.sdi_rate))
        .bind(decimal_to_text(config.sdi_weekly_max))
        .bind(decimal_to_text(config.sdi_annual_max))
        .bind(decimal_to_text(config.pfl_rate))
        .bind(decimal_to_text(config.pfl_annual_max))
        .bind(decimal_to_text(config.nyc_rate))
        .bind(decimal_to_text(config.yonkers_surcharge_rate))
        .bind(decimal_to_text(config.federal_allowance_amount))
        .bind(decimal_to_text(config.state_allowance_amount))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_tax_brackets(
        &self,
        year: i32,
    ) -> Result<Vec<TaxBracket>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT tax_year, jurisdiction, filing_status, min_income, max_income, tax_rate, base_tax
             FROM tax_brackets WHERE tax_year = ?",
        )
        .bind(year)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut brackets = rows
            .iter()
            .map(row_to_bracket)
            .collect::<Result<Vec<_>, _>>()?;
        brackets.sort_by(|a, b| {
            (a.jurisdiction.as_str(), a.filing_status.as_str(), a.min_income).cmp(&(
                b.jurisdiction.as_str(),
                b.filing_status.as_str(),
                b.min_income,
            ))
        });
        Ok(brackets)
    }

    async fn insert_tax_bracket(
        &self,
        bracket: &TaxBracket,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO tax_brackets
                (tax_year, jurisdiction, filing_status, min_income, max_income, tax_rate, base_tax)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(bracket.tax_year)
        .bind(bracket.jurisdiction.as_str())
        .bind(bracket.filing_status.as_str())
        .bind(decimal_to_text(bracket.min_income))
        .bind(optional_text(bracket.max_income))
        .bind(decimal_to_text(bracket.tax_rate))
        .bind(decimal_to_text(bracket.base_tax))
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        Ok(())
    }

    async fn delete_tax_brackets(
        &self,
        year: i32,
        jurisdiction: Jurisdiction,
        filing_status: FilingStatus,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "DELETE FROM tax_brackets WHERE tax_year = ? AND jurisdiction = ? AND filing_status = ?",
        )
        .bind(year)
        .bind(jurisdiction.as_str())
        .bind(filing_status.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn create_employee(
        &self,
        employee: NewEmployee,
    ) -> Result<Employee, RepositoryError> {
        let profile = &employee.profile;
        let pay_amount = match profile.pay {
            PayType::Hourly { rate } => rate,
            PayType::Salary { annual_salary } => annual_salary,
        };
        let id = sqlx::query(
            "INSERT INTO employees
                (company_id, name, filing_status, allowances, state_resident, local_jurisdiction,
                 withhold_federal, withhold_state, withhold_sdi, withhold_pfl,
                 pay_type, pay_amount, sui_rate, futa_rate)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(employee.company_id)
        .bind(&employee.name)
        .bind(profile.filing_status.as_str())
        .bind(i64::from(profile.allowances))
        .bind(profile.residency.state_resident)
        .bind(profile.residency.local.map(|l| l.as_str()))
        .bind(profile.withholding.federal)
        .bind(profile.withholding.state)
        .bind(profile.withholding.disability)
        .bind(profile.withholding.paid_family_leave)
        .bind(profile.pay.as_str())
        .bind(decimal_to_text(pay_amount))
        .bind(optional_text(employee.rates.sui_rate))
        .bind(optional_text(employee.rates.futa_rate))
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .last_insert_rowid();

        self.get_employee(id).await
    }

    async fn get_employee(
        &self,
        id: i64,
    ) -> Result<Employee, RepositoryError> {
        let row = sqlx::query("SELECT * FROM employees WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(RepositoryError::NotFound)?;
        row_to_employee(&row)
    }

    async fn create_deduction(
        &self,
        deduction: NewEmployeeDeduction,
    ) -> Result<EmployeeDeduction, RepositoryError> {
        let d = &deduction.definition;
        let id = sqlx::query(
            "INSERT INTO employee_deductions
                (employee_id, deduction_type, name, amount_type, amount, pre_tax,
                 annual_limit, ytd_amount, is_active)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(deduction.employee_id)
        .bind(&d.deduction_type)
        .bind(&d.name)
        .bind(d.amount_type.as_str())
        .bind(decimal_to_text(d.amount))
        .bind(d.pre_tax)
        .bind(optional_text(d.annual_limit))
        .bind(decimal_to_text(d.ytd_amount))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|db| db.is_foreign_key_violation()) {
                RepositoryError::NotFound
            } else {
                db_err(e)
            }
        })?
        .last_insert_rowid();

        Ok(EmployeeDeduction {
            id,
            employee_id: deduction.employee_id,
            is_active: true,
            definition: deduction.definition,
        })
    }

    async fn set_deduction_active(
        &self,
        id: i64,
        is_active: bool,
    ) -> Result<(), RepositoryError> {
        let updated = sqlx::query("UPDATE employee_deductions SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_deductions(
        &self,
        employee_id: i64,
    ) -> Result<Vec<EmployeeDeduction>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM employee_deductions WHERE employee_id = ? ORDER BY id")
            .bind(employee_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_deduction).collect()
    }

    async fn get_payroll_record(
        &self,
        id: i64,
    ) -> Result<PayrollRecord, RepositoryError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM payroll_records WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(RepositoryError::NotFound)?;
        row_to_record(&row)
    }

    async fn list_payroll_records(
        &self,
        employee_id: i64,
        year: i32,
    ) -> Result<Vec<PayrollRecord>, RepositoryError> {
        let (Some(first), Some(last)) = (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 12, 31),
        ) else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM payroll_records
             WHERE employee_id = ? AND pay_date >= ? AND pay_date <= ?
             ORDER BY pay_date, id"
        );
        let rows = sqlx::query(&sql)
            .bind(employee_id)
            .bind(first)
            .bind(last)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_record).collect()
    }

    async fn get_payroll_records(
        &self,
        ids: &[i64],
    ) -> Result<Vec<PayrollRecord>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM payroll_records WHERE id IN ({placeholders}) ORDER BY id"
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter().map(row_to_record).collect()
    }

    async fn commit_payroll_run(
        &self,
        records: Vec<NewPayrollRecord>,
        adjustments: Vec<YtdAdjustment>,
    ) -> Result<Vec<PayrollRecord>, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut ids = Vec::with_capacity(records.len());
        for record in &records {
            ids.push(insert_record(&mut tx, record).await?);
        }
        apply_adjustments(&mut tx, &adjustments).await?;
        tx.commit().await.map_err(db_err)?;

        self.get_payroll_records(&ids).await
    }

    async fn link_journal_entry(
        &self,
        record_ids: &[i64],
        journal_entry_id: i64,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for id in record_ids {
            if link_entry(&mut tx, *id, journal_entry_id).await? == 0 {
                return Err(RepositoryError::NotFound);
            }
        }
        tx.commit().await.map_err(db_err)
    }

    async fn commit_void(
        &self,
        plan: VoidPlan,
    ) -> Result<PayrollRecord, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        close_record(&mut tx, plan.record_id, PayrollStatus::Voided, &plan.change).await?;
        apply_adjustments(&mut tx, &plan.reversals).await?;
        if let Some(entry) = plan.reversal_entry {
            insert_entry(&mut tx, entry).await?;
        }
        tx.commit().await.map_err(db_err)?;

        self.get_payroll_record(plan.record_id).await
    }

    async fn commit_correction(
        &self,
        plan: CorrectionPlan,
    ) -> Result<(PayrollRecord, PayrollRecord), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        close_record(&mut tx, plan.record_id, PayrollStatus::Corrected, &plan.change).await?;
        apply_adjustments(&mut tx, &plan.reversals).await?;

        let replacement_id = insert_record(&mut tx, &plan.replacement).await?;
        apply_adjustments(&mut tx, &plan.reapplications).await?;
        sqlx::query("UPDATE payroll_records SET replacement_record_id = ? WHERE id = ?")
            .bind(replacement_id)
            .bind(plan.record_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        if let Some(entry) = plan.reversal_entry {
            insert_entry(&mut tx, entry).await?;
        }
        if let Some(entry) = plan.replacement_entry {
            let entry = insert_entry(&mut tx, entry).await?;
            link_entry(&mut tx, replacement_id, entry.id).await?;
        }
        tx.commit().await.map_err(db_err)?;

        let corrected = self.get_payroll_record(plan.record_id).await?;
        let replacement = self.get_payroll_record(replacement_id).await?;
        Ok((corrected, replacement))
    }

    async fn create_account(
        &self,
        account: NewAccount,
    ) -> Result<Account, RepositoryError> {
        let id = sqlx::query(
            "INSERT INTO accounts (company_id, code, name, account_type, subtype, is_active)
             VALUES (?, ?, ?, ?, ?, 1)",
        )
        .bind(account.company_id)
        .bind(&account.code)
        .bind(&account.name)
        .bind(account.account_type.as_str())
        .bind(&account.subtype)
        .execute(&self.pool)
        .await
        .map_err(write_err)?
        .last_insert_rowid();

        Ok(Account {
            id,
            company_id: account.company_id,
            code: account.code,
            name: account.name,
            account_type: account.account_type,
            subtype: account.subtype,
            is_active: true,
        })
    }

    async fn list_accounts(
        &self,
        company_id: i64,
    ) -> Result<Vec<Account>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM accounts WHERE company_id = ? ORDER BY code")
            .bind(company_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_account).collect()
    }

    async fn create_journal_entry(
        &self,
        entry: NewJournalEntry,
    ) -> Result<JournalEntry, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let created = insert_entry(&mut tx, entry).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(created)
    }

    async fn list_journal_entries(
        &self,
        company_id: i64,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<JournalEntry>, RepositoryError> {
        const RANGE: &str = "company_id = ?
             AND (? IS NULL OR entry_date >= ?)
             AND (? IS NULL OR entry_date <= ?)";

        let header_sql = format!(
            "SELECT id, company_id, entry_number, entry_date, memo, reference, source, created_at
             FROM journal_entries WHERE {RANGE} ORDER BY entry_number"
        );
        let headers = sqlx::query(&header_sql)
            .bind(company_id)
            .bind(start)
            .bind(start)
            .bind(end)
            .bind(end)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let line_sql = format!(
            "SELECT id, journal_entry_id, account_id, debit, credit FROM journal_entry_lines
             WHERE journal_entry_id IN (SELECT id FROM journal_entries WHERE {RANGE})
             ORDER BY id"
        );
        let line_rows = sqlx::query(&line_sql)
            .bind(company_id)
            .bind(start)
            .bind(start)
            .bind(end)
            .bind(end)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut lines: BTreeMap<i64, Vec<JournalEntryLine>> = BTreeMap::new();
        for row in &line_rows {
            lines
                .entry(get(row, "journal_entry_id")?)
                .or_default()
                .push(JournalEntryLine {
                    id: get(row, "id")?,
                    account_id: get(row, "account_id")?,
                    debit: get_decimal(row, "debit")?,
                    credit: get_decimal(row, "credit")?,
                });
        }

        headers
            .iter()
            .map(|row| -> Result<JournalEntry, RepositoryError> {
                let id: i64 = get(row, "id")?;
                Ok(JournalEntry {
                    id,
                    company_id: get(row, "company_id")?,
                    entry_number: get(row, "entry_number")?,
                    entry_date: get(row, "entry_date")?,
                    memo: get(row, "memo")?,
                    reference: get(row, "reference")?,
                    source: parse_code(get(row, "source")?, "source", EntrySource::parse)?,
                    lines: lines.remove(&id).unwrap_or_default(),
                    created_at: get(row, "created_at")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::NaiveDate;
    use payroll_core::NewJournalEntryLine;
    use payroll_core::calculations::{PayrollCalculator, PayrollInput};
    use payroll_core::records::{plan_correction, plan_void};
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;

    async fn repo() -> SqliteRepository {
        let repo = SqliteRepository::new(":memory:")
            .await
            .expect("Failed to open in-memory database");
        repo.run_migrations().await.expect("Failed to migrate");
        repo.run_seeds(&PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("seeds"))
            .await
            .expect("Failed to seed");
        repo
    }

    fn date(
        m: u32,
        d: u32,
    ) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn profile() -> EmployeeTaxProfile {
        EmployeeTaxProfile {
            filing_status: FilingStatus::Married,
            allowances: 2,
            residency: Residency {
                state_resident: true,
                local: Some(LocalJurisdiction::Yonkers),
            },
            withholding: WithholdingElections {
                paid_family_leave: false,
                ..WithholdingElections::default()
            },
            pay: PayType::Salary {
                annual_salary: dec!(78000),
            },
        }
    }

    async fn employee(repo: &SqliteRepository) -> Employee {
        repo.create_employee(NewEmployee {
            company_id: 1,
            name: "Ada".to_string(),
            profile: profile(),
            rates: CompanyRates {
                sui_rate: Some(dec!(0.041)),
                futa_rate: None,
            },
        })
        .await
        .unwrap()
    }

    async fn add_deduction(
        repo: &SqliteRepository,
        employee_id: i64,
        deduction_type: &str,
        amount: Decimal,
    ) -> EmployeeDeduction {
        repo.create_deduction(NewEmployeeDeduction {
            employee_id,
            definition: DeductionDefinition {
                deduction_type: deduction_type.to_string(),
                name: deduction_type.to_string(),
                amount_type: AmountType::Fixed,
                amount,
                pre_tax: true,
                annual_limit: Some(dec!(23500)),
                ytd_amount: dec!(0),
            },
        })
        .await
        .unwrap()
    }

    async fn computed_record(
        repo: &SqliteRepository,
        employee: &Employee,
    ) -> NewPayrollRecord {
        let config = repo.get_tax_year_config(2025).await.unwrap();
        let brackets = repo.get_tax_brackets(2025).await.unwrap();
        let tables = payroll_core::TaxTables::new(config, brackets);
        let deductions: Vec<_> = repo
            .list_deductions(employee.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|d| d.is_active)
            .collect();
        let result = PayrollCalculator::new(&tables).calculate(&PayrollInput {
            profile: &employee.profile,
            rates: employee.rates,
            regular_hours: dec!(40),
            overtime_hours: dec!(0),
            ytd: Default::default(),
            deductions: &deductions,
        });
        NewPayrollRecord {
            employee_id: employee.id,
            company_id: employee.company_id,
            period: PayPeriod::new(date(3, 3), date(3, 9), date(3, 14)).unwrap(),
            result,
            original_record_id: None,
        }
    }

    fn change(reason: &str) -> StatusChange {
        StatusChange {
            actor: "admin".to_string(),
            reason: reason.to_string(),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn seeded_config_is_exact() {
        let repo = repo().await;

        let config = repo.get_tax_year_config(2025).await.unwrap();

        assert_eq!(config.periods_per_year, 52);
        assert_eq!(config.social_security_wage_base, dec!(176100));
        assert_eq!(config.pfl_rate, dec!(0.00388));
        assert_eq!(config.sdi_weekly_max, dec!(0.60));
        assert_eq!(repo.list_tax_years().await.unwrap(), vec![2025]);
    }

    #[tokio::test]
    async fn seeds_cover_every_filing_status() {
        let repo = repo().await;
        let tables = payroll_core::TaxTables::new(
            repo.get_tax_year_config(2025).await.unwrap(),
            repo.get_tax_brackets(2025).await.unwrap(),
        );

        for status in [FilingStatus::Single, FilingStatus::Married, FilingStatus::HeadOfHousehold] {
            assert_eq!(tables.brackets_for(Jurisdiction::Federal, status).len(), 7);
            assert_eq!(tables.brackets_for(Jurisdiction::State, status).len(), 6);
        }
    }

    #[tokio::test]
    async fn seeds_can_run_twice() {
        let repo = repo().await;

        repo.run_seeds(&PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("seeds"))
            .await
            .unwrap();

        assert_eq!(repo.get_tax_brackets(2025).await.unwrap().len(), 39);
    }

    #[tokio::test]
    async fn saved_config_replaces_existing_year() {
        let repo = repo().await;
        let mut config = repo.get_tax_year_config(2025).await.unwrap();
        config.social_security_wage_base = dec!(180000);

        repo.save_tax_year_config(&config).await.unwrap();

        assert_eq!(repo.get_tax_year_config(2025).await.unwrap(), config);
    }

    #[tokio::test]
    async fn duplicate_bracket_is_a_conflict() {
        let repo = repo().await;
        let bracket = repo.get_tax_brackets(2025).await.unwrap().remove(0);

        let result = repo.insert_tax_bracket(&bracket).await;

        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn deleting_brackets_is_scoped() {
        let repo = repo().await;

        repo.delete_tax_brackets(2025, Jurisdiction::State, FilingStatus::Married)
            .await
            .unwrap();

        assert_eq!(repo.get_tax_brackets(2025).await.unwrap().len(), 33);
    }

    #[tokio::test]
    async fn employee_profile_round_trips() {
        let repo = repo().await;

        let created = employee(&repo).await;
        let fetched = repo.get_employee(created.id).await.unwrap();

        assert_eq!(fetched.profile, profile());
        assert_eq!(fetched.rates.sui_rate, Some(dec!(0.041)));
        assert_eq!(fetched.rates.futa_rate, None);
    }

    #[tokio::test]
    async fn missing_employee_is_not_found() {
        let repo = repo().await;

        assert_eq!(repo.get_employee(99).await, Err(RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn payroll_run_stores_result_and_ytd() {
        let repo = repo().await;
        let employee = employee(&repo).await;
        add_deduction(&repo, employee.id, "401k", dec!(100)).await;
        let new_record = computed_record(&repo, &employee).await;

        let records = repo
            .commit_payroll_run(
                vec![new_record.clone()],
                vec![YtdAdjustment {
                    employee_id: employee.id,
                    deduction_id: None,
                    deduction_type: "401k".to_string(),
                    delta: dec!(100),
                }],
            )
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].result, new_record.result);
        assert_eq!(records[0].status, PayrollStatus::Active);
        let deductions = repo.list_deductions(employee.id).await.unwrap();
        assert_eq!(deductions[0].definition.ytd_amount, dec!(100));
    }

    #[tokio::test]
    async fn adjustment_with_deduction_id_moves_only_that_row() {
        let repo = repo().await;
        let employee = employee(&repo).await;
        let first = add_deduction(&repo, employee.id, "roth", dec!(50)).await;
        let second = add_deduction(&repo, employee.id, "roth", dec!(20)).await;
        let adjustment = |id: i64, delta| YtdAdjustment {
            employee_id: employee.id,
            deduction_id: Some(id),
            deduction_type: "roth".to_string(),
            delta,
        };

        repo.commit_payroll_run(
            vec![],
            vec![adjustment(first.id, dec!(50)), adjustment(second.id, dec!(20))],
        )
        .await
        .unwrap();

        let deductions = repo.list_deductions(employee.id).await.unwrap();
        let ytd = |id: i64| {
            deductions
                .iter()
                .find(|d| d.id == id)
                .unwrap()
                .definition
                .ytd_amount
        };
        assert_eq!((ytd(first.id), ytd(second.id)), (dec!(50), dec!(20)));
    }

    #[tokio::test]
    async fn void_applies_reversal_and_rejects_second_void() {
        let repo = repo().await;
        let employee = employee(&repo).await;
        add_deduction(&repo, employee.id, "401k", dec!(100)).await;
        let new_record = computed_record(&repo, &employee).await;
        let record = repo
            .commit_payroll_run(vec![new_record], vec![])
            .await
            .unwrap()
            .remove(0);

        let plan = plan_void(&record, change("duplicate")).unwrap();
        let voided = repo.commit_void(plan.clone()).await.unwrap();
        let again = repo.commit_void(plan).await;

        assert_eq!(voided.status, PayrollStatus::Voided);
        assert_eq!(voided.status_change.unwrap().reason, "duplicate");
        assert!(matches!(again, Err(RepositoryError::Conflict(_))));
        let deductions = repo.list_deductions(employee.id).await.unwrap();
        assert_eq!(deductions[0].definition.ytd_amount, dec!(0));
    }

    #[tokio::test]
    async fn correction_links_both_records() {
        let repo = repo().await;
        let employee = employee(&repo).await;
        let new_record = computed_record(&repo, &employee).await;
        let record = repo
            .commit_payroll_run(vec![new_record.clone()], vec![])
            .await
            .unwrap()
            .remove(0);

        let plan = plan_correction(&record, change("rate change"), new_record.result).unwrap();
        let (corrected, replacement) = repo.commit_correction(plan).await.unwrap();

        assert_eq!(corrected.status, PayrollStatus::Corrected);
        assert_eq!(corrected.replacement_record_id, Some(replacement.id));
        assert_eq!(replacement.original_record_id, Some(record.id));
        assert_eq!(replacement.status, PayrollStatus::Active);
    }

    #[tokio::test]
    async fn entry_numbers_are_sequential_per_company() {
        let repo = repo().await;
        let cash = repo
            .create_account(NewAccount {
                company_id: 1,
                code: "1000".to_string(),
                name: "Cash".to_string(),
                account_type: AccountType::Asset,
                subtype: None,
            })
            .await
            .unwrap();
        let equity = repo
            .create_account(NewAccount {
                company_id: 1,
                code: "3000".to_string(),
                name: "Owner Equity".to_string(),
                account_type: AccountType::Equity,
                subtype: None,
            })
            .await
            .unwrap();
        let entry = |day| NewJournalEntry {
            company_id: 1,
            entry_date: date(1, day),
            memo: format!("Capital {day}"),
            reference: None,
            source: EntrySource::Manual,
            lines: vec![
                NewJournalEntryLine::debit(cash.id, dec!(1000.10)),
                NewJournalEntryLine::credit(equity.id, dec!(1000.10)),
            ],
        };

        let first = repo.create_journal_entry(entry(2)).await.unwrap();
        let second = repo.create_journal_entry(entry(3)).await.unwrap();
        let listed = repo
            .list_journal_entries(1, Some(date(1, 3)), None)
            .await
            .unwrap();

        assert_eq!((first.entry_number, second.entry_number), (1, 2));
        assert_eq!(listed, vec![second]);
        assert_eq!(listed[0].lines[0].debit, dec!(1000.10));
    }

    #[tokio::test]
    async fn duplicate_account_code_is_a_conflict() {
        let repo = repo().await;
        let account = NewAccount {
            company_id: 1,
            code: "1000".to_string(),
            name: "Cash".to_string(),
            account_type: AccountType::Asset,
            subtype: None,
        };

        repo.create_account(account.clone()).await.unwrap();

        assert!(matches!(
            repo.create_account(account).await,
            Err(RepositoryError::Conflict(_))
        ));
    }
}
