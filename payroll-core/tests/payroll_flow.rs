use chrono::NaiveDate;
use payroll_core::db::MemoryRepository;
use payroll_core::ledger::LedgerService;
use payroll_core::records::{PayrollService, Timesheet};
use payroll_core::{
    AmountType, CompanyRates, DeductionDefinition, EmployeeTaxProfile, EntrySource, FilingStatus,
    Jurisdiction, LifecycleError, NewEmployee, NewEmployeeDeduction, PayPeriod, PayType,
    PayrollError, PayrollRecord, PayrollRepository, PayrollStatus, Residency, TaxBracket,
    TaxYearConfig, WithholdingElections,
};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const COMPANY: i64 = 1;

fn date(
    m: u32,
    d: u32,
) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, m, d).unwrap()
}

fn week(n: u32) -> PayPeriod {
    let start = date(1, 6) + chrono::Days::new(u64::from(n) * 7);
    PayPeriod::new(start, start + chrono::Days::new(6), start + chrono::Days::new(11)).unwrap()
}

fn config() -> TaxYearConfig {
    TaxYearConfig {
        tax_year: 2025,
        periods_per_year: 52,
        standard_weekly_hours: dec!(40),
        overtime_multiplier: dec!(1.5),
        social_security_rate: dec!(0.062),
        social_security_wage_base: dec!(176100),
        medicare_rate: dec!(0.0145),
        additional_medicare_rate: dec!(0.009),
        additional_medicare_threshold: dec!(200000),
        futa_default_rate: dec!(0.006),
        futa_wage_base: dec!(7000),
        sui_wage_base: dec!(12800),
        sdi_rate: dec!(0.005),
        sdi_weekly_max: dec!(0.60),
        sdi_annual_max: dec!(31.20),
        pfl_rate: dec!(0.00388),
        pfl_annual_max: dec!(354.53),
        nyc_rate: dec!(0.03876),
        yonkers_surcharge_rate: dec!(0.1675),
        federal_allowance_amount: dec!(0),
        state_allowance_amount: dec!(1000),
    }
}

fn brackets() -> Vec<TaxBracket> {
    let rows: [(Jurisdiction, Decimal, Option<Decimal>, Decimal, Decimal); 6] = [
        (Jurisdiction::Federal, dec!(0), Some(dec!(11925)), dec!(0.10), dec!(0)),
        (Jurisdiction::Federal, dec!(11925), Some(dec!(48475)), dec!(0.12), dec!(1192.50)),
        (Jurisdiction::Federal, dec!(48475), None, dec!(0.22), dec!(5578.50)),
        (Jurisdiction::State, dec!(0), Some(dec!(8500)), dec!(0.04), dec!(0)),
        (Jurisdiction::State, dec!(8500), Some(dec!(11700)), dec!(0.045), dec!(340)),
        (Jurisdiction::State, dec!(11700), None, dec!(0.0525), dec!(484)),
    ];
    rows.into_iter()
        .map(|(jurisdiction, min_income, max_income, tax_rate, base_tax)| TaxBracket {
            tax_year: 2025,
            jurisdiction,
            filing_status: FilingStatus::Single,
            min_income,
            max_income,
            tax_rate,
            base_tax,
        })
        .collect()
}

fn deduction(
    deduction_type: &str,
    amount_type: AmountType,
    amount: Decimal,
    pre_tax: bool,
) -> DeductionDefinition {
    DeductionDefinition {
        deduction_type: deduction_type.to_string(),
        name: deduction_type.to_string(),
        amount_type,
        amount,
        pre_tax,
        annual_limit: None,
        ytd_amount: dec!(0),
    }
}

struct Fixture {
    repo: MemoryRepository,
    employee_id: i64,
}

impl Fixture {
    async fn new(with_chart: bool) -> Self {
        let repo = MemoryRepository::new();
        repo.save_tax_year_config(&config()).await.unwrap();
        for bracket in brackets() {
            repo.insert_tax_bracket(&bracket).await.unwrap();
        }

        let employee = repo
            .create_employee(NewEmployee {
                company_id: COMPANY,
                name: "Grace".to_string(),
                profile: EmployeeTaxProfile {
                    filing_status: FilingStatus::Single,
                    allowances: 0,
                    residency: Residency {
                        state_resident: true,
                        local: None,
                    },
                    withholding: WithholdingElections::default(),
                    pay: PayType::Hourly { rate: dec!(25) },
                },
                rates: CompanyRates {
                    sui_rate: Some(dec!(0.041)),
                    futa_rate: None,
                },
            })
            .await
            .unwrap();
        for definition in [
            deduction("401k", AmountType::Percentage, dec!(5), true),
            deduction("union", AmountType::Fixed, dec!(10), false),
        ] {
            repo.create_deduction(NewEmployeeDeduction {
                employee_id: employee.id,
                definition,
            })
            .await
            .unwrap();
        }

        if with_chart {
            LedgerService::new(&repo)
                .install_default_accounts(COMPANY)
                .await
                .unwrap();
        }

        Self {
            repo,
            employee_id: employee.id,
        }
    }

    fn service(&self) -> PayrollService<'_, MemoryRepository> {
        PayrollService::new(&self.repo)
    }

    fn timesheet(&self) -> Timesheet {
        Timesheet {
            employee_id: self.employee_id,
            regular_hours: dec!(40),
            overtime_hours: dec!(0),
        }
    }

    async fn deduction_ytd(
        &self,
        deduction_type: &str,
    ) -> Decimal {
        self.repo
            .list_deductions(self.employee_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|d| d.definition.deduction_type == deduction_type)
            .map(|d| d.definition.ytd_amount)
            .sum()
    }

    /// `(annual_limit, ytd_amount)` for each deduction of the type, oldest first.
    async fn deduction_states(
        &self,
        deduction_type: &str,
    ) -> Vec<(Option<Decimal>, Decimal)> {
        self.repo
            .list_deductions(self.employee_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|d| d.definition.deduction_type == deduction_type)
            .map(|d| (d.definition.annual_limit, d.definition.ytd_amount))
            .collect()
    }
}

#[tokio::test]
async fn pay_run_persists_records_and_posts_balanced_entry() {
    let fx = Fixture::new(true).await;

    let run = fx
        .service()
        .run_pay_period(COMPANY, &week(0), &[fx.timesheet()])
        .await
        .unwrap();

    let record = &run.records[0];
    let result = &record.result;
    assert_eq!(result.gross_pay, dec!(1000.00));
    assert_eq!(result.total_pre_tax_deductions, dec!(50.00));
    assert_eq!(result.taxes.social_security, dec!(62.00));
    assert_eq!(result.taxes.medicare, dec!(14.50));
    assert_eq!(
        result.net_pay,
        result.gross_pay
            - result.total_pre_tax_deductions
            - result.total_tax_withholdings
            - result.total_post_tax_deductions
    );

    let entry = run.journal_entry.expect("chart is installed");
    assert_eq!(entry.entry_number, 1);
    assert_eq!(entry.source, EntrySource::Payroll);
    assert_eq!(entry.total_debits(), entry.total_credits());
    assert_eq!(entry.total_debits(), result.gross_pay + result.total_employer_cost);

    let stored = fx.repo.get_payroll_record(record.id).await.unwrap();
    assert_eq!(stored.journal_entry_id, Some(entry.id));
    assert_eq!(fx.deduction_ytd("401k").await, dec!(50.00));
    assert_eq!(fx.deduction_ytd("union").await, dec!(10));
}

#[tokio::test]
async fn later_periods_see_prior_ytd() {
    let fx = Fixture::new(false).await;
    let service = fx.service();

    service
        .run_pay_period(COMPANY, &week(0), &[fx.timesheet()])
        .await
        .unwrap();
    let ytd = service.prior_ytd(fx.employee_id, &week(1)).await.unwrap();

    assert_eq!(ytd.gross_pay, dec!(1000.00));
    assert_eq!(ytd.social_security, dec!(62.00));
    assert_eq!(fx.deduction_ytd("401k").await, dec!(50.00));
}

#[tokio::test]
async fn missing_chart_skips_posting_but_keeps_payroll() {
    let fx = Fixture::new(false).await;

    let run = fx
        .service()
        .run_pay_period(COMPANY, &week(0), &[fx.timesheet()])
        .await
        .unwrap();

    assert_eq!(run.journal_entry, None);
    assert_eq!(run.records.len(), 1);
    assert_eq!(run.records[0].journal_entry_id, None);
    assert!(fx.repo.list_journal_entries(COMPANY, None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn void_restores_deduction_ytd_and_reverses_ledger() {
    let fx = Fixture::new(true).await;
    let service = fx.service();
    service
        .run_pay_period(COMPANY, &week(0), &[fx.timesheet()])
        .await
        .unwrap();
    let run = service
        .run_pay_period(COMPANY, &week(1), &[fx.timesheet()])
        .await
        .unwrap();
    let before = fx.deduction_ytd("401k").await;

    let outcome = service
        .void_payroll_record(run.records[0].id, "entered twice", "payroll-admin")
        .await
        .unwrap();

    assert_eq!(outcome.voided.status, PayrollStatus::Voided);
    let change = outcome.voided.status_change.unwrap();
    assert_eq!(change.actor, "payroll-admin");
    assert_eq!(change.reason, "entered twice");
    assert_eq!(before, dec!(100.00));
    assert_eq!(fx.deduction_ytd("401k").await, dec!(50.00));
    assert_eq!(fx.deduction_ytd("union").await, dec!(10));

    let entries = fx.repo.list_journal_entries(COMPANY, None, None).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[2].source, EntrySource::PayrollReversal);
    assert_eq!(entries[2].entry_number, 3);

    let trial = service.ledger().trial_balance(COMPANY, None, None).await.unwrap();
    assert!(trial.is_balanced);
    assert_eq!(trial.total_debits, trial.total_credits);
}

#[tokio::test]
async fn voiding_twice_is_a_precondition_error() {
    let fx = Fixture::new(false).await;
    let service = fx.service();
    let run = service
        .run_pay_period(COMPANY, &week(0), &[fx.timesheet()])
        .await
        .unwrap();
    let id = run.records[0].id;
    service.void_payroll_record(id, "first", "a").await.unwrap();

    let err = service.void_payroll_record(id, "second", "a").await.unwrap_err();

    assert!(matches!(
        err,
        PayrollError::Lifecycle(LifecycleError::NotActive {
            status: PayrollStatus::Voided,
            ..
        })
    ));
    assert_eq!(fx.deduction_ytd("401k").await, dec!(0));
}

#[tokio::test]
async fn correction_pairs_records_and_uses_current_elections() {
    let fx = Fixture::new(true).await;
    let service = fx.service();
    let run = service
        .run_pay_period(COMPANY, &week(0), &[fx.timesheet()])
        .await
        .unwrap();
    let original = &run.records[0];
    fx.repo
        .create_deduction(NewEmployeeDeduction {
            employee_id: fx.employee_id,
            definition: deduction("health", AmountType::Fixed, dec!(20), true),
        })
        .await
        .unwrap();

    let outcome = service
        .correct_payroll_record(original.id, "missed health election", "hr")
        .await
        .unwrap();

    assert_eq!(outcome.voided.status, PayrollStatus::Corrected);
    assert_eq!(outcome.voided.replacement_record_id, Some(outcome.corrected.id));
    assert_eq!(outcome.corrected.status, PayrollStatus::Active);
    assert_eq!(outcome.corrected.original_record_id, Some(original.id));
    assert_eq!(outcome.corrected.period, original.period);
    assert_eq!(outcome.corrected.result.total_pre_tax_deductions, dec!(70.00));
    assert!(outcome.corrected.journal_entry_id.is_some());

    assert_eq!(fx.deduction_ytd("401k").await, dec!(50.00));
    assert_eq!(fx.deduction_ytd("health").await, dec!(20));
    assert_eq!(fx.deduction_ytd("union").await, dec!(10));

    let active: Vec<_> = fx
        .repo
        .list_payroll_records(fx.employee_id, 2025)
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.is_active())
        .collect();
    assert_eq!(active.len(), 1);

    let trial = service.ledger().trial_balance(COMPANY, None, None).await.unwrap();
    assert!(trial.is_balanced);
}

#[tokio::test]
async fn correcting_a_voided_record_is_rejected() {
    let fx = Fixture::new(false).await;
    let service = fx.service();
    let run = service
        .run_pay_period(COMPANY, &week(0), &[fx.timesheet()])
        .await
        .unwrap();
    let id = run.records[0].id;
    service.void_payroll_record(id, "void", "a").await.unwrap();

    let err = service.correct_payroll_record(id, "fix", "a").await.unwrap_err();

    assert!(matches!(
        err,
        PayrollError::Lifecycle(LifecycleError::NotActive { record_id, .. }) if record_id == id
    ));
}

#[tokio::test]
async fn balance_sheet_balances_after_payroll() {
    let fx = Fixture::new(true).await;
    let service = fx.service();
    service
        .run_pay_period(COMPANY, &week(0), &[fx.timesheet()])
        .await
        .unwrap();

    let sheet = service.ledger().balance_sheet(COMPANY, date(12, 31)).await.unwrap();
    let pnl = service
        .ledger()
        .profit_and_loss(COMPANY, Some(date(1, 1)), Some(date(12, 31)))
        .await
        .unwrap();

    assert!(sheet.is_balanced);
    assert_eq!(sheet.retained_earnings, pnl.net_income);
    assert_eq!(sheet.total_liabilities, -pnl.net_income);
}

#[tokio::test]
async fn employee_of_another_company_is_refused() {
    let fx = Fixture::new(false).await;

    let err = fx
        .service()
        .run_pay_period(2, &week(0), &[fx.timesheet()])
        .await
        .unwrap_err();

    assert!(matches!(err, PayrollError::ForeignEmployee { company_id: 2, .. }));
    assert!(fx
        .repo
        .list_payroll_records(fx.employee_id, 2025)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn correction_recomputes_as_if_the_original_was_never_paid() {
    let fx = Fixture::new(false).await;
    let service = fx.service();
    let mut hsa = deduction("hsa", AmountType::Fixed, dec!(50), true);
    hsa.annual_limit = Some(dec!(100));
    fx.repo
        .create_deduction(NewEmployeeDeduction {
            employee_id: fx.employee_id,
            definition: hsa,
        })
        .await
        .unwrap();
    service
        .run_pay_period(COMPANY, &week(0), &[fx.timesheet()])
        .await
        .unwrap();
    let run = service
        .run_pay_period(COMPANY, &week(1), &[fx.timesheet()])
        .await
        .unwrap();
    let original = &run.records[0];

    let outcome = service
        .correct_payroll_record(original.id, "recheck hours", "hr")
        .await
        .unwrap();

    let hsa_taken = |record: &PayrollRecord| -> Decimal {
        record
            .result
            .deduction_lines()
            .filter(|l| l.deduction_type == "hsa")
            .map(|l| l.amount)
            .sum()
    };
    assert_eq!(hsa_taken(original), dec!(50));
    assert_eq!(hsa_taken(&outcome.corrected), dec!(50));
    assert_eq!(outcome.corrected.result, original.result);
    assert_eq!(fx.deduction_ytd("hsa").await, dec!(100));
    assert_eq!(fx.deduction_ytd("401k").await, dec!(100.00));
}

#[tokio::test]
async fn deductions_sharing_a_type_keep_their_own_ytd() {
    let fx = Fixture::new(false).await;
    let service = fx.service();
    let mut pre_tax = deduction("roth", AmountType::Fixed, dec!(50), true);
    pre_tax.annual_limit = Some(dec!(1000));
    let mut post_tax = deduction("roth", AmountType::Fixed, dec!(20), false);
    post_tax.annual_limit = Some(dec!(20));
    for definition in [pre_tax, post_tax] {
        fx.repo
            .create_deduction(NewEmployeeDeduction {
                employee_id: fx.employee_id,
                definition,
            })
            .await
            .unwrap();
    }
    service
        .run_pay_period(COMPANY, &week(0), &[fx.timesheet()])
        .await
        .unwrap();
    assert_eq!(
        fx.deduction_states("roth").await,
        vec![(Some(dec!(1000)), dec!(50)), (Some(dec!(20)), dec!(20))]
    );

    let run = service
        .run_pay_period(COMPANY, &week(1), &[fx.timesheet()])
        .await
        .unwrap();
    let taken: Vec<_> = run.records[0]
        .result
        .deduction_lines()
        .filter(|l| l.deduction_type == "roth")
        .map(|l| l.amount)
        .collect();
    assert_eq!(taken, vec![dec!(50)]);

    service
        .void_payroll_record(run.records[0].id, "duplicate", "payroll-admin")
        .await
        .unwrap();
    assert_eq!(
        fx.deduction_states("roth").await,
        vec![(Some(dec!(1000)), dec!(50)), (Some(dec!(20)), dec!(20))]
    );
}

#[tokio::test]
async fn same_day_off_cycle_run_counts_the_earlier_run() {
    let fx = Fixture::new(false).await;
    let service = fx.service();
    let bonus = Timesheet {
        employee_id: fx.employee_id,
        regular_hours: dec!(7080),
        overtime_hours: dec!(0),
    };
    let first = service
        .run_pay_period(COMPANY, &week(0), &[bonus])
        .await
        .unwrap();

    let ytd = service.prior_ytd(fx.employee_id, &week(0)).await.unwrap();
    let second = service
        .run_pay_period(COMPANY, &week(0), &[fx.timesheet()])
        .await
        .unwrap();

    assert_eq!(ytd.gross_pay, dec!(177000.00));
    assert_eq!(second.records[0].result.taxes.social_security, dec!(0));
    assert_eq!(second.records[0].result.employer.social_security, dec!(0));

    let outcome = service
        .correct_payroll_record(first.records[0].id, "recheck", "hr")
        .await
        .unwrap();
    assert_eq!(
        outcome.corrected.result.taxes.social_security,
        first.records[0].result.taxes.social_security
    );
}

#[tokio::test]
async fn duplicate_timesheets_are_refused() {
    let fx = Fixture::new(false).await;

    let err = fx
        .service()
        .run_pay_period(COMPANY, &week(0), &[fx.timesheet(), fx.timesheet()])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PayrollError::DuplicateTimesheet { employee_id } if employee_id == fx.employee_id
    ));
    assert!(fx
        .repo
        .list_payroll_records(fx.employee_id, 2025)
        .await
        .unwrap()
        .is_empty());
}
