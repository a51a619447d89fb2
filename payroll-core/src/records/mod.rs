pub mod lifecycle;
pub mod service;

pub use lifecycle::{
    CorrectionPlan, LifecycleError, VoidPlan, YtdAdjustment, adjust_deductions,
    apply_ytd_adjustment, ensure_active, plan_correction, plan_void, ytd_applications,
    ytd_reversals,
};
pub use service::{CorrectionOutcome, PayRun, PayrollError, PayrollService, Timesheet, VoidOutcome};
