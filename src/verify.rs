//! Post-run completion audit
//!
//! After every unit finishes, the persisted forecast artifacts are
//! recounted from storage and reconciled against the count the eligibility
//! flags promised. Local partitions and the global unit are independent
//! counters: a combo's local artifact never stands in for its global slice
//! or vice versa.

use crate::context::RunContext;
use crate::error::{Result, TrainError};
use crate::resolver::{completed_units, WorkUnit};
use crate::store::ArtifactStore;
use tracing::info;

/// Reconciled completion counts for one run
#[derive(Debug, Clone, Copy)]
pub struct CompletionReport {
    /// Units the eligibility flags expect to be complete
    pub expected: usize,
    /// Units actually persisted
    pub actual: usize,
    /// Local partitions with a persisted forecast artifact
    pub local_completed: usize,
    /// Whether every eligible combo has its global forecast slice
    pub global_completed: bool,
}

/// Count persisted completions without judging them
pub fn count_completion(
    ctx: &RunContext,
    combos: &[String],
    global_models: bool,
    store: &dyn ArtifactStore,
) -> Result<CompletionReport> {
    let completed = completed_units(ctx, combos, store)?;
    let local_completed = completed
        .iter()
        .filter(|unit| matches!(unit, WorkUnit::Local(_)))
        .count();
    let global_completed = completed.contains(&WorkUnit::Global);

    let expected_local = if ctx.run_local_models { combos.len() } else { 0 };
    let expected = expected_local + usize::from(global_models);
    let actual = local_completed + usize::from(global_completed && global_models);

    Ok(CompletionReport {
        expected,
        actual,
        local_completed,
        global_completed,
    })
}

/// Audit the run: error out when fewer partitions completed than expected
pub fn verify_completion(
    ctx: &RunContext,
    combos: &[String],
    global_models: bool,
    store: &dyn ArtifactStore,
) -> Result<CompletionReport> {
    let report = count_completion(ctx, combos, global_models, store)?;
    if report.actual != report.expected {
        return Err(TrainError::CompletionMismatch {
            expected: report.expected,
            actual: report.actual,
        });
    }
    info!(
        expected = report.expected,
        actual = report.actual,
        "completion audit passed"
    );
    Ok(report)
}
