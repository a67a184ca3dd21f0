//! Task resolution and resumability
//!
//! Before any training happens, the resolver decides which partition units
//! still need work by diffing the eligible set against artifacts persisted
//! by prior invocations. A run that finds nothing to do is either a clean
//! resume with identical inputs (short-circuit success) or a conflicting
//! one with changed inputs (hard error, never a silent retrain).

use crate::context::{ForecastApproach, RunContext};
use crate::error::{Result, TrainError};
use crate::store::{ArtifactKind, ArtifactName, ArtifactStore, RunLog};
use crate::workflow::WorkflowSpec;
use std::collections::HashSet;
use std::fmt;
use tracing::info;

/// One independent unit of work for the outer dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WorkUnit {
    /// Train every model on one partition's own data
    Local(String),
    /// Train the multivariate models on all partitions combined
    Global,
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkUnit::Local(combo) => write!(f, "{}", combo),
            WorkUnit::Global => write!(f, "{}", crate::data::GLOBAL_COMBO),
        }
    }
}

/// Outcome of task resolution
#[derive(Debug)]
pub struct TaskResolution {
    /// Effective global-model flag after gating
    pub global_models: bool,
    /// Partition identifiers eligible under current flags
    pub eligible_combos: Vec<String>,
    /// Units that still need training
    pub work_list: Vec<WorkUnit>,
    /// Units already completed by prior invocations
    pub completed: Vec<WorkUnit>,
    /// Nothing to do and the prior run log matches the current inputs
    pub up_to_date: bool,
}

/// Apply the global-model gating rules
///
/// Global training is forced off when the calendar grain is finer than
/// monthly, the approach is not bottoms-up, no workflow supports
/// multivariate training, or there is only one partition to combine.
pub fn resolve_global_models(
    ctx: &RunContext,
    partition_count: usize,
    workflows: &[WorkflowSpec],
) -> bool {
    let requested = ctx.run_global_models.unwrap_or(true);
    requested
        && !ctx.date_granularity.finer_than_month()
        && ctx.forecast_approach == ForecastApproach::BottomsUp
        && workflows.iter().any(|w| w.supports_global)
        && partition_count > 1
}

/// Compute the work list for this invocation
pub fn resolve_tasks(
    ctx: &RunContext,
    combos: &[String],
    workflows: &[WorkflowSpec],
    store: &dyn ArtifactStore,
) -> Result<TaskResolution> {
    let global_models = resolve_global_models(ctx, combos.len(), workflows);

    let mut eligible: Vec<WorkUnit> = Vec::new();
    if ctx.run_local_models {
        eligible.extend(combos.iter().map(|c| WorkUnit::Local(c.clone())));
    }
    if global_models {
        eligible.push(WorkUnit::Global);
    }

    let completed = completed_units(ctx, combos, store)?;
    let completed_set: HashSet<&WorkUnit> = completed.iter().collect();
    let work_list: Vec<WorkUnit> = eligible
        .iter()
        .filter(|unit| !completed_set.contains(unit))
        .cloned()
        .collect();

    info!(
        eligible = eligible.len(),
        completed = completed.len(),
        remaining = work_list.len(),
        "resolved training tasks"
    );

    let mut up_to_date = false;
    if work_list.is_empty() {
        if completed.is_empty() {
            // Nothing eligible at all; nothing to train or verify
            up_to_date = true;
        } else {
            match store.read_run_log(&ArtifactName::run_log(ctx))? {
                Some(prior) => {
                    if prior.input_hash == ctx.input_hash() {
                        info!("all partitions already trained with identical inputs; skipping");
                        up_to_date = true;
                    } else {
                        return Err(TrainError::ConfigConflict {
                            prior: prior.input_summary,
                            current: ctx.input_summary(),
                        });
                    }
                }
                // Artifacts exist but the log was never written: the prior
                // run died before verification. Fall through with an empty
                // work list so this run re-verifies and commits the log.
                None => {}
            }
        }
    }

    Ok(TaskResolution {
        global_models,
        eligible_combos: combos.to_vec(),
        work_list,
        completed,
        up_to_date,
    })
}

/// Units with a previously persisted successful forecast artifact
///
/// A local unit is complete when its local forecast artifact exists. The
/// global unit is a single unit of work whose output is exploded per
/// constituent partition, so it is complete only when every eligible combo
/// has a global forecast slice.
pub fn completed_units(
    ctx: &RunContext,
    combos: &[String],
    store: &dyn ArtifactStore,
) -> Result<Vec<WorkUnit>> {
    let names: Vec<ArtifactName> = store
        .list_forecast_names()?
        .into_iter()
        .filter(|name| name.belongs_to(ctx))
        .collect();

    let local_hashes: HashSet<&String> = names
        .iter()
        .filter(|name| name.kind == ArtifactKind::LocalForecast)
        .filter_map(|name| name.combo_hash.as_ref())
        .collect();
    let global_hashes: HashSet<&String> = names
        .iter()
        .filter(|name| name.kind == ArtifactKind::GlobalForecast)
        .filter_map(|name| name.combo_hash.as_ref())
        .collect();

    let mut completed = Vec::new();
    for combo in combos {
        if local_hashes.contains(&crate::store::hash_token(combo)) {
            completed.push(WorkUnit::Local(combo.clone()));
        }
    }
    let global_complete = !combos.is_empty()
        && combos
            .iter()
            .all(|combo| global_hashes.contains(&crate::store::hash_token(combo)));
    if global_complete {
        completed.push(WorkUnit::Global);
    }
    Ok(completed)
}

/// Persist the updated run log after a verified run
pub fn write_run_log(ctx: &RunContext, global_models: bool, store: &dyn ArtifactStore) -> Result<()> {
    let log = RunLog::from_context(ctx, global_models);
    store.write_run_log(&ArtifactName::run_log(ctx), &log)
}
