//! Top-level training orchestration
//!
//! One call trains everything a run still owes: resolve the work list,
//! dispatch the remaining units, audit the persisted outputs, and only
//! then commit the run log. A failed run leaves the prior log untouched,
//! so the next invocation resumes from the partitions that finished.

use crate::context::RunContext;
use crate::data::{PartitionData, GLOBAL_COMBO};
use crate::dispatch::{dispatch_units, BroadcastInputs};
use crate::error::{Result, TrainError};
use crate::features::FeatureSelector;
use crate::resolver::{resolve_tasks, write_run_log};
use crate::splits::{validate_boundaries, FoldBoundary};
use crate::store::ArtifactStore;
use crate::verify::{count_completion, verify_completion, CompletionReport};
use crate::workflow::{validate_workflows, HyperparameterGrid, ModelRegistry, WorkflowSpec};
use tracing::info;

/// Everything a training invocation consumes besides the context
#[derive(Debug)]
pub struct TrainingInputs {
    /// Prepared data per partition (never the All-Data sentinel; the
    /// engine materializes that itself)
    pub partitions: Vec<PartitionData>,
    /// Workflow table: (model, recipe) bindings
    pub workflows: Vec<WorkflowSpec>,
    /// Hyperparameter grids per (model, recipe)
    pub grids: Vec<HyperparameterGrid>,
    /// Fold boundary table shared by every partition
    pub boundaries: Vec<FoldBoundary>,
}

/// What a training invocation did
#[derive(Debug)]
pub struct TrainingSummary {
    /// Success tokens of units trained by this invocation
    pub trained: Vec<String>,
    /// Units already complete from prior invocations
    pub skipped: usize,
    /// The invocation was a no-op resume with identical inputs
    pub up_to_date: bool,
    /// Final reconciled completion counts
    pub completion: CompletionReport,
}

/// Train all remaining partition units for this run
pub fn run_training(
    ctx: &RunContext,
    inputs: &TrainingInputs,
    registry: &ModelRegistry,
    selector: &dyn FeatureSelector,
    store: &dyn ArtifactStore,
) -> Result<TrainingSummary> {
    if inputs.partitions.is_empty() {
        return Err(TrainError::DataError(
            "no prepared partitions to train on".to_string(),
        ));
    }
    if inputs.partitions.iter().any(|p| p.combo == GLOBAL_COMBO) {
        return Err(TrainError::DataError(format!(
            "'{}' is reserved for the engine's global unit and cannot be a prepared partition",
            GLOBAL_COMBO
        )));
    }
    validate_workflows(&inputs.workflows, &ctx.recipes)?;
    validate_boundaries(&inputs.boundaries)?;

    let combos: Vec<String> = inputs
        .partitions
        .iter()
        .map(|p| p.combo.clone())
        .collect();

    let resolution = resolve_tasks(ctx, &combos, &inputs.workflows, store)?;
    if resolution.up_to_date {
        let completion = count_completion(ctx, &combos, resolution.global_models, store)?;
        return Ok(TrainingSummary {
            trained: Vec::new(),
            skipped: resolution.completed.len(),
            up_to_date: true,
            completion,
        });
    }

    info!(
        experiment = %ctx.experiment,
        run = %ctx.run_name,
        units = resolution.work_list.len(),
        global_models = resolution.global_models,
        "dispatching training work"
    );

    let broadcast = BroadcastInputs {
        workflows: &inputs.workflows,
        grids: &inputs.grids,
        boundaries: &inputs.boundaries,
        registry,
        selector,
    };
    let trained = dispatch_units(ctx, &resolution.work_list, &inputs.partitions, &broadcast, store)?;

    let completion = verify_completion(ctx, &combos, resolution.global_models, store)?;

    // The log is the last write of a run: a crash before this point leaves
    // the previous log in place and the resolver picks up the difference
    write_run_log(ctx, resolution.global_models, store)?;

    Ok(TrainingSummary {
        trained,
        skipped: resolution.completed.len(),
        up_to_date: false,
        completion,
    })
}
