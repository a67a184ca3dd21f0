//! Nested dispatch of training work
//!
//! Two data-parallel layers share one parallelism budget: the outer layer
//! fans out across partition units, the inner layer across the model/recipe
//! sub-tasks of one unit. [`ParallelPlan`](crate::context::ParallelPlan)
//! guarantees at most one layer is parallel. Sub-task failures are dropped
//! from the unit's aggregate; unit failures abort the whole run.

use crate::context::{ExecMode, RunContext};
use crate::data::{combine_partitions, PartitionData, GLOBAL_COMBO};
use crate::error::{Result, TrainError};
use crate::features::{select_unit_features, FeatureSelector};
use crate::forecast::{assign_horizons, model_id, ForecastRow, ModelType};
use crate::resolver::WorkUnit;
use crate::splits::FoldBoundary;
use crate::store::{ArtifactName, ArtifactStore};
use crate::tuner::tune_and_forecast;
use crate::workflow::{
    grid_for, FittedModelRecord, HyperparameterGrid, ModelRegistry, WorkflowSpec,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::thread;
use tracing::{info, warn};

/// Run tasks under one execution mode, returning results in task order
///
/// Parallel mode is a bounded-queue worker pool: a fixed set of scoped
/// threads pulls task indices from a shared queue. The scope join doubles
/// as the unconditional pool teardown; it runs whether tasks succeeded or
/// failed. Result order is restored from task indices, never from worker
/// arrival order.
pub fn run_tasks<T, R, F>(mode: ExecMode, tasks: Vec<T>, task_fn: F) -> Vec<Result<R>>
where
    T: Send,
    R: Send,
    F: Fn(T) -> Result<R> + Sync,
{
    match mode {
        ExecMode::Sequential => tasks.into_iter().map(task_fn).collect(),
        ExecMode::Parallel { workers } => {
            let task_count = tasks.len();
            let queue: Mutex<VecDeque<(usize, T)>> =
                Mutex::new(tasks.into_iter().enumerate().collect());
            let finished: Mutex<Vec<(usize, Result<R>)>> =
                Mutex::new(Vec::with_capacity(task_count));
            let worker_count = workers.min(task_count.max(1));

            thread::scope(|scope| {
                for _ in 0..worker_count {
                    scope.spawn(|| loop {
                        let next = queue.lock().expect("task queue poisoned").pop_front();
                        let Some((index, task)) = next else {
                            break;
                        };
                        let result = task_fn(task);
                        finished
                            .lock()
                            .expect("result collector poisoned")
                            .push((index, result));
                    });
                }
            });

            let mut slots: Vec<Option<Result<R>>> = (0..task_count).map(|_| None).collect();
            for (index, result) in finished.into_inner().expect("result collector poisoned") {
                slots[index] = Some(result);
            }
            slots
                .into_iter()
                .map(|slot| slot.expect("worker pool completed every task"))
                .collect()
        }
    }
}

/// Aggregated output of one partition unit
#[derive(Debug)]
pub struct UnitOutput {
    pub forecasts: Vec<ForecastRow>,
    pub models: Vec<FittedModelRecord>,
}

/// Read-only tables broadcast to every unit and sub-task
pub struct BroadcastInputs<'a> {
    pub workflows: &'a [WorkflowSpec],
    pub grids: &'a [HyperparameterGrid],
    pub boundaries: &'a [FoldBoundary],
    pub registry: &'a ModelRegistry,
    pub selector: &'a dyn FeatureSelector,
}

/// Inner dispatcher: run every (model, recipe) sub-task of one unit
///
/// Per-sub-task failure is tolerated and the sub-task dropped from the
/// aggregate; a unit where every sub-task failed is a hard error.
pub fn run_unit(
    ctx: &RunContext,
    unit: &WorkUnit,
    partition: &PartitionData,
    inputs: &BroadcastInputs<'_>,
) -> Result<UnitOutput> {
    let (model_type, unit_workflows): (ModelType, Vec<WorkflowSpec>) = match unit {
        WorkUnit::Local(_) => (ModelType::Local, inputs.workflows.to_vec()),
        WorkUnit::Global => (
            ModelType::Global,
            inputs
                .workflows
                .iter()
                .filter(|w| w.supports_global)
                .cloned()
                .collect(),
        ),
    };
    if unit_workflows.is_empty() {
        return Err(TrainError::NoModelsTrained(unit.to_string()));
    }
    let required: Vec<String> = unit_workflows.iter().map(|w| w.recipe.clone()).collect();
    partition.validate_recipes(&required)?;

    // One selector pass per recipe, shared by every model in the unit
    let selected = select_unit_features(
        inputs.selector,
        &partition.recipes,
        &unit_workflows,
        inputs.boundaries,
        ctx.feature_selection,
    )?;

    let unit_combo = unit.to_string();
    let labels: Vec<String> = unit_workflows
        .iter()
        .map(|w| model_id(&w.model_name, &w.recipe))
        .collect();
    let results = run_tasks(ctx.parallel.inner(), unit_workflows, |workflow| {
        let data = partition.recipe(&workflow.recipe).ok_or_else(|| {
            TrainError::DataError(format!(
                "partition '{}' has no data for recipe '{}'",
                unit_combo, workflow.recipe
            ))
        })?;
        let features = match (workflow.feature_selection_eligible, selected.get(&workflow.recipe))
        {
            (true, Some(narrowed)) => narrowed.clone(),
            _ => data.feature_names(),
        };
        tune_and_forecast(
            ctx,
            &unit_combo,
            model_type,
            &workflow,
            data,
            &features,
            grid_for(inputs.grids, &workflow),
            inputs.registry,
            inputs.boundaries,
        )
    });

    let mut forecasts = Vec::new();
    let mut models = Vec::new();
    for (label, result) in labels.iter().zip(results) {
        match result {
            Ok(output) => {
                forecasts.extend(output.forecasts);
                models.push(output.model);
            }
            Err(err) => {
                warn!(
                    unit = %unit_combo,
                    sub_task = %label,
                    error = %err,
                    "sub-task failed; dropped from aggregate"
                );
            }
        }
    }
    if models.is_empty() {
        return Err(TrainError::NoModelsTrained(unit_combo));
    }

    // Horizon is an ordinal within (combo, model, fold); recompute it now
    // that sub-task outputs have been unioned in arbitrary finish order
    assign_horizons(&mut forecasts);
    Ok(UnitOutput { forecasts, models })
}

/// Outer dispatcher: run and persist every unit in the work list
///
/// Units are independent; the only shared state is the read-only broadcast
/// inputs. Any unit failure aborts the batch (fail-fast). Returns one
/// success token per completed unit.
pub fn dispatch_units(
    ctx: &RunContext,
    work_list: &[WorkUnit],
    partitions: &[PartitionData],
    inputs: &BroadcastInputs<'_>,
    store: &dyn ArtifactStore,
) -> Result<Vec<String>> {
    let global_data = if work_list.contains(&WorkUnit::Global) {
        Some(combine_partitions(partitions))
    } else {
        None
    };

    let results = run_tasks(ctx.parallel.outer(), work_list.to_vec(), |unit| {
        let partition = match &unit {
            WorkUnit::Local(combo) => partitions
                .iter()
                .find(|p| &p.combo == combo)
                .ok_or_else(|| {
                    TrainError::DataError(format!("no prepared data for partition '{}'", combo))
                })?,
            WorkUnit::Global => global_data
                .as_ref()
                .expect("global data is built whenever the global unit is dispatched"),
        };

        let output = run_unit(ctx, &unit, partition, inputs)?;
        persist_unit(ctx, &unit, &output, store)?;
        info!(
            unit = %unit,
            models = output.models.len(),
            forecast_rows = output.forecasts.len(),
            "partition unit trained and persisted"
        );
        Ok(unit.to_string())
    });

    let mut tokens = Vec::with_capacity(results.len());
    for result in results {
        tokens.push(result?);
    }
    Ok(tokens)
}

/// Persist one unit's fitted models and forecasts
///
/// A local unit writes one forecast artifact. The global unit explodes its
/// forecast table into one slice per constituent partition: same fit,
/// per-partition artifacts.
fn persist_unit(
    ctx: &RunContext,
    unit: &WorkUnit,
    output: &UnitOutput,
    store: &dyn ArtifactStore,
) -> Result<()> {
    match unit {
        WorkUnit::Local(combo) => {
            store.write_model_collection(&ArtifactName::models(ctx, combo), &output.models)?;
            store.write_forecasts(&ArtifactName::local_forecast(ctx, combo), &output.forecasts)?;
        }
        WorkUnit::Global => {
            store.write_model_collection(
                &ArtifactName::models(ctx, GLOBAL_COMBO),
                &output.models,
            )?;
            let mut by_combo: BTreeMap<&str, Vec<ForecastRow>> = BTreeMap::new();
            for row in &output.forecasts {
                by_combo.entry(&row.combo).or_default().push(row.clone());
            }
            for (combo, rows) in by_combo {
                store.write_forecasts(&ArtifactName::global_forecast(ctx, combo), &rows)?;
            }
        }
    }
    Ok(())
}
