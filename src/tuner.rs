//! Hyperparameter search, refit and forecast assembly for one
//! (model, recipe) sub-task
//!
//! Tuning walks the grid against the Validation folds only; the selected
//! combination is then refit on every fold (validation, test and future)
//! to produce the per-fold predictions that become forecast rows. The seed
//! is reset immediately before every fit so results do not depend on
//! execution order or concurrency degree.

use crate::context::RunContext;
use crate::data::{DataRow, RecipeData};
use crate::error::{Result, TrainError};
use crate::forecast::{model_id, postprocess_rows, ForecastRow, ModelType};
use crate::metrics::root_mean_squared_error;
use crate::splits::{build_splits, validation_splits, FoldBoundary, Split};
use crate::workflow::{
    FittedModelRecord, HyperparameterGrid, HyperparameterSet, ModelRegistry, TrainableModel,
    WorkflowSpec,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Result of one tuned and refitted sub-task
#[derive(Debug)]
pub struct TunerOutput {
    /// Post-processed forecast rows for every fold; horizons are numbered
    /// later, after the unit aggregates its sub-tasks
    pub forecasts: Vec<ForecastRow>,
    /// The persisted trained-model record
    pub model: FittedModelRecord,
}

/// Tune, select, refit and assemble forecasts for one workflow
#[allow(clippy::too_many_arguments)]
pub fn tune_and_forecast(
    ctx: &RunContext,
    unit_combo: &str,
    model_type: ModelType,
    workflow: &WorkflowSpec,
    data: &RecipeData,
    features: &[String],
    grid: Option<&HyperparameterGrid>,
    registry: &ModelRegistry,
    boundaries: &[FoldBoundary],
) -> Result<TunerOutput> {
    if data.is_empty() {
        return Err(TrainError::DataError(format!(
            "no rows for recipe '{}' in partition '{}'",
            workflow.recipe, unit_combo
        )));
    }
    let model = registry.get(&workflow.model_name)?;
    let splits = build_splits(data, boundaries)?;

    let default_grid;
    let combinations: &[HyperparameterSet] = match grid {
        Some(grid) => &grid.combinations,
        None => {
            default_grid = vec![HyperparameterSet {
                id: 1,
                values: BTreeMap::new(),
            }];
            &default_grid
        }
    };
    if combinations.is_empty() {
        return Err(TrainError::InvalidParameter(format!(
            "empty hyperparameter grid for ({}, {})",
            workflow.model_name, workflow.recipe
        )));
    }

    let (best, hyperparameter_id) = select_best(
        ctx,
        model.as_ref(),
        data,
        features,
        combinations,
        &splits,
        workflow,
    )?;

    // One fit on the widest training window becomes the persisted model
    let final_split = widest_split(&splits);
    let analysis_rows = target_bearing(data, &final_split.analysis);
    let fitted = model.fit(&analysis_rows, features, best, ctx.seed)?;
    let record = FittedModelRecord {
        combo: unit_combo.to_string(),
        model_id: model_id(&workflow.model_name, &workflow.recipe),
        model_name: workflow.model_name.clone(),
        model_type,
        recipe: workflow.recipe.clone(),
        hyperparameter_id,
        artifact: fitted.artifact(),
    };

    // Refit per fold across every run type to produce the forecast rows
    let mut forecasts = Vec::new();
    for split in &splits {
        if split.assessment.is_empty() {
            continue;
        }
        let analysis_rows = target_bearing(data, &split.analysis);
        if analysis_rows.is_empty() {
            continue;
        }
        let fitted = model.fit(&analysis_rows, features, best, ctx.seed)?;
        let assessment_rows: Vec<&DataRow> =
            split.assessment.iter().map(|&i| &data.rows[i]).collect();
        let predictions = fitted.predict(&assessment_rows, features)?;
        if predictions.len() != assessment_rows.len() {
            return Err(TrainError::TrainingError(format!(
                "model '{}' predicted {} values for {} assessment rows",
                workflow.model_name,
                predictions.len(),
                assessment_rows.len()
            )));
        }
        for (row, prediction) in assessment_rows.iter().zip(predictions) {
            forecasts.push(ForecastRow {
                combo: row.combo.clone(),
                model_id: model_id(&workflow.model_name, &workflow.recipe),
                model_name: workflow.model_name.clone(),
                model_type,
                recipe: workflow.recipe.clone(),
                fold_id: split.fold_id,
                run_type: split.run_type,
                horizon: 0,
                date: row.date,
                forecast: prediction,
                hyperparameter_id,
            });
        }
    }

    postprocess_rows(&mut forecasts, ctx.allow_negative_forecasts);
    Ok(TunerOutput {
        forecasts,
        model: record,
    })
}

/// Pick the minimum mean-RMSE combination over the validation folds
///
/// Ties keep the first combination in grid order (strict comparison during
/// the scan). A single-combination grid skips scoring entirely and its id
/// is fixed to 1.
fn select_best<'a>(
    ctx: &RunContext,
    model: &dyn TrainableModel,
    data: &RecipeData,
    features: &[String],
    combinations: &'a [HyperparameterSet],
    splits: &[Split],
    workflow: &WorkflowSpec,
) -> Result<(&'a HyperparameterSet, i64)> {
    if combinations.len() == 1 {
        return Ok((&combinations[0], 1));
    }

    let validation = validation_splits(splits);
    if validation.is_empty() {
        return Err(TrainError::InvalidParameter(format!(
            "grid for ({}, {}) has {} combinations but the boundary table \
             has no Validation folds to score them on",
            workflow.model_name,
            workflow.recipe,
            combinations.len()
        )));
    }

    let mut best: Option<(&HyperparameterSet, f64)> = None;
    for combination in combinations {
        match score_combination(ctx, model, data, features, combination, &validation) {
            Ok(score) => {
                debug!(
                    model = %workflow.model_name,
                    recipe = %workflow.recipe,
                    hyperparameter_id = combination.id,
                    rmse = score,
                    "scored hyperparameter combination"
                );
                if best.map_or(true, |(_, best_score)| score < best_score) {
                    best = Some((combination, score));
                }
            }
            Err(err) => {
                debug!(
                    model = %workflow.model_name,
                    recipe = %workflow.recipe,
                    hyperparameter_id = combination.id,
                    error = %err,
                    "hyperparameter combination failed; excluded from search"
                );
            }
        }
    }

    match best {
        Some((combination, _)) => Ok((combination, combination.id)),
        None => Err(TrainError::TrainingError(format!(
            "every hyperparameter combination failed for ({}, {})",
            workflow.model_name, workflow.recipe
        ))),
    }
}

/// Mean RMSE of one combination across the validation folds
fn score_combination(
    ctx: &RunContext,
    model: &dyn TrainableModel,
    data: &RecipeData,
    features: &[String],
    combination: &HyperparameterSet,
    validation: &[&Split],
) -> Result<f64> {
    let mut fold_scores = Vec::new();
    for split in validation {
        let analysis_rows = target_bearing(data, &split.analysis);
        if analysis_rows.is_empty() || split.assessment.is_empty() {
            continue;
        }
        let fitted = model.fit(&analysis_rows, features, combination, ctx.seed)?;
        let assessment_rows: Vec<&DataRow> =
            split.assessment.iter().map(|&i| &data.rows[i]).collect();
        let predictions = fitted.predict(&assessment_rows, features)?;

        let mut actual = Vec::new();
        let mut predicted = Vec::new();
        for (row, prediction) in assessment_rows.iter().zip(predictions) {
            if let Some(target) = row.target {
                actual.push(target);
                predicted.push(prediction);
            }
        }
        let rmse = root_mean_squared_error(&actual, &predicted);
        if rmse.is_finite() {
            fold_scores.push(rmse);
        }
    }
    if fold_scores.is_empty() {
        return Err(TrainError::TrainingError(
            "no validation fold produced a finite RMSE".to_string(),
        ));
    }
    Ok(fold_scores.iter().sum::<f64>() / fold_scores.len() as f64)
}

/// Rows of the given indices that carry a ground-truth target
fn target_bearing<'a>(data: &'a RecipeData, indices: &[usize]) -> Vec<&'a DataRow> {
    indices
        .iter()
        .map(|&i| &data.rows[i])
        .filter(|row| row.target.is_some())
        .collect()
}

/// The split with the latest training cutoff (largest analysis set)
fn widest_split<'a>(splits: &'a [Split]) -> &'a Split {
    splits
        .iter()
        .max_by_key(|s| s.analysis.len())
        .expect("boundary validation guarantees at least one split")
}
