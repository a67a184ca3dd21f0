//! Feature selection gate
//!
//! The scoring algorithm itself is an external capability behind
//! [`FeatureSelector`]; the gate decides when to invoke it and caches the
//! result per recipe so every model sharing a recipe within one partition
//! unit reuses the same selected predictor list. The date column is a typed
//! field on every row, so it always survives a narrowed predictor set.

use crate::data::RecipeData;
use crate::error::{Result, TrainError};
use crate::splits::FoldBoundary;
use crate::workflow::WorkflowSpec;
use std::collections::HashMap;
use std::fmt::Debug;
use tracing::debug;

/// External feature-selection capability
pub trait FeatureSelector: Debug + Send + Sync {
    /// Produce the selected predictor names for one recipe's full data
    fn select(&self, data: &RecipeData, boundaries: &[FoldBoundary]) -> Result<Vec<String>>;
}

/// Default selector: rank features by absolute correlation with the target
///
/// Only rows up to the latest training cutoff contribute to the scores, so
/// selection never sees evaluation-window targets.
#[derive(Debug, Clone)]
pub struct CorrelationRank {
    max_features: usize,
}

impl CorrelationRank {
    pub fn new(max_features: usize) -> Result<Self> {
        if max_features == 0 {
            return Err(TrainError::InvalidParameter(
                "max_features must be at least 1".to_string(),
            ));
        }
        Ok(Self { max_features })
    }
}

impl FeatureSelector for CorrelationRank {
    fn select(&self, data: &RecipeData, boundaries: &[FoldBoundary]) -> Result<Vec<String>> {
        let cutoff = boundaries
            .iter()
            .map(|b| b.train_end)
            .max()
            .ok_or_else(|| {
                TrainError::InvalidParameter("fold boundary table is empty".to_string())
            })?;

        let mut scored: Vec<(String, f64)> = Vec::new();
        for feature in data.feature_names() {
            let pairs: Vec<(f64, f64)> = data
                .rows
                .iter()
                .filter(|row| row.date <= cutoff)
                .filter_map(|row| {
                    let x = row.features.get(&feature)?;
                    let y = row.target?;
                    Some((*x, y))
                })
                .collect();
            if pairs.len() < 3 {
                continue;
            }
            let n = pairs.len() as f64;
            let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
            let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
            let cov: f64 = pairs
                .iter()
                .map(|(x, y)| (x - mean_x) * (y - mean_y))
                .sum();
            let var_x: f64 = pairs.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
            let var_y: f64 = pairs.iter().map(|(_, y)| (y - mean_y).powi(2)).sum();
            if var_x == 0.0 || var_y == 0.0 {
                continue;
            }
            let correlation = (cov / (var_x.sqrt() * var_y.sqrt())).abs();
            scored.push((feature, correlation));
        }

        // Descending score, feature name as the deterministic tie-break
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        Ok(scored
            .into_iter()
            .take(self.max_features)
            .map(|(name, _)| name)
            .collect())
    }
}

/// Whether the gate should run for a unit's workflow list
pub fn gate_applies(feature_selection: bool, workflows: &[WorkflowSpec]) -> bool {
    feature_selection && workflows.iter().any(|w| w.feature_selection_eligible)
}

/// Run the selector once per recipe in the unit's workflow list
///
/// Returns the per-recipe selected predictor lists; an empty map when the
/// gate does not apply. Each recipe is scored exactly once no matter how
/// many models share it.
pub fn select_unit_features(
    selector: &dyn FeatureSelector,
    recipes: &[RecipeData],
    workflows: &[WorkflowSpec],
    boundaries: &[FoldBoundary],
    feature_selection: bool,
) -> Result<HashMap<String, Vec<String>>> {
    let mut selected = HashMap::new();
    if !gate_applies(feature_selection, workflows) {
        return Ok(selected);
    }
    for workflow in workflows {
        if selected.contains_key(&workflow.recipe) {
            continue;
        }
        let data = recipes
            .iter()
            .find(|r| r.recipe == workflow.recipe)
            .ok_or_else(|| {
                TrainError::DataError(format!(
                    "no data for recipe '{}' referenced by workflow '{}'",
                    workflow.recipe, workflow.model_name
                ))
            })?;
        let features = selector.select(data, boundaries)?;
        debug!(
            recipe = %workflow.recipe,
            selected = features.len(),
            "feature selection narrowed predictor set"
        );
        selected.insert(workflow.recipe.clone(), features);
    }
    Ok(selected)
}
