//! Trainable workflow capability and model/hyperparameter tables
//!
//! Model implementations are external collaborators as far as the engine is
//! concerned: anything that can fit on a set of rows and predict another set
//! plugs in through [`TrainableModel`] / [`FittedModel`]. The tables here
//! bind model names to recipes and hyperparameter grids for one run.

use crate::data::DataRow;
use crate::error::{Result, TrainError};
use crate::forecast::ModelType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;

/// One hyperparameter combination with its stable grid id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterSet {
    /// 1-based position in the grid
    pub id: i64,
    /// Parameter values keyed by name
    pub values: BTreeMap<String, f64>,
}

impl HyperparameterSet {
    /// Look up one parameter value
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// Ordered hyperparameter grid for one (model, recipe) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HyperparameterGrid {
    pub model_name: String,
    pub recipe: String,
    pub combinations: Vec<HyperparameterSet>,
}

impl HyperparameterGrid {
    /// Build a grid, assigning ids by position
    pub fn new(model_name: &str, recipe: &str, combinations: Vec<BTreeMap<String, f64>>) -> Self {
        let combinations = combinations
            .into_iter()
            .enumerate()
            .map(|(i, values)| HyperparameterSet {
                id: i as i64 + 1,
                values,
            })
            .collect();
        Self {
            model_name: model_name.to_string(),
            recipe: recipe.to_string(),
            combinations,
        }
    }

    /// Grid holding a single combination
    pub fn single(model_name: &str, recipe: &str, values: BTreeMap<String, f64>) -> Self {
        Self::new(model_name, recipe, vec![values])
    }
}

/// An untrained, named model specification bound to exactly one recipe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub model_name: String,
    pub recipe: String,
    /// The model can train jointly on several partitions' rows
    pub supports_global: bool,
    /// The model benefits from a narrowed predictor set
    pub feature_selection_eligible: bool,
}

impl WorkflowSpec {
    pub fn new(model_name: &str, recipe: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            recipe: recipe.to_string(),
            supports_global: false,
            feature_selection_eligible: false,
        }
    }

    pub fn with_global_support(mut self, supported: bool) -> Self {
        self.supports_global = supported;
        self
    }

    pub fn with_feature_selection(mut self, eligible: bool) -> Self {
        self.feature_selection_eligible = eligible;
        self
    }
}

/// Check workflow-table invariants: (model, recipe) pairs are unique and
/// every referenced recipe is in the run's recipe list
pub fn validate_workflows(workflows: &[WorkflowSpec], recipes: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for workflow in workflows {
        if !seen.insert((workflow.model_name.clone(), workflow.recipe.clone())) {
            return Err(TrainError::InvalidParameter(format!(
                "workflow table lists ({}, {}) more than once",
                workflow.model_name, workflow.recipe
            )));
        }
        if !recipes.contains(&workflow.recipe) {
            return Err(TrainError::InvalidParameter(format!(
                "workflow ({}, {}) references a recipe outside the run's recipe list",
                workflow.model_name, workflow.recipe
            )));
        }
    }
    Ok(())
}

/// Find the grid bound to a workflow, if any
pub fn grid_for<'a>(
    grids: &'a [HyperparameterGrid],
    workflow: &WorkflowSpec,
) -> Option<&'a HyperparameterGrid> {
    grids
        .iter()
        .find(|g| g.model_name == workflow.model_name && g.recipe == workflow.recipe)
}

/// A trained model able to predict new rows
pub trait FittedModel: Debug + Send + Sync {
    /// Predict the target for each row
    fn predict(&self, rows: &[&DataRow], features: &[String]) -> Result<Vec<f64>>;

    /// Serializable description of the trained parameters
    fn artifact(&self) -> serde_json::Value;
}

/// A model specification that can be fit on rows of a recipe table
pub trait TrainableModel: Debug + Send + Sync {
    /// Registry name of the model
    fn name(&self) -> &str;

    /// Fit on the given rows using one hyperparameter combination
    ///
    /// `seed` is reset by the caller immediately before every call, so a
    /// stochastic implementation must derive all randomness from it.
    fn fit(
        &self,
        rows: &[&DataRow],
        features: &[String],
        params: &HyperparameterSet,
        seed: u64,
    ) -> Result<Box<dyn FittedModel>>;
}

/// Model implementations available to a run, keyed by name
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<dyn TrainableModel>>,
}

impl ModelRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            models: HashMap::new(),
        }
    }

    /// Register a model implementation under its name
    pub fn register(&mut self, model: Arc<dyn TrainableModel>) {
        self.models.insert(model.name().to_string(), model);
    }

    /// Look up a model by workflow name
    pub fn get(&self, model_name: &str) -> Result<Arc<dyn TrainableModel>> {
        self.models.get(model_name).cloned().ok_or_else(|| {
            TrainError::InvalidParameter(format!(
                "no model implementation registered under '{}'",
                model_name
            ))
        })
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Persisted record of one trained model within a partition unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedModelRecord {
    pub combo: String,
    pub model_id: String,
    pub model_name: String,
    pub model_type: ModelType,
    pub recipe: String,
    pub hyperparameter_id: i64,
    /// Trained parameters as reported by [`FittedModel::artifact`]
    pub artifact: serde_json::Value,
}
