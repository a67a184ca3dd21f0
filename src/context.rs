//! Run configuration for a training invocation
//!
//! All components receive an immutable [`RunContext`] rather than reading
//! ambient global state. The context also owns the parallelism plan, so the
//! "only one layer may fan out" rule is checked once, at construction.

use crate::error::{Result, TrainError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Calendar granularity of the date column in the input data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateGranularity {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl DateGranularity {
    /// Whether the granularity is too fine for global (multivariate) training
    pub fn finer_than_month(&self) -> bool {
        matches!(self, DateGranularity::Day | DateGranularity::Week)
    }
}

/// How forecasts for a hierarchy of series are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForecastApproach {
    /// Forecast each leaf series and aggregate upward
    BottomsUp,
    /// Forecast every level of a standard hierarchy
    StandardHierarchy,
    /// Forecast every level of a grouped hierarchy
    GroupedHierarchy,
}

/// Execution mode for one dispatch layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecMode {
    /// Run tasks one at a time on the calling thread
    Sequential,
    /// Run tasks on a pool of worker threads
    Parallel { workers: usize },
}

impl ExecMode {
    pub fn is_parallel(&self) -> bool {
        matches!(self, ExecMode::Parallel { .. })
    }
}

/// Parallelism plan for the two dispatch layers
///
/// The outer layer fans out across partitions, the inner layer across
/// model/recipe combinations within a partition. Both layers drawing from
/// the same cores at once would oversubscribe them, so at most one layer
/// may be parallel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelPlan {
    outer: ExecMode,
    inner: ExecMode,
}

impl ParallelPlan {
    /// Create a plan, rejecting a both-parallel configuration
    pub fn new(outer: ExecMode, inner: ExecMode) -> Result<Self> {
        if outer.is_parallel() && inner.is_parallel() {
            return Err(TrainError::InvalidParameter(
                "outer and inner dispatch cannot both be parallel; \
                 give the parallelism budget to one layer"
                    .to_string(),
            ));
        }
        if let ExecMode::Parallel { workers } = outer {
            if workers == 0 {
                return Err(TrainError::InvalidParameter(
                    "worker count must be positive".to_string(),
                ));
            }
        }
        if let ExecMode::Parallel { workers } = inner {
            if workers == 0 {
                return Err(TrainError::InvalidParameter(
                    "worker count must be positive".to_string(),
                ));
            }
        }
        Ok(Self { outer, inner })
    }

    /// Fully sequential plan
    pub fn sequential() -> Self {
        Self {
            outer: ExecMode::Sequential,
            inner: ExecMode::Sequential,
        }
    }

    /// Fan out across partitions with the given worker count
    pub fn across_partitions(workers: usize) -> Result<Self> {
        Self::new(ExecMode::Parallel { workers }, ExecMode::Sequential)
    }

    /// Fan out across model/recipe combinations with the given worker count
    pub fn within_partition(workers: usize) -> Result<Self> {
        Self::new(ExecMode::Sequential, ExecMode::Parallel { workers })
    }

    pub fn outer(&self) -> ExecMode {
        self.outer
    }

    pub fn inner(&self) -> ExecMode {
        self.inner
    }
}

/// Immutable configuration for one training invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    /// Experiment the run belongs to
    pub experiment: String,
    /// Run identifier within the experiment
    pub run_name: String,
    /// Granularity of the date column
    pub date_granularity: DateGranularity,
    /// Hierarchy handling for the forecast outputs
    pub forecast_approach: ForecastApproach,
    /// Train one model per partition
    pub run_local_models: bool,
    /// Train one multivariate model over all partitions; `None` lets the
    /// task resolver decide from the data and workflow table
    pub run_global_models: Option<bool>,
    /// Narrow the predictor set per recipe before tuning
    pub feature_selection: bool,
    /// Recipe identifiers in play for this run
    pub recipes: Vec<String>,
    /// Seed reset before every stochastic fit
    pub seed: u64,
    /// Keep negative forecast values instead of clipping them to zero
    pub allow_negative_forecasts: bool,
    /// Dispatch plan for the two parallelism layers
    pub parallel: ParallelPlan,
}

impl RunContext {
    /// Create a context with default flags
    pub fn new(experiment: &str, run_name: &str) -> Result<Self> {
        if experiment.is_empty() || run_name.is_empty() {
            return Err(TrainError::InvalidParameter(
                "experiment and run names must be non-empty".to_string(),
            ));
        }
        Ok(Self {
            experiment: experiment.to_string(),
            run_name: run_name.to_string(),
            date_granularity: DateGranularity::Month,
            forecast_approach: ForecastApproach::BottomsUp,
            run_local_models: true,
            run_global_models: None,
            feature_selection: false,
            recipes: vec!["R1".to_string()],
            seed: 123,
            allow_negative_forecasts: false,
            parallel: ParallelPlan::sequential(),
        })
    }

    pub fn with_granularity(mut self, granularity: DateGranularity) -> Self {
        self.date_granularity = granularity;
        self
    }

    pub fn with_approach(mut self, approach: ForecastApproach) -> Self {
        self.forecast_approach = approach;
        self
    }

    pub fn with_local_models(mut self, enabled: bool) -> Self {
        self.run_local_models = enabled;
        self
    }

    pub fn with_global_models(mut self, enabled: bool) -> Self {
        self.run_global_models = Some(enabled);
        self
    }

    pub fn with_feature_selection(mut self, enabled: bool) -> Self {
        self.feature_selection = enabled;
        self
    }

    pub fn with_recipes(mut self, recipes: Vec<String>) -> Self {
        self.recipes = recipes;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_negative_forecasts(mut self, allowed: bool) -> Self {
        self.allow_negative_forecasts = allowed;
        self
    }

    pub fn with_parallel(mut self, plan: ParallelPlan) -> Self {
        self.parallel = plan;
        self
    }

    /// Stable fingerprint of the tunable inputs
    ///
    /// A resumed run whose fingerprint differs from the persisted run log is
    /// rejected rather than silently retrained, so every input that changes
    /// what training produces must feed this hash.
    pub fn input_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("local:{};", self.run_local_models));
        hasher.update(format!("global:{:?};", self.run_global_models));
        hasher.update(format!("feature_selection:{};", self.feature_selection));
        hasher.update("recipes:");
        for recipe in &self.recipes {
            hasher.update(recipe.as_bytes());
            hasher.update(",");
        }
        hasher.update(format!(";seed:{};", self.seed));
        hex::encode(hasher.finalize())
    }

    /// Short human-readable summary of the tunable inputs, used in the
    /// conflict error message
    pub fn input_summary(&self) -> String {
        format!(
            "local={} global={:?} feature_selection={} recipes={} seed={}",
            self.run_local_models,
            self.run_global_models,
            self.feature_selection,
            self.recipes.join("+"),
            self.seed
        )
    }
}
