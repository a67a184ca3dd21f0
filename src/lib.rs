//! # Forecast Train
//!
//! A Rust library for training forecasting models across many independent
//! time series partitions, with optional global (multivariate) training
//! over all partitions combined.
//!
//! ## Features
//!
//! - Resumable task resolution: only partitions without a persisted
//!   forecast artifact are trained, and a re-run with changed inputs is
//!   rejected instead of silently retraining
//! - Two nested dispatch layers (across partitions, and across
//!   model/recipe combinations within a partition) sharing one
//!   parallelism budget
//! - Leakage-safe walk-forward splits, including single-origin evaluation
//!   for multi-horizon recipes
//! - Grid search with best-by-RMSE selection and per-fold refits
//! - Conditional feature selection with per-recipe caching
//! - Post-run completion audit reconciling expected vs. persisted outputs
//!
//! ## Quick Start
//!
//! ```no_run
//! use forecast_train::context::RunContext;
//! use forecast_train::data::{DataLoader, PartitionData, RecipeData};
//! use forecast_train::features::CorrelationRank;
//! use forecast_train::models::baseline_registry;
//! use forecast_train::splits::{FoldBoundary, RunType};
//! use forecast_train::store::LocalStore;
//! use forecast_train::train::{run_training, TrainingInputs};
//! use forecast_train::workflow::WorkflowSpec;
//! use chrono::NaiveDate;
//!
//! # fn main() -> forecast_train::error::Result<()> {
//! let ctx = RunContext::new("demand", "2024-06")?;
//! let rows = DataLoader::from_csv("prepared/demand.csv")?;
//! let inputs = TrainingInputs {
//!     partitions: vec![PartitionData::new("store_1", vec![RecipeData::new("R1", rows)])],
//!     workflows: vec![WorkflowSpec::new("window_average", "R1")],
//!     grids: Vec::new(),
//!     boundaries: vec![FoldBoundary::new(
//!         1,
//!         RunType::Validation,
//!         NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
//!         NaiveDate::from_ymd_opt(2024, 4, 30).unwrap(),
//!     )],
//! };
//! let store = LocalStore::new("artifacts");
//! let registry = baseline_registry();
//! let selector = CorrelationRank::new(25)?;
//! let summary = run_training(&ctx, &inputs, &registry, &selector, &store)?;
//! println!("trained {} units", summary.trained.len());
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod data;
pub mod dispatch;
pub mod error;
pub mod features;
pub mod forecast;
pub mod metrics;
pub mod models;
pub mod resolver;
pub mod splits;
pub mod store;
pub mod train;
pub mod tuner;
pub mod verify;
pub mod workflow;

// Re-export commonly used types
pub use crate::context::{DateGranularity, ExecMode, ForecastApproach, ParallelPlan, RunContext};
pub use crate::data::{DataLoader, DataRow, PartitionData, RecipeData, GLOBAL_COMBO};
pub use crate::error::{Result, TrainError};
pub use crate::forecast::{ForecastRow, ModelType};
pub use crate::splits::{FoldBoundary, RunType};
pub use crate::store::{ArtifactStore, LocalStore};
pub use crate::train::{run_training, TrainingInputs, TrainingSummary};
pub use crate::workflow::{HyperparameterGrid, ModelRegistry, WorkflowSpec};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
