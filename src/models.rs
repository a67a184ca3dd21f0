//! Baseline model implementations
//!
//! These are deliberately small models that exercise the trainable-workflow
//! capability end to end: `window_average` is tuned through a plain
//! hyperparameter, `bootstrap_mean` is stochastic and must reproduce from
//! the seed it is handed, and `least_squares` consumes the predictor set so
//! feature selection has something to narrow. Production models plug in
//! through the same [`TrainableModel`] trait.

use crate::data::DataRow;
use crate::error::{Result, TrainError};
use crate::workflow::{FittedModel, HyperparameterSet, ModelRegistry, TrainableModel};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry pre-loaded with the baseline models
pub fn baseline_registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry.register(Arc::new(WindowAverage));
    registry.register(Arc::new(BootstrapMean));
    registry.register(Arc::new(LeastSquares));
    registry
}

/// Target history per partition, date-ordered, missing targets dropped
fn targets_by_combo(rows: &[&DataRow]) -> BTreeMap<String, Vec<(NaiveDate, f64)>> {
    let mut by_combo: BTreeMap<String, Vec<(NaiveDate, f64)>> = BTreeMap::new();
    for row in rows {
        if let Some(target) = row.target {
            by_combo
                .entry(row.combo.clone())
                .or_default()
                .push((row.date, target));
        }
    }
    for history in by_combo.values_mut() {
        history.sort_by_key(|(date, _)| *date);
    }
    by_combo
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Forecasts the mean of the last `window` observations per partition
#[derive(Debug, Clone)]
pub struct WindowAverage;

#[derive(Debug)]
pub struct FittedWindowAverage {
    window: usize,
    levels: BTreeMap<String, f64>,
    fallback: f64,
}

impl TrainableModel for WindowAverage {
    fn name(&self) -> &str {
        "window_average"
    }

    fn fit(
        &self,
        rows: &[&DataRow],
        _features: &[String],
        params: &HyperparameterSet,
        _seed: u64,
    ) -> Result<Box<dyn FittedModel>> {
        let window = params.get("window").unwrap_or(4.0);
        if window < 1.0 {
            return Err(TrainError::InvalidParameter(
                "window must be at least 1".to_string(),
            ));
        }
        let window = window as usize;

        let mut levels = BTreeMap::new();
        let mut all_targets = Vec::new();
        for (combo, history) in targets_by_combo(rows) {
            let tail: Vec<f64> = history
                .iter()
                .rev()
                .take(window)
                .map(|(_, target)| *target)
                .collect();
            if tail.is_empty() {
                continue;
            }
            levels.insert(combo, mean(&tail));
            all_targets.extend(tail);
        }
        if levels.is_empty() {
            return Err(TrainError::TrainingError(
                "no target-bearing rows to train on".to_string(),
            ));
        }
        let fallback = mean(&all_targets);
        Ok(Box::new(FittedWindowAverage {
            window,
            levels,
            fallback,
        }))
    }
}

impl FittedModel for FittedWindowAverage {
    fn predict(&self, rows: &[&DataRow], _features: &[String]) -> Result<Vec<f64>> {
        Ok(rows
            .iter()
            .map(|row| *self.levels.get(&row.combo).unwrap_or(&self.fallback))
            .collect())
    }

    fn artifact(&self) -> serde_json::Value {
        serde_json::json!({
            "model": "window_average",
            "window": self.window,
            "levels": self.levels,
        })
    }
}

/// Forecasts a bootstrap estimate of the per-partition mean
///
/// The only stochastic baseline: resampling is driven entirely by the seed
/// passed to `fit`, so repeated runs with the same seed reproduce bit for
/// bit regardless of dispatch order.
#[derive(Debug, Clone)]
pub struct BootstrapMean;

#[derive(Debug)]
pub struct FittedBootstrapMean {
    resamples: usize,
    levels: BTreeMap<String, f64>,
    fallback: f64,
}

impl TrainableModel for BootstrapMean {
    fn name(&self) -> &str {
        "bootstrap_mean"
    }

    fn fit(
        &self,
        rows: &[&DataRow],
        _features: &[String],
        params: &HyperparameterSet,
        seed: u64,
    ) -> Result<Box<dyn FittedModel>> {
        let resamples = params.get("resamples").unwrap_or(20.0);
        if resamples < 1.0 {
            return Err(TrainError::InvalidParameter(
                "resamples must be at least 1".to_string(),
            ));
        }
        let resamples = resamples as usize;
        let mut rng = StdRng::seed_from_u64(seed);

        let mut levels = BTreeMap::new();
        let mut all_means = Vec::new();
        for (combo, history) in targets_by_combo(rows) {
            let targets: Vec<f64> = history.iter().map(|(_, target)| *target).collect();
            if targets.is_empty() {
                continue;
            }
            let mut estimates = Vec::with_capacity(resamples);
            for _ in 0..resamples {
                let sample: Vec<f64> = (0..targets.len())
                    .map(|_| targets[rng.gen_range(0..targets.len())])
                    .collect();
                estimates.push(mean(&sample));
            }
            let level = mean(&estimates);
            levels.insert(combo, level);
            all_means.push(level);
        }
        if levels.is_empty() {
            return Err(TrainError::TrainingError(
                "no target-bearing rows to train on".to_string(),
            ));
        }
        let fallback = mean(&all_means);
        Ok(Box::new(FittedBootstrapMean {
            resamples,
            levels,
            fallback,
        }))
    }
}

impl FittedModel for FittedBootstrapMean {
    fn predict(&self, rows: &[&DataRow], _features: &[String]) -> Result<Vec<f64>> {
        Ok(rows
            .iter()
            .map(|row| *self.levels.get(&row.combo).unwrap_or(&self.fallback))
            .collect())
    }

    fn artifact(&self) -> serde_json::Value {
        serde_json::json!({
            "model": "bootstrap_mean",
            "resamples": self.resamples,
            "levels": self.levels,
        })
    }
}

/// Averaged univariate least-squares regression over the predictor set
///
/// Fits target ~ a + b*x separately for each feature and averages the
/// per-feature predictions. A shrinkage penalty on the slopes is the
/// tunable hyperparameter. Works across partitions, so it doubles as the
/// global-capable baseline.
#[derive(Debug, Clone)]
pub struct LeastSquares;

#[derive(Debug)]
pub struct FittedLeastSquares {
    penalty: f64,
    coefficients: BTreeMap<String, (f64, f64)>,
    fallback: f64,
}

impl TrainableModel for LeastSquares {
    fn name(&self) -> &str {
        "least_squares"
    }

    fn fit(
        &self,
        rows: &[&DataRow],
        features: &[String],
        params: &HyperparameterSet,
        _seed: u64,
    ) -> Result<Box<dyn FittedModel>> {
        let penalty = params.get("penalty").unwrap_or(0.0);
        if penalty < 0.0 {
            return Err(TrainError::InvalidParameter(
                "penalty must be non-negative".to_string(),
            ));
        }

        let mut coefficients = BTreeMap::new();
        let mut all_targets = Vec::new();
        for row in rows {
            if let Some(target) = row.target {
                all_targets.push(target);
            }
        }
        if all_targets.is_empty() {
            return Err(TrainError::TrainingError(
                "no target-bearing rows to train on".to_string(),
            ));
        }

        for feature in features {
            let pairs: Vec<(f64, f64)> = rows
                .iter()
                .filter_map(|row| {
                    let x = row.features.get(feature)?;
                    let y = row.target?;
                    Some((*x, y))
                })
                .collect();
            if pairs.len() < 2 {
                continue;
            }
            let n = pairs.len() as f64;
            let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
            let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
            let ss_xy: f64 = pairs
                .iter()
                .map(|(x, y)| (x - mean_x) * (y - mean_y))
                .sum();
            let ss_xx: f64 = pairs.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
            if ss_xx == 0.0 {
                continue;
            }
            let slope = (ss_xy / ss_xx) / (1.0 + penalty);
            let intercept = mean_y - slope * mean_x;
            coefficients.insert(feature.clone(), (intercept, slope));
        }

        Ok(Box::new(FittedLeastSquares {
            penalty,
            coefficients,
            fallback: mean(&all_targets),
        }))
    }
}

impl FittedModel for FittedLeastSquares {
    fn predict(&self, rows: &[&DataRow], features: &[String]) -> Result<Vec<f64>> {
        Ok(rows
            .iter()
            .map(|row| {
                let mut predictions = Vec::new();
                for feature in features {
                    if let (Some((intercept, slope)), Some(x)) =
                        (self.coefficients.get(feature), row.features.get(feature))
                    {
                        predictions.push(intercept + slope * x);
                    }
                }
                if predictions.is_empty() {
                    self.fallback
                } else {
                    mean(&predictions)
                }
            })
            .collect())
    }

    fn artifact(&self) -> serde_json::Value {
        let coefficients: BTreeMap<String, Vec<f64>> = self
            .coefficients
            .iter()
            .map(|(name, (intercept, slope))| (name.clone(), vec![*intercept, *slope]))
            .collect();
        serde_json::json!({
            "model": "least_squares",
            "penalty": self.penalty,
            "coefficients": coefficients,
        })
    }
}
