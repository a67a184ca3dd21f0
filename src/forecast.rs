//! Forecast rows, sanitization, and horizon numbering

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::splits::RunType;

/// Whether a forecast came from a per-partition or a multivariate fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelType {
    Local,
    Global,
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelType::Local => write!(f, "local"),
            ModelType::Global => write!(f, "global"),
        }
    }
}

/// One forecasted value, joined back to its partition, model and fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub combo: String,
    pub model_id: String,
    pub model_name: String,
    pub model_type: ModelType,
    pub recipe: String,
    pub fold_id: i64,
    pub run_type: RunType,
    /// 1-based position within the fold's evaluation window; derived by
    /// [`assign_horizons`], never taken from dispatch order
    pub horizon: i64,
    pub date: NaiveDate,
    pub forecast: f64,
    pub hyperparameter_id: i64,
}

/// Composite model identifier for a (model, recipe) pair
pub fn model_id(model_name: &str, recipe: &str) -> String {
    format!("{}--{}", model_name, recipe)
}

/// Replace non-finite forecast values with zero, then clip negatives
///
/// Sanitize-before-clip matters: a NaN must become 0 via the missing-value
/// path, not survive a negative-value comparison.
pub fn sanitize_forecasts(values: &mut [f64], allow_negative: bool) {
    for value in values.iter_mut() {
        if !value.is_finite() {
            *value = 0.0;
        }
    }
    if !allow_negative {
        for value in values.iter_mut() {
            if *value < 0.0 {
                *value = 0.0;
            }
        }
    }
}

/// Apply forecast sanitization to assembled rows
pub fn postprocess_rows(rows: &mut [ForecastRow], allow_negative: bool) {
    for row in rows.iter_mut() {
        let mut value = [row.forecast];
        sanitize_forecasts(&mut value, allow_negative);
        row.forecast = value[0];
    }
}

/// Number horizons 1..n within each (combo, model, fold) group by date order
///
/// Aggregated rows arrive in whatever order the dispatch layers finished,
/// so the ordinal is recomputed from scratch here.
pub fn assign_horizons(rows: &mut [ForecastRow]) {
    let mut groups: BTreeMap<(String, String, i64), Vec<usize>> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        groups
            .entry((row.combo.clone(), row.model_id.clone(), row.fold_id))
            .or_default()
            .push(i);
    }
    for indices in groups.values_mut() {
        indices.sort_by_key(|&i| rows[i].date);
        for (position, &i) in indices.iter().enumerate() {
            rows[i].horizon = position as i64 + 1;
        }
    }
}
