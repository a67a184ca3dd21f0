use assert_approx_eq::assert_approx_eq;
use chrono::NaiveDate;
use forecast_train::context::RunContext;
use forecast_train::data::{DataRow, RecipeData};
use forecast_train::forecast::ModelType;
use forecast_train::models::baseline_registry;
use forecast_train::splits::{FoldBoundary, RunType};
use forecast_train::tuner::tune_and_forecast;
use forecast_train::workflow::{HyperparameterGrid, WorkflowSpec};
use std::collections::BTreeMap;

fn d(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn row(date: NaiveDate, target: f64) -> DataRow {
    DataRow {
        combo: "a".to_string(),
        date,
        origin: None,
        horizon: None,
        target: Some(target),
        features: BTreeMap::new(),
    }
}

/// Rising daily series: a short window tracks it, a long window lags it
fn rising_series() -> RecipeData {
    let rows = (1..=12).map(|i| row(d(2023, 1, i), i as f64)).collect();
    RecipeData::new("R1", rows)
}

fn boundaries() -> Vec<FoldBoundary> {
    vec![
        FoldBoundary::new(1, RunType::Validation, d(2023, 1, 8), d(2023, 1, 10)),
        FoldBoundary::new(2, RunType::Test, d(2023, 1, 10), d(2023, 1, 12)),
    ]
}

fn window_grid(windows: &[f64]) -> HyperparameterGrid {
    HyperparameterGrid::new(
        "window_average",
        "R1",
        windows
            .iter()
            .map(|w| BTreeMap::from([("window".to_string(), *w)]))
            .collect(),
    )
}

fn run_tuner(grid: &HyperparameterGrid) -> forecast_train::tuner::TunerOutput {
    let ctx = RunContext::new("exp", "run").unwrap();
    let registry = baseline_registry();
    let workflow = WorkflowSpec::new("window_average", "R1");
    tune_and_forecast(
        &ctx,
        "a",
        ModelType::Local,
        &workflow,
        &rising_series(),
        &[],
        Some(grid),
        &registry,
        &boundaries(),
    )
    .unwrap()
}

#[test]
fn test_grid_search_selects_minimum_rmse() {
    // Grid order [8, 1]: the short window wins on the validation fold
    let output = run_tuner(&window_grid(&[8.0, 1.0]));
    assert_eq!(output.model.hyperparameter_id, 2);
    assert!(output
        .forecasts
        .iter()
        .all(|r| r.hyperparameter_id == 2));
}

#[test]
fn test_refit_covers_every_fold() {
    let output = run_tuner(&window_grid(&[8.0, 1.0]));

    // Validation fold evaluates Jan 9-10, test fold Jan 11-12
    let validation: Vec<_> = output
        .forecasts
        .iter()
        .filter(|r| r.run_type == RunType::Validation)
        .collect();
    let test: Vec<_> = output
        .forecasts
        .iter()
        .filter(|r| r.run_type == RunType::Test)
        .collect();
    assert_eq!(validation.len(), 2);
    assert_eq!(test.len(), 2);

    // window=1 forecasts the last observed value at each cutoff
    for row in validation {
        assert_approx_eq!(row.forecast, 8.0);
    }
    for row in test {
        assert_approx_eq!(row.forecast, 10.0);
    }
}

#[test]
fn test_tie_break_keeps_first_combination() {
    // Identical combinations tie exactly; the scan keeps the earlier one
    let output = run_tuner(&window_grid(&[3.0, 3.0]));
    assert_eq!(output.model.hyperparameter_id, 1);
}

#[test]
fn test_single_combination_grid_skips_search() {
    let grid = HyperparameterGrid::single(
        "window_average",
        "R1",
        BTreeMap::from([("window".to_string(), 2.0)]),
    );
    let output = run_tuner(&grid);
    assert_eq!(output.model.hyperparameter_id, 1);
}

#[test]
fn test_missing_grid_defaults_to_one_combination() {
    let ctx = RunContext::new("exp", "run").unwrap();
    let registry = baseline_registry();
    let workflow = WorkflowSpec::new("window_average", "R1");
    let output = tune_and_forecast(
        &ctx,
        "a",
        ModelType::Local,
        &workflow,
        &rising_series(),
        &[],
        None,
        &registry,
        &boundaries(),
    )
    .unwrap();
    assert_eq!(output.model.hyperparameter_id, 1);
}

#[test]
fn test_multi_combination_grid_requires_validation_folds() {
    let ctx = RunContext::new("exp", "run").unwrap();
    let registry = baseline_registry();
    let workflow = WorkflowSpec::new("window_average", "R1");
    let test_only = vec![FoldBoundary::new(
        1,
        RunType::Test,
        d(2023, 1, 10),
        d(2023, 1, 12),
    )];
    let result = tune_and_forecast(
        &ctx,
        "a",
        ModelType::Local,
        &workflow,
        &rising_series(),
        &[],
        Some(&window_grid(&[2.0, 4.0])),
        &registry,
        &test_only,
    );
    assert!(result.is_err());
}

#[test]
fn test_negative_forecasts_clipped_by_default() {
    let rows = (1..=12).map(|i| row(d(2023, 1, i), -5.0)).collect();
    let data = RecipeData::new("R1", rows);
    let registry = baseline_registry();
    let workflow = WorkflowSpec::new("window_average", "R1");

    let ctx = RunContext::new("exp", "run").unwrap();
    let clipped = tune_and_forecast(
        &ctx,
        "a",
        ModelType::Local,
        &workflow,
        &data,
        &[],
        None,
        &registry,
        &boundaries(),
    )
    .unwrap();
    assert!(clipped.forecasts.iter().all(|r| r.forecast == 0.0));

    let ctx = RunContext::new("exp", "run")
        .unwrap()
        .with_negative_forecasts(true);
    let kept = tune_and_forecast(
        &ctx,
        "a",
        ModelType::Local,
        &workflow,
        &data,
        &[],
        None,
        &registry,
        &boundaries(),
    )
    .unwrap();
    assert!(kept.forecasts.iter().all(|r| r.forecast == -5.0));
}
