use assert_approx_eq::assert_approx_eq;
use chrono::NaiveDate;
use forecast_train::data::DataRow;
use forecast_train::models::baseline_registry;
use forecast_train::workflow::HyperparameterSet;
use std::collections::BTreeMap;

fn d(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn row(combo: &str, date: NaiveDate, target: Option<f64>) -> DataRow {
    DataRow {
        combo: combo.to_string(),
        date,
        origin: None,
        horizon: None,
        target,
        features: BTreeMap::new(),
    }
}

fn row_with_feature(combo: &str, date: NaiveDate, target: Option<f64>, x: f64) -> DataRow {
    let mut features = BTreeMap::new();
    features.insert("x".to_string(), x);
    DataRow {
        combo: combo.to_string(),
        date,
        origin: None,
        horizon: None,
        target,
        features,
    }
}

fn params(pairs: &[(&str, f64)]) -> HyperparameterSet {
    HyperparameterSet {
        id: 1,
        values: pairs
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect(),
    }
}

#[test]
fn test_window_average_levels_per_combo() {
    let data: Vec<DataRow> = (1..=6)
        .map(|i| row("a", d(2023, 1, i), Some(i as f64)))
        .collect();
    let refs: Vec<&DataRow> = data.iter().collect();

    let registry = baseline_registry();
    let model = registry.get("window_average").unwrap();
    let fitted = model
        .fit(&refs, &[], &params(&[("window", 2.0)]), 42)
        .unwrap();

    // Mean of the last two observations
    let future = vec![row("a", d(2023, 1, 7), None)];
    let future_refs: Vec<&DataRow> = future.iter().collect();
    let predictions = fitted.predict(&future_refs, &[]).unwrap();
    assert_approx_eq!(predictions[0], 5.5);

    // Unknown combos fall back to the overall level
    let unknown = vec![row("z", d(2023, 1, 7), None)];
    let unknown_refs: Vec<&DataRow> = unknown.iter().collect();
    let predictions = fitted.predict(&unknown_refs, &[]).unwrap();
    assert_approx_eq!(predictions[0], 5.5);
}

#[test]
fn test_window_average_rejects_bad_window() {
    let data = vec![row("a", d(2023, 1, 1), Some(1.0))];
    let refs: Vec<&DataRow> = data.iter().collect();
    let registry = baseline_registry();
    let model = registry.get("window_average").unwrap();
    assert!(model
        .fit(&refs, &[], &params(&[("window", 0.0)]), 42)
        .is_err());
}

#[test]
fn test_bootstrap_mean_reproduces_from_seed() {
    let data: Vec<DataRow> = (1..=20)
        .map(|i| row("a", d(2023, 1, i), Some((i % 7) as f64)))
        .collect();
    let refs: Vec<&DataRow> = data.iter().collect();
    let future = vec![row("a", d(2023, 2, 1), None)];
    let future_refs: Vec<&DataRow> = future.iter().collect();

    let registry = baseline_registry();
    let model = registry.get("bootstrap_mean").unwrap();
    let grid = params(&[("resamples", 50.0)]);

    let first = model.fit(&refs, &[], &grid, 99).unwrap();
    let second = model.fit(&refs, &[], &grid, 99).unwrap();
    let a = first.predict(&future_refs, &[]).unwrap();
    let b = second.predict(&future_refs, &[]).unwrap();
    assert_eq!(a, b);

    // The bootstrap estimate stays inside the observed target range
    assert!(a[0] >= 0.0 && a[0] <= 6.0);
}

#[test]
fn test_least_squares_recovers_linear_relationship() {
    let data: Vec<DataRow> = (1..=10)
        .map(|i| row_with_feature("a", d(2023, 1, i), Some(2.0 * i as f64 + 1.0), i as f64))
        .collect();
    let refs: Vec<&DataRow> = data.iter().collect();
    let features = vec!["x".to_string()];

    let registry = baseline_registry();
    let model = registry.get("least_squares").unwrap();
    let fitted = model
        .fit(&refs, &features, &params(&[("penalty", 0.0)]), 42)
        .unwrap();

    let future = vec![row_with_feature("a", d(2023, 2, 1), None, 12.0)];
    let future_refs: Vec<&DataRow> = future.iter().collect();
    let predictions = fitted.predict(&future_refs, &features).unwrap();
    assert_approx_eq!(predictions[0], 25.0, 1e-9);

    // Shrinkage pulls the slope toward zero
    let shrunk = model
        .fit(&refs, &features, &params(&[("penalty", 1.0)]), 42)
        .unwrap();
    let shrunk_predictions = shrunk.predict(&future_refs, &features).unwrap();
    assert!(shrunk_predictions[0] < predictions[0]);
}

#[test]
fn test_fit_fails_without_targets() {
    let data = vec![row("a", d(2023, 1, 1), None)];
    let refs: Vec<&DataRow> = data.iter().collect();
    let registry = baseline_registry();
    for name in ["window_average", "bootstrap_mean", "least_squares"] {
        let model = registry.get(name).unwrap();
        assert!(
            model.fit(&refs, &[], &params(&[]), 42).is_err(),
            "{} should fail on target-free data",
            name
        );
    }
}
