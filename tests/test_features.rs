use chrono::NaiveDate;
use forecast_train::data::{DataRow, RecipeData};
use forecast_train::error::Result;
use forecast_train::features::{
    gate_applies, select_unit_features, CorrelationRank, FeatureSelector,
};
use forecast_train::splits::{FoldBoundary, RunType};
use forecast_train::workflow::WorkflowSpec;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

fn d(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Target tracks "signal" exactly; "noise" alternates independently
fn informative_recipe() -> RecipeData {
    let rows = (1..=12)
        .map(|i| {
            let mut features = BTreeMap::new();
            features.insert("signal".to_string(), i as f64);
            features.insert("noise".to_string(), if i % 2 == 0 { 1.0 } else { -1.0 });
            DataRow {
                combo: "a".to_string(),
                date: d(2023, 1, i),
                origin: None,
                horizon: None,
                target: Some(3.0 * i as f64),
                features,
            }
        })
        .collect();
    RecipeData::new("R1", rows)
}

fn boundaries() -> Vec<FoldBoundary> {
    vec![FoldBoundary::new(
        1,
        RunType::Validation,
        d(2023, 1, 10),
        d(2023, 1, 12),
    )]
}

#[derive(Debug, Default)]
struct CountingSelector {
    calls: AtomicUsize,
}

impl FeatureSelector for CountingSelector {
    fn select(&self, _data: &RecipeData, _boundaries: &[FoldBoundary]) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec!["signal".to_string()])
    }
}

#[test]
fn test_correlation_rank_picks_the_informative_feature() {
    let selector = CorrelationRank::new(1).unwrap();
    let selected = selector.select(&informative_recipe(), &boundaries()).unwrap();
    assert_eq!(selected, vec!["signal".to_string()]);
}

#[test]
fn test_correlation_rank_rejects_zero_budget() {
    assert!(CorrelationRank::new(0).is_err());
}

#[test]
fn test_gate_applies_requires_flag_and_eligible_model() {
    let eligible = vec![WorkflowSpec::new("m1", "R1").with_feature_selection(true)];
    let ineligible = vec![WorkflowSpec::new("m1", "R1")];

    assert!(gate_applies(true, &eligible));
    assert!(!gate_applies(false, &eligible));
    assert!(!gate_applies(true, &ineligible));
}

#[test]
fn test_selector_runs_once_per_recipe() {
    let selector = CountingSelector::default();
    let recipes = vec![informative_recipe()];
    // Three models share one recipe; two are eligible
    let workflows = vec![
        WorkflowSpec::new("m1", "R1").with_feature_selection(true),
        WorkflowSpec::new("m2", "R1").with_feature_selection(true),
        WorkflowSpec::new("m3", "R1"),
    ];

    let selected =
        select_unit_features(&selector, &recipes, &workflows, &boundaries(), true).unwrap();
    assert_eq!(selector.calls.load(Ordering::SeqCst), 1);
    assert_eq!(selected.len(), 1);
    assert_eq!(selected["R1"], vec!["signal".to_string()]);
}

#[test]
fn test_gate_skipped_when_no_model_is_eligible() {
    let selector = CountingSelector::default();
    let recipes = vec![informative_recipe()];
    let workflows = vec![WorkflowSpec::new("m1", "R1")];

    let selected =
        select_unit_features(&selector, &recipes, &workflows, &boundaries(), true).unwrap();
    assert!(selected.is_empty());
    assert_eq!(selector.calls.load(Ordering::SeqCst), 0);
}
