//! Train two partitions end to end against a local artifact store

use chrono::NaiveDate;
use forecast_train::context::RunContext;
use forecast_train::data::{DataRow, PartitionData, RecipeData};
use forecast_train::features::CorrelationRank;
use forecast_train::models::baseline_registry;
use forecast_train::splits::{FoldBoundary, RunType};
use forecast_train::store::LocalStore;
use forecast_train::train::{run_training, TrainingInputs};
use forecast_train::workflow::{HyperparameterGrid, WorkflowSpec};
use std::collections::BTreeMap;

fn partition(combo: &str, base: f64) -> PartitionData {
    let rows = (1..=12)
        .map(|month| {
            let mut features = BTreeMap::new();
            features.insert("promo".to_string(), month as f64);
            DataRow {
                combo: combo.to_string(),
                date: NaiveDate::from_ymd_opt(2023, month, 1).unwrap(),
                origin: None,
                horizon: None,
                target: Some(base + 2.0 * month as f64),
                features,
            }
        })
        .collect();
    PartitionData::new(combo, vec![RecipeData::new("R1", rows)])
}

fn main() {
    let ctx = RunContext::new("demand_demo", "2024-01").expect("valid run context");

    let inputs = TrainingInputs {
        partitions: vec![partition("store_a", 10.0), partition("store_b", 20.0)],
        workflows: vec![
            WorkflowSpec::new("window_average", "R1"),
            WorkflowSpec::new("least_squares", "R1").with_global_support(true),
        ],
        grids: vec![HyperparameterGrid::new(
            "window_average",
            "R1",
            vec![
                BTreeMap::from([("window".to_string(), 2.0)]),
                BTreeMap::from([("window".to_string(), 4.0)]),
            ],
        )],
        boundaries: vec![
            FoldBoundary::new(
                1,
                RunType::Validation,
                NaiveDate::from_ymd_opt(2023, 8, 1).unwrap(),
                NaiveDate::from_ymd_opt(2023, 10, 1).unwrap(),
            ),
            FoldBoundary::new(
                2,
                RunType::Test,
                NaiveDate::from_ymd_opt(2023, 10, 1).unwrap(),
                NaiveDate::from_ymd_opt(2023, 12, 1).unwrap(),
            ),
        ],
    };

    let artifacts = std::env::temp_dir().join("forecast_train_demo");
    let store = LocalStore::new(&artifacts);
    let registry = baseline_registry();
    let selector = CorrelationRank::new(10).expect("valid selector budget");

    let summary = run_training(&ctx, &inputs, &registry, &selector, &store)
        .expect("training run should succeed");

    if summary.up_to_date {
        println!("Run already complete; nothing to train.");
    } else {
        println!("Trained units: {:?}", summary.trained);
    }
    println!(
        "Completion: {}/{} (skipped {})",
        summary.completion.actual, summary.completion.expected, summary.skipped
    );
    println!("Artifacts under {}", artifacts.display());
}
