use chrono::{Datelike, NaiveDate};
use forecast_train::forecast::{
    assign_horizons, model_id, postprocess_rows, sanitize_forecasts, ForecastRow, ModelType,
};
use forecast_train::splits::RunType;
use rstest::rstest;

fn d(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn forecast_row(combo: &str, model: &str, fold_id: i64, date: NaiveDate, value: f64) -> ForecastRow {
    ForecastRow {
        combo: combo.to_string(),
        model_id: model_id(model, "R1"),
        model_name: model.to_string(),
        model_type: ModelType::Local,
        recipe: "R1".to_string(),
        fold_id,
        run_type: RunType::Validation,
        horizon: 0,
        date,
        forecast: value,
        hyperparameter_id: 1,
    }
}

#[test]
fn test_sanitize_worked_example() {
    let mut values = vec![5.2, -3.0, f64::NAN, f64::INFINITY, 0.0];
    sanitize_forecasts(&mut values, false);
    assert_eq!(values, vec![5.2, 0.0, 0.0, 0.0, 0.0]);
}

#[rstest]
#[case(f64::NAN, 0.0)]
#[case(f64::INFINITY, 0.0)]
#[case(f64::NEG_INFINITY, 0.0)]
#[case(-0.5, 0.0)]
#[case(0.0, 0.0)]
#[case(7.25, 7.25)]
fn test_sanitize_single_values(#[case] input: f64, #[case] expected: f64) {
    let mut values = vec![input];
    sanitize_forecasts(&mut values, false);
    assert_eq!(values, vec![expected]);
}

#[test]
fn test_sanitize_keeps_negatives_when_allowed() {
    let mut values = vec![-3.0, f64::NAN, f64::NEG_INFINITY, 4.0];
    sanitize_forecasts(&mut values, true);
    // Non-finite values still map to zero; the finite negative survives
    assert_eq!(values, vec![-3.0, 0.0, 0.0, 4.0]);
}

#[test]
fn test_postprocess_rows_applies_to_forecast_column() {
    let mut rows = vec![
        forecast_row("a", "m1", 1, d(2023, 1, 1), -1.5),
        forecast_row("a", "m1", 1, d(2023, 1, 2), f64::NAN),
        forecast_row("a", "m1", 1, d(2023, 1, 3), 2.5),
    ];
    postprocess_rows(&mut rows, false);
    assert_eq!(rows[0].forecast, 0.0);
    assert_eq!(rows[1].forecast, 0.0);
    assert_eq!(rows[2].forecast, 2.5);
}

#[test]
fn test_horizon_numbering_is_arrival_order_independent() {
    let build = |order: &[usize]| {
        // Two combos x two folds, dates deliberately out of order
        let base = vec![
            forecast_row("a", "m1", 1, d(2023, 1, 3), 1.0),
            forecast_row("a", "m1", 1, d(2023, 1, 1), 1.0),
            forecast_row("a", "m1", 1, d(2023, 1, 2), 1.0),
            forecast_row("a", "m1", 2, d(2023, 2, 1), 1.0),
            forecast_row("b", "m1", 1, d(2023, 1, 2), 1.0),
            forecast_row("b", "m1", 1, d(2023, 1, 1), 1.0),
        ];
        let mut rows: Vec<ForecastRow> = order.iter().map(|&i| base[i].clone()).collect();
        assign_horizons(&mut rows);
        rows
    };

    for order in [vec![0, 1, 2, 3, 4, 5], vec![5, 3, 1, 4, 0, 2]] {
        let rows = build(&order);
        for row in &rows {
            let expected = match (row.combo.as_str(), row.fold_id, row.date.day()) {
                ("a", 1, 1) => 1,
                ("a", 1, 2) => 2,
                ("a", 1, 3) => 3,
                ("a", 2, 1) => 1,
                ("b", 1, 1) => 1,
                ("b", 1, 2) => 2,
                _ => panic!("unexpected row"),
            };
            assert_eq!(row.horizon, expected, "row {:?}", row);
        }
    }
}

#[test]
fn test_horizon_numbering_has_no_gaps() {
    let mut rows: Vec<ForecastRow> = (0..10u32)
        .rev()
        .map(|i| forecast_row("a", "m1", 7, d(2023, 3, 1 + i), 1.0))
        .collect();
    assign_horizons(&mut rows);
    let mut horizons: Vec<i64> = rows.iter().map(|r| r.horizon).collect();
    horizons.sort_unstable();
    assert_eq!(horizons, (1..=10).collect::<Vec<i64>>());
}
