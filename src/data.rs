//! Partition and recipe data handling
//!
//! The training engine operates on explicit typed rows rather than raw
//! data frames. Polars is used at the edge to ingest recipe feature tables
//! from CSV files or existing `DataFrame`s; everything downstream of the
//! loader works with [`DataRow`] records.

use crate::error::{Result, TrainError};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::Path;

/// Synthetic partition identifier for the global (multivariate) model unit
pub const GLOBAL_COMBO: &str = "All-Data";

/// Reserved column names recognized by the loader
const DATE_HINTS: [&str; 2] = ["date", "time"];
const TARGET_COLUMN: &str = "target";
const COMBO_COLUMN: &str = "combo";
const ORIGIN_COLUMN: &str = "origin";
const HORIZON_COLUMN: &str = "horizon";

/// One observation of a recipe feature table
#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    /// Partition the row belongs to
    pub combo: String,
    /// Observation date
    pub date: NaiveDate,
    /// Forecast origin for multi-origin recipes
    pub origin: Option<i64>,
    /// Forecast horizon for multi-origin recipes
    pub horizon: Option<i64>,
    /// Ground-truth target; missing for future rows
    pub target: Option<f64>,
    /// Predictor values keyed by feature name
    pub features: BTreeMap<String, f64>,
}

/// All rows of one data-shaping variant (recipe) of a partition
#[derive(Debug, Clone)]
pub struct RecipeData {
    /// Recipe identifier, e.g. "R1" or "R2"
    pub recipe: String,
    /// Feature table rows
    pub rows: Vec<DataRow>,
}

impl RecipeData {
    pub fn new(recipe: &str, rows: Vec<DataRow>) -> Self {
        Self {
            recipe: recipe.to_string(),
            rows,
        }
    }

    /// Whether this recipe carries multi-origin rows
    pub fn has_horizon(&self) -> bool {
        self.rows.iter().any(|r| r.horizon.is_some())
    }

    /// Union of feature names across all rows
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        for row in &self.rows {
            for name in row.features.keys() {
                names.insert(name.clone());
            }
        }
        names.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One partition's data across all of its recipes
#[derive(Debug, Clone)]
pub struct PartitionData {
    /// Partition identifier
    pub combo: String,
    /// Recipe tables keyed by recipe identifier
    pub recipes: Vec<RecipeData>,
}

impl PartitionData {
    pub fn new(combo: &str, recipes: Vec<RecipeData>) -> Self {
        Self {
            combo: combo.to_string(),
            recipes,
        }
    }

    /// Look up one recipe's table
    pub fn recipe(&self, recipe: &str) -> Option<&RecipeData> {
        self.recipes.iter().find(|r| r.recipe == recipe)
    }

    /// Check that every required recipe identifier has a data table
    pub fn validate_recipes(&self, required: &[String]) -> Result<()> {
        for recipe in required {
            if self.recipe(recipe).is_none() {
                return Err(TrainError::DataError(format!(
                    "partition '{}' has no data for recipe '{}'",
                    self.combo, recipe
                )));
            }
        }
        Ok(())
    }
}

/// Build the synthetic All-Data partition by unioning every partition's rows
///
/// Row order across source partitions is irrelevant downstream; combo tags
/// on each row keep the constituents separable for the per-partition
/// forecast explosion.
pub fn combine_partitions(partitions: &[PartitionData]) -> PartitionData {
    let mut recipes: BTreeMap<String, Vec<DataRow>> = BTreeMap::new();
    for partition in partitions {
        for recipe in &partition.recipes {
            recipes
                .entry(recipe.recipe.clone())
                .or_default()
                .extend(recipe.rows.iter().cloned());
        }
    }
    PartitionData {
        combo: GLOBAL_COMBO.to_string(),
        recipes: recipes
            .into_iter()
            .map(|(recipe, rows)| RecipeData { recipe, rows })
            .collect(),
    }
}

/// Loader for recipe feature tables
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load rows from a CSV file; the table must carry a combo column
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<DataRow>> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;
        Self::from_dataframe(df)
    }

    /// Load rows from a CSV file for a single known partition
    pub fn from_csv_for_combo<P: AsRef<Path>>(path: P, combo: &str) -> Result<Vec<DataRow>> {
        let mut rows = Self::from_csv_allow_missing_combo(path)?;
        for row in &mut rows {
            if row.combo.is_empty() {
                row.combo = combo.to_string();
            }
        }
        Ok(rows)
    }

    fn from_csv_allow_missing_combo<P: AsRef<Path>>(path: P) -> Result<Vec<DataRow>> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;
        Self::extract_rows(df, false)
    }

    /// Convert an existing DataFrame into typed rows
    pub fn from_dataframe(df: DataFrame) -> Result<Vec<DataRow>> {
        Self::extract_rows(df, true)
    }

    fn extract_rows(df: DataFrame, require_combo: bool) -> Result<Vec<DataRow>> {
        let height = df.height();
        let date_column = Self::detect_date_column(&df)?;
        let dates = Self::column_as_dates(&df, &date_column)?;

        let combos = if Self::has_column(&df, COMBO_COLUMN) {
            Self::column_as_strings(&df, COMBO_COLUMN)?
        } else if require_combo {
            return Err(TrainError::DataError(
                "no combo column found in data".to_string(),
            ));
        } else {
            vec![String::new(); height]
        };

        let targets = if Self::has_column(&df, TARGET_COLUMN) {
            Self::column_as_opt_f64(&df, TARGET_COLUMN)?
        } else {
            vec![None; height]
        };
        let origins = if Self::has_column(&df, ORIGIN_COLUMN) {
            Self::column_as_opt_i64(&df, ORIGIN_COLUMN)?
        } else {
            vec![None; height]
        };
        let horizons = if Self::has_column(&df, HORIZON_COLUMN) {
            Self::column_as_opt_i64(&df, HORIZON_COLUMN)?
        } else {
            vec![None; height]
        };

        // Everything numeric outside the reserved columns is a feature
        let mut feature_columns: Vec<(String, Vec<Option<f64>>)> = Vec::new();
        for name in df.get_column_names() {
            let lower = name.to_lowercase();
            if lower == date_column.to_lowercase()
                || lower == TARGET_COLUMN
                || lower == COMBO_COLUMN
                || lower == ORIGIN_COLUMN
                || lower == HORIZON_COLUMN
            {
                continue;
            }
            if let Ok(values) = Self::column_as_opt_f64(&df, name) {
                feature_columns.push((name.to_string(), values));
            }
        }

        let mut rows = Vec::with_capacity(height);
        for i in 0..height {
            let date = dates[i].ok_or_else(|| {
                TrainError::DataError(format!("missing date in row {} of input data", i))
            })?;
            let mut features = BTreeMap::new();
            for (name, values) in &feature_columns {
                if let Some(value) = values[i] {
                    features.insert(name.clone(), value);
                }
            }
            rows.push(DataRow {
                combo: combos[i].clone(),
                date,
                origin: origins[i],
                horizon: horizons[i],
                target: targets[i],
                features,
            });
        }
        Ok(rows)
    }

    fn has_column(df: &DataFrame, name: &str) -> bool {
        df.get_column_names()
            .iter()
            .any(|c| c.to_lowercase() == name)
    }

    /// Detect the date column in a DataFrame
    fn detect_date_column(df: &DataFrame) -> Result<String> {
        for name in df.get_column_names() {
            let lower = name.to_lowercase();
            if DATE_HINTS.iter().any(|hint| lower.contains(hint)) {
                return Ok(name.to_string());
            }
        }
        if let Some(first_col) = df.get_columns().first() {
            if first_col.dtype().is_temporal() {
                return Ok(first_col.name().to_string());
            }
        }
        Err(TrainError::DataError(
            "no date column found in data".to_string(),
        ))
    }

    fn find_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
        let actual = df
            .get_column_names()
            .iter()
            .find(|c| c.to_lowercase() == name.to_lowercase())
            .map(|c| c.to_string())
            .ok_or_else(|| TrainError::DataError(format!("column '{}' not found", name)))?;
        Ok(df.column(&actual)?)
    }

    fn column_as_dates(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDate>>> {
        let col = Self::find_column(df, name)?;
        match col.dtype() {
            DataType::Date => Ok(col
                .date()?
                .into_iter()
                .map(|opt| {
                    opt.and_then(|days| {
                        NaiveDate::from_ymd_opt(1970, 1, 1)
                            .unwrap()
                            .checked_add_days(chrono::Days::new(days as u64))
                    })
                })
                .collect()),
            DataType::Utf8 => Ok(col
                .utf8()?
                .into_iter()
                .map(|opt| opt.and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()))
                .collect()),
            other => Err(TrainError::DataError(format!(
                "date column '{}' has unsupported type {:?}",
                name, other
            ))),
        }
    }

    fn column_as_strings(df: &DataFrame, name: &str) -> Result<Vec<String>> {
        let col = Self::find_column(df, name)?;
        match col.dtype() {
            DataType::Utf8 => Ok(col
                .utf8()?
                .into_iter()
                .map(|opt| opt.unwrap_or_default().to_string())
                .collect()),
            other => Err(TrainError::DataError(format!(
                "column '{}' cannot be read as strings (type {:?})",
                name, other
            ))),
        }
    }

    /// Read a column as f64 values, keeping nulls in place
    fn column_as_opt_f64(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
        let col = Self::find_column(df, name)?;
        match col.dtype() {
            DataType::Float64 => Ok(col.f64()?.into_iter().collect()),
            DataType::Float32 => Ok(col
                .f32()?
                .into_iter()
                .map(|v| v.map(|v| v as f64))
                .collect()),
            DataType::Int64 => Ok(col
                .i64()?
                .into_iter()
                .map(|v| v.map(|v| v as f64))
                .collect()),
            DataType::Int32 => Ok(col
                .i32()?
                .into_iter()
                .map(|v| v.map(|v| v as f64))
                .collect()),
            other => Err(TrainError::DataError(format!(
                "column '{}' cannot be converted to f64 (type {:?})",
                name, other
            ))),
        }
    }

    /// Read a column as i64 values, keeping nulls in place
    fn column_as_opt_i64(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
        let col = Self::find_column(df, name)?;
        match col.dtype() {
            DataType::Int64 => Ok(col.i64()?.into_iter().collect()),
            DataType::Int32 => Ok(col
                .i32()?
                .into_iter()
                .map(|v| v.map(|v| v as i64))
                .collect()),
            other => Err(TrainError::DataError(format!(
                "column '{}' cannot be converted to i64 (type {:?})",
                name, other
            ))),
        }
    }
}
