//! Walk-forward resampling splits
//!
//! A fold boundary table defines rolling train/evaluation cutoffs. The split
//! builder turns one partition's recipe rows plus that table into labeled
//! index splits: training (analysis) rows never postdate the cutoff, and
//! evaluation (assessment) rows always do. Multi-origin recipes additionally
//! restrict evaluation to the single forecast origin right after the
//! training cutoff, so later origins never leak into an earlier fold.

use crate::data::RecipeData;
use crate::error::{Result, TrainError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// What a fold's evaluation window is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunType {
    /// Steers hyperparameter selection
    Validation,
    /// Held-out evaluation
    Test,
    /// Forecast window past the last observed target
    Future,
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunType::Validation => write!(f, "Validation"),
            RunType::Test => write!(f, "Test"),
            RunType::Future => write!(f, "Future"),
        }
    }
}

/// One row of the fold boundary table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldBoundary {
    /// Train/test identifier, unique within the table
    pub id: i64,
    /// How the fold's assessment window is used
    pub run_type: RunType,
    /// Last date included in training
    pub train_end: NaiveDate,
    /// Last date included in evaluation
    pub test_end: NaiveDate,
}

impl FoldBoundary {
    pub fn new(id: i64, run_type: RunType, train_end: NaiveDate, test_end: NaiveDate) -> Self {
        Self {
            id,
            run_type,
            train_end,
            test_end,
        }
    }
}

/// Check boundary table invariants: ordered windows and unique fold ids
pub fn validate_boundaries(boundaries: &[FoldBoundary]) -> Result<()> {
    if boundaries.is_empty() {
        return Err(TrainError::InvalidParameter(
            "fold boundary table is empty".to_string(),
        ));
    }
    let mut seen = BTreeSet::new();
    for boundary in boundaries {
        if boundary.train_end >= boundary.test_end {
            return Err(TrainError::InvalidParameter(format!(
                "fold {} has train_end {} not before test_end {}",
                boundary.id, boundary.train_end, boundary.test_end
            )));
        }
        if !seen.insert(boundary.id) {
            return Err(TrainError::InvalidParameter(format!(
                "fold id {} appears more than once in the boundary table",
                boundary.id
            )));
        }
    }
    Ok(())
}

/// Row-index split for one fold
#[derive(Debug, Clone)]
pub struct Split {
    /// Fold the split was built from
    pub fold_id: i64,
    /// Run type of that fold
    pub run_type: RunType,
    /// Training row indices
    pub analysis: Vec<usize>,
    /// Evaluation row indices
    pub assessment: Vec<usize>,
}

/// Build one split per boundary row
///
/// Splits are ephemeral: constructed fresh per tuning invocation and indexed
/// into the recipe's row vector, which must not be reordered while they are
/// in use.
pub fn build_splits(data: &RecipeData, boundaries: &[FoldBoundary]) -> Result<Vec<Split>> {
    validate_boundaries(boundaries)?;
    let multi_origin = data.has_horizon();
    boundaries
        .iter()
        .map(|boundary| build_split(data, boundary, multi_origin))
        .collect()
}

fn build_split(data: &RecipeData, boundary: &FoldBoundary, multi_origin: bool) -> Result<Split> {
    let analysis: Vec<usize> = data
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| row.date <= boundary.train_end)
        .map(|(i, _)| i)
        .collect();

    let in_window = |date: NaiveDate| date > boundary.train_end && date <= boundary.test_end;

    let assessment: Vec<usize> = if multi_origin {
        // A multi-origin table holds rows for every (origin, horizon) pair.
        // Only the origin immediately after the training cutoff is a fair
        // evaluation of this fold; rows from earlier origins that happen to
        // land in the window were forecast with less training data.
        let next_origin = analysis
            .iter()
            .filter_map(|&i| {
                let row = &data.rows[i];
                if row.horizon == Some(1) {
                    row.origin
                } else {
                    None
                }
            })
            .max()
            .map(|max_origin| max_origin + 1);
        match next_origin {
            Some(origin) => data
                .rows
                .iter()
                .enumerate()
                .filter(|(_, row)| in_window(row.date) && row.origin == Some(origin))
                .map(|(i, _)| i)
                .collect(),
            None => Vec::new(),
        }
    } else {
        data.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| in_window(row.date))
            .map(|(i, _)| i)
            .collect()
    };

    Ok(Split {
        fold_id: boundary.id,
        run_type: boundary.run_type,
        analysis,
        assessment,
    })
}

/// Splits whose fold is marked Validation, in table order
pub fn validation_splits(splits: &[Split]) -> Vec<&Split> {
    splits
        .iter()
        .filter(|s| s.run_type == RunType::Validation)
        .collect()
}
