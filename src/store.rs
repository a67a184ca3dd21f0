//! Artifact persistence
//!
//! Artifacts are format-agnostic columnar tables keyed by a name
//! convention: `{hash(experiment)}-{hash(run)}[-{hash(combo)}]-{suffix}`.
//! The resolver enumerates completed partitions purely by listing and
//! parsing these names, so the convention is the contract between runs.
//! The shipped backend writes to a local directory: CSV for forecast
//! tables, JSON for run logs and fitted-model collections.

use crate::context::RunContext;
use crate::error::Result;
use crate::forecast::ForecastRow;
use crate::workflow::FittedModelRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

const FORECASTS_FOLDER: &str = "forecasts";
const MODELS_FOLDER: &str = "models";
const LOGS_FOLDER: &str = "logs";

/// Stable token for one name component of an artifact path
pub fn hash_token(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
}

/// What an artifact file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Forecast table from a per-partition fit
    LocalForecast,
    /// Forecast slice of one constituent partition from the global fit
    GlobalForecast,
    /// Fitted-model collection for one unit
    Models,
    /// Run configuration record
    RunLog,
}

impl ArtifactKind {
    fn suffix(&self) -> &'static str {
        match self {
            ArtifactKind::LocalForecast => "local_forecast.csv",
            ArtifactKind::GlobalForecast => "global_forecast.csv",
            ArtifactKind::Models => "models.json",
            ArtifactKind::RunLog => "run_log.json",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "local_forecast.csv" => Some(ArtifactKind::LocalForecast),
            "global_forecast.csv" => Some(ArtifactKind::GlobalForecast),
            "models.json" => Some(ArtifactKind::Models),
            "run_log.json" => Some(ArtifactKind::RunLog),
            _ => None,
        }
    }

    fn folder(&self) -> &'static str {
        match self {
            ArtifactKind::LocalForecast | ArtifactKind::GlobalForecast => FORECASTS_FOLDER,
            ArtifactKind::Models => MODELS_FOLDER,
            ArtifactKind::RunLog => LOGS_FOLDER,
        }
    }
}

/// Parsed artifact file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub experiment_hash: String,
    pub run_hash: String,
    pub combo_hash: Option<String>,
    pub kind: ArtifactKind,
}

impl ArtifactName {
    pub fn local_forecast(ctx: &RunContext, combo: &str) -> Self {
        Self::for_combo(ctx, combo, ArtifactKind::LocalForecast)
    }

    pub fn global_forecast(ctx: &RunContext, combo: &str) -> Self {
        Self::for_combo(ctx, combo, ArtifactKind::GlobalForecast)
    }

    pub fn models(ctx: &RunContext, combo: &str) -> Self {
        Self::for_combo(ctx, combo, ArtifactKind::Models)
    }

    pub fn run_log(ctx: &RunContext) -> Self {
        Self {
            experiment_hash: hash_token(&ctx.experiment),
            run_hash: hash_token(&ctx.run_name),
            combo_hash: None,
            kind: ArtifactKind::RunLog,
        }
    }

    fn for_combo(ctx: &RunContext, combo: &str, kind: ArtifactKind) -> Self {
        Self {
            experiment_hash: hash_token(&ctx.experiment),
            run_hash: hash_token(&ctx.run_name),
            combo_hash: Some(hash_token(combo)),
            kind,
        }
    }

    /// Render the file name under the convention
    pub fn file_name(&self) -> String {
        match &self.combo_hash {
            Some(combo) => format!(
                "{}-{}-{}-{}",
                self.experiment_hash,
                self.run_hash,
                combo,
                self.kind.suffix()
            ),
            None => format!(
                "{}-{}-{}",
                self.experiment_hash,
                self.run_hash,
                self.kind.suffix()
            ),
        }
    }

    /// Parse a file name back into its components
    pub fn parse(file_name: &str) -> Option<Self> {
        let parts: Vec<&str> = file_name.split('-').collect();
        match parts.as_slice() {
            [experiment, run, combo, suffix] => Some(Self {
                experiment_hash: experiment.to_string(),
                run_hash: run.to_string(),
                combo_hash: Some(combo.to_string()),
                kind: ArtifactKind::from_suffix(suffix)?,
            }),
            [experiment, run, suffix] => Some(Self {
                experiment_hash: experiment.to_string(),
                run_hash: run.to_string(),
                combo_hash: None,
                kind: ArtifactKind::from_suffix(suffix)?,
            }),
            _ => None,
        }
    }

    /// Whether the artifact belongs to the given run
    pub fn belongs_to(&self, ctx: &RunContext) -> bool {
        self.experiment_hash == hash_token(&ctx.experiment)
            && self.run_hash == hash_token(&ctx.run_name)
    }
}

/// Persisted record of a run's effective configuration
///
/// Read at startup to distinguish a resume from a conflicting re-run;
/// rewritten only after the completion verifier passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    pub experiment: String,
    pub run_name: String,
    /// Fingerprint of the tunable inputs, compared on resume
    pub input_hash: String,
    /// Human-readable input summary for conflict messages
    pub input_summary: String,
    pub run_local_models: bool,
    pub run_global_models: bool,
    pub feature_selection: bool,
    pub recipes: Vec<String>,
    pub seed: u64,
}

impl RunLog {
    pub fn from_context(ctx: &RunContext, global_resolved: bool) -> Self {
        Self {
            experiment: ctx.experiment.clone(),
            run_name: ctx.run_name.clone(),
            input_hash: ctx.input_hash(),
            input_summary: ctx.input_summary(),
            run_local_models: ctx.run_local_models,
            run_global_models: global_resolved,
            feature_selection: ctx.feature_selection,
            recipes: ctx.recipes.clone(),
            seed: ctx.seed,
        }
    }
}

/// Read/write/list primitives over the artifact convention
pub trait ArtifactStore: Send + Sync {
    /// Persist one forecast table
    fn write_forecasts(&self, name: &ArtifactName, rows: &[ForecastRow]) -> Result<()>;

    /// Read one forecast table back
    fn read_forecasts(&self, name: &ArtifactName) -> Result<Vec<ForecastRow>>;

    /// Persist a unit's fitted-model collection
    fn write_model_collection(&self, name: &ArtifactName, models: &[FittedModelRecord])
        -> Result<()>;

    /// Persist the run log
    fn write_run_log(&self, name: &ArtifactName, log: &RunLog) -> Result<()>;

    /// Read the run log, if one was persisted
    fn read_run_log(&self, name: &ArtifactName) -> Result<Option<RunLog>>;

    /// Enumerate forecast artifacts by parsing file names
    fn list_forecast_names(&self) -> Result<Vec<ArtifactName>>;
}

/// Directory-backed artifact store
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, name: &ArtifactName) -> Result<PathBuf> {
        let folder = self.root.join(name.kind.folder());
        fs::create_dir_all(&folder)?;
        Ok(folder.join(name.file_name()))
    }
}

impl ArtifactStore for LocalStore {
    fn write_forecasts(&self, name: &ArtifactName, rows: &[ForecastRow]) -> Result<()> {
        let path = self.path_for(name)?;
        let mut writer = csv::Writer::from_path(&path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn read_forecasts(&self, name: &ArtifactName) -> Result<Vec<ForecastRow>> {
        let path = self.path_for(name)?;
        let mut reader = csv::Reader::from_path(&path)?;
        let mut rows = Vec::new();
        for record in reader.deserialize() {
            rows.push(record?);
        }
        Ok(rows)
    }

    fn write_model_collection(
        &self,
        name: &ArtifactName,
        models: &[FittedModelRecord],
    ) -> Result<()> {
        let path = self.path_for(name)?;
        let json = serde_json::to_string_pretty(models)?;
        fs::write(path, json)?;
        Ok(())
    }

    fn write_run_log(&self, name: &ArtifactName, log: &RunLog) -> Result<()> {
        let path = self.path_for(name)?;
        let json = serde_json::to_string_pretty(log)?;
        fs::write(path, json)?;
        Ok(())
    }

    fn read_run_log(&self, name: &ArtifactName) -> Result<Option<RunLog>> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        let log = serde_json::from_str(&json)?;
        Ok(Some(log))
    }

    fn list_forecast_names(&self) -> Result<Vec<ArtifactName>> {
        let folder = self.root.join(FORECASTS_FOLDER);
        if !folder.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&folder)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(name) = ArtifactName::parse(&file_name) {
                names.push(name);
            }
        }
        Ok(names)
    }
}
