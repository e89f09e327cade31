//! Engine configuration.
//!
//! Loaded from a JSON file, then optionally overridden from the environment:
//! - `STRAND_RETENTION_DAYS` - days an analysis folder is kept. Defaults to `14`.
//! - `STRAND_PROCESS_DEADLINE_HOURS` - stall deadline for process tasks. Defaults to `72`.
//! - `STRAND_WAIT_DEADLINE_HOURS` - stall deadline for wait tasks. Unset by default.
//! - `STRAND_LOADER_PROGRAM` - bulk loader executable. Defaults to `sqlldr`.
//! - `STRAND_INFINIUM_DATA_PATH` - root of the arrays scanner output.
//! - `STRAND_UPLOAD_BUCKET` - destination bucket for idat pushes.
//! - `STRAND_UPLOAD_THREADS` / `STRAND_UPLOAD_PROCESSES` - transfer parallelism.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::kind::PushIdatsParams;
use crate::domain::{ArraysWell, RetentionWindow};
use crate::domain::retention::DEFAULT_RETENTION_DAYS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub program: String,
    /// Passed before the per-file arguments (e.g. a connect string).
    pub extra_args: Vec<String>,
    pub control_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            program: "sqlldr".to_string(),
            extra_args: Vec::new(),
            control_dir: PathBuf::from("/seq/lims/datawh/prod/dragen/ctl"),
            log_dir: PathBuf::from("/seq/lims/datawh/prod/dragen/logs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub bucket: String,
    pub thread_count: u32,
    pub process_count: u32,
    pub gsutil: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            bucket: "gs://arrays-idats".to_string(),
            thread_count: 4,
            process_count: 2,
            gsutil: "gsutil".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub retention_days: i64,
    pub process_deadline_hours: i64,
    pub wait_deadline_hours: Option<i64>,
    pub loader: LoaderConfig,
    pub upload: UploadConfig,
    pub infinium_data_path: PathBuf,
    pub lock_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            process_deadline_hours: 72,
            wait_deadline_hours: None,
            loader: LoaderConfig::default(),
            upload: UploadConfig::default(),
            infinium_data_path: PathBuf::from("/humgen/illumina_data"),
            lock_path: PathBuf::from("/tmp/strand-coordinator.lock"),
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `STRAND_*` variables from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.from_lookup(|key| std::env::var(key).ok())
    }

    /// Applies overrides from any key/value source.
    pub fn from_lookup<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(days) = parsed(&lookup, "STRAND_RETENTION_DAYS")? {
            self.retention_days = days;
        }
        if let Some(hours) = parsed(&lookup, "STRAND_PROCESS_DEADLINE_HOURS")? {
            self.process_deadline_hours = hours;
        }
        if let Some(hours) = parsed(&lookup, "STRAND_WAIT_DEADLINE_HOURS")? {
            self.wait_deadline_hours = Some(hours);
        }
        if let Some(program) = lookup("STRAND_LOADER_PROGRAM") {
            self.loader.program = program;
        }
        if let Some(path) = lookup("STRAND_INFINIUM_DATA_PATH") {
            self.infinium_data_path = PathBuf::from(path);
        }
        if let Some(bucket) = lookup("STRAND_UPLOAD_BUCKET") {
            self.upload.bucket = bucket;
        }
        if let Some(threads) = parsed(&lookup, "STRAND_UPLOAD_THREADS")? {
            self.upload.thread_count = threads;
        }
        if let Some(processes) = parsed(&lookup, "STRAND_UPLOAD_PROCESSES")? {
            self.upload.process_count = processes;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("retention_days", self.retention_days),
            ("process_deadline_hours", self.process_deadline_hours),
            ("upload.thread_count", i64::from(self.upload.thread_count)),
            ("upload.process_count", i64::from(self.upload.process_count)),
        ];
        for (name, value) in positive {
            if value <= 0 {
                return Err(ConfigError::InvalidValue(
                    name.to_string(),
                    format!("must be positive, got {value}"),
                ));
            }
        }
        if let Some(hours) = self.wait_deadline_hours.filter(|hours| *hours <= 0) {
            return Err(ConfigError::InvalidValue(
                "wait_deadline_hours".to_string(),
                format!("must be positive, got {hours}"),
            ));
        }
        if self.loader.program.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "loader.program".to_string(),
                "must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retention(&self) -> RetentionWindow {
        RetentionWindow::days(self.retention_days)
    }

    pub fn process_deadline(&self) -> Duration {
        Duration::hours(self.process_deadline_hours)
    }

    pub fn wait_deadline(&self) -> Option<Duration> {
        self.wait_deadline_hours.map(Duration::hours)
    }

    /// Transfer parameters pushing a well's idat pair to `<bucket>/<chip>/`.
    pub fn idat_push(&self, well: &ArraysWell) -> PushIdatsParams {
        PushIdatsParams {
            sources: well.idat_files(&self.infinium_data_path).to_vec(),
            destination: format!(
                "{}/{}/",
                self.upload.bucket.trim_end_matches('/'),
                well.chip_barcode
            ),
            thread_count: self.upload.thread_count,
            process_count: self.upload.process_count,
            gsutil: self.upload.gsutil.clone(),
        }
    }
}

fn parsed<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("{}", e)))
        })
        .transpose()
}
