//! Pipeline configuration
//!
//! Values come from the environment (optionally via a `.env` file loaded by the
//! binaries) and are validated before a pipeline is built.

use catalog_common::env::var_or;
use catalog_common::CatalogError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of concurrent workers per file.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default number of products per bulk upsert.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default capacity of the worker -> collector result queue.
pub const DEFAULT_RESULT_BUFFER: usize = 256;

/// Progress is reported every this many processed records.
pub const PROGRESS_INTERVAL: usize = 10;

/// What the decoder does with rows that have too few columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShortRowPolicy {
    /// Drop the row silently; it is not counted anywhere
    #[default]
    Skip,
    /// Keep the row so it is reported as a failed record
    Fail,
}

impl std::str::FromStr for ShortRowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(ShortRowPolicy::Skip),
            "fail" => Ok(ShortRowPolicy::Fail),
            other => Err(format!("expected 'skip' or 'fail', got '{other}'")),
        }
    }
}

/// What the collector does with the counts of a batch whose bulk upsert failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchFailurePolicy {
    /// Move every product of the batch from inserted/updated to failed
    #[default]
    CountAsFailed,
    /// Log the failure and keep the counts as they were
    LogOnly,
}

impl std::str::FromStr for BatchFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "count_as_failed" | "fail" => Ok(BatchFailurePolicy::CountAsFailed),
            "log_only" | "log" => Ok(BatchFailurePolicy::LogOnly),
            other => Err(format!("expected 'count_as_failed' or 'log_only', got '{other}'")),
        }
    }
}

/// Settings for the worker pool and collector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub worker_count: usize,
    pub batch_size: usize,
    pub result_buffer: usize,
    pub batch_failure_policy: BatchFailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            batch_size: DEFAULT_BATCH_SIZE,
            result_buffer: DEFAULT_RESULT_BUFFER,
            batch_failure_policy: BatchFailurePolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from `WORKER_COUNT`, `BATCH_SIZE`, `RESULT_BUFFER`, `BATCH_FAILURE_POLICY`
    pub fn from_env() -> catalog_common::Result<Self> {
        let config = Self {
            worker_count: var_or("WORKER_COUNT", DEFAULT_WORKER_COUNT)?,
            batch_size: var_or("BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            result_buffer: var_or("RESULT_BUFFER", DEFAULT_RESULT_BUFFER)?,
            batch_failure_policy: var_or("BATCH_FAILURE_POLICY", BatchFailurePolicy::default())?,
        };

        config.validate().map_err(CatalogError::config)?;
        Ok(config)
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_batch_failure_policy(mut self, policy: BatchFailurePolicy) -> Self {
        self.batch_failure_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".to_string());
        }
        if self.result_buffer == 0 {
            return Err("result_buffer must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Settings for reading input files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Relative file identifiers are resolved against this directory
    pub base_dir: PathBuf,
    pub short_row_policy: ShortRowPolicy,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            short_row_policy: ShortRowPolicy::Skip,
        }
    }
}

impl DecoderConfig {
    /// Load from `CSV_BASE_DIR` and `SHORT_ROW_POLICY`
    pub fn from_env() -> catalog_common::Result<Self> {
        Ok(Self {
            base_dir: var_or("CSV_BASE_DIR", PathBuf::from("."))?,
            short_row_policy: var_or("SHORT_ROW_POLICY", ShortRowPolicy::default())?,
        })
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn with_short_row_policy(mut self, policy: ShortRowPolicy) -> Self {
        self.short_row_policy = policy;
        self
    }
}
