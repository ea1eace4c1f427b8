//! CSV file decoding
//!
//! Turns one input file into the ordered list of [`RawRecord`]s the pipeline
//! consumes. The first row is a header and is skipped; each record keeps the
//! physical line it started on so error lines point at the right row.

use async_trait::async_trait;
use csv::{ReaderBuilder, Trim};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::config::{DecoderConfig, ShortRowPolicy};
use crate::error::DecodeError;
use crate::models::{columns, RawRecord};

/// Source of raw records for one file identifier
#[async_trait]
pub trait RecordDecoder: Send + Sync {
    /// Decode every data row of `file`, in file order
    async fn decode(&self, file: &str) -> Result<Vec<RawRecord>, DecodeError>;
}

/// Decoder for comma-separated product files on the local filesystem
#[derive(Debug, Clone, Default)]
pub struct CsvDecoder {
    config: DecoderConfig,
}

impl CsvDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    /// Resolve a file identifier against the base directory
    ///
    /// Identifiers are always relative to the base directory, so a leading
    /// `/` is ignored. Parent directory components are rejected.
    pub fn resolve(&self, file: &str) -> Result<PathBuf, DecodeError> {
        let relative = Path::new(file.trim_start_matches('/'));
        if relative.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(DecodeError::InvalidPath(file.to_string()));
        }
        Ok(self.config.base_dir.join(relative))
    }
}

#[async_trait]
impl RecordDecoder for CsvDecoder {
    async fn decode(&self, file: &str) -> Result<Vec<RawRecord>, DecodeError> {
        let path = self.resolve(file)?;
        let policy = self.config.short_row_policy;
        let label = file.to_string();

        tokio::task::spawn_blocking(move || {
            let handle = std::fs::File::open(&path).map_err(|source| DecodeError::Open {
                path: label.clone(),
                source,
            })?;
            decode_reader(handle, &label, policy)
        })
        .await
        .map_err(|e| DecodeError::Task(e.to_string()))?
    }
}

/// Decode CSV content from any reader
pub fn decode_reader<R: Read>(
    reader: R,
    label: &str,
    policy: ShortRowPolicy,
) -> Result<Vec<RawRecord>, DecodeError> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (index, row) in csv_reader.records().enumerate() {
        let row = row.map_err(|source| DecodeError::Csv {
            path: label.to_string(),
            source,
        })?;

        // Header
        if index == 0 {
            continue;
        }

        let line = row
            .position()
            .map(|p| p.line())
            .unwrap_or(index as u64 + 1);

        if row.len() < columns::REQUIRED && policy == ShortRowPolicy::Skip {
            skipped += 1;
            debug!(file = %label, line, fields = row.len(), "Skipping short row");
            continue;
        }

        records.push(RawRecord::new(line, row.iter().map(str::to_string).collect()));
    }

    if skipped > 0 {
        debug!(file = %label, skipped, "Dropped rows with too few columns");
    }

    Ok(records)
}
