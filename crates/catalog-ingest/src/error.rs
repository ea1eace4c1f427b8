//! Error types for the ingestion pipeline
//!
//! Row-level errors ([`RecordError`]) never abort a file: they become failed
//! outcomes and error lines in the report. File-level errors ([`DecodeError`],
//! [`IngestError::WorkerPool`]) skip one file. Only [`IngestError::Config`]
//! stops a whole request.

use thiserror::Error;

/// Why a single record could not be ingested
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("SKU and Name are required")]
    MissingRequiredField,

    #[error("invalid price '{value}': {reason}")]
    InvalidPrice { value: String, reason: String },

    #[error("invalid stock '{value}': {reason}")]
    InvalidStock { value: String, reason: String },

    #[error("lookup failed: {0}")]
    LookupFailed(String),

    #[error("expected at least {expected} fields, found {found}")]
    TooFewFields { expected: usize, found: usize },

    #[error("bulk upsert failed: {0}")]
    BulkPersistFailed(String),

    #[error("processing panicked: {0}")]
    Panicked(String),
}

impl RecordError {
    /// Stable machine-readable name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::MissingRequiredField => "missing_required_field",
            RecordError::InvalidPrice { .. } => "invalid_price",
            RecordError::InvalidStock { .. } => "invalid_stock",
            RecordError::LookupFailed(_) => "lookup_failed",
            RecordError::TooFewFields { .. } => "too_few_fields",
            RecordError::BulkPersistFailed(_) => "bulk_persist_failed",
            RecordError::Panicked(_) => "panicked",
        }
    }
}

/// Errors raised by a product store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Product not found: {0}")]
    NotFound(String),

    #[error("Product with SKU '{0}' already exists")]
    Duplicate(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Whole-file decoding failure; the file is skipped
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("invalid file path '{0}': parent directory components are not allowed")]
    InvalidPath(String),

    #[error("decoder task failed: {0}")]
    Task(String),
}

/// Pipeline-level errors
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid pipeline configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("worker pool failed: {0}")]
    WorkerPool(String),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
