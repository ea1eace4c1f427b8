//! Catalog Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Concurrent CSV ingestion into the product catalog.
//!
//! # Pipeline
//!
//! For each file, in order:
//!
//! - **Decode**: [`decoder::CsvDecoder`] reads the rows, skipping the header
//! - **Transform**: [`transform::transform`] validates one row into a [`models::Product`]
//! - **Reconcile**: [`reconcile::reconcile`] decides insert or update by SKU
//! - **Workers**: [`worker::spawn_workers`] runs transform and reconcile on N tasks
//! - **Collect**: [`collector::Collector`] counts outcomes, batches upserts, reports progress
//!
//! [`pipeline::CsvProcessor`] ties these together and folds every file into an
//! [`models::OverallReport`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use catalog_ingest::config::{DecoderConfig, PipelineConfig};
//! use catalog_ingest::decoder::CsvDecoder;
//! use catalog_ingest::pipeline::CsvProcessor;
//! use catalog_ingest::store::InMemoryProductStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let processor = CsvProcessor::new(
//!         Arc::new(InMemoryProductStore::new()),
//!         Arc::new(CsvDecoder::new(DecoderConfig::default().with_base_dir("./data"))),
//!         PipelineConfig::default(),
//!     );
//!
//!     let report = processor.process_files(&["products.csv".to_string()], None).await?;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod config;
pub mod decoder;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod reconcile;
pub mod store;
pub mod transform;
pub mod worker;

pub use error::{IngestError, IngestResult, RecordError, StoreError};
pub use pipeline::CsvProcessor;
