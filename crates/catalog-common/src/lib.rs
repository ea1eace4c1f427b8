//! Catalog Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing for the catalog workspace members:
//!
//! - **Error Handling**: [`CatalogError`] and the [`Result`] alias
//! - **Environment**: typed lookups of environment variables with defaults
//! - **Logging**: `tracing` subscriber initialization
//!
//! # Example
//!
//! ```no_run
//! use catalog_common::env::var_or;
//! use catalog_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     let workers: usize = var_or("WORKER_COUNT", 4)?;
//!     tracing::info!(workers, "starting");
//!     Ok(())
//! }
//! ```

pub mod env;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CatalogError, Result};
