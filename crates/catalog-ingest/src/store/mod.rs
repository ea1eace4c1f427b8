//! Product persistence
//!
//! [`ProductStore`] is the seam between the pipeline and the backing store.
//! Within the pipeline, workers only call [`ProductStore::find_by_sku`] and
//! the collector is the only caller of [`ProductStore::bulk_upsert`].
//!
//! Two implementations are provided:
//! - [`PgProductStore`]: PostgreSQL via sqlx
//! - [`InMemoryProductStore`]: process-local map, used for dry runs and tests

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::models::Product;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryProductStore;
pub use postgres::PgProductStore;

/// Storage operations over the product catalog
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Look up a product by natural key; `Ok(None)` when absent
    async fn find_by_sku(&self, sku: &str) -> StoreResult<Option<Product>>;

    /// Look up a product by identity
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Product>>;

    /// Insert or update every product, matching on SKU
    ///
    /// Updates replace name, description, price and stock and refresh
    /// `updated_at`; identity and `created_at` of existing rows are kept.
    /// An empty slice is a no-op.
    async fn bulk_upsert(&self, products: &[Product]) -> StoreResult<()>;

    /// Insert one new product, returning it with identity and timestamps set
    async fn create(&self, product: &Product) -> StoreResult<Product>;

    /// Overwrite the mutable fields of an existing product by identity
    async fn update(&self, product: &Product) -> StoreResult<Product>;

    /// Every stored product, ordered by identity
    async fn list(&self) -> StoreResult<Vec<Product>>;

    /// Check that the store is reachable
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Collapse duplicate SKUs in a batch, keeping the last occurrence of each
///
/// The relative order of the surviving products follows their last position.
pub fn dedupe_by_sku(products: &[Product]) -> Vec<&Product> {
    let mut seen = std::collections::HashSet::new();
    let mut unique: Vec<&Product> = products
        .iter()
        .rev()
        .filter(|product| seen.insert(product.sku.as_str()))
        .collect();
    unique.reverse();
    unique
}
