//! Process-local product store
//!
//! Mirrors the PostgreSQL store's upsert semantics over a `BTreeMap` keyed by
//! SKU. Besides dry runs from the CLI, it records bulk upsert calls and can be
//! told to fail, which the pipeline tests rely on.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{dedupe_by_sku, ProductStore};
use crate::error::{StoreError, StoreResult};
use crate::models::Product;

#[derive(Debug, Default)]
struct Inner {
    products: BTreeMap<String, Product>,
    next_id: i64,
    upsert_batches: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct InMemoryProductStore {
    inner: Mutex<Inner>,
    fail_lookups: AtomicBool,
    fail_bulk_upsert: AtomicBool,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `find_by_sku` return an error
    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `bulk_upsert` return an error
    pub fn set_fail_bulk_upsert(&self, fail: bool) {
        self.fail_bulk_upsert.store(fail, Ordering::SeqCst);
    }

    /// Number of non-empty bulk upserts attempted so far, failed ones included
    pub fn bulk_upsert_calls(&self) -> usize {
        self.lock().map(|inner| inner.upsert_batches.len()).unwrap_or(0)
    }

    /// Size of each attempted bulk upsert, in call order
    pub fn bulk_upsert_sizes(&self) -> Vec<usize> {
        self.lock()
            .map(|inner| inner.upsert_batches.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.products.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }
}

impl Inner {
    fn assign_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn upsert(&mut self, product: &Product) {
        let now = Utc::now();
        if let Some(existing) = self.products.get_mut(&product.sku) {
            existing.name = product.name.clone();
            existing.description = product.description.clone();
            existing.price = product.price;
            existing.stock = product.stock;
            existing.updated_at = Some(now);
            return;
        }

        let id = self.assign_id();
        let stored = Product {
            id: Some(id),
            created_at: Some(now),
            updated_at: Some(now),
            ..product.clone()
        };
        self.products.insert(stored.sku.clone(), stored);
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn find_by_sku(&self, sku: &str) -> StoreResult<Option<Product>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("lookup disabled".to_string()));
        }
        Ok(self.lock()?.products.get(sku).cloned())
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Product>> {
        Ok(self
            .lock()?
            .products
            .values()
            .find(|product| product.id == Some(id))
            .cloned())
    }

    async fn bulk_upsert(&self, products: &[Product]) -> StoreResult<()> {
        if products.is_empty() {
            return Ok(());
        }

        let mut inner = self.lock()?;
        inner.upsert_batches.push(products.len());

        if self.fail_bulk_upsert.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("bulk upsert disabled".to_string()));
        }

        for product in dedupe_by_sku(products) {
            inner.upsert(product);
        }
        Ok(())
    }

    async fn create(&self, product: &Product) -> StoreResult<Product> {
        let mut inner = self.lock()?;
        if inner.products.contains_key(&product.sku) {
            return Err(StoreError::Duplicate(product.sku.clone()));
        }
        inner.upsert(product);
        inner
            .products
            .get(&product.sku)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(product.sku.clone()))
    }

    async fn update(&self, product: &Product) -> StoreResult<Product> {
        let id = product
            .id
            .ok_or_else(|| StoreError::NotFound(format!("{} has no id", product.sku)))?;

        let mut inner = self.lock()?;
        let existing = inner
            .products
            .values_mut()
            .find(|stored| stored.id == Some(id))
            .ok_or_else(|| StoreError::NotFound(format!("id {id}")))?;

        existing.name = product.name.clone();
        existing.description = product.description.clone();
        existing.price = product.price;
        existing.stock = product.stock;
        existing.updated_at = Some(Utc::now());
        Ok(existing.clone())
    }

    async fn list(&self) -> StoreResult<Vec<Product>> {
        let mut products: Vec<Product> = self.lock()?.products.values().cloned().collect();
        products.sort_by_key(|product| product.id);
        Ok(products)
    }
}
