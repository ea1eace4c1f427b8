//! Fixed-size worker pool
//!
//! Workers share one job receiver and each own a clone of the result sender.
//! The result queue closes once every worker has returned and the caller has
//! dropped its own sender, so the collector cannot miss an outcome. Each job
//! runs in its own task; a panic while processing it becomes a failed outcome
//! for that row and the worker moves on.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::error::RecordError;
use crate::models::{Job, Outcome};
use crate::reconcile::reconcile;
use crate::store::ProductStore;
use crate::transform::transform;

/// Job receiver shared by every worker of one pool
pub type SharedJobs = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Spawn `count` workers draining `jobs` into `results`
///
/// The returned set must be joined after the result stream is drained.
pub fn spawn_workers(
    count: usize,
    jobs: mpsc::Receiver<Job>,
    results: mpsc::Sender<Outcome>,
    store: Arc<dyn ProductStore>,
) -> JoinSet<usize> {
    let jobs: SharedJobs = Arc::new(Mutex::new(jobs));
    let mut workers = JoinSet::new();

    for worker_id in 0..count {
        workers.spawn(run_worker(
            worker_id,
            Arc::clone(&jobs),
            results.clone(),
            Arc::clone(&store),
        ));
    }

    workers
}

/// Worker loop; returns how many jobs this worker handled
async fn run_worker(
    worker_id: usize,
    jobs: SharedJobs,
    results: mpsc::Sender<Outcome>,
    store: Arc<dyn ProductStore>,
) -> usize {
    let mut handled = 0usize;

    loop {
        // Guard dropped before processing so other workers can receive
        let job = {
            let mut rx = jobs.lock().await;
            rx.recv().await
        };
        let Some(job) = job else { break };

        let outcome = run_job(worker_id, Arc::clone(&store), job).await;
        handled += 1;

        if results.send(outcome).await.is_err() {
            warn!(worker_id, "Result queue closed, stopping worker");
            break;
        }
    }

    debug!(worker_id, handled, "Worker finished");
    handled
}

/// Process one job in its own task, turning a panic into a failed outcome
async fn run_job(worker_id: usize, store: Arc<dyn ProductStore>, job: Job) -> Outcome {
    let row = job.record.line;
    let file = job.file.clone();
    let sku = job.record.sku().map(str::to_string);

    match tokio::spawn(async move { process_job(store.as_ref(), job).await }).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let reason = panic_reason(e);
            error!(worker_id, row, file = %file, reason = %reason, "Record processing panicked");
            Outcome::failure(row, file, sku, RecordError::Panicked(reason))
        },
    }
}

fn panic_reason(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Transform then reconcile one job
pub async fn process_job(store: &dyn ProductStore, job: Job) -> Outcome {
    let Job { record, file } = job;
    let row = record.line;

    let product = match transform(&record) {
        Ok(product) => product,
        Err(error) => {
            return Outcome::failure(row, file, record.sku().map(str::to_string), error);
        },
    };

    let sku = product.sku.clone();
    match reconcile(store, product).await {
        Ok((product, is_update)) => Outcome::success(row, file, product, is_update),
        Err(error) => Outcome::failure(row, file, Some(sku), error),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::RecordError;
    use crate::error::StoreResult;
    use crate::models::{Disposition, Product, RawRecord};
    use crate::store::InMemoryProductStore;
    use async_trait::async_trait;

    fn job(line: u64, fields: &[&str]) -> Job {
        Job {
            record: RawRecord::new(line, fields.iter().map(|f| f.to_string()).collect()),
            file: "products.csv".to_string(),
        }
    }

    #[tokio::test]
    async fn test_process_job_failure_keeps_sku_and_row() {
        let store = InMemoryProductStore::new();
        let outcome = process_job(&store, job(7, &["SKU-7", "Lamp", "", "cheap", "1"])).await;

        assert_eq!(outcome.row, 7);
        match outcome.disposition {
            Disposition::Failure { sku, error } => {
                assert_eq!(sku.as_deref(), Some("SKU-7"));
                assert_eq!(error.kind(), "invalid_price");
            },
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_process_job_lookup_failure() {
        let store = InMemoryProductStore::new();
        store.set_fail_lookups(true);

        let outcome = process_job(&store, job(3, &["SKU-3", "Lamp", "", "1", "1"])).await;
        assert!(matches!(
            outcome.disposition,
            Disposition::Failure {
                error: RecordError::LookupFailed(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_pool_produces_one_outcome_per_job() {
        let store = Arc::new(InMemoryProductStore::new());
        store
            .bulk_upsert(&[Product::new("SKU-0", "Existing", "", 1.0, 1)])
            .await
            .unwrap();

        let (job_tx, job_rx) = mpsc::channel(50);
        let (result_tx, mut result_rx) = mpsc::channel(4);
        for i in 0..50u64 {
            let sku = format!("SKU-{i}");
            job_tx.send(job(i + 2, &[&sku, "Item", "", "1", "1"])).await.unwrap();
        }
        drop(job_tx);

        let mut workers = spawn_workers(3, job_rx, result_tx, store);

        let mut rows = Vec::new();
        let mut updates = 0;
        while let Some(outcome) = result_rx.recv().await {
            if let Disposition::Success { is_update: true, .. } = outcome.disposition {
                updates += 1;
            }
            rows.push(outcome.row);
        }

        let mut handled = 0;
        while let Some(joined) = workers.join_next().await {
            handled += joined.unwrap();
        }

        rows.sort_unstable();
        assert_eq!(rows, (2..52).collect::<Vec<_>>());
        assert_eq!(updates, 1);
        assert_eq!(handled, 50);
    }

    /// Store whose lookup panics for one SKU
    struct PanickingStore {
        inner: InMemoryProductStore,
        poisoned_sku: &'static str,
    }

    #[async_trait]
    impl ProductStore for PanickingStore {
        async fn find_by_sku(&self, sku: &str) -> StoreResult<Option<Product>> {
            if sku == self.poisoned_sku {
                panic!("driver bug");
            }
            self.inner.find_by_sku(sku).await
        }

        async fn find_by_id(&self, id: i64) -> StoreResult<Option<Product>> {
            self.inner.find_by_id(id).await
        }

        async fn bulk_upsert(&self, products: &[Product]) -> StoreResult<()> {
            self.inner.bulk_upsert(products).await
        }

        async fn create(&self, product: &Product) -> StoreResult<Product> {
            self.inner.create(product).await
        }

        async fn update(&self, product: &Product) -> StoreResult<Product> {
            self.inner.update(product).await
        }

        async fn list(&self) -> StoreResult<Vec<Product>> {
            self.inner.list().await
        }
    }

    #[tokio::test]
    async fn test_panicking_job_becomes_failed_outcome() {
        let store: Arc<dyn ProductStore> = Arc::new(PanickingStore {
            inner: InMemoryProductStore::new(),
            poisoned_sku: "BOOM",
        });

        let (job_tx, job_rx) = mpsc::channel(10);
        let (result_tx, mut result_rx) = mpsc::channel(10);
        for (i, sku) in ["A-1", "BOOM", "A-2", "A-3"].iter().enumerate() {
            job_tx.send(job(i as u64 + 2, &[sku, "Item", "", "1", "1"])).await.unwrap();
        }
        drop(job_tx);

        let mut workers = spawn_workers(2, job_rx, result_tx, store);

        let mut outcomes = Vec::new();
        while let Some(outcome) = result_rx.recv().await {
            outcomes.push(outcome);
        }
        while let Some(joined) = workers.join_next().await {
            joined.unwrap();
        }

        assert_eq!(outcomes.len(), 4);
        let failed: Vec<_> = outcomes.iter().filter(|o| o.is_failure()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].row, 3);
        match &failed[0].disposition {
            Disposition::Failure { sku, error } => {
                assert_eq!(sku.as_deref(), Some("BOOM"));
                assert_eq!(error, &RecordError::Panicked("driver bug".to_string()));
            },
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
