//! Multi-file orchestration
//!
//! Files are processed strictly one after another. Each file gets its own job
//! queue (sized to hold every record up front), result queue, worker pool and
//! collector; nothing is shared between files except the store.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use crate::collector::Collector;
use crate::config::PipelineConfig;
use crate::decoder::RecordDecoder;
use crate::error::{IngestError, IngestResult};
use crate::models::{FileReport, Job, OverallReport, ProgressEvent};
use crate::store::ProductStore;
use crate::worker::spawn_workers;

/// Runs the decode, transform, reconcile and persist pipeline over a list of files
#[derive(Clone)]
pub struct CsvProcessor {
    store: Arc<dyn ProductStore>,
    decoder: Arc<dyn RecordDecoder>,
    config: PipelineConfig,
}

impl CsvProcessor {
    pub fn new(
        store: Arc<dyn ProductStore>,
        decoder: Arc<dyn RecordDecoder>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            decoder,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn ProductStore> {
        &self.store
    }

    /// Process every file in order and return the combined report
    ///
    /// A file that cannot be decoded is recorded as a `"File <path>: <error>"`
    /// entry and the remaining files still run. The only error returned is an
    /// invalid configuration.
    #[instrument(skip(self, progress), fields(files = file_paths.len()))]
    pub async fn process_files(
        &self,
        file_paths: &[String],
        progress: Option<mpsc::Sender<ProgressEvent>>,
    ) -> IngestResult<OverallReport> {
        self.config.validate().map_err(IngestError::Config)?;

        let start = Instant::now();
        let mut overall = OverallReport::default();

        for file in file_paths {
            match self.process_file(file, progress.clone()).await {
                Ok(report) => {
                    info!(
                        file = %file,
                        total = report.total_records,
                        inserted = report.inserted,
                        updated = report.updated,
                        failed = report.failed,
                        "File processed"
                    );
                    overall.merge_file(file.as_str(), report);
                },
                Err(e) => {
                    error!(file = %file, error = %e, "Skipping file");
                    overall.record_file_error(file, &e);
                },
            }
        }

        overall.processing_time = start.elapsed();

        info!(
            total = overall.total_records,
            inserted = overall.inserted,
            updated = overall.updated,
            failed = overall.failed,
            errors = overall.errors.len(),
            elapsed_ms = u64::try_from(overall.processing_time.as_millis()).unwrap_or(u64::MAX),
            "Processing complete"
        );

        Ok(overall)
    }

    /// Run one file through decode, worker pool and collector
    pub async fn process_file(
        &self,
        file: &str,
        progress: Option<mpsc::Sender<ProgressEvent>>,
    ) -> IngestResult<FileReport> {
        let records = self.decoder.decode(file).await?;
        let total = records.len();
        info!(file = %file, records = total, workers = self.config.worker_count, "Processing file");

        // Every job fits, so feeding never waits on the workers
        let (job_tx, job_rx) = mpsc::channel::<Job>(total.max(1));
        let (result_tx, result_rx) = mpsc::channel(self.config.result_buffer.max(1));

        for record in records {
            let job = Job {
                record,
                file: file.to_string(),
            };
            job_tx
                .send(job)
                .await
                .map_err(|_| IngestError::WorkerPool("job queue closed while feeding".to_string()))?;
        }
        drop(job_tx);

        let mut workers = spawn_workers(
            self.config.worker_count,
            job_rx,
            result_tx,
            Arc::clone(&self.store),
        );

        let collector = Collector::new(file, total, Arc::clone(&self.store), &self.config, progress);
        let mut report = collector.run(result_rx).await;

        // The collector has already persisted its batches, so a lost worker is
        // reported next to the counts rather than in place of them
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(file = %file, error = %e, "Worker did not finish cleanly");
                report.errors.push(format!(
                    "File {}: {}",
                    file,
                    IngestError::WorkerPool(e.to_string())
                ));
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::{DecodeError, StoreResult};
    use crate::models::{Product, RawRecord};
    use crate::store::InMemoryProductStore;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Decoder over fixed in-memory files
    #[derive(Default)]
    struct StaticDecoder {
        files: HashMap<String, Vec<RawRecord>>,
    }

    impl StaticDecoder {
        fn with_file(mut self, name: &str, rows: &[&[&str]]) -> Self {
            let records = rows
                .iter()
                .enumerate()
                .map(|(i, fields)| {
                    RawRecord::new(i as u64 + 2, fields.iter().map(|f| f.to_string()).collect())
                })
                .collect();
            self.files.insert(name.to_string(), records);
            self
        }
    }

    #[async_trait]
    impl RecordDecoder for StaticDecoder {
        async fn decode(&self, file: &str) -> Result<Vec<RawRecord>, DecodeError> {
            self.files.get(file).cloned().ok_or_else(|| DecodeError::Open {
                path: file.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            })
        }
    }

    fn processor(decoder: StaticDecoder, store: Arc<InMemoryProductStore>) -> CsvProcessor {
        CsvProcessor::new(store, Arc::new(decoder), PipelineConfig::default().with_worker_count(3))
    }

    #[tokio::test]
    async fn test_invalid_config_is_processing_error() {
        let store = Arc::new(InMemoryProductStore::new());
        let processor = CsvProcessor::new(
            store,
            Arc::new(StaticDecoder::default()),
            PipelineConfig::default().with_worker_count(0),
        );

        let result = processor.process_files(&["a.csv".to_string()], None).await;
        assert!(matches!(result, Err(IngestError::Config(_))));
    }

    #[tokio::test]
    async fn test_empty_file_list_yields_empty_report() {
        let store = Arc::new(InMemoryProductStore::new());
        let report = processor(StaticDecoder::default(), store)
            .process_files(&[], None)
            .await
            .unwrap();

        assert_eq!(report.total_records, 0);
        assert!(report.errors.is_empty());
        assert!(report.file_results.is_empty());
    }

    #[tokio::test]
    async fn test_header_only_file_reports_zero() {
        let store = Arc::new(InMemoryProductStore::new());
        let (tx, mut rx) = mpsc::channel(10);
        let decoder = StaticDecoder::default().with_file("empty.csv", &[]);

        let report = processor(decoder, store.clone())
            .process_files(&["empty.csv".to_string()], Some(tx))
            .await
            .unwrap();

        assert_eq!(report.file_results["empty.csv"], FileReport::new(0));
        assert_eq!(store.bulk_upsert_calls(), 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_does_not_abort_others() {
        let store = Arc::new(InMemoryProductStore::new());
        let decoder = StaticDecoder::default()
            .with_file("first.csv", &[&["A-1", "Lamp", "", "1.50", "3"]])
            .with_file("third.csv", &[&["C-1", "Rug", "", "80", "1"]]);

        let files = ["first.csv", "missing.csv", "third.csv"].map(String::from);
        let report = processor(decoder, store).process_files(&files, None).await.unwrap();

        assert_eq!(report.inserted, 2);
        assert_eq!(report.file_results.len(), 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("File missing.csv:"));
    }

    /// Store whose lookup panics for one SKU
    struct PanickingStore {
        inner: InMemoryProductStore,
    }

    #[async_trait]
    impl ProductStore for PanickingStore {
        async fn find_by_sku(&self, sku: &str) -> StoreResult<Option<Product>> {
            if sku == "BOOM" {
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
    async fn test_panicking_record_keeps_file_report() {
        let store = Arc::new(PanickingStore {
            inner: InMemoryProductStore::new(),
        });

        let skus: Vec<String> = (0..20).map(|i| format!("OK-{i}")).collect();
        let mut rows: Vec<[&str; 5]> = skus.iter().map(|sku| [sku.as_str(), "Item", "", "1", "1"]).collect();
        rows.insert(10, ["BOOM", "Item", "", "1", "1"]);
        let rows: Vec<&[&str]> = rows.iter().map(|r| r.as_slice()).collect();
        let decoder = StaticDecoder::default().with_file("f.csv", &rows);

        let processor = CsvProcessor::new(
            store.clone(),
            Arc::new(decoder),
            PipelineConfig::default().with_worker_count(2).with_batch_size(5),
        );
        let report = processor.process_files(&["f.csv".to_string()], None).await.unwrap();

        assert_eq!(store.inner.len(), 20);
        assert_eq!(report.total_records, 21);
        assert_eq!(report.inserted, 20);
        assert_eq!(report.failed, 1);
        assert_eq!(report.file_results["f.csv"].processed(), 21);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0], "Row 12 (SKU: BOOM): processing panicked: driver bug");
    }
}
