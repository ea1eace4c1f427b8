//! Result collection for one file
//!
//! The collector is the single consumer of a file's outcome stream and the
//! only caller of [`ProductStore::bulk_upsert`] in the pipeline. Its counters
//! and batch buffer are owned by one task, so no locking is involved.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::{BatchFailurePolicy, PipelineConfig, PROGRESS_INTERVAL};
use crate::error::RecordError;
use crate::models::{row_error_line, Disposition, FileReport, Outcome, Product, ProgressEvent};
use crate::store::ProductStore;

/// Products waiting for the next bulk upsert, with where they came from
#[derive(Debug, Default)]
struct Batch {
    products: Vec<Product>,
    origins: Vec<(u64, bool)>,
}

impl Batch {
    fn push(&mut self, product: Product, row: u64, is_update: bool) {
        self.products.push(product);
        self.origins.push((row, is_update));
    }

    fn len(&self) -> usize {
        self.products.len()
    }

    fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Accumulates the [`FileReport`] of one file while its outcomes stream in
pub struct Collector {
    file: String,
    store: Arc<dyn ProductStore>,
    batch_size: usize,
    failure_policy: BatchFailurePolicy,
    progress: Option<mpsc::Sender<ProgressEvent>>,
    report: FileReport,
    batch: Batch,
    processed: usize,
}

impl Collector {
    pub fn new(
        file: impl Into<String>,
        total_records: usize,
        store: Arc<dyn ProductStore>,
        config: &PipelineConfig,
        progress: Option<mpsc::Sender<ProgressEvent>>,
    ) -> Self {
        Self {
            file: file.into(),
            store,
            batch_size: config.batch_size.max(1),
            failure_policy: config.batch_failure_policy,
            progress,
            report: FileReport::new(total_records),
            batch: Batch::default(),
            processed: 0,
        }
    }

    /// Drain `results` until every sender is gone, then flush and report
    pub async fn run(mut self, mut results: mpsc::Receiver<Outcome>) -> FileReport {
        while let Some(outcome) = results.recv().await {
            self.record(outcome).await;
        }
        self.finish().await
    }

    /// Account for one outcome, flushing and reporting progress as due
    pub async fn record(&mut self, outcome: Outcome) {
        self.processed += 1;

        let Outcome {
            row, disposition, ..
        } = outcome;

        match disposition {
            Disposition::Failure { sku, error } => {
                debug!(file = %self.file, row, kind = error.kind(), "Record failed");
                self.report.failed += 1;
                self.report
                    .errors
                    .push(row_error_line(row, sku.as_deref(), &error));
            },
            Disposition::Success { product, is_update } => {
                if is_update {
                    self.report.updated += 1;
                } else {
                    self.report.inserted += 1;
                }
                self.batch.push(product, row, is_update);

                if self.batch.len() >= self.batch_size {
                    self.flush().await;
                }
            },
        }

        if self.processed % PROGRESS_INTERVAL == 0 || self.processed == self.report.total_records {
            self.emit_progress().await;
        }
    }

    /// Flush the remaining partial batch and hand back the finished report
    pub async fn finish(mut self) -> FileReport {
        self.flush().await;
        self.report
    }

    async fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut self.batch);
        match self.store.bulk_upsert(&batch.products).await {
            Ok(()) => {
                debug!(file = %self.file, size = batch.len(), "Flushed batch");
            },
            Err(e) => {
                error!(
                    file = %self.file,
                    size = batch.len(),
                    error = %e,
                    policy = ?self.failure_policy,
                    "Bulk upsert failed"
                );
                if self.failure_policy == BatchFailurePolicy::CountAsFailed {
                    self.count_batch_as_failed(&batch, &e.to_string());
                }
            },
        }
    }

    /// Move every product of a lost batch from inserted/updated to failed
    fn count_batch_as_failed(&mut self, batch: &Batch, reason: &str) {
        let error = RecordError::BulkPersistFailed(reason.to_string());

        for (product, &(row, is_update)) in batch.products.iter().zip(&batch.origins) {
            if is_update {
                self.report.updated = self.report.updated.saturating_sub(1);
            } else {
                self.report.inserted = self.report.inserted.saturating_sub(1);
            }
            self.report.failed += 1;
            self.report
                .errors
                .push(row_error_line(row, Some(&product.sku), &error));
        }
    }

    async fn emit_progress(&mut self) {
        let event = ProgressEvent::new(&self.file, self.processed, &self.report);
        info!(
            file = %self.file,
            processed = event.processed,
            total = event.total_records,
            inserted = event.inserted,
            updated = event.updated,
            failed = event.failed,
            "{}",
            event.message
        );

        if let Some(progress) = &self.progress {
            // Awaits capacity; a slow progress consumer slows the collector
            if progress.send(event).await.is_err() {
                debug!(file = %self.file, "Progress receiver dropped");
                self.progress = None;
            }
        }
    }
}
