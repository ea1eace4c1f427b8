//! End-to-end pipeline tests over real CSV files and the in-memory store

use catalog_ingest::config::{DecoderConfig, PipelineConfig, ShortRowPolicy};
use catalog_ingest::decoder::CsvDecoder;
use catalog_ingest::models::Product;
use catalog_ingest::store::{InMemoryProductStore, ProductStore};
use catalog_ingest::CsvProcessor;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

const HEADER: &str = "sku,name,description,price,stock\n";

fn write_csv(dir: &Path, name: &str, rows: &str) {
    std::fs::write(dir.join(name), format!("{HEADER}{rows}")).unwrap();
}

fn processor(dir: &TempDir, store: Arc<InMemoryProductStore>, config: PipelineConfig) -> CsvProcessor {
    let decoder = CsvDecoder::new(DecoderConfig::default().with_base_dir(dir.path()));
    CsvProcessor::new(store, Arc::new(decoder), config)
}

fn files(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[tokio::test]
async fn test_mixed_file_counts_insert_update_and_failure() {
    let dir = tempfile::tempdir().unwrap();
    write_csv(
        dir.path(),
        "products.csv",
        "BAD-1,,No name,10.00,1\n\
         NEW-1,Desk Lamp,Warm light,19.99,12\n\
         OLD-1,Chair,Oak,45.00,3\n",
    );

    let store = Arc::new(InMemoryProductStore::new());
    store
        .bulk_upsert(&[Product::new("OLD-1", "Chair", "Pine", 40.0, 1)])
        .await
        .unwrap();

    let report = processor(&dir, store.clone(), PipelineConfig::default())
        .process_files(&files(&["products.csv"]), None)
        .await
        .unwrap();

    let file = &report.file_results["products.csv"];
    assert_eq!(file.total_records, 3);
    assert_eq!(file.inserted, 1);
    assert_eq!(file.updated, 1);
    assert_eq!(file.failed, 1);
    assert_eq!(file.errors.len(), 1);
    assert!(file.errors[0].starts_with("Row 2 (SKU: BAD-1):"), "{}", file.errors[0]);

    assert_eq!(report.total_records, 3);
    assert_eq!(report.errors, file.errors);

    let chair = store.find_by_sku("OLD-1").await.unwrap().unwrap();
    assert_eq!(chair.id, Some(1));
    assert_eq!(chair.description, "Oak");
    assert_eq!(chair.stock, 3);
}

#[tokio::test]
async fn test_second_run_turns_inserts_into_updates() {
    let dir = tempfile::tempdir().unwrap();
    write_csv(
        dir.path(),
        "catalog.csv",
        "A-1,Lamp,,10,1\nA-2,Rug,,80,2\nA-3,Sofa,,499,1\n",
    );

    let store = Arc::new(InMemoryProductStore::new());
    let processor = processor(&dir, store.clone(), PipelineConfig::default().with_worker_count(2));
    let paths = files(&["catalog.csv"]);

    let first = processor.process_files(&paths, None).await.unwrap();
    assert_eq!(first.inserted, 3);
    assert_eq!(first.updated, 0);
    let id_before = store.find_by_sku("A-2").await.unwrap().unwrap().id;

    let second = processor.process_files(&paths, None).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 3);

    let id_after = store.find_by_sku("A-2").await.unwrap().unwrap().id;
    assert_eq!(id_before, id_after);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn test_undecodable_second_file_keeps_first_result() {
    let dir = tempfile::tempdir().unwrap();
    write_csv(dir.path(), "good.csv", "G-1,Lamp,,10,1\nG-2,Rug,,80,2\n");

    let store = Arc::new(InMemoryProductStore::new());
    let report = processor(&dir, store, PipelineConfig::default())
        .process_files(&files(&["good.csv", "missing.csv"]), None)
        .await
        .unwrap();

    assert_eq!(report.file_results.len(), 1);
    assert_eq!(report.file_results["good.csv"].inserted, 2);
    assert_eq!(report.inserted, 2);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("missing.csv"));
}

#[tokio::test]
async fn test_progress_events_for_each_file() {
    let dir = tempfile::tempdir().unwrap();
    let rows: String = (0..25).map(|i| format!("P-{i},Item {i},,1.00,{i}\n")).collect();
    write_csv(dir.path(), "big.csv", &rows);
    write_csv(dir.path(), "small.csv", "S-1,Lamp,,10,1\n");

    let store = Arc::new(InMemoryProductStore::new());
    let (tx, mut rx) = mpsc::channel(100);
    let config = PipelineConfig::default().with_worker_count(4).with_batch_size(7);

    let report = processor(&dir, store.clone(), config)
        .process_files(&files(&["big.csv", "small.csv"]), Some(tx))
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push((event.file, event.processed, event.percentage));
    }

    assert_eq!(
        events,
        vec![
            ("big.csv".to_string(), 10, 40.0),
            ("big.csv".to_string(), 20, 80.0),
            ("big.csv".to_string(), 25, 100.0),
            ("small.csv".to_string(), 1, 100.0),
        ]
    );
    assert_eq!(report.inserted, 26);
    // 25 rows in batches of 7, then the single row of the second file
    assert_eq!(store.bulk_upsert_sizes(), vec![7, 7, 7, 4, 1]);
}

#[tokio::test]
async fn test_short_rows_follow_decoder_policy() {
    let dir = tempfile::tempdir().unwrap();
    write_csv(dir.path(), "short.csv", "S-1,Lamp\nS-2,Rug,,80,2\n");
    let store = Arc::new(InMemoryProductStore::new());

    let skipped = processor(&dir, store.clone(), PipelineConfig::default())
        .process_files(&files(&["short.csv"]), None)
        .await
        .unwrap();
    assert_eq!(skipped.total_records, 1);
    assert_eq!(skipped.failed, 0);

    let decoder = CsvDecoder::new(
        DecoderConfig::default()
            .with_base_dir(dir.path())
            .with_short_row_policy(ShortRowPolicy::Fail),
    );
    let failing = CsvProcessor::new(store, Arc::new(decoder), PipelineConfig::default())
        .process_files(&files(&["short.csv"]), None)
        .await
        .unwrap();
    assert_eq!(failing.total_records, 2);
    assert_eq!(failing.failed, 1);
    assert!(failing.errors[0].starts_with("Row 2 (SKU: S-1): expected at least 5 fields"));
}

#[tokio::test]
async fn test_failed_batches_are_reported_per_row() {
    let dir = tempfile::tempdir().unwrap();
    write_csv(dir.path(), "batch.csv", "B-1,Lamp,,10,1\nB-2,Rug,,80,2\nB-3,,,1,1\n");

    let store = Arc::new(InMemoryProductStore::new());
    store.set_fail_bulk_upsert(true);

    let report = processor(&dir, store.clone(), PipelineConfig::default())
        .process_files(&files(&["batch.csv"]), None)
        .await
        .unwrap();

    assert_eq!(report.inserted, 0);
    assert_eq!(report.failed, 3);
    assert_eq!(report.errors.len(), 3);
    assert_eq!(
        report
            .errors
            .iter()
            .filter(|e| e.contains("bulk upsert failed"))
            .count(),
        2
    );
    assert!(store.is_empty());
}
