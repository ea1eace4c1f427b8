//! Core types flowing through the ingestion pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::RecordError;

/// Positions of the product columns in an input row
pub mod columns {
    pub const SKU: usize = 0;
    pub const NAME: usize = 1;
    pub const DESCRIPTION: usize = 2;
    pub const PRICE: usize = 3;
    pub const STOCK: usize = 4;

    /// Number of leading columns a row must carry to describe a product
    pub const REQUIRED: usize = 5;
}

/// One decoded row, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Origin line in the source file (the header is line 1)
    pub line: u64,
    pub fields: Vec<String>,
}

impl RawRecord {
    pub fn new(line: u64, fields: Vec<String>) -> Self {
        Self { line, fields }
    }

    /// Field at `index`, or `""` when the row is shorter
    pub fn field(&self, index: usize) -> &str {
        self.fields.get(index).map(String::as_str).unwrap_or("")
    }

    /// Natural key of the row, if it carries a non-empty one
    pub fn sku(&self) -> Option<&str> {
        Some(self.field(columns::SKU)).filter(|sku| !sku.is_empty())
    }
}

/// A catalog product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    /// Identity assigned by the store on first insert
    pub id: Option<i64>,
    /// Natural key, unique across the catalog
    pub sku: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub stock: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Product {
    /// A product that has not been persisted yet
    pub fn new(
        sku: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        price: f64,
        stock: i64,
    ) -> Self {
        Self {
            id: None,
            sku: sku.into(),
            name: name.into(),
            description: description.into(),
            price,
            stock,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Unit of work handed to a worker
#[derive(Debug, Clone)]
pub struct Job {
    pub record: RawRecord,
    pub file: String,
}

/// What a worker decided for one record
#[derive(Debug, Clone)]
pub enum Disposition {
    Success { product: Product, is_update: bool },
    Failure { sku: Option<String>, error: RecordError },
}

/// Result of processing one record, produced by exactly one worker
#[derive(Debug, Clone)]
pub struct Outcome {
    pub row: u64,
    pub file: String,
    pub disposition: Disposition,
}

impl Outcome {
    pub fn success(row: u64, file: impl Into<String>, product: Product, is_update: bool) -> Self {
        Self {
            row,
            file: file.into(),
            disposition: Disposition::Success { product, is_update },
        }
    }

    pub fn failure(
        row: u64,
        file: impl Into<String>,
        sku: Option<String>,
        error: RecordError,
    ) -> Self {
        Self {
            row,
            file: file.into(),
            disposition: Disposition::Failure { sku, error },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.disposition, Disposition::Failure { .. })
    }
}

/// Render the error line recorded for a failed row
pub fn row_error_line(row: u64, sku: Option<&str>, reason: &impl std::fmt::Display) -> String {
    match sku {
        Some(sku) => format!("Row {} (SKU: {}): {}", row, sku, reason),
        None => format!("Row {}: {}", row, reason),
    }
}

/// Outcome statistics for one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    pub total_records: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
    /// Error lines in completion order, not row order
    pub errors: Vec<String>,
}

impl FileReport {
    pub fn new(total_records: usize) -> Self {
        Self {
            total_records,
            ..Self::default()
        }
    }

    pub fn processed(&self) -> usize {
        self.inserted + self.updated + self.failed
    }
}

/// Aggregate statistics across every file of one request
#[derive(Debug, Clone, Default, Serialize)]
pub struct OverallReport {
    pub total_records: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    #[serde(rename = "processing_time_ms", serialize_with = "serialize_millis")]
    pub processing_time: Duration,
    pub file_results: BTreeMap<String, FileReport>,
}

impl OverallReport {
    /// Fold a finished file into the totals
    pub fn merge_file(&mut self, file: impl Into<String>, report: FileReport) {
        self.total_records += report.total_records;
        self.inserted += report.inserted;
        self.updated += report.updated;
        self.failed += report.failed;
        self.errors.extend(report.errors.iter().cloned());
        self.file_results.insert(file.into(), report);
    }

    /// Record a file that could not be processed at all
    pub fn record_file_error(&mut self, file: &str, error: &impl std::fmt::Display) {
        self.errors.push(format!("File {}: {}", file, error));
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Periodic progress notification for one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub file: String,
    pub processed: usize,
    pub total_records: usize,
    pub percentage: f64,
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(file: &str, processed: usize, report: &FileReport) -> Self {
        let percentage = percentage(processed, report.total_records);
        Self {
            file: file.to_string(),
            processed,
            total_records: report.total_records,
            percentage,
            inserted: report.inserted,
            updated: report.updated,
            failed: report.failed,
            message: format!("Processing {}: {:.2}% complete", file, percentage),
        }
    }
}

/// `processed / total * 100`, defined as 0 for an empty file
pub fn percentage(processed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    processed as f64 / total as f64 * 100.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_guards_empty_total() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(5, 0), 0.0);
        assert_eq!(percentage(10, 25), 40.0);
        assert_eq!(percentage(25, 25), 100.0);
    }

    #[test]
    fn test_raw_record_field_access() {
        let record = RawRecord::new(2, vec!["SKU-1".to_string(), "Lamp".to_string()]);
        assert_eq!(record.field(columns::NAME), "Lamp");
        assert_eq!(record.field(columns::PRICE), "");
        assert_eq!(record.sku(), Some("SKU-1"));

        let keyless = RawRecord::new(3, vec![String::new()]);
        assert_eq!(keyless.sku(), None);
    }

    #[test]
    fn test_row_error_line_formats() {
        assert_eq!(
            row_error_line(4, Some("SKU-9"), &"invalid price"),
            "Row 4 (SKU: SKU-9): invalid price"
        );
        assert_eq!(row_error_line(5, None, &"missing"), "Row 5: missing");
    }

    #[test]
    fn test_merge_file_sums_counts() {
        let mut overall = OverallReport::default();
        overall.merge_file(
            "a.csv",
            FileReport {
                total_records: 3,
                inserted: 1,
                updated: 1,
                failed: 1,
                errors: vec!["Row 2: bad".to_string()],
            },
        );
        overall.merge_file("b.csv", FileReport {
            total_records: 2,
            inserted: 2,
            ..FileReport::default()
        });
        overall.record_file_error("c.csv", &"not found");

        assert_eq!(overall.total_records, 5);
        assert_eq!(overall.inserted, 3);
        assert_eq!(overall.failed, 1);
        assert_eq!(overall.file_results.len(), 2);
        assert_eq!(overall.errors, vec!["Row 2: bad", "File c.csv: not found"]);
    }

    #[test]
    fn test_overall_report_serializes_millis() {
        let report = OverallReport {
            processing_time: Duration::from_millis(1500),
            ..OverallReport::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["processing_time_ms"], 1500);
        assert!(json["file_results"].is_object());
    }
}
