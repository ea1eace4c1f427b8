//! HTTP routes
//!
//! - `POST /api/v1/csv/process`: run the ingestion pipeline over a list of files
//! - `GET /api/v1/products`: list stored products
//! - `GET /health`: store connectivity

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use catalog_ingest::models::{OverallReport, ProgressEvent};
use catalog_ingest::store::ProductStore;
use catalog_ingest::CsvProcessor;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::PROGRESS_BUFFER;
use crate::error::{AppError, AppResult};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub processor: CsvProcessor,
    pub store: Arc<dyn ProductStore>,
}

impl AppState {
    pub fn new(processor: CsvProcessor) -> Self {
        let store = Arc::clone(processor.store());
        Self { processor, store }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub file_paths: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub message: &'static str,
    pub result: OverallReport,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/csv/process", post(process_csv))
        .route("/api/v1/products", get(list_products))
        .with_state(state)
}

/// Run the pipeline synchronously and return the combined report
async fn process_csv(
    State(state): State<AppState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> AppResult<Json<ProcessResponse>> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    info!(files = request.file_paths.len(), "CSV processing requested");

    let (progress_tx, mut progress_rx) = mpsc::channel::<ProgressEvent>(PROGRESS_BUFFER);
    let drain = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            debug!(
                file = %event.file,
                processed = event.processed,
                total = event.total_records,
                "{}",
                event.message
            );
        }
    });

    let result = state
        .processor
        .process_files(&request.file_paths, Some(progress_tx))
        .await;
    drain
        .await
        .map_err(|e| AppError::Internal(format!("progress drain failed: {e}")))?;

    Ok(Json(ProcessResponse {
        message: "CSV files processed successfully",
        result: result?,
    }))
}

async fn list_products(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let products = state.store.list().await?;
    Ok(Json(json!({
        "count": products.len(),
        "products": products,
    })))
}

async fn health_check(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    state.store.ping().await.map_err(|e| {
        tracing::error!("Store health check failed: {}", e);
        AppError::Unavailable("store unreachable".to_string())
    })?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "store": "connected"
        })),
    ))
}
