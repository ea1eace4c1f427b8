//! Catalog Server Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! HTTP front end for the catalog ingestion pipeline.
//!
//! # Overview
//!
//! - **Routes**: CSV processing, product listing and health endpoints
//! - **Configuration**: environment-based, loaded through `dotenvy`
//! - **Middleware**: CORS and request tracing from `tower-http`
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use catalog_ingest::decoder::CsvDecoder;
//! use catalog_ingest::store::InMemoryProductStore;
//! use catalog_ingest::CsvProcessor;
//! use catalog_server::{app, config::Config, routes::AppState};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let processor = CsvProcessor::new(
//!         Arc::new(InMemoryProductStore::new()),
//!         Arc::new(CsvDecoder::new(config.decoder.clone())),
//!         config.pipeline.clone(),
//!     );
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, app(AppState::new(processor), &config)).await?;
//!     Ok(())
//! }
//! ```

use axum::Router;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tracing::{info, warn};

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;

pub use error::{AppError, AppResult};

/// Build the application router with its middleware stack
pub fn app(state: routes::AppState, config: &config::Config) -> Router {
    routes::router(state).layer(
        ServiceBuilder::new()
            .layer(middleware::tracing_layer())
            .layer(middleware::cors_layer(&config.cors)),
    )
}

/// Serve `router` until `shutdown` resolves, then let open connections drain
///
/// Connections still open `drain_timeout` after the signal are dropped.
pub async fn serve<F>(
    listener: TcpListener,
    router: Router,
    shutdown: F,
    drain_timeout: Duration,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                let _ = signalled_tx.send(());
            })
            .await
    });

    // Resolves on the signal, or early if the server stopped on its own
    let _ = signalled_rx.await;

    match tokio::time::timeout(drain_timeout, &mut server).await {
        Ok(joined) => {
            joined??;
            info!("Server shut down gracefully");
        },
        Err(_) => {
            warn!(
                "Connections still open after {} seconds, forcing shutdown",
                drain_timeout.as_secs()
            );
            server.abort();
        },
    }

    Ok(())
}
