//! # StratLab Server
//!
//! REST surface for the StratLab analysis engine.
//!
//! ## Endpoints
//!
//! - `GET  /health`, `GET /api/v1/health`
//! - `POST /api/v1/analyses` submits an analysis and returns `202` with a task id
//! - `POST /api/v1/analyses/upload` submits a raw CSV, TSV or Parquet file body
//! - `GET  /api/v1/analyses/:task_id` polls its status
//! - `GET  /api/v1/analyses/:task_id/result` fetches the terminal outcome
//! - `POST /api/v1/datasets/inspect` summarizes a dataset synchronously
//! - `POST /api/v1/datasets/inspect/upload` does the same for a raw file body
//!
//! ## Usage
//!
//! ```ignore
//! use stratlab_server::{build_engine, Server, ServerConfig};
//!
//! let config = ServerConfig::load("config/stratlab.toml")?;
//! let engine = Arc::new(build_engine(&config)?);
//! engine.start();
//! Server::new(config, engine).start().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;

use std::io;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use stratlab_engine::{AnalysisEngine, AnalysisEngineBuilder, InMemoryTaskQueue, InMemoryTaskStore};
use stratlab_traits::queue::TaskQueue;
use stratlab_traits::store::TaskStore;

pub use config::{BrokerUrl, ConfigError, ServerConfig, StoreUrl};
pub use error::{ApiError, ApiResult};

/// Open the configured store and broker and assemble an engine.
pub fn build_engine(config: &ServerConfig) -> anyhow::Result<AnalysisEngine> {
    let engine_config = config.engine_config()?;

    let store: Arc<dyn TaskStore> = match config.result_store()? {
        StoreUrl::Memory => {
            info!("Using in-memory result store");
            Arc::new(InMemoryTaskStore::new())
        }
        StoreUrl::Redb(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            info!("Opening result store at {}", path.display());
            Arc::new(stratlab_ext_redb::create_redb_task_store(&path)?)
        }
    };

    let queue: Arc<dyn TaskQueue> = match config.broker()? {
        BrokerUrl::Memory => Arc::new(InMemoryTaskQueue::new()),
    };

    let engine = AnalysisEngineBuilder::new()
        .with_config(engine_config)
        .with_store(store)
        .with_queue(queue)
        .build()?;
    Ok(engine)
}

/// The StratLab server.
pub struct Server {
    config: ServerConfig,
    engine: Arc<AnalysisEngine>,
}

impl Server {
    /// Create a new server.
    pub fn new(config: ServerConfig, engine: Arc<AnalysisEngine>) -> Self {
        Self { config, engine }
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        routes::create_router(self.engine.clone())
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    /// Serve until Ctrl+C.
    pub async fn start(&self) -> Result<(), io::Error> {
        let addr = self
            .config
            .bind_addr()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        info!("Starting StratLab server on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}
