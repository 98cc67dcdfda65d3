//! Route definitions.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use stratlab_engine::AnalysisEngine;

use crate::handlers::{self, AppState};

/// Create the API router.
///
/// # Arguments
/// * `engine` - The analysis engine
pub fn create_router(engine: Arc<AnalysisEngine>) -> Router {
    let state = Arc::new(AppState { engine });

    Router::new()
        // Health
        .route("/health", get(handlers::health))
        .route("/api/v1/health", get(handlers::health))
        // Analyses
        .route("/api/v1/analyses", post(handlers::submit_analysis))
        .route("/api/v1/analyses/upload", post(handlers::submit_upload))
        .route("/api/v1/analyses/:task_id", get(handlers::get_analysis))
        .route(
            "/api/v1/analyses/:task_id/result",
            get(handlers::get_analysis_result),
        )
        // Datasets
        .route("/api/v1/datasets/inspect", post(handlers::inspect_dataset))
        .route(
            "/api/v1/datasets/inspect/upload",
            post(handlers::inspect_upload),
        )
        .with_state(state)
}
