//! Request handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use stratlab_core::{AnalysisRequest, IdempotencyKey, Lambda, RawTable, Symbol, TaskId};
use stratlab_data::reader::{read_bytes, read_str};
use stratlab_data::{inspect, DatasetSummary};
use stratlab_engine::AnalysisEngine;
use stratlab_traits::task::{TaskOutcome, TaskSnapshot, TaskStatus};

use crate::error::{ApiError, ApiResult};

/// Header carrying a client-chosen idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Application state.
pub struct AppState {
    /// The analysis engine
    pub engine: Arc<AnalysisEngine>,
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
    workers_running: bool,
}

/// Health check handler.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        workers_running: state.engine.pool().is_running(),
    })
}

// =============================================================================
// Datasets
// =============================================================================

/// A dataset given either as a table or as delimited text.
#[derive(Debug, Default, Deserialize)]
pub struct DatasetSource {
    /// Structured table
    #[serde(default)]
    pub dataset: Option<RawTable>,
    /// CSV, TSV or semicolon-separated text with a header row
    #[serde(default)]
    pub csv: Option<String>,
}

impl DatasetSource {
    fn into_table(self) -> ApiResult<RawTable> {
        match (self.dataset, self.csv) {
            (Some(table), None) => Ok(table),
            (None, Some(text)) => Ok(read_str(&text)?),
            (Some(_), Some(_)) => Err(ApiError::BadRequest(
                "provide either 'dataset' or 'csv', not both".into(),
            )),
            (None, None) => Err(ApiError::BadRequest(
                "one of 'dataset' or 'csv' is required".into(),
            )),
        }
    }
}

/// Summarize a dataset without running an analysis.
pub async fn inspect_dataset(Json(source): Json<DatasetSource>) -> ApiResult<Json<DatasetSummary>> {
    let table = source.into_table()?;
    Ok(Json(inspect(&table)?))
}

/// Summarize an uploaded file (CSV, TSV or Parquet) sent as the raw body.
pub async fn inspect_upload(body: Bytes) -> ApiResult<Json<DatasetSummary>> {
    let table = read_upload(body)?;
    Ok(Json(inspect(&table)?))
}

fn read_upload(body: Bytes) -> ApiResult<RawTable> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("upload body is empty".into()));
    }
    Ok(read_bytes(body)?)
}

// =============================================================================
// Analyses
// =============================================================================

/// Analysis parameters shared by JSON and file submissions.
#[derive(Debug, Default, Deserialize)]
pub struct AnalysisParams {
    /// Shrinkage factor in `[0, 1]`
    pub lambda: Option<f64>,
    /// Benchmark symbol
    pub benchmark: Option<String>,
    /// Volatility prior for shrinkage
    pub prior_volatility: Option<f64>,
    /// Result retention, in seconds
    pub ttl_secs: Option<u64>,
    /// Deduplication key; the `Idempotency-Key` header takes precedence
    pub idempotency_key: Option<String>,
}

/// Body of `POST /api/v1/analyses`.
#[derive(Debug, Deserialize)]
pub struct SubmitAnalysisBody {
    /// Input data
    #[serde(flatten)]
    pub source: DatasetSource,
    /// Analysis parameters
    #[serde(flatten)]
    pub params: AnalysisParams,
}

/// Response to an accepted submission.
#[derive(Debug, Serialize)]
pub struct SubmitAnalysisResponse {
    /// Task to poll
    pub task_id: TaskId,
    /// Status at acceptance
    pub status: TaskStatus,
    /// Whether an earlier task with the same key was returned
    pub deduplicated: bool,
}

/// Submit an analysis. Returns 202 with the task id.
pub async fn submit_analysis(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SubmitAnalysisBody>,
) -> ApiResult<(StatusCode, Json<SubmitAnalysisResponse>)> {
    let table = body.source.into_table()?;
    submit(&state, &headers, table, body.params).await
}

/// Submit an uploaded file (CSV, TSV or Parquet) sent as the raw body, with
/// parameters in the query string.
pub async fn submit_upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<AnalysisParams>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SubmitAnalysisResponse>)> {
    let table = read_upload(body)?;
    submit(&state, &headers, table, params).await
}

async fn submit(
    state: &AppState,
    headers: &HeaderMap,
    table: RawTable,
    params: AnalysisParams,
) -> ApiResult<(StatusCode, Json<SubmitAnalysisResponse>)> {
    let defaults = state.engine.config();

    let lambda = match params.lambda {
        Some(value) => Lambda::new(value)?,
        None => defaults.default_lambda,
    };
    let benchmark = match &params.benchmark {
        Some(symbol) => Symbol::new(symbol)?,
        None => defaults.default_benchmark.clone(),
    };

    let mut request = AnalysisRequest::new(table)
        .with_lambda(lambda)
        .with_benchmark(benchmark);
    if let Some(prior) = params.prior_volatility {
        request = request.with_prior_volatility(prior)?;
    }
    if let Some(ttl) = params.ttl_secs {
        request = request.with_result_ttl(Duration::from_secs(ttl));
    }

    let key = idempotency_key(headers, params.idempotency_key)?;
    let submission = state.engine.submit(request, key).await?;
    let status = if submission.deduplicated {
        state.engine.poll(&submission.task_id).await?.status
    } else {
        TaskStatus::Pending
    };
    debug!(task_id = %submission.task_id, deduplicated = submission.deduplicated, "analysis accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitAnalysisResponse {
            task_id: submission.task_id,
            status,
            deduplicated: submission.deduplicated,
        }),
    ))
}

fn idempotency_key(
    headers: &HeaderMap,
    from_body: Option<String>,
) -> ApiResult<Option<IdempotencyKey>> {
    let from_header = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .map(|v| {
            v.to_str()
                .map(str::to_string)
                .map_err(|_| ApiError::BadRequest("Idempotency-Key must be visible ASCII".into()))
        })
        .transpose()?;

    from_header
        .or(from_body)
        .map(IdempotencyKey::new)
        .transpose()
        .map_err(ApiError::from)
}

/// Current status of an analysis.
pub async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskSnapshot>> {
    let snapshot = state.engine.poll(&TaskId::parse(task_id)?).await?;
    Ok(Json(snapshot))
}

/// Terminal outcome of an analysis. 409 while it is still pending or running.
pub async fn get_analysis_result(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskOutcome>> {
    let outcome = state.engine.fetch_result(&TaskId::parse(task_id)?).await?;
    Ok(Json(outcome))
}
