//! HTTP façade over the job queue.
//!
//! A thin REST layer: it creates job records through the dispatcher and
//! reads them back from the job store. All queue mechanics live behind
//! those two seams.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tokio_util::sync::CancellationToken;
use tracing::error;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::job_store::{JobPriority, JobRecord, JobStatus};
use crate::queue::SubmitError;

use super::http_layers::log_requests;
use super::state::{GuardedDispatcher, GuardedJobStore, ServerState};
use super::ServerConfig;

#[derive(Deserialize, Debug)]
struct CreateJobBody {
    #[serde(rename = "type")]
    job_type: Option<String>,
    priority: Option<String>,
    payload: Option<JsonValue>,
}

#[derive(Serialize)]
struct CreateJobResponse {
    #[serde(rename = "jobId")]
    job_id: String,
}

/// API view of a job record.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobView {
    id: String,
    #[serde(rename = "type")]
    job_type: String,
    status: JobStatus,
    priority: JobPriority,
    attempts: i64,
    result: Option<JsonValue>,
    error: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl JobView {
    fn from_record(record: JobRecord) -> Self {
        Self {
            id: record.id,
            job_type: record.job_type,
            status: record.status,
            priority: record.priority,
            attempts: record.attempts,
            result: record.result,
            error: record.error,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}

async fn health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

async fn create_job(
    State(dispatcher): State<GuardedDispatcher>,
    Json(body): Json<CreateJobBody>,
) -> Response {
    let job_type = match body.job_type {
        Some(t) if !t.is_empty() => t,
        _ => return bad_request("type and payload are required"),
    };
    let payload = match body.payload {
        Some(p) if !p.is_null() => p,
        _ => return bad_request("type and payload are required"),
    };
    let priority = match body.priority.as_deref() {
        None => JobPriority::Default,
        Some(s) => match JobPriority::from_str(s) {
            Some(p) => p,
            None => return bad_request("priority must be \"default\" or \"high\""),
        },
    };

    match dispatcher.submit(&job_type, priority, payload) {
        Ok(job_id) => (StatusCode::CREATED, Json(CreateJobResponse { job_id })).into_response(),
        Err(SubmitError::InvalidRequest(message)) => bad_request(&message),
        Err(SubmitError::Store(e)) => {
            error!("Error creating job: {:#}", e);
            internal_error()
        }
    }
}

async fn get_job(State(store): State<GuardedJobStore>, Path(id): Path<String>) -> Response {
    match store.fetch(&id) {
        Ok(Some(record)) => Json(JobView::from_record(record)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Job not found" })),
        )
            .into_response(),
        Err(e) => {
            error!("Error fetching job {}: {:#}", id, e);
            internal_error()
        }
    }
}

async fn get_stats(State(store): State<GuardedJobStore>) -> Response {
    match store.stats() {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => {
            error!("Error fetching job stats: {:#}", e);
            internal_error()
        }
    }
}

pub fn make_app(state: ServerState) -> Router {
    let app: Router = Router::new()
        .route("/health", get(health))
        .route("/jobs", post(create_job))
        .route("/jobs/{id}", get(get_job))
        .route("/stats", get(get_stats))
        .with_state(state.clone());

    app.layer(middleware::from_fn_with_state(state, log_requests))
}

/// Bind and serve until `shutdown` is cancelled, then finish in-flight
/// requests and return.
pub async fn run_server(
    job_store: GuardedJobStore,
    dispatcher: GuardedDispatcher,
    config: ServerConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let port = config.port;
    let state = ServerState::new(config, job_store, dispatcher);
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
