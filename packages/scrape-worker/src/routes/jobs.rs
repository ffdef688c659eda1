use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use scrape_core::coordination::CoordinationStore;
use scrape_core::dispatcher::{ArtifactRepository, JobRepository};
use scrape_core::security::{ensure_url_allowed, DnsResolver};
use scrape_core::types::artifact::ArtifactType;
use scrape_core::types::config::SsrfConfig;
use scrape_core::types::job::{Engine, Job, JobState, Priority};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub jobs: Arc<dyn JobRepository>,
    pub artifacts: Arc<dyn ArtifactRepository>,
    pub store: Arc<dyn CoordinationStore>,
    pub dns_resolver: Arc<dyn DnsResolver>,
    pub ssrf: SsrfConfig,
}

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub url: String,
    pub schema_id: Option<Uuid>,
    pub tenant: Option<String>,
    pub priority: Option<String>,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub state: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn priority_from_str(s: &str) -> Priority {
    Priority::ALL.into_iter().find(|p| p.as_str() == s).unwrap_or(Priority::Standard)
}

pub async fn submit_handler(
    Extension(state): Extension<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, (StatusCode, Json<ErrorResponse>)> {
    ensure_url_allowed(&req.url, &state.ssrf, state.dns_resolver.as_ref())
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: e.code().to_string() })))?;

    let now = Utc::now();
    let mut job = Job::new(req.url, now);
    job.schema_id = req.schema_id;
    job.tenant = req.tenant;
    job.priority = req.priority.as_deref().map(priority_from_str).unwrap_or(Priority::Standard);

    state.jobs.save(&job).await;
    state.store.queue_push(&format!("priority:{}", job.priority.as_str()), job.id).await;

    Ok(Json(SubmitResponse { job_id: job.id, state: "queued" }))
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub job_id: Uuid,
    pub state: String,
    pub priority: String,
    pub engine: Option<&'static str>,
    pub schema_id: Option<Uuid>,
    pub tenant: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

fn state_str(s: JobState) -> &'static str {
    match s {
        JobState::Queued => "queued",
        JobState::Running => "running",
        JobState::Succeeded => "succeeded",
        JobState::Failed => "failed",
        JobState::Escalated => "escalated",
    }
}

pub async fn status_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<StatusResponse>, StatusCode> {
    let job = state.jobs.get(job_id).await.ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(StatusResponse {
        job_id: job.id,
        state: state_str(job.state).to_string(),
        priority: job.priority.as_str().to_string(),
        engine: job.engine.map(Engine::as_str),
        schema_id: job.schema_id,
        tenant: job.tenant,
        created_at: job.created_at,
        updated_at: job.updated_at,
    }))
}

#[derive(Serialize)]
pub struct ArtifactResponse {
    pub r#type: &'static str,
    pub location: String,
    pub checksum: String,
}

fn artifact_type_str(t: ArtifactType) -> &'static str {
    match t {
        ArtifactType::Html => "html",
        ArtifactType::Screenshot => "screenshot",
        ArtifactType::Har => "har",
        ArtifactType::Ocr => "ocr",
    }
}

#[derive(Serialize)]
pub struct ResultsResponse {
    pub job_id: Uuid,
    pub state: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub artifacts: Vec<ArtifactResponse>,
}

pub async fn results_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ResultsResponse>, StatusCode> {
    let job = state.jobs.get(job_id).await.ok_or(StatusCode::NOT_FOUND)?;
    let artifacts = state
        .artifacts
        .list_for_job(job_id)
        .await
        .into_iter()
        .map(|a| ArtifactResponse { r#type: artifact_type_str(a.r#type), location: a.location, checksum: a.checksum })
        .collect();
    Ok(Json(ResultsResponse { job_id: job.id, state: state_str(job.state).to_string(), data: job.result, error: job.error, artifacts }))
}
