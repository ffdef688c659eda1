use axum::extract::Extension;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::jobs::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    database: DatabaseHealth,
    queue_depth: QueueDepth,
}

#[derive(Serialize)]
pub struct DatabaseHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
pub struct QueueDepth {
    high: usize,
    standard: usize,
    low: usize,
}

/// Returns 200 when the database answers within 5s, 503 otherwise.
pub async fn health_handler(Extension(state): Extension<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_health = match tokio::time::timeout(std::time::Duration::from_secs(5), sqlx::query("SELECT 1").execute(&state.db_pool)).await {
        Ok(Ok(_)) => DatabaseHealth { status: "ok".to_string(), error: None },
        Ok(Err(e)) => DatabaseHealth { status: "error".to_string(), error: Some(format!("query failed: {e}")) },
        Err(_) => DatabaseHealth { status: "error".to_string(), error: Some("query timeout (>5s)".to_string()) },
    };

    let queue_depth = QueueDepth {
        high: state.store.queue_len("priority:high").await,
        standard: state.store.queue_len("priority:standard").await,
        low: state.store.queue_len("priority:low").await,
    };

    let healthy = db_health.status == "ok";
    let status_code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status_code,
        Json(HealthResponse { status: if healthy { "healthy" } else { "unhealthy" }.to_string(), database: db_health, queue_depth }),
    )
}
