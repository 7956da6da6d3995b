//! HTTP handlers.
//!
//! Each handler calls into the `Scheduler` and returns a JSON response.
//! Errors are reported as `{"error": "..."}`.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use deskbroker_scheduler::{Scheduler, SchedulerError, SchedulerResult};
use deskbroker_state::Assignment;

use crate::ApiState;

const USER_ID_REQUIRED: &str = "userId required";
const NO_AVAILABLE_SERVERS: &str = "No available desktop servers";

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ErrorBody {
            error: msg.to_string(),
        }),
    )
}

fn scheduler_error(e: SchedulerError) -> axum::response::Response {
    match e {
        SchedulerError::NoAvailableNode => {
            error_response(NO_AVAILABLE_SERVERS, StatusCode::SERVICE_UNAVAILABLE).into_response()
        }
        SchedulerError::State(e) => {
            error!(error = %e, "assignment store failure");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}

/// Run a store-backed scheduler call on the blocking pool.
///
/// Store writes commit to disk, so they stay off the async workers.
async fn with_scheduler<T, F>(state: &ApiState, f: F) -> Result<T, axum::response::Response>
where
    F: FnOnce(&Scheduler) -> SchedulerResult<T> + Send + 'static,
    T: Send + 'static,
{
    let scheduler = state.scheduler.clone();
    match tokio::task::spawn_blocking(move || f(&*scheduler)).await {
        Ok(result) => result.map_err(scheduler_error),
        Err(e) => {
            error!(error = %e, "scheduler task failed");
            Err(error_response("internal error", StatusCode::INTERNAL_SERVER_ERROR).into_response())
        }
    }
}

/// Pull a non-empty `userId` out of a request body, or explain why not.
fn require_user_id<T>(
    payload: Result<Json<T>, JsonRejection>,
    user_id: impl Fn(&T) -> Option<&str>,
) -> Result<(T, String), axum::response::Response> {
    let Json(body) = payload.map_err(|rejection| {
        debug!(error = %rejection, "rejected request body");
        error_response(USER_ID_REQUIRED, StatusCode::BAD_REQUEST).into_response()
    })?;

    let id = user_id(&body)
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    match id {
        Some(id) => Ok((body, id)),
        None => Err(error_response(USER_ID_REQUIRED, StatusCode::BAD_REQUEST).into_response()),
    }
}

// ── Health ─────────────────────────────────────────────────────

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

// ── Assignment ─────────────────────────────────────────────────

/// Assign request body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub user_id: Option<String>,
    pub device_id: Option<String>,
    pub preferred_desktop: Option<String>,
}

/// POST /assign
pub async fn assign(
    State(state): State<ApiState>,
    payload: Result<Json<AssignRequest>, JsonRejection>,
) -> impl IntoResponse {
    let (req, user_id) = match require_user_id(payload, |r: &AssignRequest| r.user_id.as_deref()) {
        Ok(parsed) => parsed,
        Err(resp) => return resp,
    };

    let result = with_scheduler(&state, move |s| {
        s.assign(
            &user_id,
            req.device_id.as_deref(),
            req.preferred_desktop.as_deref(),
        )
    })
    .await;

    match result {
        Ok(assignment) => Json(assignment).into_response(),
        Err(resp) => resp,
    }
}

/// Release request body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRequest {
    pub user_id: Option<String>,
}

/// POST /release
///
/// Succeeds whether or not the user had an assignment.
pub async fn release(
    State(state): State<ApiState>,
    payload: Result<Json<ReleaseRequest>, JsonRejection>,
) -> impl IntoResponse {
    let (_, user_id) = match require_user_id(payload, |r: &ReleaseRequest| r.user_id.as_deref()) {
        Ok(parsed) => parsed,
        Err(resp) => return resp,
    };

    match with_scheduler(&state, move |s| s.release(&user_id)).await {
        Ok(_) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(resp) => resp,
    }
}

// ── Metrics ────────────────────────────────────────────────────

/// GET /metrics
pub async fn metrics(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.scheduler.node_metrics())
}

/// GET /metrics/prometheus
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let assignments = match with_scheduler(&state, |s| s.sessions()).await {
        Ok(sessions) => sessions.len(),
        Err(resp) => return resp,
    };

    let body = crate::prometheus::render_prometheus(&state.scheduler.node_metrics(), assignments);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}

// ── Sessions ───────────────────────────────────────────────────

/// One entry of the `/sessions` listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    pub user_id: String,
    #[serde(flatten)]
    pub assignment: Assignment,
}

#[derive(Debug, Serialize)]
struct SessionList {
    sessions: Vec<SessionEntry>,
    count: usize,
}

/// GET /sessions
pub async fn sessions(State(state): State<ApiState>) -> impl IntoResponse {
    match with_scheduler(&state, |s| s.sessions()).await {
        Ok(all) => {
            let sessions: Vec<SessionEntry> = all
                .into_iter()
                .map(|(user_id, assignment)| SessionEntry {
                    user_id,
                    assignment,
                })
                .collect();
            Json(SessionList {
                count: sessions.len(),
                sessions,
            })
            .into_response()
        }
        Err(resp) => resp,
    }
}
