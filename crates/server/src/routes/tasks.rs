// crates/server/src/routes/tasks.rs
//! Task lifecycle endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use taskforge_core::{ItemId, Resolution, TaskId, TaskKind, TaskRecord};

use crate::controller::TaskRequest;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Owner recorded when a request does not name one.
pub const DEFAULT_OWNER: &str = "anonymous";

/// Header carrying the caller's identity for owner-only operations.
pub const OWNER_HEADER: &str = "x-task-owner";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskBody {
    pub subject: String,
    pub kind: TaskKind,
    pub target_count: i64,
    pub start_offset: ItemId,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(test, derive(Deserialize))]
pub struct CreateTaskResponse {
    pub task_id: TaskId,
    pub resolution: Resolution,
}

#[derive(Debug, Deserialize)]
pub struct ActiveTaskQuery {
    pub subject: String,
    pub kind: TaskKind,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct PauseResponse {
    pub paused: bool,
}

/// POST /api/tasks: create, extend or supersede the live task of a queue.
///
/// 201 when a new task row was written, 200 when an existing one absorbed
/// the request.
async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTaskBody>,
) -> ApiResult<(StatusCode, Json<CreateTaskResponse>)> {
    let request = TaskRequest {
        owner: body.owner.unwrap_or_else(|| DEFAULT_OWNER.to_string()),
        subject: body.subject,
        kind: body.kind,
        target_count: body.target_count,
        start_offset: body.start_offset,
    };
    let (task_id, resolution) = state.controller.create_or_extend(&request).await?;
    let status = if resolution.needs_executor() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(CreateTaskResponse { task_id, resolution })))
}

/// GET /api/tasks?subject=&kind=: the live task of a queue.
async fn find_active_task(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActiveTaskQuery>,
) -> ApiResult<Json<TaskRecord>> {
    state
        .controller
        .find_active(&query.subject, query.kind)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::TaskNotFound(format!("no live {} task for {}", query.kind, query.subject)))
}

/// GET /api/tasks/{id}
async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskRecord>> {
    Ok(Json(state.controller.get(&id).await?))
}

/// DELETE /api/tasks/{id}: owner-only, finished tasks only.
async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let owner = headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("missing {OWNER_HEADER} header")))?;
    state.controller.delete(&id, owner).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/tasks/{id}/cancel
async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let cancelled = state.controller.cancel(&id).await?;
    Ok(Json(CancelResponse { cancelled }))
}

/// POST /api/tasks/{id}/pause
async fn pause_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<PauseResponse>> {
    let paused = state.controller.pause(&id).await?;
    Ok(Json(PauseResponse { paused }))
}

/// Create the task routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", post(create_task).get(find_active_task))
        .route("/tasks/{id}", get(get_task).delete(delete_task))
        .route("/tasks/{id}/cancel", post(cancel_task))
        .route("/tasks/{id}/pause", post(pause_task))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_body_accepts_camel_case_without_owner() {
        let body: CreateTaskBody = serde_json::from_str(
            r#"{"subject":"bookA","kind":"chapters","targetCount":5,"startOffset":10}"#,
        )
        .unwrap();
        assert_eq!(body.kind, TaskKind::Chapters);
        assert_eq!(body.target_count, 5);
        assert_eq!(body.start_offset, 10);
        assert!(body.owner.is_none());
    }

    #[test]
    fn test_create_response_serialization() {
        let json = serde_json::to_string(&CreateTaskResponse {
            task_id: "t-1".to_string(),
            resolution: Resolution::Extended,
        })
        .unwrap();
        assert_eq!(json, r#"{"taskId":"t-1","resolution":"extended"}"#);
    }
}
