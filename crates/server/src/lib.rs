// crates/server/src/lib.rs
//! Taskforge server library.
//!
//! Axum HTTP server that accepts long-running generation requests, runs them
//! on supervised background executors and streams their progress to any
//! number of monitors.

pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod jobs;
pub mod metrics;
pub mod monitor;
pub mod reaper;
pub mod routes;
pub mod state;

pub use config::{ExecutorSettings, MonitorSettings, ReaperSettings, RuntimeSettings, ServerConfig};
pub use controller::{TaskController, TaskRequest};
pub use error::*;
pub use executor::{ExecutorOutcome, TaskExecutor};
pub use jobs::{ActiveExecutor, TaskSupervisor};
pub use metrics::{init_metrics, render_metrics};
pub use monitor::{MonitorCursor, MonitorEvent};
pub use reaper::StaleTaskReaper;
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes under `/api` plus `/metrics`
/// - CORS (allows any origin; monitors may run on another device)
/// - Request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Integration Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use taskforge_core::{
        GenerationContext, GenerationEngine, GenerationError, GenerationOutput, ItemDescriptor,
        UnmeteredLedger,
    };
    use taskforge_db::{Database, SqliteContentStore};
    use tower::ServiceExt;

    struct EchoEngine;

    #[async_trait::async_trait]
    impl GenerationEngine for EchoEngine {
        async fn generate(
            &self,
            item: &ItemDescriptor,
            context: GenerationContext,
        ) -> Result<GenerationOutput, GenerationError> {
            Ok(GenerationOutput {
                content: item.item_id.to_string(),
                context,
            })
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    async fn test_app() -> Router {
        let db = Database::new_in_memory().await.expect("in-memory DB");
        let store = Arc::new(SqliteContentStore::new(db.clone()));
        let state = AppState::new(
            db,
            Arc::new(EchoEngine),
            store,
            Arc::new(UnmeteredLedger),
            RuntimeSettings::default(),
        );
        create_app(state)
    }

    /// Helper to make a GET request to the app.
    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint_response_structure() {
        let (status, body) = get(test_app().await, "/api/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert!(json["uptime_secs"].is_number());
        assert_eq!(json["active_executors"], 0);
    }

    #[tokio::test]
    async fn test_unknown_task_is_404() {
        let (status, body) = get(test_app().await, "/api/tasks/nope").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"], "Task not found");
    }

    #[tokio::test]
    async fn test_monitor_unknown_task_is_404() {
        let (status, _) = get(test_app().await, "/api/tasks/nope/monitor").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let response = test_app()
            .await
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .header("Origin", "http://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let allow_origin = response.headers().get("access-control-allow-origin");
        assert_eq!(allow_origin.unwrap(), "*");
    }

    #[tokio::test]
    async fn test_404_for_non_api_path() {
        let (status, _) = get(test_app().await, "/health").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
