//! API route handlers for the taskforge server.

pub mod health;
pub mod metrics;
pub mod monitor;
pub mod tasks;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET    /api/health - Health check
/// - POST   /api/tasks - Create, extend or supersede a task
/// - GET    /api/tasks?subject=&kind= - Live task of a queue
/// - GET    /api/tasks/{id} - Task snapshot
/// - DELETE /api/tasks/{id} - Delete a finished task (owner only)
/// - POST   /api/tasks/{id}/cancel - Cancel a task
/// - POST   /api/tasks/{id}/pause - Label a task paused
/// - GET    /api/tasks/{id}/monitor - SSE live monitor
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", tasks::router())
        .nest("/api", monitor::router())
        .merge(metrics::router())
        .with_state(state)
}
