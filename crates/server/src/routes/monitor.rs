// crates/server/src/routes/monitor.rs
//! SSE live monitor for one task.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use taskforge_core::{ErrorClass, TaskId};

use crate::error::ApiResult;
use crate::metrics::{monitor_attached, monitor_detached};
use crate::monitor::{MonitorCursor, MonitorEvent};
use crate::state::AppState;

/// Keeps the active-monitor gauge honest however the stream ends.
struct MonitorGuard {
    task_id: TaskId,
}

impl MonitorGuard {
    fn new(task_id: TaskId) -> Self {
        monitor_attached();
        Self { task_id }
    }
}

impl Drop for MonitorGuard {
    fn drop(&mut self) {
        monitor_detached();
        tracing::debug!(task_id = %self.task_id, error_class = %ErrorClass::Transport, "Monitor detached");
    }
}

enum Tick {
    Poll,
    Heartbeat,
    Shutdown,
}

fn to_event(event: &MonitorEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().data(json)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize monitor event");
            None
        }
    }
}

/// GET /api/tasks/{id}/monitor: SSE stream of a task's progress.
///
/// Frames are `data: {"type": ...}`. The stream opens with `start` and a
/// snapshot, then emits deltas each poll and a `heartbeat` on its own
/// interval, and closes after `done` or `error`. Unknown ids are a 404
/// before the stream opens.
async fn monitor_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    let record = state.controller.get(&id).await?;
    let (mut cursor, opening) = MonitorCursor::attach(&record);

    let db = state.db.clone();
    let shutdown = state.shutdown.clone();
    let settings = state.monitor;

    let stream = async_stream::stream! {
        let _guard = MonitorGuard::new(id.clone());
        tracing::debug!(task_id = %id, "Monitor attached");

        for event in &opening {
            if let Some(frame) = to_event(event) {
                yield Ok(frame);
            }
        }

        let mut poll = tokio::time::interval(settings.poll_interval);
        let mut heartbeat = tokio::time::interval(settings.heartbeat_interval);
        // both fire immediately on creation; skip those
        poll.tick().await;
        heartbeat.tick().await;

        while !cursor.is_finished() {
            let tick = tokio::select! {
                _ = shutdown.cancelled() => Tick::Shutdown,
                _ = heartbeat.tick() => Tick::Heartbeat,
                _ = poll.tick() => Tick::Poll,
            };

            let events = match tick {
                Tick::Shutdown => break,
                Tick::Heartbeat => vec![MonitorEvent::heartbeat()],
                Tick::Poll => match db.get_task(&id).await {
                    Ok(Some(record)) => cursor.advance(&record),
                    Ok(None) => vec![cursor.vanished()],
                    Err(e) => {
                        tracing::warn!(task_id = %id, error = %e, "Monitor poll failed; retrying next tick");
                        Vec::new()
                    }
                },
            };

            for event in &events {
                if let Some(frame) = to_event(event) {
                    yield Ok(frame);
                }
            }
        }
    };

    Ok(Sse::new(stream))
}

/// Create the monitor routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/tasks/{id}/monitor", get(monitor_task))
}
