// crates/server/src/jobs/runner.rs
//! Supervisor that spawns detached executors and guarantees a finalizer.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use taskforge_core::{TaskId, TaskStatus};
use tokio::task::{JoinError, JoinHandle};

use super::types::{ActiveExecutor, ExecutorEntry};
use crate::executor::TaskExecutor;
use crate::metrics::record_task_finalized;

type ActiveMap = Arc<RwLock<HashMap<TaskId, ExecutorEntry>>>;

/// Spawns one executor per task, detached from the request that asked for it.
///
/// Each executor runs in its own tokio task, awaited by a watcher. If the
/// executor returns an error or panics, the watcher fails the record with
/// `executor fault: ...` so the task never stays `running` until the reaper
/// notices.
pub struct TaskSupervisor {
    executor: TaskExecutor,
    next_generation: AtomicU64,
    active: ActiveMap,
}

impl TaskSupervisor {
    pub fn new(executor: TaskExecutor) -> Self {
        Self {
            executor,
            next_generation: AtomicU64::new(1),
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start the executor for `task_id`.
    ///
    /// Returns the watcher's handle; it resolves once the executor has exited
    /// and any fault has been written.
    pub fn spawn(&self, task_id: TaskId) -> JoinHandle<()> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let executor = self.executor.clone();
        let run_id = task_id.clone();
        let work = tokio::spawn(async move { executor.run(&run_id).await });

        match self.active.write() {
            Ok(mut active) => {
                active.insert(
                    task_id.clone(),
                    ExecutorEntry {
                        started_at: Utc::now(),
                        abort: work.abort_handle(),
                        generation,
                    },
                );
            }
            Err(e) => tracing::error!("RwLock poisoned writing executor map: {e}"),
        }

        let active = Arc::clone(&self.active);
        let db = self.executor.db().clone();
        tokio::spawn(async move {
            let fault = match work.await {
                Ok(Ok(outcome)) => {
                    tracing::debug!(task_id = %task_id, outcome = ?outcome, "Executor exited");
                    None
                }
                Ok(Err(e)) => {
                    tracing::warn!(task_id = %task_id, error = %e, error_class = %e.class(), "Executor returned an error");
                    Some(e.to_string())
                }
                Err(join_err) if join_err.is_cancelled() => {
                    tracing::debug!(task_id = %task_id, "Executor aborted");
                    None
                }
                Err(join_err) => Some(panic_message(join_err)),
            };

            if let Some(reason) = fault {
                tracing::error!(task_id = %task_id, error = %reason, "Executor fault");
                match db.fail_task(&task_id, &format!("executor fault: {reason}")).await {
                    Ok(true) => record_task_finalized(TaskStatus::Failed),
                    Ok(false) => {}
                    Err(e) => tracing::error!(
                        task_id = %task_id,
                        error = %e,
                        "Could not finalize faulted task; leaving it for the reaper"
                    ),
                }
            }

            match active.write() {
                Ok(mut active) => {
                    if active.get(&task_id).is_some_and(|e| e.generation == generation) {
                        active.remove(&task_id);
                    }
                }
                Err(e) => tracing::error!("RwLock poisoned writing executor map: {e}"),
            }
        })
    }

    /// Executors currently running in this process.
    pub fn active(&self) -> Vec<ActiveExecutor> {
        match self.active.read() {
            Ok(active) => {
                let mut list: Vec<ActiveExecutor> = active
                    .iter()
                    .map(|(id, entry)| ActiveExecutor {
                        task_id: id.clone(),
                        started_at: entry.started_at,
                    })
                    .collect();
                list.sort_by(|a, b| a.started_at.cmp(&b.started_at));
                list
            }
            Err(e) => {
                tracing::error!("RwLock poisoned reading executor map: {e}");
                Vec::new()
            }
        }
    }

    /// Whether this process is driving `task_id` right now.
    pub fn is_running(&self, task_id: &str) -> bool {
        match self.active.read() {
            Ok(active) => active.contains_key(task_id),
            Err(e) => {
                tracing::error!("RwLock poisoned reading executor map: {e}");
                // unknown; never double-drive a task
                true
            }
        }
    }

    pub fn active_count(&self) -> usize {
        match self.active.read() {
            Ok(active) => active.len(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading executor map: {e}");
                0
            }
        }
    }

    /// Abort every local executor. Their records stay live, exactly as after
    /// a process crash: the next request for the queue resumes them once
    /// idle, and the reaper fails them once stale.
    pub fn shutdown(&self) -> usize {
        match self.active.write() {
            Ok(mut active) => {
                let count = active.len();
                for (task_id, entry) in active.drain() {
                    tracing::info!(task_id = %task_id, "Aborting executor for shutdown");
                    entry.abort.abort();
                }
                count
            }
            Err(e) => {
                tracing::error!("RwLock poisoned writing executor map: {e}");
                0
            }
        }
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => describe_panic(&*payload),
        Err(err) => err.to_string(),
    }
}

fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_string()
    }
}
