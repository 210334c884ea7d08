// crates/server/src/executor.rs
//! Background executor: drives one task's items through the generation
//! engine until the range is exhausted, the task fails, or somebody else
//! finalizes the record.
//!
//! The executor owns no lock. Every write is guarded on the record still
//! being live, so a cancel, supersede or reap elsewhere simply makes the
//! next write miss and the loop stop.

use std::sync::Arc;

use taskforge_core::{
    messages, ContentStore, ErrorClass, GenerationContext, GenerationEngine, GenerationOutput, ItemDescriptor,
    ItemId, Ledger, TaskPatch, TaskRecord, TaskStatus,
};
use taskforge_db::Database;
use tracing::{debug, info, warn};

use crate::config::ExecutorSettings;
use crate::error::TaskError;
use crate::metrics::{self, outcome};

/// How an executor invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorOutcome {
    /// Range exhausted; record finalized `completed`.
    Completed,
    /// Finalized `failed` by this executor (terminal error or cancel request).
    Failed(String),
    /// Record was finalized elsewhere or deleted; nothing more written.
    Stopped,
}

enum ItemOutcome {
    Completed(GenerationContext),
    Failed,
    Abort(String),
    /// A guarded write missed: the record is no longer live.
    Inactive,
}

/// Heartbeat text for an attempt. Later attempts carry a suffix so each one
/// is a distinct write.
pub fn attempt_message(item: ItemId, attempt: u32, max_attempts: u32) -> String {
    if attempt > 1 {
        format!("attempting item {item} (attempt {attempt}/{max_attempts})")
    } else {
        format!("attempting item {item}")
    }
}

#[derive(Clone)]
pub struct TaskExecutor {
    db: Database,
    engine: Arc<dyn GenerationEngine>,
    store: Arc<dyn ContentStore>,
    ledger: Arc<dyn Ledger>,
    settings: ExecutorSettings,
}

impl TaskExecutor {
    pub fn new(
        db: Database,
        engine: Arc<dyn GenerationEngine>,
        store: Arc<dyn ContentStore>,
        ledger: Arc<dyn Ledger>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            db,
            engine,
            store,
            ledger,
            settings,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Run the task to a terminal state.
    pub async fn run(&self, task_id: &str) -> Result<ExecutorOutcome, TaskError> {
        let mut last_attempted: Option<ItemId> = None;
        let mut context = GenerationContext::empty();

        info!(task_id = %task_id, engine = self.engine.name(), "Executor started");

        loop {
            let Some(record) = self.db.get_task(task_id).await? else {
                debug!(task_id = %task_id, "Task deleted; executor stopping");
                return Ok(ExecutorOutcome::Stopped);
            };
            if record.status.is_terminal() {
                debug!(task_id = %task_id, status = %record.status, "Task finalized elsewhere; executor stopping");
                return Ok(ExecutorOutcome::Stopped);
            }
            if record.cancel_requested {
                return self.finish_failed(task_id, messages::CANCELLED).await;
            }

            let Some(item) = record.next_pending_item(last_attempted) else {
                let observed_end = record.coverage().end;
                let summary = record.summary();
                if self.db.complete_task(task_id, observed_end, &summary).await? {
                    info!(task_id = %task_id, summary = %summary, "Task completed");
                    metrics::record_task_finalized(TaskStatus::Completed);
                    return Ok(ExecutorOutcome::Completed);
                }
                // extended or finalized meanwhile; the next read decides
                continue;
            };
            last_attempted = Some(item);

            match self.process_item(&record, item, &context).await? {
                ItemOutcome::Completed(next) => context = next,
                ItemOutcome::Failed => {}
                ItemOutcome::Abort(message) => return self.finish_failed(task_id, &message).await,
                ItemOutcome::Inactive => {
                    debug!(task_id = %task_id, item, "Task no longer live; executor stopping");
                    return Ok(ExecutorOutcome::Stopped);
                }
            }
        }
    }

    async fn finish_failed(
        &self,
        task_id: &str,
        message: &str,
    ) -> Result<ExecutorOutcome, TaskError> {
        if self.db.fail_task(task_id, message).await? {
            warn!(task_id = %task_id, message = %message, "Task failed");
            metrics::record_task_finalized(TaskStatus::Failed);
            Ok(ExecutorOutcome::Failed(message.to_string()))
        } else {
            Ok(ExecutorOutcome::Stopped)
        }
    }

    async fn process_item(
        &self,
        record: &TaskRecord,
        item: ItemId,
        context: &GenerationContext,
    ) -> Result<ItemOutcome, TaskError> {
        if let Err(e) = self.ledger.charge(&record.subject, item).await {
            warn!(task_id = %record.id, item, error = %e, error_class = %ErrorClass::Terminal, "Ledger refused item");
            return Ok(ItemOutcome::Abort(format!("ledger refused item {item}: {e}")));
        }

        let descriptor = ItemDescriptor {
            task_id: record.id.clone(),
            subject: record.subject.clone(),
            kind: record.kind,
            item_id: item,
            last_item_id: record.coverage().end,
        };
        let policy = self.settings.retry;
        let mut attempt = 1;

        loop {
            let heartbeat = TaskPatch::Heartbeat {
                current_progress: item,
                current_message: attempt_message(item, attempt, policy.max_attempts),
            };
            if !self.db.apply_task_patch(&record.id, &heartbeat).await? {
                return Ok(ItemOutcome::Inactive);
            }

            match self.engine.generate(&descriptor, context.clone()).await {
                Ok(output) => return self.store_item(record, item, output).await,
                Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                    let delay = policy.delay_after(attempt);
                    warn!(
                        task_id = %record.id,
                        item,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        error_class = %e.kind.class(),
                        "Item attempt failed; retrying"
                    );
                    metrics::record_item(outcome::RETRIED);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        task_id = %record.id,
                        item,
                        attempts = attempt,
                        error = %e,
                        error_class = %e.kind.class(),
                        "Item failed after all attempts"
                    );
                    return self.mark_failed(record, item).await;
                }
                Err(e) => {
                    warn!(task_id = %record.id, item, error = %e, error_class = %e.kind.class(), "Item failed terminally");
                    return Ok(ItemOutcome::Abort(format!("item {item} failed: {}", e.message)));
                }
            }
        }
    }

    async fn store_item(
        &self,
        record: &TaskRecord,
        item: ItemId,
        output: GenerationOutput,
    ) -> Result<ItemOutcome, TaskError> {
        if let Err(e) = self.store.save(&record.subject, item, &output.content).await {
            warn!(task_id = %record.id, item, error = %e, error_class = %ErrorClass::Transient, "Saving item content failed");
            return self.mark_failed(record, item).await;
        }

        if self
            .db
            .apply_task_patch(&record.id, &TaskPatch::ItemCompleted(item))
            .await?
        {
            debug!(task_id = %record.id, item, "Item completed");
            metrics::record_item(outcome::COMPLETED);
            Ok(ItemOutcome::Completed(output.context))
        } else {
            warn!(
                task_id = %record.id,
                item,
                error_class = "trailing_write",
                "Item finished after its task was finalized; content kept, record untouched"
            );
            metrics::record_trailing_write();
            Ok(ItemOutcome::Inactive)
        }
    }

    async fn mark_failed(&self, record: &TaskRecord, item: ItemId) -> Result<ItemOutcome, TaskError> {
        if self
            .db
            .apply_task_patch(&record.id, &TaskPatch::ItemFailed(item))
            .await?
        {
            metrics::record_item(outcome::FAILED);
            Ok(ItemOutcome::Failed)
        } else {
            Ok(ItemOutcome::Inactive)
        }
    }
}
