// crates/db/src/queries/tasks.rs
// Task record CRUD and the guarded (compare-and-swap) writes that coordinate
// executors, controllers and the reaper.
//
// Every mutation of a live task is an `UPDATE ... WHERE status IN ('running',
// 'paused')` and reports whether it matched a row. Callers treat `false` as
// "somebody else finalized this task first".

use taskforge_core::{messages, ItemId, TaskId, TaskKind, TaskPatch, TaskRecord};
use tracing::debug;

use super::row_types::{TaskRow, TASK_COLUMNS};
use crate::{now_millis, Database, DbResult};

/// Guard matching rows an executor may still write to.
const ACTIVE: &str = "status IN ('running', 'paused')";

/// Values for a new task row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub owner: String,
    pub subject: String,
    pub kind: TaskKind,
    pub start_offset: ItemId,
    pub target_count: i64,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

impl Database {
    // ========================================================================
    // Reads
    // ========================================================================

    /// Fetch one task by id.
    pub async fn get_task(&self, id: &str) -> DbResult<Option<TaskRecord>> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"))
                .bind(id)
                .fetch_optional(self.pool())
                .await?;
        row.map(TaskRow::into_record).transpose()
    }

    /// The live (running or paused, not cancel-requested) task for a queue.
    pub async fn find_active_task(
        &self,
        subject: &str,
        kind: TaskKind,
    ) -> DbResult<Option<TaskRecord>> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE subject = ?1 AND kind = ?2 AND {ACTIVE} AND cancel_requested = 0 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(subject)
        .bind(kind.as_str())
        .fetch_optional(self.pool())
        .await?;
        row.map(TaskRow::into_record).transpose()
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Insert a new running task.
    ///
    /// Returns `None` when another live task already occupies the
    /// `(subject, kind)` queue (the partial unique index rejected the row).
    pub async fn create_task(&self, task: &NewTask) -> DbResult<Option<TaskRecord>> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_millis();
        let result = sqlx::query(
            r#"
            INSERT INTO tasks (id, owner, subject, kind, start_offset, target_count,
                               status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'running', ?7, ?7)
            "#,
        )
        .bind(&id)
        .bind(&task.owner)
        .bind(&task.subject)
        .bind(task.kind.as_str())
        .bind(task.start_offset)
        .bind(task.target_count)
        .bind(now)
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => self.get_task(&id).await,
            Err(e) if is_unique_violation(&e) => {
                debug!(subject = %task.subject, kind = %task.kind, "create_task lost to a live task");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fail `old_id` as superseded and insert `task` in one transaction.
    ///
    /// Returns `None` (and changes nothing) if `old_id` was no longer live,
    /// or if a concurrent request already inserted a live task for the queue.
    pub async fn supersede_task(
        &self,
        old_id: &str,
        task: &NewTask,
    ) -> DbResult<Option<TaskRecord>> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_millis();
        let mut tx = self.pool().begin().await?;

        let swapped = sqlx::query(&format!(
            "UPDATE tasks SET status = 'failed', cancel_requested = 1, \
             error_message = ?2, updated_at = ?3 \
             WHERE id = ?1 AND {ACTIVE}"
        ))
        .bind(old_id)
        .bind(messages::SUPERSEDED)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if swapped == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO tasks (id, owner, subject, kind, start_offset, target_count,
                               status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'running', ?7, ?7)
            "#,
        )
        .bind(&id)
        .bind(&task.owner)
        .bind(&task.subject)
        .bind(task.kind.as_str())
        .bind(task.start_offset)
        .bind(task.target_count)
        .bind(now)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        self.get_task(&id).await
    }

    // ========================================================================
    // Controller writes
    // ========================================================================

    /// Grow a live task's range in place.
    ///
    /// Guarded on the `target_count` the caller observed so two concurrent
    /// extensions cannot both apply. A paused task is relabelled running.
    pub async fn extend_task(
        &self,
        id: &str,
        observed_target_count: i64,
        new_target_count: i64,
    ) -> DbResult<bool> {
        let result = sqlx::query(&format!(
            "UPDATE tasks SET target_count = ?3, status = 'running', updated_at = ?4 \
             WHERE id = ?1 AND target_count = ?2 AND {ACTIVE} AND cancel_requested = 0"
        ))
        .bind(id)
        .bind(observed_target_count)
        .bind(new_target_count)
        .bind(now_millis())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Take over a live task whose executor went quiet.
    ///
    /// Refreshes `updated_at` only if it still holds the value the caller
    /// observed, so of several processes noticing the same idle task exactly
    /// one wins and spawns the replacement executor.
    pub async fn claim_idle_task(&self, id: &str, observed_updated_at: i64) -> DbResult<bool> {
        let result = sqlx::query(&format!(
            "UPDATE tasks SET updated_at = ?3 \
             WHERE id = ?1 AND updated_at = ?2 AND {ACTIVE} AND cancel_requested = 0"
        ))
        .bind(id)
        .bind(observed_updated_at)
        .bind(now_millis())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Relabel a paused task as running (a client came back).
    pub async fn resume_task_label(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'running', updated_at = ?2 \
             WHERE id = ?1 AND status = 'paused' AND cancel_requested = 0",
        )
        .bind(id)
        .bind(now_millis())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Request cancellation and fail the task. `false` if it was already terminal.
    pub async fn cancel_task(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query(&format!(
            "UPDATE tasks SET cancel_requested = 1, status = 'failed', \
             error_message = ?2, updated_at = ?3 \
             WHERE id = ?1 AND {ACTIVE}"
        ))
        .bind(id)
        .bind(messages::CANCELLED)
        .bind(now_millis())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Label a running task paused. `false` if it was not running.
    pub async fn pause_task(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'paused', updated_at = ?2 \
             WHERE id = ?1 AND status = 'running'",
        )
        .bind(id)
        .bind(now_millis())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Hard-delete a finished task owned by `owner`.
    pub async fn delete_task(&self, id: &str, owner: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "DELETE FROM tasks WHERE id = ?1 AND owner = ?2 \
             AND status IN ('completed', 'failed')",
        )
        .bind(id)
        .bind(owner)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // ========================================================================
    // Executor writes
    // ========================================================================

    /// Apply a typed progress patch. `false` if the task is no longer live.
    ///
    /// Item patches are single statements over the JSON set columns. An item
    /// already present in either set is left alone, so both sets only grow
    /// and stay disjoint without a read-modify-write round trip.
    pub async fn apply_task_patch(&self, id: &str, patch: &TaskPatch) -> DbResult<bool> {
        let now = now_millis();
        let result = match patch {
            TaskPatch::Heartbeat {
                current_progress,
                current_message,
            } => {
                sqlx::query(&format!(
                    "UPDATE tasks SET current_progress = ?2, current_message = ?3, updated_at = ?4 \
                     WHERE id = ?1 AND {ACTIVE}"
                ))
                .bind(id)
                .bind(current_progress)
                .bind(current_message)
                .bind(now)
                .execute(self.pool())
                .await?
            }
            TaskPatch::ItemCompleted(item) => {
                sqlx::query(&format!(
                    r#"
                    UPDATE tasks SET
                        completed_items = CASE
                            WHEN EXISTS (SELECT 1 FROM json_each(completed_items) WHERE value = ?2)
                              OR EXISTS (SELECT 1 FROM json_each(failed_items) WHERE value = ?2)
                            THEN completed_items
                            ELSE json_insert(completed_items, '$[#]', ?2)
                        END,
                        updated_at = ?3
                    WHERE id = ?1 AND {ACTIVE}
                    "#
                ))
                .bind(id)
                .bind(item)
                .bind(now)
                .execute(self.pool())
                .await?
            }
            TaskPatch::ItemFailed(item) => {
                sqlx::query(&format!(
                    r#"
                    UPDATE tasks SET
                        failed_items = CASE
                            WHEN EXISTS (SELECT 1 FROM json_each(completed_items) WHERE value = ?2)
                              OR EXISTS (SELECT 1 FROM json_each(failed_items) WHERE value = ?2)
                            THEN failed_items
                            ELSE json_insert(failed_items, '$[#]', ?2)
                        END,
                        updated_at = ?3
                    WHERE id = ?1 AND {ACTIVE}
                    "#
                ))
                .bind(id)
                .bind(item)
                .bind(now)
                .execute(self.pool())
                .await?
            }
        };
        Ok(result.rows_affected() == 1)
    }

    /// Finish a task as completed.
    ///
    /// Guarded on the coverage end the executor worked towards: if the range
    /// was extended in the meantime nothing is written and `false` returned.
    pub async fn complete_task(
        &self,
        id: &str,
        observed_end: ItemId,
        summary: &str,
    ) -> DbResult<bool> {
        let result = sqlx::query(&format!(
            "UPDATE tasks SET status = 'completed', current_message = ?3, updated_at = ?4 \
             WHERE id = ?1 AND {ACTIVE} AND cancel_requested = 0 \
             AND start_offset + (target_count - 1) = ?2"
        ))
        .bind(id)
        .bind(observed_end)
        .bind(summary)
        .bind(now_millis())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Finish a live task as failed with `message`.
    pub async fn fail_task(&self, id: &str, message: &str) -> DbResult<bool> {
        let result = sqlx::query(&format!(
            "UPDATE tasks SET status = 'failed', error_message = ?2, updated_at = ?3 \
             WHERE id = ?1 AND {ACTIVE}"
        ))
        .bind(id)
        .bind(message)
        .bind(now_millis())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // ========================================================================
    // Reaper
    // ========================================================================

    /// Fail one live task as stalled if its last heartbeat is older than
    /// `cutoff_millis`. A heartbeat racing this write wins.
    pub async fn reap_task_if_stale(&self, id: &str, cutoff_millis: i64) -> DbResult<bool> {
        let result = sqlx::query(&format!(
            "UPDATE tasks SET status = 'failed', error_message = ?2, updated_at = ?3 \
             WHERE id = ?1 AND {ACTIVE} AND updated_at < ?4"
        ))
        .bind(id)
        .bind(messages::STALLED)
        .bind(now_millis())
        .bind(cutoff_millis)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Fail every live task whose last heartbeat is older than `cutoff_millis`.
    /// Returns the ids that were reaped.
    pub async fn reap_stale_tasks(&self, cutoff_millis: i64) -> DbResult<Vec<TaskId>> {
        let rows: Vec<(String,)> = sqlx::query_as(&format!(
            "UPDATE tasks SET status = 'failed', error_message = ?1, updated_at = ?2 \
             WHERE {ACTIVE} AND updated_at < ?3 \
             RETURNING id"
        ))
        .bind(messages::STALLED)
        .bind(now_millis())
        .bind(cutoff_millis)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
