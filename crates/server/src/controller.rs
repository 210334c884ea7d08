// crates/server/src/controller.rs
//! Task controller: resolves start requests against the live task of a
//! `(subject, kind)` queue and handles cancel, pause, lookup and delete.
//!
//! Resolution is idempotent. Retried or duplicated requests land on the
//! same task; a request that continues the live range extends it in place;
//! anything else supersedes it. Losing a race against another request
//! (a guarded write that matched no row, or the one-live-task index
//! rejecting an insert) restarts resolution from a fresh read.
//!
//! A live task whose executor died with its process is picked up again by
//! the next request that lands on it, once it has been idle long enough.

use std::sync::Arc;

use taskforge_core::{
    Coverage, ItemId, Resolution, TaskId, TaskKind, TaskRecord, TaskStatus, ValidationError,
};
use taskforge_db::{Database, NewTask};
use tracing::{debug, info};

use crate::error::TaskError;
use crate::jobs::TaskSupervisor;
use crate::metrics::{record_task_finalized, record_task_resolved, record_task_resumed};
use crate::reaper::StaleTaskReaper;

/// Resolution attempts before reporting contention.
const MAX_RESOLVE_ATTEMPTS: usize = 5;

/// A request to generate `target_count` items of `kind` for `subject`,
/// starting at `start_offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub owner: String,
    pub subject: String,
    pub kind: TaskKind,
    pub target_count: i64,
    pub start_offset: ItemId,
}

impl TaskRequest {
    fn validate(&self) -> Result<Coverage, ValidationError> {
        if self.subject.trim().is_empty() {
            return Err(ValidationError::EmptySubject);
        }
        if self.owner.trim().is_empty() {
            return Err(ValidationError::EmptyOwner);
        }
        Coverage::new(self.start_offset, self.target_count)
    }

    fn new_task(&self) -> NewTask {
        NewTask {
            owner: self.owner.clone(),
            subject: self.subject.clone(),
            kind: self.kind,
            start_offset: self.start_offset,
            target_count: self.target_count,
        }
    }
}

pub struct TaskController {
    db: Database,
    reaper: StaleTaskReaper,
    supervisor: Arc<TaskSupervisor>,
}

impl TaskController {
    pub fn new(db: Database, reaper: StaleTaskReaper, supervisor: Arc<TaskSupervisor>) -> Self {
        Self {
            db,
            reaper,
            supervisor,
        }
    }

    /// Resolve a start request and schedule an executor when a new task row
    /// was written or an orphaned one was claimed.
    pub async fn create_or_extend(
        &self,
        request: &TaskRequest,
    ) -> Result<(TaskId, Resolution), TaskError> {
        let (id, resolution, claimed) = self.resolve(request).await?;
        record_task_resolved(resolution);
        info!(
            task_id = %id,
            subject = %request.subject,
            kind = %request.kind,
            start_offset = request.start_offset,
            target_count = request.target_count,
            resolution = resolution.as_str(),
            "Task request resolved"
        );
        if resolution.needs_executor() {
            self.supervisor.spawn(id.clone());
        } else if claimed.as_deref() == Some(id.as_str()) {
            info!(task_id = %id, "Resuming orphaned task");
            record_task_resumed();
            self.supervisor.spawn(id.clone());
        }
        Ok((id, resolution))
    }

    /// Claim `active` if no executor is driving it: none in this process and
    /// no heartbeat from anywhere for the resume window.
    async fn claim_if_orphaned(&self, active: &TaskRecord) -> Result<bool, TaskError> {
        if self.supervisor.is_running(&active.id) || !self.reaper.is_idle(active) {
            return Ok(false);
        }
        let claimed = self
            .db
            .claim_idle_task(&active.id, active.updated_at.timestamp_millis())
            .await?;
        if claimed {
            debug!(task_id = %active.id, last_heartbeat = %active.updated_at, "Claimed idle task");
        }
        Ok(claimed)
    }

    /// Returns the resolved id, how it was resolved and the task this call
    /// claimed as orphaned, if any.
    async fn resolve(
        &self,
        request: &TaskRequest,
    ) -> Result<(TaskId, Resolution, Option<TaskId>), TaskError> {
        let requested = request.validate()?;
        let new_task = request.new_task();
        let mut claimed = None;

        for attempt in 1..=MAX_RESOLVE_ATTEMPTS {
            let Some(active) = self.find_active(&request.subject, request.kind).await? else {
                match self.db.create_task(&new_task).await? {
                    Some(task) => return Ok((task.id, Resolution::Created, claimed)),
                    None => {
                        debug!(attempt, subject = %request.subject, "Lost create race; retrying");
                        continue;
                    }
                }
            };

            if self.claim_if_orphaned(&active).await? {
                claimed = Some(active.id.clone());
            }

            let coverage = active.coverage();
            if coverage.covers(&requested) {
                if self.db.resume_task_label(&active.id).await? {
                    debug!(task_id = %active.id, "Relabelled paused task as running");
                }
                return Ok((active.id, Resolution::Duplicate, claimed));
            }

            if coverage.is_continued_by(&requested) {
                let new_count = active
                    .target_count
                    .checked_add(request.target_count)
                    .ok_or(ValidationError::RangeOverflow)?;
                Coverage::new(active.start_offset, new_count)?;
                if self
                    .db
                    .extend_task(&active.id, active.target_count, new_count)
                    .await?
                {
                    return Ok((active.id, Resolution::Extended, claimed));
                }
                debug!(attempt, task_id = %active.id, "Lost extend race; retrying");
                continue;
            }

            match self.db.supersede_task(&active.id, &new_task).await? {
                Some(task) => {
                    info!(
                        task_id = %task.id,
                        superseded = %active.id,
                        old_range = %coverage,
                        new_range = %requested,
                        "Superseded live task"
                    );
                    return Ok((task.id, Resolution::Superseded, claimed));
                }
                None => debug!(attempt, task_id = %active.id, "Lost supersede race; retrying"),
            }
        }

        Err(TaskError::Contention {
            subject: request.subject.clone(),
            kind: request.kind,
            attempts: MAX_RESOLVE_ATTEMPTS,
        })
    }

    /// Request cancellation. Reports `true` for any existing task, including
    /// one that already finished (which is left untouched).
    pub async fn cancel(&self, task_id: &str) -> Result<bool, TaskError> {
        if self.db.get_task(task_id).await?.is_none() {
            return Err(TaskError::NotFound(task_id.to_string()));
        }
        if self.db.cancel_task(task_id).await? {
            info!(task_id = %task_id, "Task cancelled");
            record_task_finalized(TaskStatus::Failed);
        }
        Ok(true)
    }

    /// Label a running task paused. The executor keeps going; returns
    /// `false` when there was nothing to pause.
    pub async fn pause(&self, task_id: &str) -> Result<bool, TaskError> {
        if self.db.get_task(task_id).await?.is_none() {
            return Err(TaskError::NotFound(task_id.to_string()));
        }
        let paused = self.db.pause_task(task_id).await?;
        if paused {
            info!(task_id = %task_id, "Task paused");
        }
        Ok(paused)
    }

    /// Current snapshot of a task, reaping it first if it is stale.
    pub async fn get(&self, task_id: &str) -> Result<TaskRecord, TaskError> {
        let record = self
            .db
            .get_task(task_id)
            .await?
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        if self.reaper.reap_if_stale(&record).await? {
            return self
                .db
                .get_task(task_id)
                .await?
                .ok_or_else(|| TaskError::NotFound(task_id.to_string()));
        }
        Ok(record)
    }

    /// The live task of a queue, if any (stale tasks are reaped, not returned).
    pub async fn find_active(
        &self,
        subject: &str,
        kind: TaskKind,
    ) -> Result<Option<TaskRecord>, TaskError> {
        let Some(record) = self.db.find_active_task(subject, kind).await? else {
            return Ok(None);
        };
        if self.reaper.reap_if_stale(&record).await? {
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Hard-delete a finished task on behalf of its owner.
    pub async fn delete(&self, task_id: &str, owner: &str) -> Result<(), TaskError> {
        let record = self.get(task_id).await?;
        if record.owner != owner {
            return Err(TaskError::Forbidden {
                id: record.id,
                owner: owner.to_string(),
            });
        }
        if record.status.is_active() {
            return Err(TaskError::NotTerminal(record.id));
        }
        if !self.db.delete_task(task_id, owner).await? {
            return Err(TaskError::NotFound(task_id.to_string()));
        }
        info!(task_id = %task_id, "Task deleted");
        Ok(())
    }
}
