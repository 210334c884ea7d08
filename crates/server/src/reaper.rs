// crates/server/src/reaper.rs
//! Stale task reaper: fails running tasks whose executor stopped
//! heartbeating (process recycled, crashed, or killed).

use chrono::Utc;
use taskforge_core::{ErrorClass, TaskId, TaskRecord};
use taskforge_db::{Database, DbResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ReaperSettings;
use crate::metrics::record_reaped;

#[derive(Debug, Clone)]
pub struct StaleTaskReaper {
    db: Database,
    settings: ReaperSettings,
}

impl StaleTaskReaper {
    pub fn new(db: Database, settings: ReaperSettings) -> Self {
        Self { db, settings }
    }

    fn cutoff_millis(&self) -> i64 {
        quiet_since(self.settings.stale_after)
    }

    /// Whether `record` is live but has been quiet long enough that whatever
    /// executor drove it is presumed gone.
    pub fn is_idle(&self, record: &TaskRecord) -> bool {
        record.is_active()
            && record.updated_at.timestamp_millis() < quiet_since(self.settings.resume_after)
    }

    /// Fail `record` as stalled if it is live and its last heartbeat is older
    /// than the threshold. Returns whether this call reaped it.
    pub async fn reap_if_stale(&self, record: &TaskRecord) -> DbResult<bool> {
        if !record.status.is_active() {
            return Ok(false);
        }
        let cutoff = self.cutoff_millis();
        if record.updated_at.timestamp_millis() >= cutoff {
            return Ok(false);
        }
        let reaped = self.db.reap_task_if_stale(&record.id, cutoff).await?;
        if reaped {
            info!(
                task_id = %record.id,
                subject = %record.subject,
                kind = %record.kind,
                last_heartbeat = %record.updated_at,
                error_class = %ErrorClass::Coordination,
                "Reaped stalled task"
            );
            record_reaped(1);
        }
        Ok(reaped)
    }

    /// Reap every stale live task.
    pub async fn sweep(&self) -> DbResult<Vec<TaskId>> {
        let reaped = self.db.reap_stale_tasks(self.cutoff_millis()).await?;
        if !reaped.is_empty() {
            info!(count = reaped.len(), task_ids = ?reaped, "Stale task sweep reaped tasks");
            record_reaped(reaped.len());
        }
        Ok(reaped)
    }

    /// Sweep on the configured interval until `shutdown` fires.
    pub async fn run_periodic(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.settings.sweep_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            if let Err(e) = self.sweep().await {
                warn!(error = %e, "Stale task sweep failed (non-fatal)");
            }
        }
        debug!("Stale task sweep stopped");
    }
}

/// Epoch millis `quiet` ago.
fn quiet_since(quiet: std::time::Duration) -> i64 {
    let quiet = i64::try_from(quiet.as_millis()).unwrap_or(i64::MAX);
    Utc::now().timestamp_millis().saturating_sub(quiet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use taskforge_core::{messages, TaskKind, TaskStatus};
    use taskforge_db::NewTask;

    async fn setup() -> (Database, StaleTaskReaper) {
        let db = Database::new_in_memory().await.unwrap();
        let reaper = StaleTaskReaper::new(db.clone(), ReaperSettings::default());
        (db, reaper)
    }

    async fn running_task(db: &Database, subject: &str) -> TaskRecord {
        db.create_task(&NewTask {
            owner: "alice".to_string(),
            subject: subject.to_string(),
            kind: TaskKind::Chapters,
            start_offset: 0,
            target_count: 3,
        })
        .await
        .unwrap()
        .unwrap()
    }

    async fn age(db: &Database, id: &str, by: Duration) -> TaskRecord {
        let millis = Utc::now().timestamp_millis() - by.as_millis() as i64;
        sqlx::query("UPDATE tasks SET updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(millis)
            .execute(db.pool())
            .await
            .unwrap();
        db.get_task(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_fresh_task_is_left_alone() {
        let (db, reaper) = setup().await;
        let task = running_task(&db, "bookA").await;
        assert!(!reaper.reap_if_stale(&task).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_task_is_reaped_once() {
        let (db, reaper) = setup().await;
        let task = running_task(&db, "bookA").await;
        let task = age(&db, &task.id, Duration::from_secs(31 * 60)).await;

        assert!(reaper.reap_if_stale(&task).await.unwrap());
        assert!(!reaper.reap_if_stale(&task).await.unwrap());

        let task = db.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some(messages::STALLED));
    }

    #[tokio::test]
    async fn test_sweep_reaps_only_stale() {
        let (db, reaper) = setup().await;
        let stale = running_task(&db, "bookA").await;
        running_task(&db, "bookB").await;
        age(&db, &stale.id, Duration::from_secs(2 * 60 * 60)).await;

        assert_eq!(reaper.sweep().await.unwrap(), vec![stale.id]);
        assert!(reaper.sweep().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_idle_window_is_shorter_than_stall() {
        let (db, reaper) = setup().await;
        let task = running_task(&db, "bookA").await;
        assert!(!reaper.is_idle(&task));

        let task = age(&db, &task.id, Duration::from_secs(5 * 60)).await;
        assert!(reaper.is_idle(&task));
        assert!(!reaper.reap_if_stale(&task).await.unwrap());

        db.cancel_task(&task.id).await.unwrap();
        let task = age(&db, &task.id, Duration::from_secs(5 * 60)).await;
        assert!(!reaper.is_idle(&task));
    }
}
