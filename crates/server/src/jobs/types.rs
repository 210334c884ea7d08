// crates/server/src/jobs/types.rs
//! Types for the executor supervisor.

use chrono::{DateTime, Utc};
use serde::Serialize;
use taskforge_core::TaskId;
use tokio::task::AbortHandle;

/// Snapshot of an executor running in this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveExecutor {
    pub task_id: TaskId,
    pub started_at: DateTime<Utc>,
}

/// Bookkeeping for one spawned executor.
#[derive(Debug)]
pub(crate) struct ExecutorEntry {
    pub started_at: DateTime<Utc>,
    pub abort: AbortHandle,
    /// Distinguishes re-spawns of the same task id.
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_executor_serialize() {
        let active = ActiveExecutor {
            task_id: "t-1".to_string(),
            started_at: DateTime::from_timestamp(1_770_000_000, 0).unwrap(),
        };
        let json = serde_json::to_string(&active).unwrap();
        assert!(json.contains("\"taskId\":\"t-1\""));
        assert!(json.contains("\"startedAt\""));
    }
}
