// crates/server/src/monitor.rs
//! Live monitor protocol: turns successive task snapshots into the event
//! stream a client sees.
//!
//! Each monitor owns a `MonitorCursor`. The cursor remembers what this
//! client has already been told (items, progress line) so only deltas are
//! emitted; cursors are never shared between monitors.

use std::collections::BTreeSet;

use serde::Serialize;
use taskforge_core::{ItemId, TaskId, TaskRecord, TaskStatus};

/// Message sent when the task row disappears mid-stream.
pub const VANISHED: &str = "task no longer exists";

/// One frame of the monitor stream, serialized as `{"type": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum MonitorEvent {
    Start {
        task_id: TaskId,
    },
    TaskCreated {
        status: TaskStatus,
        start_offset: ItemId,
        target_count: i64,
    },
    TaskResumed {
        status: TaskStatus,
        start_offset: ItemId,
        target_count: i64,
        completed_items: Vec<ItemId>,
        failed_items: Vec<ItemId>,
        current_progress: Option<ItemId>,
        current_message: Option<String>,
    },
    Progress {
        current_progress: Option<ItemId>,
        current_message: Option<String>,
    },
    ItemComplete {
        item: ItemId,
    },
    ItemError {
        item: ItemId,
    },
    Heartbeat {
        ts: i64,
    },
    Done {
        completed_items: Vec<ItemId>,
        failed_items: Vec<ItemId>,
        message: String,
    },
    Error {
        message: String,
    },
}

impl MonitorEvent {
    pub fn heartbeat() -> Self {
        Self::Heartbeat {
            ts: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

#[derive(Debug, Default)]
pub struct MonitorCursor {
    seen_completed: BTreeSet<ItemId>,
    seen_failed: BTreeSet<ItemId>,
    current_progress: Option<ItemId>,
    current_message: Option<String>,
    finished: bool,
}

impl MonitorCursor {
    /// Attach to `record`: the opening `start` frame, the snapshot frame and,
    /// if the task already finished, its terminal frame.
    pub fn attach(record: &TaskRecord) -> (Self, Vec<MonitorEvent>) {
        let mut cursor = Self {
            seen_completed: record.completed_items.clone(),
            seen_failed: record.failed_items.clone(),
            current_progress: record.current_progress,
            current_message: record.current_message.clone(),
            finished: false,
        };

        let snapshot = if record.has_progress() {
            MonitorEvent::TaskResumed {
                status: record.status,
                start_offset: record.start_offset,
                target_count: record.target_count,
                completed_items: record.completed_items.iter().copied().collect(),
                failed_items: record.failed_items.iter().copied().collect(),
                current_progress: record.current_progress,
                current_message: record.current_message.clone(),
            }
        } else {
            MonitorEvent::TaskCreated {
                status: record.status,
                start_offset: record.start_offset,
                target_count: record.target_count,
            }
        };

        let mut events = vec![
            MonitorEvent::Start {
                task_id: record.id.clone(),
            },
            snapshot,
        ];
        events.extend(cursor.terminal(record));
        (cursor, events)
    }

    /// Events for everything that changed since the previous snapshot.
    pub fn advance(&mut self, record: &TaskRecord) -> Vec<MonitorEvent> {
        if self.finished {
            return Vec::new();
        }
        let mut events = Vec::new();

        if record.current_progress != self.current_progress
            || record.current_message != self.current_message
        {
            self.current_progress = record.current_progress;
            self.current_message = record.current_message.clone();
            events.push(MonitorEvent::Progress {
                current_progress: record.current_progress,
                current_message: record.current_message.clone(),
            });
        }

        for &item in &record.completed_items {
            if self.seen_completed.insert(item) {
                events.push(MonitorEvent::ItemComplete { item });
            }
        }
        for &item in &record.failed_items {
            if self.seen_failed.insert(item) {
                events.push(MonitorEvent::ItemError { item });
            }
        }

        events.extend(self.terminal(record));
        events
    }

    /// The record is gone (deleted while being watched).
    pub fn vanished(&mut self) -> MonitorEvent {
        self.finished = true;
        MonitorEvent::Error {
            message: VANISHED.to_string(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn terminal(&mut self, record: &TaskRecord) -> Option<MonitorEvent> {
        let event = match record.status {
            TaskStatus::Completed => MonitorEvent::Done {
                completed_items: record.completed_items.iter().copied().collect(),
                failed_items: record.failed_items.iter().copied().collect(),
                message: record
                    .current_message
                    .clone()
                    .unwrap_or_else(|| record.summary()),
            },
            TaskStatus::Failed => MonitorEvent::Error {
                message: record
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "failed".to_string()),
            },
            TaskStatus::Running | TaskStatus::Paused => return None,
        };
        self.finished = true;
        Some(event)
    }
}
