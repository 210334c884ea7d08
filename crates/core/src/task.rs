// crates/core/src/task.rs
//! Task record model: status state machine, queue kinds, coverage ranges
//! and the typed patch vocabulary the executor is allowed to write.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Identifier of a task row (UUID v4, hyphenated).
pub type TaskId = String;

/// Identifier of one work item (e.g. a chapter index).
pub type ItemId = i64;

/// Lifecycle status of a task.
///
/// `Running` and `Paused` are the two *active* states: an executor may still
/// be writing to the row. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

/// Queue discriminator. Each `(subject, kind)` pair is an independent line
/// of work with at most one active task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Chapters,
    Outline,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chapters => "chapters",
            Self::Outline => "outline",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chapters" => Ok(Self::Chapters),
            "outline" => Ok(Self::Outline),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }
}

/// Inclusive item range `[start, end]` owned by a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    pub start: ItemId,
    pub end: ItemId,
}

impl Coverage {
    /// Build the coverage of `count` items beginning at `start_offset`.
    pub fn new(start_offset: ItemId, count: i64) -> Result<Self, ValidationError> {
        if start_offset < 0 {
            return Err(ValidationError::NegativeOffset(start_offset));
        }
        if count < 1 {
            return Err(ValidationError::EmptyRange(count));
        }
        let end = start_offset
            .checked_add(count - 1)
            .ok_or(ValidationError::RangeOverflow)?;
        Ok(Self {
            start: start_offset,
            end,
        })
    }

    /// Whether `other` lies entirely within this range.
    pub fn covers(&self, other: &Coverage) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// Whether `other` starts exactly one past our end.
    pub fn is_continued_by(&self, other: &Coverage) -> bool {
        self.end.checked_add(1) == Some(other.start)
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// One row of the task table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: TaskId,
    pub owner: String,
    pub subject: String,
    pub kind: TaskKind,
    pub start_offset: ItemId,
    pub target_count: i64,
    pub completed_items: BTreeSet<ItemId>,
    pub failed_items: BTreeSet<ItemId>,
    pub current_progress: Option<ItemId>,
    pub current_message: Option<String>,
    pub cancel_requested: bool,
    pub status: TaskStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Stored rows always hold a range that passed [`Coverage::new`], so the
    /// end is at most `i64::MAX`; it is computed without an intermediate
    /// `start + count` that could overflow.
    pub fn coverage(&self) -> Coverage {
        Coverage {
            start: self.start_offset,
            end: self
                .start_offset
                .saturating_add(self.target_count.saturating_sub(1)),
        }
    }

    /// Active in the uniqueness sense: may still be driven by an executor
    /// and nobody asked it to stop.
    pub fn is_active(&self) -> bool {
        self.status.is_active() && !self.cancel_requested
    }

    /// Whether any item has been attempted yet.
    pub fn has_progress(&self) -> bool {
        self.current_progress.is_some()
            || !self.completed_items.is_empty()
            || !self.failed_items.is_empty()
    }

    /// Smallest covered item strictly after `after` that is recorded in
    /// neither set.
    pub fn next_pending_item(&self, after: Option<ItemId>) -> Option<ItemId> {
        let coverage = self.coverage();
        let from = match after {
            Some(last) if last >= coverage.start => last.checked_add(1)?,
            _ => coverage.start,
        };
        (from..=coverage.end)
            .find(|item| !self.completed_items.contains(item) && !self.failed_items.contains(item))
    }

    /// Human-readable outcome line written when the task completes.
    pub fn summary(&self) -> String {
        let total = self.target_count;
        let done = self.completed_items.len();
        if self.failed_items.is_empty() {
            format!("generated {done} of {total} items")
        } else {
            let failed: Vec<String> = self.failed_items.iter().map(|i| i.to_string()).collect();
            format!(
                "generated {done} of {total} items ({} failed: {})",
                self.failed_items.len(),
                failed.join(", ")
            )
        }
    }
}

/// The only mutations an executor may apply to a running task.
///
/// Every patch is written with an "only while active" guard and refreshes
/// `updated_at`; identity and range columns are out of reach. Item patches
/// only ever add to a set: an item already recorded in either set is left
/// where it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPatch {
    Heartbeat {
        current_progress: ItemId,
        current_message: String,
    },
    ItemCompleted(ItemId),
    ItemFailed(ItemId),
}

/// How a create-or-extend request was resolved against existing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// No active task existed; a new one was inserted.
    Created,
    /// The active task already covers the requested range.
    Duplicate,
    /// The request continued the active task's range in place.
    Extended,
    /// The active task was failed and replaced by a new one.
    Superseded,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Duplicate => "duplicate",
            Self::Extended => "extended",
            Self::Superseded => "superseded",
        }
    }

    /// Whether a fresh executor must be scheduled for the resulting id.
    pub fn needs_executor(&self) -> bool {
        matches!(self, Self::Created | Self::Superseded)
    }
}

/// Messages written to `error_message` by the orchestration layer.
pub mod messages {
    pub const SUPERSEDED: &str = "superseded by new request";
    pub const CANCELLED: &str = "cancelled";
    pub const STALLED: &str = "stalled";
}
