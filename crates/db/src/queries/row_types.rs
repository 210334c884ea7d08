// crates/db/src/queries/row_types.rs
// Internal row type for the tasks table and its conversion to the domain record.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::Row;
use taskforge_core::{ItemId, TaskRecord};

use crate::{DbError, DbResult};

/// Columns selected by every task read, in `TaskRow` order.
pub(crate) const TASK_COLUMNS: &str = "id, owner, subject, kind, start_offset, target_count, \
     completed_items, failed_items, current_progress, current_message, cancel_requested, \
     status, error_message, created_at, updated_at";

#[derive(Debug)]
pub(crate) struct TaskRow {
    id: String,
    owner: String,
    subject: String,
    kind: String,
    start_offset: i64,
    target_count: i64,
    completed_items: String,
    failed_items: String,
    current_progress: Option<i64>,
    current_message: Option<String>,
    cancel_requested: bool,
    status: String,
    error_message: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for TaskRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            owner: row.try_get("owner")?,
            subject: row.try_get("subject")?,
            kind: row.try_get("kind")?,
            start_offset: row.try_get("start_offset")?,
            target_count: row.try_get("target_count")?,
            completed_items: row.try_get("completed_items")?,
            failed_items: row.try_get("failed_items")?,
            current_progress: row.try_get("current_progress")?,
            current_message: row.try_get("current_message")?,
            cancel_requested: row.try_get("cancel_requested")?,
            status: row.try_get("status")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TaskRow {
    pub(crate) fn into_record(self) -> DbResult<TaskRecord> {
        let corrupt = |reason: String| DbError::Corrupt {
            id: self.id.clone(),
            reason,
        };

        let kind = self.kind.parse().map_err(|e| corrupt(format!("{e}")))?;
        let status = self.status.parse().map_err(|e| corrupt(format!("{e}")))?;
        let completed_items = parse_item_set(&self.completed_items)
            .map_err(|e| corrupt(format!("completed_items: {e}")))?;
        let failed_items = parse_item_set(&self.failed_items)
            .map_err(|e| corrupt(format!("failed_items: {e}")))?;
        let created_at = millis_to_datetime(self.created_at)
            .ok_or_else(|| corrupt(format!("created_at out of range: {}", self.created_at)))?;
        let updated_at = millis_to_datetime(self.updated_at)
            .ok_or_else(|| corrupt(format!("updated_at out of range: {}", self.updated_at)))?;

        Ok(TaskRecord {
            id: self.id,
            owner: self.owner,
            subject: self.subject,
            kind,
            start_offset: self.start_offset,
            target_count: self.target_count,
            completed_items,
            failed_items,
            current_progress: self.current_progress,
            current_message: self.current_message,
            cancel_requested: self.cancel_requested,
            status,
            error_message: self.error_message,
            created_at,
            updated_at,
        })
    }
}

fn parse_item_set(json: &str) -> Result<BTreeSet<ItemId>, serde_json::Error> {
    serde_json::from_str::<Vec<ItemId>>(json).map(|items| items.into_iter().collect())
}

pub(crate) fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_item_set_dedups_and_sorts() {
        let set = parse_item_set("[12, 10, 12, 11]").unwrap();
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![10, 11, 12]);
        assert!(parse_item_set("not json").is_err());
    }

    #[test]
    fn test_millis_to_datetime() {
        let dt = millis_to_datetime(1_700_000_000_123).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_700_000_000_123);
    }
}
