/// Inline SQL migrations for the taskforge database schema.
///
/// We use simple inline migrations rather than sqlx migration files
/// because the schema is small and self-contained.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: tasks table
    r#"
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    subject TEXT NOT NULL,
    kind TEXT NOT NULL,
    start_offset INTEGER NOT NULL,
    target_count INTEGER NOT NULL CHECK (target_count >= 1),
    completed_items TEXT NOT NULL DEFAULT '[]',
    failed_items TEXT NOT NULL DEFAULT '[]',
    current_progress INTEGER,
    current_message TEXT,
    cancel_requested INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'running'
        CHECK (status IN ('running', 'paused', 'completed', 'failed')),
    error_message TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
"#,
    // Migration 2: one live task per (subject, kind)
    r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_one_active
    ON tasks(subject, kind)
    WHERE status IN ('running', 'paused') AND cancel_requested = 0;
"#,
    // Migration 3: reaper scan
    r#"CREATE INDEX IF NOT EXISTS idx_tasks_status_updated ON tasks(status, updated_at);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_tasks_subject ON tasks(subject, created_at DESC);"#,
    // Migration 4: generated content
    r#"
CREATE TABLE IF NOT EXISTS task_items (
    subject TEXT NOT NULL,
    item_id INTEGER NOT NULL,
    content TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (subject, item_id)
);
"#,
];
