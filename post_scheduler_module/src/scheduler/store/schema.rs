pub(super) const SCHEDULER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    channel_id TEXT NOT NULL,
    channel_name TEXT,
    message TEXT,
    attachment_path TEXT,
    scheduled_time INTEGER NOT NULL,
    recurrence TEXT NOT NULL DEFAULT 'once',
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_status_scheduled_time
    ON tasks (status, scheduled_time);
"#;

pub(super) const TASK_COLUMNS: &str = "id, channel_id, channel_name, message, attachment_path, \
     scheduled_time, recurrence, status, send_attempts, created_at, updated_at";
