use std::collections::HashSet;
use rusqlite::Connection;

use super::super::types::SchedulerError;

/// Brings databases written by older builds up to the current column set.
pub(super) fn ensure_tasks_columns(conn: &Connection) -> Result<(), SchedulerError> {
    let mut stmt = conn.prepare("PRAGMA table_info(tasks)")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = HashSet::new();
    for row in rows {
        columns.insert(row?);
    }

    if !columns.contains("channel_name") {
        conn.execute("ALTER TABLE tasks ADD COLUMN channel_name TEXT", [])?;
    }
    if !columns.contains("message") {
        conn.execute("ALTER TABLE tasks ADD COLUMN message TEXT", [])?;
    }
    if !columns.contains("send_attempts") {
        conn.execute(
            "ALTER TABLE tasks ADD COLUMN send_attempts INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    Ok(())
}
