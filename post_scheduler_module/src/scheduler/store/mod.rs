use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, warn};
use uuid::Uuid;

use super::types::{NewTask, SchedulerError, Task, TaskPatch, TaskStatus};
use super::utils::{datetime_to_millis, format_datetime, now_millis, truncate_to_millis};

mod migrations;
mod schema;
mod task_rows;

use migrations::ensure_tasks_columns;
use schema::{SCHEDULER_SCHEMA, TASK_COLUMNS};
use task_rows::TaskRow;

/// SQLite-backed task store. Every operation opens its own connection, so a store value
/// is cheap to clone and safe to share between the scheduler loop and request handlers.
/// Several processes may point at the same file; `claim` stays atomic across them.
#[derive(Debug, Clone)]
pub struct SqliteTaskStore {
    path: PathBuf,
}

impl SqliteTaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, SchedulerError> {
        let store = Self { path: path.into() };
        let _ = store.open()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn insert(&self, new_task: NewTask) -> Result<Task, SchedulerError> {
        let now = now_millis();
        let task = Task {
            id: Uuid::new_v4(),
            channel_id: new_task.channel_id,
            channel_name: new_task.channel_name.filter(|value| !value.is_empty()),
            message: new_task.message.filter(|value| !value.is_empty()),
            attachment_path: new_task.attachment_path,
            scheduled_time: truncate_to_millis(new_task.scheduled_time),
            recurrence: new_task.recurrence,
            status: TaskStatus::Pending,
            send_attempts: 0,
            created_at: now,
            updated_at: now,
        };

        let conn = self.open()?;
        conn.execute(
            "INSERT INTO tasks (id, channel_id, channel_name, message, attachment_path, scheduled_time, recurrence, status, send_attempts, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                task.id.to_string(),
                task.channel_id.as_str(),
                task.channel_name.as_deref(),
                task.message.as_deref(),
                path_column(task.attachment_path.as_deref()),
                datetime_to_millis(task.scheduled_time),
                task.recurrence.as_str(),
                task.status.as_str(),
                task.send_attempts,
                format_datetime(task.created_at),
                format_datetime(task.updated_at),
            ],
        )?;
        Ok(task)
    }

    pub fn get(&self, id: Uuid) -> Result<Option<Task>, SchedulerError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id.to_string()],
                TaskRow::read,
            )
            .optional()?;
        row.map(TaskRow::into_task).transpose()
    }

    /// Every task regardless of status, earliest first. Rows that cannot be decoded are
    /// logged and left out.
    pub fn list_all(&self) -> Result<Vec<Task>, SchedulerError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY scheduled_time ASC, created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], TaskRow::read)?;
        let (tasks, _unreadable) = collect_tasks(rows)?;
        Ok(tasks)
    }

    /// Pending tasks whose scheduled time is at or before `now`, earliest first.
    ///
    /// A due row that cannot be decoded is moved to `error` so it stops showing up here;
    /// the remaining tasks are still returned.
    pub fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Task>, SchedulerError> {
        let conn = self.open()?;
        let (tasks, unreadable) = {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE status = 'pending' AND scheduled_time <= ?1
                 ORDER BY scheduled_time ASC, created_at ASC, id ASC"
            ))?;
            let rows = stmt.query_map(params![datetime_to_millis(now)], TaskRow::read)?;
            collect_tasks(rows)?
        };

        for id in unreadable {
            match conn.execute(
                "UPDATE tasks SET status = 'error', updated_at = ?2 WHERE id = ?1",
                params![id, format_datetime(now_millis())],
            ) {
                Ok(_) => warn!("task {} marked as error: stored row is unreadable", id),
                Err(err) => error!("failed to mark unreadable task {} as error: {}", id, err),
            }
        }
        Ok(tasks)
    }

    /// Moves a task from `pending` to `processing`. Returns `false` when the task is
    /// missing or in any other state, i.e. someone else already claimed it.
    pub fn claim(&self, id: Uuid) -> Result<bool, SchedulerError> {
        let conn = self.open()?;
        let changed = conn.execute(
            "UPDATE tasks
             SET status = 'processing',
                 updated_at = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id.to_string(), format_datetime(now_millis())],
        )?;
        Ok(changed == 1)
    }

    pub fn set_status(&self, id: Uuid, status: TaskStatus) -> Result<(), SchedulerError> {
        let conn = self.open()?;
        let changed = conn.execute(
            "UPDATE tasks SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), status.as_str(), format_datetime(now_millis())],
        )?;
        require_row(changed, id)
    }

    /// Sets a new scheduled time and clears the failed-send counter.
    pub fn reschedule(&self, id: Uuid, scheduled_time: DateTime<Utc>) -> Result<(), SchedulerError> {
        let conn = self.open()?;
        let changed = conn.execute(
            "UPDATE tasks
             SET scheduled_time = ?2,
                 send_attempts = 0,
                 updated_at = ?3
             WHERE id = ?1",
            params![
                id.to_string(),
                datetime_to_millis(scheduled_time),
                format_datetime(now_millis())
            ],
        )?;
        require_row(changed, id)
    }

    /// Merges `patch` into the stored task and returns the result.
    pub fn update(&self, id: Uuid, patch: TaskPatch) -> Result<Task, SchedulerError> {
        let conn = self.open()?;
        let changed = conn.execute(
            "UPDATE tasks
             SET channel_id = COALESCE(?2, channel_id),
                 channel_name = COALESCE(?3, channel_name),
                 message = COALESCE(?4, message),
                 attachment_path = COALESCE(?5, attachment_path),
                 scheduled_time = COALESCE(?6, scheduled_time),
                 recurrence = COALESCE(?7, recurrence),
                 status = COALESCE(?8, status),
                 updated_at = ?9
             WHERE id = ?1",
            params![
                id.to_string(),
                patch.channel_id.as_deref(),
                patch.channel_name.as_deref(),
                patch.message.as_deref(),
                path_column(patch.attachment_path.as_deref()),
                patch.scheduled_time.map(datetime_to_millis),
                patch.recurrence.map(|value| value.as_str()),
                patch.status.map(|value| value.as_str()),
                format_datetime(now_millis()),
            ],
        )?;
        require_row(changed, id)?;
        drop(conn);
        self.get(id)?.ok_or(SchedulerError::TaskNotFound(id))
    }

    pub fn delete(&self, id: Uuid) -> Result<(), SchedulerError> {
        let conn = self.open()?;
        let changed = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id.to_string()])?;
        require_row(changed, id)
    }

    /// Increments the failed-send counter and returns the new value.
    pub fn record_send_failure(&self, id: Uuid) -> Result<u32, SchedulerError> {
        let conn = self.open()?;
        let changed = conn.execute(
            "UPDATE tasks SET send_attempts = send_attempts + 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        require_row(changed, id)?;
        let count: i64 = conn.query_row(
            "SELECT send_attempts FROM tasks WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        u32::try_from(count)
            .map_err(|_| SchedulerError::Storage(format!("invalid send_attempts {count} for task {id}")))
    }

    /// Returns claims left behind by a process that stopped mid-cycle to `pending`.
    /// Only claims last touched before `claimed_before` are released.
    pub fn requeue_stale_claims(&self, claimed_before: DateTime<Utc>) -> Result<usize, SchedulerError> {
        let conn = self.open()?;
        let changed = conn.execute(
            "UPDATE tasks
             SET status = 'pending',
                 updated_at = ?2
             WHERE status = 'processing' AND updated_at < ?1",
            params![format_datetime(claimed_before), format_datetime(now_millis())],
        )?;
        Ok(changed)
    }

    fn open(&self) -> Result<Connection, SchedulerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEDULER_SCHEMA)?;
        ensure_tasks_columns(&conn)?;
        Ok(conn)
    }
}

/// Decodes rows one by one. Returns the decoded tasks and the raw ids of rows that failed
/// to decode; only a failure to read from SQLite aborts.
fn collect_tasks<I>(rows: I) -> Result<(Vec<Task>, Vec<String>), SchedulerError>
where
    I: Iterator<Item = rusqlite::Result<TaskRow>>,
{
    let mut tasks = Vec::new();
    let mut unreadable = Vec::new();
    for row in rows {
        let row = row?;
        let id = row.id().to_string();
        match row.into_task() {
            Ok(task) => tasks.push(task),
            Err(err) => {
                warn!("skipping unreadable task row {}: {}", id, err);
                unreadable.push(id);
            }
        }
    }
    Ok((tasks, unreadable))
}

fn require_row(changed: usize, id: Uuid) -> Result<(), SchedulerError> {
    if changed == 0 {
        Err(SchedulerError::TaskNotFound(id))
    } else {
        Ok(())
    }
}

fn path_column(path: Option<&Path>) -> Option<String> {
    path.map(|value| value.to_string_lossy().into_owned())
}
