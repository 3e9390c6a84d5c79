use rusqlite::Row;
use std::path::PathBuf;
use uuid::Uuid;

use super::super::types::{SchedulerError, Task};
use super::super::utils::{millis_to_datetime, parse_datetime};

/// Raw column values in `TASK_COLUMNS` order, decoded outside the rusqlite callback so
/// malformed rows surface as `SchedulerError` instead of a generic conversion failure.
pub(super) struct TaskRow {
    id: String,
    channel_id: String,
    channel_name: Option<String>,
    message: Option<String>,
    attachment_path: Option<String>,
    scheduled_time: i64,
    recurrence: String,
    status: String,
    send_attempts: i64,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    pub(super) fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            channel_id: row.get(1)?,
            channel_name: row.get(2)?,
            message: row.get(3)?,
            attachment_path: row.get(4)?,
            scheduled_time: row.get(5)?,
            recurrence: row.get(6)?,
            status: row.get(7)?,
            send_attempts: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    pub(super) fn id(&self) -> &str {
        &self.id
    }

    pub(super) fn into_task(self) -> Result<Task, SchedulerError> {
        let send_attempts = u32::try_from(self.send_attempts).map_err(|_| {
            SchedulerError::Storage(format!(
                "invalid send_attempts {} for task {}",
                self.send_attempts, self.id
            ))
        })?;
        Ok(Task {
            id: Uuid::parse_str(&self.id)?,
            channel_id: self.channel_id,
            channel_name: self.channel_name.filter(|value| !value.is_empty()),
            message: self.message.filter(|value| !value.is_empty()),
            attachment_path: self
                .attachment_path
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
            scheduled_time: millis_to_datetime(self.scheduled_time)?,
            recurrence: self.recurrence.parse()?,
            status: self.status.parse()?,
            send_attempts,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}
