use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use crate::delivery::DeliveryError;

/// How a task behaves after a successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    /// Deleted (with its attachment) once delivered.
    #[default]
    Once,
    /// Moved one calendar year forward and returned to `pending`.
    Yearly,
}

impl Recurrence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recurrence::Once => "once",
            Recurrence::Yearly => "yearly",
        }
    }
}

impl FromStr for Recurrence {
    type Err = SchedulerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "once" => Ok(Recurrence::Once),
            "yearly" => Ok(Recurrence::Yearly),
            other => Err(SchedulerError::InvalidRecurrence(other.to_string())),
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle: `pending -> processing -> {deleted | pending | error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Processing,
    Sent,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Sent => "sent",
            TaskStatus::Error => "error",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = SchedulerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "sent" => Ok(TaskStatus::Sent),
            "error" => Ok(TaskStatus::Error),
            other => Err(SchedulerError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scheduled delivery as persisted in the task store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub channel_id: String,
    /// Display label only; never used for delivery.
    #[serde(default)]
    pub channel_name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub attachment_path: Option<PathBuf>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub scheduled_time: DateTime<Utc>,
    #[serde(default)]
    pub recurrence: Recurrence,
    #[serde(default)]
    pub status: TaskStatus,
    /// Consecutive failed sends since the last successful one.
    #[serde(default)]
    pub send_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when a task is created. The store assigns id, status and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub channel_id: String,
    pub channel_name: Option<String>,
    pub message: Option<String>,
    pub attachment_path: Option<PathBuf>,
    pub scheduled_time: DateTime<Utc>,
    pub recurrence: Recurrence,
}

/// Partial update merged into a stored task; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub channel_id: Option<String>,
    pub channel_name: Option<String>,
    /// `Some("")` clears the text.
    pub message: Option<String>,
    pub attachment_path: Option<PathBuf>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub recurrence: Option<Recurrence>,
    pub status: Option<TaskStatus>,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("uuid parse error: {0}")]
    UuidParse(#[from] uuid::Error),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("task {0} not found")]
    TaskNotFound(Uuid),
    #[error("invalid recurrence: {0} (expected once or yearly)")]
    InvalidRecurrence(String),
    #[error("unknown task status: {0}")]
    UnknownStatus(String),
    #[error("timestamp out of range: {0}")]
    TimestampOutOfRange(i64),
    #[error("message has neither text nor attachment")]
    EmptyPayload,
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}
