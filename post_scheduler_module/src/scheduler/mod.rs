mod core;
mod recurrence;
mod store;
mod types;
mod utils;

pub use core::{CycleOutcome, CycleReport, Scheduler};
pub(crate) use core::remove_attachment;
pub use recurrence::{after_delivery, next_occurrence, RecurrenceDecision};
pub use store::SqliteTaskStore;
pub use types::{NewTask, Recurrence, SchedulerError, Task, TaskPatch, TaskStatus};
