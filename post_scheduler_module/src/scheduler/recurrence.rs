use chrono::{DateTime, Months, Utc};

use super::types::{Recurrence, Task};

/// What happens to a task after a successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrenceDecision {
    Reschedule(DateTime<Utc>),
    /// One-shot task is done and can be removed.
    Complete,
    /// Yearly series that cannot advance any further. Kept, but never sent again.
    Retire,
}

/// Same wall-clock time one calendar year later, in UTC. A 29 February start lands on
/// 28 February. Returns `None` when the result falls outside chrono's range.
pub fn next_occurrence(after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    after.checked_add_months(Months::new(12))
}

pub fn after_delivery(task: &Task) -> RecurrenceDecision {
    match task.recurrence {
        Recurrence::Once => RecurrenceDecision::Complete,
        Recurrence::Yearly => match next_occurrence(task.scheduled_time) {
            Some(next) => RecurrenceDecision::Reschedule(next),
            None => RecurrenceDecision::Retire,
        },
    }
}
