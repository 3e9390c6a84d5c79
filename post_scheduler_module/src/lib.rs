pub mod delivery;
pub mod discord_gateway;
pub mod service;

mod scheduler;

pub use delivery::{
    ChannelSummary, DeliveryAdapter, DeliveryError, DiscordDelivery, Payload, ResolvedChannel,
    SentMessage,
};
pub use scheduler::{
    after_delivery, next_occurrence, CycleOutcome, CycleReport, NewTask, Recurrence,
    RecurrenceDecision, Scheduler, SchedulerError, SqliteTaskStore, Task, TaskPatch, TaskStatus,
};
