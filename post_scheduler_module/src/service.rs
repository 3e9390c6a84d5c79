mod config;
mod forms;
mod handlers;
mod server;
mod state;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use config::{ServiceConfig, DEFAULT_STALE_CLAIM_SECS, DEFAULT_UPLOAD_MAX_BYTES};
pub use forms::parse_schedule_time;
pub use server::{build_router, run_server};
pub use state::AppState;
