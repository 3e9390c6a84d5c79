use std::sync::Arc;

use compose_module::GeminiClient;

use crate::delivery::DeliveryAdapter;
use crate::scheduler::Scheduler;

use super::config::ServiceConfig;

/// Shared by every request handler. The scheduler carries the task store handle and
/// the delivery adapter, so handlers see the same store the poll loop uses.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub scheduler: Arc<Scheduler<dyn DeliveryAdapter>>,
    /// `None` when no Gemini API key is configured.
    pub composer: Option<Arc<GeminiClient>>,
}
