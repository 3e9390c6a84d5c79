//! Discord Gateway event handler.
//!
//! Messages are never read from the gateway; it is only used to track whether the bot
//! session is live so the API can report 503 while connecting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serenity::all::{Context, EventHandler, Ready, ResumedEvent};
use serenity::async_trait;
use tracing::info;

/// Serenity event handler that flips a shared readiness flag.
pub struct ReadinessHandler {
    ready: Arc<AtomicBool>,
}

impl ReadinessHandler {
    pub fn new(ready: Arc<AtomicBool>) -> Self {
        Self { ready }
    }
}

#[async_trait]
impl EventHandler for ReadinessHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            "Discord bot connected as {} ({} guilds)",
            ready.user.name,
            ready.guilds.len()
        );
        self.ready.store(true, Ordering::SeqCst);
    }

    async fn resume(&self, _ctx: Context, _event: ResumedEvent) {
        info!("Discord gateway session resumed");
        self.ready.store(true, Ordering::SeqCst);
    }
}
