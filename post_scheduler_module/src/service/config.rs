use std::env;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use compose_module::GeminiConfig;

use super::BoxError;

pub const DEFAULT_UPLOAD_MAX_BYTES: usize = 25 * 1024 * 1024;
/// Claims older than this at startup belonged to a process that died mid-cycle.
pub const DEFAULT_STALE_CLAIM_SECS: u64 = 600;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub schedules_db_path: PathBuf,
    pub uploads_dir: PathBuf,
    /// Static dashboard served at `/`; skipped when the directory does not exist.
    pub dashboard_dir: PathBuf,
    pub scheduler_poll_interval: Duration,
    /// `None` keeps retrying failed sends forever.
    pub scheduler_max_send_attempts: Option<u32>,
    pub stale_claim_after: Duration,
    pub upload_max_bytes: usize,
    /// Discord bot token
    pub discord_bot_token: Option<String>,
    /// Only list channels from this guild
    pub discord_guild_id: Option<u64>,
    pub compose: Option<GeminiConfig>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, BoxError> {
        dotenvy::dotenv().ok();

        let host = env::var("SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let schedules_db_path = resolve_path(
            env::var("SCHEDULES_DB_PATH").unwrap_or_else(|_| "schedules.db".to_string()),
        )?;
        let uploads_dir =
            resolve_path(env::var("UPLOADS_DIR").unwrap_or_else(|_| "uploads".to_string()))?;
        let dashboard_dir =
            resolve_path(env::var("DASHBOARD_DIR").unwrap_or_else(|_| "public".to_string()))?;

        let scheduler_poll_interval = env::var("SCHEDULER_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(10));
        let scheduler_max_send_attempts = env::var("SCHEDULER_MAX_SEND_ATTEMPTS")
            .ok()
            .and_then(|value| value.trim().parse::<u32>().ok())
            .filter(|value| *value > 0);
        let stale_claim_after = env::var("SCHEDULER_STALE_CLAIM_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(DEFAULT_STALE_CLAIM_SECS));
        let upload_max_bytes = env::var("UPLOAD_MAX_BYTES")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_UPLOAD_MAX_BYTES);

        let discord_bot_token =
            env_var_non_empty("DISCORD_TOKEN").or_else(|| env_var_non_empty("DISCORD_BOT_TOKEN"));
        let discord_guild_id = match env_var_non_empty("GUILD_ID") {
            Some(raw) => Some(
                raw.parse::<u64>()
                    .map_err(|_| format!("GUILD_ID must be a numeric id, got '{}'", raw))?,
            ),
            None => None,
        };

        Ok(Self {
            host,
            port,
            schedules_db_path,
            uploads_dir,
            dashboard_dir,
            scheduler_poll_interval,
            scheduler_max_send_attempts,
            stale_claim_after,
            upload_max_bytes,
            discord_bot_token,
            discord_guild_id,
            compose: GeminiConfig::from_env(),
        })
    }
}

fn env_var_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn resolve_path(raw: String) -> Result<PathBuf, io::Error> {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        Ok(path)
    } else {
        let cwd = env::current_dir()?;
        Ok(cwd.join(path))
    }
}
