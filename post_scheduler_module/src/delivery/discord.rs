//! Discord delivery over serenity.
//!
//! REST calls go through a shared `Http` handle; the gateway connection only exists to
//! learn when the bot is online (see [`crate::discord_gateway`]).

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{
    Channel, ChannelId, ChannelType, CreateAttachment, CreateMessage, GatewayIntents,
};
use serenity::http::{Http, HttpError};
use serenity::Client;
use tracing::{error, info, warn};

use super::{ChannelSummary, DeliveryAdapter, DeliveryError, Payload, ResolvedChannel, SentMessage};
use crate::discord_gateway::ReadinessHandler;

/// Discord JSON error code for "Unknown Channel".
const UNKNOWN_CHANNEL_CODE: isize = 10003;

pub struct DiscordDelivery {
    http: Option<Arc<Http>>,
    ready: Arc<AtomicBool>,
    guild_filter: Option<u64>,
}

impl DiscordDelivery {
    /// Builds the gateway client and starts it in the background. Readiness flips once
    /// the gateway reports `ready`, and back off if the client stops.
    pub async fn connect(token: &str, guild_filter: Option<u64>) -> Result<Self, serenity::Error> {
        let ready = Arc::new(AtomicBool::new(false));
        let handler = ReadinessHandler::new(ready.clone());

        let mut client = Client::builder(token, GatewayIntents::GUILDS)
            .event_handler(handler)
            .await?;
        let http = client.http.clone();

        let ready_flag = ready.clone();
        tokio::spawn(async move {
            info!("Starting Discord Gateway client...");
            if let Err(err) = client.start().await {
                error!("discord gateway stopped: {}", err);
            }
            ready_flag.store(false, Ordering::SeqCst);
        });

        Ok(Self {
            http: Some(http),
            ready,
            guild_filter,
        })
    }

    /// An adapter with no bot token. It never becomes ready.
    pub fn disconnected() -> Self {
        Self {
            http: None,
            ready: Arc::new(AtomicBool::new(false)),
            guild_filter: None,
        }
    }

    fn http(&self) -> Result<&Http, DeliveryError> {
        match &self.http {
            Some(http) if self.is_ready() => Ok(http.as_ref()),
            _ => Err(DeliveryError::NotReady),
        }
    }
}

#[async_trait]
impl DeliveryAdapter for DiscordDelivery {
    fn is_ready(&self) -> bool {
        self.http.is_some() && self.ready.load(Ordering::SeqCst)
    }

    async fn resolve_channel(&self, channel_id: &str) -> Result<ResolvedChannel, DeliveryError> {
        let http = self.http()?;
        let id = parse_channel_id(channel_id)?;
        let channel = http
            .get_channel(id)
            .await
            .map_err(|err| map_serenity_error(channel_id, err))?;
        let name = match channel {
            Channel::Guild(channel) => Some(channel.name),
            _ => None,
        };
        Ok(ResolvedChannel {
            id: channel_id.to_string(),
            name,
        })
    }

    async fn send(
        &self,
        channel: &ResolvedChannel,
        payload: &Payload,
    ) -> Result<SentMessage, DeliveryError> {
        let http = self.http()?;
        let id = parse_channel_id(&channel.id)?;

        let mut message = CreateMessage::new();
        if let Some(text) = payload.text.as_deref() {
            message = message.content(text);
        }
        if let Some(path) = payload.attachment_path.as_deref() {
            message = message.add_file(read_attachment(path).await?);
        }

        let sent = id
            .send_message(http, message)
            .await
            .map_err(|err| map_serenity_error(&channel.id, err))?;
        Ok(SentMessage {
            message_id: sent.id.get().to_string(),
        })
    }

    async fn list_channels(&self) -> Result<Vec<ChannelSummary>, DeliveryError> {
        let http = self.http()?;
        let guilds = http
            .get_guilds(None, None)
            .await
            .map_err(|err| DeliveryError::Send(err.to_string()))?;

        let mut channels = Vec::new();
        for guild in guilds {
            if let Some(filter) = self.guild_filter {
                if guild.id.get() != filter {
                    continue;
                }
            }
            let guild_channels = match http.get_channels(guild.id).await {
                Ok(list) => list,
                Err(err) => {
                    warn!("failed to list channels for guild {}: {}", guild.name, err);
                    continue;
                }
            };
            for channel in guild_channels {
                if channel.kind != ChannelType::Text {
                    continue;
                }
                channels.push(ChannelSummary {
                    id: channel.id.get().to_string(),
                    name: channel_label(&guild.name, &channel.name),
                });
            }
        }
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(channels)
    }
}

async fn read_attachment(path: &Path) -> Result<CreateAttachment, DeliveryError> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|source| DeliveryError::Attachment {
            path: path.to_path_buf(),
            source,
        })?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    Ok(CreateAttachment::bytes(data, filename))
}

fn parse_channel_id(raw: &str) -> Result<ChannelId, DeliveryError> {
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(DeliveryError::InvalidChannelId(raw.to_string())),
        Ok(id) => Ok(ChannelId::new(id)),
    }
}

fn channel_label(guild: &str, channel: &str) -> String {
    format!("{} - #{}", guild, channel)
}

fn map_serenity_error(channel_id: &str, err: serenity::Error) -> DeliveryError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = &err {
        if response.status_code.as_u16() == 404 || response.error.code == UNKNOWN_CHANNEL_CODE {
            return DeliveryError::ChannelNotFound(channel_id.to_string());
        }
    }
    DeliveryError::Send(err.to_string())
}
