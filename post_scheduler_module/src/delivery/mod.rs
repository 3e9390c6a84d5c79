//! Outbound delivery to a chat platform.
//!
//! The scheduler only talks to [`DeliveryAdapter`]; the Discord implementation lives in
//! [`discord`]. Tests substitute a scripted adapter.

pub mod discord;

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;

use crate::scheduler::Task;

pub use discord::DiscordDelivery;

/// A destination that exists and can receive messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChannel {
    pub id: String,
    pub name: Option<String>,
}

/// Content of one outgoing message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    pub text: Option<String>,
    pub attachment_path: Option<PathBuf>,
}

impl Payload {
    pub fn new(text: Option<String>, attachment_path: Option<PathBuf>) -> Self {
        Self {
            text: text.filter(|value| !value.trim().is_empty()),
            attachment_path,
        }
    }

    pub fn from_task(task: &Task) -> Self {
        Self::new(task.message.clone(), task.attachment_path.clone())
    }

    /// True when there is nothing worth sending.
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.attachment_path.is_none()
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// A selectable destination, as listed for the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub message_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("messaging client is not connected yet")]
    NotReady,
    #[error("channel {0} not found")]
    ChannelNotFound(String),
    #[error("invalid channel id: {0:?}")]
    InvalidChannelId(String),
    #[error("failed to read attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("send failed: {0}")]
    Send(String),
}

impl DeliveryError {
    /// Errors that will not go away by retrying the same task.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            DeliveryError::ChannelNotFound(_) | DeliveryError::InvalidChannelId(_)
        )
    }
}

#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
    fn is_ready(&self) -> bool;

    async fn resolve_channel(&self, channel_id: &str) -> Result<ResolvedChannel, DeliveryError>;

    /// Callers never pass an empty payload.
    async fn send(
        &self,
        channel: &ResolvedChannel,
        payload: &Payload,
    ) -> Result<SentMessage, DeliveryError>;

    async fn list_channels(&self) -> Result<Vec<ChannelSummary>, DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_text_counts_as_empty() {
        let payload = Payload::new(Some("  \n".to_string()), None);
        assert!(payload.is_empty());
        assert_eq!(payload.text(), "");

        let with_file = Payload::new(None, Some(PathBuf::from("uploads/a.png")));
        assert!(!with_file.is_empty());
    }

    #[test]
    fn only_missing_channels_are_permanent() {
        assert!(DeliveryError::ChannelNotFound("1".to_string()).is_permanent());
        assert!(DeliveryError::InvalidChannelId("abc".to_string()).is_permanent());
        assert!(!DeliveryError::NotReady.is_permanent());
        assert!(!DeliveryError::Send("timeout".to_string()).is_permanent());
    }
}
