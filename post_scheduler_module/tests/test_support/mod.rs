#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tokio::sync::Notify;

use post_scheduler_module::{
    ChannelSummary, DeliveryAdapter, DeliveryError, NewTask, Payload, Recurrence, ResolvedChannel,
    SentMessage, SqliteTaskStore, Task,
};

pub const KNOWN_CHANNEL: &str = "1001";

/// Failure injected into the scripted adapter.
#[derive(Debug, Clone)]
pub enum ScriptedFailure {
    NotReady,
    NotFound,
    Send(String),
}

impl ScriptedFailure {
    fn to_error(&self, channel_id: &str) -> DeliveryError {
        match self {
            ScriptedFailure::NotReady => DeliveryError::NotReady,
            ScriptedFailure::NotFound => DeliveryError::ChannelNotFound(channel_id.to_string()),
            ScriptedFailure::Send(reason) => DeliveryError::Send(reason.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSend {
    pub channel_id: String,
    pub text: Option<String>,
    pub attachment_path: Option<PathBuf>,
}

/// Holds the first `send` until released, so a test can act while delivery is in flight.
#[derive(Default)]
pub struct SendGate {
    pub entered: Notify,
    pub release: Notify,
}

/// In-memory adapter with known channels, scripted failures and a log of sends.
pub struct ScriptedDelivery {
    ready: AtomicBool,
    channels: Mutex<HashSet<String>>,
    resolve_failure: Mutex<Option<ScriptedFailure>>,
    send_failures: Mutex<VecDeque<ScriptedFailure>>,
    sends: Mutex<Vec<RecordedSend>>,
    resolve_calls: AtomicUsize,
    gate: Mutex<Option<Arc<SendGate>>>,
}

impl ScriptedDelivery {
    pub fn new() -> Self {
        let mut channels = HashSet::new();
        channels.insert(KNOWN_CHANNEL.to_string());
        Self {
            ready: AtomicBool::new(true),
            channels: Mutex::new(channels),
            resolve_failure: Mutex::new(None),
            send_failures: Mutex::new(VecDeque::new()),
            sends: Mutex::new(Vec::new()),
            resolve_calls: AtomicUsize::new(0),
            gate: Mutex::new(None),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn add_channel(&self, channel_id: &str) {
        self.channels.lock().unwrap().insert(channel_id.to_string());
    }

    pub fn fail_resolve_with(&self, failure: Option<ScriptedFailure>) {
        *self.resolve_failure.lock().unwrap() = failure;
    }

    pub fn fail_next_sends(&self, failures: impl IntoIterator<Item = ScriptedFailure>) {
        self.send_failures.lock().unwrap().extend(failures);
    }

    pub fn gate_next_send(&self) -> Arc<SendGate> {
        let gate = Arc::new(SendGate::default());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn sends(&self) -> Vec<RecordedSend> {
        self.sends.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sends.lock().unwrap().len()
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedDelivery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryAdapter for ScriptedDelivery {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn resolve_channel(&self, channel_id: &str) -> Result<ResolvedChannel, DeliveryError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if !self.is_ready() {
            return Err(DeliveryError::NotReady);
        }
        if let Some(failure) = self.resolve_failure.lock().unwrap().clone() {
            return Err(failure.to_error(channel_id));
        }
        if !self.channels.lock().unwrap().contains(channel_id) {
            return Err(DeliveryError::ChannelNotFound(channel_id.to_string()));
        }
        Ok(ResolvedChannel {
            id: channel_id.to_string(),
            name: Some(format!("Guild - #{}", channel_id)),
        })
    }

    async fn send(
        &self,
        channel: &ResolvedChannel,
        payload: &Payload,
    ) -> Result<SentMessage, DeliveryError> {
        assert!(!payload.is_empty(), "empty payload reached the adapter");

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        if let Some(failure) = self.send_failures.lock().unwrap().pop_front() {
            return Err(failure.to_error(&channel.id));
        }
        if let Some(path) = payload.attachment_path.as_deref() {
            if !path.exists() {
                return Err(DeliveryError::Attachment {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing file"),
                });
            }
        }

        let mut sends = self.sends.lock().unwrap();
        sends.push(RecordedSend {
            channel_id: channel.id.clone(),
            text: payload.text.clone(),
            attachment_path: payload.attachment_path.clone(),
        });
        Ok(SentMessage {
            message_id: format!("msg-{}", sends.len()),
        })
    }

    async fn list_channels(&self) -> Result<Vec<ChannelSummary>, DeliveryError> {
        if !self.is_ready() {
            return Err(DeliveryError::NotReady);
        }
        let mut channels: Vec<ChannelSummary> = self
            .channels
            .lock()
            .unwrap()
            .iter()
            .map(|id| ChannelSummary {
                id: id.clone(),
                name: format!("Guild - #{}", id),
            })
            .collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(channels)
    }
}

pub fn temp_store() -> (TempDir, SqliteTaskStore) {
    let temp = TempDir::new().expect("tempdir");
    let store = SqliteTaskStore::new(temp.path().join("schedules.db")).expect("store");
    (temp, store)
}

pub fn insert_task(
    store: &SqliteTaskStore,
    message: Option<&str>,
    attachment_path: Option<PathBuf>,
    scheduled_time: DateTime<Utc>,
    recurrence: Recurrence,
) -> Task {
    store
        .insert(NewTask {
            channel_id: KNOWN_CHANNEL.to_string(),
            channel_name: Some("Guild - #general".to_string()),
            message: message.map(str::to_string),
            attachment_path,
            scheduled_time,
            recurrence,
        })
        .expect("insert task")
}
