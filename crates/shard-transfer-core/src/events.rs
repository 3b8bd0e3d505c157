// SPDX-License-Identifier: AGPL-3.0
// Shard Transfer Core - Engine events
//
// Events are pushed by the engine over a bounded channel, fire-and-forget.
// Delivery is at-most-once and unordered across distinct items.

use crate::types::{AppError, ItemId, TransferProgress};
use async_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

/// Capacity of the push channel from the engine
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Engine event names as emitted on the wire
pub mod names {
    pub const DOWNLOAD_RESTORED: &str = "download-restored";
    pub const DOWNLOAD_PROGRESS: &str = "download-progress";
    pub const DOWNLOAD_COMPLETE: &str = "download-complete";
    pub const DOWNLOAD_ERROR: &str = "download-error";
    pub const QUEUE_UPDATED: &str = "ftp-queue-updated";
    pub const TRANSFER_PROGRESS: &str = "ftp-transfer-progress";
    pub const TRANSFER_COMPLETE: &str = "ftp-transfer-complete";
    pub const TRANSFER_ERROR: &str = "ftp-transfer-error";
    pub const PRESENCE_CHANGED: &str = "ftp-status-changed";
}

/// An engine-side job, as listed by the engine or announced after a restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    #[serde(alias = "gameId")]
    pub item_id: ItemId,
    #[serde(default, rename = "state")]
    pub state_label: String,
    /// Completed fraction in 0.0..=1.0
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub downloaded_bytes: u64,
    #[serde(default)]
    pub total_bytes: u64,
}

/// Periodic download metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadMetrics {
    #[serde(alias = "gameId")]
    pub item_id: ItemId,
    #[serde(default, rename = "state")]
    pub state_label: String,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub downloaded_bytes: u64,
    #[serde(default)]
    pub total_bytes: u64,
    #[serde(default)]
    pub download_speed: f64,
    #[serde(default)]
    pub upload_speed: f64,
    #[serde(default)]
    pub peers: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemPayload {
    #[serde(alias = "gameId")]
    item_id: ItemId,
    #[serde(default)]
    error: Option<String>,
}

/// A device transfer that finished successfully
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferComplete {
    #[serde(alias = "gameId")]
    pub item_id: ItemId,
    pub file_name: String,
}

/// A device transfer that failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferFailure {
    #[serde(alias = "gameId")]
    pub item_id: ItemId,
    pub file_name: String,
    pub error: String,
}

/// Peer presence as reported by the background scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub is_active: bool,
    #[serde(rename = "activeIps", alias = "addresses", default)]
    pub addresses: Vec<String>,
}

/// Everything the engine can push to the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    DownloadRestored(JobSnapshot),
    DownloadProgress(DownloadMetrics),
    DownloadComplete { item_id: ItemId },
    DownloadError { item_id: ItemId, error: Option<String> },
    /// Carries no queue contents; the queue is always pulled
    QueueChanged,
    TransferProgress(TransferProgress),
    TransferComplete(TransferComplete),
    TransferError(TransferFailure),
    PresenceChanged(PresenceUpdate),
}

impl EngineEvent {
    /// Decode a named JSON event as emitted by the engine
    pub fn from_named(name: &str, payload: serde_json::Value) -> Result<Self, AppError> {
        fn decode<T: serde::de::DeserializeOwned>(
            name: &str,
            payload: serde_json::Value,
        ) -> Result<T, AppError> {
            serde_json::from_value(payload)
                .map_err(|e| AppError::MalformedEvent(format!("{}: {}", name, e)))
        }

        let event = match name {
            names::DOWNLOAD_RESTORED => Self::DownloadRestored(decode(name, payload)?),
            names::DOWNLOAD_PROGRESS => Self::DownloadProgress(decode(name, payload)?),
            names::DOWNLOAD_COMPLETE => {
                let item: ItemPayload = decode(name, payload)?;
                Self::DownloadComplete {
                    item_id: item.item_id,
                }
            }
            names::DOWNLOAD_ERROR => {
                let item: ItemPayload = decode(name, payload)?;
                Self::DownloadError {
                    item_id: item.item_id,
                    error: item.error,
                }
            }
            names::QUEUE_UPDATED => Self::QueueChanged,
            names::TRANSFER_PROGRESS => Self::TransferProgress(decode(name, payload)?),
            names::TRANSFER_COMPLETE => Self::TransferComplete(decode(name, payload)?),
            names::TRANSFER_ERROR => Self::TransferError(decode(name, payload)?),
            names::PRESENCE_CHANGED => Self::PresenceChanged(decode(name, payload)?),
            other => {
                return Err(AppError::MalformedEvent(format!(
                    "unknown event: {}",
                    other
                )))
            }
        };

        Ok(event)
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DownloadRestored(_) => names::DOWNLOAD_RESTORED,
            Self::DownloadProgress(_) => names::DOWNLOAD_PROGRESS,
            Self::DownloadComplete { .. } => names::DOWNLOAD_COMPLETE,
            Self::DownloadError { .. } => names::DOWNLOAD_ERROR,
            Self::QueueChanged => names::QUEUE_UPDATED,
            Self::TransferProgress(_) => names::TRANSFER_PROGRESS,
            Self::TransferComplete(_) => names::TRANSFER_COMPLETE,
            Self::TransferError(_) => names::TRANSFER_ERROR,
            Self::PresenceChanged(_) => names::PRESENCE_CHANGED,
        }
    }
}

/// Receiving end of the engine push channel.
///
/// Not `Clone`: attaching a source to a coordinator moves it, so the same
/// channel can only ever feed one dispatch loop at a time.
#[derive(Debug)]
pub struct EventSource {
    rx: Receiver<EngineEvent>,
}

impl EventSource {
    /// Next event, or `None` once the engine side has closed the channel
    pub async fn recv(&self) -> Option<EngineEvent> {
        self.rx.recv().await.ok()
    }
}

/// Create the push channel between the engine integration and the coordinator
pub fn event_channel(capacity: usize) -> (Sender<EngineEvent>, EventSource) {
    let (tx, rx) = async_channel::bounded(capacity);
    (tx, EventSource { rx })
}
