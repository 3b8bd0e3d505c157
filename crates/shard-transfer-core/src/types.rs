// SPDX-License-Identifier: AGPL-3.0
// Shard Transfer Core - Type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Catalog item identifier
pub type ItemId = u32;

/// Discrete phase of a download job
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DownloadStage {
    Initializing = 0,
    Negotiating = 1,
    /// Stage slot 2 carries no lifecycle meaning
    Unused = 2,
    Downloading = 3,
    Extracting = 4,
    Done = 5,
}

impl DownloadStage {
    /// Numeric stage index as shown by the presentation layer
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Initializing),
            1 => Some(Self::Negotiating),
            2 => Some(Self::Unused),
            3 => Some(Self::Downloading),
            4 => Some(Self::Extracting),
            5 => Some(Self::Done),
            _ => None,
        }
    }
}

/// Latest engine-reported metrics for a download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    /// Completed fraction in 0.0..=1.0
    pub fraction: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    /// Bytes per second
    pub download_rate: f64,
    /// Bytes per second
    pub upload_rate: f64,
    pub peers: u32,
    /// Opaque descriptive label from the engine
    pub state_label: String,
}

impl DownloadProgress {
    pub fn initializing() -> Self {
        Self {
            fraction: 0.0,
            downloaded_bytes: 0,
            total_bytes: 0,
            download_rate: 0.0,
            upload_rate: 0.0,
            peers: 0,
            state_label: "Initializing".to_string(),
        }
    }
}

/// One tracked multi-stage download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadJob {
    pub item_id: ItemId,
    pub stage: DownloadStage,
    pub is_running: bool,
    pub is_paused: bool,
    pub progress: DownloadProgress,
    /// Last error reported by the engine, kept for inspection
    pub error: Option<String>,
}

impl DownloadJob {
    /// Fresh job as created by an explicit start
    pub fn started(item_id: ItemId) -> Self {
        Self {
            item_id,
            stage: DownloadStage::Initializing,
            is_running: true,
            is_paused: false,
            progress: DownloadProgress::initializing(),
            error: None,
        }
    }
}

/// A file waiting in the device transfer queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferQueueEntry {
    #[serde(alias = "gameId")]
    pub item_id: ItemId,
    #[serde(alias = "gameTitle")]
    pub title: String,
    /// Unique within a queue
    pub file_path: String,
    pub file_name: String,
    pub file_size: u64,
}

/// Status of a device transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Queued,
    Transferring,
    Completed,
    Failed,
    Cancelled,
}

/// Snapshot of the single in-flight device transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    #[serde(alias = "gameId")]
    pub item_id: ItemId,
    pub file_name: String,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub progress_percent: f64,
    /// Bytes per second, engine computed
    pub transfer_speed: f64,
    pub eta_seconds: u64,
    pub status: TransferStatus,
}

/// The process-wide active transfer is the latest pushed progress snapshot
pub type ActiveTransfer = TransferProgress;

/// A transfer failure retained for display
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferErrorRecord {
    pub item_id: Option<ItemId>,
    pub file_name: Option<String>,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl TransferErrorRecord {
    /// Failure of a direct command, not tied to a specific file
    pub fn command(message: impl Into<String>) -> Self {
        Self {
            item_id: None,
            file_name: None,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// Peer presence and address selection state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolDetectionState {
    pub is_active: bool,
    /// Scan order is priority order
    pub candidate_addresses: Vec<String>,
    /// Always a member of `candidate_addresses`, and `None` while inactive
    pub selected_address: Option<String>,
    pub is_monitoring: bool,
}

/// Error types for the coordinator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Engine unavailable")]
    EngineUnavailable,

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("File I/O error: {0}")]
    FileIo(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::FileIo(err.to_string())
    }
}
