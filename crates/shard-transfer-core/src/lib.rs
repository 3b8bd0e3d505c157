// SPDX-License-Identifier: AGPL-3.0
// Shard Transfer Core - Transfer lifecycle coordination
//
// This crate provides:
// - ProgressMirror and LifecycleReconciler for per-item download state
// - TransferQueueManager for the serial transfer queue to a secondary device
// - ProtocolSelector for detected peer addresses
// - Coordinator, the context object wiring them to the engine
//
// The engine itself is external; it is reached through EngineHandle and
// pushes EngineEvents back over an EventSource.

pub mod coordinator;
pub mod detection;
pub mod engine;
pub mod events;
pub mod format;
pub mod logging;
pub mod mirror;
pub mod queue;
pub mod reconcile;
pub mod settings;
pub mod types;

// Re-export commonly used items
pub use coordinator::{Coordinator, StartupReport, Subscription};
pub use detection::ProtocolSelector;
pub use engine::{
    EngineCommand, EngineHandle, EngineReply, PendingReply, COMMAND_CHANNEL_CAPACITY,
};
pub use events::{
    event_channel, DownloadMetrics, EngineEvent, EventSource, JobSnapshot, PresenceUpdate,
    TransferComplete, TransferFailure, EVENT_CHANNEL_CAPACITY,
};
pub use mirror::ProgressMirror;
pub use queue::{QueueSnapshot, TransferQueueManager};
pub use reconcile::{LifecycleReconciler, ReconcileReport};
pub use settings::{CoordinatorSettings, SettingsStore};
pub use types::{
    ActiveTransfer, AppError, DownloadJob, DownloadProgress, DownloadStage, ItemId,
    ProtocolDetectionState, TransferErrorRecord, TransferProgress, TransferQueueEntry,
    TransferStatus,
};
