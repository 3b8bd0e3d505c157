// SPDX-License-Identifier: AGPL-3.0
// Shard Transfer Core - Transfer queue manager
//
// The engine transfers one file at a time to the secondary device and owns
// the authoritative queue. This side mirrors it: queue mutations are sent to
// the engine and followed by a full pull, never applied locally.
//
// A mutation and its pull are two separate engine calls. Push events may be
// applied in between, and pulls triggered by those events may complete out
// of order. Every pull is numbered under the same lock that places it in the
// command channel, so numbers follow the engine's service order. Only a pull
// newer than the last settled one may replace the mirror; a failed pull
// settles its number too, so older answers that arrive after it are dropped.

use crate::engine::EngineHandle;
use crate::events::{TransferComplete, TransferFailure};
use crate::format;
use crate::types::{
    ActiveTransfer, AppError, TransferErrorRecord, TransferProgress, TransferQueueEntry,
    TransferStatus,
};
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};

/// Point-in-time copy of the transfer mirror
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    /// Destination configured on the engine
    pub peer_address: Option<String>,
    /// Result of the last scan
    pub available: Vec<TransferQueueEntry>,
    /// Engine queue, in engine order
    pub queue: Vec<TransferQueueEntry>,
    pub active: Option<ActiveTransfer>,
    /// True exactly when `active` has status `Transferring`
    pub is_transferring: bool,
    pub is_scanning: bool,
    pub last_error: Option<TransferErrorRecord>,
}

impl QueueSnapshot {
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn has_peer(&self) -> bool {
        self.peer_address.is_some()
    }

    pub fn formatted_speed(&self) -> String {
        match &self.active {
            Some(active) => format::format_transfer_speed(active.transfer_speed),
            None => "0 MB/s".to_string(),
        }
    }

    pub fn formatted_eta(&self) -> String {
        match &self.active {
            Some(active) => format::format_eta(active.eta_seconds),
            None => "--:--".to_string(),
        }
    }
}

struct QueueState {
    snapshot: QueueSnapshot,
    /// Newest pull that has been applied or has failed
    applied_seq: u64,
}

/// Arbitrates the single-active-transfer resource through the engine
pub struct TransferQueueManager {
    engine: EngineHandle,
    state: RwLock<QueueState>,
    /// Serializes mutate-then-pull sequences
    mutation: Mutex<()>,
    /// Last issued pull number; held while the pull is sent
    pull_seq: Mutex<u64>,
}

impl TransferQueueManager {
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            engine,
            state: RwLock::new(QueueState {
                snapshot: QueueSnapshot::default(),
                applied_seq: 0,
            }),
            mutation: Mutex::new(()),
            pull_seq: Mutex::new(0),
        }
    }

    /// Configure the destination device
    pub async fn set_peer_address(&self, address: &str) -> Result<(), AppError> {
        self.clear_error().await;

        match self.engine.set_peer_address(address).await {
            Ok(()) => {
                self.state.write().await.snapshot.peer_address = Some(address.to_string());
                tracing::info!("Peer address set to {}", address);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to set peer address {}: {}", address, e);
                self.record_command_error(&e).await;
                Err(e)
            }
        }
    }

    /// Pull the configured destination from the engine
    pub async fn refresh_peer_address(&self) -> Result<Option<String>, AppError> {
        let address = self.engine.get_peer_address().await?;
        self.state.write().await.snapshot.peer_address = address.clone();
        Ok(address)
    }

    /// Enumerate transferable files under `path`. Does not touch the queue.
    pub async fn scan(&self, path: impl Into<PathBuf>) -> Result<Vec<TransferQueueEntry>, AppError> {
        let path = path.into();
        {
            let mut state = self.state.write().await;
            state.snapshot.is_scanning = true;
            state.snapshot.last_error = None;
        }

        let result = self.engine.scan_source(path.clone()).await;

        let mut state = self.state.write().await;
        state.snapshot.is_scanning = false;
        match result {
            Ok(files) => {
                tracing::info!("Found {} transferable file(s) in {}", files.len(), path.display());
                state.snapshot.available = files.clone();
                Ok(files)
            }
            Err(e) => {
                tracing::error!("Failed to scan {}: {}", path.display(), e);
                state.snapshot.last_error = Some(TransferErrorRecord::command(e.to_string()));
                Err(e)
            }
        }
    }

    /// Ask the engine to accept `entry`, then pull its queue
    pub async fn enqueue(&self, entry: TransferQueueEntry) -> Result<(), AppError> {
        let _guard = self.mutation.lock().await;
        self.clear_error().await;

        let file_name = entry.file_name.clone();
        if let Err(e) = self.engine.enqueue(entry).await {
            tracing::error!("Failed to queue {}: {}", file_name, e);
            self.record_command_error(&e).await;
            return Err(e);
        }
        tracing::info!("Queued {} for transfer", file_name);

        self.refresh_queue().await.map(|_| ())
    }

    /// Remove the entry with `file_path` from the engine queue, then pull it
    pub async fn dequeue(&self, file_path: &str) -> Result<(), AppError> {
        let _guard = self.mutation.lock().await;
        self.clear_error().await;

        if let Err(e) = self.engine.remove_from_queue(file_path).await {
            tracing::error!("Failed to remove {} from queue: {}", file_path, e);
            self.record_command_error(&e).await;
            return Err(e);
        }
        tracing::info!("Removed {} from queue", file_path);

        self.refresh_queue().await.map(|_| ())
    }

    /// Empty the engine queue, then pull it
    pub async fn clear(&self) -> Result<(), AppError> {
        let _guard = self.mutation.lock().await;
        self.clear_error().await;

        if let Err(e) = self.engine.clear_queue().await {
            tracing::error!("Failed to clear queue: {}", e);
            self.record_command_error(&e).await;
            return Err(e);
        }
        tracing::info!("Transfer queue cleared");

        self.refresh_queue().await.map(|_| ())
    }

    /// Replace the local queue with the engine's, unless a newer pull has
    /// already been applied. Returns the mirrored queue.
    pub async fn refresh_queue(&self) -> Result<Vec<TransferQueueEntry>, AppError> {
        let (seq, pending) = {
            let mut last = self.pull_seq.lock().await;
            let pending = self.engine.request_queue().await?;
            *last += 1;
            (*last, pending)
        };

        let queue = match pending.recv().await {
            Ok(queue) => queue,
            Err(e) => {
                let mut state = self.state.write().await;
                state.applied_seq = state.applied_seq.max(seq);
                return Err(e);
            }
        };

        let mut state = self.state.write().await;
        if seq > state.applied_seq {
            state.applied_seq = seq;
            state.snapshot.queue = queue;
        } else {
            tracing::debug!(
                "Discarding queue pull #{}, #{} already applied",
                seq,
                state.applied_seq
            );
        }
        Ok(state.snapshot.queue.clone())
    }

    /// Pull the engine's current transfer
    pub async fn refresh_current_transfer(&self) -> Result<Option<ActiveTransfer>, AppError> {
        let current = self.engine.get_current_transfer().await?;

        let mut state = self.state.write().await;
        state.snapshot.is_transferring = is_transferring(current.as_ref());
        state.snapshot.active = current.clone();
        Ok(current)
    }

    /// The engine's own transfer-active flag. Returned as is, without
    /// touching the mirror, whose flag always follows the active snapshot.
    pub async fn engine_is_transferring(&self) -> Result<bool, AppError> {
        self.engine.is_transferring().await
    }

    /// Replace the active transfer with the pushed snapshot
    pub async fn on_progress(&self, progress: TransferProgress) {
        let mut state = self.state.write().await;
        state.snapshot.is_transferring = progress.status == TransferStatus::Transferring;
        state.snapshot.active = Some(progress);
    }

    pub async fn on_queue_changed(&self) {
        if let Err(e) = self.refresh_queue().await {
            tracing::warn!("Failed to refresh transfer queue: {}", e);
        }
    }

    pub async fn on_complete(&self, payload: &TransferComplete) {
        tracing::info!("Transfer completed: {}", payload.file_name);
        {
            let mut state = self.state.write().await;
            state.snapshot.active = None;
            state.snapshot.is_transferring = false;
        }
        self.on_queue_changed().await;
    }

    /// Record the failure for display. No retry; the engine drops the item.
    pub async fn on_error(&self, payload: &TransferFailure) {
        tracing::error!("Transfer error: {} - {}", payload.file_name, payload.error);
        {
            let mut state = self.state.write().await;
            state.snapshot.last_error = Some(TransferErrorRecord {
                item_id: Some(payload.item_id),
                file_name: Some(payload.file_name.clone()),
                message: payload.error.clone(),
                occurred_at: Utc::now(),
            });
            state.snapshot.active = None;
            state.snapshot.is_transferring = false;
        }
        self.on_queue_changed().await;
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        self.state.read().await.snapshot.clone()
    }

    pub async fn queue(&self) -> Vec<TransferQueueEntry> {
        self.state.read().await.snapshot.queue.clone()
    }

    pub async fn queue_len(&self) -> usize {
        self.state.read().await.snapshot.queue.len()
    }

    /// Destination as last configured or pulled
    pub async fn peer_address(&self) -> Option<String> {
        self.state.read().await.snapshot.peer_address.clone()
    }

    pub async fn has_peer(&self) -> bool {
        self.state.read().await.snapshot.has_peer()
    }

    pub async fn active_transfer(&self) -> Option<ActiveTransfer> {
        self.state.read().await.snapshot.active.clone()
    }

    pub async fn is_transferring(&self) -> bool {
        self.state.read().await.snapshot.is_transferring
    }

    pub async fn last_error(&self) -> Option<TransferErrorRecord> {
        self.state.read().await.snapshot.last_error.clone()
    }

    pub async fn clear_error(&self) {
        self.state.write().await.snapshot.last_error = None;
    }

    /// Forget the active transfer and any error
    pub async fn cleanup(&self) {
        let mut state = self.state.write().await;
        state.snapshot.active = None;
        state.snapshot.is_transferring = false;
        state.snapshot.last_error = None;
    }

    async fn record_command_error(&self, error: &AppError) {
        self.state.write().await.snapshot.last_error =
            Some(TransferErrorRecord::command(error.to_string()));
    }
}

fn is_transferring(active: Option<&ActiveTransfer>) -> bool {
    active.is_some_and(|t| t.status == TransferStatus::Transferring)
}
