// SPDX-License-Identifier: AGPL-3.0
// Shard Transfer Core - Coordinator
//
// Owns the download mirror, the transfer queue mirror and the peer selector,
// and runs the single dispatch loop that applies engine events to them in
// arrival order.

use crate::detection::ProtocolSelector;
use crate::engine::EngineHandle;
use crate::events::{EngineEvent, EventSource};
use crate::queue::TransferQueueManager;
use crate::reconcile::{LifecycleReconciler, ReconcileReport};
use crate::settings::CoordinatorSettings;
use crate::types::{AppError, TransferQueueEntry};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// What `initialize` found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupReport {
    pub reconcile: ReconcileReport,
    pub queue_len: usize,
    pub peer_address: Option<String>,
    pub monitor_running: bool,
}

/// Context object for the transfer lifecycle state
pub struct Coordinator {
    engine: EngineHandle,
    settings: CoordinatorSettings,
    downloads: LifecycleReconciler,
    transfers: Arc<TransferQueueManager>,
    protocol: ProtocolSelector,
}

impl Coordinator {
    pub fn new(engine: EngineHandle, settings: CoordinatorSettings) -> Arc<Self> {
        let transfers = Arc::new(TransferQueueManager::new(engine.clone()));

        Arc::new(Self {
            downloads: LifecycleReconciler::new(engine.clone()),
            protocol: ProtocolSelector::new(engine.clone(), transfers.clone()),
            transfers,
            engine,
            settings,
        })
    }

    /// Bring the mirrors in line with the engine. The UI should not treat
    /// its state as accurate before this returns.
    pub async fn initialize(&self) -> Result<StartupReport, AppError> {
        let reconcile = self
            .downloads
            .reconcile_on_startup(self.settings.reconcile_timeout())
            .await?;

        let queue = self.transfers.refresh_queue().await?;
        let peer_address = self.transfers.refresh_peer_address().await?;
        self.transfers.refresh_current_transfer().await?;

        let monitor_running = if self.settings.auto_start_monitor {
            self.start_monitor().await?;
            true
        } else {
            self.protocol.check_monitor_status().await?
        };

        tracing::info!(
            "Coordinator ready: {} queued, peer {:?}, monitor {}",
            queue.len(),
            peer_address,
            if monitor_running { "running" } else { "stopped" }
        );

        Ok(StartupReport {
            reconcile,
            queue_len: queue.len(),
            peer_address,
            monitor_running,
        })
    }

    /// Start the dispatch loop for `source`.
    ///
    /// The source is moved into the loop, so it can feed only one
    /// subscription; `Subscription::detach` hands it back.
    pub fn attach(self: &Arc<Self>, source: EventSource) -> Subscription {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let coordinator = Arc::clone(self);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    event = source.recv() => match event {
                        Some(event) => coordinator.handle_event(event).await,
                        None => {
                            tracing::info!("Engine event channel closed");
                            break;
                        }
                    },
                }
            }
            source
        });

        tracing::debug!("Engine event subscription attached");
        Subscription { stop_tx, task }
    }

    /// Apply one engine event. Never fails; problems are logged.
    pub async fn handle_event(&self, event: EngineEvent) {
        tracing::debug!("Engine event: {}", event.kind());

        match event {
            EngineEvent::DownloadRestored(_)
            | EngineEvent::DownloadProgress(_)
            | EngineEvent::DownloadComplete { .. }
            | EngineEvent::DownloadError { .. } => self.downloads.apply(&event).await,
            EngineEvent::QueueChanged => self.transfers.on_queue_changed().await,
            EngineEvent::TransferProgress(progress) => self.transfers.on_progress(progress).await,
            EngineEvent::TransferComplete(payload) => self.transfers.on_complete(&payload).await,
            EngineEvent::TransferError(payload) => self.transfers.on_error(&payload).await,
            EngineEvent::PresenceChanged(update) => {
                self.protocol.on_presence_changed(&update).await
            }
        }
    }

    /// Decode and apply a named JSON event; undecodable events are dropped
    pub async fn handle_named(&self, name: &str, payload: serde_json::Value) {
        match EngineEvent::from_named(name, payload) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => tracing::warn!("Dropping engine event: {}", e),
        }
    }

    /// Scan the configured library root for transferable files
    pub async fn scan_library(&self) -> Result<Vec<TransferQueueEntry>, AppError> {
        self.transfers.scan(self.settings.scan_root.clone()).await
    }

    /// Start the peer monitor with the configured interval
    pub async fn start_monitor(&self) -> Result<(), AppError> {
        self.protocol
            .start_monitor(self.settings.monitor_interval_secs)
            .await
    }

    pub async fn app_version(&self) -> Result<String, AppError> {
        self.engine.get_version().await
    }

    /// Stop dispatching and drop transient transfer state. Returns the
    /// event source so a new session can attach it again.
    pub async fn teardown(&self, subscription: Subscription) -> Option<EventSource> {
        let source = subscription.detach().await;
        self.transfers.cleanup().await;
        source
    }

    pub fn downloads(&self) -> &LifecycleReconciler {
        &self.downloads
    }

    pub fn transfers(&self) -> &TransferQueueManager {
        &self.transfers
    }

    pub fn protocol(&self) -> &ProtocolSelector {
        &self.protocol
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }
}

/// Handle for a running dispatch loop.
///
/// Dropping it stops the loop once the event in progress, if any, has been
/// applied.
pub struct Subscription {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<EventSource>,
}

impl Subscription {
    /// Stop the loop and take the event source back
    pub async fn detach(self) -> Option<EventSource> {
        let _ = self.stop_tx.send(());

        match self.task.await {
            Ok(source) => {
                tracing::debug!("Engine event subscription detached");
                Some(source)
            }
            Err(e) => {
                tracing::error!("Event dispatch task failed: {}", e);
                None
            }
        }
    }

    /// False once the loop has ended, e.g. because the engine closed the channel
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}
