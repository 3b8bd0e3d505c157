// SPDX-License-Identifier: AGPL-3.0
// Shard Transfer Core - Lifecycle reconciler
//
// Seeds the progress mirror from the engine after a restart and applies
// download events to it afterwards.

use crate::engine::EngineHandle;
use crate::events::{DownloadMetrics, EngineEvent, JobSnapshot};
use crate::mirror::{Applied, ProgressMirror};
use crate::types::{AppError, DownloadJob, DownloadStage, ItemId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Result of a startup reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Jobs the engine reported as in flight
    pub reported: usize,
    /// Items that were missing locally and have been seeded
    pub seeded: Vec<ItemId>,
    /// The engine did not answer in time; no active jobs are known
    pub timed_out: bool,
}

/// Owns the download mirror and keeps it in line with the engine
pub struct LifecycleReconciler {
    engine: EngineHandle,
    mirror: Arc<RwLock<ProgressMirror>>,
}

impl LifecycleReconciler {
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            engine,
            mirror: Arc::new(RwLock::new(ProgressMirror::new())),
        }
    }

    /// Shared handle to the mirror for readers
    pub fn mirror(&self) -> Arc<RwLock<ProgressMirror>> {
        self.mirror.clone()
    }

    /// Track a user-initiated download
    pub async fn start_job(&self, item_id: ItemId) -> Result<(), AppError> {
        self.mirror.write().await.start_job(item_id)?;
        tracing::info!("Tracking download for item {}", item_id);
        Ok(())
    }

    /// Query the engine for in-flight jobs and seed every one that has no
    /// local entry. A timeout means "no active jobs known" and is not an
    /// error; an engine rejection is.
    pub async fn reconcile_on_startup(&self, timeout: Duration) -> Result<ReconcileReport, AppError> {
        let jobs = match tokio::time::timeout(timeout, self.engine.get_active_jobs()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    "Engine did not list active jobs within {:?}, assuming none",
                    timeout
                );
                return Ok(ReconcileReport {
                    timed_out: true,
                    ..Default::default()
                });
            }
        };

        let mut report = ReconcileReport {
            reported: jobs.len(),
            ..Default::default()
        };

        {
            let mut mirror = self.mirror.write().await;
            for job in &jobs {
                if mirror.seed(job) {
                    report.seeded.push(job.item_id);
                }
            }
        }

        tracing::info!(
            "Reconciled {} engine job(s), seeded {}",
            report.reported,
            report.seeded.len()
        );
        Ok(report)
    }

    /// Apply a download event. Events that are not download events are
    /// ignored; failures are logged and never returned.
    pub async fn apply(&self, event: &EngineEvent) {
        match event {
            EngineEvent::DownloadRestored(snapshot) => self.on_restored(snapshot).await,
            EngineEvent::DownloadProgress(metrics) => self.on_progress(metrics).await,
            EngineEvent::DownloadComplete { item_id } => self.on_complete(*item_id).await,
            EngineEvent::DownloadError { item_id, error } => {
                self.on_error(*item_id, error.clone()).await
            }
            _ => {}
        }
    }

    async fn on_restored(&self, snapshot: &JobSnapshot) {
        if self.mirror.write().await.seed(snapshot) {
            tracing::info!("Restored download for item {}", snapshot.item_id);
        } else {
            tracing::debug!("Item {} already tracked, restore ignored", snapshot.item_id);
        }
    }

    async fn on_progress(&self, metrics: &DownloadMetrics) {
        let applied = self.mirror.write().await.apply_progress(metrics);
        log_unapplied("progress", metrics.item_id, applied);
    }

    async fn on_complete(&self, item_id: ItemId) {
        let applied = self.mirror.write().await.apply_completion(item_id);
        if applied == Applied::Updated {
            tracing::info!("Download for item {} finished, extracting", item_id);
        }
        log_unapplied("complete", item_id, applied);
    }

    async fn on_error(&self, item_id: ItemId, error: Option<String>) {
        let message = error.clone().unwrap_or_else(|| "unknown error".to_string());
        let applied = self.mirror.write().await.apply_error(item_id, error);
        if applied == Applied::Updated {
            tracing::error!("Download for item {} failed: {}", item_id, message);
        }
        log_unapplied("error", item_id, applied);
    }

    pub async fn advance_stage(
        &self,
        item_id: ItemId,
        stage: DownloadStage,
    ) -> Result<DownloadStage, AppError> {
        self.mirror.write().await.advance_stage(item_id, stage)
    }

    pub async fn set_paused(&self, item_id: ItemId, paused: bool) -> Result<(), AppError> {
        self.mirror.write().await.set_paused(item_id, paused)
    }

    pub async fn complete_job(&self, item_id: ItemId) -> Result<(), AppError> {
        self.mirror.write().await.complete_job(item_id)?;
        tracing::info!("Item {} installed", item_id);
        Ok(())
    }

    pub async fn evict(&self, item_id: ItemId) -> Option<DownloadJob> {
        self.mirror.write().await.evict(item_id)
    }

    pub async fn job(&self, item_id: ItemId) -> Option<DownloadJob> {
        self.mirror.read().await.get(item_id).cloned()
    }

    pub async fn is_downloading(&self, item_id: ItemId) -> bool {
        self.mirror.read().await.is_downloading(item_id)
    }

    pub async fn active_jobs(&self) -> Vec<DownloadJob> {
        self.mirror.read().await.active_jobs()
    }

    pub async fn active_count(&self) -> usize {
        self.mirror.read().await.active_count()
    }

    pub async fn jobs(&self) -> Vec<DownloadJob> {
        self.mirror.read().await.jobs()
    }
}

fn log_unapplied(kind: &str, item_id: ItemId, applied: Applied) {
    match applied {
        Applied::Updated => {}
        Applied::Unknown => {
            tracing::debug!("Ignoring {} event for untracked item {}", kind, item_id)
        }
        Applied::Frozen => {
            tracing::debug!("Ignoring {} event for stopped item {}", kind, item_id)
        }
    }
}
