// SPDX-License-Identifier: AGPL-3.0
// Shard Transfer Core - Progress mirror
//
// Passive per-item download state. Mutated only by event application or
// explicit lifecycle calls. A stopped job stays visible and is frozen
// until it is evicted or started again.

use crate::events::{DownloadMetrics, JobSnapshot};
use crate::types::{AppError, DownloadJob, DownloadProgress, DownloadStage, ItemId};
use std::collections::HashMap;

/// Outcome of applying an engine event to the mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Updated,
    /// No entry for the item; engine events may race with local removal
    Unknown,
    /// Entry exists but is stopped and therefore frozen
    Frozen,
}

/// Local cache of per-item download state
#[derive(Debug, Default)]
pub struct ProgressMirror {
    jobs: HashMap<ItemId, DownloadJob>,
}

impl ProgressMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin tracking a user-initiated download at stage 0
    pub fn start_job(&mut self, item_id: ItemId) -> Result<(), AppError> {
        if self.jobs.get(&item_id).is_some_and(|job| job.is_running) {
            return Err(AppError::Conflict(format!(
                "Item {} is already downloading",
                item_id
            )));
        }

        self.jobs.insert(item_id, DownloadJob::started(item_id));
        Ok(())
    }

    /// Overwrite progress fields only; the stage is left untouched
    pub fn apply_progress(&mut self, metrics: &DownloadMetrics) -> Applied {
        let Some(job) = self.jobs.get_mut(&metrics.item_id) else {
            return Applied::Unknown;
        };
        if !job.is_running {
            return Applied::Frozen;
        }

        job.progress = normalized_progress(metrics);
        Applied::Updated
    }

    /// Bulk transfer finished; extraction follows, so this is not terminal
    pub fn apply_completion(&mut self, item_id: ItemId) -> Applied {
        let Some(job) = self.jobs.get_mut(&item_id) else {
            return Applied::Unknown;
        };
        if !job.is_running {
            return Applied::Frozen;
        }

        job.stage = job.stage.max(DownloadStage::Extracting);
        Applied::Updated
    }

    /// Stop the job and keep it visible with the reported error
    pub fn apply_error(&mut self, item_id: ItemId, error: Option<String>) -> Applied {
        let Some(job) = self.jobs.get_mut(&item_id) else {
            return Applied::Unknown;
        };
        if !job.is_running {
            return Applied::Frozen;
        }

        job.is_running = false;
        job.error = error;
        Applied::Updated
    }

    /// Seed an entry for an engine job that survived a client restart.
    ///
    /// The entry is pinned to `Downloading` whatever the engine's finer
    /// phase. Returns `false` when an entry already exists; existing entries
    /// are never overwritten.
    pub fn seed(&mut self, snapshot: &JobSnapshot) -> bool {
        if self.jobs.contains_key(&snapshot.item_id) {
            return false;
        }

        let mut job = DownloadJob::started(snapshot.item_id);
        job.stage = DownloadStage::Downloading;
        job.progress = normalized_progress(&DownloadMetrics {
            item_id: snapshot.item_id,
            state_label: snapshot.state_label.clone(),
            progress: snapshot.progress,
            downloaded_bytes: snapshot.downloaded_bytes,
            total_bytes: snapshot.total_bytes,
            download_speed: 0.0,
            upload_speed: 0.0,
            peers: 0,
        });

        self.jobs.insert(snapshot.item_id, job);
        true
    }

    /// Move a running job forward. A lower stage is ignored and the
    /// current stage is returned.
    pub fn advance_stage(
        &mut self,
        item_id: ItemId,
        stage: DownloadStage,
    ) -> Result<DownloadStage, AppError> {
        let job = self.running_job_mut(item_id)?;
        job.stage = job.stage.max(stage);
        Ok(job.stage)
    }

    pub fn set_paused(&mut self, item_id: ItemId, paused: bool) -> Result<(), AppError> {
        let job = self.running_job_mut(item_id)?;
        job.is_paused = paused;
        Ok(())
    }

    /// Installation finished
    pub fn complete_job(&mut self, item_id: ItemId) -> Result<(), AppError> {
        let job = self.running_job_mut(item_id)?;
        job.stage = DownloadStage::Done;
        job.is_running = false;
        job.is_paused = false;
        Ok(())
    }

    /// Explicit removal, the only way an entry leaves the mirror
    pub fn evict(&mut self, item_id: ItemId) -> Option<DownloadJob> {
        self.jobs.remove(&item_id)
    }

    pub fn get(&self, item_id: ItemId) -> Option<&DownloadJob> {
        self.jobs.get(&item_id)
    }

    pub fn contains(&self, item_id: ItemId) -> bool {
        self.jobs.contains_key(&item_id)
    }

    pub fn is_downloading(&self, item_id: ItemId) -> bool {
        self.jobs.get(&item_id).is_some_and(|job| job.is_running)
    }

    /// Running jobs ordered by item id
    pub fn active_jobs(&self) -> Vec<DownloadJob> {
        let mut active: Vec<DownloadJob> = self
            .jobs
            .values()
            .filter(|job| job.is_running)
            .cloned()
            .collect();
        active.sort_by_key(|job| job.item_id);
        active
    }

    pub fn active_count(&self) -> usize {
        self.jobs.values().filter(|job| job.is_running).count()
    }

    /// All tracked jobs ordered by item id
    pub fn jobs(&self) -> Vec<DownloadJob> {
        let mut jobs: Vec<DownloadJob> = self.jobs.values().cloned().collect();
        jobs.sort_by_key(|job| job.item_id);
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn running_job_mut(&mut self, item_id: ItemId) -> Result<&mut DownloadJob, AppError> {
        let job = self
            .jobs
            .get_mut(&item_id)
            .ok_or_else(|| AppError::NotFound(format!("No download for item {}", item_id)))?;

        if !job.is_running {
            return Err(AppError::Conflict(format!(
                "Download for item {} is stopped",
                item_id
            )));
        }

        Ok(job)
    }
}

fn normalized_progress(metrics: &DownloadMetrics) -> DownloadProgress {
    let fraction = if metrics.progress.is_finite() {
        metrics.progress.clamp(0.0, 1.0)
    } else {
        0.0
    };

    // downloaded <= total once the total is known
    let downloaded_bytes = if metrics.total_bytes > 0 {
        metrics.downloaded_bytes.min(metrics.total_bytes)
    } else {
        metrics.downloaded_bytes
    };

    DownloadProgress {
        fraction,
        downloaded_bytes,
        total_bytes: metrics.total_bytes,
        download_rate: metrics.download_speed.max(0.0),
        upload_rate: metrics.upload_speed.max(0.0),
        peers: metrics.peers,
        state_label: metrics.state_label.clone(),
    }
}
