// SPDX-License-Identifier: AGPL-3.0
// In-process stand-in for the engine, serviced over the command channel.

#![allow(dead_code)]

use async_channel::Sender;
use shard_transfer_core::{
    EngineCommand, EngineHandle, EngineReply, JobSnapshot, TransferProgress, TransferQueueEntry,
    TransferStatus, COMMAND_CHANNEL_CAPACITY,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

type QueueReply = Sender<EngineReply<Vec<TransferQueueEntry>>>;

pub struct FakeState {
    pub active_jobs: Result<Vec<JobSnapshot>, String>,
    /// Answer GetActiveJobs only after this long
    pub active_jobs_delay: Option<Duration>,
    pub peer_address: Option<String>,
    /// Addresses SetPeerAddress refuses
    pub unreachable: Vec<String>,
    pub queue: Vec<TransferQueueEntry>,
    /// Insert new entries at the head instead of the tail
    pub insert_front: bool,
    pub scan_results: Result<Vec<TransferQueueEntry>, String>,
    pub current_transfer: Option<TransferProgress>,
    pub transferring: bool,
    pub monitor_running: bool,
    pub monitor_interval: Option<u64>,
    pub version: String,
    /// Withhold GetQueue replies until released one by one
    pub hold_queue_pulls: bool,
    /// Refuse GetQueue with this message
    pub queue_pull_error: Option<String>,
    held: Vec<(QueueReply, Vec<TransferQueueEntry>)>,
    pub calls: Vec<String>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            active_jobs: Ok(Vec::new()),
            active_jobs_delay: None,
            peer_address: None,
            unreachable: Vec::new(),
            queue: Vec::new(),
            insert_front: false,
            scan_results: Ok(Vec::new()),
            current_transfer: None,
            transferring: false,
            monitor_running: false,
            monitor_interval: None,
            version: "0.9.1".to_string(),
            hold_queue_pulls: false,
            queue_pull_error: None,
            held: Vec::new(),
            calls: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct FakeEngine {
    state: Arc<Mutex<FakeState>>,
}

impl FakeEngine {
    /// Start servicing a fresh command channel
    pub fn spawn() -> (EngineHandle, FakeEngine) {
        let (handle, rx) = EngineHandle::channel(COMMAND_CHANNEL_CAPACITY);
        let fake = FakeEngine {
            state: Arc::new(Mutex::new(FakeState::default())),
        };

        let state = fake.state.clone();
        tokio::spawn(async move {
            while let Ok(command) = rx.recv().await {
                service(&state, command).await;
            }
        });

        (handle, fake)
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Number of recorded calls with the given command name
    pub fn count(&self, command: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.split(' ').next() == Some(command))
            .count()
    }

    pub fn held_count(&self) -> usize {
        self.state().held.len()
    }

    /// Answer the most recently withheld queue pull
    pub async fn release_newest_held(&self) {
        let held = self.state().held.pop();
        if let Some((reply, queue)) = held {
            let _ = reply.send(Ok(queue)).await;
        }
    }
}

async fn service(state: &Arc<Mutex<FakeState>>, command: EngineCommand) {
    match command {
        EngineCommand::GetActiveJobs { reply } => {
            let (delay, jobs) = {
                let mut s = state.lock().unwrap();
                s.calls.push("get_active_jobs".to_string());
                (s.active_jobs_delay, s.active_jobs.clone())
            };
            tokio::spawn(async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                let _ = reply.send(jobs).await;
            });
        }
        EngineCommand::SetPeerAddress { address, reply } => {
            let result = {
                let mut s = state.lock().unwrap();
                s.calls.push(format!("set_peer_address {}", address));
                if s.unreachable.contains(&address) {
                    Err(format!("Cannot connect to {}", address))
                } else {
                    s.peer_address = Some(address);
                    Ok(())
                }
            };
            let _ = reply.send(result).await;
        }
        EngineCommand::GetPeerAddress { reply } => {
            let address = {
                let mut s = state.lock().unwrap();
                s.calls.push("get_peer_address".to_string());
                s.peer_address.clone()
            };
            let _ = reply.send(Ok(address)).await;
        }
        EngineCommand::ScanSource { path, reply } => {
            let result = {
                let mut s = state.lock().unwrap();
                s.calls.push(format!("scan_source {}", path.display()));
                s.scan_results.clone()
            };
            let _ = reply.send(result).await;
        }
        EngineCommand::Enqueue { entry, reply } => {
            {
                let mut s = state.lock().unwrap();
                s.calls.push(format!("enqueue {}", entry.file_path));
                if !s.queue.iter().any(|e| e.file_path == entry.file_path) {
                    if s.insert_front {
                        s.queue.insert(0, entry);
                    } else {
                        s.queue.push(entry);
                    }
                }
            }
            let _ = reply.send(Ok(())).await;
        }
        EngineCommand::GetQueue { reply } => {
            let answer = {
                let mut s = state.lock().unwrap();
                s.calls.push("get_queue".to_string());
                let queue = s.queue.clone();
                if let Some(message) = s.queue_pull_error.clone() {
                    Some((reply, Err(message)))
                } else if s.hold_queue_pulls {
                    s.held.push((reply, queue));
                    None
                } else {
                    Some((reply, Ok(queue)))
                }
            };
            if let Some((reply, result)) = answer {
                let _ = reply.send(result).await;
            }
        }
        EngineCommand::ClearQueue { reply } => {
            {
                let mut s = state.lock().unwrap();
                s.calls.push("clear_queue".to_string());
                s.queue.clear();
            }
            let _ = reply.send(Ok(())).await;
        }
        EngineCommand::RemoveFromQueue { file_path, reply } => {
            let result = {
                let mut s = state.lock().unwrap();
                s.calls.push(format!("remove_from_queue {}", file_path));
                let before = s.queue.len();
                s.queue.retain(|e| e.file_path != file_path);
                if s.queue.len() < before {
                    Ok(())
                } else {
                    Err(format!("{} is not queued", file_path))
                }
            };
            let _ = reply.send(result).await;
        }
        EngineCommand::GetCurrentTransfer { reply } => {
            let current = {
                let mut s = state.lock().unwrap();
                s.calls.push("get_current_transfer".to_string());
                s.current_transfer.clone()
            };
            let _ = reply.send(Ok(current)).await;
        }
        EngineCommand::IsTransferring { reply } => {
            let transferring = {
                let mut s = state.lock().unwrap();
                s.calls.push("is_transferring".to_string());
                s.transferring
            };
            let _ = reply.send(Ok(transferring)).await;
        }
        EngineCommand::StartMonitor {
            interval_secs,
            reply,
        } => {
            {
                let mut s = state.lock().unwrap();
                s.calls.push(format!("start_monitor {}", interval_secs));
                s.monitor_running = true;
                s.monitor_interval = Some(interval_secs);
            }
            let _ = reply.send(Ok(())).await;
        }
        EngineCommand::StopMonitor { reply } => {
            let result = {
                let mut s = state.lock().unwrap();
                s.calls.push("stop_monitor".to_string());
                if s.monitor_running {
                    s.monitor_running = false;
                    Ok(())
                } else {
                    Err("Monitor is not running".to_string())
                }
            };
            let _ = reply.send(result).await;
        }
        EngineCommand::IsMonitorRunning { reply } => {
            let running = {
                let mut s = state.lock().unwrap();
                s.calls.push("is_monitor_running".to_string());
                s.monitor_running
            };
            let _ = reply.send(Ok(running)).await;
        }
        EngineCommand::GetVersion { reply } => {
            let version = {
                let mut s = state.lock().unwrap();
                s.calls.push("get_version".to_string());
                s.version.clone()
            };
            let _ = reply.send(Ok(version)).await;
        }
    }
}

pub fn entry(item_id: u32, name: &str) -> TransferQueueEntry {
    TransferQueueEntry {
        item_id,
        title: format!("Item {}", item_id),
        file_path: format!("/library/{}/{}", item_id, name),
        file_name: name.to_string(),
        file_size: 4096,
    }
}

pub fn job(item_id: u32, progress: f64, downloaded: u64, total: u64) -> JobSnapshot {
    JobSnapshot {
        item_id,
        state_label: "Live".to_string(),
        progress,
        downloaded_bytes: downloaded,
        total_bytes: total,
    }
}

pub fn transfer(item_id: u32, status: TransferStatus) -> TransferProgress {
    TransferProgress {
        item_id,
        file_name: format!("{}.nsp", item_id),
        bytes_transferred: 512,
        total_bytes: 4096,
        progress_percent: 12.5,
        transfer_speed: 2_000_000.0,
        eta_seconds: 2,
        status,
    }
}

/// Poll a synchronous `check` until it holds or a second has passed
pub async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Poll `check` until it holds or a second has passed
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
