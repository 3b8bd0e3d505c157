// SPDX-License-Identifier: AGPL-3.0
// Shard Transfer Core - Engine command channel
//
// The engine is an external process. Commands are request/response
// messages carrying their own reply channel; the engine integration
// services them and answers with `Ok` or a rejection message.

use crate::events::JobSnapshot;
use crate::types::{AppError, TransferProgress, TransferQueueEntry};
use async_channel::{Receiver, Sender};
use std::path::PathBuf;

/// Capacity of the command channel to the engine
pub const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Engine answer to a command; `Err` carries the rejection message
pub type EngineReply<T> = Result<T, String>;

/// Commands that can be sent to the engine
#[derive(Debug)]
pub enum EngineCommand {
    GetActiveJobs {
        reply: Sender<EngineReply<Vec<JobSnapshot>>>,
    },
    SetPeerAddress {
        address: String,
        reply: Sender<EngineReply<()>>,
    },
    GetPeerAddress {
        reply: Sender<EngineReply<Option<String>>>,
    },
    ScanSource {
        path: PathBuf,
        reply: Sender<EngineReply<Vec<TransferQueueEntry>>>,
    },
    Enqueue {
        entry: TransferQueueEntry,
        reply: Sender<EngineReply<()>>,
    },
    GetQueue {
        reply: Sender<EngineReply<Vec<TransferQueueEntry>>>,
    },
    ClearQueue {
        reply: Sender<EngineReply<()>>,
    },
    RemoveFromQueue {
        file_path: String,
        reply: Sender<EngineReply<()>>,
    },
    GetCurrentTransfer {
        reply: Sender<EngineReply<Option<TransferProgress>>>,
    },
    IsTransferring {
        reply: Sender<EngineReply<bool>>,
    },
    StartMonitor {
        interval_secs: u64,
        reply: Sender<EngineReply<()>>,
    },
    StopMonitor {
        reply: Sender<EngineReply<()>>,
    },
    IsMonitorRunning {
        reply: Sender<EngineReply<bool>>,
    },
    GetVersion {
        reply: Sender<EngineReply<String>>,
    },
}

/// Answer to a command that has already been sent
#[derive(Debug)]
pub struct PendingReply<T> {
    reply_rx: Receiver<EngineReply<T>>,
}

impl<T> PendingReply<T> {
    pub async fn recv(self) -> Result<T, AppError> {
        let reply = self
            .reply_rx
            .recv()
            .await
            .map_err(|_| AppError::EngineUnavailable)?;
        reply.map_err(AppError::Engine)
    }
}

/// Cloneable, typed front for the engine command channel
#[derive(Debug, Clone)]
pub struct EngineHandle {
    command_tx: Sender<EngineCommand>,
}

impl EngineHandle {
    pub fn new(command_tx: Sender<EngineCommand>) -> Self {
        Self { command_tx }
    }

    /// Create a handle together with the receiving end the engine services
    pub fn channel(capacity: usize) -> (Self, Receiver<EngineCommand>) {
        let (command_tx, command_rx) = async_channel::bounded(capacity);
        (Self::new(command_tx), command_rx)
    }

    async fn dispatch<T>(
        &self,
        build: impl FnOnce(Sender<EngineReply<T>>) -> EngineCommand,
    ) -> Result<PendingReply<T>, AppError> {
        let (reply_tx, reply_rx) = async_channel::bounded(1);

        self.command_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| AppError::EngineUnavailable)?;

        Ok(PendingReply { reply_rx })
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(Sender<EngineReply<T>>) -> EngineCommand,
    ) -> Result<T, AppError> {
        self.dispatch(build).await?.recv().await
    }

    /// List engine-side jobs that are still in flight
    pub async fn get_active_jobs(&self) -> Result<Vec<JobSnapshot>, AppError> {
        self.call(|reply| EngineCommand::GetActiveJobs { reply }).await
    }

    /// Configure the transfer destination. The engine validates reachability
    /// synchronously, so a rejection here means the peer could not be reached.
    pub async fn set_peer_address(&self, address: &str) -> Result<(), AppError> {
        let address = address.to_string();
        self.call(|reply| EngineCommand::SetPeerAddress { address, reply })
            .await
            .map_err(|e| match e {
                AppError::Engine(message) => AppError::Connection(message),
                other => other,
            })
    }

    pub async fn get_peer_address(&self) -> Result<Option<String>, AppError> {
        self.call(|reply| EngineCommand::GetPeerAddress { reply }).await
    }

    pub async fn scan_source(&self, path: PathBuf) -> Result<Vec<TransferQueueEntry>, AppError> {
        self.call(|reply| EngineCommand::ScanSource { path, reply }).await
    }

    pub async fn enqueue(&self, entry: TransferQueueEntry) -> Result<(), AppError> {
        self.call(|reply| EngineCommand::Enqueue { entry, reply }).await
    }

    pub async fn get_queue(&self) -> Result<Vec<TransferQueueEntry>, AppError> {
        self.call(|reply| EngineCommand::GetQueue { reply }).await
    }

    /// Issue a queue pull without waiting for the answer. Once this returns,
    /// the request holds its place in the command channel.
    pub async fn request_queue(
        &self,
    ) -> Result<PendingReply<Vec<TransferQueueEntry>>, AppError> {
        self.dispatch(|reply| EngineCommand::GetQueue { reply }).await
    }

    pub async fn clear_queue(&self) -> Result<(), AppError> {
        self.call(|reply| EngineCommand::ClearQueue { reply }).await
    }

    /// The engine only refuses a removal when the path is not queued
    pub async fn remove_from_queue(&self, file_path: &str) -> Result<(), AppError> {
        let file_path = file_path.to_string();
        self.call(|reply| EngineCommand::RemoveFromQueue { file_path, reply })
            .await
            .map_err(|e| match e {
                AppError::Engine(message) => AppError::NotFound(message),
                other => other,
            })
    }

    pub async fn get_current_transfer(&self) -> Result<Option<TransferProgress>, AppError> {
        self.call(|reply| EngineCommand::GetCurrentTransfer { reply })
            .await
    }

    pub async fn is_transferring(&self) -> Result<bool, AppError> {
        self.call(|reply| EngineCommand::IsTransferring { reply }).await
    }

    pub async fn start_monitor(&self, interval_secs: u64) -> Result<(), AppError> {
        self.call(|reply| EngineCommand::StartMonitor {
            interval_secs,
            reply,
        })
        .await
    }

    pub async fn stop_monitor(&self) -> Result<(), AppError> {
        self.call(|reply| EngineCommand::StopMonitor { reply }).await
    }

    pub async fn is_monitor_running(&self) -> Result<bool, AppError> {
        self.call(|reply| EngineCommand::IsMonitorRunning { reply }).await
    }

    pub async fn get_version(&self) -> Result<String, AppError> {
        self.call(|reply| EngineCommand::GetVersion { reply }).await
    }
}
