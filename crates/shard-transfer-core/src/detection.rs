// SPDX-License-Identifier: AGPL-3.0
// Shard Transfer Core - Peer detection and address selection
//
// The engine scans the local network in the background and reports which
// devices answer. The first reported address is promoted to the transfer
// destination automatically. A manual pick only lasts until the next
// presence report, which recomputes the selection from scratch.

use crate::engine::EngineHandle;
use crate::events::PresenceUpdate;
use crate::queue::TransferQueueManager;
use crate::types::{AppError, ProtocolDetectionState};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Scan interval used when none is configured
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 10;

/// Tracks candidate peer addresses and keeps one selected
pub struct ProtocolSelector {
    engine: EngineHandle,
    transfers: Arc<TransferQueueManager>,
    state: RwLock<ProtocolDetectionState>,
}

impl ProtocolSelector {
    pub fn new(engine: EngineHandle, transfers: Arc<TransferQueueManager>) -> Self {
        Self {
            engine,
            transfers,
            state: RwLock::new(ProtocolDetectionState::default()),
        }
    }

    /// Recompute candidates and selection from a presence report
    pub async fn on_presence_changed(&self, update: &PresenceUpdate) {
        let primary = {
            let mut state = self.state.write().await;
            state.candidate_addresses = update.addresses.clone();

            if !update.is_active || update.addresses.is_empty() {
                state.is_active = false;
                state.selected_address = None;
                tracing::info!("No active peers");
                return;
            }

            state.is_active = true;
            retain_membership(&mut state);
            update.addresses[0].clone()
        };

        let configured = match self.transfers.refresh_peer_address().await {
            Ok(address) => address,
            Err(e) => {
                tracing::warn!("Failed to read configured peer address: {}", e);
                self.transfers.peer_address().await
            }
        };

        if configured.as_deref() == Some(primary.as_str()) {
            self.pin(&primary).await;
            tracing::info!("Peer connection maintained: {}", primary);
            return;
        }

        match self.transfers.set_peer_address(&primary).await {
            Ok(()) => {
                self.pin(&primary).await;
                tracing::info!("Peer address automatically set to {}", primary);
            }
            Err(e) => {
                // Presence was still detected; keep the peer marked active
                tracing::error!("Failed to configure detected peer {}: {}", primary, e);
            }
        }
    }

    /// Manually select one of the current candidates
    pub async fn select_address(&self, address: &str) -> Result<(), AppError> {
        if !self.is_selectable(address).await {
            return Err(AppError::InvalidAddress(format!(
                "{} is not an active detected peer",
                address
            )));
        }

        self.transfers.set_peer_address(address).await?;

        if !self.pin(address).await {
            return Err(AppError::InvalidAddress(format!(
                "{} is no longer a detected peer",
                address
            )));
        }
        tracing::info!("Manually selected peer address {}", address);
        Ok(())
    }

    /// Start the engine's background scan loop. A no-op when it already runs.
    pub async fn start_monitor(&self, interval_secs: u64) -> Result<(), AppError> {
        if self.check_monitor_status().await? {
            tracing::debug!("Peer monitor already running");
            return Ok(());
        }

        self.engine.start_monitor(interval_secs).await?;
        self.state.write().await.is_monitoring = true;
        tracing::info!("Peer monitor started with {} second interval", interval_secs);
        Ok(())
    }

    /// Stop the scan loop. A no-op when it is not running.
    pub async fn stop_monitor(&self) -> Result<(), AppError> {
        if !self.check_monitor_status().await? {
            tracing::debug!("Peer monitor already stopped");
            return Ok(());
        }

        self.engine.stop_monitor().await?;
        self.state.write().await.is_monitoring = false;
        tracing::info!("Peer monitor stopped");
        Ok(())
    }

    pub async fn check_monitor_status(&self) -> Result<bool, AppError> {
        let running = self.engine.is_monitor_running().await?;
        self.state.write().await.is_monitoring = running;
        Ok(running)
    }

    pub async fn state(&self) -> ProtocolDetectionState {
        self.state.read().await.clone()
    }

    /// Selected address, falling back to the first candidate
    pub async fn primary_address(&self) -> Option<String> {
        let state = self.state.read().await;
        state
            .selected_address
            .clone()
            .or_else(|| state.candidate_addresses.first().cloned())
    }

    pub async fn has_active_peer(&self) -> bool {
        let state = self.state.read().await;
        state.is_active && !state.candidate_addresses.is_empty()
    }

    async fn is_selectable(&self, address: &str) -> bool {
        let state = self.state.read().await;
        state.is_active && state.candidate_addresses.iter().any(|a| a == address)
    }

    /// Select `address` if it is still an active candidate
    async fn pin(&self, address: &str) -> bool {
        let mut state = self.state.write().await;
        if state.is_active && state.candidate_addresses.iter().any(|a| a == address) {
            state.selected_address = Some(address.to_string());
            true
        } else {
            false
        }
    }
}

fn retain_membership(state: &mut ProtocolDetectionState) {
    let still_candidate = state
        .selected_address
        .as_ref()
        .is_some_and(|selected| state.candidate_addresses.contains(selected));

    if !still_candidate {
        state.selected_address = None;
    }
}
