// SPDX-License-Identifier: AGPL-3.0

mod common;

use common::FakeEngine;
use shard_transfer_core::{
    AppError, PresenceUpdate, ProtocolSelector, TransferQueueManager,
};
use std::sync::Arc;

fn presence(is_active: bool, addresses: &[&str]) -> PresenceUpdate {
    PresenceUpdate {
        is_active,
        addresses: addresses.iter().map(|a| a.to_string()).collect(),
    }
}

fn selector() -> (ProtocolSelector, Arc<TransferQueueManager>, FakeEngine) {
    let (engine, fake) = FakeEngine::spawn();
    let transfers = Arc::new(TransferQueueManager::new(engine.clone()));
    (ProtocolSelector::new(engine, transfers.clone()), transfers, fake)
}

#[tokio::test]
async fn test_first_candidate_is_selected_then_cleared() {
    let (selector, transfers, fake) = selector();

    selector
        .on_presence_changed(&presence(true, &["10.0.0.5", "10.0.0.9"]))
        .await;

    let state = selector.state().await;
    assert!(state.is_active);
    assert_eq!(state.candidate_addresses, vec!["10.0.0.5", "10.0.0.9"]);
    assert_eq!(state.selected_address.as_deref(), Some("10.0.0.5"));
    assert_eq!(fake.state().peer_address.as_deref(), Some("10.0.0.5"));
    assert_eq!(transfers.peer_address().await.as_deref(), Some("10.0.0.5"));
    assert!(selector.has_active_peer().await);

    selector.on_presence_changed(&presence(false, &[])).await;

    let state = selector.state().await;
    assert!(!state.is_active);
    assert!(state.candidate_addresses.is_empty());
    assert!(state.selected_address.is_none());
    assert!(!selector.has_active_peer().await);
    assert!(selector.primary_address().await.is_none());
}

#[tokio::test]
async fn test_configured_peer_is_not_set_again() {
    let (selector, _transfers, fake) = selector();
    fake.state().peer_address = Some("10.0.0.5".to_string());

    selector
        .on_presence_changed(&presence(true, &["10.0.0.5"]))
        .await;

    assert_eq!(
        selector.state().await.selected_address.as_deref(),
        Some("10.0.0.5")
    );
    assert_eq!(fake.count("set_peer_address"), 0);
}

#[tokio::test]
async fn test_unreachable_candidate_stays_active_unselected() {
    let (selector, transfers, fake) = selector();
    fake.state().unreachable = vec!["10.0.0.5".to_string()];

    selector
        .on_presence_changed(&presence(true, &["10.0.0.5", "10.0.0.9"]))
        .await;

    let state = selector.state().await;
    assert!(state.is_active);
    assert!(state.selected_address.is_none());
    assert_eq!(selector.primary_address().await.as_deref(), Some("10.0.0.5"));
    assert!(transfers.last_error().await.is_some());
}

#[tokio::test]
async fn test_manual_selection_lasts_until_next_report() {
    let (selector, _transfers, fake) = selector();
    selector
        .on_presence_changed(&presence(true, &["10.0.0.5", "10.0.0.9"]))
        .await;

    assert!(matches!(
        selector.select_address("10.0.0.77").await,
        Err(AppError::InvalidAddress(_))
    ));
    assert_eq!(
        selector.state().await.selected_address.as_deref(),
        Some("10.0.0.5")
    );

    selector.select_address("10.0.0.9").await.unwrap();
    assert_eq!(
        selector.state().await.selected_address.as_deref(),
        Some("10.0.0.9")
    );
    assert_eq!(fake.state().peer_address.as_deref(), Some("10.0.0.9"));

    // The next report recomputes from scratch and favours the first candidate
    selector
        .on_presence_changed(&presence(true, &["10.0.0.5", "10.0.0.9"]))
        .await;
    assert_eq!(
        selector.state().await.selected_address.as_deref(),
        Some("10.0.0.5")
    );
    assert_eq!(fake.state().peer_address.as_deref(), Some("10.0.0.5"));
}

#[tokio::test]
async fn test_manual_selection_rejected_while_inactive() {
    let (selector, _transfers, fake) = selector();

    assert!(matches!(
        selector.select_address("10.0.0.5").await,
        Err(AppError::InvalidAddress(_))
    ));
    assert_eq!(fake.count("set_peer_address"), 0);
}

#[tokio::test]
async fn test_selection_follows_changed_candidates() {
    let (selector, _transfers, _fake) = selector();
    selector
        .on_presence_changed(&presence(true, &["10.0.0.5"]))
        .await;

    selector
        .on_presence_changed(&presence(true, &["10.0.0.12", "10.0.0.13"]))
        .await;

    let state = selector.state().await;
    assert_eq!(state.selected_address.as_deref(), Some("10.0.0.12"));
    assert!(state
        .candidate_addresses
        .contains(state.selected_address.as_ref().unwrap()));
}

#[tokio::test]
async fn test_monitor_lifecycle() {
    let (selector, _transfers, fake) = selector();

    selector.start_monitor(10).await.unwrap();
    assert!(selector.state().await.is_monitoring);
    assert_eq!(fake.state().monitor_interval, Some(10));

    selector.stop_monitor().await.unwrap();
    assert!(!selector.state().await.is_monitoring);
    assert!(!fake.state().monitor_running);

    // Started by someone else
    fake.state().monitor_running = true;
    assert!(selector.check_monitor_status().await.unwrap());
    assert!(selector.state().await.is_monitoring);
}

#[tokio::test]
async fn test_inactive_candidate_is_rejected_without_side_effects() {
    let (selector, transfers, fake) = selector();
    fake.state().peer_address = Some("10.0.0.9".to_string());
    transfers.refresh_peer_address().await.unwrap();

    // Inactive reports still replace the candidate list
    selector
        .on_presence_changed(&presence(false, &["10.0.0.5"]))
        .await;
    assert_eq!(selector.state().await.candidate_addresses, vec!["10.0.0.5"]);

    assert!(matches!(
        selector.select_address("10.0.0.5").await,
        Err(AppError::InvalidAddress(_))
    ));
    assert_eq!(fake.count("set_peer_address"), 0);
    assert_eq!(fake.state().peer_address.as_deref(), Some("10.0.0.9"));
    assert_eq!(transfers.peer_address().await.as_deref(), Some("10.0.0.9"));
    assert!(selector.state().await.selected_address.is_none());
}

#[tokio::test]
async fn test_monitor_commands_are_idempotent() {
    let (selector, _transfers, fake) = selector();

    // The engine refuses to stop a monitor that never started
    selector.stop_monitor().await.unwrap();
    assert_eq!(fake.count("stop_monitor"), 0);

    selector.start_monitor(10).await.unwrap();
    selector.start_monitor(10).await.unwrap();
    assert_eq!(fake.count("start_monitor"), 1);
    assert!(selector.state().await.is_monitoring);

    selector.stop_monitor().await.unwrap();
    selector.stop_monitor().await.unwrap();
    assert_eq!(fake.count("stop_monitor"), 1);
    assert!(!selector.state().await.is_monitoring);
}
