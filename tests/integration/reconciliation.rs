//! Integration tests for the reconciliation scheduler
//!
//! These drive the reconciler against a scripted probe and verify:
//! - sweep fan-out with per-target failure isolation
//! - timeout handling identical to refusal
//! - discovery-driven reconciliation of freshly published targets

use std::time::Duration;

use assert_matches::assert_matches;
use fleet_monitoring::storage::StorageBackend;
use fleet_monitoring::targets::{ConnectionError, RecordingState, TargetRecord};

use crate::helpers::*;

#[tokio::test]
async fn test_sweep_with_one_failure_leaves_siblings_connected() {
    let stack = TestStack::spawn(FakeProbe::refusing(&["svc://bad"]));

    for url in ["svc://a", "svc://b", "svc://bad", "svc://c"] {
        stack
            .backend
            .upsert_target(&TargetRecord::new(url))
            .await
            .unwrap();
    }

    // Sweep completes despite the failing target
    stack.reconciler.reconcile_now(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    for url in ["svc://a", "svc://b", "svc://c"] {
        let record = stack.backend.get_target(url).await.unwrap().unwrap();
        assert!(record.is_connected(), "{url} should be connected");
        assert_eq!(record.recordings.len(), 1, "{url} recordings refreshed");
    }

    let failed = stack.backend.get_target("svc://bad").await.unwrap().unwrap();
    assert!(!failed.is_connected());
    assert!(failed.recordings.is_empty());

    stack.shutdown().await;
}

#[tokio::test]
async fn test_successful_reconcile_reports_probe_recordings() {
    let stack = TestStack::spawn(FakeProbe::reachable());

    stack
        .reconciler
        .reconcile_now(Some("svc://app".to_string()))
        .await
        .unwrap();

    let record = stack.backend.get_target("svc://app").await.unwrap().unwrap();
    assert!(record.is_connected());
    assert_eq!(record.recordings.len(), 1);
    assert_eq!(record.recordings[0].name, "continuous");
    assert_eq!(record.recordings[0].state, RecordingState::Running);

    stack.shutdown().await;
}

#[tokio::test]
async fn test_timeout_persists_cleared_state_and_raises() {
    let stack = TestStack::spawn(FakeProbe::hanging(&["svc://slow"]));

    let mut seeded = TargetRecord::new("svc://slow");
    seeded.jvm_id = Some("previously-confirmed".to_string());
    stack.backend.upsert_target(&seeded).await.unwrap();

    let result = stack
        .reconciler
        .reconcile_now(Some("svc://slow".to_string()))
        .await;
    assert_matches!(result, Err(ConnectionError::Timeout));

    // The store no longer claims reachability
    let record = stack.backend.get_target("svc://slow").await.unwrap().unwrap();
    assert!(!record.is_connected());

    stack.shutdown().await;
}

#[tokio::test]
async fn test_published_targets_are_reconciled() {
    let stack = TestStack::spawn(FakeProbe::reachable());

    let reg = stack
        .registry
        .register("realmA", "http://localhost:8910/cb", None)
        .await
        .unwrap();

    stack
        .registry
        .publish(
            reg.id,
            &reg.token,
            vec![
                target_node("t1", "app-1.example.com:9091"),
                target_node("t2", "app-2.example.com:9091"),
            ],
        )
        .await
        .unwrap();

    // The reconciler picks the publish event up and creates store records
    tokio::time::sleep(Duration::from_millis(300)).await;

    let targets = stack.backend.list_targets().await.unwrap();
    assert_eq!(targets.len(), 2);
    for record in &targets {
        assert!(
            record.connect_url.starts_with("service:jmx:rmi:"),
            "identity is the canonical URL, got {}",
            record.connect_url
        );
        assert!(record.is_connected());
    }

    stack.shutdown().await;
}

#[tokio::test]
async fn test_sweep_selects_only_unconnected_targets() {
    let stack = TestStack::spawn(FakeProbe::refusing(&["svc://confirmed"]));

    // A confirmed target - even one that would now refuse - is not swept
    let mut confirmed = TargetRecord::new("svc://confirmed");
    confirmed.jvm_id = Some("abc".to_string());
    stack.backend.upsert_target(&confirmed).await.unwrap();

    stack
        .backend
        .upsert_target(&TargetRecord::new("svc://pending"))
        .await
        .unwrap();

    stack.reconciler.reconcile_now(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The confirmed target kept its stable ID: the sweep never touched it
    let record = stack
        .backend
        .get_target("svc://confirmed")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.jvm_id.as_deref(), Some("abc"));

    let pending = stack.backend.get_target("svc://pending").await.unwrap().unwrap();
    assert!(pending.is_connected());

    stack.shutdown().await;
}

#[tokio::test]
async fn test_connectivity_transitions_are_broadcast() {
    let stack = TestStack::spawn(FakeProbe::reachable());
    let mut events = stack.target_tx.subscribe();

    stack
        .reconciler
        .reconcile_now(Some("svc://app".to_string()))
        .await
        .unwrap();

    let event = events.recv().await.unwrap();
    assert_matches!(
        event,
        fleet_monitoring::actors::messages::TargetEvent::Connected { ref connect_url, .. }
            if connect_url == "svc://app"
    );

    stack.shutdown().await;
}

#[tokio::test]
async fn test_reconcile_assigns_distinct_stable_ids() {
    let stack = TestStack::spawn(FakeProbe::reachable());

    for url in ["svc://a", "svc://b"] {
        stack
            .reconciler
            .reconcile_now(Some(url.to_string()))
            .await
            .unwrap();
    }

    let a = stack.backend.get_target("svc://a").await.unwrap().unwrap();
    let b = stack.backend.get_target("svc://b").await.unwrap().unwrap();
    assert_ne!(a.jvm_id, b.jvm_id);

    stack.shutdown().await;
}
