//! Callback notification delivery tests
//!
//! A registered plugin's callback endpoint receives JSON notifications
//! when another plugin changes the tree. Delivery failures must never
//! affect the registry.

use std::time::Duration;

use fleet_monitoring::actors::notifier::NotifierHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_publish_notifies_other_plugins() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/callback"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let stack = TestStack::spawn(FakeProbe::reachable());
    let notifier = NotifierHandle::spawn(stack.registry.clone(), stack.discovery_tx.subscribe());

    // Listener plugin: its callback is the mock server
    let listener = stack
        .registry
        .register("listener", format!("{}/callback", mock_server.uri()), None)
        .await
        .unwrap();

    // Publisher plugin: unreachable callback, which must not matter
    let publisher = stack
        .registry
        .register("publisher", "http://127.0.0.1:1/cb", None)
        .await
        .unwrap();

    stack
        .registry
        .publish(
            publisher.id,
            &publisher.token,
            vec![target_node("t1", "svc://t1")],
        )
        .await
        .unwrap();

    // Give the notifier time to deliver
    tokio::time::sleep(Duration::from_millis(400)).await;

    let requests = mock_server.received_requests().await.unwrap();
    assert!(
        !requests.is_empty(),
        "listener callback should have been notified"
    );

    let bodies: Vec<serde_json::Value> = requests
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();

    // The publish notification arrived and names the publisher's realm
    let publish_note = bodies
        .iter()
        .find(|b| b["event"] == "realm_published")
        .expect("realm_published notification");
    assert_eq!(publish_note["realm"], "publisher");
    assert_eq!(
        publish_note["origin"],
        serde_json::json!(publisher.id.to_string())
    );

    // The listener is never notified about its own registration
    for body in &bodies {
        assert_ne!(body["origin"], serde_json::json!(listener.id.to_string()));
    }

    notifier.shutdown().await;
    stack.shutdown().await;
}

#[tokio::test]
async fn test_dead_callback_does_not_affect_registry() {
    let stack = TestStack::spawn(FakeProbe::reachable());
    let notifier = NotifierHandle::spawn(stack.registry.clone(), stack.discovery_tx.subscribe());

    // Both callbacks point nowhere
    let a = stack
        .registry
        .register("realmA", "http://127.0.0.1:1/cb", None)
        .await
        .unwrap();
    stack
        .registry
        .register("realmB", "http://127.0.0.1:1/cb", None)
        .await
        .unwrap();

    // Publishing still works; delivery failures are absorbed
    stack
        .registry
        .publish(a.id, &a.token, vec![target_node("t1", "svc://t1")])
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let universe = stack.registry.get_universe().await.unwrap();
    assert_eq!(universe.find_realm("realmA").unwrap().children().len(), 1);

    notifier.shutdown().await;
    stack.shutdown().await;
}

#[tokio::test]
async fn test_deregister_notification_delivered() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/callback"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let stack = TestStack::spawn(FakeProbe::reachable());
    let notifier = NotifierHandle::spawn(stack.registry.clone(), stack.discovery_tx.subscribe());

    stack
        .registry
        .register("listener", format!("{}/callback", mock_server.uri()), None)
        .await
        .unwrap();
    let doomed = stack
        .registry
        .register("doomed", "http://127.0.0.1:1/cb", None)
        .await
        .unwrap();

    stack
        .registry
        .deregister(doomed.id, &doomed.token)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;

    let requests = mock_server.received_requests().await.unwrap();
    let deregistered = requests.iter().any(|r| {
        serde_json::from_slice::<serde_json::Value>(&r.body)
            .map(|b| b["event"] == "plugin_deregistered" && b["realm"] == "doomed")
            .unwrap_or(false)
    });
    assert!(deregistered, "deregistration notification should arrive");

    notifier.shutdown().await;
    stack.shutdown().await;
}
