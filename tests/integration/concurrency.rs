//! Concurrency tests for the registry protocol
//!
//! These verify the serializable-per-call guarantee: concurrent callers
//! never observe a half-replaced realm subtree, and independent plugins
//! never corrupt each other's realms.

use fleet_monitoring::discovery::DiscoveryNode;

use crate::helpers::*;

#[tokio::test]
async fn test_concurrent_registrations_get_distinct_identities() {
    let stack = TestStack::spawn(FakeProbe::reachable());

    let mut tasks = vec![];
    for i in 0..8 {
        let registry = stack.registry.clone();
        tasks.push(tokio::spawn(async move {
            registry
                .register(format!("realm-{i}"), "http://localhost:8910/cb", None)
                .await
        }));
    }

    let mut ids = vec![];
    let mut tokens = vec![];
    for task in tasks {
        let reg = task.await.unwrap().unwrap();
        ids.push(reg.id);
        tokens.push(reg.token);
    }

    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8, "identities must be unique");

    tokens.sort();
    tokens.dedup();
    assert_eq!(tokens.len(), 8, "credentials must be unique");

    stack.shutdown().await;
}

#[tokio::test]
async fn test_readers_never_observe_partial_publish() {
    let stack = TestStack::spawn(FakeProbe::reachable());

    let reg = stack
        .registry
        .register("realmA", "http://localhost:8910/cb", None)
        .await
        .unwrap();

    // Alternate between publishing 5 targets and none, while readers
    // hammer GetUniverse. Every snapshot must show 0 or 5 children,
    // never an in-between count.
    let writer = {
        let registry = stack.registry.clone();
        let (id, token) = (reg.id, reg.token.clone());
        tokio::spawn(async move {
            for round in 0..20 {
                let children = if round % 2 == 0 {
                    (0..5)
                        .map(|i| target_node(&format!("t{i}"), &format!("svc://t{i}")))
                        .collect()
                } else {
                    vec![]
                };
                registry.publish(id, &token, children).await.unwrap();
            }
        })
    };

    let mut readers = vec![];
    for _ in 0..4 {
        let registry = stack.registry.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..30 {
                let universe = registry.get_universe().await.unwrap();
                if let Some(realm) = universe.find_realm("realmA") {
                    let count = realm.children().len();
                    assert!(
                        count == 0 || count == 5,
                        "observed half-replaced realm with {count} children"
                    );
                }
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }

    stack.shutdown().await;
}

#[tokio::test]
async fn test_plugins_cannot_corrupt_each_others_realms() {
    let stack = TestStack::spawn(FakeProbe::reachable());

    let reg_a = stack
        .registry
        .register("realmA", "http://localhost:8910/cb", None)
        .await
        .unwrap();
    let reg_b = stack
        .registry
        .register("realmB", "http://localhost:8911/cb", None)
        .await
        .unwrap();

    // Interleave publishes from both plugins
    let task_a = {
        let registry = stack.registry.clone();
        let (id, token) = (reg_a.id, reg_a.token.clone());
        tokio::spawn(async move {
            for i in 0..10 {
                registry
                    .publish(
                        id,
                        &token,
                        vec![target_node(&format!("a{i}"), &format!("svc://a{i}"))],
                    )
                    .await
                    .unwrap();
            }
        })
    };
    let task_b = {
        let registry = stack.registry.clone();
        let (id, token) = (reg_b.id, reg_b.token.clone());
        tokio::spawn(async move {
            for i in 0..10 {
                registry
                    .publish(
                        id,
                        &token,
                        vec![target_node(&format!("b{i}"), &format!("svc://b{i}"))],
                    )
                    .await
                    .unwrap();
            }
        })
    };

    task_a.await.unwrap();
    task_b.await.unwrap();

    let universe = stack.registry.get_universe().await.unwrap();
    let realm_a = universe.find_realm("realmA").unwrap();
    let realm_b = universe.find_realm("realmB").unwrap();

    assert_eq!(realm_a.children().len(), 1);
    assert_eq!(realm_a.children()[0].name(), "a9");
    assert_eq!(realm_b.children().len(), 1);
    assert_eq!(realm_b.children()[0].name(), "b9");

    stack.shutdown().await;
}

#[tokio::test]
async fn test_deregister_concurrent_with_reads() {
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
            (0..4)
                .map(|i| target_node(&format!("t{i}"), &format!("svc://t{i}")))
                .collect::<Vec<DiscoveryNode>>(),
        )
        .await
        .unwrap();

    let reader = {
        let registry = stack.registry.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                let universe = registry.get_universe().await.unwrap();
                // Either the whole realm is there, or none of it
                if let Some(realm) = universe.find_realm("realmA") {
                    assert_eq!(realm.children().len(), 4);
                }
            }
        })
    };

    stack.registry.deregister(reg.id, &reg.token).await.unwrap();
    reader.await.unwrap();

    let universe = stack.registry.get_universe().await.unwrap();
    assert!(universe.find_realm("realmA").is_none());

    stack.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_shutdown_requests() {
    let stack = TestStack::spawn(FakeProbe::reachable());
    let registry = stack.registry.clone();

    let mut tasks = vec![];
    for _ in 0..5 {
        let handle = registry.clone();
        tasks.push(tokio::spawn(async move { handle.shutdown().await }));
    }

    for task in tasks {
        let _ = task.await;
    }

    // Additional shutdown should also work
    registry.shutdown().await;
    stack.reconciler.shutdown().await;
}
