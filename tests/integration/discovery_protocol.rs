//! End-to-end tests of the plugin publication protocol
//!
//! These follow the full plugin lifecycle through the registry handle:
//! register → publish → read back → publish empty → deregister.

use assert_matches::assert_matches;
use fleet_monitoring::discovery::{BUILTIN_REALM, DiscoveryError, DiscoveryNode};
use fleet_monitoring::targets::TargetDef;
use pretty_assertions::assert_eq;
use uuid::Uuid;

use crate::helpers::*;

#[tokio::test]
async fn test_full_plugin_lifecycle() {
    let stack = TestStack::spawn(FakeProbe::reachable());
    let registry = &stack.registry;

    // Register
    let reg = registry
        .register("realmA", "http://localhost:8910/cb", None)
        .await
        .unwrap();

    // Publish one target
    registry
        .publish(
            reg.id,
            &reg.token,
            vec![target_node("t1", "service:jmx:rmi:///jndi/rmi://t1:9091/jmxrmi")],
        )
        .await
        .unwrap();

    let universe = registry.get_universe().await.unwrap();
    let realm = universe.find_realm("realmA").expect("realmA in tree");
    assert_eq!(realm.children().len(), 1);
    assert_eq!(realm.children()[0].name(), "t1");

    // Publish an empty subtree - total replacement removes t1
    registry.publish(reg.id, &reg.token, vec![]).await.unwrap();

    let universe = registry.get_universe().await.unwrap();
    let realm = universe.find_realm("realmA").expect("realmA in tree");
    assert_eq!(realm.children().len(), 0);

    // Deregister - realm disappears entirely
    registry.deregister(reg.id, &reg.token).await.unwrap();

    let universe = registry.get_universe().await.unwrap();
    assert!(universe.find_realm("realmA").is_none());

    stack.shutdown().await;
}

#[tokio::test]
async fn test_publish_replaces_not_merges() {
    let stack = TestStack::spawn(FakeProbe::reachable());
    let registry = &stack.registry;

    let reg = registry
        .register("realmA", "http://localhost:8910/cb", None)
        .await
        .unwrap();

    registry
        .publish(
            reg.id,
            &reg.token,
            vec![
                target_node("t1", "localhost:9091"),
                target_node("t2", "localhost:9092"),
            ],
        )
        .await
        .unwrap();

    // A publish that omits t1 silently removes it
    registry
        .publish(reg.id, &reg.token, vec![target_node("t2", "localhost:9092")])
        .await
        .unwrap();

    let universe = stack.registry.get_universe().await.unwrap();
    let realm = universe.find_realm("realmA").unwrap();
    let names: Vec<&str> = realm.children().iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["t2"]);

    stack.shutdown().await;
}

#[tokio::test]
async fn test_nested_realms_survive_round_trip() {
    let stack = TestStack::spawn(FakeProbe::reachable());
    let registry = &stack.registry;

    let reg = registry
        .register("realmA", "http://localhost:8910/cb", None)
        .await
        .unwrap();

    let subtree = vec![DiscoveryNode::Realm {
        name: "pod-7".to_string(),
        children: vec![
            target_node("t1", "localhost:9091"),
            target_node("t2", "localhost:9092"),
        ],
    }];
    registry.publish(reg.id, &reg.token, subtree).await.unwrap();

    let universe = registry.get_universe().await.unwrap();
    let realm = universe.find_realm("realmA").unwrap();
    let pod = realm.find_realm("pod-7").expect("nested realm kept");
    assert_eq!(pod.children().len(), 2);

    stack.shutdown().await;
}

#[tokio::test]
async fn test_unknown_plugin_mutations_leave_tree_unchanged() {
    let stack = TestStack::spawn(FakeProbe::reachable());
    let registry = &stack.registry;

    let before = registry.get_universe().await.unwrap();

    let bogus = Uuid::new_v4();
    assert_matches!(
        registry
            .publish(bogus, "t", vec![target_node("t1", "localhost:9091")])
            .await,
        Err(DiscoveryError::NotFound(_))
    );
    assert_matches!(
        registry.deregister(bogus, "t").await,
        Err(DiscoveryError::NotFound(_))
    );

    let after = registry.get_universe().await.unwrap();
    assert_eq!(before, after);

    stack.shutdown().await;
}

#[tokio::test]
async fn test_malformed_subtree_rejected_without_mutation() {
    let stack = TestStack::spawn(FakeProbe::reachable());
    let registry = &stack.registry;

    let reg = registry
        .register("realmA", "http://localhost:8910/cb", None)
        .await
        .unwrap();
    registry
        .publish(reg.id, &reg.token, vec![target_node("t1", "localhost:9091")])
        .await
        .unwrap();

    // Duplicate sibling names are invalid
    let result = registry
        .publish(
            reg.id,
            &reg.token,
            vec![
                target_node("dup", "localhost:9092"),
                target_node("dup", "localhost:9093"),
            ],
        )
        .await;
    assert_matches!(result, Err(DiscoveryError::MalformedInput(_)));

    // The previous children survived the rejected publish
    let universe = registry.get_universe().await.unwrap();
    let realm = universe.find_realm("realmA").unwrap();
    assert_eq!(realm.children().len(), 1);
    assert_eq!(realm.children()[0].name(), "t1");

    stack.shutdown().await;
}

#[tokio::test]
async fn test_list_plugins_realm_filter_is_exact() {
    let stack = TestStack::spawn(FakeProbe::reachable());
    let registry = &stack.registry;

    registry
        .register("realmA", "http://localhost:8910/cb", None)
        .await
        .unwrap();
    registry
        .register("realmAA", "http://localhost:8911/cb", None)
        .await
        .unwrap();

    let all = registry.list_plugins(None).await.unwrap();
    // Two registered plus the built-in plugin
    assert_eq!(all.len(), 3);

    let filtered = registry
        .list_plugins(Some("realmA".to_string()))
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].realm, "realmA");

    let builtin = registry
        .list_plugins(Some(BUILTIN_REALM.to_string()))
        .await
        .unwrap();
    assert_eq!(builtin.len(), 1);
    assert!(builtin[0].builtin);

    stack.shutdown().await;
}

#[tokio::test]
async fn test_credentials_not_leaked_by_read_apis() {
    let stack = TestStack::spawn(FakeProbe::reachable());
    let registry = &stack.registry;

    let reg = registry
        .register("realmA", "http://localhost:8910/cb", None)
        .await
        .unwrap();

    let plugin = registry.get_plugin(reg.id).await.unwrap().unwrap();
    let json = serde_json::to_string(&plugin).unwrap();
    assert!(!json.contains(&reg.token));

    let listed = registry.list_plugins(None).await.unwrap();
    let json = serde_json::to_string(&listed).unwrap();
    assert!(!json.contains(&reg.token));

    stack.shutdown().await;
}

#[tokio::test]
async fn test_published_target_defs_round_trip() {
    let stack = TestStack::spawn(FakeProbe::reachable());
    let registry = &stack.registry;

    let reg = registry
        .register("realmA", "http://localhost:8910/cb", None)
        .await
        .unwrap();

    let mut def = TargetDef::new("localhost:9091").with_alias("payments");
    def.annotations
        .insert("pod".to_string(), "payments-7f9c".to_string());

    registry
        .publish(
            reg.id,
            &reg.token,
            vec![DiscoveryNode::target("t1", def.clone())],
        )
        .await
        .unwrap();

    let universe = registry.get_universe().await.unwrap();
    let realm = universe.find_realm("realmA").unwrap();
    assert_matches!(
        &realm.children()[0],
        DiscoveryNode::Target { target, .. } if *target == def
    );

    stack.shutdown().await;
}
