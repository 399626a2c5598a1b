use std::{sync::Arc, time::Duration};

use windpike::{
    errors::{ClusterError, Error},
    policies::{BasePolicy, ClientPolicy},
    Bins, Client, ClientRegistry, Key,
};

use crate::{
    common,
    fake::{FakeCluster, NAMESPACE},
};

#[tokio::test]
async fn discovers_all_nodes() {
    let (client, cluster) = common::fake_client(3).await;

    assert!(client.is_connected().await);
    let mut names = client.node_names().await;
    names.sort();
    assert_eq!(cluster.node_names(), names);
    assert_eq!(3, client.nodes().await.len());

    client.close().await;
}

#[tokio::test]
async fn cluster_name() {
    common::init_logger();

    let cluster = FakeCluster::new(2);
    let policy = ClientPolicy {
        cluster_name: Some("notTheRealClusterName".into()),
        timeout: Duration::from_secs(2),
        ..ClientPolicy::default()
    };
    let err = Client::with_transport(&policy, &cluster.seed(), Arc::clone(&cluster) as _)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cluster(ClusterError::Connection)));
}

#[tokio::test]
async fn unreachable_seed() {
    let cluster = FakeCluster::new(1);
    let policy = ClientPolicy {
        timeout: Duration::from_secs(2),
        ..ClientPolicy::default()
    };
    let err = Client::with_transport(&policy, "127.0.0.1:4000", Arc::clone(&cluster) as _)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cluster(ClusterError::Connection)));
}

#[tokio::test]
async fn close() {
    let (client, _cluster) = common::fake_client(2).await;
    assert!(client.is_connected().await, "The client is not connected");

    client.close().await;
    assert!(
        !client.is_connected().await,
        "The client did not disconnect"
    );

    let err = client
        .get(&BasePolicy::default(), &Key::new(NAMESPACE, "c", 1), Bins::All)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cluster(ClusterError::Closed)));

    // Closing twice is fine.
    client.close().await;
}

#[tokio::test]
async fn registry_shares_clients() {
    common::init_logger();

    let cluster = FakeCluster::new(2);
    let registry = ClientRegistry::new();
    let policy = common::fake_policy();
    let hosts = "127.0.0.1:3101,127.0.0.1:3100";

    let first = registry
        .connect_with_transport(&policy, hosts, Arc::clone(&cluster) as _)
        .await
        .unwrap();
    let second = registry
        .connect_with_transport(&policy, "127.0.0.1:3100,127.0.0.1:3101", Arc::clone(&cluster) as _)
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(1, registry.len().await);

    // A client closed behind the registry's back is replaced, not handed out again.
    first.close().await;
    let third = registry
        .connect_with_transport(&policy, hosts, Arc::clone(&cluster) as _)
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert!(!third.is_closed());
    assert!(third.is_connected().await);
    assert_eq!(1, registry.len().await);

    assert!(registry.remove(hosts).await.unwrap());
    assert!(third.is_closed());
    assert!(registry.is_empty().await);
}

#[tokio::test]
#[ignore = "requires a running server"]
async fn live_node_names() {
    let client = common::client().await;
    let names = client.node_names().await;
    assert!(!names.is_empty());
    client.close().await;
}
