#![allow(dead_code)]

use std::{env, sync::Arc};

use once_cell::sync::Lazy;
use rand::{distributions::Alphanumeric, Rng};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use windpike::{policies::ClientPolicy, Client, Transport};

use crate::fake::{FakeCluster, CLUSTER_NAME};

pub fn hosts() -> &'static str {
    static AEROSPIKE_HOSTS: Lazy<String> =
        Lazy::new(|| env::var("AEROSPIKE_HOSTS").unwrap_or_else(|_| String::from("127.0.0.1")));

    &AEROSPIKE_HOSTS
}

pub fn namespace() -> &'static str {
    static AEROSPIKE_NAMESPACE: Lazy<String> =
        Lazy::new(|| env::var("AEROSPIKE_NAMESPACE").unwrap_or_else(|_| String::from("test")));

    &AEROSPIKE_NAMESPACE
}

pub fn client_policy() -> &'static ClientPolicy {
    static GLOBAL_CLIENT_POLICY: Lazy<ClientPolicy> = Lazy::new(|| {
        let mut policy = ClientPolicy::default();
        if let Ok(user) = env::var("AEROSPIKE_USER") {
            let password = env::var("AEROSPIKE_PASSWORD").unwrap_or_default();
            policy.set_user_password(user, &password).unwrap();
        }
        policy.cluster_name = env::var("AEROSPIKE_CLUSTER").ok();
        policy
    });

    &GLOBAL_CLIENT_POLICY
}

/// Client of a real server, configured through the `AEROSPIKE_*` environment variables.
pub async fn client() -> Client {
    Client::new(client_policy(), hosts()).await.unwrap()
}

/// Client policy matching the in-memory cluster.
pub fn fake_policy() -> ClientPolicy {
    ClientPolicy {
        cluster_name: Some(CLUSTER_NAME.to_owned()),
        ..ClientPolicy::default()
    }
}

/// Client of an in-memory cluster with the given number of nodes.
pub async fn fake_client(nodes: u16) -> (Client, Arc<FakeCluster>) {
    let cluster = FakeCluster::new(nodes);
    let client = fake_client_with(&fake_policy(), &cluster, Arc::clone(&cluster) as _).await;

    (client, cluster)
}

/// Client of the in-memory cluster that reaches it through the given transport.
pub async fn fake_client_with(
    policy: &ClientPolicy,
    cluster: &FakeCluster,
    transport: Arc<dyn Transport>,
) -> Client {
    init_logger();

    Client::with_transport(policy, &cluster.seed(), transport)
        .await
        .unwrap()
}

pub fn rand_str(sz: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..sz).map(|_| rng.sample(Alphanumeric) as char).collect()
}

pub fn init_logger() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();
}
