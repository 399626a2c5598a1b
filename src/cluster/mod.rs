//! Cluster view of the client: the known nodes, their aliases and the partition map, kept up to
//! date by a background tend task.

pub(crate) mod node;
pub(crate) mod node_validator;
pub(crate) mod partition;
pub(crate) mod partition_tokenizer;

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Weak,
    },
};

use tokio::{
    sync::{Notify, RwLock},
    time::{Duration, Instant},
};
use tracing::{debug, error, warn};

pub use self::node::{FeatureSupport, Node};
use self::{
    node_validator::ValidatedNode,
    partition::{Partition, PartitionMap},
};
use crate::{
    errors::ParseError,
    net::{Host, Transport},
    policies::ClientPolicy,
};

type Result<T, E = ClusterError> = std::result::Result<T, E>;

/// Number of failed refreshes after which the only node of a cluster is given up.
const MAX_SINGLE_NODE_FAILURES: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error(
        "failed to connect to host(s). The network connection(s) to cluster nodes may have timed \
         out, or the cluster may be in a state of flux."
    )]
    Connection,
    #[error("the cluster was closed")]
    Closed,
    #[error("node error")]
    Node(#[from] NodeError),
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("no addresses for host `{host}`")]
    NoAddress { host: Host },
    #[error("missing node name")]
    MissingNodeName,
    #[error("missing cluster name")]
    MissingClusterName,
    #[error("name mismatch. Expected `{expected}`, but got `{got}`")]
    NameMismatch { expected: String, got: String },
    #[error("missing services list")]
    MissingServicesList,
    #[error("missing partition generation")]
    MissingPartitionGeneration,
    #[error("invalid partition generation")]
    InvalidPartitionGeneration(#[from] std::num::ParseIntError),
    #[error("missing replicas information")]
    MissingReplicas,
    #[error("invalid replicas information")]
    Replicas(#[from] ParseError),
    #[error("info request failed")]
    Info(#[source] Box<crate::errors::Error>),
    #[error("I/O related error")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum NodeRefreshError {
    #[error("info command failed")]
    InfoCommandFailed(#[source] NodeError),
    #[error("failed to validate node")]
    ValidationFailed(#[source] NodeError),
    #[error("failed to add friends")]
    FailedAddingFriends(#[source] NodeError),
    #[error("failed to update partitions")]
    FailedUpdatingPartitions(#[source] NodeError),
}

/// Cluster encapsulates the server nodes and manages them.
#[derive(Debug)]
pub struct Cluster {
    // Initial host nodes specified by user.
    seeds: Vec<Host>,

    // All aliases for all nodes in cluster.
    aliases: RwLock<HashMap<Host, Arc<Node>>>,

    // Active nodes in cluster.
    nodes: RwLock<Vec<Arc<Node>>>,

    // Master node of every partition.
    partition_write_map: RwLock<PartitionMap>,

    // Round robin index for random node selection.
    node_index: AtomicUsize,

    client_policy: Arc<ClientPolicy>,
    transport: Arc<dyn Transport>,

    closed: AtomicBool,
    shutdown: Arc<Notify>,
    // Wakes the tend task before its interval passed.
    tend_now: Arc<Notify>,
}

impl Cluster {
    /// Connect to the seeds, wait for the cluster view to settle and start the tend task.
    pub(crate) async fn new(
        policy: ClientPolicy,
        hosts: &[Host],
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<Self>> {
        let cluster = Arc::new(Self {
            seeds: hosts.to_vec(),
            aliases: RwLock::default(),
            nodes: RwLock::default(),
            partition_write_map: RwLock::default(),
            node_index: AtomicUsize::new(0),
            client_policy: Arc::new(policy),
            transport,
            closed: AtomicBool::new(false),
            shutdown: Arc::default(),
            tend_now: Arc::default(),
        });

        cluster.wait_till_stabilized().await;

        if cluster.client_policy.fail_if_not_connected && !cluster.is_connected().await {
            return Err(ClusterError::Connection);
        }

        tokio::spawn(Self::tend_thread(Arc::downgrade(&cluster)));

        debug!("new cluster initialized and ready to be used");
        Ok(cluster)
    }

    async fn tend_thread(cluster: Weak<Self>) {
        loop {
            let Some(current) = cluster.upgrade() else {
                break;
            };
            if current.closed.load(Ordering::Relaxed) {
                break;
            }

            current.tend().await;

            let interval = current.client_policy.tend_interval();
            let shutdown = Arc::clone(&current.shutdown);
            let tend_now = Arc::clone(&current.tend_now);
            drop(current);

            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = tend_now.notified() => debug!("partition map marked stale, tending early"),
                () = shutdown.notified() => break,
            }
        }

        debug!("cluster tend task stopped");
    }

    async fn tend(&self) {
        let mut nodes = self.nodes().await;

        // All node additions/deletions are performed in the tend task.
        // If no active nodes exist, seed the cluster.
        if nodes.is_empty() {
            debug!("no connections available, seeding");
            self.seed_nodes().await;
            nodes = self.nodes().await;
        }

        let mut friend_list = HashSet::new();
        let mut refresh_count = 0;
        let aliases = self.aliases().await;

        for node in nodes.iter().filter(|node| node.is_active()) {
            match node.refresh(&aliases).await {
                Ok(refresh) => {
                    refresh_count += 1;
                    friend_list.extend(refresh.friends);

                    if refresh.partitions_changed {
                        if let Err(err) = self.update_partitions(node).await {
                            warn!(%node, %err, "failed updating the partition map");
                            node.reset_partition_generation();
                        }
                    }
                }
                Err(err) => {
                    let failures = node.increase_failures();
                    warn!(%node, %err, failures, "node refresh failed");
                }
            }
        }

        let add_list = self.find_new_nodes_to_add(friend_list).await;
        self.add_nodes_and_aliases(&add_list).await;

        // Removal comes after adding, so aliases that moved to a new node are not lost.
        let remove_list = self.find_nodes_to_remove(refresh_count).await;
        self.remove_nodes_and_aliases(&remove_list).await;
    }

    /// Tend until the number of nodes stops changing, or the connect timeout passed.
    async fn wait_till_stabilized(&self) {
        let deadline = Instant::now() + self.client_policy.timeout;

        let mut count = None;
        while Instant::now() < deadline {
            self.tend().await;

            let new_count = self.node_count().await;
            if count == Some(new_count) {
                break;
            }
            count = Some(new_count);

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[must_use]
    pub fn client_policy(&self) -> &ClientPolicy {
        &self.client_policy
    }

    /// Mark the partition map of the node as stale and have the tend task refresh it right away,
    /// instead of waiting for the next tend interval.
    pub(crate) fn refresh_partitions(&self, node: &Node) {
        node.reset_partition_generation();
        self.tend_now.notify_one();
    }

    async fn update_partitions(&self, node: &Arc<Node>) -> Result<()> {
        let ownership = node.partition_ownership().await?;

        let mut map = self.partition_write_map.write().await;
        for (namespace, bitmap) in ownership {
            partition::apply_ownership(&mut map, namespace, &bitmap, node);
        }

        Ok(())
    }

    /// Validate all seeds and add the nodes behind them. Returns whether any node was found.
    async fn seed_nodes(&self) -> bool {
        debug!(seed_count = self.seeds.len(), "seeding the cluster");

        let mut list = Vec::<Arc<Node>>::new();
        for seed in &self.seeds {
            let validated = match self.validate(seed).await {
                Ok(v) => v,
                Err(err) => {
                    error!(error = ?err, %seed, "failed to validate seed host");
                    continue;
                }
            };

            if list.iter().any(|node| node.name() == validated.name)
                || self.get_node_by_name(&validated.name).await.is_some()
            {
                continue;
            }

            list.push(self.create_node(validated));
        }

        self.add_nodes_and_aliases(&list).await;
        !list.is_empty()
    }

    async fn validate(&self, host: &Host) -> Result<ValidatedNode, NodeError> {
        node_validator::validate(&self.client_policy, self.transport.as_ref(), host).await
    }

    async fn find_new_nodes_to_add(&self, hosts: HashSet<Host>) -> Vec<Arc<Node>> {
        let mut list = Vec::<Arc<Node>>::new();

        for host in hosts {
            let validated = match self.validate(&host).await {
                Ok(v) => v,
                Err(err) => {
                    error!(error = ?err, %host, "node validation failed");
                    continue;
                }
            };

            // A known node name under a new address usually means the services list contains
            // both internal and external addresses of the same node. Keep it as alias only.
            let existing = match self.get_node_by_name(&validated.name).await {
                Some(node) => Some(node),
                None => list.iter().find(|n| n.name() == validated.name).cloned(),
            };

            match existing {
                Some(node) => self.add_alias(host, node).await,
                None => list.push(self.create_node(validated)),
            }
        }

        list
    }

    fn create_node(&self, validated: ValidatedNode) -> Arc<Node> {
        Arc::new(Node::new(
            Arc::clone(&self.client_policy),
            Arc::clone(&self.transport),
            validated,
        ))
    }

    async fn find_nodes_to_remove(&self, refresh_count: usize) -> Vec<Arc<Node>> {
        let nodes = self.nodes().await;
        let cluster_size = nodes.len();
        let mut remove_list = Vec::new();

        for node in nodes {
            if !node.is_active() {
                remove_list.push(node);
                continue;
            }

            match cluster_size {
                // Single node clusters rely on whether it responded to info requests.
                1 => {
                    if node.failures() > MAX_SINGLE_NODE_FAILURES && self.seed_nodes().await {
                        remove_list.push(node);
                    }
                }

                // Two node clusters require at least one successful refresh before removing.
                2 => {
                    if refresh_count == 1 && node.reference_count() == 0 && node.failures() > 0 {
                        remove_list.push(node);
                    }
                }

                // Multi-node clusters require two successful node refreshes before removing.
                _ => {
                    if refresh_count >= 2
                        && node.reference_count() == 0
                        && (node.failures() > 0 || !self.find_node_in_partition_map(&node).await)
                    {
                        remove_list.push(node);
                    }
                }
            }
        }

        remove_list
    }

    async fn add_nodes_and_aliases(&self, friend_list: &[Arc<Node>]) {
        if friend_list.is_empty() {
            return;
        }

        for node in friend_list {
            self.add_aliases(node).await;
            debug!(%node, "adding node");
        }
        self.nodes.write().await.extend(friend_list.iter().cloned());
    }

    async fn remove_nodes_and_aliases(&self, nodes_to_remove: &[Arc<Node>]) {
        if nodes_to_remove.is_empty() {
            return;
        }

        for node in nodes_to_remove {
            warn!(%node, "removing node");
            node.inactivate();

            let aliases = node.aliases().await;
            {
                let mut known = self.aliases.write().await;
                for alias in &aliases {
                    known.remove(alias);
                }
            }
            self.transport.disconnect(node.host()).await;
        }

        self.nodes
            .write()
            .await
            .retain(|node| nodes_to_remove.iter().all(|rem| rem.name() != node.name()));

        let mut map = self.partition_write_map.write().await;
        for owners in map.values_mut() {
            for owner in owners.iter_mut() {
                if owner
                    .as_ref()
                    .is_some_and(|o| nodes_to_remove.iter().any(|rem| rem.name() == o.name()))
                {
                    *owner = None;
                }
            }
        }
    }

    async fn add_alias(&self, host: Host, node: Arc<Node>) {
        node.add_alias(host.clone()).await;
        self.aliases.write().await.insert(host, node);
    }

    async fn add_aliases(&self, node: &Arc<Node>) {
        let mut aliases = self.aliases.write().await;
        for alias in node.aliases().await {
            aliases.insert(alias, Arc::clone(node));
        }
    }

    async fn find_node_in_partition_map(&self, filter: &Node) -> bool {
        self.partition_write_map.read().await.values().any(|owners| {
            owners
                .iter()
                .flatten()
                .any(|node| node.name() == filter.name())
        })
    }

    pub async fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Relaxed) && !self.nodes.read().await.is_empty()
    }

    pub(crate) async fn aliases(&self) -> HashMap<Host, Arc<Node>> {
        self.aliases.read().await.clone()
    }

    pub async fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.read().await.clone()
    }

    async fn node_count(&self) -> usize {
        self.nodes.read().await.len()
    }

    /// Master node of the partition, or any active node if the partition has no known owner.
    pub(crate) async fn get_node(&self, partition: &Partition<'_>) -> Option<Arc<Node>> {
        let node = self
            .partition_write_map
            .read()
            .await
            .get(partition.namespace)
            .and_then(|owners| owners.get(partition.partition_id))
            .and_then(Option::clone)
            .filter(|node| node.is_active());

        match node {
            Some(node) => Some(node),
            None => self.get_random_node().await,
        }
    }

    pub async fn get_random_node(&self) -> Option<Arc<Node>> {
        let nodes = self.nodes.read().await;
        let length = nodes.len();

        (0..length)
            .find_map(|_| {
                let index = self.node_index.fetch_add(1, Ordering::Relaxed) % length;
                nodes.get(index).filter(|node| node.is_active())
            })
            .cloned()
    }

    pub async fn get_node_by_name(&self, node_name: &str) -> Option<Arc<Node>> {
        self.nodes
            .read()
            .await
            .iter()
            .find(|node| node.name() == node_name)
            .cloned()
    }

    /// Stop tending and release all connections. Calling it more than once has no effect.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::Relaxed) {
            return;
        }

        self.shutdown.notify_one();
        self.nodes.write().await.clear();
        self.aliases.write().await.clear();
        self.partition_write_map.write().await.clear();
        self.transport.close().await;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}
