use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering},
        Arc,
    },
};

use tokio::sync::RwLock;
use tracing::warn;

use super::{node_validator::ValidatedNode, partition_tokenizer, NodeError, NodeRefreshError};
use crate::{
    commands::info_command,
    net::{Host, Transport},
    policies::ClientPolicy,
};

bitflags::bitflags! {
    /// Optional server capabilities, as announced by the `features` info command.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct FeatureSupport: u32 {
        const BATCH_ANY = 1 << 0;
        const BATCH_INDEX = 1 << 1;
        const BLOB_BITS = 1 << 2;
        const CDT_LIST = 1 << 3;
        const CDT_MAP = 1 << 4;
        const FLOAT = 1 << 5;
        const GEO = 1 << 6;
        const PEERS = 1 << 7;
        const PQUERY = 1 << 8;
        const PSCANS = 1 << 9;
        const REPLICAS = 1 << 10;
        const TRUNCATE_NAMESPACE = 1 << 11;
        const UDF = 1 << 12;
    }
}

impl From<&str> for FeatureSupport {
    fn from(value: &str) -> Self {
        value
            .split(';')
            .filter_map(|feature| match feature {
                "batch-any" => Some(Self::BATCH_ANY),
                "batch-index" => Some(Self::BATCH_INDEX),
                "blob-bits" => Some(Self::BLOB_BITS),
                "cdt-list" => Some(Self::CDT_LIST),
                "cdt-map" => Some(Self::CDT_MAP),
                "float" => Some(Self::FLOAT),
                "geo" => Some(Self::GEO),
                "peers" => Some(Self::PEERS),
                "pquery" => Some(Self::PQUERY),
                "pscans" => Some(Self::PSCANS),
                "replicas" => Some(Self::REPLICAS),
                "truncate-namespace" => Some(Self::TRUNCATE_NAMESPACE),
                "udf" => Some(Self::UDF),
                _ => None,
            })
            .collect()
    }
}

/// Result of a successful node refresh.
#[derive(Debug, Default)]
pub(crate) struct Refresh {
    /// Peers the node reported that the cluster doesn't know yet.
    pub(crate) friends: HashSet<Host>,
    /// The partition generation changed, so the partition map must be reloaded from this node.
    pub(crate) partitions_changed: bool,
}

/// A server node of the cluster.
pub struct Node {
    name: String,
    host: Host,
    aliases: RwLock<Vec<Host>>,
    features: FeatureSupport,

    transport: Arc<dyn Transport>,
    client_policy: Arc<ClientPolicy>,

    failures: AtomicUsize,
    partition_generation: AtomicIsize,
    reference_count: AtomicUsize,
    active: AtomicBool,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.host)
    }
}

impl Node {
    pub(crate) fn new(
        client_policy: Arc<ClientPolicy>,
        transport: Arc<dyn Transport>,
        validated: ValidatedNode,
    ) -> Self {
        Self {
            name: validated.name,
            host: validated.host,
            aliases: RwLock::new(validated.aliases),
            features: validated.features,
            transport,
            client_policy,
            failures: AtomicUsize::new(0),
            partition_generation: AtomicIsize::new(-1),
            reference_count: AtomicUsize::new(0),
            active: AtomicBool::new(true),
        }
    }

    /// Unique name of the node, as assigned by the server.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address used for all requests to this node.
    #[must_use]
    pub fn host(&self) -> &Host {
        &self.host
    }

    #[must_use]
    pub fn features(&self) -> FeatureSupport {
        self.features
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Number of other nodes that listed this node as peer during the last tend.
    pub(crate) fn reference_count(&self) -> usize {
        self.reference_count.load(Ordering::Relaxed)
    }

    pub(crate) fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    pub(crate) fn increase_failures(&self) -> usize {
        self.failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn inactivate(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    /// Force a reload of the partition map on the next refresh.
    pub(crate) fn reset_partition_generation(&self) {
        self.partition_generation.store(-1, Ordering::Relaxed);
    }

    pub(crate) async fn aliases(&self) -> Vec<Host> {
        self.aliases.read().await.clone()
    }

    pub(crate) async fn add_alias(&self, alias: Host) {
        self.aliases.write().await.push(alias);
        self.reference_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Send info commands to this node.
    pub(crate) async fn info(
        &self,
        commands: &[&str],
    ) -> crate::errors::Result<HashMap<String, String>> {
        info_command::info(
            self.transport.as_ref(),
            &self.host,
            commands,
            Some(self.client_policy.timeout),
        )
        .await
    }

    /// Check the node is still the one it claims to be, and collect the peers it knows about.
    pub(crate) async fn refresh(
        &self,
        current_aliases: &HashMap<Host, Arc<Self>>,
    ) -> Result<Refresh, NodeRefreshError> {
        self.reference_count.store(0, Ordering::Relaxed);

        let commands = [
            "node",
            "cluster-name",
            "partition-generation",
            self.services_name(),
        ];
        let info_map = self
            .info(&commands)
            .await
            .map_err(|e| NodeRefreshError::InfoCommandFailed(NodeError::Info(Box::new(e))))?;

        self.verify_node_name(&info_map)
            .and_then(|()| self.verify_cluster_name(&info_map))
            .map_err(NodeRefreshError::ValidationFailed)?;

        let friends = self
            .friends(current_aliases, &info_map)
            .map_err(NodeRefreshError::FailedAddingFriends)?;
        let partitions_changed = self
            .update_partition_generation(&info_map)
            .map_err(NodeRefreshError::FailedUpdatingPartitions)?;

        self.failures.store(0, Ordering::Relaxed);

        Ok(Refresh {
            friends,
            partitions_changed,
        })
    }

    /// Load the namespaces and partitions this node is master of.
    pub(crate) async fn partition_ownership(&self) -> Result<Vec<(String, Vec<u8>)>, NodeError> {
        let info_map = self
            .info(&[partition_tokenizer::REPLICAS_MASTER])
            .await
            .map_err(|e| NodeError::Info(Box::new(e)))?;
        let value = info_map
            .get(partition_tokenizer::REPLICAS_MASTER)
            .ok_or(NodeError::MissingReplicas)?;

        Ok(partition_tokenizer::parse_replicas_master(value)?)
    }

    fn services_name(&self) -> &'static str {
        if self.client_policy.use_services_alternate {
            "services-alternate"
        } else {
            "services"
        }
    }

    fn verify_node_name(&self, info_map: &HashMap<String, String>) -> Result<(), NodeError> {
        match info_map.get("node") {
            None => Err(NodeError::MissingNodeName),
            Some(info_name) if info_name == &self.name => Ok(()),
            Some(info_name) => {
                self.inactivate();
                Err(NodeError::NameMismatch {
                    expected: self.name.clone(),
                    got: info_name.clone(),
                })
            }
        }
    }

    fn verify_cluster_name(&self, info_map: &HashMap<String, String>) -> Result<(), NodeError> {
        let Some(expected) = &self.client_policy.cluster_name else {
            return Ok(());
        };

        match info_map.get("cluster-name") {
            None => Err(NodeError::MissingClusterName),
            Some(info_name) if info_name == expected => Ok(()),
            Some(info_name) => {
                self.inactivate();
                Err(NodeError::NameMismatch {
                    expected: expected.clone(),
                    got: info_name.clone(),
                })
            }
        }
    }

    fn friends(
        &self,
        current_aliases: &HashMap<Host, Arc<Self>>,
        info_map: &HashMap<String, String>,
    ) -> Result<HashSet<Host>, NodeError> {
        let services = info_map
            .get(self.services_name())
            .ok_or(NodeError::MissingServicesList)?;

        Ok(services
            .split(';')
            .filter(|s| !s.is_empty())
            .filter_map(|friend| {
                let Some(host) = parse_service(friend) else {
                    warn!(
                        got = friend,
                        "node info from {} is malformed, expected HOST:PORT",
                        self.services_name()
                    );
                    return None;
                };

                let host = match self
                    .client_policy
                    .ip_map
                    .as_ref()
                    .and_then(|map| map.get(&host.name))
                {
                    Some(mapped) => Host::new(mapped, host.port),
                    None => host,
                };

                match current_aliases.get(&host) {
                    Some(node) => {
                        node.reference_count.fetch_add(1, Ordering::Relaxed);
                        None
                    }
                    None => Some(host),
                }
            })
            .collect())
    }

    fn update_partition_generation(
        &self,
        info_map: &HashMap<String, String>,
    ) -> Result<bool, NodeError> {
        let generation = info_map
            .get("partition-generation")
            .ok_or(NodeError::MissingPartitionGeneration)?
            .parse::<isize>()?;

        Ok(self.partition_generation.swap(generation, Ordering::Relaxed) != generation)
    }
}

/// Parse a `host:port` entry of the services list. IPv6 hosts are enclosed in brackets.
fn parse_service(service: &str) -> Option<Host> {
    let (host, port) = service.rsplit_once(':')?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    (!host.is_empty())
        .then(|| port.parse().ok())
        .flatten()
        .map(|port| Host::new(host, port))
}
