use tracing::debug;

use super::{node::FeatureSupport, NodeError};
use crate::{
    commands::info_command,
    net::{Host, Transport},
    policies::ClientPolicy,
};

/// Identity of a host that answered as a valid cluster member.
#[derive(Debug)]
pub(crate) struct ValidatedNode {
    pub(crate) name: String,
    /// The address that answered, which is used for all further requests.
    pub(crate) host: Host,
    pub(crate) aliases: Vec<Host>,
    pub(crate) features: FeatureSupport,
}

/// Resolve the host to its addresses and ask each one for its node name until one answers.
pub(crate) async fn validate(
    policy: &ClientPolicy,
    transport: &dyn Transport,
    host: &Host,
) -> Result<ValidatedNode, NodeError> {
    let aliases = resolve_aliases(host).await?;

    let mut last_err = None;
    for alias in &aliases {
        match validate_alias(policy, transport, alias).await {
            Ok((name, features)) => {
                return Ok(ValidatedNode {
                    name,
                    host: alias.clone(),
                    aliases,
                    features,
                })
            }
            Err(err) => {
                debug!(%alias, ?err, "alias failed");
                last_err = Some(err);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| NodeError::NoAddress { host: host.clone() }))
}

async fn resolve_aliases(host: &Host) -> Result<Vec<Host>, NodeError> {
    let mut aliases = Vec::new();
    for addr in tokio::net::lookup_host((host.name.as_str(), host.port)).await? {
        let alias = Host::new(&addr.ip().to_string(), addr.port());
        if !aliases.contains(&alias) {
            aliases.push(alias);
        }
    }
    debug!(%host, ?aliases, "resolved aliases for host");

    if aliases.is_empty() {
        Err(NodeError::NoAddress { host: host.clone() })
    } else {
        Ok(aliases)
    }
}

async fn validate_alias(
    policy: &ClientPolicy,
    transport: &dyn Transport,
    alias: &Host,
) -> Result<(String, FeatureSupport), NodeError> {
    let info_map = info_command::info(
        transport,
        alias,
        &["node", "cluster-name", "features"],
        Some(policy.timeout),
    )
    .await
    .map_err(|e| NodeError::Info(Box::new(e)))?;

    let name = info_map
        .get("node")
        .filter(|name| !name.is_empty())
        .ok_or(NodeError::MissingNodeName)?;

    if let Some(cluster_name) = &policy.cluster_name {
        match info_map.get("cluster-name") {
            None => return Err(NodeError::MissingClusterName),
            Some(info_name) if info_name == cluster_name => {}
            Some(info_name) => {
                return Err(NodeError::NameMismatch {
                    expected: cluster_name.clone(),
                    got: info_name.clone(),
                })
            }
        }
    }

    let features = info_map
        .get("features")
        .map(|features| FeatureSupport::from(features.as_str()))
        .unwrap_or_default();

    Ok((name.clone(), features))
}
