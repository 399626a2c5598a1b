use std::sync::Arc;

use super::{poll_nodes, Status, Task};
use crate::{cluster::Cluster, errors::Result};

/// Tracks the distribution of a registered UDF package to all nodes.
#[derive(Debug, Clone)]
pub struct RegisterTask {
    cluster: Arc<Cluster>,
    package_name: String,
}

impl RegisterTask {
    pub(crate) fn new(cluster: Arc<Cluster>, package_name: String) -> Self {
        Self {
            cluster,
            package_name,
        }
    }

    /// `udf-list` answers with `filename=<name>,hash=<hash>,type=LUA;` for every package.
    fn parse_response(package_name: &str, response: &str) -> Status {
        let found = response
            .split(';')
            .filter_map(|entry| {
                entry
                    .split(',')
                    .find_map(|pair| pair.strip_prefix("filename="))
            })
            .any(|name| name == package_name);

        if found {
            Status::Complete
        } else {
            Status::InProgress
        }
    }
}

#[async_trait::async_trait]
impl Task for RegisterTask {
    async fn query_status(&self) -> Result<Status> {
        poll_nodes(&self.cluster, "udf-list", |response| {
            Ok(Self::parse_response(&self.package_name, response))
        })
        .await
    }
}
