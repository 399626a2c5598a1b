use std::sync::Arc;

use super::{poll_nodes, Status, Task};
use crate::{
    cluster::Cluster,
    errors::{ParseError, Result},
};

/// Struct for querying index creation status
#[derive(Debug, Clone)]
pub struct IndexTask {
    cluster: Arc<Cluster>,
    namespace: String,
    index_name: String,
}

const SUCCESS_PATTERN: &str = "load_pct=";
const FAIL_PATTERN_201: &str = "FAIL:201";
const FAIL_PATTERN_203: &str = "FAIL:203";

impl IndexTask {
    pub(crate) fn new(cluster: Arc<Cluster>, namespace: String, index_name: String) -> Self {
        Self {
            cluster,
            namespace,
            index_name,
        }
    }

    fn parse_response(response: &str) -> Result<Status> {
        let Some(index) = response.find(SUCCESS_PATTERN) else {
            return if response.contains(FAIL_PATTERN_201) || response.contains(FAIL_PATTERN_203) {
                Ok(Status::NotFound)
            } else {
                Err(ParseError::Info(format!("unexpected index status: {response}")).into())
            };
        };

        let percent = &response[index + SUCCESS_PATTERN.len()..];
        let percent = percent.split(';').next().unwrap_or_default();
        match percent.parse::<u8>() {
            Ok(100) => Ok(Status::Complete),
            Ok(_) => Ok(Status::InProgress),
            Err(_) => Err(ParseError::Info(format!("invalid load_pct value `{percent}`")).into()),
        }
    }
}

#[async_trait::async_trait]
impl Task for IndexTask {
    async fn query_status(&self) -> Result<Status> {
        let command = format!("sindex/{}/{}", self.namespace, self.index_name);
        poll_nodes(&self.cluster, &command, Self::parse_response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_percentage() {
        assert_eq!(
            Status::Complete,
            IndexTask::parse_response("ns=test;indexname=idx;load_pct=100;stat_gc_recs=0").unwrap()
        );
        assert_eq!(
            Status::InProgress,
            IndexTask::parse_response("ns=test;load_pct=42;entries=10").unwrap()
        );
        assert_eq!(
            Status::Complete,
            IndexTask::parse_response("load_pct=100").unwrap()
        );
        assert_eq!(
            Status::NotFound,
            IndexTask::parse_response("FAIL:201:no index").unwrap()
        );
        assert!(IndexTask::parse_response("load_pct=abc;").is_err());
        assert!(IndexTask::parse_response("garbage").is_err());
    }
}
