use std::sync::Arc;

use super::{poll_nodes, Status, Task};
use crate::{
    cluster::Cluster,
    errors::{ParseError, Result},
};

/// Tracks a UDF that the server applies in the background to the records of a query.
#[derive(Debug, Clone)]
pub struct ExecuteTask {
    cluster: Arc<Cluster>,
    task_id: u64,
}

impl ExecuteTask {
    pub(crate) fn new(cluster: Arc<Cluster>, task_id: u64) -> Self {
        Self { cluster, task_id }
    }

    #[must_use]
    pub fn task_id(&self) -> u64 {
        self.task_id
    }

    fn parse_response(response: &str) -> Result<Status> {
        if response.starts_with("ERROR:2") {
            return Ok(Status::NotFound);
        }
        if response.starts_with("ERROR") {
            return Err(ParseError::Info(format!("unexpected job status: {response}")).into());
        }

        let status = response
            .split([':', ';'])
            .find_map(|pair| pair.strip_prefix("status="));

        match status {
            Some(status) if status.starts_with("done") => Ok(Status::Complete),
            Some(_) => Ok(Status::InProgress),
            None => Err(ParseError::Info(format!("missing job status: {response}")).into()),
        }
    }
}

#[async_trait::async_trait]
impl Task for ExecuteTask {
    async fn query_status(&self) -> Result<Status> {
        let command = format!("query-show:trid={}", self.task_id);
        poll_nodes(&self.cluster, &command, Self::parse_response).await
    }
}
