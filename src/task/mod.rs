//! Handles to long running server jobs, like building a secondary index or applying a UDF to a
//! whole set.

pub use self::{execute_task::ExecuteTask, index_task::IndexTask, register_task::RegisterTask};

mod execute_task;
mod index_task;
mod register_task;

use std::sync::Arc;

use tokio::time::{Duration, Instant};

use crate::{
    cluster::Cluster,
    errors::{Error, ParseError, Result},
};

/// Status of task
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    /// long running task not found
    NotFound,
    /// long running task in progress
    InProgress,
    /// long running task completed
    Complete,
}

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Base task interface
#[async_trait::async_trait]
pub trait Task {
    /// Current status of the task, across all nodes of the cluster.
    async fn query_status(&self) -> Result<Status>;

    /// Wait until query status is complete, an error occurs, or the timeout has elapsed.
    async fn wait_till_complete(&self, timeout: Option<Duration>) -> Result<Status> {
        let start = Instant::now();
        let mut polls = 0;

        loop {
            // Sleep first to give the task a chance to start on every node.
            tokio::time::sleep(POLL_INTERVAL).await;
            polls += 1;

            match self.query_status().await? {
                Status::NotFound => {
                    return Err(ParseError::Info("task status not found".to_owned()).into())
                }
                Status::InProgress => {}
                Status::Complete => return Ok(Status::Complete),
            }

            if timeout.is_some_and(|timeout| start.elapsed() + POLL_INTERVAL > timeout) {
                return Err(Error::Timeout { attempts: polls });
            }
        }
    }
}

/// Ask every node the same info command and combine the answers. The task is complete once all
/// nodes report it as complete.
async fn poll_nodes(
    cluster: &Arc<Cluster>,
    command: &str,
    parse: impl Fn(&str) -> Result<Status> + Send + Sync,
) -> Result<Status> {
    let nodes = cluster.nodes().await;
    if nodes.is_empty() {
        return Err(Error::NoNodes);
    }

    for node in &nodes {
        let response = node.info(&[command]).await?;
        let Some(value) = response.get(command) else {
            return Ok(Status::NotFound);
        };

        match parse(value)? {
            Status::Complete => {}
            status => return Ok(status),
        }
    }

    Ok(Status::Complete)
}
