use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::buffer::{Buffer, ProtoType};
use crate::{
    cluster::{partition::Partition, Cluster, ClusterError},
    errors::{Error, Result},
    net::NetError,
    policies::Policy,
    Key, ResultCode,
};

/// Send a single record request to the master node of the key's partition and parse the
/// response, retrying as the policy allows.
pub(crate) async fn execute<P, T, F>(
    cluster: &Cluster,
    policy: &P,
    key: &Key,
    request: Bytes,
    parse: F,
) -> Result<T>
where
    P: Policy + ?Sized,
    F: Fn(Buffer) -> Result<T>,
{
    policy.validate()?;
    let partition = &Partition::new_by_key(key);
    let parse = &parse;
    let deadline = policy.deadline();

    retry(policy, deadline, move |attempt| {
        let request = request.clone();
        async move {
            if cluster.is_closed() {
                return Err(ClusterError::Closed.into());
            }

            let node = cluster.get_node(partition).await.ok_or(Error::NoNodes)?;
            let timeout = policy.attempt_timeout(deadline);
            debug!(%node, %key, attempt, "sending command");

            let frame = match node.transport().send(node.host(), request, timeout).await {
                Ok(frame) => frame,
                Err(err) => {
                    cluster.refresh_partitions(&node);
                    return Err(err.into());
                }
            };

            let result = parse(Buffer::frame(frame, ProtoType::Message)?);
            if result.as_ref().is_err_and(is_stale_map) {
                cluster.refresh_partitions(&node);
            }
            result
        }
    })
    .await
}

/// Run attempts until one succeeds, fails with an error that can't be retried, or the retry
/// budget of the policy is used up.
pub(crate) async fn retry<P, T, F, Fut>(
    policy: &P,
    deadline: Option<Instant>,
    mut attempt: F,
) -> Result<T>
where
    P: Policy + ?Sized,
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let max_retries = policy.as_ref().max_retries;
    let mut attempts = 0;

    loop {
        attempts += 1;
        let err = match attempt(attempts).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let timed_out = deadline.is_some_and(|deadline| Instant::now() >= deadline);
        if timed_out || (attempts > max_retries && is_timeout(&err)) {
            return Err(Error::Timeout { attempts });
        }
        if !err.is_retriable() || attempts > max_retries {
            return Err(err);
        }

        let delay = policy.retry_delay(attempts);
        if deadline.is_some_and(|deadline| Instant::now() + delay >= deadline) {
            return Err(Error::Timeout { attempts });
        }

        warn!(%err, attempts, ?delay, "command failed, retrying");
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Errors telling that the command went to a node that no longer owns the partition.
pub(crate) fn is_stale_map(err: &Error) -> bool {
    matches!(
        err,
        Error::Server(ResultCode::PartitionUnavailable | ResultCode::ClusterKeyMismatch)
    )
}

fn is_timeout(err: &Error) -> bool {
    matches!(err, Error::Network(NetError::Timeout))
}
