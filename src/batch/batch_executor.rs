use std::{collections::HashMap, sync::Arc};

use tokio::{sync::Semaphore, task::JoinSet};
use tracing::debug;

use super::{BatchOperation, BatchRecord};
use crate::{
    cluster::{partition::Partition, Cluster, ClusterError, Node},
    commands::{batch_command, single_command},
    errors::{Error, ParseError, Result},
    policies::{BatchPolicy, Policy},
    ResultCode,
};

/// Run a batch: group the entries by the node that owns their key, send one request per node,
/// with the policy's concurrency as upper bound of requests in flight, and put the results back
/// into input order.
pub(crate) async fn execute(
    cluster: &Arc<Cluster>,
    policy: &BatchPolicy,
    ops: Vec<BatchOperation>,
) -> Result<Vec<BatchRecord>> {
    policy.validate()?;
    ops.iter().try_for_each(BatchOperation::validate)?;
    if ops.is_empty() {
        return Ok(Vec::new());
    }
    if cluster.is_closed() {
        return Err(ClusterError::Closed.into());
    }

    let groups = group_by_node(cluster, &ops).await?;
    let mut policy = policy.clone();
    if ops.iter().any(BatchOperation::is_write) {
        policy.base_policy.max_retries = policy.max_write_retries;
    }
    let policy = &policy;
    let ops = Arc::new(ops);
    let policy_ref = Arc::new(policy.clone());
    let permits = Arc::new(Semaphore::new(policy.concurrency.limit(groups.len())));
    let deadline = policy.deadline();

    let mut jobs = JoinSet::new();
    for (node, indices) in groups {
        let cluster = Arc::clone(cluster);
        let ops = Arc::clone(&ops);
        let policy = Arc::clone(&policy_ref);
        let permits = Arc::clone(&permits);

        jobs.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return Err(Error::from(ClusterError::Closed));
            };
            let entries = indices
                .iter()
                .map(|&index| (index, &ops[index as usize]))
                .collect::<Vec<_>>();
            let partition = Partition::new_by_key(entries[0].1.key());

            single_command::retry(&*policy, deadline, |attempt| {
                let cluster = &cluster;
                let policy = &policy;
                let entries = &entries;
                let partition = &partition;
                let first = &node;
                async move {
                    // Ownership may have moved since the first attempt.
                    let node = if attempt == 1 {
                        Arc::clone(first)
                    } else {
                        cluster.get_node(partition).await.ok_or(Error::NoNodes)?
                    };
                    debug!(%node, records = entries.len(), attempt, "sending batch request");

                    let result = batch_command::execute(
                        &node,
                        policy,
                        entries,
                        policy.attempt_timeout(deadline),
                    )
                    .await;
                    if result.as_ref().is_err_and(|err| {
                        matches!(err, Error::Network(_)) || single_command::is_stale_map(err)
                    }) {
                        cluster.refresh_partitions(&node);
                    }
                    result
                }
            })
            .await
        });
    }

    let mut records = vec![None; ops.len()];
    while let Some(joined) = jobs.join_next().await {
        let results = match joined {
            Ok(results) => results?,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => return Err(ClusterError::Closed.into()),
        };

        for result in results {
            let op = &ops[result.index as usize];
            records[result.index as usize] = Some(BatchRecord {
                key: op.key().clone(),
                record: result.record.map(|mut record| {
                    record.key = Some(op.key().clone());
                    record
                }),
                result_code: result.result_code,
                in_doubt: op.is_write() && result.result_code == ResultCode::Timeout,
            });
        }
    }

    let records = records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            record.ok_or_else(|| {
                ParseError::Info(format!("batch response lacks a result for record {index}"))
                    .into()
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if !policy.allow_partial_results {
        if let Some(failed) = records.iter().find(|record| record.is_failure()) {
            return Err(Error::Server(failed.result_code));
        }
    }

    Ok(records)
}

/// Indices of the entries, grouped by the node that is master of their partition.
async fn group_by_node(
    cluster: &Cluster,
    ops: &[BatchOperation],
) -> Result<Vec<(Arc<Node>, Vec<u32>)>> {
    let mut groups = HashMap::<String, (Arc<Node>, Vec<u32>)>::new();

    for (index, op) in ops.iter().enumerate() {
        let index = u32::try_from(index)
            .map_err(|_| Error::invalid_argument("too many records in one batch"))?;
        let node = cluster
            .get_node(&Partition::new_by_key(op.key()))
            .await
            .ok_or(Error::NoNodes)?;

        groups
            .entry(node.name().to_owned())
            .or_insert_with(|| (node, Vec::new()))
            .1
            .push(index);
    }

    Ok(groups.into_values().collect())
}
