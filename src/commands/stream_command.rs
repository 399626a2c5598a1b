use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use rand::Rng;
use tokio::{
    sync::{mpsc, Semaphore},
    task::JoinSet,
    time::Instant,
};
use tracing::{debug, warn};

use super::{
    buffer::{Buffer, InfoAttr, PartitionRequest, ProtoType, RequestBuffer},
    read_command::{parse_bins, parse_key, skip_fields},
};
use crate::{
    cluster::{partition::Partition, Cluster, ClusterError, Node},
    errors::{Error, Result},
    key::DIGEST_SIZE,
    net::FrameStream,
    policies::{BasePolicy, Policy, QueryPolicy, ScanPolicy},
    query::{PartitionFilter, Recordset, Statement, StreamState},
    Bins, Record, ResultCode,
};

/// Records to stream from the cluster.
#[derive(Debug)]
pub(crate) enum StreamRequest {
    Scan {
        policy: ScanPolicy,
        namespace: String,
        set_name: String,
        bins: Bins,
    },
    Query {
        policy: QueryPolicy,
        statement: Statement,
    },
}

impl StreamRequest {
    fn namespace(&self) -> &str {
        match self {
            Self::Scan { namespace, .. } => namespace,
            Self::Query { statement, .. } => &statement.namespace,
        }
    }

    fn policy(&self) -> &BasePolicy {
        match self {
            Self::Scan { policy, .. } => &policy.base_policy,
            Self::Query { policy, .. } => &policy.base_policy,
        }
    }

    fn bins(&self) -> &Bins {
        match self {
            Self::Scan { bins, .. } => bins,
            Self::Query { statement, .. } => &statement.bins,
        }
    }

    fn max_records(&self) -> u64 {
        match self {
            Self::Scan { policy, .. } => policy.max_records,
            Self::Query { policy, .. } => policy.max_records,
        }
    }

    fn max_concurrent_nodes(&self) -> usize {
        match self {
            Self::Scan { policy, .. } => policy.max_concurrent_nodes,
            Self::Query { policy, .. } => policy.max_concurrent_nodes,
        }
    }

    fn record_queue_size(&self) -> usize {
        match self {
            Self::Scan { policy, .. } => policy.record_queue_size,
            Self::Query { policy, .. } => policy.record_queue_size,
        }
    }

    fn encode(&self, partitions: &PartitionRequest<'_>) -> Result<Bytes> {
        let mut request = RequestBuffer::new();
        match self {
            Self::Scan {
                policy,
                namespace,
                set_name,
                bins,
            } => request.set_scan(policy, namespace, set_name, bins, partitions)?,
            Self::Query { policy, statement } => {
                request.set_query(policy, statement, partitions)?;
            }
        }
        Ok(request.freeze())
    }
}

/// Start streaming the records of the partitions that the filter still marks for retrieval. The
/// records are delivered through the returned recordset while the node requests run in the
/// background.
pub(crate) fn execute(
    cluster: Arc<Cluster>,
    request: StreamRequest,
    mut filter: PartitionFilter,
) -> Result<Recordset> {
    request.policy().validate()?;
    request.bins().validate()?;
    filter.prepare()?;
    if cluster.is_closed() {
        return Err(ClusterError::Closed.into());
    }

    let state = Arc::new(StreamState::new(rand::thread_rng().gen()));
    let (tx, rx) = mpsc::channel(request.record_queue_size().max(1));
    debug!(
        task_id = state.task_id(),
        namespace = request.namespace(),
        "starting record stream"
    );

    tokio::spawn(run(
        cluster,
        Arc::new(request),
        filter,
        Arc::clone(&state),
        tx,
    ));

    Ok(Recordset::new(rx, state))
}

/// Partitions assigned to one node for a single round.
#[derive(Debug)]
struct NodePartitions {
    node: Arc<Node>,
    ids: Vec<u16>,
    fresh: Vec<u16>,
    digests: Vec<[u8; DIGEST_SIZE]>,
}

/// What happened while reading the records of one node.
#[derive(Debug, Default)]
struct NodeOutcome {
    ids: Vec<u16>,
    last_digests: HashMap<u16, [u8; DIGEST_SIZE]>,
    unavailable: Vec<u16>,
    records: u64,
    cancelled: bool,
    error: Option<Error>,
}

/// How a round of node requests ended.
#[derive(Debug, Eq, PartialEq)]
enum RoundEnd {
    /// Every partition is either done or pending because a node reached its record limit.
    Complete,
    /// Some partitions need another round.
    Retry,
    Cancelled,
}

async fn run(
    cluster: Arc<Cluster>,
    request: Arc<StreamRequest>,
    mut filter: PartitionFilter,
    state: Arc<StreamState>,
    tx: mpsc::Sender<Result<Record>>,
) {
    let policy = request.policy();
    let deadline = policy.deadline();
    let max_records = request.max_records();
    let mut delivered = 0_u64;
    let mut attempts = 0_usize;

    let result = loop {
        attempts += 1;

        let remaining = max_records.saturating_sub(delivered);
        let end = match round(&cluster, &request, &mut filter, &state, &tx, remaining, deadline)
            .await
        {
            Ok((end, records)) => {
                delivered += records;
                end
            }
            Err(err) => break Err(err),
        };
        state.set_filter(filter.clone()).await;

        match end {
            RoundEnd::Complete | RoundEnd::Cancelled => break Ok(()),
            RoundEnd::Retry if max_records > 0 && delivered >= max_records => break Ok(()),
            RoundEnd::Retry => {}
        }

        if attempts > policy.max_retries
            || deadline.is_some_and(|deadline| Instant::now() >= deadline)
        {
            break Err(Error::Timeout { attempts });
        }

        let delay = policy.retry_delay(attempts);
        warn!(task_id = state.task_id(), attempts, ?delay, "retrying partitions");
        tokio::select! {
            biased;
            () = state.cancelled() => break Ok(()),
            () = tokio::time::sleep(delay) => {}
        }
    };

    filter.done = filter.partitions.iter().all(|status| !status.retry);
    state.set_filter(filter).await;

    if let Err(err) = result {
        fail(&state, &tx, err).await;
    }
}

/// Hand the error to the recordset and stop all node requests.
async fn fail(state: &StreamState, tx: &mpsc::Sender<Result<Record>>, err: Error) {
    debug!(task_id = state.task_id(), %err, "record stream failed");
    tokio::select! {
        biased;
        () = state.cancelled() => {}
        _ = tx.send(Err(err)) => {}
    }
    state.cancel();
}

/// Request the pending partitions from their nodes and wait for all of them to finish. Returns
/// how the round ended and the number of records delivered.
async fn round(
    cluster: &Cluster,
    request: &Arc<StreamRequest>,
    filter: &mut PartitionFilter,
    state: &Arc<StreamState>,
    tx: &mpsc::Sender<Result<Record>>,
    remaining: u64,
    deadline: Option<Instant>,
) -> Result<(RoundEnd, u64)> {
    if cluster.is_closed() {
        return Err(ClusterError::Closed.into());
    }

    let assigned = assign(cluster, request.namespace(), filter).await?;
    if assigned.is_empty() {
        return Ok((RoundEnd::Complete, 0));
    }

    let limits = if request.max_records() == 0 {
        vec![0; assigned.len()]
    } else {
        node_limits(remaining, assigned.len())
    };

    let mut requests = Vec::with_capacity(assigned.len());
    for (partitions, limit) in assigned.into_iter().zip(limits) {
        if request.max_records() > 0 && limit == 0 {
            // Left for the next page.
            mark_retry(filter, &partitions.ids);
        } else {
            requests.push((partitions, limit));
        }
    }

    let concurrency = match request.max_concurrent_nodes() {
        0 => requests.len(),
        limit => limit.min(requests.len()),
    };
    let permits = Arc::new(Semaphore::new(concurrency));

    let mut jobs = JoinSet::new();
    for (partitions, node_limit) in requests {
        let request = Arc::clone(request);
        let state = Arc::clone(state);
        let permits = Arc::clone(&permits);
        let tx = tx.clone();

        jobs.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                let outcome = NodeOutcome {
                    ids: partitions.ids,
                    cancelled: true,
                    ..NodeOutcome::default()
                };
                return (outcome, node_limit);
            };
            let outcome =
                read_node(&request, partitions, &state, &tx, node_limit, deadline).await;
            (outcome, node_limit)
        });
    }

    let mut end = RoundEnd::Complete;
    let mut records = 0;

    while let Some(joined) = jobs.join_next().await {
        let (outcome, node_limit) = match joined {
            Ok(joined) => joined,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => return Err(ClusterError::Closed.into()),
        };
        records += outcome.records;

        for (id, digest) in &outcome.last_digests {
            if let Some(status) = filter.status_mut(*id) {
                status.digest = Some(*digest);
            }
        }

        let limit_reached = node_limit > 0 && outcome.records >= node_limit;
        if outcome.cancelled || outcome.error.is_some() || limit_reached {
            mark_retry(filter, &outcome.ids);
        } else {
            mark_retry(filter, &outcome.unavailable);
        }

        if outcome.cancelled {
            end = RoundEnd::Cancelled;
        } else if let Some(err) = outcome.error {
            if err.is_retriable() {
                warn!(%err, "node failed to stream records");
                if end == RoundEnd::Complete {
                    end = RoundEnd::Retry;
                }
            } else if end != RoundEnd::Cancelled {
                fail(state, tx, err).await;
                end = RoundEnd::Cancelled;
            }
        } else if !outcome.unavailable.is_empty() && end == RoundEnd::Complete {
            end = RoundEnd::Retry;
        }
    }

    Ok((end, records))
}

/// Split the record budget of a round over the nodes, the first nodes taking the remainder. With
/// a budget below the node count, only that many nodes get a single record each.
fn node_limits(budget: u64, nodes: usize) -> Vec<u64> {
    let count = nodes as u64;
    let (share, remainder) = (budget / count, budget % count);
    (0..count).map(|i| share + u64::from(i < remainder)).collect()
}

/// Group the partitions marked for retrieval by their current master node.
async fn assign(
    cluster: &Cluster,
    namespace: &str,
    filter: &mut PartitionFilter,
) -> Result<Vec<NodePartitions>> {
    let mut nodes = HashMap::<String, NodePartitions>::new();

    for status in filter.partitions.iter_mut().filter(|status| status.retry) {
        let node = cluster
            .get_node(&Partition::new(namespace, status.id.into()))
            .await
            .ok_or(Error::NoNodes)?;

        let entry = nodes
            .entry(node.name().to_owned())
            .or_insert_with(|| NodePartitions {
                node,
                ids: Vec::new(),
                fresh: Vec::new(),
                digests: Vec::new(),
            });

        entry.ids.push(status.id);
        match status.digest {
            Some(digest) => entry.digests.push(digest),
            None => entry.fresh.push(status.id),
        }
        status.retry = false;
    }

    Ok(nodes.into_values().collect())
}

fn mark_retry(filter: &mut PartitionFilter, ids: &[u16]) {
    for id in ids {
        if let Some(status) = filter.status_mut(*id) {
            status.retry = true;
        }
    }
}

async fn read_node(
    request: &StreamRequest,
    partitions: NodePartitions,
    state: &StreamState,
    tx: &mpsc::Sender<Result<Record>>,
    max_records: u64,
    deadline: Option<Instant>,
) -> NodeOutcome {
    let NodePartitions {
        node,
        ids,
        fresh,
        digests,
    } = partitions;
    let mut outcome = NodeOutcome {
        ids,
        ..NodeOutcome::default()
    };

    let encoded = request.encode(&PartitionRequest {
        task_id: state.task_id(),
        partitions: &fresh,
        digests: &digests,
        max_records,
    });
    let encoded = match encoded {
        Ok(encoded) => encoded,
        Err(err) => {
            outcome.error = Some(err);
            return outcome;
        }
    };

    debug!(
        %node,
        partitions = outcome.ids.len(),
        max_records,
        "requesting partition records"
    );

    let timeout = request.policy().attempt_timeout(deadline);
    let mut stream = match node.transport().stream(node.host(), encoded, timeout).await {
        Ok(stream) => stream,
        Err(err) => {
            outcome.error = Some(err.into());
            return outcome;
        }
    };

    let result = tokio::select! {
        biased;
        () = state.cancelled() => Ok(false),
        result = read_records(stream.as_mut(), tx, &mut outcome) => result,
    };

    match result {
        Ok(true) => stream.finish(true).await,
        Ok(false) => {
            outcome.cancelled = true;
            stream.finish(false).await;
        }
        Err(err) => {
            outcome.error = Some(err);
            stream.finish(false).await;
        }
    }

    outcome
}

/// Forward the records of a node response to the recordset. Returns `false` if the recordset
/// stopped accepting records.
async fn read_records(
    stream: &mut dyn FrameStream,
    tx: &mpsc::Sender<Result<Record>>,
    outcome: &mut NodeOutcome,
) -> Result<bool> {
    loop {
        let frame = stream.next_frame().await?;
        let mut buf = Buffer::frame(frame, ProtoType::Message)?;

        while !buf.is_empty() {
            let header = buf.read_message_header()?;

            if header.is_last() {
                return match header.result_code {
                    ResultCode::Ok | ResultCode::KeyNotFoundError | ResultCode::FilteredOut => {
                        Ok(true)
                    }
                    code => Err(Error::Server(code)),
                };
            }

            if header.info_attr.contains(InfoAttr::PARTITION_DONE) {
                skip_fields(&mut buf, header.field_count)?;
                parse_bins(&mut buf, header.operation_count)?;

                // The generation field carries the partition id.
                if header.result_code != ResultCode::Ok {
                    if let Ok(id) = u16::try_from(header.generation) {
                        outcome.unavailable.push(id);
                    }
                }
                continue;
            }

            if header.result_code != ResultCode::Ok {
                return Err(Error::Server(header.result_code));
            }

            let key = parse_key(&mut buf, header.field_count)?;
            let bins = parse_bins(&mut buf, header.operation_count)?;
            let partition_id = key.partition_id() as u16;
            let digest = key.digest();
            let record = Record::new(Some(key), bins, header.generation, header.expiration);

            if tx.send(Ok(record)).await.is_err() {
                return Ok(false);
            }
            outcome.records += 1;
            outcome.last_digests.insert(partition_id, digest);
        }
    }
}
