use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use super::{
    buffer::{Buffer, ProtoType, RequestBuffer},
    read_command::check_result,
};
use crate::{
    cluster::{Cluster, ClusterError},
    errors::{Error, Result},
    policies::{Policy, WritePolicy},
    query::Statement,
    task::ExecuteTask,
    Value,
};

/// Start a UDF on every record that matches the statement. The server runs the function in the
/// background, the returned task tracks its progress.
pub(crate) async fn execute(
    cluster: &Arc<Cluster>,
    policy: &WritePolicy,
    statement: &Statement,
    package: &str,
    function: &str,
    args: &[Value],
) -> Result<ExecuteTask> {
    policy.validate()?;
    if cluster.is_closed() {
        return Err(ClusterError::Closed.into());
    }

    let nodes = cluster.nodes().await;
    if nodes.is_empty() {
        return Err(Error::NoNodes);
    }

    let task_id = rand::thread_rng().gen();
    let mut request = RequestBuffer::new();
    request.set_background_udf(policy, statement, task_id, package, function, args)?;
    let request = request.freeze();

    let deadline = policy.deadline();
    for node in &nodes {
        debug!(%node, task_id, package, function, "starting background UDF");
        let frame = node
            .transport()
            .send(node.host(), request.clone(), policy.attempt_timeout(deadline))
            .await?;

        let mut buf = Buffer::frame(frame, ProtoType::Message)?;
        check_result(buf.read_message_header()?.result_code)?;
    }

    Ok(ExecuteTask::new(Arc::clone(cluster), task_id))
}
