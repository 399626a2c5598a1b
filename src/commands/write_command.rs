use super::{buffer::RequestBuffer, read_command::check_result, single_command};
use crate::{
    cluster::Cluster, errors::Result, operations::OperationType, policies::WritePolicy, Bin, Key,
};

/// Write bins with one of the put, append, prepend or add operation types.
pub(crate) async fn execute(
    cluster: &Cluster,
    policy: &WritePolicy,
    key: &Key,
    bins: &[Bin<'_>],
    operation: OperationType,
) -> Result<()> {
    let mut request = RequestBuffer::new();
    request.set_write(policy, operation, key, bins)?;

    single_command::execute(cluster, policy, key, request.freeze(), |mut buf| {
        check_result(buf.read_message_header()?.result_code)
    })
    .await
}
