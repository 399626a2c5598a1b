use super::{
    buffer::RequestBuffer,
    read_command::{check_result, parse_record},
    single_command,
};
use crate::{
    cluster::Cluster, errors::Result, operations::Operation, policies::WritePolicy, Key, Record,
};

/// Apply several operations to one record, in the given order, and collect the results of the
/// read operations.
pub(crate) async fn execute(
    cluster: &Cluster,
    policy: &WritePolicy,
    key: &Key,
    operations: &[Operation],
) -> Result<Record> {
    let mut request = RequestBuffer::new();
    request.set_operate(policy, key, operations)?;

    single_command::execute(cluster, policy, key, request.freeze(), |mut buf| {
        let header = buf.read_message_header()?;
        check_result(header.result_code)?;
        parse_record(&mut buf, &header, None)
    })
    .await
}
