use super::{buffer::RequestBuffer, read_command::check_result, single_command};
use crate::{cluster::Cluster, errors::Result, policies::WritePolicy, Key};

/// Reset the expiration of a record and increase its generation, without changing any bins.
pub(crate) async fn execute(cluster: &Cluster, policy: &WritePolicy, key: &Key) -> Result<()> {
    let mut request = RequestBuffer::new();
    request.set_touch(policy, key)?;

    single_command::execute(cluster, policy, key, request.freeze(), |mut buf| {
        check_result(buf.read_message_header()?.result_code)
    })
    .await
}
