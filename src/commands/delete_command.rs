use super::{buffer::RequestBuffer, read_command::check_result, single_command};
use crate::{cluster::Cluster, errors::Result, policies::WritePolicy, Key, ResultCode};

/// Delete a record, returning whether it existed.
pub(crate) async fn execute(cluster: &Cluster, policy: &WritePolicy, key: &Key) -> Result<bool> {
    let mut request = RequestBuffer::new();
    request.set_delete(policy, key)?;

    single_command::execute(cluster, policy, key, request.freeze(), |mut buf| {
        match buf.read_message_header()?.result_code {
            ResultCode::KeyNotFoundError => Ok(false),
            code => check_result(code).map(|()| true),
        }
    })
    .await
}
