use std::{collections::HashSet, time::Duration};

use bytes::Bytes;

use super::{
    buffer::{Buffer, ProtoType, RequestBuffer},
    read_command::{parse_bins, skip_fields},
};
use crate::{
    batch::BatchOperation,
    cluster::Node,
    errors::{Error, ParseError, Result},
    net::FrameStream,
    policies::BatchPolicy,
    Record, ResultCode,
};

/// Result of one batch entry, as reported by the server.
#[derive(Debug)]
pub(crate) struct EntryResult {
    pub(crate) index: u32,
    pub(crate) result_code: ResultCode,
    pub(crate) record: Option<Record>,
}

/// Send the entries that belong to one node in a single request and collect the per-entry
/// results.
pub(crate) async fn execute(
    node: &Node,
    policy: &BatchPolicy,
    entries: &[(u32, &BatchOperation)],
    timeout: Option<Duration>,
) -> Result<Vec<EntryResult>> {
    let mut request = RequestBuffer::new();
    request.set_batch(policy, entries)?;
    let request = request.freeze();

    let mut stream = node
        .transport()
        .stream(node.host(), request, timeout)
        .await?;

    let expected: HashSet<u32> = entries.iter().map(|(index, _)| *index).collect();
    let mut results = Vec::with_capacity(entries.len());
    let outcome = read_results(stream.as_mut(), &expected, &mut results).await;

    stream.finish(outcome.is_ok()).await;
    outcome.map(|()| results)
}

async fn read_results(
    stream: &mut dyn FrameStream,
    expected: &HashSet<u32>,
    results: &mut Vec<EntryResult>,
) -> Result<()> {
    loop {
        let frame = stream.next_frame().await?;
        if parse_frame(frame, expected, results)? {
            return Ok(());
        }
    }
}

/// Parse all messages of one response frame. Returns `true` once the last message of the
/// response was read.
pub(crate) fn parse_frame(
    frame: Bytes,
    expected: &HashSet<u32>,
    results: &mut Vec<EntryResult>,
) -> Result<bool> {
    let mut buf = Buffer::frame(frame, ProtoType::Message)?;

    while !buf.is_empty() {
        let header = buf.read_message_header()?;

        if header.is_last() {
            return match header.result_code {
                ResultCode::Ok => Ok(true),
                code => Err(Error::Server(code)),
            };
        }

        // The server reports the position of the entry in the request in the timeout field.
        let index = header.timeout;
        if !expected.contains(&index) {
            return Err(ParseError::BatchIndex(index).into());
        }

        skip_fields(&mut buf, header.field_count)?;
        let record = match header.result_code {
            ResultCode::Ok | ResultCode::UdfBadResponse => {
                let bins = parse_bins(&mut buf, header.operation_count)?;
                Some(Record::new(None, bins, header.generation, header.expiration))
            }
            _ => {
                parse_bins(&mut buf, header.operation_count)?;
                None
            }
        };

        results.push(EntryResult {
            index,
            result_code: header.result_code,
            record,
        });
    }

    Ok(false)
}
