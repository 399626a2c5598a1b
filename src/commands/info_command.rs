use std::{collections::HashMap, time::Duration};

use tracing::debug;

use super::buffer::{Buffer, ProtoType, RequestBuffer};
use crate::{
    errors::{Error, ParseError, Result},
    net::{Host, Transport},
    ResultCode,
};

/// Send info commands to a single host and collect the `name -> value` pairs of the response.
pub(crate) async fn info(
    transport: &dyn Transport,
    host: &Host,
    commands: &[&str],
    timeout: Option<Duration>,
) -> Result<HashMap<String, String>> {
    let mut request = RequestBuffer::new();
    request.set_info(commands)?;

    let frame = transport.send(host, request.freeze(), timeout).await?;
    parse_response(Buffer::frame(frame, ProtoType::Info)?)
}

fn parse_response(mut buf: Buffer) -> Result<HashMap<String, String>> {
    let response = buf.read_str(buf.remaining())?;
    debug!(?response, "response from server for info command");

    Ok(response
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once('\t') {
            Some((name, value)) => (name.to_owned(), value.to_owned()),
            None => (line.to_owned(), String::new()),
        })
        .collect())
}

/// Turn `ERROR:<code>:<message>` or `FAIL:<code>:<message>` answers into errors.
pub(crate) fn check_response(command: &str, value: &str) -> Result<()> {
    let Some(rest) = value
        .strip_prefix("ERROR")
        .or_else(|| value.strip_prefix("FAIL"))
    else {
        return Ok(());
    };

    let code = rest
        .trim_start_matches(':')
        .split(':')
        .next()
        .and_then(|code| code.trim().parse::<u8>().ok());

    match code {
        Some(code) => Err(Error::Server(ResultCode::from(code))),
        None => Err(ParseError::Info(format!("`{command}` failed: {value}")).into()),
    }
}
