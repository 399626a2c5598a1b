use super::{
    buffer::RequestBuffer,
    read_command::{check_result, parse_record},
    single_command,
};
use crate::{
    cluster::Cluster,
    errors::{Error, Result},
    policies::WritePolicy,
    Key, Record, ResultCode, Value,
};

/// Run a UDF against a single record and return its result value.
pub(crate) async fn execute(
    cluster: &Cluster,
    policy: &WritePolicy,
    key: &Key,
    package: &str,
    function: &str,
    args: &[Value],
) -> Result<Option<Value>> {
    let mut request = RequestBuffer::new();
    request.set_udf(policy, key, package, function, args)?;

    single_command::execute(cluster, policy, key, request.freeze(), |mut buf| {
        let header = buf.read_message_header()?;
        match header.result_code {
            ResultCode::Ok | ResultCode::UdfBadResponse => {
                let record = parse_record(&mut buf, &header, None)?;
                udf_result(header.result_code, record)
            }
            code => check_result(code).map(|()| None),
        }
    })
    .await
}

/// The function's return value is sent back in the `SUCCESS` bin, a runtime error in the
/// `FAILURE` bin.
pub(crate) fn udf_result(code: ResultCode, mut record: Record) -> Result<Option<Value>> {
    if let Some(failure) = record.bins.remove("FAILURE") {
        return Err(Error::Udf {
            code: match code {
                ResultCode::Ok => ResultCode::UdfBadResponse,
                code => code,
            },
            message: failure.into_string().unwrap_or_default(),
        });
    }
    if code != ResultCode::Ok {
        return Err(Error::Server(code));
    }

    Ok(record.bins.remove("SUCCESS"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn success_and_failure_bins() {
        let success = Record::new(
            None,
            HashMap::from([("SUCCESS".to_owned(), Value::Int(3))]),
            1,
            0,
        );
        assert_eq!(
            Some(Value::Int(3)),
            udf_result(ResultCode::Ok, success).unwrap()
        );

        let failure = Record::new(
            None,
            HashMap::from([("FAILURE".to_owned(), Value::from("function not found"))]),
            1,
            0,
        );
        assert!(matches!(
            udf_result(ResultCode::UdfBadResponse, failure),
            Err(Error::Udf { code: ResultCode::UdfBadResponse, message }) if message == "function not found"
        ));
    }
}
