use std::collections::{hash_map::Entry, HashMap, HashSet};

use super::{
    buffer::{Buffer, MessageHeader, RequestBuffer},
    field_type::FieldType,
    single_command,
};
use crate::{
    cluster::Cluster,
    errors::{Error, ParseError, Result},
    key::{UserKey, DIGEST_SIZE},
    policies::BasePolicy,
    Bins, Key, Record, ResultCode, Value,
};

/// Read a record. A missing record is not an error, but `None`.
pub(crate) async fn execute(
    cluster: &Cluster,
    policy: &BasePolicy,
    key: &Key,
    bins: &Bins,
) -> Result<Option<Record>> {
    let mut request = RequestBuffer::new();
    request.set_read(policy, key, bins)?;

    single_command::execute(cluster, policy, key, request.freeze(), |mut buf| {
        let header = buf.read_message_header()?;
        match header.result_code {
            ResultCode::KeyNotFoundError => Ok(None),
            _ => {
                check_result(header.result_code)?;
                parse_record(&mut buf, &header, None).map(Some)
            }
        }
    })
    .await
}

/// Turn the result code of a single record response into an error, unless it reports success.
pub(crate) fn check_result(code: ResultCode) -> Result<()> {
    match code {
        ResultCode::Ok => Ok(()),
        ResultCode::FilteredOut => Err(Error::FilteredOut),
        code => Err(Error::Server(code)),
    }
}

/// Parse the fields and bins following a message header into a record.
pub(crate) fn parse_record(
    buf: &mut Buffer,
    header: &MessageHeader,
    key: Option<Key>,
) -> Result<Record> {
    skip_fields(buf, header.field_count)?;
    let bins = parse_bins(buf, header.operation_count)?;

    Ok(Record::new(key, bins, header.generation, header.expiration))
}

pub(crate) fn skip_fields(buf: &mut Buffer, field_count: u16) -> Result<()> {
    for _ in 0..field_count {
        let size = buf.read_u32()? as usize;
        buf.skip(size)?;
    }
    Ok(())
}

/// Read the bins of a record. List and map operations can return several values for the same
/// bin, these are collected into a list.
pub(crate) fn parse_bins(buf: &mut Buffer, op_count: u16) -> Result<HashMap<String, Value>> {
    let mut bins = HashMap::with_capacity(op_count.into());
    let mut repeated = HashSet::new();

    for _ in 0..op_count {
        let op_size = buf.read_u32()? as usize;
        buf.skip(1)?;
        let particle_type = buf.read_u8()?;
        buf.skip(1)?;
        let name_size = usize::from(buf.read_u8()?);
        let name = buf.read_str(name_size)?;

        let value_size = op_size.checked_sub(4 + name_size).ok_or_else(|| {
            ParseError::Info(format!("operation size {op_size} too small for bin `{name}`"))
        })?;
        let value =
            Value::read_from(buf, particle_type, value_size).map_err(ParseError::from)?;

        match bins.entry(name) {
            Entry::Vacant(entry) => {
                entry.insert(value);
            }
            Entry::Occupied(mut entry) => {
                if repeated.contains(entry.key()) {
                    if let Value::List(list) = entry.get_mut() {
                        list.push(value);
                    }
                } else {
                    repeated.insert(entry.key().clone());
                    let first = std::mem::replace(entry.get_mut(), Value::Nil);
                    *entry.get_mut() = Value::List(vec![first, value]);
                }
            }
        }
    }

    Ok(bins)
}

/// Rebuild the key of a record from the namespace, set, digest and user key fields of a
/// response.
pub(crate) fn parse_key(buf: &mut Buffer, field_count: u16) -> Result<Key> {
    let mut namespace = String::new();
    let mut set_name = String::new();
    let mut digest = [0; DIGEST_SIZE];
    let mut user_key = None;

    for _ in 0..field_count {
        let size = buf.read_u32()? as usize;
        let Some(data_size) = size.checked_sub(1) else {
            return Err(ParseError::Info("empty field in response".to_owned()).into());
        };

        match buf.read_u8()? {
            ty if ty == FieldType::Namespace as u8 => namespace = buf.read_str(data_size)?,
            ty if ty == FieldType::Table as u8 => set_name = buf.read_str(data_size)?,
            ty if ty == FieldType::DigestRipe as u8 && data_size == DIGEST_SIZE => {
                digest.copy_from_slice(&buf.read_blob(DIGEST_SIZE)?);
            }
            ty if ty == FieldType::Key as u8 && data_size > 0 => {
                let particle_type = buf.read_u8()?;
                user_key = Some(
                    UserKey::read_from(particle_type, buf, data_size - 1)
                        .map_err(ParseError::from)?,
                );
            }
            _ => buf.skip(data_size)?,
        }
    }

    let mut key = Key::from_digest(namespace, set_name, digest);
    key.user_key = user_key;
    Ok(key)
}
