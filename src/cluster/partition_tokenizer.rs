use base64::{engine::general_purpose::STANDARD, Engine};

use super::partition::PARTITIONS;
use crate::errors::ParseError;

/// Info command listing the partitions a node is master of.
pub(crate) const REPLICAS_MASTER: &str = "replicas-master";

/// Split the `replicas-master` response `ns1:bitmap;ns2:bitmap` into the namespaces and their
/// decoded ownership bitmaps.
pub(crate) fn parse_replicas_master(value: &str) -> Result<Vec<(String, Vec<u8>)>, ParseError> {
    value
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (namespace, bitmap) = part.split_once(':').ok_or_else(|| {
                ParseError::Info(format!("malformed {REPLICAS_MASTER} entry `{part}`"))
            })?;

            let bitmap = STANDARD.decode(bitmap)?;
            if bitmap.len() != PARTITIONS / 8 {
                return Err(ParseError::Info(format!(
                    "partition bitmap of namespace `{namespace}` has {} bytes, expected {}",
                    bitmap.len(),
                    PARTITIONS / 8
                )));
            }

            Ok((namespace.to_owned(), bitmap))
        })
        .collect()
}
