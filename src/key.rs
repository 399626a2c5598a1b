use std::{borrow::Cow, fmt};

use ripemd::{Digest, Ripemd160};

use crate::{
    cluster::partition::PARTITIONS,
    commands::{buffer::Buffer, ParticleType},
    msgpack,
    value::{ParticleError, Value},
};

/// Length of a record digest in bytes.
pub const DIGEST_SIZE: usize = 20;

/// Unique record identifier. Records can be identified using a specified namespace, an optional
/// set name and a user defined key which must be unique within a set. Records can also be
/// identified by namespace/digest, which is the combination used on the server.
///
/// The namespace is not part of the digest, it only selects the partition map a key is routed
/// through.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Key {
    pub namespace: Cow<'static, str>,
    pub set_name: Cow<'static, str>,
    /// Original user key. Absent for keys rebuilt from a digest, for example in scan results of
    /// records that were written without sending the key.
    pub user_key: Option<UserKey>,
    pub(crate) digest: [u8; DIGEST_SIZE],
}

impl Key {
    /// Construct a new key given a namespace, a set name and a user key value.
    pub fn new<N, S, K>(namespace: N, set_name: S, key: K) -> Self
    where
        N: Into<Cow<'static, str>>,
        S: Into<Cow<'static, str>>,
        K: Into<UserKey>,
    {
        let set_name = set_name.into();
        let user_key = key.into();
        let digest = compute_digest(&set_name, &user_key);

        Self {
            namespace: namespace.into(),
            set_name,
            user_key: Some(user_key),
            digest,
        }
    }

    /// Construct a key from an arbitrary [`Value`]. Only integers, strings and blobs identify
    /// records, any other value is rejected before anything is sent to the server.
    pub fn from_value<N, S>(namespace: N, set_name: S, key: Value) -> Result<Self, ParticleError>
    where
        N: Into<Cow<'static, str>>,
        S: Into<Cow<'static, str>>,
    {
        UserKey::try_from(key).map(|key| Self::new(namespace, set_name, key))
    }

    /// Construct a key from a precomputed digest.
    pub fn from_digest<N, S>(namespace: N, set_name: S, digest: [u8; DIGEST_SIZE]) -> Self
    where
        N: Into<Cow<'static, str>>,
        S: Into<Cow<'static, str>>,
    {
        Self {
            namespace: namespace.into(),
            set_name: set_name.into(),
            user_key: None,
            digest,
        }
    }

    #[must_use]
    pub fn digest(&self) -> [u8; DIGEST_SIZE] {
        self.digest
    }

    /// Partition this key is stored in.
    #[must_use]
    pub fn partition_id(&self) -> usize {
        partition_for_digest(&self.digest)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:", self.namespace, self.set_name)?;
        match &self.user_key {
            Some(key) => key.fmt(f),
            None => self.digest.iter().try_for_each(|b| write!(f, "{b:02x}")),
        }
    }
}

/// RIPEMD-160 over the set name, the key's particle type and the key bytes. Integers are hashed
/// as 8 byte big-endian values.
fn compute_digest(set_name: &str, user_key: &UserKey) -> [u8; DIGEST_SIZE] {
    let mut hash = Ripemd160::new();
    hash.update(set_name.as_bytes());
    hash.update([user_key.particle_type() as u8]);
    match user_key {
        UserKey::Int(i) => hash.update(i.to_be_bytes()),
        UserKey::String(s) => hash.update(s.as_bytes()),
        UserKey::Blob(b) => hash.update(b),
    }

    hash.finalize().into()
}

/// The first 4 digest bytes, read as little-endian integer, select one of the
/// [`PARTITIONS`].
pub(crate) fn partition_for_digest(digest: &[u8; DIGEST_SIZE]) -> usize {
    let id = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
    id as usize % PARTITIONS
}

/// The user key, which is a subset of the [`Value`] type, as only a few of its variants are
/// allowed to be used in keys.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UserKey {
    Int(i64),
    String(Cow<'static, str>),
    Blob(Cow<'static, [u8]>),
}

impl UserKey {
    pub(crate) fn particle_type(&self) -> ParticleType {
        match self {
            Self::Int(_) => ParticleType::Integer,
            Self::String(_) => ParticleType::String,
            Self::Blob(_) => ParticleType::Blob,
        }
    }

    pub(crate) fn estimate_size(&self) -> usize {
        self.write_to(&mut msgpack::Sink)
    }

    pub(crate) fn write_to(&self, w: &mut impl msgpack::Write) -> usize {
        match self {
            Self::Int(i) => w.write_i64(*i),
            Self::String(s) => w.write_str(s),
            Self::Blob(b) => w.write_bytes(b),
        }
    }

    pub(crate) fn read_from(
        ptype: u8,
        buf: &mut Buffer,
        len: usize,
    ) -> Result<Self, ParticleError> {
        Ok(match ParticleType::try_from(ptype)? {
            ParticleType::Integer => Self::Int(buf.read_i64()?),
            ParticleType::String => Self::String(buf.read_str(len)?.into()),
            ParticleType::Blob => Self::Blob(buf.read_blob(len)?.into()),
            _ => return Err(ParticleError::Unsupported(ptype)),
        })
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => i.fmt(f),
            Self::String(s) => s.fmt(f),
            Self::Blob(b) => write!(f, "{b:?}"),
        }
    }
}

impl TryFrom<Value> for UserKey {
    type Error = ParticleError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::Int(i) => Self::Int(i),
            Value::Uint(u) => {
                Self::Int(i64::try_from(u).map_err(|_| ParticleError::UintOutOfRange(u))?)
            }
            Value::String(s) => Self::String(s.into()),
            Value::Blob(b) => Self::Blob(b.into()),
            other => return Err(ParticleError::Unsupported(other.particle_type() as u8)),
        })
    }
}

impl From<UserKey> for Value {
    fn from(value: UserKey) -> Self {
        match value {
            UserKey::Int(i) => Self::Int(i),
            UserKey::String(s) => Self::String(s.into_owned()),
            UserKey::Blob(b) => Self::Blob(b.into_owned()),
        }
    }
}

macro_rules! from_int {
    ($($ty:ty),+) => {
        $(impl From<$ty> for UserKey {
            fn from(value: $ty) -> Self {
                Self::Int(value.into())
            }
        })+
    };
}

from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<String> for UserKey {
    fn from(value: String) -> Self {
        Self::String(value.into())
    }
}

impl From<&'static str> for UserKey {
    fn from(value: &'static str) -> Self {
        Self::String(value.into())
    }
}

impl From<Cow<'static, str>> for UserKey {
    fn from(value: Cow<'static, str>) -> Self {
        Self::String(value)
    }
}

impl From<Vec<u8>> for UserKey {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value.into())
    }
}

impl From<&'static [u8]> for UserKey {
    fn from(value: &'static [u8]) -> Self {
        Self::Blob(value.into())
    }
}
