use std::{collections::HashMap, fmt};

use ordered_float::OrderedFloat;

use crate::{
    commands::{
        buffer::{Buffer, BufferError},
        ParseParticleError, ParticleType,
    },
    msgpack::{self, decoder, encoder, MsgpackError},
};

macro_rules! from {
    ($to:ty, $variant:ident, $($from:ty),+) => {
        $(impl From<$from> for $to {
            fn from(value: $from) -> Self {
                Self::$variant(value.into())
            }
        })+
    };
}

/// Container for floating point values.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FloatValue {
    /// 32-bit floating point number.
    F32(OrderedFloat<f32>),
    /// 64-bit floating point number.
    F64(OrderedFloat<f64>),
}

impl FloatValue {
    /// Widen the number to an `f64`, regardless of the stored precision.
    ///
    /// ```
    /// # use windpike::FloatValue;
    /// assert_eq!(2.5, FloatValue::from(2.5_f32).to_f64());
    /// ```
    #[must_use]
    pub fn to_f64(self) -> f64 {
        match self {
            Self::F32(value) => value.0.into(),
            Self::F64(value) => value.0,
        }
    }

    #[must_use]
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::F32(value) => Some(value.0),
            Self::F64(_) => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F32(_) => None,
            Self::F64(value) => Some(value.0),
        }
    }
}

from!(FloatValue, F32, f32);
from!(FloatValue, F64, f64);

impl fmt::Display for FloatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::F32(value) => value.fmt(f),
            Self::F64(value) => value.fmt(f),
        }
    }
}

/// Key of a [`Value::HashMap`] entry. Only scalar values can be used as map keys, collections
/// and the special range markers are rejected when converting from a [`Value`].
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum MapKey {
    Int(i64),
    Uint(u64),
    Float(FloatValue),
    String(String),
    Blob(Vec<u8>),
}

impl MapKey {
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_string(self) -> Option<String> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }
}

from!(MapKey, Int, i8, i16, i32, i64, u8, u16, u32);
from!(MapKey, Uint, u64);
from!(MapKey, Float, f32, f64);
from!(MapKey, String, &str, String);
from!(MapKey, Blob, &[u8], Vec<u8>);

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => value.fmt(f),
            Self::Uint(value) => value.fmt(f),
            Self::Float(value) => value.fmt(f),
            Self::String(value) => value.fmt(f),
            Self::Blob(value) => write!(f, "{value:?}"),
        }
    }
}

impl TryFrom<Value> for MapKey {
    type Error = ParticleError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::Int(v) => Self::Int(v),
            Value::Uint(v) => Self::Uint(v),
            Value::Float(v) => Self::Float(v),
            Value::String(v) => Self::String(v),
            Value::Blob(v) => Self::Blob(v),
            other => return Err(ParticleError::InvalidMapKey(other.type_name())),
        })
    }
}

/// Container for bin values and the elements of collection data types.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    /// Empty value. Writing it to a bin removes the bin.
    Nil,
    Bool(bool),
    /// 64-bit signed integer. All integers of a record bin are stored as signed 64-bit numbers.
    Int(i64),
    /// 64-bit unsigned integer.
    ///
    /// Only values that fit into [`i64`] can be stored in a bin directly. Larger values are only
    /// accepted inside [`Self::List`] and [`Self::HashMap`], where they keep their unsigned tag
    /// through a full write/read cycle. Unsigned values within the signed range come back as
    /// [`Self::Int`].
    Uint(u64),
    /// 32-bit or 64-bit floating point number. Bins always store 64-bit precision.
    Float(FloatValue),
    String(String),
    /// Byte vector value.
    Blob(Vec<u8>),
    /// Ordered collection of values, that can contain any other value.
    List(Vec<Value>),
    /// Key-value collection. The ordering the server applies is chosen by the
    /// [`MapPolicy`](crate::operations::maps::MapPolicy) of the write, not by the value itself.
    HashMap(HashMap<MapKey, Value>),
    /// String value containing GeoJSON. Malformed content is rejected by the server.
    GeoJson(String),
    /// [HyperLogLog](https://docs.aerospike.com/server/guide/data-types/hll) value.
    Hll(Vec<u8>),
    /// Upper bound that compares greater than any other value. Only valid as a range boundary in
    /// collection operations.
    Infinity,
    /// Matches any value at its position. Only valid inside range boundaries of collection
    /// operations, for example to select list entries by their first element.
    Wildcard,
}

impl Value {
    /// Human readable name of the variant, used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Uint(_) => "uint",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Blob(_) => "blob",
            Self::List(_) => "list",
            Self::HashMap(_) => "map",
            Self::GeoJson(_) => "geojson",
            Self::Hll(_) => "hll",
            Self::Infinity => "infinity",
            Self::Wildcard => "wildcard",
        }
    }

    /// Determine the particle type for the value used in the wire protocol. Unsigned integers are
    /// sent as signed ones, see [`Self::check_bin_value`] for the values that can't be stored at
    /// all.
    pub(crate) fn particle_type(&self) -> ParticleType {
        match self {
            Self::Nil | Self::Infinity | Self::Wildcard => ParticleType::Null,
            Self::Bool(_) => ParticleType::Bool,
            Self::Int(_) | Self::Uint(_) => ParticleType::Integer,
            Self::Float(_) => ParticleType::Float,
            Self::String(_) => ParticleType::String,
            Self::Blob(_) => ParticleType::Blob,
            Self::List(_) => ParticleType::List,
            Self::HashMap(_) => ParticleType::Map,
            Self::GeoJson(_) => ParticleType::GeoJson,
            Self::Hll(_) => ParticleType::Hll,
        }
    }

    /// Ensure the value can be stored as the top-level value of a bin.
    pub(crate) fn check_bin_value(&self) -> Result<(), ParticleError> {
        match self {
            Self::Uint(v) if i64::try_from(*v).is_err() => Err(ParticleError::UintOutOfRange(*v)),
            Self::Infinity | Self::Wildcard => Err(ParticleError::NotABinValue(self.type_name())),
            _ => Ok(()),
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// If this value is a signed integer, return it. Unsigned values that fit are converted.
    ///
    /// ```
    /// # use windpike::Value;
    /// assert_eq!(Some(10), Value::from(10_i64).as_i64());
    /// assert_eq!(Some(10), Value::Uint(10).as_i64());
    /// assert_eq!(None, Value::Uint(u64::MAX).as_i64());
    /// ```
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Uint(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Uint(value) => Some(*value),
            _ => None,
        }
    }

    /// If this value is a floating point number, return it widened to `f64`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(value.to_f64()),
            _ => None,
        }
    }

    /// If this value is a string (or GeoJSON string), return the associated `&str`.
    ///
    /// ```
    /// # use windpike::Value;
    /// let v = Value::from("value");
    ///
    /// assert_eq!(Some("value"), v.as_str());
    /// assert_eq!(None, v.as_i64());
    /// ```
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) | Self::GeoJson(value) => Some(value.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(value) | Self::Hll(value) => Some(value.as_slice()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(value) => Some(value.as_slice()),
            _ => None,
        }
    }

    /// If this value is a map, return the associated `&HashMap<MapKey, Value>`.
    ///
    /// ```
    /// # use std::collections::HashMap;
    /// # use windpike::{MapKey, Value};
    /// let v = Value::from([(MapKey::from("a"), Value::from(1))]);
    ///
    /// assert_eq!(Some(&HashMap::from([("a".into(), 1.into())])), v.as_hash_map());
    /// ```
    #[must_use]
    pub fn as_hash_map(&self) -> Option<&HashMap<MapKey, Value>> {
        match self {
            Self::HashMap(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_string(self) -> Option<String> {
        match self {
            Self::String(value) | Self::GeoJson(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Blob(value) | Self::Hll(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_list(self) -> Option<Vec<Value>> {
        match self {
            Self::List(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_hash_map(self) -> Option<HashMap<MapKey, Value>> {
        match self {
            Self::HashMap(value) => Some(value),
            _ => None,
        }
    }

    /// Size of the value when written as the payload of a bin operation.
    pub(crate) fn estimate_size(&self) -> usize {
        self.write_to(&mut msgpack::Sink)
    }

    /// Serialize the value as the payload of a bin operation.
    pub(crate) fn write_to(&self, w: &mut impl msgpack::Write) -> usize {
        match self {
            Self::Nil | Self::Infinity | Self::Wildcard => 0,
            Self::Bool(value) => w.write_bool(*value),
            Self::Int(value) => w.write_i64(*value),
            Self::Uint(value) => w.write_u64(*value),
            Self::Float(value) => w.write_f64(value.to_f64()),
            Self::String(value) => w.write_str(value),
            Self::Blob(value) | Self::Hll(value) => w.write_bytes(value),
            Self::List(_) | Self::HashMap(_) => encoder::pack_value(w, self),
            Self::GeoJson(value) => w.write_geo(value),
        }
    }

    /// Deserialize the payload of a bin operation.
    pub(crate) fn read_from(
        buf: &mut Buffer,
        particle_type: u8,
        length: usize,
    ) -> Result<Self, ParticleError> {
        Ok(match ParticleType::try_from(particle_type)? {
            ParticleType::Null => Self::Nil,
            ParticleType::Integer => Self::Int(buf.read_i64()?),
            ParticleType::Float => Self::from(buf.read_f64()?),
            ParticleType::String => Self::String(buf.read_str(length)?),
            ParticleType::Blob => Self::Blob(buf.read_blob(length)?),
            ParticleType::Bool => Self::Bool(buf.read_u8()? != 0),
            ParticleType::Hll => Self::Hll(buf.read_blob(length)?),
            ParticleType::Map => {
                let mut inner = buf.split_to(length)?;
                decoder::unpack_value_map(&mut inner)?
            }
            ParticleType::List => {
                let mut inner = buf.split_to(length)?;
                decoder::unpack_value_list(&mut inner)?
            }
            ParticleType::GeoJson => {
                buf.skip(1)?;
                let cells = usize::from(buf.read_u16()?);
                buf.skip(cells * 8)?;
                let header = 3 + cells * 8;
                let len = length
                    .checked_sub(header)
                    .ok_or(ParticleError::Buffer(BufferError::Underflow {
                        needed: header,
                        remaining: length,
                    }))?;
                Self::GeoJson(buf.read_str(len)?)
            }
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("<null>"),
            Self::Int(value) => value.fmt(f),
            Self::Uint(value) => value.fmt(f),
            Self::Bool(value) => value.fmt(f),
            Self::Float(value) => value.fmt(f),
            Self::String(value) | Self::GeoJson(value) => value.fmt(f),
            Self::Blob(value) | Self::Hll(value) => write!(f, "{value:?}"),
            Self::List(value) => write!(f, "{value:?}"),
            Self::HashMap(value) => write!(f, "{value:?}"),
            Self::Infinity => f.write_str("<infinity>"),
            Self::Wildcard => f.write_str("<wildcard>"),
        }
    }
}

from!(Value, Bool, bool);
from!(Value, Int, i8, i16, i32, i64, u8, u16, u32);
from!(Value, Uint, u64);
from!(Value, Float, f32, f64);
from!(Value, String, &str, String);
from!(Value, Blob, &[u8], Vec<u8>);
from!(Value, List, &[Self], Vec<Self>);
from!(Value, HashMap, HashMap<MapKey, Self>);

impl From<FloatValue> for Value {
    fn from(value: FloatValue) -> Self {
        Self::Float(value)
    }
}

impl<const N: usize> From<[u8; N]> for Value {
    fn from(value: [u8; N]) -> Self {
        Self::Blob(value.into())
    }
}

impl<const N: usize> From<[Value; N]> for Value {
    fn from(value: [Value; N]) -> Self {
        Self::List(value.into())
    }
}

impl<const N: usize> From<[(MapKey, Self); N]> for Value {
    fn from(value: [(MapKey, Self); N]) -> Self {
        Self::HashMap(value.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Nil, Into::into)
    }
}

impl From<MapKey> for Value {
    fn from(value: MapKey) -> Self {
        match value {
            MapKey::Int(value) => Self::Int(value),
            MapKey::Uint(value) => Self::Uint(value),
            MapKey::Float(value) => Self::Float(value),
            MapKey::String(value) => Self::String(value),
            MapKey::Blob(value) => Self::Blob(value),
        }
    }
}

/// Errors that can happen when converting values from or into their wire format.
#[derive(Debug, thiserror::Error)]
pub enum ParticleError {
    #[error("particle type not recognized")]
    UnrecognizedParticle(#[from] ParseParticleError),
    #[error("particle type `{0}` not supported for the target type")]
    Unsupported(u8),
    #[error("unsigned integer {0} exceeds the range a bin can hold")]
    UintOutOfRange(u64),
    #[error("a {0} value can't be stored in a bin")]
    NotABinValue(&'static str),
    #[error("a {0} value can't be used as map key")]
    InvalidMapKey(&'static str),
    #[error("buffer error")]
    Buffer(#[from] BufferError),
    #[error("MessagePack error")]
    Msgpack(#[from] MsgpackError),
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, BytesMut};

    use super::*;

    #[test]
    fn as_string() {
        assert_eq!(Value::Nil.to_string(), String::from("<null>"));
        assert_eq!(Value::Int(42).to_string(), String::from("42"));
        assert_eq!(
            Value::Uint(9_223_372_036_854_775_808).to_string(),
            String::from("9223372036854775808")
        );
        assert_eq!(Value::Bool(true).to_string(), String::from("true"));
        assert_eq!(Value::from(4.1416).to_string(), String::from("4.1416"));
        assert_eq!(
            Value::GeoJson(r#"{"type":"Point"}"#.to_owned()).to_string(),
            String::from(r#"{"type":"Point"}"#)
        );
    }

    #[test]
    fn bin_values() {
        assert!(Value::Uint(5).check_bin_value().is_ok());
        assert!(matches!(
            Value::Uint(u64::MAX).check_bin_value(),
            Err(ParticleError::UintOutOfRange(_))
        ));
        assert!(matches!(
            Value::Infinity.check_bin_value(),
            Err(ParticleError::NotABinValue("infinity"))
        ));
        assert!(Value::List(vec![Value::Uint(u64::MAX)])
            .check_bin_value()
            .is_ok());
    }

    #[test]
    fn collections_are_not_map_keys() {
        assert!(MapKey::try_from(Value::from("a")).is_ok());
        assert!(matches!(
            MapKey::try_from(Value::List(vec![])),
            Err(ParticleError::InvalidMapKey("list"))
        ));
    }

    fn read_back(value: &Value) -> Value {
        let mut raw = BytesMut::new();
        let len = value.write_to(&mut raw);
        assert_eq!(len, value.estimate_size());
        let mut buf = Buffer::from(raw.freeze());
        Value::read_from(&mut buf, value.particle_type() as u8, len).unwrap()
    }

    #[test]
    fn bin_payload_round_trip() {
        for value in [
            Value::Int(i64::MIN),
            Value::Int(i64::MAX),
            Value::from(-0.5_f64),
            Value::from(""),
            Value::Blob(vec![]),
            Value::Bool(false),
            Value::List(vec![]),
            Value::HashMap(HashMap::new()),
            Value::List(vec![Value::List(vec![Value::Uint(u64::MAX), Value::Nil])]),
            Value::GeoJson(r#"{"type":"Point","coordinates":[1,2]}"#.to_owned()),
            Value::Hll(vec![1, 2, 3]),
        ] {
            assert_eq!(value, read_back(&value));
        }
    }

    #[test]
    fn geo_with_cells() {
        let mut raw = BytesMut::new();
        raw.put_u8(0);
        raw.put_u16(1);
        raw.put_u64(0xdead_beef);
        raw.put_slice(b"{}");
        let len = raw.len();
        let mut buf = Buffer::from(raw.freeze());
        assert_eq!(
            Value::GeoJson("{}".to_owned()),
            Value::read_from(&mut buf, ParticleType::GeoJson as u8, len).unwrap()
        );
    }
}
