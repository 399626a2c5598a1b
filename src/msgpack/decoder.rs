use std::collections::HashMap;

use tracing::warn;

use super::{Marker, MsgpackError, Result};
use crate::{
    commands::{buffer::Buffer, ParticleType},
    value::{MapKey, Value},
};

const EXT_SPECIAL: u8 = 0xff;

pub(crate) fn unpack_value_list(buf: &mut Buffer) -> Result<Value> {
    if buf.is_empty() {
        return Ok(Value::List(Vec::new()));
    }

    match unpack_value(buf)? {
        value @ Value::List(_) => Ok(value),
        other => Err(MsgpackError::UnexpectedValue {
            expected: "list",
            got: other.type_name(),
        }),
    }
}

pub(crate) fn unpack_value_map(buf: &mut Buffer) -> Result<Value> {
    if buf.is_empty() {
        return Ok(Value::HashMap(HashMap::new()));
    }

    match unpack_value(buf)? {
        value @ Value::HashMap(_) => Ok(value),
        other => Err(MsgpackError::UnexpectedValue {
            expected: "map",
            got: other.type_name(),
        }),
    }
}

/// Collections coming from the server may start with an extension element holding the
/// collection's ordering flags. It carries no user data and is dropped.
fn starts_with_header(buf: &Buffer) -> bool {
    let Some(marker) = buf.peek() else {
        return false;
    };

    match Marker::from(marker) {
        Marker::FixExt1 => buf.peek_at(1) != Some(EXT_SPECIAL),
        marker => marker.is_ext(),
    }
}

fn unpack_array(buf: &mut Buffer, mut count: usize) -> Result<Value> {
    if count > 0 && starts_with_header(buf) {
        unpack_value(buf)?;
        count -= 1;
    }

    let mut list = Vec::with_capacity(count.min(buf.remaining()));
    for _ in 0..count {
        list.push(unpack_value(buf)?);
    }

    Ok(Value::List(list))
}

fn unpack_map(buf: &mut Buffer, mut count: usize) -> Result<Value> {
    if count > 0 && starts_with_header(buf) {
        unpack_value(buf)?;
        unpack_value(buf)?;
        count -= 1;
    }

    let mut map = HashMap::with_capacity(count.min(buf.remaining()));
    for _ in 0..count {
        let key = unpack_map_key(buf)?;
        let val = unpack_value(buf)?;
        map.insert(key, val);
    }

    Ok(Value::HashMap(map))
}

fn unpack_blob(buf: &mut Buffer, count: usize) -> Result<Value> {
    if count == 0 {
        return Ok(Value::String(String::new()));
    }

    let vtype = buf.read_u8()?;
    let count = count - 1;

    match ParticleType::try_from(vtype)? {
        ParticleType::String => Ok(Value::String(buf.read_str(count)?)),
        ParticleType::Blob => Ok(Value::Blob(buf.read_blob(count)?)),
        ParticleType::GeoJson => Ok(Value::GeoJson(buf.read_str(count)?)),
        ParticleType::Hll => Ok(Value::Hll(buf.read_blob(count)?)),
        _ => Err(MsgpackError::UnrecognizedCode(vtype)),
    }
}

fn unpack_ext(buf: &mut Buffer, marker: Marker) -> Result<Value> {
    let len = match marker {
        Marker::FixExt1 => {
            let ty = buf.read_u8()?;
            let data = buf.read_u8()?;
            return Ok(match (ty, data) {
                (EXT_SPECIAL, 0x00) => Value::Wildcard,
                (EXT_SPECIAL, 0x01) => Value::Infinity,
                _ => {
                    warn!(ty, data, "skipping over unknown 1 byte type extension");
                    Value::Nil
                }
            });
        }
        Marker::FixExt2 => 2,
        Marker::FixExt4 => 4,
        Marker::FixExt8 => 8,
        Marker::FixExt16 => 16,
        Marker::Ext8 => buf.read_u8()? as usize,
        Marker::Ext16 => buf.read_u16()? as usize,
        Marker::Ext32 => buf.read_u32()? as usize,
        _ => return Err(MsgpackError::UnexpectedValue {
            expected: "extension",
            got: "other marker",
        }),
    };

    // type byte + payload
    buf.skip(1 + len)?;
    Ok(Value::Nil)
}

fn unpack_map_key(buf: &mut Buffer) -> Result<MapKey> {
    let marker = buf.read_u8()?;

    match Marker::from(marker) {
        Marker::Pfix(value) => Ok(MapKey::Int(value.into())),
        Marker::Nfix(value) => Ok(MapKey::Int(value.into())),
        Marker::U8 => Ok(MapKey::Int(buf.read_u8()?.into())),
        Marker::U16 => Ok(MapKey::Int(buf.read_u16()?.into())),
        Marker::U32 => Ok(MapKey::Int(buf.read_u32()?.into())),
        Marker::U64 => Ok(unsigned(buf.read_u64()?).try_into().map_err(|_| {
            MsgpackError::UnexpectedValue {
                expected: "map key",
                got: "integer",
            }
        })?),
        Marker::I8 => Ok(MapKey::Int(buf.read_i8()?.into())),
        Marker::I16 => Ok(MapKey::Int(buf.read_i16()?.into())),
        Marker::I32 => Ok(MapKey::Int(buf.read_i32()?.into())),
        Marker::I64 => Ok(MapKey::Int(buf.read_i64()?)),
        Marker::F32 => Ok(MapKey::from(buf.read_f32()?)),
        Marker::F64 => Ok(MapKey::from(buf.read_f64()?)),
        Marker::FixStr(len) => blob_key(buf, len.into()),
        Marker::Bin8 | Marker::Str8 => {
            let count = buf.read_u8()?;
            blob_key(buf, count.into())
        }
        Marker::Bin16 | Marker::Str16 => {
            let count = buf.read_u16()?;
            blob_key(buf, count.into())
        }
        Marker::Bin32 | Marker::Str32 => {
            let count = buf.read_u32()?;
            blob_key(buf, count as usize)
        }
        _ => Err(MsgpackError::InvalidMarker(marker)),
    }
}

fn blob_key(buf: &mut Buffer, count: usize) -> Result<MapKey> {
    match unpack_blob(buf, count)? {
        Value::String(s) => Ok(MapKey::String(s)),
        Value::Blob(b) => Ok(MapKey::Blob(b)),
        other => Err(MsgpackError::UnexpectedValue {
            expected: "map key",
            got: other.type_name(),
        }),
    }
}

/// Values beyond the signed range keep their unsigned tag, everything else is a plain integer.
fn unsigned(value: u64) -> Value {
    i64::try_from(value).map_or(Value::Uint(value), Value::Int)
}

pub(crate) fn unpack_value(buf: &mut Buffer) -> Result<Value> {
    let marker = Marker::from(buf.read_u8()?);

    match marker {
        Marker::Pfix(value) => Ok(Value::Int(value.into())),
        Marker::Nfix(value) => Ok(Value::Int(value.into())),
        Marker::FixMap(len) => unpack_map(buf, len.into()),
        Marker::FixArray(len) => unpack_array(buf, len.into()),
        Marker::FixStr(len) => unpack_blob(buf, len.into()),
        Marker::Nil => Ok(Value::Nil),
        Marker::Reserved => {
            warn!("skipping over reserved type");
            Ok(Value::Nil)
        }
        Marker::False => Ok(Value::Bool(false)),
        Marker::True => Ok(Value::Bool(true)),
        Marker::Bin8 | Marker::Str8 => {
            let count = buf.read_u8()?;
            unpack_blob(buf, count.into())
        }
        Marker::Bin16 | Marker::Str16 => {
            let count = buf.read_u16()?;
            unpack_blob(buf, count.into())
        }
        Marker::Bin32 | Marker::Str32 => {
            let count = buf.read_u32()?;
            unpack_blob(buf, count as usize)
        }
        Marker::F32 => Ok(Value::from(buf.read_f32()?)),
        Marker::F64 => Ok(Value::from(buf.read_f64()?)),
        Marker::U8 => Ok(Value::Int(buf.read_u8()?.into())),
        Marker::U16 => Ok(Value::Int(buf.read_u16()?.into())),
        Marker::U32 => Ok(Value::Int(buf.read_u32()?.into())),
        Marker::U64 => Ok(unsigned(buf.read_u64()?)),
        Marker::I8 => Ok(Value::Int(buf.read_i8()?.into())),
        Marker::I16 => Ok(Value::Int(buf.read_i16()?.into())),
        Marker::I32 => Ok(Value::Int(buf.read_i32()?.into())),
        Marker::I64 => Ok(Value::Int(buf.read_i64()?)),
        Marker::Array16 => {
            let count = buf.read_u16()?;
            unpack_array(buf, count.into())
        }
        Marker::Array32 => {
            let count = buf.read_u32()?;
            unpack_array(buf, count as usize)
        }
        Marker::Map16 => {
            let count = buf.read_u16()?;
            unpack_map(buf, count.into())
        }
        Marker::Map32 => {
            let count = buf.read_u32()?;
            unpack_map(buf, count as usize)
        }
        marker => unpack_ext(buf, marker),
    }
}
