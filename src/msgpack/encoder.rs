use std::collections::HashMap;

use super::Write;
use crate::{
    commands::ParticleType,
    value::{FloatValue, MapKey, Value},
};

const MARKER_NIL: u8 = 0xc0;
const MARKER_FALSE: u8 = 0xc2;
const MARKER_TRUE: u8 = 0xc3;
const MARKER_F32: u8 = 0xca;
const MARKER_F64: u8 = 0xcb;
const MARKER_U8: u8 = 0xcc;
const MARKER_U16: u8 = 0xcd;
const MARKER_U32: u8 = 0xce;
const MARKER_U64: u8 = 0xcf;
const MARKER_I8: u8 = 0xd0;
const MARKER_I16: u8 = 0xd1;
const MARKER_I32: u8 = 0xd2;
const MARKER_I64: u8 = 0xd3;
const MARKER_FIXEXT1: u8 = 0xd4;

/// Extension type the server uses for its special comparison values.
const EXT_SPECIAL: u8 = 0xff;
const EXT_WILDCARD: u8 = 0x00;
const EXT_INFINITY: u8 = 0x01;

pub(crate) fn pack_value(w: &mut impl Write, val: &Value) -> usize {
    match val {
        Value::Nil => pack_nil(w),
        Value::Bool(val) => pack_bool(w, *val),
        Value::Int(val) => pack_integer(w, *val),
        Value::Uint(val) => pack_u64(w, *val),
        Value::Float(FloatValue::F32(val)) => pack_f32(w, val.0),
        Value::Float(FloatValue::F64(val)) => pack_f64(w, val.0),
        Value::String(val) => pack_string(w, val),
        Value::Blob(val) => pack_blob(w, val),
        Value::List(val) => pack_array(w, val),
        Value::HashMap(val) => pack_map(w, val),
        Value::GeoJson(val) => pack_geo_json(w, val),
        Value::Hll(val) => pack_particle_bytes(w, ParticleType::Hll, val),
        Value::Infinity => pack_special(w, EXT_INFINITY),
        Value::Wildcard => pack_special(w, EXT_WILDCARD),
    }
}

pub(crate) fn pack_map_key(w: &mut impl Write, key: &MapKey) -> usize {
    match key {
        MapKey::Int(val) => pack_integer(w, *val),
        MapKey::Uint(val) => pack_u64(w, *val),
        MapKey::Float(FloatValue::F32(val)) => pack_f32(w, val.0),
        MapKey::Float(FloatValue::F64(val)) => pack_f64(w, val.0),
        MapKey::String(val) => pack_string(w, val),
        MapKey::Blob(val) => pack_blob(w, val),
    }
}

pub(crate) fn pack_array(w: &mut impl Write, values: &[Value]) -> usize {
    values
        .iter()
        .fold(pack_array_begin(w, values.len()), |size, val| {
            size + pack_value(w, val)
        })
}

pub(crate) fn pack_map(w: &mut impl Write, map: &HashMap<MapKey, Value>) -> usize {
    map.iter()
        .fold(pack_map_begin(w, map.len()), |size, (key, val)| {
            size + pack_map_key(w, key) + pack_value(w, val)
        })
}

pub(crate) fn pack_array_begin(w: &mut impl Write, length: usize) -> usize {
    match length {
        0..=15 => w.write_u8(0x90 | length as u8),
        16..=0xffff => w.write_u8(0xdc) + w.write_u16(length as u16),
        _ => w.write_u8(0xdd) + w.write_u32(length as u32),
    }
}

pub(crate) fn pack_map_begin(w: &mut impl Write, length: usize) -> usize {
    match length {
        0..=15 => w.write_u8(0x80 | length as u8),
        16..=0xffff => w.write_u8(0xde) + w.write_u16(length as u16),
        _ => w.write_u8(0xdf) + w.write_u32(length as u32),
    }
}

fn pack_byte_array_begin(w: &mut impl Write, length: usize) -> usize {
    match length {
        0..=31 => w.write_u8(0xa0 | length as u8),
        32..=0xffff => w.write_u8(0xda) + w.write_u16(length as u16),
        _ => w.write_u8(0xdb) + w.write_u32(length as u32),
    }
}

pub(crate) fn pack_nil(w: &mut impl Write) -> usize {
    w.write_u8(MARKER_NIL)
}

pub(crate) fn pack_bool(w: &mut impl Write, value: bool) -> usize {
    w.write_u8(if value { MARKER_TRUE } else { MARKER_FALSE })
}

pub(crate) fn pack_integer(w: &mut impl Write, val: i64) -> usize {
    match val {
        0..=0x7f => w.write_u8(val as u8),
        0x80..=0xff => w.write_u8(MARKER_U8) + w.write_u8(val as u8),
        0x100..=0xffff => w.write_u8(MARKER_U16) + w.write_u16(val as u16),
        0x1_0000..=0xffff_ffff => w.write_u8(MARKER_U32) + w.write_u32(val as u32),
        -32..=-1 => w.write_u8(val as u8),
        -0x80..=-33 => w.write_u8(MARKER_I8) + w.write_i8(val as i8),
        -0x8000..=-0x81 => w.write_u8(MARKER_I16) + w.write_i16(val as i16),
        -0x8000_0000..=-0x8001 => w.write_u8(MARKER_I32) + w.write_i32(val as i32),
        _ => w.write_u8(MARKER_I64) + w.write_i64(val),
    }
}

/// Unsigned integers that fit the signed range are packed as such, only the upper half of the
/// `u64` range needs the dedicated unsigned marker.
pub(crate) fn pack_u64(w: &mut impl Write, val: u64) -> usize {
    match i64::try_from(val) {
        Ok(val) => pack_integer(w, val),
        Err(_) => w.write_u8(MARKER_U64) + w.write_u64(val),
    }
}

pub(crate) fn pack_f32(w: &mut impl Write, value: f32) -> usize {
    w.write_u8(MARKER_F32) + w.write_f32(value)
}

pub(crate) fn pack_f64(w: &mut impl Write, value: f64) -> usize {
    w.write_u8(MARKER_F64) + w.write_f64(value)
}

/// Byte data prefixed with its particle type, the way the server stores strings and blobs inside
/// collections.
pub(crate) fn pack_particle_bytes(w: &mut impl Write, ty: ParticleType, value: &[u8]) -> usize {
    pack_byte_array_begin(w, value.len() + 1) + w.write_u8(ty as u8) + w.write_bytes(value)
}

pub(crate) fn pack_string(w: &mut impl Write, value: &str) -> usize {
    pack_particle_bytes(w, ParticleType::String, value.as_bytes())
}

pub(crate) fn pack_blob(w: &mut impl Write, value: &[u8]) -> usize {
    pack_particle_bytes(w, ParticleType::Blob, value)
}

pub(crate) fn pack_geo_json(w: &mut impl Write, value: &str) -> usize {
    pack_particle_bytes(w, ParticleType::GeoJson, value.as_bytes())
}

/// String without particle type prefix, used for names inside expressions.
pub(crate) fn pack_raw_string(w: &mut impl Write, value: &str) -> usize {
    pack_byte_array_begin(w, value.len()) + w.write_str(value)
}

/// Byte data without particle type prefix, as taken by bitwise operations.
pub(crate) fn pack_raw_bytes(w: &mut impl Write, value: &[u8]) -> usize {
    pack_byte_array_begin(w, value.len()) + w.write_bytes(value)
}

fn pack_special(w: &mut impl Write, kind: u8) -> usize {
    w.write_u8(MARKER_FIXEXT1) + w.write_u8(EXT_SPECIAL) + w.write_u8(kind)
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::msgpack::Sink;

    fn packed(value: i64) -> Vec<u8> {
        let mut buf = BytesMut::new();
        let size = pack_integer(&mut buf, value);
        assert_eq!(size, buf.len());
        assert_eq!(size, pack_integer(&mut Sink, value));
        buf.to_vec()
    }

    #[test]
    fn integer_markers() {
        assert_eq!(vec![0x00], packed(0));
        assert_eq!(vec![0x7f], packed(127));
        assert_eq!(vec![0xcc, 0x80], packed(128));
        assert_eq!(vec![0xcd, 0x01, 0x00], packed(256));
        assert_eq!(vec![0xce, 0x00, 0x01, 0x00, 0x00], packed(65536));
        assert_eq!(vec![0xff], packed(-1));
        assert_eq!(vec![0xe0], packed(-32));
        assert_eq!(vec![0xd0, 0xdf], packed(-33));
        assert_eq!(vec![0xd1, 0xff, 0x7f], packed(-129));
        assert_eq!(0xd3, packed(i64::MAX)[0]);
        assert_eq!(0xd3, packed(i64::MIN)[0]);
    }

    #[test]
    fn string_carries_particle_type() {
        let mut buf = BytesMut::new();
        pack_string(&mut buf, "abc");
        assert_eq!(&[0xa4, 3, b'a', b'b', b'c'], &buf[..]);

        let mut buf = BytesMut::new();
        pack_raw_string(&mut buf, "abc");
        assert_eq!(&[0xa3, b'a', b'b', b'c'], &buf[..]);
    }

    #[test]
    fn large_unsigned() {
        let mut buf = BytesMut::new();
        assert_eq!(9, pack_u64(&mut buf, u64::MAX));
        assert_eq!(0xcf, buf[0]);

        let mut buf = BytesMut::new();
        assert_eq!(1, pack_u64(&mut buf, 5));
    }
}
