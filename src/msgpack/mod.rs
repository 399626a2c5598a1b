#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use bytes::{BufMut, BytesMut};

use crate::commands::{buffer::BufferError, ParseParticleError};

pub(crate) mod decoder;
pub(crate) mod encoder;

pub(crate) type Result<T, E = MsgpackError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum MsgpackError {
    #[error("particle type not recognized")]
    UnrecognizedParticle(#[from] ParseParticleError),
    #[error("type header with code `{0:#x}` not recognized")]
    UnrecognizedCode(u8),
    #[error("marker `{0:#x}` is not valid in this position")]
    InvalidMarker(u8),
    #[error("expected a {expected}, got `{got}`")]
    UnexpectedValue {
        expected: &'static str,
        got: &'static str,
    },
    #[error("buffer error")]
    Buffer(#[from] BufferError),
}

/// Sink for encoded data. Every method returns the amount of bytes it produced, which allows the
/// same encoding routine to compute sizes (see [`Sink`]) and to write the actual data.
pub(crate) trait Write {
    fn write_u8(&mut self, v: u8) -> usize;
    fn write_u16(&mut self, v: u16) -> usize;
    fn write_u32(&mut self, v: u32) -> usize;
    fn write_u64(&mut self, v: u64) -> usize;
    fn write_i8(&mut self, v: i8) -> usize;
    fn write_i16(&mut self, v: i16) -> usize;
    fn write_i32(&mut self, v: i32) -> usize;
    fn write_i64(&mut self, v: i64) -> usize;
    fn write_f32(&mut self, v: f32) -> usize;
    fn write_f64(&mut self, v: f64) -> usize;
    fn write_bytes(&mut self, v: &[u8]) -> usize;
    fn write_str(&mut self, v: &str) -> usize;

    fn write_bool(&mut self, v: bool) -> usize {
        self.write_u8(u8::from(v))
    }

    /// GeoJSON particles carry a 3 byte header (flags and cell count) that is always zero when
    /// sent by the client.
    fn write_geo(&mut self, v: &str) -> usize {
        self.write_u8(0) + self.write_u16(0) + self.write_str(v)
    }
}

/// Writer that discards everything, only counting the bytes.
pub(crate) struct Sink;

impl Write for Sink {
    fn write_u8(&mut self, _: u8) -> usize {
        1
    }

    fn write_u16(&mut self, _: u16) -> usize {
        2
    }

    fn write_u32(&mut self, _: u32) -> usize {
        4
    }

    fn write_u64(&mut self, _: u64) -> usize {
        8
    }

    fn write_i8(&mut self, _: i8) -> usize {
        1
    }

    fn write_i16(&mut self, _: i16) -> usize {
        2
    }

    fn write_i32(&mut self, _: i32) -> usize {
        4
    }

    fn write_i64(&mut self, _: i64) -> usize {
        8
    }

    fn write_f32(&mut self, _: f32) -> usize {
        4
    }

    fn write_f64(&mut self, _: f64) -> usize {
        8
    }

    fn write_bytes(&mut self, v: &[u8]) -> usize {
        v.len()
    }

    fn write_str(&mut self, v: &str) -> usize {
        v.len()
    }
}

impl Write for BytesMut {
    fn write_u8(&mut self, v: u8) -> usize {
        self.put_u8(v);
        1
    }

    fn write_u16(&mut self, v: u16) -> usize {
        self.put_u16(v);
        2
    }

    fn write_u32(&mut self, v: u32) -> usize {
        self.put_u32(v);
        4
    }

    fn write_u64(&mut self, v: u64) -> usize {
        self.put_u64(v);
        8
    }

    fn write_i8(&mut self, v: i8) -> usize {
        self.put_i8(v);
        1
    }

    fn write_i16(&mut self, v: i16) -> usize {
        self.put_i16(v);
        2
    }

    fn write_i32(&mut self, v: i32) -> usize {
        self.put_i32(v);
        4
    }

    fn write_i64(&mut self, v: i64) -> usize {
        self.put_i64(v);
        8
    }

    fn write_f32(&mut self, v: f32) -> usize {
        self.put_f32(v);
        4
    }

    fn write_f64(&mut self, v: f64) -> usize {
        self.put_f64(v);
        8
    }

    fn write_bytes(&mut self, v: &[u8]) -> usize {
        self.put_slice(v);
        v.len()
    }

    fn write_str(&mut self, v: &str) -> usize {
        self.write_bytes(v.as_bytes())
    }
}

/// MessagePack type markers, as found in the first byte of every encoded value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Marker {
    Pfix(u8),
    FixMap(u8),
    FixArray(u8),
    FixStr(u8),
    Nil,
    Reserved,
    False,
    True,
    Bin8,
    Bin16,
    Bin32,
    Ext8,
    Ext16,
    Ext32,
    F32,
    F64,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    FixExt1,
    FixExt2,
    FixExt4,
    FixExt8,
    FixExt16,
    Str8,
    Str16,
    Str32,
    Array16,
    Array32,
    Map16,
    Map32,
    Nfix(i8),
}

impl Marker {
    pub const fn is_ext(self) -> bool {
        matches!(
            self,
            Self::Ext8
                | Self::Ext16
                | Self::Ext32
                | Self::FixExt1
                | Self::FixExt2
                | Self::FixExt4
                | Self::FixExt8
                | Self::FixExt16
        )
    }
}

impl From<u8> for Marker {
    fn from(n: u8) -> Self {
        match n {
            0x00..=0x7f => Self::Pfix(n),
            0x80..=0x8f => Self::FixMap(n & 0x0f),
            0x90..=0x9f => Self::FixArray(n & 0x0f),
            0xa0..=0xbf => Self::FixStr(n & 0x1f),
            0xc0 => Self::Nil,
            0xc1 => Self::Reserved,
            0xc2 => Self::False,
            0xc3 => Self::True,
            0xc4 => Self::Bin8,
            0xc5 => Self::Bin16,
            0xc6 => Self::Bin32,
            0xc7 => Self::Ext8,
            0xc8 => Self::Ext16,
            0xc9 => Self::Ext32,
            0xca => Self::F32,
            0xcb => Self::F64,
            0xcc => Self::U8,
            0xcd => Self::U16,
            0xce => Self::U32,
            0xcf => Self::U64,
            0xd0 => Self::I8,
            0xd1 => Self::I16,
            0xd2 => Self::I32,
            0xd3 => Self::I64,
            0xd4 => Self::FixExt1,
            0xd5 => Self::FixExt2,
            0xd6 => Self::FixExt4,
            0xd7 => Self::FixExt8,
            0xd8 => Self::FixExt16,
            0xd9 => Self::Str8,
            0xda => Self::Str16,
            0xdb => Self::Str32,
            0xdc => Self::Array16,
            0xdd => Self::Array32,
            0xde => Self::Map16,
            0xdf => Self::Map32,
            0xe0..=0xff => Self::Nfix(n as i8),
        }
    }
}
