//! Shared encoding of collection (list, map), bitwise and HyperLogLog operations, and the context
//! that addresses nested collection elements.

use std::collections::HashMap;

use crate::{
    errors::{Error, Result},
    msgpack::{encoder, Write},
    operations::{lists::ListOrderType, maps::MapOrder},
    MapKey, Value,
};

/// Marker in front of a context path in the operation payload.
const CONTEXT_MARKER: i64 = 0xff;
/// Flag of a return type that inverts the selection.
const INVERTED: i64 = 0x10000;

/// One step of the path to a nested list or map element.
///
/// A context is given as a slice of steps, starting at the bin's top-level collection:
///
/// ```rust
/// use windpike::operations::{cdt::CdtContext, lists};
///
/// // Size of the list found under key "scores" of the map in the last list element.
/// let op = lists::size("bin").with_context(&[
///     CdtContext::ListIndex(-1),
///     CdtContext::MapKey("scores".into()),
/// ]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum CdtContext {
    /// List element at the index. Negative indexes count from the end.
    ListIndex(i64),
    /// List element at the index, creating the list with the given order if it doesn't exist.
    /// With `pad`, the list is extended with nil values up to the index.
    ListIndexCreate(i64, ListOrderType, bool),
    /// List element by value order.
    ListRank(i64),
    /// List element equal to the value.
    ListValue(Value),
    /// Map entry at the index.
    MapIndex(i64),
    /// Map entry by value order.
    MapRank(i64),
    /// Map entry with the key.
    MapKey(MapKey),
    /// Map entry with the key, creating the map with the given order if it doesn't exist.
    MapKeyCreate(MapKey, MapOrder),
    /// Map entry with the value.
    MapValue(Value),
}

impl CdtContext {
    const fn id(&self) -> i64 {
        match self {
            Self::ListIndex(_) => 0x10,
            Self::ListIndexCreate(_, order, pad) => 0x10 | order.context_flag(*pad),
            Self::ListRank(_) => 0x11,
            Self::ListValue(_) => 0x13,
            Self::MapIndex(_) => 0x20,
            Self::MapRank(_) => 0x21,
            Self::MapKey(_) => 0x22,
            Self::MapKeyCreate(_, order) => 0x22 | order.context_flag(),
            Self::MapValue(_) => 0x23,
        }
    }

    fn pack(&self, w: &mut impl Write, flag: i64) -> usize {
        let size = encoder::pack_integer(w, self.id() | flag);
        size + match self {
            Self::ListIndex(v)
            | Self::ListIndexCreate(v, ..)
            | Self::ListRank(v)
            | Self::MapIndex(v)
            | Self::MapRank(v) => encoder::pack_integer(w, *v),
            Self::ListValue(v) | Self::MapValue(v) => encoder::pack_value(w, v),
            Self::MapKey(k) | Self::MapKeyCreate(k, _) => encoder::pack_map_key(w, k),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum CdtArgument {
    Byte(u8),
    Int(i64),
    /// Number of elements or bytes, must not be negative.
    Count(i64),
    /// Size of an integer inside a bit blob, between 1 and 64 bits.
    IntBits(i64),
    /// Return type selector, the first argument of select and remove operations.
    ReturnType(i64),
    Bool(bool),
    Value(Value),
    Key(MapKey),
    List(Vec<Value>),
    Map(HashMap<MapKey, Value>),
    /// Raw bytes, as taken by bitwise operations.
    Bytes(Vec<u8>),
}

impl CdtArgument {
    fn pack(&self, w: &mut impl Write) -> usize {
        match self {
            Self::Byte(v) => encoder::pack_integer(w, i64::from(*v)),
            Self::Int(v) | Self::Count(v) | Self::IntBits(v) | Self::ReturnType(v) => {
                encoder::pack_integer(w, *v)
            }
            Self::Bool(v) => encoder::pack_bool(w, *v),
            Self::Value(v) => encoder::pack_value(w, v),
            Self::Key(k) => encoder::pack_map_key(w, k),
            Self::List(v) => encoder::pack_array(w, v),
            Self::Map(v) => encoder::pack_map(w, v),
            Self::Bytes(v) => encoder::pack_raw_bytes(w, v),
        }
    }
}

/// Encoded as `[op, args...]`, or `[0xff, [ctx...], [op, args...]]` with a context.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct CdtOperation {
    pub op: u8,
    pub args: Vec<CdtArgument>,
    /// HyperLogLog operations can't be nested.
    pub allow_context: bool,
    /// Added to the last context step, to create the addressed collection when it's missing.
    pub create_flag: i64,
}

impl CdtOperation {
    pub(crate) fn new(op: u8, args: Vec<CdtArgument>) -> Self {
        Self {
            op,
            args,
            allow_context: true,
            create_flag: 0,
        }
    }

    pub(crate) fn invert(&mut self) {
        for arg in &mut self.args {
            if let CdtArgument::ReturnType(rt) = arg {
                *rt |= INVERTED;
            }
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for arg in &self.args {
            match arg {
                CdtArgument::Count(v) if *v < 0 => {
                    return Err(Error::invalid_argument(format!(
                        "count or size must not be negative, got {v}"
                    )));
                }
                CdtArgument::IntBits(v) if !(1..=64).contains(v) => {
                    return Err(Error::invalid_argument(format!(
                        "integer bit size must be between 1 and 64, got {v}"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub(crate) fn write_to(&self, w: &mut impl Write, ctx: &[CdtContext]) -> usize {
        let mut size = 0;

        if self.allow_context && !ctx.is_empty() {
            size += encoder::pack_array_begin(w, 3);
            size += encoder::pack_integer(w, CONTEXT_MARKER);
            size += encoder::pack_array_begin(w, ctx.len() * 2);
            let last = ctx.len() - 1;
            for (i, step) in ctx.iter().enumerate() {
                size += step.pack(w, if i == last { self.create_flag } else { 0 });
            }
        }

        size += encoder::pack_array_begin(w, self.args.len() + 1);
        size += encoder::pack_integer(w, i64::from(self.op));
        for arg in &self.args {
            size += arg.pack(w);
        }

        size
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    fn packed(op: &CdtOperation, ctx: &[CdtContext]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        op.write_to(&mut buf, ctx);
        buf.to_vec()
    }

    #[test]
    fn without_context() {
        let op = CdtOperation::new(17, vec![CdtArgument::Int(2)]);
        assert_eq!(vec![0x92, 17, 2], packed(&op, &[]));
    }

    #[test]
    fn with_context() {
        let op = CdtOperation::new(16, vec![]);
        let ctx = [
            CdtContext::ListIndex(-1),
            CdtContext::MapKey(MapKey::from("k")),
        ];
        assert_eq!(
            vec![0x93, 0xcc, 0xff, 0x94, 0x10, 0xff, 0x22, 0xa2, 3, b'k', 0x91, 16],
            packed(&op, &ctx)
        );
    }

    #[test]
    fn create_flags() {
        assert_eq!(
            0x10 | 0xc0,
            CdtContext::ListIndexCreate(0, ListOrderType::Ordered, false).id()
        );
        assert_eq!(
            0x10 | 0x80,
            CdtContext::ListIndexCreate(0, ListOrderType::Unordered, true).id()
        );
        assert_eq!(
            0x22 | 0x80,
            CdtContext::MapKeyCreate(MapKey::from(1), MapOrder::KeyOrdered).id()
        );
    }

    #[test]
    fn inverting_return_type() {
        let mut op = CdtOperation::new(19, vec![CdtArgument::ReturnType(7), CdtArgument::Int(0)]);
        op.invert();
        assert_eq!(CdtArgument::ReturnType(0x10007), op.args[0]);
        assert_eq!(CdtArgument::Int(0), op.args[1]);
    }

    #[test]
    fn negative_counts_are_rejected() {
        let op = CdtOperation::new(24, vec![CdtArgument::Int(0), CdtArgument::Count(-1)]);
        assert!(op.validate().is_err());

        let op = CdtOperation::new(12, vec![CdtArgument::IntBits(65)]);
        assert!(op.validate().is_err());
    }
}
