//! Bit operations on blob bins. Create bit operations used by the client's `operate()` method.
//!
//! Offset orientation is left-to-right. Negative offsets are supported: if the offset is negative,
//! the offset starts backwards from the end of the bitmap. If an offset is out of bounds, a
//! parameter error is returned by the server.
//!
//! Blobs nested in lists or maps are addressed with a context:
//!
//! ```
//! use windpike::operations::{
//!     bitwise::{self, BitPolicy, ResizeFlags},
//!     cdt::CdtContext,
//! };
//!
//! // bin = [[0b00000001, 0b01000010], [0b01011010]]
//! // Resize first bitmap (in a list of bitmaps) to 3 bytes.
//! bitwise::resize("bin", 3, ResizeFlags::empty(), BitPolicy::default())
//!     .with_context(&[CdtContext::ListIndex(0)]);
//! // bin result = [[0b00000001, 0b01000010, 0b00000000], [0b01011010]]
//! ```

use bitflags::bitflags;

use crate::operations::{
    cdt::{CdtArgument, CdtOperation},
    Operation, OperationBin, OperationData, OperationType,
};

#[derive(Clone, Copy, Debug)]
enum OpType {
    Resize = 0,
    Insert,
    Remove,
    Set,
    Or,
    Xor,
    And,
    Not,
    Lshift,
    Rshift,
    Add,
    Subtract,
    SetInt,
    Get = 50,
    Count,
    Lscan,
    Rscan,
    GetInt,
}

bitflags! {
    /// Flags of the [`resize`] operation.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ResizeFlags: u8 {
        /// Add/remove bytes from the beginning instead of the end.
        const FROM_FRONT = 1;
        /// Only allow the blob size to increase.
        const GROW_ONLY = 2;
        /// Only allow the blob size to decrease.
        const SHRINK_ONLY = 4;
    }
}

bitflags! {
    /// Write flags of bit operations.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct BitWriteFlags: u8 {
        /// If the bin already exists, the operation is denied. Otherwise the bin is created.
        const CREATE_ONLY = 1;
        /// If the bin doesn't exist, the operation is denied. Otherwise the bin is overwritten.
        const UPDATE_ONLY = 2;
        /// Do not raise an error if the operation is denied.
        const NO_FAIL = 4;
        /// Allow other valid operations to be committed if this operation is denied due to flag
        /// constraints.
        const PARTIAL = 8;
    }
}

/// Action to take when a bitwise add/subtract overflows or underflows.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum OverflowAction {
    /// Fail the operation with an error.
    #[default]
    Fail = 0,
    /// Set to the max/min value. Example: `MAXINT + 1 = MAXINT`.
    Saturate = 2,
    /// Wrap the value. Example: `MAXINT + 1 = -1`.
    Wrap = 4,
}

/// Bit operation policy.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BitPolicy {
    pub flags: BitWriteFlags,
}

impl BitPolicy {
    #[must_use]
    pub const fn new(flags: BitWriteFlags) -> Self {
        Self { flags }
    }

    const fn arg(self) -> CdtArgument {
        CdtArgument::Byte(self.flags.bits())
    }
}

fn write(bin: &str, ty: OpType, args: Vec<CdtArgument>) -> Operation {
    Operation::new(
        OperationType::BitWrite,
        OperationBin::Name(bin.to_owned()),
        OperationData::Cdt(CdtOperation::new(ty as u8, args)),
    )
}

fn read(bin: &str, ty: OpType, args: Vec<CdtArgument>) -> Operation {
    Operation::new(
        OperationType::BitRead,
        OperationBin::Name(bin.to_owned()),
        OperationData::Cdt(CdtOperation::new(ty as u8, args)),
    )
}

/// Bitwise operations combining a bit range with a value.
fn combine(
    ty: OpType,
    bin: &str,
    bit_offset: i64,
    bit_size: i64,
    value: &[u8],
    policy: BitPolicy,
) -> Operation {
    write(
        bin,
        ty,
        vec![
            CdtArgument::Int(bit_offset),
            CdtArgument::Count(bit_size),
            CdtArgument::Bytes(value.to_vec()),
            policy.arg(),
        ],
    )
}

fn shift(
    ty: OpType,
    bin: &str,
    bit_offset: i64,
    bit_size: i64,
    shift: i64,
    policy: BitPolicy,
) -> Operation {
    write(
        bin,
        ty,
        vec![
            CdtArgument::Int(bit_offset),
            CdtArgument::Count(bit_size),
            CdtArgument::Count(shift),
            policy.arg(),
        ],
    )
}

#[allow(clippy::too_many_arguments)]
fn arithmetic(
    ty: OpType,
    bin: &str,
    bit_offset: i64,
    bit_size: i64,
    value: i64,
    signed: bool,
    action: OverflowAction,
    policy: BitPolicy,
) -> Operation {
    let action = action as u8 | u8::from(signed);
    write(
        bin,
        ty,
        vec![
            CdtArgument::Int(bit_offset),
            CdtArgument::IntBits(bit_size),
            CdtArgument::Int(value),
            policy.arg(),
            CdtArgument::Byte(action),
        ],
    )
}

/// Creates byte "resize" operation. Server resizes the blob to `byte_size` according to the
/// resize flags. Server does not return a value.
///
/// ```text
/// bin = [0b00000001, 0b01000010]
/// byteSize = 4
/// resizeFlags = 0
/// bin result = [0b00000001, 0b01000010, 0b00000000, 0b00000000]
/// ```
#[must_use]
pub fn resize(bin: &str, byte_size: i64, flags: ResizeFlags, policy: BitPolicy) -> Operation {
    let mut args = vec![CdtArgument::Count(byte_size), policy.arg()];
    if !flags.is_empty() {
        args.push(CdtArgument::Byte(flags.bits()));
    }
    write(bin, OpType::Resize, args)
}

/// Creates byte "insert" operation. Server inserts the value bytes at `byte_offset`. Server does
/// not return a value.
///
/// ```text
/// bin = [0b00000001, 0b01000010, 0b00000011, 0b00000100, 0b00000101]
/// byteOffset = 1
/// value = [0b11111111, 0b11000111]
/// bin result = [0b00000001, 0b11111111, 0b11000111, 0b01000010, 0b00000011, 0b00000100, 0b00000101]
/// ```
#[must_use]
pub fn insert(bin: &str, byte_offset: i64, value: &[u8], policy: BitPolicy) -> Operation {
    write(
        bin,
        OpType::Insert,
        vec![
            CdtArgument::Int(byte_offset),
            CdtArgument::Bytes(value.to_vec()),
            policy.arg(),
        ],
    )
}

/// Creates byte "remove" operation. Server removes `byte_size` bytes starting at `byte_offset`.
/// Server does not return a value.
///
/// ```text
/// bin = [0b00000001, 0b01000010, 0b00000011, 0b00000100, 0b00000101]
/// byteOffset = 2
/// byteSize = 3
/// bin result = [0b00000001, 0b01000010]
/// ```
#[must_use]
pub fn remove(bin: &str, byte_offset: i64, byte_size: i64, policy: BitPolicy) -> Operation {
    write(
        bin,
        OpType::Remove,
        vec![
            CdtArgument::Int(byte_offset),
            CdtArgument::Count(byte_size),
            policy.arg(),
        ],
    )
}

/// Creates bit "set" operation. Server sets the bits at `bit_offset` for `bit_size` to the value.
/// Server does not return a value.
///
/// ```text
/// bin = [0b00000001, 0b01000010, 0b00000011, 0b00000100, 0b00000101]
/// bitOffset = 13
/// bitSize = 3
/// value = [0b11100000]
/// bin result = [0b00000001, 0b01000111, 0b00000011, 0b00000100, 0b00000101]
/// ```
#[must_use]
pub fn set(bin: &str, bit_offset: i64, bit_size: i64, value: &[u8], policy: BitPolicy) -> Operation {
    combine(OpType::Set, bin, bit_offset, bit_size, value, policy)
}

/// Creates bit "or" operation. Server performs bitwise "or" on the value and the bits at
/// `bit_offset` for `bit_size`. Server does not return a value.
///
/// ```text
/// bin = [0b00000001, 0b01000010, 0b00000011, 0b00000100, 0b00000101]
/// bitOffset = 17
/// bitSize = 6
/// value = [0b10101000]
/// bin result = [0b00000001, 0b01000010, 0b01010111, 0b00000100, 0b00000101]
/// ```
#[must_use]
pub fn or(bin: &str, bit_offset: i64, bit_size: i64, value: &[u8], policy: BitPolicy) -> Operation {
    combine(OpType::Or, bin, bit_offset, bit_size, value, policy)
}

/// Creates bit "exclusive or" operation. Server does not return a value.
///
/// ```text
/// bin = [0b00000001, 0b01000010, 0b00000011, 0b00000100, 0b00000101]
/// bitOffset = 17
/// bitSize = 6
/// value = [0b10101100]
/// bin result = [0b00000001, 0b01000010, 0b01010101, 0b00000100, 0b00000101]
/// ```
#[must_use]
pub fn xor(bin: &str, bit_offset: i64, bit_size: i64, value: &[u8], policy: BitPolicy) -> Operation {
    combine(OpType::Xor, bin, bit_offset, bit_size, value, policy)
}

/// Creates bit "and" operation. Server does not return a value.
///
/// ```text
/// bin = [0b00000001, 0b01000010, 0b00000011, 0b00000100, 0b00000101]
/// bitOffset = 23
/// bitSize = 9
/// value = [0b00111100, 0b10000000]
/// bin result = [0b00000001, 0b01000010, 0b00000010, 0b00000000, 0b00000101]
/// ```
#[must_use]
pub fn and(bin: &str, bit_offset: i64, bit_size: i64, value: &[u8], policy: BitPolicy) -> Operation {
    combine(OpType::And, bin, bit_offset, bit_size, value, policy)
}

/// Creates bit "not" operation. Server negates the bits at `bit_offset` for `bit_size`. Server
/// does not return a value.
///
/// ```text
/// bin = [0b00000001, 0b01000010, 0b00000011, 0b00000100, 0b00000101]
/// bitOffset = 25
/// bitSize = 6
/// bin result = [0b00000001, 0b01000010, 0b00000011, 0b01111010, 0b00000101]
/// ```
#[must_use]
pub fn not(bin: &str, bit_offset: i64, bit_size: i64, policy: BitPolicy) -> Operation {
    write(
        bin,
        OpType::Not,
        vec![
            CdtArgument::Int(bit_offset),
            CdtArgument::Count(bit_size),
            policy.arg(),
        ],
    )
}

/// Creates bit "left shift" operation. Server does not return a value.
///
/// ```text
/// bin = [0b00000001, 0b01000010, 0b00000011, 0b00000100, 0b00000101]
/// bitOffset = 32
/// bitSize = 8
/// shift = 3
/// bin result = [0b00000001, 0b01000010, 0b00000011, 0b00000100, 0b00101000]
/// ```
#[must_use]
pub fn lshift(bin: &str, bit_offset: i64, bit_size: i64, shift: i64, policy: BitPolicy) -> Operation {
    self::shift(OpType::Lshift, bin, bit_offset, bit_size, shift, policy)
}

/// Creates bit "right shift" operation. Server does not return a value.
///
/// ```text
/// bin = [0b00000001, 0b01000010, 0b00000011, 0b00000100, 0b00000101]
/// bitOffset = 0
/// bitSize = 9
/// shift = 1
/// bin result = [0b00000000, 0b11000010, 0b00000011, 0b00000100, 0b00000101]
/// ```
#[must_use]
pub fn rshift(bin: &str, bit_offset: i64, bit_size: i64, shift: i64, policy: BitPolicy) -> Operation {
    self::shift(OpType::Rshift, bin, bit_offset, bit_size, shift, policy)
}

/// Creates bit "add" operation. Server adds the value to the integer at `bit_offset` for
/// `bit_size`, which must be at most 64. `signed` tells whether the bits are a signed number.
/// Server does not return a value.
///
/// ```text
/// bin = [0b00000001, 0b01000010, 0b00000011, 0b00000100, 0b00000101]
/// bitOffset = 24
/// bitSize = 16
/// value = 128
/// signed = false
/// bin result = [0b00000001, 0b01000010, 0b00000011, 0b00000100, 0b10000101]
/// ```
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn add(
    bin: &str,
    bit_offset: i64,
    bit_size: i64,
    value: i64,
    signed: bool,
    action: OverflowAction,
    policy: BitPolicy,
) -> Operation {
    arithmetic(
        OpType::Add,
        bin,
        bit_offset,
        bit_size,
        value,
        signed,
        action,
        policy,
    )
}

/// Creates bit "subtract" operation. Same rules as [`add`].
///
/// ```text
/// bin = [0b00000001, 0b01000010, 0b00000011, 0b00000100, 0b00000101]
/// bitOffset = 24
/// bitSize = 16
/// value = 128
/// signed = false
/// bin result = [0b00000001, 0b01000010, 0b00000011, 0b0000011, 0b10000101]
/// ```
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn subtract(
    bin: &str,
    bit_offset: i64,
    bit_size: i64,
    value: i64,
    signed: bool,
    action: OverflowAction,
    policy: BitPolicy,
) -> Operation {
    arithmetic(
        OpType::Subtract,
        bin,
        bit_offset,
        bit_size,
        value,
        signed,
        action,
        policy,
    )
}

/// Creates bit "set integer" operation. Server sets the integer at `bit_offset` for `bit_size`,
/// which must be at most 64. Server does not return a value.
///
/// ```text
/// bin = [0b00000001, 0b01000010, 0b00000011, 0b00000100, 0b00000101]
/// bitOffset = 1
/// bitSize = 8
/// value = 127
/// bin result = [0b00111111, 0b11000010, 0b00000011, 0b0000100, 0b00000101]
/// ```
#[must_use]
pub fn set_int(bin: &str, bit_offset: i64, bit_size: i64, value: i64, policy: BitPolicy) -> Operation {
    write(
        bin,
        OpType::SetInt,
        vec![
            CdtArgument::Int(bit_offset),
            CdtArgument::IntBits(bit_size),
            CdtArgument::Int(value),
            policy.arg(),
        ],
    )
}

/// Creates bit "get" operation. Server returns the bits at `bit_offset` for `bit_size`.
///
/// ```text
/// bin = [0b00000001, 0b01000010, 0b00000011, 0b00000100, 0b00000101]
/// bitOffset = 9
/// bitSize = 5
/// returns [0b10000000]
/// ```
#[must_use]
pub fn get(bin: &str, bit_offset: i64, bit_size: i64) -> Operation {
    read(
        bin,
        OpType::Get,
        vec![CdtArgument::Int(bit_offset), CdtArgument::Count(bit_size)],
    )
}

/// Creates bit "count" operation. Server returns the number of set bits at `bit_offset` for
/// `bit_size`.
///
/// ```text
/// bin = [0b00000001, 0b01000010, 0b00000011, 0b00000100, 0b00000101]
/// bitOffset = 20
/// bitSize = 4
/// returns 2
/// ```
#[must_use]
pub fn count(bin: &str, bit_offset: i64, bit_size: i64) -> Operation {
    read(
        bin,
        OpType::Count,
        vec![CdtArgument::Int(bit_offset), CdtArgument::Count(bit_size)],
    )
}

/// Creates bit "left scan" operation. Server returns the offset of the first bit equal to `value`
/// in the range, relative to `bit_offset`.
///
/// ```text
/// bin = [0b00000001, 0b01000010, 0b00000011, 0b00000100, 0b00000101]
/// bitOffset = 24
/// bitSize = 8
/// value = true
/// returns 5
/// ```
#[must_use]
pub fn lscan(bin: &str, bit_offset: i64, bit_size: i64, value: bool) -> Operation {
    read(
        bin,
        OpType::Lscan,
        vec![
            CdtArgument::Int(bit_offset),
            CdtArgument::Count(bit_size),
            CdtArgument::Bool(value),
        ],
    )
}

/// Creates bit "right scan" operation. Server returns the offset of the last bit equal to `value`
/// in the range, relative to `bit_offset`.
///
/// ```text
/// bin = [0b00000001, 0b01000010, 0b00000011, 0b00000100, 0b00000101]
/// bitOffset = 32
/// bitSize = 8
/// value = true
/// returns 7
/// ```
#[must_use]
pub fn rscan(bin: &str, bit_offset: i64, bit_size: i64, value: bool) -> Operation {
    read(
        bin,
        OpType::Rscan,
        vec![
            CdtArgument::Int(bit_offset),
            CdtArgument::Count(bit_size),
            CdtArgument::Bool(value),
        ],
    )
}

/// Creates bit "get integer" operation. Server returns the integer at `bit_offset` for
/// `bit_size`. `signed` tells whether the bits are a signed number.
///
/// ```text
/// bin = [0b00000001, 0b01000010, 0b00000011, 0b00000100, 0b00000101]
/// bitOffset = 8
/// bitSize = 16
/// signed = false
/// returns 16899
/// ```
#[must_use]
pub fn get_int(bin: &str, bit_offset: i64, bit_size: i64, signed: bool) -> Operation {
    let mut args = vec![CdtArgument::Int(bit_offset), CdtArgument::IntBits(bit_size)];
    if signed {
        args.push(CdtArgument::Byte(1));
    }
    read(bin, OpType::GetInt, args)
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    fn payload(op: &Operation) -> Vec<u8> {
        let mut buf = BytesMut::new();
        op.write_to(&mut buf);
        buf.split_off(8 + 1).to_vec()
    }

    #[test]
    fn bytes_have_no_particle_type() {
        let op = insert("b", 1, &[0xff], BitPolicy::default());
        assert_eq!(OperationType::BitWrite, op.op);
        assert_eq!(vec![0x94, 1, 1, 0xa1, 0xff, 0], payload(&op));
    }

    #[test]
    fn signed_add_sets_action_bit() {
        let op = add(
            "b",
            24,
            16,
            128,
            true,
            OverflowAction::Wrap,
            BitPolicy::default(),
        );
        assert_eq!(vec![0x96, 10, 24, 16, 0xcc, 0x80, 0, 5], payload(&op));
    }

    #[test]
    fn integer_size_bounds() {
        assert!(get_int("b", 0, 64, false).validate().is_ok());
        assert!(get_int("b", 0, 65, false).validate().is_err());
        assert!(set_int("b", 0, 0, 1, BitPolicy::default()).validate().is_err());
        assert!(get("b", 0, -1).validate().is_err());
    }
}
