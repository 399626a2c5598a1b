//! Expression operations, evaluating a filter expression on the server inside `operate()`.
//!
//! ```rust
//! use windpike::{exp, operations::exp::{read, ExpReadFlags}};
//!
//! // Read the sum of two bins into the virtual bin "total".
//! let op = read(
//!     "total",
//!     &exp::num_add(vec![exp::int_bin("a"), exp::int_bin("b")]),
//!     ExpReadFlags::empty(),
//! );
//! ```

use bitflags::bitflags;

use crate::{
    exp::Expression,
    msgpack::{encoder, Write},
    operations::{Operation, OperationBin, OperationData, OperationType},
};

bitflags! {
    /// Flags of expression read operations.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ExpReadFlags: u8 {
        /// Ignore failures caused by the expression resolving to unknown or a non-bin type.
        const EVAL_NO_FAIL = 16;
    }
}

bitflags! {
    /// Flags of expression write operations.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ExpWriteFlags: u8 {
        /// If the bin already exists, the operation is denied.
        const CREATE_ONLY = 1;
        /// If the bin doesn't exist, the operation is denied.
        const UPDATE_ONLY = 2;
        /// Allow the expression to delete the bin by returning nil.
        const ALLOW_DELETE = 4;
        /// Do not raise an error if the operation is denied.
        const POLICY_NO_FAIL = 8;
        /// Ignore failures caused by the expression resolving to unknown or a non-bin type.
        const EVAL_NO_FAIL = 16;
    }
}

/// Payload `[expression, flags]`.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ExpOperation {
    exp: Expression,
    flags: u8,
}

impl ExpOperation {
    pub(crate) fn write_to(&self, w: &mut impl Write) -> usize {
        encoder::pack_array_begin(w, 2)
            + self.exp.pack(w)
            + encoder::pack_integer(w, i64::from(self.flags))
    }
}

/// Create an operation that evaluates the expression and returns the result under `name`, without
/// storing it.
#[must_use]
pub fn read(name: &str, exp: &Expression, flags: ExpReadFlags) -> Operation {
    Operation::new(
        OperationType::ExpRead,
        OperationBin::Name(name.to_owned()),
        OperationData::Exp(ExpOperation {
            exp: exp.clone(),
            flags: flags.bits(),
        }),
    )
}

/// Create an operation that evaluates the expression and writes the result to the bin.
#[must_use]
pub fn write(bin: &str, exp: &Expression, flags: ExpWriteFlags) -> Operation {
    Operation::new(
        OperationType::ExpWrite,
        OperationBin::Name(bin.to_owned()),
        OperationData::Exp(ExpOperation {
            exp: exp.clone(),
            flags: flags.bits(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::exp;

    #[test]
    fn write_payload() {
        let op = write("c", &exp::int_val(1), ExpWriteFlags::UPDATE_ONLY);
        assert!(op.is_write());
        let mut buf = BytesMut::new();
        op.write_to(&mut buf);
        assert_eq!(vec![0x92, 0x01, 0x02], buf.split_off(9).to_vec());
    }
}
