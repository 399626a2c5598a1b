//! String/number bin operations. Create operations used by the client's `operate()` method.

use crate::{
    operations::{Operation, OperationBin, OperationData, OperationType},
    Bin,
};

fn with_bin(op: OperationType, bin: &Bin<'_>) -> Operation {
    Operation::new(
        op,
        OperationBin::Name(bin.name.to_owned()),
        OperationData::Value(bin.value.clone()),
    )
}

/// Create read all record bins database operation.
#[must_use]
pub fn get() -> Operation {
    Operation::new(OperationType::Read, OperationBin::All, OperationData::None)
}

/// Create read record header database operation.
#[must_use]
pub fn get_header() -> Operation {
    Operation::new(OperationType::Read, OperationBin::None, OperationData::None)
}

/// Create read bin database operation.
#[must_use]
pub fn get_bin(bin_name: &str) -> Operation {
    Operation::new(
        OperationType::Read,
        OperationBin::Name(bin_name.to_owned()),
        OperationData::None,
    )
}

/// Create set database operation.
#[must_use]
pub fn put(bin: &Bin<'_>) -> Operation {
    with_bin(OperationType::Write, bin)
}

/// Create string append database operation.
#[must_use]
pub fn append(bin: &Bin<'_>) -> Operation {
    with_bin(OperationType::Append, bin)
}

/// Create string prepend database operation.
#[must_use]
pub fn prepend(bin: &Bin<'_>) -> Operation {
    with_bin(OperationType::Prepend, bin)
}

/// Create integer add database operation. Floats are accepted as well for float bins.
#[must_use]
pub fn add(bin: &Bin<'_>) -> Operation {
    with_bin(OperationType::Incr, bin)
}

/// Create touch database operation.
#[must_use]
pub fn touch() -> Operation {
    Operation::new(OperationType::Touch, OperationBin::None, OperationData::None)
}

/// Create delete database operation
#[must_use]
pub fn delete() -> Operation {
    Operation::new(OperationType::Delete, OperationBin::None, OperationData::None)
}
