//! HyperLogLog operations. Create HLL operations used by the client's `operate()` method.
//!
//! HLL bins are probabilistic sets that estimate the number of distinct elements added to them,
//! and the union, intersection and similarity of several sets.

use bitflags::bitflags;

use crate::{
    operations::{
        cdt::{CdtArgument, CdtOperation},
        Operation, OperationBin, OperationData, OperationType,
    },
    Value,
};

bitflags! {
    /// Write flags of HLL operations.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct HllWriteFlags: u8 {
        /// If the bin already exists, the operation is denied. Otherwise the bin is created.
        const CREATE_ONLY = 1;
        /// If the bin doesn't exist, the operation is denied. Otherwise the bin is updated.
        const UPDATE_ONLY = 2;
        /// Do not raise an error if the operation is denied.
        const NO_FAIL = 4;
        /// Allow the resulting set to be the minimum of provided index bits. Also allow the
        /// usage of less precise HLL algorithms when the min hash bits of all sets are not
        /// matching.
        const ALLOW_FOLD = 8;
    }
}

/// HLL operation policy.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HllPolicy {
    pub flags: HllWriteFlags,
}

impl HllPolicy {
    #[must_use]
    pub const fn new(flags: HllWriteFlags) -> Self {
        Self { flags }
    }
}

#[derive(Clone, Copy, Debug)]
enum OpType {
    Init = 0,
    Add,
    SetUnion,
    SetCount,
    Fold,
    Count = 50,
    Union,
    UnionCount,
    IntersectCount,
    Similarity,
    Describe,
}

fn op(kind: OperationType, bin: &str, ty: OpType, args: Vec<CdtArgument>) -> Operation {
    let mut cdt = CdtOperation::new(ty as u8, args);
    cdt.allow_context = false;
    Operation::new(
        kind,
        OperationBin::Name(bin.to_owned()),
        OperationData::Cdt(cdt),
    )
}

/// Create HLL init operation. Server creates a new HLL or resets an existing HLL. Pass `None` as
/// `min_hash_bit_count` to create a set without min hash bits. Server does not return a value.
#[must_use]
pub fn init(
    policy: &HllPolicy,
    bin: &str,
    index_bit_count: i64,
    min_hash_bit_count: Option<i64>,
) -> Operation {
    op(
        OperationType::HllWrite,
        bin,
        OpType::Init,
        vec![
            CdtArgument::Int(index_bit_count),
            CdtArgument::Int(min_hash_bit_count.unwrap_or(-1)),
            CdtArgument::Byte(policy.flags.bits()),
        ],
    )
}

/// Create HLL add operation. Server adds the values to the HLL set. If the bin doesn't exist, it's
/// created with the given index and min hash bits, `None` keeping the server's defaults. Server
/// returns the number of entries that caused the HLL to update a register.
#[must_use]
pub fn add(
    policy: &HllPolicy,
    bin: &str,
    list: Vec<Value>,
    index_bit_count: Option<i64>,
    min_hash_bit_count: Option<i64>,
) -> Operation {
    op(
        OperationType::HllWrite,
        bin,
        OpType::Add,
        vec![
            CdtArgument::List(list),
            CdtArgument::Int(index_bit_count.unwrap_or(-1)),
            CdtArgument::Int(min_hash_bit_count.unwrap_or(-1)),
            CdtArgument::Byte(policy.flags.bits()),
        ],
    )
}

/// Create HLL set union operation. Server sets the union of the given HLL sets with the bin's set.
/// Server does not return a value.
#[must_use]
pub fn set_union(policy: &HllPolicy, bin: &str, list: Vec<Value>) -> Operation {
    op(
        OperationType::HllWrite,
        bin,
        OpType::SetUnion,
        vec![
            CdtArgument::List(list),
            CdtArgument::Byte(policy.flags.bits()),
        ],
    )
}

/// Create HLL refresh operation. Server updates the cached count (if stale) and returns it.
#[must_use]
pub fn refresh_count(bin: &str) -> Operation {
    op(OperationType::HllWrite, bin, OpType::SetCount, vec![])
}

/// Create HLL fold operation. Server folds the index bit count to the smaller value. Only works on
/// sets without min hash bits. Server does not return a value.
#[must_use]
pub fn fold(bin: &str, index_bit_count: i64) -> Operation {
    op(
        OperationType::HllWrite,
        bin,
        OpType::Fold,
        vec![CdtArgument::Int(index_bit_count)],
    )
}

/// Create HLL get count operation. Server returns the estimated number of elements in the set.
#[must_use]
pub fn get_count(bin: &str) -> Operation {
    op(OperationType::HllRead, bin, OpType::Count, vec![])
}

/// Create HLL get union operation. Server returns the union of the given sets with the bin's set
/// as an HLL value.
#[must_use]
pub fn get_union(bin: &str, list: Vec<Value>) -> Operation {
    op(
        OperationType::HllRead,
        bin,
        OpType::Union,
        vec![CdtArgument::List(list)],
    )
}

/// Create HLL get union count operation. Server returns the estimated number of elements of the
/// union.
#[must_use]
pub fn get_union_count(bin: &str, list: Vec<Value>) -> Operation {
    op(
        OperationType::HllRead,
        bin,
        OpType::UnionCount,
        vec![CdtArgument::List(list)],
    )
}

/// Create HLL get intersect count operation. Server returns the estimated number of elements of
/// the intersection.
#[must_use]
pub fn get_intersect_count(bin: &str, list: Vec<Value>) -> Operation {
    op(
        OperationType::HllRead,
        bin,
        OpType::IntersectCount,
        vec![CdtArgument::List(list)],
    )
}

/// Create HLL get similarity operation. Server returns the estimated similarity of the sets as a
/// float.
#[must_use]
pub fn get_similarity(bin: &str, list: Vec<Value>) -> Operation {
    op(
        OperationType::HllRead,
        bin,
        OpType::Similarity,
        vec![CdtArgument::List(list)],
    )
}

/// Create HLL describe operation. Server returns the index and min hash bit counts as a list.
#[must_use]
pub fn describe(bin: &str) -> Operation {
    op(OperationType::HllRead, bin, OpType::Describe, vec![])
}
