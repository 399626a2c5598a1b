//! List bin operations. Create list operations used by the client's `operate()` method.
//!
//! List operations support negative indexing. If the index is negative, the resolved index starts
//! backwards from the end of the list.
//!
//! Index/Count examples:
//!
//! * Index 0: First item in list.
//! * Index 4: Fifth item in list.
//! * Index -1: Last item in list.
//! * Index -3: Third to last item in list.
//! * Index 1, Count 2: Second and third item in list.
//! * Index -3, Count 3: Last three items in list.
//! * Index -5, Count 4: Range between fifth to last item to second to last item inclusive.
//!
//! If an index is out of bounds, a parameter error will be returned. If a range is partially out of
//! bounds, the valid part of the range will be returned.

use bitflags::bitflags;

use crate::{
    operations::{
        cdt::{CdtArgument, CdtOperation},
        Operation, OperationBin, OperationData, OperationType,
    },
    Value,
};

#[derive(Clone, Copy, Debug)]
enum OpType {
    SetType = 0,
    Append,
    AppendItems,
    Insert,
    InsertItems,
    Pop,
    PopRange,
    Remove,
    RemoveRange,
    Set,
    Trim,
    Clear,
    Increment,
    Sort,
    Size = 16,
    Get,
    GetRange,
    GetByIndex,
    GetByRank = 21,
    GetByValue,
    GetByValueList,
    GetByIndexRange,
    GetByValueInterval,
    GetByRankRange,
    GetByValueRelRankRange,
    RemoveByIndex = 32,
    RemoveByRank = 34,
    RemoveByValue,
    RemoveByValueList,
    RemoveByIndexRange,
    RemoveByValueInterval,
    RemoveByRankRange,
    RemoveByValueRelRankRange,
}

/// List storage order.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ListOrderType {
    /// List is not ordered. This is the default.
    #[default]
    Unordered = 0,
    /// List is ordered.
    Ordered,
}

impl ListOrderType {
    /// Flag of a context step that creates the list when missing.
    pub(crate) const fn context_flag(self, pad: bool) -> i64 {
        match (self, pad) {
            (Self::Ordered, _) => 0xc0,
            (Self::Unordered, true) => 0x80,
            (Self::Unordered, false) => 0x40,
        }
    }
}

/// Determines the returned values of list select and remove operations. Use
/// [`Operation::inverted`] to select everything except the addressed items.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ListReturnType {
    /// Do not return a result.
    None = 0,
    /// Return index offset order.
    /// 0 = first key
    /// N = Nth key
    /// -1 = last key
    Index,
    /// Return reverse index offset order.
    /// 0 = last key
    /// -1 = first key
    ReverseIndex,
    /// Return value order.
    /// 0 = smallest value
    /// N = Nth smallest value
    /// -1 = largest value
    Rank,
    /// Return reserve value order.
    /// 0 = largest value
    /// N = Nth largest value
    /// -1 = smallest value
    ReverseRank,
    /// Return count of items selected.
    Count,
    /// Return value for single key read and value list for range read.
    Values = 7,
    /// Return true if count > 0.
    Exists = 13,
}

bitflags! {
    /// Determines sort flags for lists.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ListSortFlags: u8 {
        /// Sort the contents of the list in descending order.
        const DESCENDING = 1;
        /// Drop duplicate values while sorting.
        const DROP_DUPLICATES = 2;
    }
}

bitflags! {
    /// Determines write flags for lists.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ListWriteFlags: u8 {
        /// Only add unique values.
        const ADD_UNIQUE = 1;
        /// Enforce list boundaries when inserting. Do not allow values to be inserted at an index
        /// outside current list boundaries.
        const INSERT_BOUNDED = 2;
        /// Do not raise an error if a list item fails due to write flag constraints.
        const NO_FAIL = 4;
        /// Allow other valid list items to be committed if a list item fails due to write flag
        /// constraints.
        const PARTIAL = 8;
    }
}

/// Directives when creating a list and writing list items.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ListPolicy {
    pub order: ListOrderType,
    pub flags: ListWriteFlags,
}

impl ListPolicy {
    #[must_use]
    pub const fn new(order: ListOrderType, flags: ListWriteFlags) -> Self {
        Self { order, flags }
    }
}

fn op(kind: OperationType, bin: &str, op: OpType, args: Vec<CdtArgument>) -> Operation {
    Operation::new(
        kind,
        OperationBin::Name(bin.to_owned()),
        OperationData::Cdt(CdtOperation::new(op as u8, args)),
    )
}

fn write(bin: &str, ty: OpType, args: Vec<CdtArgument>) -> Operation {
    op(OperationType::CdtWrite, bin, ty, args)
}

fn read(bin: &str, ty: OpType, args: Vec<CdtArgument>) -> Operation {
    op(OperationType::CdtRead, bin, ty, args)
}

fn return_type(rt: ListReturnType) -> CdtArgument {
    CdtArgument::ReturnType(rt as i64)
}

/// Creates a list create operation. The server creates a list at the given context level. With a
/// context, the context is allowed to be beyond list boundaries only if `pad` is set, in which
/// case nil entries are inserted to satisfy the context position. Without a context, this is the
/// same as [`set_order`].
#[must_use]
pub fn create(bin: &str, order: ListOrderType, pad: bool) -> Operation {
    let mut op = set_order(bin, order);
    if let OperationData::Cdt(cdt) = &mut op.data {
        cdt.create_flag = order.context_flag(pad);
    }
    op
}

/// Creates a set list order operation. Server sets list order. Server returns null.
#[must_use]
pub fn set_order(bin: &str, order: ListOrderType) -> Operation {
    write(bin, OpType::SetType, vec![CdtArgument::Byte(order as u8)])
}

/// Creates a list append operation. Server appends the value to the end of the list bin. Server
/// returns the list size.
#[must_use]
pub fn append(policy: &ListPolicy, bin: &str, value: impl Into<Value>) -> Operation {
    write(
        bin,
        OpType::Append,
        vec![
            CdtArgument::Value(value.into()),
            CdtArgument::Byte(policy.order as u8),
            CdtArgument::Byte(policy.flags.bits()),
        ],
    )
}

/// Creates a list append items operation. Server appends each input list item to the end of the
/// list bin. Server returns the list size.
#[must_use]
pub fn append_items(policy: &ListPolicy, bin: &str, values: Vec<Value>) -> Operation {
    write(
        bin,
        OpType::AppendItems,
        vec![
            CdtArgument::List(values),
            CdtArgument::Byte(policy.order as u8),
            CdtArgument::Byte(policy.flags.bits()),
        ],
    )
}

/// Creates a list insert operation. Server inserts the value at the specified index of the list
/// bin. Server returns the list size.
#[must_use]
pub fn insert(policy: &ListPolicy, bin: &str, index: i64, value: impl Into<Value>) -> Operation {
    write(
        bin,
        OpType::Insert,
        vec![
            CdtArgument::Int(index),
            CdtArgument::Value(value.into()),
            CdtArgument::Byte(policy.flags.bits()),
        ],
    )
}

/// Creates a list insert items operation. Server inserts each input list item starting at the
/// specified index of the list bin. Server returns the list size.
#[must_use]
pub fn insert_items(policy: &ListPolicy, bin: &str, index: i64, values: Vec<Value>) -> Operation {
    write(
        bin,
        OpType::InsertItems,
        vec![
            CdtArgument::Int(index),
            CdtArgument::List(values),
            CdtArgument::Byte(policy.flags.bits()),
        ],
    )
}

/// Creates a list pop operation. Server returns the item at the specified index and removes it
/// from the list bin.
#[must_use]
pub fn pop(bin: &str, index: i64) -> Operation {
    write(bin, OpType::Pop, vec![CdtArgument::Int(index)])
}

/// Creates a list pop range operation. Server returns `count` items starting at the specified
/// index and removes them from the list bin.
#[must_use]
pub fn pop_range(bin: &str, index: i64, count: i64) -> Operation {
    write(
        bin,
        OpType::PopRange,
        vec![CdtArgument::Int(index), CdtArgument::Count(count)],
    )
}

/// Creates a list pop range operation. Server returns the items starting at the specified index
/// to the end of the list and removes them from the list bin.
#[must_use]
pub fn pop_range_from(bin: &str, index: i64) -> Operation {
    write(bin, OpType::PopRange, vec![CdtArgument::Int(index)])
}

/// Creates a list remove operation. Server removes the item at the specified index from the list
/// bin. Server returns the number of items removed.
#[must_use]
pub fn remove(bin: &str, index: i64) -> Operation {
    write(bin, OpType::Remove, vec![CdtArgument::Int(index)])
}

/// Creates a list remove range operation. Server removes `count` items starting at the specified
/// index from the list bin. Server returns the number of items removed.
#[must_use]
pub fn remove_range(bin: &str, index: i64, count: i64) -> Operation {
    write(
        bin,
        OpType::RemoveRange,
        vec![CdtArgument::Int(index), CdtArgument::Count(count)],
    )
}

/// Creates a list remove range operation. Server removes all items starting at the specified
/// index to the end of the list. Server returns the number of items removed.
#[must_use]
pub fn remove_range_from(bin: &str, index: i64) -> Operation {
    write(bin, OpType::RemoveRange, vec![CdtArgument::Int(index)])
}

/// Creates a list set operation. Server sets the item value at the specified index in the list
/// bin. Server does not return a result by default.
#[must_use]
pub fn set(policy: &ListPolicy, bin: &str, index: i64, value: impl Into<Value>) -> Operation {
    write(
        bin,
        OpType::Set,
        vec![
            CdtArgument::Int(index),
            CdtArgument::Value(value.into()),
            CdtArgument::Byte(policy.flags.bits()),
        ],
    )
}

/// Creates a list trim operation. Server removes items in the list bin that do not fall into the
/// range specified by index and count. Server returns the number of items removed.
#[must_use]
pub fn trim(bin: &str, index: i64, count: i64) -> Operation {
    write(
        bin,
        OpType::Trim,
        vec![CdtArgument::Int(index), CdtArgument::Count(count)],
    )
}

/// Creates a list clear operation. Server removes all items in the list bin. Server does not
/// return a result by default.
#[must_use]
pub fn clear(bin: &str) -> Operation {
    write(bin, OpType::Clear, vec![])
}

/// Creates a list increment operation. Server increments the item value at the index by the given
/// amount and returns the final result.
#[must_use]
pub fn increment(policy: &ListPolicy, bin: &str, index: i64, value: impl Into<Value>) -> Operation {
    write(
        bin,
        OpType::Increment,
        vec![
            CdtArgument::Int(index),
            CdtArgument::Value(value.into()),
            CdtArgument::Byte(policy.order as u8),
            CdtArgument::Byte(policy.flags.bits()),
        ],
    )
}

/// Creates a list sort operation. Server sorts the list according to the flags. Server does not
/// return a result by default.
#[must_use]
pub fn sort(bin: &str, flags: ListSortFlags) -> Operation {
    write(bin, OpType::Sort, vec![CdtArgument::Byte(flags.bits())])
}

/// Creates a list size operation. Server returns the size of the list.
#[must_use]
pub fn size(bin: &str) -> Operation {
    read(bin, OpType::Size, vec![])
}

/// Creates a list get operation. Server returns the item at the specified index in the list bin.
#[must_use]
pub fn get(bin: &str, index: i64) -> Operation {
    read(bin, OpType::Get, vec![CdtArgument::Int(index)])
}

/// Creates a list get range operation. Server returns `count` items starting at the index.
#[must_use]
pub fn get_range(bin: &str, index: i64, count: i64) -> Operation {
    read(
        bin,
        OpType::GetRange,
        vec![CdtArgument::Int(index), CdtArgument::Count(count)],
    )
}

/// Creates a list get range operation. Server returns the items from the index to the end of the
/// list.
#[must_use]
pub fn get_range_from(bin: &str, index: i64) -> Operation {
    read(bin, OpType::GetRange, vec![CdtArgument::Int(index)])
}

/// Creates a get by index operation. Server selects the list item identified by index and returns
/// the selected data specified by `return_type`.
#[must_use]
pub fn get_by_index(bin: &str, index: i64, rt: ListReturnType) -> Operation {
    read(
        bin,
        OpType::GetByIndex,
        vec![return_type(rt), CdtArgument::Int(index)],
    )
}

/// Creates a get by index range operation. Server selects `count` list items starting at the
/// index and returns the selected data specified by `return_type`.
#[must_use]
pub fn get_by_index_range(bin: &str, index: i64, count: i64, rt: ListReturnType) -> Operation {
    read(
        bin,
        OpType::GetByIndexRange,
        vec![
            return_type(rt),
            CdtArgument::Int(index),
            CdtArgument::Count(count),
        ],
    )
}

/// Creates a get by index range operation. Server selects the list items from the index to the
/// end of the list.
#[must_use]
pub fn get_by_index_range_from(bin: &str, index: i64, rt: ListReturnType) -> Operation {
    read(
        bin,
        OpType::GetByIndexRange,
        vec![return_type(rt), CdtArgument::Int(index)],
    )
}

/// Creates a get by rank operation. Server selects the list item identified by rank.
#[must_use]
pub fn get_by_rank(bin: &str, rank: i64, rt: ListReturnType) -> Operation {
    read(
        bin,
        OpType::GetByRank,
        vec![return_type(rt), CdtArgument::Int(rank)],
    )
}

/// Creates a get by rank range operation. Server selects `count` list items starting at the rank.
#[must_use]
pub fn get_by_rank_range(bin: &str, rank: i64, count: i64, rt: ListReturnType) -> Operation {
    read(
        bin,
        OpType::GetByRankRange,
        vec![
            return_type(rt),
            CdtArgument::Int(rank),
            CdtArgument::Count(count),
        ],
    )
}

/// Creates a get by rank range operation. Server selects the list items from the rank to the
/// highest ranked item.
#[must_use]
pub fn get_by_rank_range_from(bin: &str, rank: i64, rt: ListReturnType) -> Operation {
    read(
        bin,
        OpType::GetByRankRange,
        vec![return_type(rt), CdtArgument::Int(rank)],
    )
}

/// Creates a get by value operation. Server selects the list items equal to the value.
#[must_use]
pub fn get_by_value(bin: &str, value: impl Into<Value>, rt: ListReturnType) -> Operation {
    read(
        bin,
        OpType::GetByValue,
        vec![return_type(rt), CdtArgument::Value(value.into())],
    )
}

/// Creates a get by value list operation. Server selects the list items equal to any of the
/// values.
#[must_use]
pub fn get_by_value_list(bin: &str, values: Vec<Value>, rt: ListReturnType) -> Operation {
    read(
        bin,
        OpType::GetByValueList,
        vec![return_type(rt), CdtArgument::List(values)],
    )
}

/// Creates a get by value range operation. Server selects the list items with values in the range
/// `begin..end`. A [`Value::Nil`] begin is less than all values, a [`Value::Nil`] end is greater
/// than all values.
#[must_use]
pub fn get_by_value_range(
    bin: &str,
    begin: impl Into<Value>,
    end: impl Into<Value>,
    rt: ListReturnType,
) -> Operation {
    read(
        bin,
        OpType::GetByValueInterval,
        range_args(rt, begin.into(), end.into()),
    )
}

/// Creates a get by value relative to rank range operation. Server selects the list items nearest
/// to the value and greater by relative rank.
///
/// Examples for ordered list `[0, 4, 5, 9, 11, 15]`:
///
/// ```text
/// (value,rank,count) = [selected items]
/// (5,0,2) = [5,9]
/// (5,1,1) = [9]
/// (5,-1,2) = [4,5]
/// (3,0,1) = [4]
/// (3,3,7) = [11,15]
/// (3,-3,2) = []
/// ```
#[must_use]
pub fn get_by_value_relative_rank_range(
    bin: &str,
    value: impl Into<Value>,
    rank: i64,
    count: Option<i64>,
    rt: ListReturnType,
) -> Operation {
    read(
        bin,
        OpType::GetByValueRelRankRange,
        relative_args(rt, value.into(), rank, count),
    )
}

/// Creates a remove by index operation. Server removes the list item identified by index.
#[must_use]
pub fn remove_by_index(bin: &str, index: i64, rt: ListReturnType) -> Operation {
    write(
        bin,
        OpType::RemoveByIndex,
        vec![return_type(rt), CdtArgument::Int(index)],
    )
}

/// Creates a remove by index range operation. Server removes `count` list items starting at the
/// index.
#[must_use]
pub fn remove_by_index_range(bin: &str, index: i64, count: i64, rt: ListReturnType) -> Operation {
    write(
        bin,
        OpType::RemoveByIndexRange,
        vec![
            return_type(rt),
            CdtArgument::Int(index),
            CdtArgument::Count(count),
        ],
    )
}

/// Creates a remove by index range operation. Server removes the list items from the index to the
/// end of the list.
#[must_use]
pub fn remove_by_index_range_from(bin: &str, index: i64, rt: ListReturnType) -> Operation {
    write(
        bin,
        OpType::RemoveByIndexRange,
        vec![return_type(rt), CdtArgument::Int(index)],
    )
}

/// Creates a remove by rank operation. Server removes the list item identified by rank.
#[must_use]
pub fn remove_by_rank(bin: &str, rank: i64, rt: ListReturnType) -> Operation {
    write(
        bin,
        OpType::RemoveByRank,
        vec![return_type(rt), CdtArgument::Int(rank)],
    )
}

/// Creates a remove by rank range operation. Server removes `count` list items starting at the
/// rank.
#[must_use]
pub fn remove_by_rank_range(bin: &str, rank: i64, count: i64, rt: ListReturnType) -> Operation {
    write(
        bin,
        OpType::RemoveByRankRange,
        vec![
            return_type(rt),
            CdtArgument::Int(rank),
            CdtArgument::Count(count),
        ],
    )
}

/// Creates a remove by rank range operation. Server removes the list items from the rank to the
/// highest ranked item.
#[must_use]
pub fn remove_by_rank_range_from(bin: &str, rank: i64, rt: ListReturnType) -> Operation {
    write(
        bin,
        OpType::RemoveByRankRange,
        vec![return_type(rt), CdtArgument::Int(rank)],
    )
}

/// Creates a remove by value operation. Server removes the list items equal to the value.
#[must_use]
pub fn remove_by_value(bin: &str, value: impl Into<Value>, rt: ListReturnType) -> Operation {
    write(
        bin,
        OpType::RemoveByValue,
        vec![return_type(rt), CdtArgument::Value(value.into())],
    )
}

/// Creates a remove by value list operation. Server removes the list items equal to any of the
/// values.
#[must_use]
pub fn remove_by_value_list(bin: &str, values: Vec<Value>, rt: ListReturnType) -> Operation {
    write(
        bin,
        OpType::RemoveByValueList,
        vec![return_type(rt), CdtArgument::List(values)],
    )
}

/// Creates a remove by value range operation. Server removes the list items with values in the
/// range `begin..end`.
#[must_use]
pub fn remove_by_value_range(
    bin: &str,
    begin: impl Into<Value>,
    end: impl Into<Value>,
    rt: ListReturnType,
) -> Operation {
    write(
        bin,
        OpType::RemoveByValueInterval,
        range_args(rt, begin.into(), end.into()),
    )
}

/// Creates a remove by value relative to rank range operation. Server removes the list items
/// nearest to the value and greater by relative rank. See
/// [`get_by_value_relative_rank_range`] for examples.
#[must_use]
pub fn remove_by_value_relative_rank_range(
    bin: &str,
    value: impl Into<Value>,
    rank: i64,
    count: Option<i64>,
    rt: ListReturnType,
) -> Operation {
    write(
        bin,
        OpType::RemoveByValueRelRankRange,
        relative_args(rt, value.into(), rank, count),
    )
}

/// An open end is left out entirely, so the server treats it as infinity.
fn range_args(rt: ListReturnType, begin: Value, end: Value) -> Vec<CdtArgument> {
    let mut args = vec![return_type(rt), CdtArgument::Value(begin)];
    if end != Value::Nil {
        args.push(CdtArgument::Value(end));
    }
    args
}

fn relative_args(
    rt: ListReturnType,
    value: Value,
    rank: i64,
    count: Option<i64>,
) -> Vec<CdtArgument> {
    let mut args = vec![
        return_type(rt),
        CdtArgument::Value(value),
        CdtArgument::Int(rank),
    ];
    if let Some(count) = count {
        args.push(CdtArgument::Count(count));
    }
    args
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
    fn append_with_policy() {
        let op = append(&ListPolicy::default(), "l", 7);
        assert_eq!(OperationType::CdtWrite, op.op);
        assert_eq!(vec![0x94, 1, 7, 0, 0], payload(&op));
    }

    #[test]
    fn open_ended_range() {
        let op = get_by_value_range("l", 5, Value::Nil, ListReturnType::Count);
        assert_eq!(vec![0x93, 25, 5, 5], payload(&op));
    }

    #[test]
    fn inverted_remove() {
        let op = remove_by_index_range("l", 0, 2, ListReturnType::Values).inverted();
        assert_eq!(
            vec![0x94, 37, 0xce, 0x00, 0x01, 0x00, 0x07, 0, 2],
            payload(&op)
        );
    }

    #[test]
    fn create_nested() {
        let op = create("l", ListOrderType::Ordered, false)
            .with_context(&[crate::operations::cdt::CdtContext::MapKey("k".into())]);
        assert_eq!(
            vec![0x93, 0xcc, 0xff, 0x92, 0xcc, 0xe2, 0xa2, 3, b'k', 0x92, 0, 1],
            payload(&op)
        );
    }

    #[test]
    fn negative_count() {
        assert!(get_range("l", 0, -2).validate().is_err());
        assert!(get_range("l", -2, 2).validate().is_ok());
    }
}
