//! Unique key map bin operations. Create map operations used by the client's `operate()` method.
//!
//! All maps maintain an index and a rank. The index is the item offset from the start of the map,
//! for both unordered and ordered maps. The rank is the sorted index of the value component.
//! Map supports negative indexing for index and rank.
//!
//! The default unique key map is unordered.
//!
//! Index/Count examples:
//!
//! * Index 0: First item in map.
//! * Index 4: Fifth item in map.
//! * Index -1: Last item in map.
//! * Index -3: Third to last item in map.
//! * Index 1, Count 2: Second and third items in map.
//! * Index -3, Count 3: Last three items in map.
//! * Index -5, Count 4: Range between fifth to last item to second to last item inclusive.
//!
//! Rank examples:
//!
//! * Rank 0: Item with lowest value rank in map.
//! * Rank 4: Fifth lowest ranked item in map.
//! * Rank -1: Item with highest ranked value in map.
//! * Rank -3: Item with third highest ranked value in map.
//! * Rank 1 Count 2: Second and third lowest ranked items in map.
//! * Rank -3 Count 3: Top three ranked items in map.

use std::collections::HashMap;

use bitflags::bitflags;

use crate::{
    operations::{
        cdt::{CdtArgument, CdtOperation},
        Operation, OperationBin, OperationData, OperationType,
    },
    MapKey, Value,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum OpType {
    SetType = 64,
    Put = 67,
    PutItems,
    Increment = 73,
    Clear = 75,
    RemoveByKey,
    RemoveByIndex,
    RemoveByRank = 79,
    RemoveKeyList = 81,
    RemoveByValue,
    RemoveValueList,
    RemoveByKeyInterval,
    RemoveByIndexRange,
    RemoveByValueInterval,
    RemoveByRankRange,
    RemoveByKeyRelIndexRange,
    RemoveByValueRelRankRange,
    Size = 96,
    GetByKey,
    GetByIndex,
    GetByRank = 100,
    GetByValue = 102,
    GetByKeyInterval,
    GetByIndexRange,
    GetByValueInterval,
    GetByRankRange,
    GetByKeyList,
    GetByValueList,
    GetByKeyRelIndexRange,
    GetByValueRelRankRange,
}

/// Map storage order. The order is a property of the stored bin, the same map value can be written
/// with any order.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MapOrder {
    /// Map is not ordered. This is the default.
    #[default]
    Unordered = 0,
    /// Order map by key.
    KeyOrdered = 1,
    /// Order map by key, then value.
    KeyValueOrdered = 3,
}

impl MapOrder {
    /// Flag of a context step that creates the map when missing.
    pub(crate) const fn context_flag(self) -> i64 {
        match self {
            Self::Unordered => 0x40,
            Self::KeyOrdered => 0x80,
            Self::KeyValueOrdered => 0xc0,
        }
    }
}

/// Map return type. Type of data to return when selecting or removing items from the map. Use
/// [`Operation::inverted`] to select everything except the addressed items.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MapReturnType {
    /// Do not return a result.
    None = 0,
    /// Return key index order.
    ///
    /// * 0 = first key
    /// * N = Nth key
    /// * -1 = last key
    Index,
    /// Return reverse key order.
    ///
    /// * 0 = last key
    /// * -1 = first key
    ReverseIndex,
    /// Return value order.
    ///
    /// * 0 = smallest value
    /// * N = Nth smallest value
    /// * -1 = largest value
    Rank,
    /// Return reserve value order.
    ///
    /// * 0 = largest value
    /// * N = Nth largest value
    /// * -1 = smallest value
    ReverseRank,
    /// Return count of items selected.
    Count,
    /// Return key for single key read and key list for range read.
    Key,
    /// Return value for single key read and value list for range read.
    Value,
    /// Return key/value items.
    KeyValue,
    /// Return true if count > 0.
    Exists = 13,
}

bitflags! {
    /// Map write flags.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct MapWriteFlags: u8 {
        /// If the key already exists, the item will be denied.
        const CREATE_ONLY = 1;
        /// If the key doesn't exist, the item will be denied.
        const UPDATE_ONLY = 2;
        /// Do not raise an error if a map item is denied due to write flag constraints.
        const NO_FAIL = 4;
        /// Allow other valid map items to be committed if a map item is denied due to write flag
        /// constraints.
        const PARTIAL = 8;
    }
}

/// Directives when creating a map and writing map items.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MapPolicy {
    pub order: MapOrder,
    pub flags: MapWriteFlags,
}

impl MapPolicy {
    #[must_use]
    pub const fn new(order: MapOrder, flags: MapWriteFlags) -> Self {
        Self { order, flags }
    }

    fn args(self) -> impl Iterator<Item = CdtArgument> {
        let flags = (!self.flags.is_empty()).then(|| CdtArgument::Byte(self.flags.bits()));
        std::iter::once(CdtArgument::Byte(self.order as u8)).chain(flags)
    }
}

fn op(kind: OperationType, bin: &str, ty: OpType, args: Vec<CdtArgument>) -> Operation {
    Operation::new(
        kind,
        OperationBin::Name(bin.to_owned()),
        OperationData::Cdt(CdtOperation::new(ty as u8, args)),
    )
}

fn write(bin: &str, ty: OpType, args: Vec<CdtArgument>) -> Operation {
    op(OperationType::CdtWrite, bin, ty, args)
}

fn read(bin: &str, ty: OpType, args: Vec<CdtArgument>) -> Operation {
    op(OperationType::CdtRead, bin, ty, args)
}

fn return_type(rt: MapReturnType) -> CdtArgument {
    CdtArgument::ReturnType(rt as i64)
}

fn key_list(keys: Vec<MapKey>) -> CdtArgument {
    CdtArgument::List(keys.into_iter().map(Value::from).collect())
}

/// Creates a map create operation. With a context, the server creates the map at the context
/// level if it doesn't exist yet. Without a context, this is the same as [`set_order`].
#[must_use]
pub fn create(bin: &str, order: MapOrder) -> Operation {
    let mut op = set_order(bin, order);
    if let OperationData::Cdt(cdt) = &mut op.data {
        cdt.create_flag = order.context_flag();
    }
    op
}

/// Creates a set map order operation. Server sets the map order. Server returns null.
#[must_use]
pub fn set_order(bin: &str, order: MapOrder) -> Operation {
    write(bin, OpType::SetType, vec![CdtArgument::Byte(order as u8)])
}

/// Creates a map put operation. Server writes the key/value item to the map bin and returns the
/// map size.
#[must_use]
pub fn put(
    policy: &MapPolicy,
    bin: &str,
    key: impl Into<MapKey>,
    value: impl Into<Value>,
) -> Operation {
    let mut args = vec![
        CdtArgument::Key(key.into()),
        CdtArgument::Value(value.into()),
    ];
    args.extend(policy.args());
    write(bin, OpType::Put, args)
}

/// Creates a map put items operation. Server writes each map item to the map bin and returns the
/// map size.
#[must_use]
pub fn put_items(policy: &MapPolicy, bin: &str, items: HashMap<MapKey, Value>) -> Operation {
    let mut args = vec![CdtArgument::Map(items)];
    args.extend(policy.args());
    write(bin, OpType::PutItems, args)
}

/// Creates a map increment operation. Server increments the value of the key by `incr`. The value
/// must be numeric and a missing key is treated as zero. Server returns the final value.
#[must_use]
pub fn increment_value(
    policy: &MapPolicy,
    bin: &str,
    key: impl Into<MapKey>,
    incr: impl Into<Value>,
) -> Operation {
    write(
        bin,
        OpType::Increment,
        vec![
            CdtArgument::Key(key.into()),
            CdtArgument::Value(incr.into()),
            CdtArgument::Byte(policy.order as u8),
        ],
    )
}

/// Creates a map clear operation. Server removes all items in the map. Server does not return a
/// result by default.
#[must_use]
pub fn clear(bin: &str) -> Operation {
    write(bin, OpType::Clear, vec![])
}

/// Creates a map size operation. Server returns the number of items in the map.
#[must_use]
pub fn size(bin: &str) -> Operation {
    read(bin, OpType::Size, vec![])
}

/// Creates a map remove operation. Server removes the map item identified by key.
#[must_use]
pub fn remove_by_key(bin: &str, key: impl Into<MapKey>, rt: MapReturnType) -> Operation {
    write(
        bin,
        OpType::RemoveByKey,
        vec![return_type(rt), CdtArgument::Key(key.into())],
    )
}

/// Creates a map remove operation. Server removes the map items identified by the keys.
#[must_use]
pub fn remove_by_key_list(bin: &str, keys: Vec<MapKey>, rt: MapReturnType) -> Operation {
    write(
        bin,
        OpType::RemoveKeyList,
        vec![return_type(rt), key_list(keys)],
    )
}

/// Creates a map remove operation. Server removes the map items with keys in the range
/// `begin..end`. A [`Value::Nil`] begin is less than all keys, a [`Value::Nil`] end is greater
/// than all keys.
#[must_use]
pub fn remove_by_key_range(
    bin: &str,
    begin: impl Into<Value>,
    end: impl Into<Value>,
    rt: MapReturnType,
) -> Operation {
    write(
        bin,
        OpType::RemoveByKeyInterval,
        range_args(rt, begin.into(), end.into()),
    )
}

/// Creates a map remove operation. Server removes the map items with the value.
#[must_use]
pub fn remove_by_value(bin: &str, value: impl Into<Value>, rt: MapReturnType) -> Operation {
    write(
        bin,
        OpType::RemoveByValue,
        vec![return_type(rt), CdtArgument::Value(value.into())],
    )
}

/// Creates a map remove operation. Server removes the map items with any of the values.
#[must_use]
pub fn remove_by_value_list(bin: &str, values: Vec<Value>, rt: MapReturnType) -> Operation {
    write(
        bin,
        OpType::RemoveValueList,
        vec![return_type(rt), CdtArgument::List(values)],
    )
}

/// Creates a map remove operation. Server removes the map items with values in the range
/// `begin..end`.
#[must_use]
pub fn remove_by_value_range(
    bin: &str,
    begin: impl Into<Value>,
    end: impl Into<Value>,
    rt: MapReturnType,
) -> Operation {
    write(
        bin,
        OpType::RemoveByValueInterval,
        range_args(rt, begin.into(), end.into()),
    )
}

/// Creates a map remove operation. Server removes the map item at the index.
#[must_use]
pub fn remove_by_index(bin: &str, index: i64, rt: MapReturnType) -> Operation {
    write(
        bin,
        OpType::RemoveByIndex,
        vec![return_type(rt), CdtArgument::Int(index)],
    )
}

/// Creates a map remove operation. Server removes `count` map items starting at the index.
#[must_use]
pub fn remove_by_index_range(bin: &str, index: i64, count: i64, rt: MapReturnType) -> Operation {
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

/// Creates a map remove operation. Server removes the map items from the index to the end of the
/// map.
#[must_use]
pub fn remove_by_index_range_from(bin: &str, index: i64, rt: MapReturnType) -> Operation {
    write(
        bin,
        OpType::RemoveByIndexRange,
        vec![return_type(rt), CdtArgument::Int(index)],
    )
}

/// Creates a map remove operation. Server removes the map item with the rank.
#[must_use]
pub fn remove_by_rank(bin: &str, rank: i64, rt: MapReturnType) -> Operation {
    write(
        bin,
        OpType::RemoveByRank,
        vec![return_type(rt), CdtArgument::Int(rank)],
    )
}

/// Creates a map remove operation. Server removes `count` map items starting at the rank.
#[must_use]
pub fn remove_by_rank_range(bin: &str, rank: i64, count: i64, rt: MapReturnType) -> Operation {
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

/// Creates a map remove operation. Server removes the map items from the rank to the highest
/// ranked item.
#[must_use]
pub fn remove_by_rank_range_from(bin: &str, rank: i64, rt: MapReturnType) -> Operation {
    write(
        bin,
        OpType::RemoveByRankRange,
        vec![return_type(rt), CdtArgument::Int(rank)],
    )
}

/// Creates a map remove operation. Server removes the map items nearest to the key and greater by
/// index. See [`get_by_key_relative_index_range`] for examples.
#[must_use]
pub fn remove_by_key_relative_index_range(
    bin: &str,
    key: impl Into<MapKey>,
    index: i64,
    count: Option<i64>,
    rt: MapReturnType,
) -> Operation {
    write(
        bin,
        OpType::RemoveByKeyRelIndexRange,
        relative_args(rt, CdtArgument::Key(key.into()), index, count),
    )
}

/// Creates a map remove operation. Server removes the map items nearest to the value and greater
/// by relative rank. See [`get_by_value_relative_rank_range`] for examples.
#[must_use]
pub fn remove_by_value_relative_rank_range(
    bin: &str,
    value: impl Into<Value>,
    rank: i64,
    count: Option<i64>,
    rt: MapReturnType,
) -> Operation {
    write(
        bin,
        OpType::RemoveByValueRelRankRange,
        relative_args(rt, CdtArgument::Value(value.into()), rank, count),
    )
}

/// Creates a map get by key operation. Server selects the map item identified by key.
#[must_use]
pub fn get_by_key(bin: &str, key: impl Into<MapKey>, rt: MapReturnType) -> Operation {
    read(
        bin,
        OpType::GetByKey,
        vec![return_type(rt), CdtArgument::Key(key.into())],
    )
}

/// Creates a map get by key list operation. Server selects the map items identified by the keys.
#[must_use]
pub fn get_by_key_list(bin: &str, keys: Vec<MapKey>, rt: MapReturnType) -> Operation {
    read(
        bin,
        OpType::GetByKeyList,
        vec![return_type(rt), key_list(keys)],
    )
}

/// Creates a map get by key range operation. Server selects the map items with keys in the range
/// `begin..end`.
#[must_use]
pub fn get_by_key_range(
    bin: &str,
    begin: impl Into<Value>,
    end: impl Into<Value>,
    rt: MapReturnType,
) -> Operation {
    read(
        bin,
        OpType::GetByKeyInterval,
        range_args(rt, begin.into(), end.into()),
    )
}

/// Creates a map get by value operation. Server selects the map items with the value.
#[must_use]
pub fn get_by_value(bin: &str, value: impl Into<Value>, rt: MapReturnType) -> Operation {
    read(
        bin,
        OpType::GetByValue,
        vec![return_type(rt), CdtArgument::Value(value.into())],
    )
}

/// Creates a map get by value list operation. Server selects the map items with any of the values.
#[must_use]
pub fn get_by_value_list(bin: &str, values: Vec<Value>, rt: MapReturnType) -> Operation {
    read(
        bin,
        OpType::GetByValueList,
        vec![return_type(rt), CdtArgument::List(values)],
    )
}

/// Creates a map get by value range operation. Server selects the map items with values in the
/// range `begin..end`.
#[must_use]
pub fn get_by_value_range(
    bin: &str,
    begin: impl Into<Value>,
    end: impl Into<Value>,
    rt: MapReturnType,
) -> Operation {
    read(
        bin,
        OpType::GetByValueInterval,
        range_args(rt, begin.into(), end.into()),
    )
}

/// Creates a map get by index operation. Server selects the map item at the index.
#[must_use]
pub fn get_by_index(bin: &str, index: i64, rt: MapReturnType) -> Operation {
    read(
        bin,
        OpType::GetByIndex,
        vec![return_type(rt), CdtArgument::Int(index)],
    )
}

/// Creates a map get by index range operation. Server selects `count` map items starting at the
/// index.
#[must_use]
pub fn get_by_index_range(bin: &str, index: i64, count: i64, rt: MapReturnType) -> Operation {
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

/// Creates a map get by index range operation. Server selects the map items from the index to the
/// end of the map.
#[must_use]
pub fn get_by_index_range_from(bin: &str, index: i64, rt: MapReturnType) -> Operation {
    read(
        bin,
        OpType::GetByIndexRange,
        vec![return_type(rt), CdtArgument::Int(index)],
    )
}

/// Creates a map get by rank operation. Server selects the map item with the rank.
#[must_use]
pub fn get_by_rank(bin: &str, rank: i64, rt: MapReturnType) -> Operation {
    read(
        bin,
        OpType::GetByRank,
        vec![return_type(rt), CdtArgument::Int(rank)],
    )
}

/// Creates a map get by rank range operation. Server selects `count` map items starting at the
/// rank.
#[must_use]
pub fn get_by_rank_range(bin: &str, rank: i64, count: i64, rt: MapReturnType) -> Operation {
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

/// Creates a map get by rank range operation. Server selects the map items from the rank to the
/// highest ranked item.
#[must_use]
pub fn get_by_rank_range_from(bin: &str, rank: i64, rt: MapReturnType) -> Operation {
    read(
        bin,
        OpType::GetByRankRange,
        vec![return_type(rt), CdtArgument::Int(rank)],
    )
}

/// Creates a map get by key relative to index range operation. Server selects the map items
/// nearest to the key and greater by index.
///
/// Examples for ordered map `{0=17, 4=2, 5=15, 9=10}`:
///
/// ```text
/// (key,index,count) = [selected items]
/// (5,0,1) = [{5=15}]
/// (5,1,2) = [{9=10}]
/// (5,-1,1) = [{4=2}]
/// (3,2,1) = [{9=10}]
/// (3,-2,2) = [{0=17}]
/// ```
#[must_use]
pub fn get_by_key_relative_index_range(
    bin: &str,
    key: impl Into<MapKey>,
    index: i64,
    count: Option<i64>,
    rt: MapReturnType,
) -> Operation {
    read(
        bin,
        OpType::GetByKeyRelIndexRange,
        relative_args(rt, CdtArgument::Key(key.into()), index, count),
    )
}

/// Creates a map get by value relative to rank range operation. Server selects the map items
/// nearest to the value and greater by relative rank.
///
/// Examples for map `{4=2, 9=10, 5=15, 0=17}`:
///
/// ```text
/// (value,rank,count) = [selected items]
/// (11,1,1) = [{0=17}]
/// (11,-1,1) = [{9=10}]
/// ```
#[must_use]
pub fn get_by_value_relative_rank_range(
    bin: &str,
    value: impl Into<Value>,
    rank: i64,
    count: Option<i64>,
    rt: MapReturnType,
) -> Operation {
    read(
        bin,
        OpType::GetByValueRelRankRange,
        relative_args(rt, CdtArgument::Value(value.into()), rank, count),
    )
}

fn range_args(rt: MapReturnType, begin: Value, end: Value) -> Vec<CdtArgument> {
    let mut args = vec![return_type(rt), CdtArgument::Value(begin)];
    if end != Value::Nil {
        args.push(CdtArgument::Value(end));
    }
    args
}

fn relative_args(
    rt: MapReturnType,
    anchor: CdtArgument,
    offset: i64,
    count: Option<i64>,
) -> Vec<CdtArgument> {
    let mut args = vec![return_type(rt), anchor, CdtArgument::Int(offset)];
    if let Some(count) = count {
        args.push(CdtArgument::Count(count));
    }
    args
}
