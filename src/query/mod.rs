//! Types and methods used for database queries and scans.

pub use self::{
    filter::Filter,
    index_types::{CollectionIndexType, IndexType},
    partition_filter::{PartitionFilter, PartitionStatus},
    recordset::Recordset,
    statement::Statement,
};
pub(crate) use self::recordset::StreamState;

mod filter;
mod index_types;
mod partition_filter;
mod recordset;
mod statement;
