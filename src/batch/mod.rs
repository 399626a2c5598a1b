//! Batch commands, that bundle independent reads and writes of many records into one call.
//!
//! Every entry of a batch succeeds or fails on its own. The result of each entry is reported in
//! a [`BatchRecord`], in the same order as the operations were passed in.
//!
//! ```rust
//! use windpike::{
//!     batch::BatchOperation,
//!     operations::scalar,
//!     Bin, Bins, Key,
//! };
//!
//! let ops = vec![
//!     BatchOperation::read(Key::new("test", "demo", 1), Bins::All),
//!     BatchOperation::write(
//!         Key::new("test", "demo", 2),
//!         vec![scalar::put(&Bin::new("a", 1))],
//!     ),
//!     BatchOperation::delete(Key::new("test", "demo", 3)),
//! ];
//! ```

pub(crate) mod batch_executor;

use crate::{
    errors::Result,
    operations::Operation,
    policies::{BatchDeletePolicy, BatchReadPolicy, BatchUdfPolicy, BatchWritePolicy},
    Bins, Key, Record, ResultCode, Value,
};

/// A single entry of a batch.
#[derive(Clone, Debug)]
pub enum BatchOperation {
    Read(BatchRead),
    Write(BatchWrite),
    Delete(BatchDelete),
    Udf(BatchUdf),
}

impl BatchOperation {
    /// Read the selected bins of a record.
    #[must_use]
    pub fn read(key: Key, bins: Bins) -> Self {
        Self::Read(BatchRead {
            key,
            policy: BatchReadPolicy::default(),
            bins,
            ops: Vec::new(),
        })
    }

    /// Read a record through read operations, like list or map lookups.
    #[must_use]
    pub fn read_ops(key: Key, ops: Vec<Operation>) -> Self {
        Self::Read(BatchRead {
            key,
            policy: BatchReadPolicy::default(),
            bins: Bins::None,
            ops,
        })
    }

    /// Apply write operations to a record. Read operations can be mixed in.
    #[must_use]
    pub fn write(key: Key, ops: Vec<Operation>) -> Self {
        Self::Write(BatchWrite {
            key,
            policy: BatchWritePolicy::default(),
            ops,
        })
    }

    #[must_use]
    pub fn delete(key: Key) -> Self {
        Self::Delete(BatchDelete {
            key,
            policy: BatchDeletePolicy::default(),
        })
    }

    /// Run a registered UDF against a record.
    #[must_use]
    pub fn udf(key: Key, package: &str, function: &str, args: Vec<Value>) -> Self {
        Self::Udf(BatchUdf {
            key,
            policy: BatchUdfPolicy::default(),
            package: package.to_owned(),
            function: function.to_owned(),
            args,
        })
    }

    #[must_use]
    pub fn key(&self) -> &Key {
        match self {
            Self::Read(op) => &op.key,
            Self::Write(op) => &op.key,
            Self::Delete(op) => &op.key,
            Self::Udf(op) => &op.key,
        }
    }

    /// Whether the entry may modify the record.
    pub(crate) fn is_write(&self) -> bool {
        !matches!(self, Self::Read(_))
    }

    /// Check bin names, values and operations before the batch is sent.
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Self::Read(read) => {
                read.bins.validate()?;
                read.ops.iter().try_for_each(Operation::validate)
            }
            Self::Write(write) => write.ops.iter().try_for_each(Operation::validate),
            Self::Delete(_) | Self::Udf(_) => Ok(()),
        }
    }
}

/// Read of a single record in a batch. Either the `bins` or, if not empty, the `ops` select what
/// is returned.
#[derive(Clone, Debug)]
pub struct BatchRead {
    pub key: Key,
    pub policy: BatchReadPolicy,
    pub bins: Bins,
    pub ops: Vec<Operation>,
}

#[derive(Clone, Debug)]
pub struct BatchWrite {
    pub key: Key,
    pub policy: BatchWritePolicy,
    pub ops: Vec<Operation>,
}

#[derive(Clone, Debug)]
pub struct BatchDelete {
    pub key: Key,
    pub policy: BatchDeletePolicy,
}

#[derive(Clone, Debug)]
pub struct BatchUdf {
    pub key: Key,
    pub policy: BatchUdfPolicy,
    pub package: String,
    pub function: String,
    pub args: Vec<Value>,
}

/// Outcome of one entry of a batch.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchRecord {
    pub key: Key,
    /// The record's bins, as selected by the entry. Set for successful reads, writes with read
    /// operations and UDF calls.
    pub record: Option<Record>,
    /// Result of this entry alone.
    pub result_code: ResultCode,
    /// A write may have been applied although it reported a failure, because the server timed
    /// out after it started to process it.
    pub in_doubt: bool,
}

impl BatchRecord {
    /// Whether the entry was applied. Missing records and records rejected by a filter
    /// expression count as not applied.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result_code == ResultCode::Ok
    }

    /// Whether the result code reports an actual failure. Missing records and records rejected
    /// by a filter expression are regular outcomes.
    pub(crate) fn is_failure(&self) -> bool {
        !matches!(
            self.result_code,
            ResultCode::Ok | ResultCode::KeyNotFoundError | ResultCode::FilteredOut
        )
    }
}
