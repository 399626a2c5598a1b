//! Encoding of requests and decoding of responses of the Aerospike wire protocol.
//!
//! Every message starts with a [`ProtoHeader`]. Regular messages follow up with a
//! [`MessageHeader`], a list of fields (namespace, set, digest, ...) and a list of operations.

use std::string::FromUtf8Error;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    batch::{BatchDelete, BatchOperation, BatchRead, BatchUdf, BatchWrite},
    commands::field_type::FieldType,
    errors::{Error, Result},
    exp::Expression,
    key::DIGEST_SIZE,
    msgpack::{self, encoder},
    operations::{self, Operation, OperationType},
    policies::{
        BasePolicy, BatchPolicy, CommitLevel, ConsistencyLevel, GenerationPolicy, Policy,
        QueryPolicy, RecordExistsAction, ScanPolicy, WritePolicy,
    },
    query::Statement,
    Bin, Bins, Key, ResultCode, Value,
};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub(crate) struct ReadAttr: u8 {
        /// Contains a read operation.
        const READ = 1;
        /// Get all bins.
        const GET_ALL = 1 << 1;
        /// Short query.
        const SHORT_QUERY = 1 << 2;
        /// Batch read or exists.
        const BATCH = 1 << 3;
        /// Operation is via XDR.
        const XDR = 1 << 4;
        /// Get record metadata only, no bin data.
        const GET_NO_BINS = 1 << 5;
        /// Involve all replicas in read operation.
        const CONSISTENCY_LEVEL_ALL = 1 << 6;
        /// Tell the server to compress its response.
        const COMPRESS = 1 << 7;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub(crate) struct WriteAttr: u8 {
        /// Create or update record.
        const WRITE = 1;
        /// Fling a record into the belly of Moloch.
        const DELETE = 1 << 1;
        /// Update if expected generation == old.
        const GENERATION = 1 << 2;
        /// Update if new generation >= old, good for restore.
        const GENERATION_GT = 1 << 3;
        /// Command resulting in record deletion leaves tombstone (Enterprise only).
        const DURABLE_DELETE = 1 << 4;
        /// Write record only if it doesn't exist.
        const CREATE_ONLY = 1 << 5;
        /// Return a result for every operation.
        const RESPOND_ALL_OPS = 1 << 7;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub(crate) struct InfoAttr: u8 {
        /// This is the last of a multi-part message.
        const LAST = 1;
        /// Commit to master only before declaring success.
        const COMMIT_LEVEL_MASTER = 1 << 1;
        /// Partition is complete response in scan.
        const PARTITION_DONE = 1 << 2;
        /// Update only. Merge bins.
        const UPDATE_ONLY = 1 << 3;
        /// Create or completely replace record.
        const CREATE_OR_REPLACE = 1 << 4;
        /// Completely replace existing record only.
        const REPLACE_ONLY = 1 << 5;
    }
}

pub(crate) const FIELD_HEADER_SIZE: usize = 5;
pub(crate) const OPERATION_HEADER_SIZE: usize = 8;
pub(crate) const TOTAL_HEADER_SIZE: usize = ProtoHeader::SIZE + MessageHeader::SIZE;

/// Upper limit for the size of a single message, in both directions.
pub(crate) const MAX_BUFFER_SIZE: usize = 128 * 1024 * 1024;

// Per-record flags of the batch index protocol.
const BATCH_MSG_INFO: u8 = 0x2;
const BATCH_MSG_GEN: u8 = 0x4;
const BATCH_MSG_TTL: u8 = 0x8;

// Flags of the batch index field.
const BATCH_ALLOW_INLINE: u8 = 0x1;
const BATCH_RESPOND_ALL_KEYS: u8 = 0x4;

const UDF_OP_BACKGROUND: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("needed {needed} more bytes, but only {remaining} are left")]
    Underflow { needed: usize, remaining: usize },
    #[error("message size of {size} bytes exceeds the maximum of {max} bytes")]
    SizeExceeded { size: usize, max: usize },
    #[error("invalid UTF-8 string")]
    InvalidUtf8(#[from] FromUtf8Error),
    #[error("unsupported protocol version {0}")]
    InvalidVersion(u8),
    #[error("unexpected message type {0}")]
    InvalidType(u8),
    #[error("message length {0} is shorter than the message header")]
    InvalidLength(usize),
}

/// Read cursor over a received message.
#[derive(Clone, Debug, Default)]
pub(crate) struct Buffer {
    buffer: Bytes,
}

impl From<Bytes> for Buffer {
    fn from(buffer: Bytes) -> Self {
        Self { buffer }
    }
}

macro_rules! read_num {
    ($($name:ident => $get:ident: $ty:ty,)+) => {
        $(
            pub(crate) fn $name(&mut self) -> Result<$ty, BufferError> {
                self.ensure(std::mem::size_of::<$ty>())?;
                Ok(self.buffer.$get())
            }
        )+
    };
}

impl Buffer {
    /// Take a full message frame apart, checking its protocol header against the expected type.
    pub(crate) fn frame(mut frame: Bytes, expected: ProtoType) -> Result<Self, BufferError> {
        let proto = ProtoHeader::read_from(&mut frame)?;
        if proto.ty != expected {
            return Err(BufferError::InvalidType(proto.ty.into()));
        }
        if proto.size > frame.len() {
            return Err(BufferError::Underflow {
                needed: proto.size,
                remaining: frame.len(),
            });
        }
        frame.truncate(proto.size);
        Ok(Self { buffer: frame })
    }

    fn ensure(&self, needed: usize) -> Result<(), BufferError> {
        if self.buffer.len() < needed {
            return Err(BufferError::Underflow {
                needed,
                remaining: self.buffer.len(),
            });
        }
        Ok(())
    }

    read_num! {
        read_u8 => get_u8: u8,
        read_u16 => get_u16: u16,
        read_u32 => get_u32: u32,
        read_u64 => get_u64: u64,
        read_i8 => get_i8: i8,
        read_i16 => get_i16: i16,
        read_i32 => get_i32: i32,
        read_i64 => get_i64: i64,
        read_f32 => get_f32: f32,
        read_f64 => get_f64: f64,
    }

    pub(crate) fn read_str(&mut self, len: usize) -> Result<String, BufferError> {
        let bytes = self.read_blob(len)?;
        String::from_utf8(bytes).map_err(Into::into)
    }

    pub(crate) fn read_blob(&mut self, len: usize) -> Result<Vec<u8>, BufferError> {
        self.read_bytes(len).map(|b| b.to_vec())
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<Bytes, BufferError> {
        self.ensure(len)?;
        Ok(self.buffer.split_to(len))
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), BufferError> {
        self.ensure(len)?;
        self.buffer.advance(len);
        Ok(())
    }

    /// Split off the next `len` bytes as separate buffer.
    pub(crate) fn split_to(&mut self, len: usize) -> Result<Self, BufferError> {
        self.read_bytes(len).map(Self::from)
    }

    pub(crate) fn peek(&self) -> Option<u8> {
        self.buffer.first().copied()
    }

    pub(crate) fn peek_at(&self, index: usize) -> Option<u8> {
        self.buffer.get(index).copied()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn read_message_header(&mut self) -> Result<MessageHeader, BufferError> {
        MessageHeader::read_from(self)
    }
}

/// Builder for the bytes of a single request.
#[derive(Debug, Default)]
pub(crate) struct RequestBuffer {
    buffer: BytesMut,
}

impl RequestBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn freeze(self) -> Bytes {
        self.buffer.freeze()
    }

    fn begin(&mut self, size: usize) -> Result<()> {
        if size > MAX_BUFFER_SIZE {
            return Err(Error::invalid_argument(format!(
                "request of {size} bytes exceeds the maximum of {MAX_BUFFER_SIZE} bytes"
            )));
        }
        self.buffer.clear();
        self.buffer.reserve(size);
        Ok(())
    }

    /// Write bins to the record, with `op` being one of the write, append, prepend or increment
    /// operation types.
    pub(crate) fn set_write(
        &mut self,
        policy: &WritePolicy,
        op: OperationType,
        key: &Key,
        bins: &[Bin<'_>],
    ) -> Result<()> {
        for bin in bins {
            bin.validate()?;
            operations::check_value(op, &bin.value)?;
        }

        let send_key = policy.base_policy.send_key;
        let mut est = Estimate::key(key, send_key);
        est.filter(policy.base_policy.filter_expression.as_ref());
        for bin in bins {
            est.op(bin.name.len() + bin.value.estimate_size());
        }

        self.begin(TOTAL_HEADER_SIZE + est.size)?;
        MessageHeader::for_write(
            policy,
            ReadAttr::empty(),
            WriteAttr::WRITE,
            est.fields()?,
            est.ops()?,
        )
        .write_to(&mut self.buffer, est.size);

        self.write_key(key, send_key);
        self.write_filter(policy.base_policy.filter_expression.as_ref());
        for bin in bins {
            self.write_bin(bin, op);
        }

        Ok(())
    }

    pub(crate) fn set_delete(&mut self, policy: &WritePolicy, key: &Key) -> Result<()> {
        let mut est = Estimate::key(key, false);
        est.filter(policy.base_policy.filter_expression.as_ref());

        self.begin(TOTAL_HEADER_SIZE + est.size)?;
        MessageHeader::for_write(
            policy,
            ReadAttr::empty(),
            WriteAttr::WRITE | WriteAttr::DELETE,
            est.fields()?,
            0,
        )
        .write_to(&mut self.buffer, est.size);

        self.write_key(key, false);
        self.write_filter(policy.base_policy.filter_expression.as_ref());
        Ok(())
    }

    pub(crate) fn set_touch(&mut self, policy: &WritePolicy, key: &Key) -> Result<()> {
        let send_key = policy.base_policy.send_key;
        let mut est = Estimate::key(key, send_key);
        est.filter(policy.base_policy.filter_expression.as_ref());
        est.op(0);

        self.begin(TOTAL_HEADER_SIZE + est.size)?;
        MessageHeader::for_write(
            policy,
            ReadAttr::empty(),
            WriteAttr::WRITE,
            est.fields()?,
            1,
        )
        .write_to(&mut self.buffer, est.size);

        self.write_key(key, send_key);
        self.write_filter(policy.base_policy.filter_expression.as_ref());
        self.write_op_header(OperationType::Touch, 0, "", 0);
        Ok(())
    }

    pub(crate) fn set_exists(&mut self, policy: &BasePolicy, key: &Key) -> Result<()> {
        let mut est = Estimate::key(key, false);
        est.filter(policy.filter_expression.as_ref());

        self.begin(TOTAL_HEADER_SIZE + est.size)?;
        MessageHeader::for_read(
            policy,
            ReadAttr::READ | ReadAttr::GET_NO_BINS,
            est.fields()?,
            0,
        )
        .write_to(&mut self.buffer, est.size);

        self.write_key(key, false);
        self.write_filter(policy.filter_expression.as_ref());
        Ok(())
    }

    pub(crate) fn set_read(&mut self, policy: &BasePolicy, key: &Key, bins: &Bins) -> Result<()> {
        bins.validate()?;
        let mut est = Estimate::key(key, false);
        est.filter(policy.filter_expression.as_ref());

        let read_attr = match bins {
            Bins::All => ReadAttr::READ | ReadAttr::GET_ALL,
            Bins::None => ReadAttr::READ | ReadAttr::GET_NO_BINS,
            Bins::Some(names) => {
                for name in names {
                    est.op(name.len());
                }
                ReadAttr::READ
            }
        };

        self.begin(TOTAL_HEADER_SIZE + est.size)?;
        MessageHeader::for_read(policy, read_attr, est.fields()?, est.ops()?)
            .write_to(&mut self.buffer, est.size);

        self.write_key(key, false);
        self.write_filter(policy.filter_expression.as_ref());
        if let Bins::Some(names) = bins {
            for name in names {
                self.write_op_header(OperationType::Read, 0, name, 0);
            }
        }

        Ok(())
    }

    pub(crate) fn set_operate(
        &mut self,
        policy: &WritePolicy,
        key: &Key,
        operations: &[Operation],
    ) -> Result<()> {
        if operations.is_empty() {
            return Err(Error::invalid_argument("operate requires at least one operation"));
        }
        operations.iter().try_for_each(Operation::validate)?;

        let attrs = OperateAttrs::new(operations, policy.respond_per_each_op);
        let send_key = policy.base_policy.send_key && attrs.has_write;

        let mut est = Estimate::key(key, send_key);
        est.filter(policy.base_policy.filter_expression.as_ref());
        for op in operations {
            est.size += op.estimate_size();
            est.ops += 1;
        }

        self.begin(TOTAL_HEADER_SIZE + est.size)?;
        if attrs.has_write {
            MessageHeader::for_write(
                policy,
                attrs.read_attr,
                attrs.write_attr,
                est.fields()?,
                est.ops()?,
            )
        } else {
            // Read-only, but collection reads still need RESPOND_ALL_OPS.
            MessageHeader {
                write_attr: attrs.write_attr,
                ..MessageHeader::for_read(
                    &policy.base_policy,
                    attrs.read_attr,
                    est.fields()?,
                    est.ops()?,
                )
            }
        }
        .write_to(&mut self.buffer, est.size);

        self.write_key(key, send_key);
        self.write_filter(policy.base_policy.filter_expression.as_ref());
        for op in operations {
            op.write_to(&mut self.buffer);
        }

        Ok(())
    }

    /// Call a UDF on a single record.
    pub(crate) fn set_udf(
        &mut self,
        policy: &WritePolicy,
        key: &Key,
        package: &str,
        function: &str,
        args: &[Value],
    ) -> Result<()> {
        let send_key = policy.base_policy.send_key;
        let mut est = Estimate::key(key, send_key);
        est.filter(policy.base_policy.filter_expression.as_ref());
        est.udf(package, function, args);

        self.begin(TOTAL_HEADER_SIZE + est.size)?;
        MessageHeader::for_write(
            policy,
            ReadAttr::empty(),
            WriteAttr::WRITE,
            est.fields()?,
            0,
        )
        .write_to(&mut self.buffer, est.size);

        self.write_key(key, send_key);
        self.write_filter(policy.base_policy.filter_expression.as_ref());
        self.write_udf(package, function, args);
        Ok(())
    }

    /// Batch request for one node. Every entry carries its index in the caller's list, which the
    /// server echoes back with the record's result.
    pub(crate) fn set_batch(
        &mut self,
        policy: &BatchPolicy,
        entries: &[(u32, &BatchOperation)],
    ) -> Result<()> {
        let filter = policy.base_policy.filter_expression.as_ref();
        let mut est = Estimate::default();
        est.filter(filter);

        // count + flags
        let mut batch_size = 5;
        for (_, op) in entries {
            batch_size += 4 + DIGEST_SIZE + batch_entry_size(op);
        }
        est.field(batch_size);

        self.begin(TOTAL_HEADER_SIZE + est.size)?;

        let mut read_attr = ReadAttr::BATCH;
        if policy.base_policy.consistency_level == ConsistencyLevel::All {
            read_attr |= ReadAttr::CONSISTENCY_LEVEL_ALL;
        }

        MessageHeader {
            read_attr,
            timeout: policy.server_timeout(),
            field_count: est.fields()?,
            ..MessageHeader::default()
        }
        .write_to(&mut self.buffer, est.size);

        self.write_filter(filter);
        self.write_field_header(batch_size, FieldType::BatchIndex);
        self.buffer.put_u32(to_u32(entries.len(), "batch records")?);

        let mut flags = BATCH_RESPOND_ALL_KEYS;
        if policy.allow_inline {
            flags |= BATCH_ALLOW_INLINE;
        }
        self.buffer.put_u8(flags);

        for (index, op) in entries {
            self.buffer.put_u32(*index);
            self.buffer.put_slice(&op.key().digest);
            self.write_batch_entry(op, policy.base_policy.consistency_level)?;
        }

        Ok(())
    }

    fn write_batch_entry(&mut self, op: &BatchOperation, level: ConsistencyLevel) -> Result<()> {
        match op {
            BatchOperation::Read(BatchRead {
                key,
                policy,
                bins,
                ops,
            }) => {
                let mut read_attr = if ops.is_empty() {
                    match bins {
                        Bins::All => ReadAttr::READ | ReadAttr::GET_ALL,
                        Bins::None => ReadAttr::READ | ReadAttr::GET_NO_BINS,
                        Bins::Some(_) => ReadAttr::READ,
                    }
                } else {
                    OperateAttrs::new(ops, false).read_attr
                };
                if level == ConsistencyLevel::All {
                    read_attr |= ReadAttr::CONSISTENCY_LEVEL_ALL;
                }

                self.buffer.put_u8(BATCH_MSG_INFO);
                self.buffer.put_u8(read_attr.bits());
                self.buffer.put_u8(0);
                self.buffer.put_u8(0);

                let filter = policy.filter_expression.as_ref();
                let op_count = if ops.is_empty() {
                    match bins {
                        Bins::Some(names) => names.len(),
                        _ => 0,
                    }
                } else {
                    ops.len()
                };
                self.write_batch_fields(key, filter, false, 0, op_count)?;

                if ops.is_empty() {
                    if let Bins::Some(names) = bins {
                        for name in names {
                            self.write_op_header(OperationType::Read, 0, name, 0);
                        }
                    }
                } else {
                    for op in ops {
                        op.write_to(&mut self.buffer);
                    }
                }
            }
            BatchOperation::Write(BatchWrite { key, policy, ops }) => {
                let attrs = OperateAttrs::new(ops, true);
                let (write_attr, info_attr, generation) = write_flags(
                    policy.record_exists_action,
                    policy.generation_policy,
                    policy.generation,
                    policy.commit_level,
                    policy.durable_delete,
                );
                self.write_batch_attrs(
                    attrs.read_attr,
                    WriteAttr::WRITE | attrs.write_attr | write_attr,
                    info_attr,
                    generation,
                    policy.expiration.into(),
                )?;
                self.write_batch_fields(
                    key,
                    policy.filter_expression.as_ref(),
                    policy.send_key,
                    0,
                    ops.len(),
                )?;
                for op in ops {
                    op.write_to(&mut self.buffer);
                }
            }
            BatchOperation::Delete(BatchDelete { key, policy }) => {
                let (write_attr, info_attr, generation) = write_flags(
                    RecordExistsAction::Update,
                    policy.generation_policy,
                    policy.generation,
                    policy.commit_level,
                    policy.durable_delete,
                );
                self.write_batch_attrs(
                    ReadAttr::empty(),
                    WriteAttr::WRITE
                        | WriteAttr::DELETE
                        | WriteAttr::RESPOND_ALL_OPS
                        | write_attr,
                    info_attr,
                    generation,
                    0,
                )?;
                self.write_batch_fields(
                    key,
                    policy.filter_expression.as_ref(),
                    policy.send_key,
                    0,
                    0,
                )?;
            }
            BatchOperation::Udf(BatchUdf {
                key,
                policy,
                package,
                function,
                args,
            }) => {
                let (write_attr, info_attr, generation) = write_flags(
                    RecordExistsAction::Update,
                    GenerationPolicy::None,
                    0,
                    policy.commit_level,
                    policy.durable_delete,
                );
                self.write_batch_attrs(
                    ReadAttr::empty(),
                    WriteAttr::WRITE | write_attr,
                    info_attr,
                    generation,
                    policy.expiration.into(),
                )?;
                self.write_batch_fields(
                    key,
                    policy.filter_expression.as_ref(),
                    policy.send_key,
                    3,
                    0,
                )?;
                self.write_udf(package, function, args);
            }
        }

        Ok(())
    }

    fn write_batch_attrs(
        &mut self,
        read_attr: ReadAttr,
        write_attr: WriteAttr,
        info_attr: InfoAttr,
        generation: u32,
        expiration: u32,
    ) -> Result<()> {
        let generation = u16::try_from(generation).map_err(|_| {
            Error::invalid_argument(format!(
                "batch generation {generation} exceeds the 16-bit range"
            ))
        })?;

        self.buffer
            .put_u8(BATCH_MSG_INFO | BATCH_MSG_GEN | BATCH_MSG_TTL);
        self.buffer.put_u8(read_attr.bits());
        self.buffer.put_u8(write_attr.bits());
        self.buffer.put_u8(info_attr.bits());
        self.buffer.put_u16(generation);
        self.buffer.put_u32(expiration);
        Ok(())
    }

    fn write_batch_fields(
        &mut self,
        key: &Key,
        filter: Option<&Expression>,
        send_key: bool,
        extra_fields: usize,
        op_count: usize,
    ) -> Result<()> {
        let user_key = key.user_key.as_ref().filter(|_| send_key);
        let field_count =
            2 + extra_fields + usize::from(filter.is_some()) + usize::from(user_key.is_some());

        self.buffer.put_u16(to_u16(field_count, "fields")?);
        self.buffer.put_u16(to_u16(op_count, "operations")?);
        self.write_filter(filter);
        self.write_field_str(&key.namespace, FieldType::Namespace);
        self.write_field_str(&key.set_name, FieldType::Table);
        if let Some(user_key) = user_key {
            self.write_field_header(user_key.estimate_size() + 1, FieldType::Key);
            self.buffer.put_u8(user_key.particle_type() as u8);
            user_key.write_to(&mut self.buffer);
        }
        Ok(())
    }

    /// Scan over the given partitions of a namespace, and optionally a set.
    pub(crate) fn set_scan(
        &mut self,
        policy: &ScanPolicy,
        namespace: &str,
        set_name: &str,
        bins: &Bins,
        partitions: &PartitionRequest<'_>,
    ) -> Result<()> {
        let request = StreamRequest {
            base: &policy.base_policy,
            records_per_second: policy.records_per_second,
            namespace,
            set_name,
            bins,
            statement: None,
            partitions,
        };
        self.set_stream(&request)
    }

    /// Query the secondary index of the statement over the given partitions.
    pub(crate) fn set_query(
        &mut self,
        policy: &QueryPolicy,
        statement: &Statement,
        partitions: &PartitionRequest<'_>,
    ) -> Result<()> {
        let request = StreamRequest {
            base: &policy.base_policy,
            records_per_second: policy.records_per_second,
            namespace: &statement.namespace,
            set_name: &statement.set_name,
            bins: &statement.bins,
            statement: Some(statement),
            partitions,
        };
        self.set_stream(&request)
    }

    fn set_stream(&mut self, req: &StreamRequest<'_>) -> Result<()> {
        let mut est = Estimate::default();
        est.field_str(req.namespace);
        est.field_str(req.set_name);
        est.filter(req.base.filter_expression.as_ref());

        let parts = req.partitions;

        // task id, socket timeout
        est.field(8);
        est.field(4);

        if !parts.partitions.is_empty() {
            est.field(parts.partitions.len() * 2);
        }
        if !parts.digests.is_empty() {
            est.field(parts.digests.len() * DIGEST_SIZE);
        }
        if parts.max_records > 0 {
            est.field(8);
        }
        if req.records_per_second > 0 {
            est.field(4);
        }

        let index_filter = req.statement.and_then(|s| s.filter.as_ref());
        let index_name = req.statement.and_then(|s| s.index_name.as_deref());
        if let Some(filter) = index_filter {
            if filter.collection_index_type().is_some() {
                est.field(1);
            }
            est.field(filter.estimate_size());
        }
        if let Some(name) = index_name {
            est.field_str(name);
        }

        let mut read_attr = ReadAttr::READ;
        match req.bins {
            Bins::All => read_attr |= ReadAttr::GET_ALL,
            Bins::None => read_attr |= ReadAttr::GET_NO_BINS,
            Bins::Some(names) => {
                for name in names {
                    est.op(name.len());
                }
            }
        }

        self.begin(TOTAL_HEADER_SIZE + est.size)?;
        MessageHeader::for_read(req.base, read_attr, est.fields()?, est.ops()?)
            .write_to(&mut self.buffer, est.size);

        self.write_field_str_opt(req.namespace, FieldType::Namespace);
        self.write_field_str_opt(req.set_name, FieldType::Table);
        self.write_filter(req.base.filter_expression.as_ref());

        self.write_field_header(8, FieldType::TranId);
        self.buffer.put_u64(parts.task_id);

        self.write_field_header(4, FieldType::SocketTimeout);
        self.buffer.put_u32(
            u32::try_from(req.base.socket_timeout.as_millis()).unwrap_or(u32::MAX),
        );

        if !parts.partitions.is_empty() {
            self.write_field_header(parts.partitions.len() * 2, FieldType::PidArray);
            for &id in parts.partitions {
                self.buffer.put_u16_le(id);
            }
        }
        if !parts.digests.is_empty() {
            self.write_field_header(parts.digests.len() * DIGEST_SIZE, FieldType::DigestArray);
            for digest in parts.digests {
                self.buffer.put_slice(digest);
            }
        }
        if parts.max_records > 0 {
            self.write_field_header(8, FieldType::MaxRecords);
            self.buffer.put_u64(parts.max_records);
        }
        if req.records_per_second > 0 {
            self.write_field_header(4, FieldType::RecordsPerSecond);
            self.buffer.put_u32(req.records_per_second);
        }

        if let Some(filter) = index_filter {
            if let Some(ty) = filter.collection_index_type() {
                self.write_field_header(1, FieldType::IndexType);
                self.buffer.put_u8(ty as u8);
            }
            self.write_field_header(filter.estimate_size(), FieldType::IndexRange);
            filter.write_to(&mut self.buffer);
        }
        if let Some(name) = index_name {
            self.write_field_str(name, FieldType::IndexName);
        }

        if let Bins::Some(names) = req.bins {
            for name in names {
                self.write_op_header(OperationType::Read, 0, name, 0);
            }
        }

        Ok(())
    }

    /// Apply a UDF in the background to every record matched by the statement.
    pub(crate) fn set_background_udf(
        &mut self,
        policy: &WritePolicy,
        statement: &Statement,
        task_id: u64,
        package: &str,
        function: &str,
        args: &[Value],
    ) -> Result<()> {
        let mut est = Estimate::default();
        est.field_str(&statement.namespace);
        est.field_str(&statement.set_name);
        est.filter(policy.base_policy.filter_expression.as_ref());
        est.field(8);
        if let Some(filter) = &statement.filter {
            if filter.collection_index_type().is_some() {
                est.field(1);
            }
            est.field(filter.estimate_size());
        }
        if let Some(name) = &statement.index_name {
            est.field_str(name);
        }
        est.field(1);
        est.udf(package, function, args);

        self.begin(TOTAL_HEADER_SIZE + est.size)?;
        MessageHeader::for_write(
            policy,
            ReadAttr::empty(),
            WriteAttr::WRITE,
            est.fields()?,
            0,
        )
        .write_to(&mut self.buffer, est.size);

        self.write_field_str_opt(&statement.namespace, FieldType::Namespace);
        self.write_field_str_opt(&statement.set_name, FieldType::Table);
        self.write_filter(policy.base_policy.filter_expression.as_ref());
        self.write_field_header(8, FieldType::TranId);
        self.buffer.put_u64(task_id);
        if let Some(filter) = &statement.filter {
            if let Some(ty) = filter.collection_index_type() {
                self.write_field_header(1, FieldType::IndexType);
                self.buffer.put_u8(ty as u8);
            }
            self.write_field_header(filter.estimate_size(), FieldType::IndexRange);
            filter.write_to(&mut self.buffer);
        }
        if let Some(name) = &statement.index_name {
            self.write_field_str(name, FieldType::IndexName);
        }
        self.write_field_header(1, FieldType::UdfOp);
        self.buffer.put_u8(UDF_OP_BACKGROUND);
        self.write_udf(package, function, args);

        Ok(())
    }

    /// Info request, each command terminated by a newline.
    pub(crate) fn set_info(&mut self, commands: &[&str]) -> Result<()> {
        let size = commands.iter().map(|cmd| cmd.len() + 1).sum::<usize>();

        self.begin(ProtoHeader::SIZE + size)?;
        ProtoHeader {
            version: Version::V2,
            ty: ProtoType::Info,
            size,
        }
        .write_to(&mut self.buffer);

        for command in commands {
            self.buffer.put_slice(command.as_bytes());
            self.buffer.put_u8(b'\n');
        }

        Ok(())
    }

    fn write_key(&mut self, key: &Key, send_key: bool) {
        self.write_field_str_opt(&key.namespace, FieldType::Namespace);
        self.write_field_str_opt(&key.set_name, FieldType::Table);

        self.write_field_header(DIGEST_SIZE, FieldType::DigestRipe);
        self.buffer.put_slice(&key.digest);

        if let Some(user_key) = key.user_key.as_ref().filter(|_| send_key) {
            self.write_field_header(user_key.estimate_size() + 1, FieldType::Key);
            self.buffer.put_u8(user_key.particle_type() as u8);
            user_key.write_to(&mut self.buffer);
        }
    }

    fn write_filter(&mut self, filter: Option<&Expression>) {
        if let Some(exp) = filter {
            self.write_field_header(exp.packed_size(), FieldType::FilterExp);
            exp.pack(&mut self.buffer);
        }
    }

    fn write_udf(&mut self, package: &str, function: &str, args: &[Value]) {
        self.write_field_str(package, FieldType::UdfPackageName);
        self.write_field_str(function, FieldType::UdfFunction);
        self.write_field_header(udf_args_size(args), FieldType::UdfArgList);
        encoder::pack_array(&mut self.buffer, args);
    }

    fn write_field_header(&mut self, size: usize, ty: FieldType) {
        self.buffer.put_u32(size as u32 + 1);
        self.buffer.put_u8(ty as u8);
    }

    fn write_field_str(&mut self, value: &str, ty: FieldType) {
        self.write_field_header(value.len(), ty);
        self.buffer.put_slice(value.as_bytes());
    }

    fn write_field_str_opt(&mut self, value: &str, ty: FieldType) {
        if !value.is_empty() {
            self.write_field_str(value, ty);
        }
    }

    fn write_op_header(&mut self, op: OperationType, particle: u8, name: &str, value_size: usize) {
        self.buffer.put_u32((name.len() + value_size + 4) as u32);
        self.buffer.put_u8(op as u8);
        self.buffer.put_u8(particle);
        self.buffer.put_u8(0);
        self.buffer.put_u8(name.len() as u8);
        self.buffer.put_slice(name.as_bytes());
    }

    fn write_bin(&mut self, bin: &Bin<'_>, op: OperationType) {
        let value_size = bin.value.estimate_size();
        self.write_op_header(op, bin.value.particle_type() as u8, bin.name, value_size);
        bin.value.write_to(&mut self.buffer);
    }
}

/// Partitions a single scan or query request covers on one node.
#[derive(Debug, Default)]
pub(crate) struct PartitionRequest<'a> {
    pub(crate) task_id: u64,
    /// Partitions that start from the beginning.
    pub(crate) partitions: &'a [u16],
    /// Last received digest of partitions that continue after it.
    pub(crate) digests: &'a [[u8; DIGEST_SIZE]],
    pub(crate) max_records: u64,
}

struct StreamRequest<'a> {
    base: &'a BasePolicy,
    records_per_second: u32,
    namespace: &'a str,
    set_name: &'a str,
    bins: &'a Bins,
    statement: Option<&'a Statement>,
    partitions: &'a PartitionRequest<'a>,
}

/// Running size and counts of the fields and operations of a message.
#[derive(Default)]
struct Estimate {
    size: usize,
    fields: usize,
    ops: usize,
}

impl Estimate {
    fn key(key: &Key, send_key: bool) -> Self {
        let mut est = Self::default();
        est.field_str(&key.namespace);
        est.field_str(&key.set_name);
        est.field(DIGEST_SIZE);
        if let Some(user_key) = key.user_key.as_ref().filter(|_| send_key) {
            est.field(user_key.estimate_size() + 1);
        }
        est
    }

    fn field(&mut self, size: usize) {
        self.size += FIELD_HEADER_SIZE + size;
        self.fields += 1;
    }

    /// Empty strings are left out of the message.
    fn field_str(&mut self, value: &str) {
        if !value.is_empty() {
            self.field(value.len());
        }
    }

    fn filter(&mut self, filter: Option<&Expression>) {
        if let Some(exp) = filter {
            self.field(exp.packed_size());
        }
    }

    fn udf(&mut self, package: &str, function: &str, args: &[Value]) {
        self.field(package.len());
        self.field(function.len());
        self.field(udf_args_size(args));
    }

    fn op(&mut self, payload: usize) {
        self.size += OPERATION_HEADER_SIZE + payload;
        self.ops += 1;
    }

    fn fields(&self) -> Result<u16> {
        to_u16(self.fields, "fields")
    }

    fn ops(&self) -> Result<u16> {
        to_u16(self.ops, "operations")
    }
}

fn udf_args_size(args: &[Value]) -> usize {
    encoder::pack_array(&mut msgpack::Sink, args)
}

fn to_u16(count: usize, what: &str) -> Result<u16> {
    u16::try_from(count)
        .map_err(|_| Error::invalid_argument(format!("too many {what} in one request: {count}")))
}

fn to_u32(count: usize, what: &str) -> Result<u32> {
    u32::try_from(count)
        .map_err(|_| Error::invalid_argument(format!("too many {what} in one request: {count}")))
}

/// Size of a batch entry after its index and digest.
fn batch_entry_size(op: &BatchOperation) -> usize {
    fn fields(key: &Key, filter: Option<&Expression>, send_key: bool) -> usize {
        let mut est = Estimate::default();
        est.field(key.namespace.len());
        est.field(key.set_name.len());
        est.filter(filter);
        if let Some(user_key) = key.user_key.as_ref().filter(|_| send_key) {
            est.field(user_key.estimate_size() + 1);
        }
        // field and operation counts
        est.size + 4
    }

    fn ops(ops: &[Operation]) -> usize {
        ops.iter().map(Operation::estimate_size).sum()
    }

    // flags + read/write/info attributes
    let info = 4;
    // generation + expiration
    let gen_ttl = 6;

    match op {
        BatchOperation::Read(read) => {
            let payload = if read.ops.is_empty() {
                match &read.bins {
                    Bins::Some(names) => names
                        .iter()
                        .map(|name| OPERATION_HEADER_SIZE + name.len())
                        .sum(),
                    Bins::All | Bins::None => 0,
                }
            } else {
                ops(&read.ops)
            };
            info + fields(&read.key, read.policy.filter_expression.as_ref(), false) + payload
        }
        BatchOperation::Write(write) => {
            info + gen_ttl
                + fields(
                    &write.key,
                    write.policy.filter_expression.as_ref(),
                    write.policy.send_key,
                )
                + ops(&write.ops)
        }
        BatchOperation::Delete(delete) => {
            info + gen_ttl
                + fields(
                    &delete.key,
                    delete.policy.filter_expression.as_ref(),
                    delete.policy.send_key,
                )
        }
        BatchOperation::Udf(udf) => {
            let mut est = Estimate::default();
            est.udf(&udf.package, &udf.function, &udf.args);
            info + gen_ttl
                + fields(
                    &udf.key,
                    udf.policy.filter_expression.as_ref(),
                    udf.policy.send_key,
                )
                + est.size
        }
    }
}

/// Attributes derived from the operations of an operate command.
struct OperateAttrs {
    read_attr: ReadAttr,
    write_attr: WriteAttr,
    has_write: bool,
}

impl OperateAttrs {
    fn new(operations: &[Operation], respond_all: bool) -> Self {
        let mut read_attr = ReadAttr::empty();
        let mut write_attr = WriteAttr::empty();
        let mut read_bin = false;
        let mut read_header = false;
        let mut has_write = false;

        for op in operations {
            if op.reads_all_bins() {
                read_attr |= ReadAttr::READ | ReadAttr::GET_ALL;
            } else if op.reads_header() {
                read_header = true;
                read_attr |= ReadAttr::READ;
            } else if op.is_write() {
                has_write = true;
                write_attr |= WriteAttr::WRITE;
            } else {
                read_bin = true;
                read_attr |= ReadAttr::READ;
            }

            if op.needs_respond_all() {
                write_attr |= WriteAttr::RESPOND_ALL_OPS;
            }
        }

        if respond_all {
            write_attr |= WriteAttr::RESPOND_ALL_OPS;
        }
        if read_header && !read_bin && !read_attr.contains(ReadAttr::GET_ALL) {
            read_attr |= ReadAttr::GET_NO_BINS;
        }

        Self {
            read_attr,
            write_attr,
            has_write,
        }
    }
}

/// Translate the write related policy settings into header attributes and the expected
/// generation.
fn write_flags(
    exists: RecordExistsAction,
    generation_policy: GenerationPolicy,
    generation: u32,
    commit_level: CommitLevel,
    durable_delete: bool,
) -> (WriteAttr, InfoAttr, u32) {
    let mut write_attr = WriteAttr::empty();
    let mut info_attr = InfoAttr::empty();

    match exists {
        RecordExistsAction::Update => {}
        RecordExistsAction::UpdateOnly => info_attr |= InfoAttr::UPDATE_ONLY,
        RecordExistsAction::Replace => info_attr |= InfoAttr::CREATE_OR_REPLACE,
        RecordExistsAction::ReplaceOnly => info_attr |= InfoAttr::REPLACE_ONLY,
        RecordExistsAction::CreateOnly => write_attr |= WriteAttr::CREATE_ONLY,
    }

    let generation = match generation_policy {
        GenerationPolicy::None => 0,
        GenerationPolicy::ExpectGenEqual => {
            write_attr |= WriteAttr::GENERATION;
            generation
        }
        GenerationPolicy::ExpectGenGreater => {
            write_attr |= WriteAttr::GENERATION_GT;
            generation
        }
    };

    if commit_level == CommitLevel::CommitMaster {
        info_attr |= InfoAttr::COMMIT_LEVEL_MASTER;
    }

    if durable_delete {
        write_attr |= WriteAttr::DURABLE_DELETE;
    }

    (write_attr, info_attr, generation)
}

/// A protocol header that is present at the beginning of each message sent to or received from an
/// Aerospike instance.
///
/// The header is 8 bytes long, basically a [`u64`] integer. Reading the bytes left to right, the
/// meanings are:
///
/// - 1 byte: Version
/// - 1 byte: Message type
/// - 6 bytes: Data size
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct ProtoHeader {
    pub(crate) version: Version,
    pub(crate) ty: ProtoType,
    pub(crate) size: usize,
}

impl ProtoHeader {
    pub(crate) const SIZE: usize = 8;

    pub(crate) fn write_to(&self, buf: &mut impl BufMut) {
        buf.put_u64(
            (u64::from(u8::from(self.version)) << 56)
                | (u64::from(u8::from(self.ty)) << 48)
                | (self.size & 0xffff_ffff_ffff) as u64,
        );
    }

    /// Parse the header, rejecting versions other than 2 and sizes beyond [`MAX_BUFFER_SIZE`].
    pub(crate) fn read_from(buf: &mut impl Buf) -> Result<Self, BufferError> {
        if buf.remaining() < Self::SIZE {
            return Err(BufferError::Underflow {
                needed: Self::SIZE,
                remaining: buf.remaining(),
            });
        }

        let value = buf.get_u64();
        let version = Version::from((value >> 56) as u8);
        if version != Version::V2 {
            return Err(BufferError::InvalidVersion(version.into()));
        }

        let size = (value & 0xffff_ffff_ffff) as usize;
        if size > MAX_BUFFER_SIZE {
            return Err(BufferError::SizeExceeded {
                size,
                max: MAX_BUFFER_SIZE,
            });
        }

        Ok(Self {
            version,
            ty: ProtoType::from((value >> 48) as u8),
            size,
        })
    }
}

/// Known possible protocol versions, although this implementation only supports the latest
/// [`Self::V2`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Version {
    V2,
    Unknown(u8),
}

impl From<u8> for Version {
    fn from(value: u8) -> Self {
        match value {
            2 => Self::V2,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Version> for u8 {
    fn from(value: Version) -> Self {
        match value {
            Version::V2 => 2,
            Version::Unknown(v) => v,
        }
    }
}

/// Known message types, which define the data followed after the [`ProtoHeader`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ProtoType {
    /// Informational message.
    Info,
    /// Security related message like authentication.
    Admin,
    /// Regular message.
    Message,
    /// Regular, but compressed message.
    MessageCompressed,
    Unknown(u8),
}

impl From<u8> for ProtoType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Info,
            2 => Self::Admin,
            3 => Self::Message,
            4 => Self::MessageCompressed,
            _ => Self::Unknown(value),
        }
    }
}

impl From<ProtoType> for u8 {
    fn from(value: ProtoType) -> Self {
        match value {
            ProtoType::Info => 1,
            ProtoType::Admin => 2,
            ProtoType::Message => 3,
            ProtoType::MessageCompressed => 4,
            ProtoType::Unknown(v) => v,
        }
    }
}

/// The header of a regular message, immediately following the [`ProtoHeader`] of type
/// [`ProtoType::Message`]. Streamed responses carry many of them in one frame.
///
/// This header is always 22 bytes long. Reading the bytes left to right, the meanings are:
///
/// - 1 byte: Length of this header.
/// - 1 byte: Read attributes as bit flags.
/// - 1 byte: Write attributes as bit flags.
/// - 1 byte: Info attributes as bit flags.
/// - 1 byte: _Unused_.
/// - 1 byte: Result code for the operation done.
/// - 4 bytes: Generation counter.
/// - 4 bytes: Expiration of a record (if applicable).
/// - 4 bytes: Timeout of the operation in milliseconds. Batch responses carry the index of the
///   record here instead.
/// - 2 bytes: Field count in the payload.
/// - 2 bytes: Operation count in the payload.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MessageHeader {
    pub(crate) read_attr: ReadAttr,
    pub(crate) write_attr: WriteAttr,
    pub(crate) info_attr: InfoAttr,
    pub(crate) result_code: ResultCode,
    pub(crate) generation: u32,
    pub(crate) expiration: u32,
    pub(crate) timeout: u32,
    pub(crate) field_count: u16,
    pub(crate) operation_count: u16,
}

impl Default for MessageHeader {
    fn default() -> Self {
        Self {
            read_attr: ReadAttr::empty(),
            write_attr: WriteAttr::empty(),
            info_attr: InfoAttr::empty(),
            result_code: ResultCode::Ok,
            generation: 0,
            expiration: 0,
            timeout: 0,
            field_count: 0,
            operation_count: 0,
        }
    }
}

impl MessageHeader {
    pub(crate) const SIZE: usize = 22;

    /// Write the proto header and this header, followed by `payload` bytes of fields and
    /// operations.
    pub(crate) fn write_to(&self, buf: &mut impl BufMut, payload: usize) {
        ProtoHeader {
            version: Version::V2,
            ty: ProtoType::Message,
            size: Self::SIZE + payload,
        }
        .write_to(buf);

        buf.put_u8(Self::SIZE as u8);
        buf.put_u8(self.read_attr.bits());
        buf.put_u8(self.write_attr.bits());
        buf.put_u8(self.info_attr.bits());
        buf.put_u8(0);
        buf.put_u8(self.result_code.into());
        buf.put_u32(self.generation);
        buf.put_u32(self.expiration);
        buf.put_u32(self.timeout);
        buf.put_u16(self.field_count);
        buf.put_u16(self.operation_count);
    }

    fn read_from(buf: &mut Buffer) -> Result<Self, BufferError> {
        let header_length = usize::from(buf.read_u8()?);
        if header_length < Self::SIZE {
            return Err(BufferError::InvalidLength(header_length));
        }

        let header = Self {
            read_attr: ReadAttr::from_bits_truncate(buf.read_u8()?),
            write_attr: WriteAttr::from_bits_truncate(buf.read_u8()?),
            info_attr: InfoAttr::from_bits_truncate(buf.read_u8()?),
            result_code: {
                buf.skip(1)?;
                buf.read_u8()?.into()
            },
            generation: buf.read_u32()?,
            expiration: buf.read_u32()?,
            timeout: buf.read_u32()?,
            field_count: buf.read_u16()?,
            operation_count: buf.read_u16()?,
        };

        buf.skip(header_length - Self::SIZE)?;
        Ok(header)
    }

    fn for_read(
        policy: &BasePolicy,
        mut read_attr: ReadAttr,
        field_count: u16,
        operation_count: u16,
    ) -> Self {
        if policy.consistency_level == ConsistencyLevel::All {
            read_attr |= ReadAttr::CONSISTENCY_LEVEL_ALL;
        }

        Self {
            read_attr,
            timeout: policy.server_timeout(),
            field_count,
            operation_count,
            ..Self::default()
        }
    }

    fn for_write(
        policy: &WritePolicy,
        mut read_attr: ReadAttr,
        write_attr: WriteAttr,
        field_count: u16,
        operation_count: u16,
    ) -> Self {
        let (flags, info_attr, generation) = write_flags(
            policy.record_exists_action,
            policy.generation_policy,
            policy.generation,
            policy.commit_level,
            policy.durable_delete,
        );

        if policy.base_policy.consistency_level == ConsistencyLevel::All {
            read_attr |= ReadAttr::CONSISTENCY_LEVEL_ALL;
        }

        Self {
            read_attr,
            write_attr: write_attr | flags,
            info_attr,
            generation,
            expiration: policy.expiration.into(),
            timeout: policy.server_timeout(),
            field_count,
            operation_count,
            ..Self::default()
        }
    }

    pub(crate) fn is_last(&self) -> bool {
        self.info_attr.contains(InfoAttr::LAST)
    }
}
