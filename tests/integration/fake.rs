//! In-memory cluster that answers the wire protocol through the [`Transport`] trait, so the
//! client can be exercised without a running server.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use windpike::{errors::NetError, FrameStream, Host, Transport};

pub const NAMESPACE: &str = "test";
pub const CLUSTER_NAME: &str = "fake";

const BASE_PORT: u16 = 3100;
const PARTITIONS: usize = 4096;
const DIGEST_SIZE: usize = 20;
/// Messages packed into one response frame of a stream.
const MESSAGES_PER_FRAME: usize = 7;

const PROTO_VERSION: u64 = 2;
const PROTO_INFO: u8 = 1;
const PROTO_MESSAGE: u8 = 3;

const OK: u8 = 0;
const KEY_NOT_FOUND: u8 = 2;
const GENERATION_ERROR: u8 = 3;
const PARAMETER_ERROR: u8 = 4;
const KEY_EXISTS: u8 = 5;
const PARTITION_UNAVAILABLE: u8 = 11;
const BIN_TYPE_ERROR: u8 = 12;
const FILTERED_OUT: u8 = 27;

const READ_GET_ALL: u8 = 1 << 1;
const READ_GET_NO_BINS: u8 = 1 << 5;
const WRITE_WRITE: u8 = 1;
const WRITE_DELETE: u8 = 1 << 1;
const WRITE_GENERATION: u8 = 1 << 2;
const WRITE_GENERATION_GT: u8 = 1 << 3;
const WRITE_CREATE_ONLY: u8 = 1 << 5;
const INFO_LAST: u8 = 1;
const INFO_PARTITION_DONE: u8 = 1 << 2;
const INFO_UPDATE_ONLY: u8 = 1 << 3;
const INFO_CREATE_OR_REPLACE: u8 = 1 << 4;
const INFO_REPLACE_ONLY: u8 = 1 << 5;

const FIELD_NAMESPACE: u8 = 0;
const FIELD_TABLE: u8 = 1;
const FIELD_DIGEST: u8 = 4;
const FIELD_TRAN_ID: u8 = 7;
const FIELD_PID_ARRAY: u8 = 11;
const FIELD_DIGEST_ARRAY: u8 = 12;
const FIELD_MAX_RECORDS: u8 = 13;
const FIELD_INDEX_RANGE: u8 = 22;
const FIELD_UDF_PACKAGE: u8 = 30;
const FIELD_UDF_OP: u8 = 33;
const FIELD_BATCH_INDEX: u8 = 41;
const FIELD_FILTER_EXP: u8 = 43;

const OP_READ: u8 = 1;
const OP_WRITE: u8 = 2;
const OP_INCR: u8 = 5;
const OP_APPEND: u8 = 9;
const OP_PREPEND: u8 = 10;
const OP_TOUCH: u8 = 11;

const EXP_EQ: i64 = 1;
const EXP_LE: i64 = 6;
const EXP_AND: i64 = 16;
const EXP_OR: i64 = 17;
const EXP_NOT: i64 = 18;
const EXP_BIN: i64 = 81;

const PARTICLE_NULL: u8 = 0;
const PARTICLE_INTEGER: u8 = 1;

const BATCH_MSG_INFO: u8 = 0x2;
const BATCH_MSG_GEN: u8 = 0x4;
const BATCH_MSG_TTL: u8 = 0x8;

#[derive(Clone, Debug, PartialEq)]
struct Particle {
    ty: u8,
    data: Vec<u8>,
}

impl Particle {
    fn int(value: i64) -> Self {
        Self {
            ty: PARTICLE_INTEGER,
            data: value.to_be_bytes().to_vec(),
        }
    }

    fn as_int(&self) -> Option<i64> {
        if self.ty != PARTICLE_INTEGER {
            return None;
        }
        self.data.as_slice().try_into().ok().map(i64::from_be_bytes)
    }
}

#[derive(Clone, Debug)]
struct StoredRecord {
    namespace: String,
    set_name: String,
    generation: u32,
    bins: BTreeMap<String, Particle>,
}

#[derive(Debug, Default)]
struct State {
    records: BTreeMap<[u8; DIGEST_SIZE], StoredRecord>,
    unavailable: HashSet<u16>,
    commands: Vec<String>,
    udfs: Vec<String>,
    streams: usize,
    /// Partitions moved away from their initial master.
    owners: HashMap<u16, u16>,
    partition_generation: u32,
}

/// A cluster of `nodes` members, reachable at `127.0.0.1:3100` and the following ports. Node
/// `i` is master of every partition `p` with `p % nodes == i`, unless the partition was moved
/// with [`FakeCluster::move_partition`].
#[derive(Debug)]
pub struct FakeCluster {
    nodes: u16,
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new(nodes: u16) -> Arc<Self> {
        assert!(nodes > 0, "a cluster needs at least one node");
        Arc::new(Self {
            nodes,
            state: Mutex::default(),
        })
    }

    /// Address of the first node, to be used as seed.
    pub fn seed(&self) -> Host {
        Host::new("127.0.0.1", BASE_PORT)
    }

    pub fn node_names(&self) -> Vec<String> {
        (0..self.nodes).map(node_name).collect()
    }

    /// Make `node` the master of the partition. The previous master rejects single record
    /// commands for it from now on, and the partition generation of all nodes changes.
    pub fn move_partition(&self, id: u16, node: u16) {
        assert!(node < self.nodes, "unknown node {node}");
        let mut state = self.state.lock().unwrap();
        state.owners.insert(id, node);
        state.partition_generation += 1;
    }

    /// Node that is currently master of the partition.
    pub fn owner(&self, id: u16) -> u16 {
        owner(&self.state.lock().unwrap(), self.nodes, id)
    }

    /// Report the partition as unavailable to the next scan or query that asks for it.
    pub fn fail_partition_once(&self, id: u16) {
        self.state.lock().unwrap().unavailable.insert(id);
    }

    /// Info commands that were sent besides the ones used to tend the cluster.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Number of scan and query requests that reached any node.
    pub fn stream_requests(&self) -> usize {
        self.state.lock().unwrap().streams
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    fn node_index(&self, host: &Host) -> Result<u16, NetError> {
        host.port
            .checked_sub(BASE_PORT)
            .filter(|index| host.name == "127.0.0.1" && *index < self.nodes)
            .ok_or_else(|| NetError::FailedOpening(host.clone()))
    }

    fn handle(&self, node: u16, mut request: Bytes) -> VecDeque<Bytes> {
        let header = request.get_u64();
        assert_eq!(PROTO_VERSION, header >> 56, "unexpected protocol version");
        assert_eq!(
            (header & 0xffff_ffff_ffff) as usize,
            request.len(),
            "request size doesn't match its header"
        );

        match (header >> 48) as u8 {
            PROTO_INFO => VecDeque::from([self.info(node, &request)]),
            PROTO_MESSAGE => self.message(node, request),
            other => panic!("unsupported protocol type {other}"),
        }
    }

    fn info(&self, node: u16, body: &[u8]) -> Bytes {
        let body = std::str::from_utf8(body).expect("info request must be UTF-8");
        let mut response = String::new();

        for command in body.lines().filter(|line| !line.is_empty()) {
            response.push_str(command);
            response.push('\t');
            response.push_str(&self.info_value(node, command));
            response.push('\n');
        }

        frame(PROTO_INFO, response.as_bytes())
    }

    fn info_value(&self, node: u16, command: &str) -> String {
        match command {
            "node" => return node_name(node),
            "cluster-name" => return CLUSTER_NAME.to_owned(),
            "features" => return "batch-any;pquery;pscans;truncate-namespace;udf".to_owned(),
            "partition-generation" => {
                return (1 + self.state.lock().unwrap().partition_generation).to_string()
            }
            "services" | "services-alternate" => {
                return (0..self.nodes)
                    .filter(|&other| other != node)
                    .map(|other| format!("127.0.0.1:{}", BASE_PORT + other))
                    .collect::<Vec<_>>()
                    .join(";");
            }
            "replicas-master" => {
                return format!("{NAMESPACE}:{}", STANDARD.encode(self.ownership(node)))
            }
            _ => {}
        }

        let mut state = self.state.lock().unwrap();
        state.commands.push(command.to_owned());

        let (name, args) = command.split_once(':').unwrap_or((command, ""));
        match name {
            "udf-put" => {
                if let Some(file) = arg(args, "filename") {
                    state.udfs.push(file.to_owned());
                }
                String::new()
            }
            "udf-remove" => match arg(args, "filename") {
                Some(file) if state.udfs.iter().any(|udf| udf == file) => {
                    state.udfs.retain(|udf| udf != file);
                    "ok".to_owned()
                }
                _ => "error=file_not_found".to_owned(),
            },
            "udf-list" => state
                .udfs
                .iter()
                .map(|udf| format!("filename={udf},hash=0f1e2d3c,type=LUA;"))
                .collect(),
            "truncate" => {
                let namespace = arg(args, "namespace").unwrap_or_default().to_owned();
                let set_name = arg(args, "set").map(str::to_owned);
                state.records.retain(|_, record| {
                    record.namespace != namespace
                        || set_name.as_ref().is_some_and(|set| &record.set_name != set)
                });
                "ok".to_owned()
            }
            _ if name.starts_with("sindex/") => "ns=test;load_pct=100;entries=0".to_owned(),
            "query-show" => format!("trid={}:status=done(ok)", arg(args, "trid").unwrap_or("0")),
            _ => "ok".to_owned(),
        }
    }

    fn ownership(&self, node: u16) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        let mut bitmap = vec![0_u8; PARTITIONS / 8];
        for id in (0..PARTITIONS).filter(|&id| owner(&state, self.nodes, id as u16) == node) {
            bitmap[id >> 3] |= 0x80 >> (id & 7);
        }
        bitmap
    }

    fn message(&self, node: u16, mut body: Bytes) -> VecDeque<Bytes> {
        let request = Request::read_from(&mut body);
        let mut state = self.state.lock().unwrap();

        if let Some(batch) = request.field(FIELD_BATCH_INDEX) {
            return batch_response(&mut state, batch.clone());
        }
        if request.field(FIELD_UDF_OP).is_some() {
            let mut msg = BytesMut::new();
            put_message(&mut msg, INFO_LAST, OK, 0, 0, &[], &[]);
            return VecDeque::from([frame(PROTO_MESSAGE, &msg)]);
        }
        if request.field(FIELD_TRAN_ID).is_some() {
            state.streams += 1;
            return stream_response(&mut state, &request);
        }

        let misrouted = request
            .digest
            .is_some_and(|digest| owner(&state, self.nodes, partition_of(&digest)) != node);
        let reply = if misrouted {
            Reply::code(PARTITION_UNAVAILABLE)
        } else {
            apply(&mut state, &request)
        };
        let mut msg = BytesMut::new();
        put_message(&mut msg, 0, reply.code, reply.generation, 0, &[], &reply.bins);
        VecDeque::from([frame(PROTO_MESSAGE, &msg)])
    }
}

#[async_trait]
impl Transport for FakeCluster {
    async fn send(
        &self,
        host: &Host,
        request: Bytes,
        _timeout: Option<Duration>,
    ) -> Result<Bytes, NetError> {
        let node = self.node_index(host)?;
        self.handle(node, request)
            .pop_front()
            .ok_or(NetError::Closed)
    }

    async fn stream(
        &self,
        host: &Host,
        request: Bytes,
        _timeout: Option<Duration>,
    ) -> Result<Box<dyn FrameStream>, NetError> {
        let node = self.node_index(host)?;
        Ok(Box::new(Replay(self.handle(node, request))))
    }
}

struct Replay(VecDeque<Bytes>);

#[async_trait]
impl FrameStream for Replay {
    async fn next_frame(&mut self) -> Result<Bytes, NetError> {
        self.0.pop_front().ok_or(NetError::Closed)
    }

    async fn finish(self: Box<Self>, _complete: bool) {}
}

fn node_name(index: u16) -> String {
    format!("BB9{index:013X}")
}

fn arg<'a>(args: &'a str, name: &str) -> Option<&'a str> {
    args.split(';')
        .filter_map(|pair| pair.split_once('='))
        .find_map(|(key, value)| (key == name).then_some(value))
}

fn partition_of(digest: &[u8; DIGEST_SIZE]) -> u16 {
    (u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize % PARTITIONS) as u16
}

fn owner(state: &State, nodes: u16, id: u16) -> u16 {
    state.owners.get(&id).copied().unwrap_or(id % nodes)
}

struct Op {
    ty: u8,
    particle: u8,
    name: String,
    value: Bytes,
}

struct Request {
    read_attr: u8,
    write_attr: u8,
    info_attr: u8,
    generation: u32,
    digest: Option<[u8; DIGEST_SIZE]>,
    fields: Vec<(u8, Bytes)>,
    ops: Vec<Op>,
}

impl Request {
    fn read_from(buf: &mut Bytes) -> Self {
        let header_size = usize::from(buf.get_u8());
        let read_attr = buf.get_u8();
        let write_attr = buf.get_u8();
        let info_attr = buf.get_u8();
        // unused byte, result code
        buf.advance(2);
        let generation = buf.get_u32();
        // expiration, timeout
        buf.advance(8);
        let field_count = buf.get_u16();
        let op_count = buf.get_u16();
        buf.advance(header_size - 22);

        let fields = read_fields(buf, field_count);
        let ops = read_ops(buf, op_count);
        let digest = fields
            .iter()
            .find(|(ty, _)| *ty == FIELD_DIGEST)
            .and_then(|(_, data)| data.as_ref().try_into().ok());

        Self {
            read_attr,
            write_attr,
            info_attr,
            generation,
            digest,
            fields,
            ops,
        }
    }

    fn field(&self, ty: u8) -> Option<&Bytes> {
        self.fields
            .iter()
            .find_map(|(field_ty, data)| (*field_ty == ty).then_some(data))
    }

    fn str_field(&self, ty: u8) -> String {
        self.field(ty)
            .map(|data| String::from_utf8_lossy(data).into_owned())
            .unwrap_or_default()
    }

    /// Bins the request selects from a record.
    fn selection(&self, record: &StoredRecord) -> Vec<(String, Particle)> {
        if self.read_attr & READ_GET_NO_BINS != 0 {
            return Vec::new();
        }
        if self.read_attr & READ_GET_ALL != 0 || self.ops.is_empty() {
            return all_bins(record);
        }
        self.ops
            .iter()
            .filter_map(|op| Some((op.name.clone(), record.bins.get(&op.name)?.clone())))
            .collect()
    }
}

fn read_fields(buf: &mut Bytes, count: u16) -> Vec<(u8, Bytes)> {
    (0..count)
        .map(|_| {
            let size = buf.get_u32() as usize;
            let ty = buf.get_u8();
            (ty, buf.split_to(size - 1))
        })
        .collect()
}

fn read_ops(buf: &mut Bytes, count: u16) -> Vec<Op> {
    (0..count)
        .map(|_| {
            let size = buf.get_u32() as usize;
            let ty = buf.get_u8();
            let particle = buf.get_u8();
            buf.advance(1);
            let name_len = usize::from(buf.get_u8());
            let name = String::from_utf8(buf.split_to(name_len).to_vec()).expect("bin name");
            let value = buf.split_to(size - 4 - name_len);
            Op {
                ty,
                particle,
                name,
                value,
            }
        })
        .collect()
}

fn all_bins(record: &StoredRecord) -> Vec<(String, Particle)> {
    record
        .bins
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

struct Reply {
    code: u8,
    generation: u32,
    bins: Vec<(String, Particle)>,
}

impl Reply {
    fn code(code: u8) -> Self {
        Self {
            code,
            generation: 0,
            bins: Vec::new(),
        }
    }
}

fn apply(state: &mut State, request: &Request) -> Reply {
    let Some(digest) = request.digest else {
        return Reply::code(PARAMETER_ERROR);
    };

    if let (Some(filter), Some(record)) =
        (request.field(FIELD_FILTER_EXP), state.records.get(&digest))
    {
        if !matches!(eval(&mut filter.clone(), record), Operand::Bool(true)) {
            return Reply::code(FILTERED_OUT);
        }
    }

    if request.write_attr & WRITE_DELETE != 0 {
        return match state.records.remove(&digest) {
            Some(_) => Reply::code(OK),
            None => Reply::code(KEY_NOT_FOUND),
        };
    }
    if request.write_attr & WRITE_WRITE != 0 {
        return write(state, digest, request);
    }

    match state.records.get(&digest) {
        Some(record) => Reply {
            code: OK,
            generation: record.generation,
            bins: request.selection(record),
        },
        None => Reply::code(KEY_NOT_FOUND),
    }
}

fn write(state: &mut State, digest: [u8; DIGEST_SIZE], request: &Request) -> Reply {
    let existing = state.records.get(&digest);
    if existing.is_none() && request.ops.iter().any(|op| op.ty == OP_TOUCH) {
        return Reply::code(KEY_NOT_FOUND);
    }

    match existing {
        Some(_) if request.write_attr & WRITE_CREATE_ONLY != 0 => {
            return Reply::code(KEY_EXISTS)
        }
        None if request.info_attr & (INFO_UPDATE_ONLY | INFO_REPLACE_ONLY) != 0 => {
            return Reply::code(KEY_NOT_FOUND)
        }
        Some(record)
            if request.write_attr & WRITE_GENERATION != 0
                && record.generation != request.generation =>
        {
            return Reply::code(GENERATION_ERROR)
        }
        Some(record)
            if request.write_attr & WRITE_GENERATION_GT != 0
                && record.generation >= request.generation =>
        {
            return Reply::code(GENERATION_ERROR)
        }
        _ => {}
    }

    let mut record = existing.cloned().unwrap_or_else(|| StoredRecord {
        namespace: request.str_field(FIELD_NAMESPACE),
        set_name: request.str_field(FIELD_TABLE),
        generation: 0,
        bins: BTreeMap::new(),
    });
    if request.info_attr & (INFO_CREATE_OR_REPLACE | INFO_REPLACE_ONLY) != 0 {
        record.bins.clear();
    }
    let mut bins = Vec::new();

    for op in &request.ops {
        match op.ty {
            OP_WRITE if op.particle == PARTICLE_NULL => {
                record.bins.remove(&op.name);
            }
            OP_WRITE => {
                record.bins.insert(
                    op.name.clone(),
                    Particle {
                        ty: op.particle,
                        data: op.value.to_vec(),
                    },
                );
            }
            OP_INCR => {
                let delta = Particle {
                    ty: op.particle,
                    data: op.value.to_vec(),
                };
                let Some(delta) = delta.as_int() else {
                    return Reply::code(PARAMETER_ERROR);
                };
                let current = match record.bins.get(&op.name) {
                    None => 0,
                    Some(value) => match value.as_int() {
                        Some(current) => current,
                        None => return Reply::code(BIN_TYPE_ERROR),
                    },
                };
                record
                    .bins
                    .insert(op.name.clone(), Particle::int(current.wrapping_add(delta)));
            }
            OP_APPEND | OP_PREPEND => match record.bins.get_mut(&op.name) {
                None => {
                    record.bins.insert(
                        op.name.clone(),
                        Particle {
                            ty: op.particle,
                            data: op.value.to_vec(),
                        },
                    );
                }
                Some(value) if value.ty == op.particle => {
                    if op.ty == OP_APPEND {
                        value.data.extend_from_slice(&op.value);
                    } else {
                        let mut data = op.value.to_vec();
                        data.extend_from_slice(&value.data);
                        value.data = data;
                    }
                }
                Some(_) => return Reply::code(BIN_TYPE_ERROR),
            },
            OP_TOUCH => {}
            OP_READ if op.name.is_empty() => bins.extend(all_bins(&record)),
            OP_READ => {
                if let Some(value) = record.bins.get(&op.name) {
                    bins.push((op.name.clone(), value.clone()));
                }
            }
            _ => return Reply::code(PARAMETER_ERROR),
        }
    }

    record.generation += 1;
    let generation = record.generation;
    state.records.insert(digest, record);

    Reply {
        code: OK,
        generation,
        bins,
    }
}

fn batch_response(state: &mut State, mut data: Bytes) -> VecDeque<Bytes> {
    let count = data.get_u32();
    let _flags = data.get_u8();

    let mut messages = Vec::new();
    for _ in 0..count {
        let index = data.get_u32();
        let mut digest = [0; DIGEST_SIZE];
        data.copy_to_slice(&mut digest);

        let ty = data.get_u8();
        let (read_attr, write_attr, info_attr) = if ty & BATCH_MSG_INFO == 0 {
            (0, 0, 0)
        } else {
            (data.get_u8(), data.get_u8(), data.get_u8())
        };
        let generation = if ty & BATCH_MSG_GEN == 0 {
            0
        } else {
            u32::from(data.get_u16())
        };
        if ty & BATCH_MSG_TTL != 0 {
            data.get_u32();
        }

        let field_count = data.get_u16();
        let op_count = data.get_u16();
        let request = Request {
            read_attr,
            write_attr,
            info_attr,
            generation,
            digest: Some(digest),
            fields: read_fields(&mut data, field_count),
            ops: read_ops(&mut data, op_count),
        };

        let reply = if request.field(FIELD_UDF_PACKAGE).is_some() {
            Reply::code(PARAMETER_ERROR)
        } else {
            apply(state, &request)
        };

        let mut msg = BytesMut::new();
        put_message(&mut msg, 0, reply.code, reply.generation, index, &[], &reply.bins);
        messages.push(msg.freeze());
    }

    frames(messages)
}

/// Result of evaluating a filter expression.
#[derive(Debug, PartialEq)]
enum Operand {
    Nil,
    Int(i64),
    Bool(bool),
}

/// Evaluate a packed filter expression against the record. Only integer bins, integer literals,
/// comparisons and boolean logic are understood.
fn eval(exp: &mut Bytes, record: &StoredRecord) -> Operand {
    let marker = exp[0];
    let len = match marker {
        0x90..=0x9f => usize::from(exp.get_u8() & 0x0f),
        0xdc => {
            exp.advance(1);
            usize::from(exp.get_u16())
        }
        _ => return Operand::Int(read_int(exp)),
    };

    let op = read_int(exp);
    match op {
        EXP_EQ..=EXP_LE => {
            let (Operand::Int(left), Operand::Int(right)) = (eval(exp, record), eval(exp, record))
            else {
                return Operand::Bool(false);
            };
            Operand::Bool(match op {
                1 => left == right,
                2 => left != right,
                3 => left > right,
                4 => left >= right,
                5 => left < right,
                _ => left <= right,
            })
        }
        EXP_AND | EXP_OR => {
            let args = (1..len)
                .map(|_| eval(exp, record) == Operand::Bool(true))
                .collect::<Vec<_>>();
            Operand::Bool(if op == EXP_AND {
                args.iter().all(|&arg| arg)
            } else {
                args.iter().any(|&arg| arg)
            })
        }
        EXP_NOT => Operand::Bool(eval(exp, record) != Operand::Bool(true)),
        EXP_BIN => {
            let _ty = read_int(exp);
            let name = read_str(exp);
            record
                .bins
                .get(&name)
                .and_then(Particle::as_int)
                .map_or(Operand::Nil, Operand::Int)
        }
        other => panic!("unsupported expression operator {other}"),
    }
}

fn read_int(buf: &mut Bytes) -> i64 {
    match buf.get_u8() {
        marker @ 0x00..=0x7f => i64::from(marker),
        marker @ 0xe0..=0xff => i64::from(marker as i8),
        0xcc => i64::from(buf.get_u8()),
        0xcd => i64::from(buf.get_u16()),
        0xce => i64::from(buf.get_u32()),
        0xcf => buf.get_u64() as i64,
        0xd0 => i64::from(buf.get_i8()),
        0xd1 => i64::from(buf.get_i16()),
        0xd2 => i64::from(buf.get_i32()),
        0xd3 => buf.get_i64(),
        other => panic!("expected an integer, found marker {other:#x}"),
    }
}

fn read_str(buf: &mut Bytes) -> String {
    let len = match buf.get_u8() {
        marker @ 0xa0..=0xbf => usize::from(marker & 0x1f),
        0xd9 => usize::from(buf.get_u8()),
        other => panic!("expected a string, found marker {other:#x}"),
    };
    String::from_utf8(buf.split_to(len).to_vec()).expect("bin name")
}

/// Integer range or string equality of a secondary index query.
enum IndexFilter {
    Range { bin: String, begin: i64, end: i64 },
    Equal { bin: String, value: Particle },
}

impl IndexFilter {
    fn read_from(mut data: Bytes) -> Self {
        assert_eq!(1, data.get_u8(), "only single bin filters are supported");
        let name_len = usize::from(data.get_u8());
        let bin = String::from_utf8(data.split_to(name_len).to_vec()).expect("bin name");
        let ty = data.get_u8();
        let begin_len = data.get_u32() as usize;
        let begin = data.split_to(begin_len);
        let end_len = data.get_u32() as usize;
        let end = data.split_to(end_len);

        if ty == PARTICLE_INTEGER {
            Self::Range {
                bin,
                begin: i64::from_be_bytes(begin.as_ref().try_into().expect("range begin")),
                end: i64::from_be_bytes(end.as_ref().try_into().expect("range end")),
            }
        } else {
            Self::Equal {
                bin,
                value: Particle {
                    ty,
                    data: begin.to_vec(),
                },
            }
        }
    }

    fn matches(&self, record: &StoredRecord) -> bool {
        match self {
            Self::Range { bin, begin, end } => record
                .bins
                .get(bin)
                .and_then(Particle::as_int)
                .is_some_and(|value| (*begin..=*end).contains(&value)),
            Self::Equal { bin, value } => record.bins.get(bin) == Some(value),
        }
    }
}

fn stream_response(state: &mut State, request: &Request) -> VecDeque<Bytes> {
    let namespace = request.str_field(FIELD_NAMESPACE);
    let set_name = request.str_field(FIELD_TABLE);
    let filter = request
        .field(FIELD_INDEX_RANGE)
        .map(|data| IndexFilter::read_from(data.clone()));
    let max_records = request
        .field(FIELD_MAX_RECORDS)
        .map_or(0, |data| data.clone().get_u64());

    let mut cursors = Vec::new();
    if let Some(pids) = request.field(FIELD_PID_ARRAY) {
        cursors.extend(
            pids.chunks_exact(2)
                .map(|id| (u16::from_le_bytes([id[0], id[1]]), None)),
        );
    }
    if let Some(digests) = request.field(FIELD_DIGEST_ARRAY) {
        cursors.extend(digests.chunks_exact(DIGEST_SIZE).map(|digest| {
            let digest: [u8; DIGEST_SIZE] = digest.try_into().expect("digest");
            (partition_of(&digest), Some(digest))
        }));
    }

    let mut messages = Vec::new();
    let mut sent = 0;

    'partitions: for (id, after) in cursors {
        if state.unavailable.remove(&id) {
            let mut msg = BytesMut::new();
            put_message(
                &mut msg,
                INFO_PARTITION_DONE,
                PARTITION_UNAVAILABLE,
                u32::from(id),
                0,
                &[],
                &[],
            );
            messages.push(msg.freeze());
            continue;
        }

        let matching = state.records.iter().filter(|(digest, record)| {
            partition_of(digest) == id
                && after.map_or(true, |after| **digest > after)
                && record.namespace == namespace
                && (set_name.is_empty() || record.set_name == set_name)
                && filter.as_ref().map_or(true, |filter| filter.matches(record))
        });

        for (digest, record) in matching {
            if max_records > 0 && sent >= max_records {
                break 'partitions;
            }

            let mut msg = BytesMut::new();
            put_message(
                &mut msg,
                0,
                OK,
                record.generation,
                0,
                &[
                    (FIELD_DIGEST, digest.as_slice()),
                    (FIELD_NAMESPACE, record.namespace.as_bytes()),
                    (FIELD_TABLE, record.set_name.as_bytes()),
                ],
                &request.selection(record),
            );
            messages.push(msg.freeze());
            sent += 1;
        }
    }

    frames(messages)
}

/// Pack the messages into frames, closing the response with a last message.
fn frames(mut messages: Vec<Bytes>) -> VecDeque<Bytes> {
    let mut last = BytesMut::new();
    put_message(&mut last, INFO_LAST, OK, 0, 0, &[], &[]);
    messages.push(last.freeze());

    messages
        .chunks(MESSAGES_PER_FRAME)
        .map(|chunk| frame(PROTO_MESSAGE, &chunk.concat()))
        .collect()
}

fn put_message(
    buf: &mut BytesMut,
    info_attr: u8,
    code: u8,
    generation: u32,
    timeout: u32,
    fields: &[(u8, &[u8])],
    bins: &[(String, Particle)],
) {
    buf.put_u8(22);
    buf.put_u8(0);
    buf.put_u8(0);
    buf.put_u8(info_attr);
    buf.put_u8(0);
    buf.put_u8(code);
    buf.put_u32(generation);
    buf.put_u32(0);
    buf.put_u32(timeout);
    buf.put_u16(fields.len() as u16);
    buf.put_u16(bins.len() as u16);

    for (ty, data) in fields {
        buf.put_u32(data.len() as u32 + 1);
        buf.put_u8(*ty);
        buf.put_slice(data);
    }
    for (name, value) in bins {
        buf.put_u32((4 + name.len() + value.data.len()) as u32);
        buf.put_u8(OP_READ);
        buf.put_u8(value.ty);
        buf.put_u8(0);
        buf.put_u8(name.len() as u8);
        buf.put_slice(name.as_bytes());
        buf.put_slice(&value.data);
    }
}

fn frame(ty: u8, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(8 + body.len());
    buf.put_u64((PROTO_VERSION << 56) | (u64::from(ty) << 48) | body.len() as u64);
    buf.put_slice(body);
    buf.freeze()
}
