/// Identifier of a message field. The values line up with the server's `proto.h`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum FieldType {
    Namespace = 0,
    Table = 1,
    Key = 2,
    DigestRipe = 4,
    /// Transaction (task) id, passed back unmodified by the server.
    TranId = 7,
    SocketTimeout = 9,
    RecordsPerSecond = 10,
    PidArray = 11,
    DigestArray = 12,
    MaxRecords = 13,
    IndexName = 21,
    IndexRange = 22,
    IndexType = 26,
    UdfPackageName = 30,
    UdfFunction = 31,
    UdfArgList = 32,
    UdfOp = 33,
    BatchIndex = 41,
    FilterExp = 43,
}
