use super::BasePolicy;

/// `WritePolicy` encapsulates parameters for all write operations.
#[derive(Debug, Clone)]
pub struct WritePolicy {
    /// Base policy instance. Unlike reads, writes are not retried by default, as a retried
    /// non-idempotent write (like an increment) may be applied twice.
    pub base_policy: BasePolicy,

    /// RecordExistsAction qualifies how to handle writes where the record already exists.
    pub record_exists_action: RecordExistsAction,

    /// GenerationPolicy qualifies how to handle record writes based on record generation.
    /// The default (NONE) indicates that the generation is not used to restrict writes.
    pub generation_policy: GenerationPolicy,

    /// Desired consistency guarantee when committing a transaction on the server. The default
    /// (COMMIT_ALL) indicates that the server should wait for master and all replica commits to
    /// be successful before returning success to the client.
    pub commit_level: CommitLevel,

    /// Expected generation, only used together with a [`GenerationPolicy`] other than
    /// [`GenerationPolicy::None`]. The generation is the number of times a record has been
    /// modified (including creation) on the server.
    pub generation: u32,

    /// Expiration determimes record expiration in seconds. Also known as TTL (Time-To-Live).
    pub expiration: Expiration,

    /// For [`Client::operate`](crate::Client::operate), return a result for every operation.
    ///
    /// Some list operations do not return results by default (`lists::clear()` for example).
    /// Setting this flag makes the result offset within a bin's result list equal the operate
    /// sequence.
    pub respond_per_each_op: bool,

    /// **Enterprise only:** If the transaction results in a record deletion, leave a tombstone
    /// for the record. This prevents deleted records from reappearing after node failures.
    pub durable_delete: bool,
}

impl WritePolicy {
    /// Create a new write policy instance with the specified generation and expiration parameters.
    #[must_use]
    pub fn new(gen: u32, exp: Expiration) -> Self {
        Self {
            generation: gen,
            expiration: exp,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_record_exists_action(mut self, action: RecordExistsAction) -> Self {
        self.record_exists_action = action;
        self
    }

    /// Only apply the write if the record's generation matches according to `policy`.
    #[must_use]
    pub fn with_generation(mut self, policy: GenerationPolicy, generation: u32) -> Self {
        self.generation_policy = policy;
        self.generation = generation;
        self
    }

    #[must_use]
    pub fn with_commit_level(mut self, level: CommitLevel) -> Self {
        self.commit_level = level;
        self
    }

    #[must_use]
    pub fn with_expiration(mut self, expiration: Expiration) -> Self {
        self.expiration = expiration;
        self
    }

    #[must_use]
    pub fn with_durable_delete(mut self, durable_delete: bool) -> Self {
        self.durable_delete = durable_delete;
        self
    }

    #[must_use]
    pub fn with_respond_per_each_op(mut self, respond: bool) -> Self {
        self.respond_per_each_op = respond;
        self
    }
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self {
            base_policy: BasePolicy {
                max_retries: 0,
                ..BasePolicy::default()
            },
            record_exists_action: RecordExistsAction::default(),
            generation_policy: GenerationPolicy::default(),
            commit_level: CommitLevel::default(),
            generation: 0,
            expiration: Expiration::default(),
            respond_per_each_op: false,
            durable_delete: false,
        }
    }
}

base_policy!(WritePolicy);

/// `RecordExistsAction` determines how to handle writes to records that may or may not exist.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RecordExistsAction {
    /// Create or update record. Merge write command bins with existing bins.
    #[default]
    Update,
    /// Update record only. Fail if record does not exist. Merge write command bins with existing
    /// bins.
    UpdateOnly,
    /// Create or replace record. Delete existing bins not referenced by write command bins.
    Replace,
    /// Replace record only. Fail if record does not exist. Delete existing bins not referenced by
    /// write command bins.
    ReplaceOnly,
    /// Create only. Fail if record exists.
    CreateOnly,
}

/// `GenerationPolicy` determines how to handle record writes based on record generation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum GenerationPolicy {
    /// Do not use record generation to restrict writes.
    #[default]
    None,
    /// Update/delete record if expected generation is equal to server generation. Otherwise,
    /// fail with [`ResultCode::GenerationError`](crate::ResultCode::GenerationError).
    ExpectGenEqual,
    /// Update/delete record if expected generation greater than the server generation.
    /// Otherwise, fail. This is useful for restore after backup.
    ExpectGenGreater,
}

/// `CommitLevel` determines when the server reports a write as successful.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CommitLevel {
    /// Wait until successfully committing master and all replicas.
    #[default]
    CommitAll,
    /// Wait until successfully committing master only.
    CommitMaster,
}

const NAMESPACE_DEFAULT: u32 = 0;
const DONT_EXPIRE: u32 = u32::MAX; // -1 as i32
const DONT_UPDATE: u32 = u32::MAX - 1; // -2 as i32

/// Record expiration, also known as time-to-live (TTL).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Expiration {
    /// Set the record to expire X seconds from now
    Seconds(u32),
    /// Set the record's expiry time using the default time-to-live (TTL) value for the namespace
    #[default]
    NamespaceDefault,
    /// Set the record to never expire.
    Never,
    /// Do not change the record's expiry time when updating the record.
    DontUpdate,
}

impl From<Expiration> for u32 {
    fn from(exp: Expiration) -> Self {
        match exp {
            Expiration::Seconds(secs) => secs,
            Expiration::NamespaceDefault => NAMESPACE_DEFAULT,
            Expiration::Never => DONT_EXPIRE,
            Expiration::DontUpdate => DONT_UPDATE,
        }
    }
}
