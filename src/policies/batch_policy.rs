use super::{BasePolicy, CommitLevel, Expiration, GenerationPolicy, RecordExistsAction};
use crate::exp::Expression;

/// `BatchPolicy` encapsulates parameters for all batch operations.
///
/// The base policy applies to the requests sent to each node. The per-record policies
/// ([`BatchReadPolicy`], [`BatchWritePolicy`], ...) are attached to the individual records.
#[derive(Clone, Debug)]
pub struct BatchPolicy {
    /// Base policy instance
    pub base_policy: BasePolicy,

    /// How many node requests of a batch run at the same time.
    pub concurrency: Concurrency,

    /// Allow batch to be processed immediately in the server's receiving thread when the server
    /// deems it to be appropriate. If false, the batch will always be processed in separate
    /// transaction threads.
    ///
    /// Default: true
    pub allow_inline: bool,

    /// Retries of a node request that carries write, delete or UDF entries, in place of
    /// `base_policy.max_retries`. A resent request may apply writes like `add` a second time.
    ///
    /// Default: 0
    pub max_write_retries: usize,

    /// Return per-record failures in the results. When false, the first record that failed
    /// turns into a failure of the whole batch call.
    ///
    /// Default: true
    pub allow_partial_results: bool,
}

impl BatchPolicy {
    /// Create a new batch policy instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Allow batches with write entries to be resent after a failed attempt.
    #[must_use]
    pub fn with_max_write_retries(mut self, retries: usize) -> Self {
        self.max_write_retries = retries;
        self
    }

    #[must_use]
    pub fn with_allow_partial_results(mut self, allow: bool) -> Self {
        self.allow_partial_results = allow;
        self
    }
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            base_policy: BasePolicy::default(),
            concurrency: Concurrency::default(),
            allow_inline: true,
            max_write_retries: 0,
            allow_partial_results: true,
        }
    }
}

base_policy!(BatchPolicy);

/// Specifies whether a command, that needs to be executed on multiple cluster nodes, should be
/// executed sequentially, one node at a time, or in parallel on multiple nodes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Concurrency {
    /// Issue commands sequentially. This mode has a performance advantage for small to
    /// medium sized batch sizes.
    #[default]
    Sequential,
    /// Issue all commands in parallel tasks. This mode has a performance advantage for
    /// extremely large batch sizes because each node can process the request immediately.
    Parallel,
    /// Issue up to N commands in parallel. When a request completes, a new request will be issued
    /// until all requests are complete.
    ///
    /// E.g. if there are 16 nodes requested and concurrency is set to `MaxThreads(8)`, then batch
    /// requests will be made for 8 nodes in parallel. When a request completes, a new request
    /// will be issued until all 16 requests are complete.
    MaxThreads(usize),
}

impl Concurrency {
    /// Upper bound of node requests in flight for `nodes` nodes.
    pub(crate) fn limit(self, nodes: usize) -> usize {
        match self {
            Self::Sequential => 1,
            Self::Parallel => nodes.max(1),
            Self::MaxThreads(n) => n.clamp(1, nodes.max(1)),
        }
    }
}

/// Policy attributes of a single read in a batch.
#[derive(Clone, Debug, Default)]
pub struct BatchReadPolicy {
    /// Filter applied to this record only. Takes precedence over the batch policy's filter.
    pub filter_expression: Option<Expression>,
}

/// Policy attributes of a single write in a batch.
#[derive(Clone, Debug, Default)]
pub struct BatchWritePolicy {
    /// Filter applied to this record only. Takes precedence over the batch policy's filter.
    pub filter_expression: Option<Expression>,
    pub record_exists_action: RecordExistsAction,
    pub commit_level: CommitLevel,
    pub generation_policy: GenerationPolicy,
    pub generation: u32,
    pub expiration: Expiration,
    pub durable_delete: bool,
    /// Send the user key in addition to the digest.
    pub send_key: bool,
}

/// Policy attributes of a single delete in a batch.
#[derive(Clone, Debug, Default)]
pub struct BatchDeletePolicy {
    /// Filter applied to this record only. Takes precedence over the batch policy's filter.
    pub filter_expression: Option<Expression>,
    pub commit_level: CommitLevel,
    pub generation_policy: GenerationPolicy,
    pub generation: u32,
    pub durable_delete: bool,
    pub send_key: bool,
}

/// Policy attributes of a single UDF call in a batch.
#[derive(Clone, Debug, Default)]
pub struct BatchUdfPolicy {
    /// Filter applied to this record only. Takes precedence over the batch policy's filter.
    pub filter_expression: Option<Expression>,
    pub commit_level: CommitLevel,
    pub expiration: Expiration,
    pub durable_delete: bool,
    pub send_key: bool,
}
