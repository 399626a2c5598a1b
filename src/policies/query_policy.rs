use std::time::Duration;

use super::BasePolicy;

/// `QueryPolicy` encapsulates parameters for query operations.
#[derive(Clone, Debug)]
pub struct QueryPolicy {
    /// Base policy instance
    pub base_policy: BasePolicy,

    /// Approximate number of records to return to the client, split evenly across the queried
    /// nodes. Zero means all records.
    pub max_records: u64,

    /// Limit returned records per second (rps) rate for each server. Zero means no limit.
    pub records_per_second: u32,

    /// Maximum number of concurrent requests to server nodes at any point in time. If there are 16
    /// nodes in the cluster and `max_concurrent_nodes` is 8, then queries will be made to 8 nodes
    /// in parallel. When a query completes, a new query will be issued until all 16 nodes have
    /// been queried. Default (0) is to issue requests to all server nodes in parallel.
    pub max_concurrent_nodes: usize,

    /// Number of records to place in queue before blocking.
    pub record_queue_size: usize,
}

impl QueryPolicy {
    /// Create a new query policy instance with default parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_records(mut self, max_records: u64) -> Self {
        self.max_records = max_records;
        self
    }
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self {
            base_policy: BasePolicy {
                total_timeout: Duration::ZERO,
                max_retries: 5,
                ..BasePolicy::default()
            },
            max_records: 0,
            records_per_second: 0,
            max_concurrent_nodes: 0,
            record_queue_size: 1024,
        }
    }
}

base_policy!(QueryPolicy);
