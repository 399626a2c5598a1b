use std::time::Duration;

use super::BasePolicy;

/// `ScanPolicy` encapsulates optional parameters used in scan operations.
#[derive(Debug, Clone)]
pub struct ScanPolicy {
    /// Base policy instance. Scans have no total timeout by default and retry partitions up to
    /// five times.
    pub base_policy: BasePolicy,

    /// Approximate number of records to return to the client, split evenly across the nodes that
    /// are scanned. Zero means all records.
    ///
    /// Together with the [`PartitionFilter`](crate::query::PartitionFilter) returned by
    /// [`Recordset::partition_filter`](crate::query::Recordset::partition_filter), this allows to
    /// page through a set.
    pub max_records: u64,

    /// Limit returned records per second (rps) rate for each server. Zero means no limit.
    pub records_per_second: u32,

    /// Maximum number of concurrent requests to server nodes at any point in time. If there are 16
    /// nodes in the cluster and `max_concurrent_nodes` is 8, then scan requests will be made to 8
    /// nodes in parallel. When a scan completes, a new scan request will be issued until all 16
    /// nodes have been scanned. Default (0) is to issue requests to all server nodes in parallel.
    pub max_concurrent_nodes: usize,

    /// Number of records to place in queue before blocking. Records received from multiple server
    /// nodes will be placed in a queue. If the queue is full, the node readers wait until records
    /// are consumed.
    pub record_queue_size: usize,
}

impl ScanPolicy {
    /// Create a new scan policy instance with default parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_records(mut self, max_records: u64) -> Self {
        self.max_records = max_records;
        self
    }

    #[must_use]
    pub fn with_records_per_second(mut self, rps: u32) -> Self {
        self.records_per_second = rps;
        self
    }
}

impl Default for ScanPolicy {
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

base_policy!(ScanPolicy);
