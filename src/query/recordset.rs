use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};

use super::PartitionFilter;
use crate::{errors::Result, Record};

/// Virtual collection of records retrieved through queries and scans. During a query/scan,
/// multiple tasks retrieve records from the server nodes and put these records on an internal
/// queue managed by the recordset. The caller consumes these records from the queue.
///
/// Dropping the recordset stops the remaining node requests.
#[derive(Debug)]
pub struct Recordset {
    queue: Mutex<mpsc::Receiver<Result<Record>>>,
    state: Arc<StreamState>,
}

/// State shared between a recordset and the tasks that feed it.
#[derive(Debug)]
pub(crate) struct StreamState {
    task_id: u64,
    cancelled: watch::Sender<bool>,
    filter: Mutex<Option<PartitionFilter>>,
}

impl StreamState {
    pub(crate) fn new(task_id: u64) -> Self {
        Self {
            task_id,
            cancelled: watch::channel(false).0,
            filter: Mutex::new(None),
        }
    }

    pub(crate) fn task_id(&self) -> u64 {
        self.task_id
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Mark the stream as cancelled. Returns whether it was active before.
    pub(crate) fn cancel(&self) -> bool {
        !self.cancelled.send_replace(true)
    }

    /// Resolves once the stream is cancelled.
    pub(crate) async fn cancelled(&self) {
        let mut rx = self.cancelled.subscribe();
        // The sender lives in `self`, so waiting can't fail.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    pub(crate) async fn set_filter(&self, filter: PartitionFilter) {
        *self.filter.lock().await = Some(filter);
    }
}

impl Recordset {
    pub(crate) fn new(queue: mpsc::Receiver<Result<Record>>, state: Arc<StreamState>) -> Self {
        Self {
            queue: Mutex::new(queue),
            state,
        }
    }

    /// Wait for the next record. Returns `None` once all records were delivered or the recordset
    /// was closed.
    ///
    /// An error ends the stream, the following call returns `None`.
    pub async fn next(&self) -> Option<Result<Record>> {
        if self.state.is_cancelled() {
            return None;
        }

        let mut queue = self.queue.lock().await;
        let item = tokio::select! {
            biased;
            () = self.state.cancelled() => None,
            item = queue.recv() => item,
        };

        if !matches!(item, Some(Ok(_))) {
            self.state.cancel();
        }
        item
    }

    /// Stop the scan or query. Tasks that wait for records in [`Self::next`] return `None`.
    /// Closing more than once has no effect.
    pub fn close(&self) {
        if self.state.cancel() {
            tracing::debug!(task_id = self.state.task_id, "recordset closed");
        }
    }

    /// Whether records may still arrive.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.state.is_cancelled()
    }

    /// Progress of every partition once all node requests finished. Pass it to the next scan or
    /// query to continue after the records received so far.
    pub async fn partition_filter(&self) -> Option<PartitionFilter> {
        self.state.filter.lock().await.clone()
    }

    #[must_use]
    pub fn task_id(&self) -> u64 {
        self.state.task_id
    }
}

impl Drop for Recordset {
    fn drop(&mut self) {
        self.state.cancel();
    }
}
