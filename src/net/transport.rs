use std::{collections::HashMap, fmt, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    pool::{Pool, PooledConnection},
    Host, NetError, Result,
};
use crate::policies::ClientPolicy;

/// Channel between the client and the server nodes.
///
/// Requests and responses are whole protocol frames, each starting with the 8-byte protocol
/// header. The client builds requests, picks the target host and decodes the responses, while
/// the transport owns connection handling.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Send a request and wait for its single response frame. The timeout bounds the whole
    /// exchange, including waiting for a free connection.
    async fn send(&self, host: &Host, request: Bytes, timeout: Option<Duration>) -> Result<Bytes>;

    /// Send a request that is answered by a sequence of frames, like scans, queries and batches.
    /// The timeout bounds each step separately.
    async fn stream(
        &self,
        host: &Host,
        request: Bytes,
        timeout: Option<Duration>,
    ) -> Result<Box<dyn FrameStream>>;

    /// Release any resources held for the host, after it left the cluster.
    async fn disconnect(&self, _host: &Host) {}

    /// Release all resources.
    async fn close(&self) {}
}

/// Response frames of a streamed request.
#[async_trait]
pub trait FrameStream: Send {
    async fn next_frame(&mut self) -> Result<Bytes>;

    /// End the exchange. With `complete` false the response wasn't read to its end, and the
    /// underlying channel can't be reused.
    async fn finish(self: Box<Self>, complete: bool);
}

/// Default transport over plain TCP, with a pool of connections per host.
#[derive(Debug)]
pub struct TcpTransport {
    policy: ClientPolicy,
    pools: RwLock<HashMap<Host, Arc<Pool>>>,
}

impl TcpTransport {
    #[must_use]
    pub fn new(policy: ClientPolicy) -> Self {
        Self {
            policy,
            pools: RwLock::default(),
        }
    }

    async fn pool(&self, host: &Host) -> Arc<Pool> {
        if let Some(pool) = self.pools.read().await.get(host) {
            return Arc::clone(pool);
        }

        let mut pools = self.pools.write().await;
        Arc::clone(
            pools
                .entry(host.clone())
                .or_insert_with(|| Arc::new(Pool::new(host.clone(), self.policy.clone()))),
        )
    }

    async fn checkout(&self, host: &Host, timeout: Option<Duration>) -> Result<PooledConnection> {
        self.pool(host).await.get(timeout).await
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, host: &Host, request: Bytes, timeout: Option<Duration>) -> Result<Bytes> {
        let mut conn = self.checkout(host, timeout).await?;

        let result = with_timeout(timeout, async {
            conn.write_all(&request).await?;
            conn.read_frame().await
        })
        .await;

        if let Err(err) = &result {
            // Remaining bytes of the response may still arrive, so the connection can't be
            // reused.
            debug!(%host, %err, "closing connection after failed exchange");
            conn.close().await;
        }
        result
    }

    async fn stream(
        &self,
        host: &Host,
        request: Bytes,
        timeout: Option<Duration>,
    ) -> Result<Box<dyn FrameStream>> {
        let mut conn = self.checkout(host, timeout).await?;

        if let Err(err) = with_timeout(timeout, conn.write_all(&request)).await {
            conn.close().await;
            return Err(err);
        }

        Ok(Box::new(TcpFrameStream { conn, timeout }))
    }

    async fn disconnect(&self, host: &Host) {
        if let Some(pool) = self.pools.write().await.remove(host) {
            debug!(%host, connections = pool.connections(), "dropping connection pool");
        }
    }

    async fn close(&self) {
        self.pools.write().await.clear();
    }
}

struct TcpFrameStream {
    conn: PooledConnection,
    timeout: Option<Duration>,
}

#[async_trait]
impl FrameStream for TcpFrameStream {
    async fn next_frame(&mut self) -> Result<Bytes> {
        let result = with_timeout(self.timeout, self.conn.read_frame()).await;
        if result.is_err() {
            self.conn.close().await;
        }
        result
    }

    async fn finish(mut self: Box<Self>, complete: bool) {
        if !complete {
            self.conn.close().await;
        }
    }
}

async fn with_timeout<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = Result<T>> + Send,
) -> Result<T> {
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| NetError::Timeout)?,
        None => fut.await,
    }
}
