use std::{
    ops::{Deref, DerefMut},
    time::Duration,
};

use async_trait::async_trait;
use bb8::{ManageConnection, RunError};

use super::{Connection, Host, NetError, Result};
use crate::policies::ClientPolicy;

#[derive(Debug)]
struct NodeConnectionManager {
    host: Host,
    policy: ClientPolicy,
}

#[async_trait]
impl ManageConnection for NodeConnectionManager {
    type Connection = Connection;
    type Error = NetError;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        Connection::connect(&self.host, &self.policy).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        if conn.is_usable() {
            Ok(())
        } else {
            Err(NetError::Closed)
        }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        !conn.is_usable()
    }
}

/// Connections of a single host. Connections are opened lazily, on first demand.
#[derive(Debug)]
pub(super) struct Pool {
    inner: bb8::Pool<NodeConnectionManager>,
    max_size: u32,
    exit_fast: bool,
}

impl Pool {
    pub(super) fn new(host: Host, policy: ClientPolicy) -> Self {
        let max_size = policy.max_conns_per_node.max(1);
        let exit_fast = policy.exit_fast_on_exhausted_connection_pool;

        let inner = bb8::Builder::new()
            .max_size(max_size)
            .min_idle(None)
            .idle_timeout(policy.idle_timeout)
            .connection_timeout(policy.timeout)
            .retry_connection(false)
            .build_unchecked(NodeConnectionManager { host, policy });

        Self {
            inner,
            max_size,
            exit_fast,
        }
    }

    /// Check out a connection. Waits at most `timeout` for one to become available, unless the
    /// pool is configured to fail right away once all connections are in use.
    pub(super) async fn get(&self, timeout: Option<Duration>) -> Result<PooledConnection> {
        if self.exit_fast {
            let state = self.inner.state();
            if state.idle_connections == 0 && state.connections >= self.max_size {
                return Err(NetError::NoMoreConnections);
            }
        }

        let checkout = self.inner.get_owned();
        let conn = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, checkout)
                .await
                .map_err(|_| NetError::NoMoreConnections)?,
            None => checkout.await,
        };

        conn.map(PooledConnection).map_err(|e| match e {
            RunError::User(e) => e,
            RunError::TimedOut => NetError::NoMoreConnections,
        })
    }

    pub(super) fn connections(&self) -> u32 {
        self.inner.state().connections
    }
}

pub(super) struct PooledConnection(bb8::PooledConnection<'static, NodeConnectionManager>);

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.0
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.0
    }
}
