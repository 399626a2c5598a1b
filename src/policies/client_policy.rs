use std::{collections::HashMap, time::Duration};

use crate::{commands::admin_command::hash_password, errors::Result};

/// `ClientPolicy` encapsulates parameters for client policy command.
#[derive(Clone, Debug)]
pub struct ClientPolicy {
    /// User authentication to cluster, as user name and bcrypt hashed password. Use
    /// [`Self::set_user_password`] to fill it. Leave empty for clusters running without
    /// restricted access.
    pub user_password: Option<(String, String)>,

    /// Timeout when opening a connection to a server node, which includes the authentication.
    pub timeout: Duration,

    /// Connection idle timeout. Every time a connection is used, its idle
    /// deadline will be extended by this duration. When this deadline is reached,
    /// the connection will be closed and discarded from the connection pool.
    pub idle_timeout: Option<Duration>,

    /// Maximum number of connections allowed per server node.
    pub max_conns_per_node: u32,

    /// Fail right away with [`NetError::NoMoreConnections`](crate::errors::NetError) when all
    /// connections of a node are in use. When false, a command waits for a connection to become
    /// available, bounded by the command's total timeout.
    pub exit_fast_on_exhausted_connection_pool: bool,

    /// Fail creating the client if no seed host could be reached.
    pub fail_if_not_connected: bool,

    /// Interval for checking for cluster state changes. Minimum possible interval is 10
    /// milliseconds.
    pub tend_interval: Duration,

    /// A IP translation table is used in cases where different clients
    /// use different server IP addresses.  This may be necessary when
    /// using clients from both inside and outside a local area
    /// network. Default is no translation.
    /// The key is the IP address returned from friend info requests to other servers.
    /// The value is the real IP address used to connect to the server.
    pub ip_map: Option<HashMap<String, String>>,

    /// Use "services-alternate" instead of "services" in info requests during cluster tending.
    /// "services-alternate" returns server configured external IP addresses that client uses to
    /// talk to nodes, and can be used in place of providing an `ip_map`.
    pub use_services_alternate: bool,

    /// Expected cluster name. It not `None`, server nodes must return this cluster name in order
    /// to join the client's view of the cluster.
    pub cluster_name: Option<String>,
}

impl Default for ClientPolicy {
    fn default() -> Self {
        Self {
            user_password: None,
            timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(55)),
            max_conns_per_node: 256,
            exit_fast_on_exhausted_connection_pool: false,
            fail_if_not_connected: true,
            tend_interval: Duration::from_secs(1),
            ip_map: None,
            use_services_alternate: false,
            cluster_name: None,
        }
    }
}

impl ClientPolicy {
    /// Set username and password to use when authenticating to the cluster. Only the hash of the
    /// password is kept.
    pub fn set_user_password(&mut self, username: impl Into<String>, password: &str) -> Result<()> {
        let password = hash_password(password)?;
        self.user_password = Some((username.into(), password));
        Ok(())
    }

    pub(crate) fn tend_interval(&self) -> Duration {
        self.tend_interval.max(Duration::from_millis(10))
    }
}
