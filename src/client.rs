use std::{collections::HashMap, fmt::Write, sync::Arc};

use crate::{
    batch::{batch_executor, BatchOperation, BatchRecord},
    cluster::{Cluster, Node},
    commands::{
        admin_command, background_udf_command, delete_command, execute_udf_command,
        exists_command, info_command, operate_command, read_command, stream_command,
        stream_command::StreamRequest, touch_command, write_command,
    },
    errors::{Error, Result},
    net::{TcpTransport, ToHosts, Transport},
    operations::{Operation, OperationType},
    policies::{
        AdminPolicy, BasePolicy, BatchPolicy, ClientPolicy, QueryPolicy, ScanPolicy, WritePolicy,
    },
    query::{CollectionIndexType, IndexType, PartitionFilter, Recordset, Statement},
    task::{ExecuteTask, IndexTask, RegisterTask},
    udf::{self, UdfLanguage, UdfMeta},
    user::{Privilege, Role, User},
    Bin, Bins, Key, Record, Value,
};

/// Instantiate a Client instance to access an Aerospike database cluster and perform database
/// operations.
///
/// The client is thread-safe. Only one client instance should be used per cluster. Multiple
/// tasks should share this client instance, for example through an [`Arc`] or a
/// [`ClientRegistry`](crate::ClientRegistry).
///
/// Your application uses this class' API to perform database operations such as writing and
/// reading records, and selecting sets of records. Write operations include specialized
/// functionality such as append/prepend and arithmetic addition.
#[derive(Clone, Debug)]
pub struct Client {
    cluster: Arc<Cluster>,
}

impl Client {
    /// Initializes Aerospike client with suitable hosts to seed the cluster map. The client policy
    /// is used to set defaults and size internal data structures. For each host connection that
    /// succeeds, the client will:
    ///
    /// - Add host to the cluster map
    /// - Request host's list of other nodes in cluster
    /// - Add these nodes to the cluster map
    ///
    /// In most cases, only one host is necessary to seed the cluster. The remaining hosts are
    /// added as future seeds in case of a complete network failure.
    ///
    /// The seed hosts to connect to (one or more) can be specified as a comma-separated list of
    /// hostnames or IP addresses with optional port numbers, e.g.
    ///
    /// ```text
    /// 10.0.0.1:3000,10.0.0.2:3000,10.0.0.3:3000
    /// ```
    ///
    /// Port 3000 is used by default if the port number is omitted for any of the hosts.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use windpike::{policies::ClientPolicy, Client};
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let client = Client::new(&ClientPolicy::default(), "localhost:3000")
    ///         .await
    ///         .unwrap();
    /// }
    /// ```
    pub async fn new(policy: &ClientPolicy, hosts: &(impl ToHosts + ?Sized)) -> Result<Self> {
        let transport = Arc::new(TcpTransport::new(policy.clone()));
        Self::with_transport(policy, hosts, transport).await
    }

    /// Same as [`Self::new`], but talks to the nodes through the given transport instead of
    /// plain TCP connections.
    pub async fn with_transport(
        policy: &ClientPolicy,
        hosts: &(impl ToHosts + ?Sized),
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let hosts = hosts.to_hosts()?;
        let cluster = Cluster::new(policy.clone(), &hosts, transport).await?;

        Ok(Self { cluster })
    }

    /// Closes the connection to the Aerospike cluster. Commands issued afterwards fail.
    pub async fn close(&self) {
        self.cluster.close().await;
    }

    /// Returns `true` if the client is connected to any cluster nodes.
    pub async fn is_connected(&self) -> bool {
        self.cluster.is_connected().await
    }

    /// Returns `true` once [`Self::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cluster.is_closed()
    }

    /// Returns a list of the active server nodes in the cluster.
    pub async fn nodes(&self) -> Vec<Arc<Node>> {
        self.cluster.nodes().await
    }

    /// Returns a list of the names of the active server nodes in the cluster.
    pub async fn node_names(&self) -> Vec<String> {
        self.cluster
            .nodes()
            .await
            .iter()
            .map(|node| node.name().to_owned())
            .collect()
    }

    /// Send raw info commands to a random node and return its answers by command name.
    pub async fn info(
        &self,
        policy: &AdminPolicy,
        commands: &[&str],
    ) -> Result<HashMap<String, String>> {
        let node = self.cluster.get_random_node().await.ok_or(Error::NoNodes)?;
        info_command::info(node.transport(), node.host(), commands, Some(policy.timeout)).await
    }

    /// Read record for the specified key. Depending on the bins value provided, all record bins,
    /// only selected record bins or only the record headers will be returned. The policy can be
    /// used to specify timeouts. Returns `None` if the record doesn't exist.
    ///
    /// # Examples
    ///
    /// Fetch specified bins for a record with the given key.
    ///
    /// ```rust,no_run
    /// use windpike::{
    ///     policies::{BasePolicy, ClientPolicy},
    ///     Client, Key,
    /// };
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let client = Client::new(&ClientPolicy::default(), "localhost:3000")
    ///         .await
    ///         .unwrap();
    ///
    ///     let key = Key::new("test", "test", "mykey");
    ///     match client.get(&BasePolicy::default(), &key, ["a", "b"]).await {
    ///         Ok(Some(record)) => println!("a={:?}", record.bins.get("a")),
    ///         Ok(None) => println!("No such record: {key}"),
    ///         Err(err) => println!("Error fetching record: {err}"),
    ///     }
    /// }
    /// ```
    pub async fn get(
        &self,
        policy: &BasePolicy,
        key: &Key,
        bins: impl Into<Bins>,
    ) -> Result<Option<Record>> {
        read_command::execute(&self.cluster, policy, key, &bins.into()).await
    }

    /// Read the generation and expiration of a record, without any bins.
    pub async fn get_header(&self, policy: &BasePolicy, key: &Key) -> Result<Option<Record>> {
        read_command::execute(&self.cluster, policy, key, &Bins::None).await
    }

    /// Write record bin(s). The policy specifies the transaction timeout, record expiration and
    /// how the transaction is handled when the record already exists.
    ///
    /// # Examples
    ///
    /// Write a record with an expiration of 10 seconds.
    ///
    /// ```rust,no_run
    /// use windpike::{
    ///     policies::{ClientPolicy, Expiration, WritePolicy},
    ///     Bin, Client, Key,
    /// };
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let client = Client::new(&ClientPolicy::default(), "localhost:3000")
    ///         .await
    ///         .unwrap();
    ///
    ///     let key = Key::new("test", "test", "mykey");
    ///     let policy = WritePolicy::default().with_expiration(Expiration::Seconds(10));
    ///     match client.put(&policy, &key, &[Bin::new("i", 42)]).await {
    ///         Ok(()) => println!("Record written"),
    ///         Err(err) => println!("Error writing record: {err}"),
    ///     }
    /// }
    /// ```
    pub async fn put(&self, policy: &WritePolicy, key: &Key, bins: &[Bin<'_>]) -> Result<()> {
        write_command::execute(&self.cluster, policy, key, bins, OperationType::Write).await
    }

    /// Add integer bin values to existing record bin values. This call only works for integer
    /// values.
    pub async fn add(&self, policy: &WritePolicy, key: &Key, bins: &[Bin<'_>]) -> Result<()> {
        write_command::execute(&self.cluster, policy, key, bins, OperationType::Incr).await
    }

    /// Append bin string values to existing record bin values. This call only works for string
    /// values.
    pub async fn append(&self, policy: &WritePolicy, key: &Key, bins: &[Bin<'_>]) -> Result<()> {
        write_command::execute(&self.cluster, policy, key, bins, OperationType::Append).await
    }

    /// Prepend bin string values to existing record bin values. This call only works for string
    /// values.
    pub async fn prepend(&self, policy: &WritePolicy, key: &Key, bins: &[Bin<'_>]) -> Result<()> {
        write_command::execute(&self.cluster, policy, key, bins, OperationType::Prepend).await
    }

    /// Delete record for specified key. The call returns `true` if the record existed on the
    /// server before deletion.
    pub async fn delete(&self, policy: &WritePolicy, key: &Key) -> Result<bool> {
        delete_command::execute(&self.cluster, policy, key).await
    }

    /// Reset record's time to expiration using the policy's expiration. Fail if the record does
    /// not exist.
    pub async fn touch(&self, policy: &WritePolicy, key: &Key) -> Result<()> {
        touch_command::execute(&self.cluster, policy, key).await
    }

    /// Determine if a record key exists.
    pub async fn exists(&self, policy: &BasePolicy, key: &Key) -> Result<bool> {
        exists_command::execute(&self.cluster, policy, key).await
    }

    /// Perform multiple read/write operations on a single key in one call.
    ///
    /// Operations on scalar values, lists and maps can be performed in the same call. They
    /// execute in the given order.
    ///
    /// # Examples
    ///
    /// Add an integer value to an existing record and then read the result, all in one database
    /// call.
    ///
    /// ```rust,no_run
    /// use windpike::{
    ///     operations::scalar,
    ///     policies::{ClientPolicy, WritePolicy},
    ///     Bin, Client, Key,
    /// };
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let client = Client::new(&ClientPolicy::default(), "localhost:3000")
    ///         .await
    ///         .unwrap();
    ///
    ///     let key = Key::new("test", "test", "mykey");
    ///     let bin = Bin::new("a", 42);
    ///     let ops = vec![scalar::add(&bin), scalar::get_bin("a")];
    ///     match client.operate(&WritePolicy::default(), &key, &ops).await {
    ///         Ok(record) => println!("The new value is {:?}", record.bins.get("a")),
    ///         Err(err) => println!("Error writing record: {err}"),
    ///     }
    /// }
    /// ```
    pub async fn operate(
        &self,
        policy: &WritePolicy,
        key: &Key,
        ops: &[Operation],
    ) -> Result<Record> {
        operate_command::execute(&self.cluster, policy, key, ops).await
    }

    /// Run reads, writes, deletes and UDF calls on many records at once. Every entry succeeds or
    /// fails on its own and the results come back in the order of the operations.
    pub async fn batch(
        &self,
        policy: &BatchPolicy,
        ops: Vec<BatchOperation>,
    ) -> Result<Vec<BatchRecord>> {
        batch_executor::execute(&self.cluster, policy, ops).await
    }

    /// Read the selected bins of many records. Missing records have no
    /// [`record`](BatchRecord::record).
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use windpike::{
    ///     policies::{BatchPolicy, ClientPolicy},
    ///     Bins, Client, Key,
    /// };
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let client = Client::new(&ClientPolicy::default(), "localhost:3000")
    ///         .await
    ///         .unwrap();
    ///
    ///     let keys = (0..10).map(|i| Key::new("test", "test", i)).collect();
    ///     match client
    ///         .batch_get(&BatchPolicy::default(), keys, Bins::from(["name", "age"]))
    ///         .await
    ///     {
    ///         Ok(results) => {
    ///             for result in results {
    ///                 match result.record {
    ///                     Some(record) => println!("{} => {:?}", result.key, record.bins),
    ///                     None => println!("No such record: {}", result.key),
    ///                 }
    ///             }
    ///         }
    ///         Err(err) => println!("Error executing batch request: {err}"),
    ///     }
    /// }
    /// ```
    pub async fn batch_get(
        &self,
        policy: &BatchPolicy,
        keys: Vec<Key>,
        bins: Bins,
    ) -> Result<Vec<BatchRecord>> {
        let ops = keys
            .into_iter()
            .map(|key| BatchOperation::read(key, bins.clone()))
            .collect();
        self.batch(policy, ops).await
    }

    /// Read all records of the partitions selected by the filter in the specified namespace and
    /// set. Records are put on a queue by background tasks, one per node, and consumed through the
    /// returned recordset.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use windpike::{
    ///     policies::{ClientPolicy, ScanPolicy},
    ///     query::PartitionFilter,
    ///     Bins, Client,
    /// };
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let client = Client::new(&ClientPolicy::default(), "localhost:3000")
    ///         .await
    ///         .unwrap();
    ///
    ///     let policy = ScanPolicy::default();
    ///     let records = client
    ///         .scan(&policy, PartitionFilter::all(), "test", "demo", Bins::All)
    ///         .unwrap();
    ///
    ///     let mut count = 0;
    ///     while let Some(record) = records.next().await {
    ///         match record {
    ///             Ok(_) => count += 1,
    ///             Err(err) => panic!("Error executing scan: {err}"),
    ///         }
    ///     }
    ///     println!("Records: {count}");
    /// }
    /// ```
    pub fn scan(
        &self,
        policy: &ScanPolicy,
        filter: PartitionFilter,
        namespace: &str,
        set_name: &str,
        bins: impl Into<Bins>,
    ) -> Result<Recordset> {
        let request = StreamRequest::Scan {
            policy: policy.clone(),
            namespace: namespace.to_owned(),
            set_name: set_name.to_owned(),
            bins: bins.into(),
        };
        stream_command::execute(Arc::clone(&self.cluster), request, filter)
    }

    /// Execute a query on the partitions selected by the filter and return a recordset over the
    /// matching records. Without a secondary index filter on the statement, the query reads all
    /// records of the set.
    pub fn query(
        &self,
        policy: &QueryPolicy,
        filter: PartitionFilter,
        statement: Statement,
    ) -> Result<Recordset> {
        let request = StreamRequest::Query {
            policy: policy.clone(),
            statement,
        };
        stream_command::execute(Arc::clone(&self.cluster), request, filter)
    }

    /// Apply a registered UDF to every record matched by the statement. The server runs the
    /// function in the background. Use the returned task to wait for it.
    pub async fn query_execute_udf(
        &self,
        policy: &WritePolicy,
        statement: &Statement,
        package: &str,
        function: &str,
        args: &[Value],
    ) -> Result<ExecuteTask> {
        background_udf_command::execute(&self.cluster, policy, statement, package, function, args)
            .await
    }

    /// Removes all records in the specified namespace/set efficiently.
    ///
    /// The `set_name` is optional; set to `""` to delete all sets in `namespace`.
    ///
    /// `before_nanos` optionally specifies a last update timestamp (lut); if it is greater than
    /// zero, only records with a lut less than `before_nanos` are deleted. Units are in
    /// nanoseconds since unix epoch (1970-01-01). Pass in zero to delete all records in the
    /// namespace/set regardless of last update time.
    pub async fn truncate(
        &self,
        policy: &AdminPolicy,
        namespace: &str,
        set_name: &str,
        before_nanos: i64,
    ) -> Result<()> {
        let mut cmd = format!("truncate:namespace={namespace}");
        if !set_name.is_empty() {
            write!(cmd, ";set={set_name}").ok();
        }
        if before_nanos > 0 {
            write!(cmd, ";lut={before_nanos}").ok();
        }

        self.send_info_cmd(policy, &cmd).await
    }

    /// Create a secondary index on a bin containing scalar values. This asynchronous server call
    /// returns before the index is built. Use the returned task to wait for it.
    ///
    /// # Examples
    ///
    /// The following example creates an index `idx_foo_bar_baz`. The index is in namespace `foo`
    /// within set `bar` and bin `baz`:
    ///
    /// ```rust,no_run
    /// use windpike::{
    ///     policies::{AdminPolicy, ClientPolicy},
    ///     query::IndexType,
    ///     task::Task,
    ///     Client,
    /// };
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let client = Client::new(&ClientPolicy::default(), "localhost:3000")
    ///         .await
    ///         .unwrap();
    ///
    ///     let policy = AdminPolicy::default();
    ///     match client
    ///         .create_index(&policy, "foo", "bar", "baz", "idx_foo_bar_baz", IndexType::Numeric)
    ///         .await
    ///     {
    ///         Ok(task) => {
    ///             task.wait_till_complete(None).await.unwrap();
    ///         }
    ///         Err(err) => println!("Failed to create index: {err}"),
    ///     }
    /// }
    /// ```
    pub async fn create_index(
        &self,
        policy: &AdminPolicy,
        namespace: &str,
        set_name: &str,
        bin_name: &str,
        index_name: &str,
        index_type: IndexType,
    ) -> Result<IndexTask> {
        self.create_complex_index(
            policy, namespace, set_name, bin_name, index_name, index_type, None,
        )
        .await
    }

    /// Create a secondary index on a bin containing scalar, list or map values.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_complex_index(
        &self,
        policy: &AdminPolicy,
        namespace: &str,
        set_name: &str,
        bin_name: &str,
        index_name: &str,
        index_type: IndexType,
        collection_index_type: Option<CollectionIndexType>,
    ) -> Result<IndexTask> {
        let cit_str = collection_index_type
            .map(|v| format!("indextype={v};"))
            .unwrap_or_default();
        let set_str = if set_name.is_empty() {
            String::new()
        } else {
            format!("set={set_name};")
        };
        let cmd = format!(
            "sindex-create:ns={namespace};{set_str}indexname={index_name};numbins=1;\
             {cit_str}indexdata={bin_name},{index_type};priority=normal",
        );

        self.send_info_cmd(policy, &cmd).await?;
        Ok(IndexTask::new(
            Arc::clone(&self.cluster),
            namespace.to_owned(),
            index_name.to_owned(),
        ))
    }

    /// Delete secondary index.
    pub async fn drop_index(
        &self,
        policy: &AdminPolicy,
        namespace: &str,
        set_name: &str,
        index_name: &str,
    ) -> Result<()> {
        let set_name = if set_name.is_empty() {
            String::new()
        } else {
            format!("set={set_name};")
        };
        let cmd = format!("sindex-delete:ns={namespace};{set_name}indexname={index_name}");
        self.send_info_cmd(policy, &cmd).await
    }

    /// Register a UDF package under the given server path. The server distributes the package to
    /// all nodes in the background. Use the returned task to wait for it.
    pub async fn register_udf(
        &self,
        policy: &AdminPolicy,
        content: &[u8],
        server_path: &str,
        language: UdfLanguage,
    ) -> Result<RegisterTask> {
        let cmd = udf::register_command(content, server_path, language);
        let response = self.random_node_info(policy, &cmd).await?;
        udf::check_register_response(&response)?;

        Ok(RegisterTask::new(
            Arc::clone(&self.cluster),
            server_path.to_owned(),
        ))
    }

    /// Remove a UDF package. Removing a package that isn't registered succeeds.
    pub async fn drop_udf(&self, policy: &AdminPolicy, server_path: &str) -> Result<()> {
        let response = self
            .random_node_info(policy, &udf::remove_command(server_path))
            .await?;
        udf::check_remove_response(&response)
    }

    /// List all registered UDF packages.
    pub async fn list_udf(&self, policy: &AdminPolicy) -> Result<Vec<UdfMeta>> {
        let response = self.random_node_info(policy, "udf-list").await?;
        udf::parse_list(&response)
    }

    /// Run a registered UDF against a single record and return the function's result.
    pub async fn execute_udf(
        &self,
        policy: &WritePolicy,
        key: &Key,
        package: &str,
        function: &str,
        args: &[Value],
    ) -> Result<Option<Value>> {
        execute_udf_command::execute(&self.cluster, policy, key, package, function, args).await
    }

    /// Create a user with the given password and roles.
    pub async fn create_user(
        &self,
        policy: &AdminPolicy,
        user: &str,
        password: &str,
        roles: &[&str],
    ) -> Result<()> {
        admin_command::create_user(&self.cluster, policy, user, password, roles).await
    }

    pub async fn drop_user(&self, policy: &AdminPolicy, user: &str) -> Result<()> {
        admin_command::drop_user(&self.cluster, policy, user).await
    }

    /// Change the password of a user. Connections that are already open stay authenticated with
    /// the old password.
    pub async fn change_password(
        &self,
        policy: &AdminPolicy,
        user: &str,
        password: &str,
    ) -> Result<()> {
        admin_command::change_password(&self.cluster, policy, user, password).await
    }

    pub async fn grant_roles(&self, policy: &AdminPolicy, user: &str, roles: &[&str]) -> Result<()> {
        admin_command::grant_roles(&self.cluster, policy, user, roles).await
    }

    pub async fn revoke_roles(
        &self,
        policy: &AdminPolicy,
        user: &str,
        roles: &[&str],
    ) -> Result<()> {
        admin_command::revoke_roles(&self.cluster, policy, user, roles).await
    }

    /// Fetch a single user, or all users if `user` is `None`.
    pub async fn query_users(&self, policy: &AdminPolicy, user: Option<&str>) -> Result<Vec<User>> {
        admin_command::query_users(&self.cluster, policy, user).await
    }

    /// Create a user defined role with its privileges, allowlist and quotas.
    pub async fn create_role(&self, policy: &AdminPolicy, role: &Role) -> Result<()> {
        admin_command::create_role(&self.cluster, policy, role).await
    }

    pub async fn drop_role(&self, policy: &AdminPolicy, role: &str) -> Result<()> {
        admin_command::drop_role(&self.cluster, policy, role).await
    }

    pub async fn grant_privileges(
        &self,
        policy: &AdminPolicy,
        role: &str,
        privileges: &[Privilege],
    ) -> Result<()> {
        admin_command::grant_privileges(&self.cluster, policy, role, privileges).await
    }

    pub async fn revoke_privileges(
        &self,
        policy: &AdminPolicy,
        role: &str,
        privileges: &[Privilege],
    ) -> Result<()> {
        admin_command::revoke_privileges(&self.cluster, policy, role, privileges).await
    }

    /// Replace the IP addresses the role's users may connect from. An empty list removes the
    /// restriction.
    pub async fn set_allowlist(
        &self,
        policy: &AdminPolicy,
        role: &str,
        allowlist: &[&str],
    ) -> Result<()> {
        admin_command::set_allowlist(&self.cluster, policy, role, allowlist).await
    }

    /// Set the maximum reads and writes per second of a role. Zero means no limit.
    pub async fn set_quotas(
        &self,
        policy: &AdminPolicy,
        role: &str,
        read_quota: u32,
        write_quota: u32,
    ) -> Result<()> {
        admin_command::set_quotas(&self.cluster, policy, role, read_quota, write_quota).await
    }

    /// Fetch a single role, or all roles if `role` is `None`.
    pub async fn query_roles(&self, policy: &AdminPolicy, role: Option<&str>) -> Result<Vec<Role>> {
        admin_command::query_roles(&self.cluster, policy, role).await
    }

    async fn random_node_info(&self, policy: &AdminPolicy, cmd: &str) -> Result<String> {
        let mut response = self.info(policy, &[cmd]).await?;
        Ok(response.remove(cmd).unwrap_or_default())
    }

    async fn send_info_cmd(&self, policy: &AdminPolicy, cmd: &str) -> Result<()> {
        let response = self.random_node_info(policy, cmd).await?;
        info_command::check_response(cmd, &response)
    }
}
