use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::*;

use crate::cluster::connection_pool::{ConnectionPoolConfig, ConnectionPools};
use crate::cluster::row_cursor::RowCursor;
use crate::cluster::send_query::{send_query, ExecutionProfile};
use crate::cluster::topology::Node;
use crate::cluster::{ConnectionManager, HostRegistry, NodeTcpConfig, TcpConnectionManager};
use crate::consistency::Consistency;
use crate::error::{Error, Result};
use crate::frame::Version;
use crate::load_balancing::{LoadBalancingStrategy, Request};
use crate::retry::{
    DefaultRetryPolicy, ExponentialReconnectionPolicy, ReconnectionPolicy, RetryPolicy,
};
use crate::statement::StatementParams;
use crate::transport::{CqlTransport, TransportTcp};

pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(12);

/// Entry point for executing queries. Holds the cluster state, one connection pool per node and
/// the policies, which stay unchanged for the lifetime of the session.
pub struct Session<
    T: CqlTransport + 'static,
    CM: ConnectionManager<T> + 'static,
    LB: LoadBalancingStrategy + Send + Sync,
> {
    load_balancing: LB,
    cluster: Arc<HostRegistry>,
    pools: ConnectionPools<T, CM>,
    retry_policy: Arc<dyn RetryPolicy + Send + Sync>,
    version: Version,
    request_timeout: Option<Duration>,
    max_retries: usize,
    default_consistency: Consistency,
}

impl<
        T: CqlTransport + 'static,
        CM: ConnectionManager<T> + 'static,
        LB: LoadBalancingStrategy + Send + Sync,
    > std::fmt::Debug for Session<T, CM, LB>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("cluster", &self.cluster)
            .field("version", &self.version)
            .field("request_timeout", &self.request_timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl<
        T: CqlTransport + 'static,
        CM: ConnectionManager<T> + 'static,
        LB: LoadBalancingStrategy + Send + Sync,
    > Session<T, CM, LB>
{
    /// Executes a query with the session default consistency.
    pub async fn query<Q: ToString>(&self, query: Q) -> Result<RowCursor> {
        let mut parameters = StatementParams::default();
        parameters.query_params.consistency = self.default_consistency;

        self.query_with_params(query, parameters).await
    }

    /// Executes a query with custom parameters.
    pub async fn query_with_params<Q: ToString>(
        &self,
        query: Q,
        parameters: StatementParams,
    ) -> Result<RowCursor> {
        let query = query.to_string();
        let query_plan = self.load_balancing.query_plan(
            Some(Request::new(
                &query,
                Some(parameters.query_params.consistency),
                parameters.is_idempotent,
            )),
            &self.cluster,
        );

        let profile = ExecutionProfile {
            retry_policy: parameters
                .retry_policy
                .as_deref()
                .unwrap_or(self.retry_policy.as_ref()),
            max_retries: self.max_retries,
            request_timeout: self.request_timeout,
            version: self.version,
        };

        let execution = send_query(
            query_plan,
            &self.cluster,
            &self.pools,
            &query,
            &parameters.query_params,
            parameters.is_idempotent,
            profile,
        );

        match parameters.timeout {
            // dropping the execution abandons any in-flight request
            Some(timeout) => tokio::time::timeout(timeout, execution)
                .await
                .unwrap_or_else(|_| {
                    Err(Error::Timeout(format!(
                        "Query did not complete within {timeout:?}"
                    )))
                }),
            None => execution.await,
        }
    }

    /// Known nodes and their state.
    #[inline]
    pub fn cluster(&self) -> &HostRegistry {
        &self.cluster
    }

    #[inline]
    pub fn load_balancing(&self) -> &LB {
        &self.load_balancing
    }

    #[inline]
    pub fn retry_policy(&self) -> &(dyn RetryPolicy + Send + Sync) {
        self.retry_policy.as_ref()
    }

    /// Starts using a new node.
    pub fn add_node(&self, address: SocketAddr) -> Arc<Node> {
        self.cluster.add(address)
    }

    /// Stops using a node and drops its connections once in-flight requests complete.
    pub fn remove_node(&self, address: SocketAddr) -> Option<Arc<Node>> {
        let node = self.cluster.remove(address)?;
        self.pools.remove(address);
        Some(node)
    }
}

/// Common [`Session`] configuration.
pub trait SessionBuilder<
    T: CqlTransport + 'static,
    CM: ConnectionManager<T> + 'static,
    LB: LoadBalancingStrategy + Send + Sync,
>
{
    /// Sets new retry policy.
    #[must_use]
    fn with_retry_policy(self, retry_policy: Arc<dyn RetryPolicy + Send + Sync>) -> Self;

    /// Sets new reconnection policy.
    #[must_use]
    fn with_reconnection_policy(
        self,
        reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
    ) -> Self;

    /// Sets new connection pool configuration.
    #[must_use]
    fn with_connection_pool_config(self, config: ConnectionPoolConfig) -> Self;

    /// Sets the time allowed for a single attempt of a query. `None` waits indefinitely.
    #[must_use]
    fn with_request_timeout(self, request_timeout: Option<Duration>) -> Self;

    /// Sets the upper bound of retries of a single execution.
    #[must_use]
    fn with_max_retries(self, max_retries: usize) -> Self;

    /// Sets the consistency used by [`Session::query`].
    #[must_use]
    fn with_default_consistency(self, consistency: Consistency) -> Self;

    /// Builds the resulting session.
    fn build(self) -> Result<Session<T, CM, LB>>;
}

/// Builder for sessions using custom transport and connection manager.
pub struct GenericSessionBuilder<
    T: CqlTransport + 'static,
    CM: ConnectionManager<T> + 'static,
    LB: LoadBalancingStrategy + Send + Sync,
> {
    load_balancing: LB,
    connection_manager: CM,
    contact_points: Vec<SocketAddr>,
    version: Version,
    retry_policy: Arc<dyn RetryPolicy + Send + Sync>,
    reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
    connection_pool_config: ConnectionPoolConfig,
    request_timeout: Option<Duration>,
    max_retries: usize,
    default_consistency: Consistency,
    _transport: std::marker::PhantomData<T>,
}

impl<
        T: CqlTransport + 'static,
        CM: ConnectionManager<T> + 'static,
        LB: LoadBalancingStrategy + Send + Sync,
    > GenericSessionBuilder<T, CM, LB>
{
    pub fn new(load_balancing: LB, connection_manager: CM, contact_points: Vec<SocketAddr>) -> Self {
        GenericSessionBuilder {
            load_balancing,
            connection_manager,
            contact_points,
            version: Version::V4,
            retry_policy: Arc::new(DefaultRetryPolicy),
            reconnection_policy: Arc::new(ExponentialReconnectionPolicy::default()),
            connection_pool_config: Default::default(),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            max_retries: DEFAULT_MAX_RETRIES,
            default_consistency: Consistency::One,
            _transport: Default::default(),
        }
    }

    /// Sets the protocol version used for queries.
    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }
}

impl<
        T: CqlTransport + 'static,
        CM: ConnectionManager<T> + 'static,
        LB: LoadBalancingStrategy + Send + Sync,
    > SessionBuilder<T, CM, LB> for GenericSessionBuilder<T, CM, LB>
{
    fn with_retry_policy(mut self, retry_policy: Arc<dyn RetryPolicy + Send + Sync>) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    fn with_reconnection_policy(
        mut self,
        reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
    ) -> Self {
        self.reconnection_policy = reconnection_policy;
        self
    }

    fn with_connection_pool_config(mut self, config: ConnectionPoolConfig) -> Self {
        self.connection_pool_config = config;
        self
    }

    fn with_request_timeout(mut self, request_timeout: Option<Duration>) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn with_default_consistency(mut self, consistency: Consistency) -> Self {
        self.default_consistency = consistency;
        self
    }

    fn build(self) -> Result<Session<T, CM, LB>> {
        if self.contact_points.is_empty() {
            return Err(Error::InvalidConfiguration(
                "At least one contact point is required".into(),
            ));
        }

        let cluster = Arc::new(HostRegistry::new(
            self.contact_points,
            self.reconnection_policy,
        ));

        info!(nodes = cluster.len(), version = ?self.version, "Session created");

        Ok(Session {
            load_balancing: self.load_balancing,
            cluster,
            pools: ConnectionPools::new(
                Arc::new(self.connection_manager),
                self.connection_pool_config,
            ),
            retry_policy: self.retry_policy,
            version: self.version,
            request_timeout: self.request_timeout,
            max_retries: self.max_retries,
            default_consistency: self.default_consistency,
        })
    }
}

/// Builder for plain TCP sessions.
pub struct TcpSessionBuilder<LB: LoadBalancingStrategy + Send + Sync> {
    inner: GenericSessionBuilder<TransportTcp, TcpConnectionManager, LB>,
}

impl<LB: LoadBalancingStrategy + Send + Sync> TcpSessionBuilder<LB> {
    /// Creates a new builder with default session configuration.
    pub fn new(load_balancing: LB, node_config: NodeTcpConfig) -> Self {
        let contact_points = node_config.contact_points.clone();
        let version = node_config.version;

        TcpSessionBuilder {
            inner: GenericSessionBuilder::new(
                load_balancing,
                TcpConnectionManager::new(node_config),
                contact_points,
            )
            .with_version(version),
        }
    }
}

impl<LB: LoadBalancingStrategy + Send + Sync> SessionBuilder<TransportTcp, TcpConnectionManager, LB>
    for TcpSessionBuilder<LB>
{
    fn with_retry_policy(self, retry_policy: Arc<dyn RetryPolicy + Send + Sync>) -> Self {
        TcpSessionBuilder {
            inner: self.inner.with_retry_policy(retry_policy),
        }
    }

    fn with_reconnection_policy(
        self,
        reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
    ) -> Self {
        TcpSessionBuilder {
            inner: self.inner.with_reconnection_policy(reconnection_policy),
        }
    }

    fn with_connection_pool_config(self, config: ConnectionPoolConfig) -> Self {
        TcpSessionBuilder {
            inner: self.inner.with_connection_pool_config(config),
        }
    }

    fn with_request_timeout(self, request_timeout: Option<Duration>) -> Self {
        TcpSessionBuilder {
            inner: self.inner.with_request_timeout(request_timeout),
        }
    }

    fn with_max_retries(self, max_retries: usize) -> Self {
        TcpSessionBuilder {
            inner: self.inner.with_max_retries(max_retries),
        }
    }

    fn with_default_consistency(self, consistency: Consistency) -> Self {
        TcpSessionBuilder {
            inner: self.inner.with_default_consistency(consistency),
        }
    }

    fn build(self) -> Result<Session<TransportTcp, TcpConnectionManager, LB>> {
        self.inner.build()
    }
}
