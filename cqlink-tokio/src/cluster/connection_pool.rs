use fxhash::FxHashMap;
use futures::future::select_all;
use futures::FutureExt;
use std::fmt::{Debug, Formatter};
use std::io;
use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::*;

use crate::cluster::topology::{Node, NodeState, ProbeGuard};
use crate::cluster::ConnectionManager;
use crate::error::{Error, Result};
use crate::frame::MAX_STREAM_ID;
use crate::transport::CqlTransport;

const DEFAULT_CORE_SIZE: usize = 1;
const DEFAULT_MAX_SIZE: usize = 8;
const DEFAULT_MAX_REQUESTS_PER_CONNECTION: usize = 1024;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

async fn new_connection<T: CqlTransport, CM: ConnectionManager<T>>(
    connection_manager: &CM,
    addr: SocketAddr,
    timeout: Option<Duration>,
) -> Result<T> {
    if let Some(timeout) = timeout {
        // a node which cannot be reached in time is as good as unreachable
        tokio::time::timeout(timeout, connection_manager.connection(addr))
            .await
            .map_err(|_| {
                Error::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("Timeout waiting for connection to: {addr}"),
                ))
            })
            .and_then(|result| result)
    } else {
        connection_manager.connection(addr).await
    }
}

/// Configuration for node connection pools. Every pool keeps at least `core_size` connections
/// open once used, and opens more, up to `max_size`, when all connections carry
/// `max_requests_per_connection` requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionPoolConfig {
    core_size: usize,
    max_size: usize,
    max_requests_per_connection: usize,
    connect_timeout: Option<Duration>,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        ConnectionPoolConfig {
            core_size: DEFAULT_CORE_SIZE,
            max_size: DEFAULT_MAX_SIZE,
            max_requests_per_connection: DEFAULT_MAX_REQUESTS_PER_CONNECTION,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
        }
    }
}

impl ConnectionPoolConfig {
    /// Creates a new configuration, with optional connect timeout.
    pub fn new(
        core_size: usize,
        max_size: usize,
        max_requests_per_connection: usize,
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        if core_size == 0 || max_size < core_size {
            return Err(Error::InvalidConfiguration(format!(
                "Invalid pool size: core {core_size}, max {max_size}"
            )));
        }

        if max_requests_per_connection == 0 || max_requests_per_connection > MAX_STREAM_ID as usize
        {
            return Err(Error::InvalidConfiguration(format!(
                "Max requests per connection must be between 1 and {MAX_STREAM_ID}"
            )));
        }

        Ok(ConnectionPoolConfig {
            core_size,
            max_size,
            max_requests_per_connection,
            connect_timeout,
        })
    }

    #[inline]
    pub fn core_size(&self) -> usize {
        self.core_size
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    #[inline]
    pub fn max_requests_per_connection(&self) -> usize {
        self.max_requests_per_connection
    }

    #[inline]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }
}

struct PoolEntry<T> {
    transport: Arc<T>,
    // in-flight request slots
    permits: Arc<Semaphore>,
}

/// A connection borrowed from a pool, occupying one of its request slots until dropped.
pub struct PooledConnection<T> {
    transport: Arc<T>,
    _permit: OwnedSemaphorePermit,
}

impl<T> Deref for PooledConnection<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.transport
    }
}

/// Connections to a single node. Connections are opened on demand; a node which is down is only
/// contacted when its reconnection probe is due.
pub struct ConnectionPool<T: CqlTransport, CM: ConnectionManager<T>> {
    node: Arc<Node>,
    connection_manager: Arc<CM>,
    config: ConnectionPoolConfig,
    connections: RwLock<Vec<Arc<PoolEntry<T>>>>,
    current_index: AtomicUsize,
    // serializes opening connections, so the pool never grows past its max size
    open_lock: Mutex<()>,
}

impl<T: CqlTransport, CM: ConnectionManager<T>> Debug for ConnectionPool<T, CM> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("node", &self.node)
            .field("config", &self.config)
            .finish()
    }
}

impl<T: CqlTransport, CM: ConnectionManager<T>> ConnectionPool<T, CM> {
    pub fn new(node: Arc<Node>, connection_manager: Arc<CM>, config: ConnectionPoolConfig) -> Self {
        ConnectionPool {
            node,
            connection_manager,
            config,
            connections: RwLock::new(vec![]),
            current_index: AtomicUsize::new(0),
            open_lock: Mutex::new(()),
        }
    }

    #[inline]
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Number of open, usable connections.
    pub async fn size(&self) -> usize {
        self.connections
            .read()
            .await
            .iter()
            .filter(|entry| !entry.transport.is_broken())
            .count()
    }

    /// Returns a connection with a free request slot. Fails immediately with
    /// [`Error::HostDown`] if the node is down and no reconnection probe is due.
    pub async fn acquire(&self) -> Result<PooledConnection<T>> {
        match self.node.state() {
            NodeState::Up => self.acquire_up().await,
            NodeState::Down => match self.node.try_begin_probe() {
                Some(probe) => self.probe(probe).await,
                None => Err(Error::HostDown(self.node.address())),
            },
            NodeState::Ignored => Err(Error::HostDown(self.node.address())),
        }
    }

    async fn probe(&self, probe: ProbeGuard) -> Result<PooledConnection<T>> {
        let address = self.node.address();
        debug!(%address, "Probing node");

        let _open_guard = self.open_lock.lock().await;
        self.prune_broken().await;

        match self.open_connection().await {
            Ok(connection) => {
                info!(%address, "Node reconnected");
                probe.succeed();
                Ok(connection)
            }
            Err(error) => {
                debug!(%address, %error, "Reconnection probe failed");
                probe.fail();
                Err(error)
            }
        }
    }

    async fn acquire_up(&self) -> Result<PooledConnection<T>> {
        {
            let connections = self.connections.read().await;
            if Self::live_count(&connections) >= self.config.core_size {
                if let Some(connection) = self.try_acquire(&connections) {
                    return Ok(connection);
                }
            }
        }

        loop {
            let open_guard = self.open_lock.lock().await;
            self.prune_broken().await;

            let connections = self.connections.read().await;
            let live = Self::live_count(&connections);

            if live >= self.config.core_size {
                if let Some(connection) = self.try_acquire(&connections) {
                    return Ok(connection);
                }
            }

            if live < self.config.max_size {
                drop(connections);
                return self.open_connection().await;
            }

            // every connection is saturated and no more can be opened, take the first freed slot
            let waiting = connections
                .iter()
                .filter(|entry| !entry.transport.is_broken())
                .map(|entry| {
                    let entry = entry.clone();
                    async move {
                        let permit = entry.permits.clone().acquire_owned().await;
                        (entry, permit)
                    }
                    .boxed()
                })
                .collect::<Vec<_>>();

            drop(connections);
            drop(open_guard);

            if waiting.is_empty() {
                continue;
            }

            trace!(address = %self.node.address(), "Waiting for a free request slot");

            let ((entry, permit), _, _) = select_all(waiting).await;
            let permit =
                permit.map_err(|_| Error::ConnectionClosed("Connection pool closed".into()))?;

            if !entry.transport.is_broken() {
                return Ok(PooledConnection {
                    transport: entry.transport.clone(),
                    _permit: permit,
                });
            }
        }
    }

    #[inline]
    fn live_count(connections: &[Arc<PoolEntry<T>>]) -> usize {
        connections
            .iter()
            .filter(|entry| !entry.transport.is_broken())
            .count()
    }

    fn try_acquire(&self, connections: &[Arc<PoolEntry<T>>]) -> Option<PooledConnection<T>> {
        let len = connections.len();
        if len == 0 {
            return None;
        }

        let start = self.current_index.fetch_add(1, Ordering::Relaxed);
        (0..len)
            .map(|offset| &connections[(start + offset) % len])
            .filter(|entry| !entry.transport.is_broken())
            .find_map(|entry| {
                entry
                    .permits
                    .clone()
                    .try_acquire_owned()
                    .ok()
                    .map(|permit| PooledConnection {
                        transport: entry.transport.clone(),
                        _permit: permit,
                    })
            })
    }

    async fn prune_broken(&self) {
        let mut connections = self.connections.write().await;
        let before = connections.len();
        connections.retain(|entry| !entry.transport.is_broken());

        if connections.len() != before {
            debug!(
                address = %self.node.address(),
                removed = before - connections.len(),
                "Removed broken connections"
            );
        }
    }

    // must be called with open_lock held
    async fn open_connection(&self) -> Result<PooledConnection<T>> {
        let address = self.node.address();
        let transport = Arc::new(
            new_connection(
                self.connection_manager.as_ref(),
                address,
                self.config.connect_timeout,
            )
            .await?,
        );

        let permits = Arc::new(Semaphore::new(self.config.max_requests_per_connection));
        let permit = permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| Error::General("Fresh connection without request slots".into()))?;

        let mut connections = self.connections.write().await;
        connections.push(Arc::new(PoolEntry {
            transport: transport.clone(),
            permits,
        }));

        debug!(%address, size = connections.len(), "Opened new connection");

        Ok(PooledConnection {
            transport,
            _permit: permit,
        })
    }
}

/// Connection pools of every node, created lazily on first use.
pub struct ConnectionPools<T: CqlTransport, CM: ConnectionManager<T>> {
    connection_manager: Arc<CM>,
    config: ConnectionPoolConfig,
    pools: std::sync::RwLock<FxHashMap<SocketAddr, Arc<ConnectionPool<T, CM>>>>,
}

impl<T: CqlTransport, CM: ConnectionManager<T>> ConnectionPools<T, CM> {
    pub fn new(connection_manager: Arc<CM>, config: ConnectionPoolConfig) -> Self {
        ConnectionPools {
            connection_manager,
            config,
            pools: Default::default(),
        }
    }

    #[inline]
    pub fn config(&self) -> &ConnectionPoolConfig {
        &self.config
    }

    /// Returns the pool of given node. A node which was removed and added again gets a new pool.
    pub fn pool(&self, node: &Arc<Node>) -> Arc<ConnectionPool<T, CM>> {
        if let Some(pool) = self
            .pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&node.address())
        {
            if Arc::ptr_eq(pool.node(), node) {
                return pool.clone();
            }
        }

        let mut pools = self.pools.write().unwrap_or_else(PoisonError::into_inner);
        match pools.get(&node.address()) {
            Some(pool) if Arc::ptr_eq(pool.node(), node) => pool.clone(),
            _ => {
                let pool = Arc::new(ConnectionPool::new(
                    node.clone(),
                    self.connection_manager.clone(),
                    self.config,
                ));

                pools.insert(node.address(), pool.clone());
                pool
            }
        }
    }

    /// Drops the pool of given node. Connections are closed once in-flight requests finish.
    pub fn remove(&self, address: SocketAddr) -> Option<Arc<ConnectionPool<T, CM>>> {
        self.pools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::future::BoxFuture;
    use crate::retry::ConstantReconnectionPolicy;
    use std::sync::atomic::AtomicBool;

    struct FakeTransport {
        addr: SocketAddr,
        broken: AtomicBool,
    }

    impl CqlTransport for FakeTransport {
        fn write_frame<'a>(&'a self, _frame: &'a Frame) -> BoxFuture<'a, Result<Frame>> {
            async { Err(Error::General("not supported".into())) }.boxed()
        }

        fn is_broken(&self) -> bool {
            self.broken.load(Ordering::Relaxed)
        }

        fn address(&self) -> SocketAddr {
            self.addr
        }
    }

    #[derive(Default)]
    struct FakeConnectionManager {
        opened: AtomicUsize,
        refuse: AtomicBool,
        delay: Option<Duration>,
    }

    impl ConnectionManager<FakeTransport> for FakeConnectionManager {
        fn connection(&self, addr: SocketAddr) -> BoxFuture<'_, Result<FakeTransport>> {
            async move {
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }

                if self.refuse.load(Ordering::Relaxed) {
                    return Err(Error::Io(io::ErrorKind::ConnectionRefused.into()));
                }

                self.opened.fetch_add(1, Ordering::Relaxed);
                Ok(FakeTransport {
                    addr,
                    broken: AtomicBool::new(false),
                })
            }
            .boxed()
        }
    }

    fn pool(
        manager: FakeConnectionManager,
        config: ConnectionPoolConfig,
    ) -> ConnectionPool<FakeTransport, FakeConnectionManager> {
        ConnectionPool::new(
            Arc::new(Node::new("127.0.0.1:9042".parse().unwrap())),
            Arc::new(manager),
            config,
        )
    }

    #[test]
    fn should_validate_config() {
        assert!(ConnectionPoolConfig::new(0, 1, 1, None).is_err());
        assert!(ConnectionPoolConfig::new(2, 1, 1, None).is_err());
        assert!(ConnectionPoolConfig::new(1, 1, 0, None).is_err());
        assert!(ConnectionPoolConfig::new(1, 1, 40_000, None).is_err());
        assert!(ConnectionPoolConfig::new(1, 1, 1, None).is_ok());
    }

    #[tokio::test]
    async fn should_grow_only_when_saturated() {
        let pool = pool(
            Default::default(),
            ConnectionPoolConfig::new(1, 2, 2, None).unwrap(),
        );

        let first = pool.acquire().await.unwrap();
        let second = pool.acquire().await.unwrap();
        assert_eq!(pool.connection_manager.opened.load(Ordering::Relaxed), 1);

        let third = pool.acquire().await.unwrap();
        let fourth = pool.acquire().await.unwrap();
        assert_eq!(pool.connection_manager.opened.load(Ordering::Relaxed), 2);
        assert_eq!(pool.size().await, 2);

        // no free slots and no room for more connections
        let waiting = tokio::time::timeout(Duration::from_millis(10), pool.acquire()).await;
        assert!(waiting.is_err());

        drop(first);
        drop(third);
        let fifth = tokio::time::timeout(Duration::from_secs(1), pool.acquire())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(pool.connection_manager.opened.load(Ordering::Relaxed), 2);
        drop((second, fourth, fifth));
    }

    #[tokio::test]
    async fn should_take_whichever_connection_frees_first() {
        let pool = pool(
            Default::default(),
            ConnectionPoolConfig::new(1, 2, 1, None).unwrap(),
        );

        let mut held = vec![pool.acquire().await.unwrap(), pool.acquire().await.unwrap()];
        assert_eq!(pool.size().await, 2);

        // releasing the oldest borrow alternates between both connections
        for _ in 0..4 {
            let (acquired, _) = tokio::join!(
                tokio::time::timeout(Duration::from_secs(1), pool.acquire()),
                async {
                    tokio::task::yield_now().await;
                    drop(held.remove(0));
                }
            );

            held.push(acquired.unwrap().unwrap());
        }

        assert_eq!(pool.connection_manager.opened.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn should_replace_broken_connections() {
        let pool = pool(
            Default::default(),
            ConnectionPoolConfig::new(1, 1, 4, None).unwrap(),
        );

        let connection = pool.acquire().await.unwrap();
        connection.broken.store(true, Ordering::Relaxed);
        drop(connection);

        let connection = pool.acquire().await.unwrap();
        assert!(!connection.is_broken());
        assert_eq!(pool.connection_manager.opened.load(Ordering::Relaxed), 2);
        assert_eq!(pool.size().await, 1);
    }

    #[tokio::test]
    async fn should_report_connect_failure() {
        let manager = FakeConnectionManager::default();
        manager.refuse.store(true, Ordering::Relaxed);
        let pool = pool(manager, Default::default());

        let error = pool.acquire().await.err().unwrap();
        assert!(error.is_connectivity());
        assert_eq!(pool.node().state(), NodeState::Up);
    }

    #[tokio::test(start_paused = true)]
    async fn should_time_out_connecting() {
        let manager = FakeConnectionManager {
            delay: Some(Duration::from_secs(10)),
            ..Default::default()
        };
        let pool = pool(
            manager,
            ConnectionPoolConfig::new(1, 1, 1, Some(Duration::from_secs(1))).unwrap(),
        );

        match pool.acquire().await {
            Err(Error::Io(error)) => assert_eq!(error.kind(), io::ErrorKind::TimedOut),
            result => panic!("Unexpected result: {:?}", result.err()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn should_fail_fast_for_down_node() {
        let pool = pool(Default::default(), Default::default());
        pool.node()
            .mark_down(&ConstantReconnectionPolicy::new(Duration::from_secs(10)));

        assert!(matches!(pool.acquire().await, Err(Error::HostDown(_))));
        assert_eq!(pool.connection_manager.opened.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_probe_due_node() {
        let manager = FakeConnectionManager::default();
        manager.refuse.store(true, Ordering::Relaxed);
        let pool = pool(manager, Default::default());
        pool.node()
            .mark_down(&ConstantReconnectionPolicy::new(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(pool.acquire().await.err().unwrap().is_connectivity());
        assert_eq!(pool.node().state(), NodeState::Down);

        // rescheduled, so no new attempt yet
        assert!(matches!(pool.acquire().await, Err(Error::HostDown(_))));

        pool.connection_manager
            .refuse
            .store(false, Ordering::Relaxed);
        tokio::time::advance(Duration::from_secs(10)).await;

        assert!(pool.acquire().await.is_ok());
        assert_eq!(pool.node().state(), NodeState::Up);
    }

    #[tokio::test]
    async fn should_never_contact_ignored_node() {
        let pool = pool(Default::default(), Default::default());
        pool.node().ignore();

        assert!(matches!(pool.acquire().await, Err(Error::HostDown(_))));
        assert_eq!(pool.connection_manager.opened.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn should_share_pool_per_node() {
        let pools: ConnectionPools<FakeTransport, FakeConnectionManager> =
            ConnectionPools::new(Arc::new(Default::default()), Default::default());
        let node = Arc::new(Node::new("127.0.0.1:9042".parse().unwrap()));

        let pool = pools.pool(&node);
        assert!(Arc::ptr_eq(&pool, &pools.pool(&node)));

        // same address, different node instance
        let readded = Arc::new(Node::new(node.address()));
        assert!(!Arc::ptr_eq(&pool, &pools.pool(&readded)));

        assert!(pools.remove(node.address()).is_some());
        assert!(pools.remove(node.address()).is_none());
    }
}

