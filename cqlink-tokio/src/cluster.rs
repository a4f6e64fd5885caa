pub use crate::cluster::config_tcp::{NodeTcpConfig, NodeTcpConfigBuilder};
pub use crate::cluster::connection_manager::{startup, ConnectionManager};
pub use crate::cluster::connection_pool::{
    ConnectionPool, ConnectionPoolConfig, ConnectionPools, PooledConnection,
};
pub use crate::cluster::host_registry::HostRegistry;
pub use crate::cluster::node_address::NodeAddress;
pub use crate::cluster::row_cursor::{RowCursor, RowSource};
pub use crate::cluster::send_query::{send_query, ExecutionProfile};
pub use crate::cluster::tcp_connection_manager::TcpConnectionManager;

mod config_tcp;
mod connection_manager;
mod connection_pool;
mod host_registry;
mod node_address;
mod row_cursor;
mod send_query;
pub mod session;
mod tcp_connection_manager;
pub mod topology;
