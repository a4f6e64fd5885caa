//! **cqlink** is an async, cluster-aware client for databases speaking the native CQL protocol.
//!
//! ## Getting started
//!
//! This example configures a cluster consisting of a single node, and uses round-robin load
//! balancing.
//!
//! ```no_run
//! use cqlink_tokio::cluster::session::{SessionBuilder, TcpSessionBuilder};
//! use cqlink_tokio::cluster::NodeTcpConfigBuilder;
//! use cqlink_tokio::load_balancing::RoundRobinLoadBalancingStrategy;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cluster_config = NodeTcpConfigBuilder::new()
//!         .with_contact_point("127.0.0.1:9042".into())
//!         .build()
//!         .await
//!         .unwrap();
//!     let session = TcpSessionBuilder::new(RoundRobinLoadBalancingStrategy::new(), cluster_config)
//!         .build()
//!         .unwrap();
//!
//!     let mut rows = session
//!         .query("SELECT release_version FROM system.local")
//!         .await
//!         .expect("Query error");
//!
//!     while rows.advance().unwrap() {
//!         println!("{:?}", rows.get_string(0).unwrap());
//!     }
//! }
//! ```
//!
//! ## Failure handling
//!
//! Every query is executed against a [query plan](crate::load_balancing::QueryPlan) produced by
//! the configured [load balancer](crate::load_balancing). Hosts which cannot be reached are marked
//! down and probed again according to the [reconnection policy](crate::retry::ReconnectionPolicy),
//! while timeouts and unavailability reported by the cluster are handed to the
//! [retry policy](crate::retry::RetryPolicy).

pub mod cluster;
pub mod frame_parser;
pub mod load_balancing;

pub mod future;
pub mod retry;
pub mod statement;
pub mod transport;

pub use cqlink_protocol::consistency;
pub use cqlink_protocol::error;
pub use cqlink_protocol::frame;
pub use cqlink_protocol::types;

pub type Error = error::Error;
pub type Result<T> = error::Result<T>;
