use itertools::Itertools;
use std::net::SocketAddr;
use tokio::net::lookup_host;

use crate::cluster::NodeAddress;
use crate::error::{Error, Result};
use crate::frame::Version;

const DEFAULT_TRANSPORT_BUFFER_SIZE: usize = 1024;

/// TCP configuration of all contact points of a cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeTcpConfig {
    pub contact_points: Vec<SocketAddr>,
    pub version: Version,
    pub tcp_nodelay: bool,
    /// Number of requests which can be queued for writing on a single connection.
    pub buffer_size: usize,
}

/// Builder structure that helps to configure TCP connections to nodes.
#[derive(Clone, Debug)]
pub struct NodeTcpConfigBuilder {
    addrs: Vec<NodeAddress>,
    version: Version,
    tcp_nodelay: bool,
    buffer_size: usize,
}

impl Default for NodeTcpConfigBuilder {
    fn default() -> Self {
        NodeTcpConfigBuilder {
            addrs: vec![],
            version: Version::V4,
            tcp_nodelay: true,
            buffer_size: DEFAULT_TRANSPORT_BUFFER_SIZE,
        }
    }
}

impl NodeTcpConfigBuilder {
    pub fn new() -> NodeTcpConfigBuilder {
        Default::default()
    }

    /// Adds initial node address (a contact point).
    pub fn with_contact_point(mut self, addr: NodeAddress) -> Self {
        self.addrs.push(addr);
        self
    }

    /// Adds initial node addresses.
    pub fn with_contact_points(mut self, addrs: Vec<NodeAddress>) -> Self {
        self.addrs.extend(addrs);
        self
    }

    /// Sets the protocol version.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Disable Nagle's algorithm for connections.
    pub fn with_tcp_nodelay(mut self, tcp_nodelay: bool) -> Self {
        self.tcp_nodelay = tcp_nodelay;
        self
    }

    /// Sets the transport write queue size.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Finalizes building process. Host names are resolved, and duplicate addresses removed.
    pub async fn build(self) -> Result<NodeTcpConfig> {
        if self.buffer_size == 0 {
            return Err(Error::InvalidConfiguration(
                "Transport buffer size must be positive".into(),
            ));
        }

        // replace with map() when async lambdas become available
        let mut contact_points = Vec::with_capacity(self.addrs.len());
        for addr in self.addrs {
            match addr {
                NodeAddress::Direct(addr) => contact_points.push(addr),
                NodeAddress::Hostname(hostname) => {
                    contact_points.extend(lookup_host(hostname).await?)
                }
            }
        }

        if contact_points.is_empty() {
            return Err(Error::InvalidConfiguration(
                "At least one contact point is required".into(),
            ));
        }

        Ok(NodeTcpConfig {
            contact_points: contact_points.into_iter().unique().collect(),
            version: self.version,
            tcp_nodelay: self.tcp_nodelay,
            buffer_size: self.buffer_size,
        })
    }
}
