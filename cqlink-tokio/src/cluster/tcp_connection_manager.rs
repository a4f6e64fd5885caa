use futures::FutureExt;
use std::net::SocketAddr;
use tracing::*;

use crate::cluster::connection_manager::{startup, ConnectionManager};
use crate::cluster::NodeTcpConfig;
use crate::error::Result;
use crate::future::BoxFuture;
use crate::transport::TransportTcp;

/// Opens plain TCP connections.
pub struct TcpConnectionManager {
    config: NodeTcpConfig,
}

impl ConnectionManager<TransportTcp> for TcpConnectionManager {
    fn connection(&self, addr: SocketAddr) -> BoxFuture<'_, Result<TransportTcp>> {
        async move {
            debug!(%addr, "Establishing new connection");
            self.establish_connection(addr).await
        }
        .boxed()
    }
}

impl TcpConnectionManager {
    pub fn new(config: NodeTcpConfig) -> Self {
        TcpConnectionManager { config }
    }

    async fn establish_connection(&self, addr: SocketAddr) -> Result<TransportTcp> {
        let transport =
            TransportTcp::new(addr, self.config.buffer_size, self.config.tcp_nodelay).await?;

        startup(&transport, self.config.version).await?;

        Ok(transport)
    }
}
