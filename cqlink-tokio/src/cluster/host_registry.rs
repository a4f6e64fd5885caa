use arc_swap::ArcSwap;
use fxhash::FxHashMap;
use itertools::Itertools;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::*;

use crate::cluster::topology::{Node, NodeState};
use crate::retry::ReconnectionPolicy;

#[derive(Debug, Clone, Default)]
struct ClusterNodes {
    // insertion order, used by load balancers
    nodes: Vec<Arc<Node>>,
    by_address: FxHashMap<SocketAddr, Arc<Node>>,
}

impl ClusterNodes {
    // returns the node for given address and whether it was created
    fn insert(&mut self, address: SocketAddr) -> (Arc<Node>, bool) {
        if let Some(node) = self.by_address.get(&address) {
            return (node.clone(), false);
        }

        let node = Arc::new(Node::new(address));
        self.nodes.push(node.clone());
        self.by_address.insert(address, node.clone());

        (node, true)
    }

    fn remove(&mut self, address: SocketAddr) -> Option<Arc<Node>> {
        let node = self.by_address.remove(&address)?;
        self.nodes.retain(|existing| existing.address() != address);
        Some(node)
    }
}

/// Tracks every known node of the cluster along with its liveness. There is exactly one
/// [`Node`] per address, shared by reference with load balancers and connection pools.
///
/// Readers work on lock-free snapshots, so a query plan being built never blocks a node being
/// added or removed.
pub struct HostRegistry {
    nodes: ArcSwap<ClusterNodes>,
    reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
}

impl std::fmt::Debug for HostRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRegistry")
            .field("nodes", &self.nodes.load().nodes)
            .finish()
    }
}

impl HostRegistry {
    /// Creates a registry with all given hosts up. Duplicate addresses are merged.
    pub fn new(
        addresses: impl IntoIterator<Item = SocketAddr>,
        reconnection_policy: Arc<dyn ReconnectionPolicy + Send + Sync>,
    ) -> Self {
        let mut nodes = ClusterNodes::default();
        for address in addresses.into_iter().unique() {
            nodes.insert(address);
        }

        HostRegistry {
            nodes: ArcSwap::from_pointee(nodes),
            reconnection_policy,
        }
    }

    #[inline]
    pub fn reconnection_policy(&self) -> &(dyn ReconnectionPolicy + Send + Sync) {
        self.reconnection_policy.as_ref()
    }

    /// Adds a host, returning the existing one if the address is already known.
    pub fn add(&self, address: SocketAddr) -> Arc<Node> {
        let mut result = None;
        self.nodes.rcu(|current| {
            let mut nodes = ClusterNodes::clone(current);
            result = Some(nodes.insert(address));
            nodes
        });

        match result {
            Some((node, created)) => {
                if created {
                    info!(%address, "Host added");
                }

                node
            }
            // rcu always runs the update at least once
            None => Arc::new(Node::new(address)),
        }
    }

    /// Forgets a host. In-flight queries holding the node keep it alive until they finish.
    pub fn remove(&self, address: SocketAddr) -> Option<Arc<Node>> {
        let mut removed = None;
        self.nodes.rcu(|current| {
            let mut nodes = ClusterNodes::clone(current);
            removed = nodes.remove(address);
            nodes
        });

        if removed.is_some() {
            info!(%address, "Host removed");
        }

        removed
    }

    #[inline]
    pub fn node(&self, address: SocketAddr) -> Option<Arc<Node>> {
        self.nodes.load().by_address.get(&address).cloned()
    }

    /// Marks a host down and starts its reconnection schedule. Returns `true` only for the call
    /// which made the transition; reports about already down hosts are no-ops.
    pub fn mark_down(&self, address: SocketAddr) -> bool {
        match self.node(address) {
            Some(node) => self.mark_node_down(&node),
            None => false,
        }
    }

    pub(crate) fn mark_node_down(&self, node: &Node) -> bool {
        let changed = node.mark_down(self.reconnection_policy.as_ref());
        if changed {
            warn!(address = %node.address(), state = %node.state(), "Host marked down");
        }

        changed
    }

    /// Marks a host up and discards its reconnection schedule.
    pub fn mark_up(&self, address: SocketAddr) -> bool {
        let changed = self
            .node(address)
            .map(|node| node.mark_up())
            .unwrap_or(false);

        if changed {
            info!(%address, "Host marked up");
        }

        changed
    }

    /// Excludes a host from query plans until it is marked up.
    pub fn ignore(&self, address: SocketAddr) -> bool {
        let changed = self
            .node(address)
            .map(|node| node.ignore())
            .unwrap_or(false);

        if changed {
            info!(%address, "Host ignored");
        }

        changed
    }

    #[inline]
    pub fn status(&self, address: SocketAddr) -> Option<NodeState> {
        self.node(address).map(|node| node.state())
    }

    /// Returns every known host, in insertion order.
    pub fn all_hosts(&self) -> Vec<Arc<Node>> {
        self.nodes.load().nodes.clone()
    }

    /// Returns hosts which are currently up, in insertion order.
    pub fn up_hosts(&self) -> Vec<Arc<Node>> {
        self.nodes
            .load()
            .nodes
            .iter()
            .filter(|node| node.is_up())
            .cloned()
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.load().nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
