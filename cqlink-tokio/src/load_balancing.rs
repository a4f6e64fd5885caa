mod random;
mod request;
mod round_robin;
mod single_node;

pub use self::random::RandomLoadBalancingStrategy;
pub use self::request::Request;
pub use self::round_robin::RoundRobinLoadBalancingStrategy;
pub use self::single_node::SingleNodeLoadBalancingStrategy;

use std::sync::Arc;
use std::vec::IntoIter;

use crate::cluster::topology::Node;
use crate::cluster::HostRegistry;

/// Ordered candidate nodes for a single request. A plan is consumed once, front to back, and
/// cannot be restarted.
#[derive(Debug)]
pub struct QueryPlan {
    nodes: IntoIter<Arc<Node>>,
}

impl QueryPlan {
    pub fn new(nodes: Vec<Arc<Node>>) -> Self {
        QueryPlan {
            nodes: nodes.into_iter(),
        }
    }

    /// Creates a plan out of already ordered up nodes, followed by down nodes which are due for a
    /// reconnection probe.
    pub fn with_due_probes(up_nodes: Vec<Arc<Node>>, cluster: &HostRegistry) -> Self {
        let mut nodes = up_nodes;
        nodes.extend(
            cluster
                .all_hosts()
                .into_iter()
                .filter(|node| node.is_probe_due()),
        );

        QueryPlan::new(nodes)
    }
}

impl Iterator for QueryPlan {
    type Item = Arc<Node>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.nodes.next()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.nodes.size_hint()
    }
}

impl ExactSizeIterator for QueryPlan {}

/// Load balancing strategy, deciding which nodes get contacted for a request, and in what order.
pub trait LoadBalancingStrategy {
    /// Returns query plan for given request. If no request is given, return a generic plan for
    /// establishing connection(s) to node(s).
    fn query_plan(&self, request: Option<Request>, cluster: &HostRegistry) -> QueryPlan;
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use itertools::Itertools;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn should_append_nodes_due_for_probe() {
        let cluster = registry(&[1, 2, 3]);
        cluster.mark_down(address(1));
        cluster.mark_down(address(2));

        let plan = QueryPlan::with_due_probes(cluster.up_hosts(), &cluster);
        assert_eq!(plan.map(|node| node.address()).collect_vec(), vec![address(3)]);

        tokio::time::advance(Duration::from_secs(1)).await;

        let plan = QueryPlan::with_due_probes(cluster.up_hosts(), &cluster);
        assert_eq!(plan.len(), 3);
        assert_eq!(
            plan.map(|node| node.address()).collect_vec(),
            vec![address(3), address(1), address(2)]
        );
    }

    #[test]
    fn should_skip_ignored_nodes() {
        let cluster = registry(&[1, 2]);
        cluster.ignore(address(2));

        let plan = QueryPlan::with_due_probes(cluster.up_hosts(), &cluster);
        assert_eq!(plan.map(|node| node.address()).collect_vec(), vec![address(1)]);
    }
}
