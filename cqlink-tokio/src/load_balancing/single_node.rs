use crate::cluster::HostRegistry;
use crate::load_balancing::{LoadBalancingStrategy, QueryPlan, Request};

/// Load balancing strategy always returning the first node of the cluster, as long as it is
/// usable.
#[derive(Default, Debug, Clone, Copy)]
pub struct SingleNodeLoadBalancingStrategy;

impl SingleNodeLoadBalancingStrategy {
    pub fn new() -> Self {
        SingleNodeLoadBalancingStrategy
    }
}

impl LoadBalancingStrategy for SingleNodeLoadBalancingStrategy {
    fn query_plan(&self, _request: Option<Request>, cluster: &HostRegistry) -> QueryPlan {
        let node = cluster
            .all_hosts()
            .into_iter()
            .next()
            .filter(|node| node.is_up() || node.is_probe_due());

        QueryPlan::new(node.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancing::test_support::*;
    use itertools::Itertools;

    #[tokio::test]
    async fn should_only_use_first_node() {
        let cluster = registry(&[1, 2]);
        let load_balancer = SingleNodeLoadBalancingStrategy::new();

        for _ in 0..2 {
            assert_eq!(
                load_balancer
                    .query_plan(None, &cluster)
                    .map(|node| node.address())
                    .collect_vec(),
                vec![address(1)]
            );
        }

        cluster.mark_down(address(1));
        assert_eq!(load_balancer.query_plan(None, &cluster).len(), 0);
    }
}
