use rand::prelude::*;
use rand::rng;

use crate::cluster::HostRegistry;
use crate::load_balancing::{LoadBalancingStrategy, QueryPlan, Request};

/// Pure random load balancing.
#[derive(Default, Debug, Clone, Copy)]
pub struct RandomLoadBalancingStrategy;

impl RandomLoadBalancingStrategy {
    pub fn new() -> Self {
        RandomLoadBalancingStrategy
    }
}

impl LoadBalancingStrategy for RandomLoadBalancingStrategy {
    fn query_plan(&self, _request: Option<Request>, cluster: &HostRegistry) -> QueryPlan {
        let mut result = cluster.up_hosts();

        result.shuffle(&mut rng());
        QueryPlan::with_due_probes(result, cluster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancing::test_support::*;
    use itertools::Itertools;

    #[test]
    fn should_return_every_up_node_once() {
        let cluster = registry(&[1, 2, 3, 4]);
        cluster.ignore(address(4));

        let plan = RandomLoadBalancingStrategy::new()
            .query_plan(None, &cluster)
            .map(|node| node.address())
            .sorted()
            .collect_vec();

        assert_eq!(plan, vec![address(1), address(2), address(3)]);
    }
}
