use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cluster::HostRegistry;
use crate::load_balancing::{LoadBalancingStrategy, QueryPlan, Request};

/// Simple round-robin load balancing. Every plan starts one node further than the previous one.
#[derive(Default, Debug)]
pub struct RoundRobinLoadBalancingStrategy {
    prev_idx: AtomicUsize,
}

impl RoundRobinLoadBalancingStrategy {
    pub fn new() -> Self {
        Default::default()
    }
}

impl LoadBalancingStrategy for RoundRobinLoadBalancingStrategy {
    fn query_plan(&self, _request: Option<Request>, cluster: &HostRegistry) -> QueryPlan {
        let mut nodes = cluster.up_hosts();
        if !nodes.is_empty() {
            let cur_idx = self.prev_idx.fetch_add(1, Ordering::Relaxed);
            let len = nodes.len();
            nodes.rotate_left(cur_idx % len);
        }

        QueryPlan::with_due_probes(nodes, cluster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancing::test_support::*;
    use itertools::Itertools;

    #[test]
    fn should_rotate_nodes() {
        let cluster = registry(&[1, 2, 3]);
        let load_balancer = RoundRobinLoadBalancingStrategy::new();

        let plans = (0..4)
            .map(|_| {
                load_balancer
                    .query_plan(None, &cluster)
                    .map(|node| node.address())
                    .collect_vec()
            })
            .collect_vec();

        assert_eq!(plans[0], vec![address(1), address(2), address(3)]);
        assert_eq!(plans[1], vec![address(2), address(3), address(1)]);
        assert_eq!(plans[2], vec![address(3), address(1), address(2)]);
        assert_eq!(plans[3], plans[0]);
    }

    #[tokio::test]
    async fn should_exclude_down_nodes() {
        let cluster = registry(&[1, 2]);
        cluster.mark_down(address(1));

        let load_balancer = RoundRobinLoadBalancingStrategy::new();
        for _ in 0..3 {
            assert_eq!(
                load_balancer
                    .query_plan(None, &cluster)
                    .map(|node| node.address())
                    .collect_vec(),
                vec![address(2)]
            );
        }
    }

    #[test]
    fn should_return_empty_plan_without_nodes() {
        let cluster = registry(&[]);
        assert_eq!(
            RoundRobinLoadBalancingStrategy::new()
                .query_plan(None, &cluster)
                .len(),
            0
        );
    }
}
