use atomic::Atomic;
use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::*;

use crate::cluster::topology::NodeState;
use crate::retry::{ReconnectionPolicy, ReconnectionSchedule};

#[derive(Default)]
struct NodeHealth {
    // present only while the node is down
    schedule: Option<Box<dyn ReconnectionSchedule + Send + Sync>>,
    next_attempt: Option<Instant>,
    probe_in_progress: bool,
}

/// A single node of the cluster, shared by every component which needs to know about it. The
/// liveness state can be read without locking; transitions are serialized, so concurrent failure
/// reports converge to a single transition.
pub struct Node {
    address: SocketAddr,
    state: Atomic<NodeState>,
    health: Mutex<NodeHealth>,
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("address", &self.address)
            .field("state", &self.state())
            .field("next_attempt", &self.lock_health().next_attempt)
            .finish()
    }
}

impl Node {
    pub fn new(address: SocketAddr) -> Self {
        Node {
            address,
            state: Atomic::new(NodeState::Up),
            health: Default::default(),
        }
    }

    #[inline]
    fn lock_health(&self) -> MutexGuard<'_, NodeHealth> {
        self.health.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    #[inline]
    pub fn state(&self) -> NodeState {
        self.state.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_up(&self) -> bool {
        self.state() == NodeState::Up
    }

    /// When the next reconnection attempt is allowed, if the node is down.
    pub fn next_attempt(&self) -> Option<Instant> {
        self.lock_health().next_attempt
    }

    /// Marks the node as down, starting a new reconnection schedule. Returns `false` if the node
    /// was not up, in which case nothing changes. A schedule which does not provide any delay
    /// moves the node straight to [`NodeState::Ignored`].
    pub fn mark_down(&self, reconnection_policy: &dyn ReconnectionPolicy) -> bool {
        let mut health = self.lock_health();
        if self.state() != NodeState::Up {
            return false;
        }

        let mut schedule = reconnection_policy.new_node_schedule();
        match schedule.next_delay() {
            Some(delay) => {
                health.next_attempt = Some(Instant::now() + delay);
                health.schedule = Some(schedule);
                self.state.store(NodeState::Down, Ordering::Release);

                debug!(address = %self.address, ?delay, "Node marked down");
            }
            None => {
                health.next_attempt = None;
                health.schedule = None;
                self.state.store(NodeState::Ignored, Ordering::Release);

                debug!(address = %self.address, "Node marked down without reconnection");
            }
        }

        true
    }

    /// Marks the node as up, discarding its reconnection schedule. Returns `false` if the node was
    /// already up.
    pub fn mark_up(&self) -> bool {
        let mut health = self.lock_health();
        if self.state() == NodeState::Up {
            return false;
        }

        health.schedule = None;
        health.next_attempt = None;
        self.state.store(NodeState::Up, Ordering::Release);

        debug!(address = %self.address, "Node marked up");
        true
    }

    /// Stops using the node until it is explicitly marked up. Returns `false` if the node was
    /// already ignored.
    pub fn ignore(&self) -> bool {
        let mut health = self.lock_health();
        if self.state() == NodeState::Ignored {
            return false;
        }

        health.schedule = None;
        health.next_attempt = None;
        self.state.store(NodeState::Ignored, Ordering::Release);

        debug!(address = %self.address, "Node ignored");
        true
    }

    /// Checks if the node is down, its next reconnection attempt is due and nobody is probing it.
    pub fn is_probe_due(&self) -> bool {
        let health = self.lock_health();
        self.probe_due(&health)
    }

    fn probe_due(&self, health: &NodeHealth) -> bool {
        self.state() == NodeState::Down
            && !health.probe_in_progress
            && health
                .next_attempt
                .map(|next_attempt| next_attempt <= Instant::now())
                .unwrap_or(false)
    }

    /// Starts a reconnection probe, if one is due. At most one probe runs at any time; the
    /// returned guard must be resolved with the probe outcome.
    pub fn try_begin_probe(self: &Arc<Self>) -> Option<ProbeGuard> {
        let mut health = self.lock_health();
        if !self.probe_due(&health) {
            return None;
        }

        health.probe_in_progress = true;
        Some(ProbeGuard { node: self.clone() })
    }
}

/// An in-progress reconnection probe. Dropping the guard without an outcome (e.g. when the probing
/// request gets cancelled) lets another probe start, without advancing the schedule.
#[must_use]
pub struct ProbeGuard {
    node: Arc<Node>,
}

impl ProbeGuard {
    /// The node answered - mark it up.
    pub fn succeed(self) {
        self.node.mark_up();
    }

    /// The node is still unreachable - schedule the next attempt.
    pub fn fail(self) {
        let node = &self.node;
        let mut health = node.lock_health();
        if node.state() != NodeState::Down {
            return;
        }

        match health
            .schedule
            .as_mut()
            .and_then(|schedule| schedule.next_delay())
        {
            Some(delay) => {
                health.next_attempt = Some(Instant::now() + delay);
                debug!(address = %node.address, ?delay, "Reconnection failed");
            }
            None => {
                health.schedule = None;
                health.next_attempt = None;
                node.state.store(NodeState::Ignored, Ordering::Release);
                warn!(address = %node.address, "Giving up reconnecting to node");
            }
        }
    }
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.node.lock_health().probe_in_progress = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{ConstantReconnectionPolicy, MockReconnectionPolicy};
    use std::collections::VecDeque;
    use std::time::Duration;

    struct ScriptedSchedule(VecDeque<Duration>);

    impl ReconnectionSchedule for ScriptedSchedule {
        fn next_delay(&mut self) -> Option<Duration> {
            self.0.pop_front()
        }
    }

    fn scripted_policy(delays: &'static [u64]) -> MockReconnectionPolicy {
        let mut policy = MockReconnectionPolicy::new();
        policy.expect_new_node_schedule().returning(move || {
            Box::new(ScriptedSchedule(
                delays.iter().copied().map(Duration::from_secs).collect(),
            ))
        });
        policy
    }

    fn node() -> Arc<Node> {
        Arc::new(Node::new("127.0.0.1:9042".parse().unwrap()))
    }

    #[tokio::test(start_paused = true)]
    async fn should_converge_to_single_down_transition() {
        let mut policy = MockReconnectionPolicy::new();
        policy
            .expect_new_node_schedule()
            .times(1)
            .returning(|| Box::new(ScriptedSchedule(VecDeque::from([Duration::from_secs(1)]))));

        let node = node();
        assert!(node.mark_down(&policy));
        assert!(!node.mark_down(&policy));
        assert_eq!(node.state(), NodeState::Down);
    }

    #[tokio::test(start_paused = true)]
    async fn should_allow_probe_only_when_due() {
        let policy = ConstantReconnectionPolicy::new(Duration::from_secs(2));
        let node = node();
        node.mark_down(&policy);

        assert!(!node.is_probe_due());
        assert!(node.try_begin_probe().is_none());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(node.is_probe_due());

        let probe = node.try_begin_probe().unwrap();
        assert!(node.try_begin_probe().is_none());
        assert!(!node.is_probe_due());

        probe.succeed();
        assert_eq!(node.state(), NodeState::Up);
        assert_eq!(node.next_attempt(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn should_reschedule_failed_probe() {
        let policy = scripted_policy(&[1, 5]);
        let node = node();
        node.mark_down(&policy);

        tokio::time::advance(Duration::from_secs(1)).await;
        node.try_begin_probe().unwrap().fail();

        assert_eq!(node.state(), NodeState::Down);
        assert_eq!(
            node.next_attempt(),
            Some(Instant::now() + Duration::from_secs(5))
        );

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(!node.is_probe_due());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(node.is_probe_due());
    }

    #[tokio::test(start_paused = true)]
    async fn should_ignore_node_when_schedule_ends() {
        let policy = scripted_policy(&[1]);
        let node = node();
        node.mark_down(&policy);

        tokio::time::advance(Duration::from_secs(1)).await;
        node.try_begin_probe().unwrap().fail();

        assert_eq!(node.state(), NodeState::Ignored);
        assert!(!node.is_probe_due());
    }

    #[tokio::test(start_paused = true)]
    async fn should_ignore_node_without_schedule() {
        let policy = scripted_policy(&[]);
        let node = node();

        assert!(node.mark_down(&policy));
        assert_eq!(node.state(), NodeState::Ignored);
    }

    #[tokio::test(start_paused = true)]
    async fn should_release_probe_on_drop() {
        let policy = ConstantReconnectionPolicy::new(Duration::from_secs(1));
        let node = node();
        node.mark_down(&policy);
        tokio::time::advance(Duration::from_secs(1)).await;

        drop(node.try_begin_probe().unwrap());

        assert_eq!(node.state(), NodeState::Down);
        assert!(node.try_begin_probe().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn should_start_fresh_schedule_after_recovery() {
        let policy = scripted_policy(&[3]);
        let node = node();

        node.mark_down(&policy);
        node.mark_up();
        node.mark_down(&policy);

        assert_eq!(
            node.next_attempt(),
            Some(Instant::now() + Duration::from_secs(3))
        );
    }
}
