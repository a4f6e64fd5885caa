use derive_more::Constructor;
#[cfg(test)]
use mockall::automock;
use std::time::Duration;

use crate::error::{Error, Result};

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Determines the time for the next reconnection attempt when trying to reconnect to a node.
pub trait ReconnectionSchedule {
    /// Returns next reconnect delay or `None` if not attempt should be made.
    fn next_delay(&mut self) -> Option<Duration>;
}

/// Creates reconnection schedules when trying to re-establish connections. A new schedule is
/// created each time a node goes down and is discarded once the node is back up.
#[cfg_attr(test, automock)]
pub trait ReconnectionPolicy {
    /// Creates new schedule when a connection needs to be re-established.
    fn new_node_schedule(&self) -> Box<dyn ReconnectionSchedule + Send + Sync>;
}

/// Schedules reconnection at constant interval.
#[derive(Copy, Clone, Constructor, Debug, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct ConstantReconnectionPolicy {
    base_delay: Duration,
}

impl Default for ConstantReconnectionPolicy {
    fn default() -> Self {
        ConstantReconnectionPolicy::new(DEFAULT_BASE_DELAY)
    }
}

impl ReconnectionPolicy for ConstantReconnectionPolicy {
    fn new_node_schedule(&self) -> Box<dyn ReconnectionSchedule + Send + Sync> {
        Box::new(ConstantReconnectionSchedule::new(self.base_delay))
    }
}

#[derive(Constructor)]
struct ConstantReconnectionSchedule {
    base_delay: Duration,
}

impl ReconnectionSchedule for ConstantReconnectionSchedule {
    fn next_delay(&mut self) -> Option<Duration> {
        Some(self.base_delay)
    }
}

/// Never schedules reconnections. A node which goes down stays ignored.
#[derive(Default, Copy, Clone, Debug, PartialEq, Ord, PartialOrd, Eq, Hash)]
pub struct NeverReconnectionPolicy;

impl ReconnectionPolicy for NeverReconnectionPolicy {
    fn new_node_schedule(&self) -> Box<dyn ReconnectionSchedule + Send + Sync> {
        Box::new(NeverReconnectionSchedule)
    }
}

struct NeverReconnectionSchedule;

impl ReconnectionSchedule for NeverReconnectionSchedule {
    fn next_delay(&mut self) -> Option<Duration> {
        None
    }
}

/// A reconnection policy that waits exponentially longer between each reconnection attempt, but
/// keeps a constant delay once a maximum delay is reached. Attempt `n` (counting from 0) waits
/// `min(base_delay * 2^n, max_delay)`.
#[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct ExponentialReconnectionPolicy {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl ExponentialReconnectionPolicy {
    /// Creates a new policy. The base delay must be positive and not greater than the max delay.
    pub fn new(base_delay: Duration, max_delay: Duration) -> Result<Self> {
        if base_delay.is_zero() {
            return Err(Error::InvalidConfiguration(
                "Base reconnection delay must be positive".into(),
            ));
        }

        if max_delay < base_delay {
            return Err(Error::InvalidConfiguration(format!(
                "Max reconnection delay ({max_delay:?}) cannot be less than base delay ({base_delay:?})"
            )));
        }

        Ok(ExponentialReconnectionPolicy {
            base_delay,
            max_delay,
            max_attempts: Self::derive_max_attempts(base_delay, max_delay),
        })
    }

    // smallest n for which base * 2^n reaches max
    fn derive_max_attempts(base_delay: Duration, max_delay: Duration) -> u32 {
        let max = max_delay.as_nanos();
        let mut delay = base_delay.as_nanos();
        let mut attempts = 0;

        while delay < max {
            delay = delay.saturating_mul(2);
            attempts += 1;
        }

        attempts
    }

    #[inline]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    #[inline]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Number of attempts after which every delay equals the max delay.
    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl ReconnectionPolicy for ExponentialReconnectionPolicy {
    fn new_node_schedule(&self) -> Box<dyn ReconnectionSchedule + Send + Sync> {
        Box::new(ExponentialReconnectionSchedule::new(
            self.base_delay,
            self.max_delay,
            self.max_attempts,
        ))
    }
}

impl Default for ExponentialReconnectionPolicy {
    fn default() -> Self {
        ExponentialReconnectionPolicy {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: Self::derive_max_attempts(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY),
        }
    }
}

struct ExponentialReconnectionSchedule {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl ReconnectionSchedule for ExponentialReconnectionSchedule {
    fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return Some(self.max_delay);
        }

        // below max_attempts the shifted value is smaller than max_delay, so it cannot overflow
        let nanos = self.base_delay.as_nanos() << self.attempt;
        self.attempt += 1;

        let delay = Duration::new(
            (nanos / NANOS_PER_SEC) as u64,
            (nanos % NANOS_PER_SEC) as u32,
        );

        Some(delay.min(self.max_delay))
    }
}

impl ExponentialReconnectionSchedule {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        ExponentialReconnectionSchedule {
            base_delay,
            max_delay,
            max_attempts,
            attempt: 0,
        }
    }
}
