mod reconnection_policy;
mod retry_policy;

pub use crate::retry::reconnection_policy::{
    ConstantReconnectionPolicy, ExponentialReconnectionPolicy, NeverReconnectionPolicy,
    ReconnectionPolicy, ReconnectionSchedule,
};
#[cfg(test)]
pub(crate) use crate::retry::reconnection_policy::MockReconnectionPolicy;
pub use crate::retry::retry_policy::{
    AlwaysIgnoreRetryPolicy, AlwaysRetryRetryPolicy, DefaultRetryPolicy,
    DowngradingConsistencyRetryPolicy, FallthroughRetryPolicy, LoggingRetryPolicy, QueryInfo,
    RetryDecision, RetryPolicy,
};
