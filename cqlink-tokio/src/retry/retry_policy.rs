use cqlink_protocol::consistency::Consistency;
use cqlink_protocol::frame::message_error::WriteType;
use cqlink_protocol::types::CInt;
use derive_more::Constructor;
use tracing::*;

/// What to do with a query which failed with a timeout or unavailability reported by a node.
#[derive(Debug, PartialEq, Eq, Ord, PartialOrd, Hash, Copy, Clone)]
pub enum RetryDecision {
    /// Return the error to the caller.
    Rethrow,
    /// Send the query again. `consistency` overrides the consistency of the query when present.
    Retry {
        consistency: Option<Consistency>,
        same_node: bool,
    },
    /// Pretend the query succeeded with an empty result.
    Ignore,
}

impl RetryDecision {
    #[inline]
    pub fn retry_same_node(consistency: Option<Consistency>) -> Self {
        RetryDecision::Retry {
            consistency,
            same_node: true,
        }
    }

    #[inline]
    pub fn retry_next_node(consistency: Option<Consistency>) -> Self {
        RetryDecision::Retry {
            consistency,
            same_node: false,
        }
    }
}

/// Information about a failed query.
#[derive(Debug, Clone, Copy, Constructor)]
pub struct QueryInfo<'a> {
    pub query: &'a str,
    pub is_idempotent: bool,
}

/// Retry policy determines what to do when a node reports it could not complete a query. Policies
/// are consulted after each failure of a single execution; `retry_count` is the number of retries
/// the execution already made.
pub trait RetryPolicy {
    /// A read did not get enough replica responses in time.
    fn on_read_timeout(
        &self,
        query: &QueryInfo,
        consistency: Consistency,
        required_responses: CInt,
        received_responses: CInt,
        data_retrieved: bool,
        retry_count: usize,
    ) -> RetryDecision;

    /// A write was not acknowledged by enough replicas in time.
    fn on_write_timeout(
        &self,
        query: &QueryInfo,
        consistency: Consistency,
        write_type: WriteType,
        required_acks: CInt,
        received_acks: CInt,
        retry_count: usize,
    ) -> RetryDecision;

    /// The coordinator knew upfront that not enough replicas were alive.
    fn on_unavailable(
        &self,
        query: &QueryInfo,
        consistency: Consistency,
        required_replicas: CInt,
        alive_replicas: CInt,
        retry_count: usize,
    ) -> RetryDecision;
}

/// Forwards all errors directly to the user, never retries
#[derive(Default, Debug, Clone, Copy)]
pub struct FallthroughRetryPolicy;

impl RetryPolicy for FallthroughRetryPolicy {
    fn on_read_timeout(
        &self,
        _query: &QueryInfo,
        _consistency: Consistency,
        _required_responses: CInt,
        _received_responses: CInt,
        _data_retrieved: bool,
        _retry_count: usize,
    ) -> RetryDecision {
        RetryDecision::Rethrow
    }

    fn on_write_timeout(
        &self,
        _query: &QueryInfo,
        _consistency: Consistency,
        _write_type: WriteType,
        _required_acks: CInt,
        _received_acks: CInt,
        _retry_count: usize,
    ) -> RetryDecision {
        RetryDecision::Rethrow
    }

    fn on_unavailable(
        &self,
        _query: &QueryInfo,
        _consistency: Consistency,
        _required_replicas: CInt,
        _alive_replicas: CInt,
        _retry_count: usize,
    ) -> RetryDecision {
        RetryDecision::Rethrow
    }
}

/// Default retry policy - retries once, and only when there is a high chance that a retry might
/// help:
///
/// * a read timeout is retried on the same node when replicas responded, but the one asked for data
///   did not,
/// * a write timeout is retried on the same node for batches which were already acknowledged by
///   enough replicas (the batch log write timed out),
/// * an unavailable error is retried on the next node, since the coordinator might have been
///   isolated from the rest of the cluster.
#[derive(Default, Debug, Clone, Copy)]
pub struct DefaultRetryPolicy;

impl RetryPolicy for DefaultRetryPolicy {
    fn on_read_timeout(
        &self,
        _query: &QueryInfo,
        _consistency: Consistency,
        required_responses: CInt,
        received_responses: CInt,
        data_retrieved: bool,
        retry_count: usize,
    ) -> RetryDecision {
        if retry_count == 0
            && !data_retrieved
            && (received_responses >= 1 || received_responses >= required_responses)
        {
            RetryDecision::retry_same_node(None)
        } else {
            RetryDecision::Rethrow
        }
    }

    fn on_write_timeout(
        &self,
        _query: &QueryInfo,
        _consistency: Consistency,
        write_type: WriteType,
        required_acks: CInt,
        received_acks: CInt,
        retry_count: usize,
    ) -> RetryDecision {
        if retry_count == 0
            && matches!(write_type, WriteType::Batch | WriteType::BatchLog)
            && received_acks >= required_acks
        {
            RetryDecision::retry_same_node(None)
        } else {
            RetryDecision::Rethrow
        }
    }

    fn on_unavailable(
        &self,
        _query: &QueryInfo,
        _consistency: Consistency,
        _required_replicas: CInt,
        _alive_replicas: CInt,
        retry_count: usize,
    ) -> RetryDecision {
        if retry_count == 0 {
            RetryDecision::retry_next_node(None)
        } else {
            RetryDecision::Rethrow
        }
    }
}

/// A retry policy which retries with a lower consistency level, when the original one cannot be
/// satisfied by the replicas which responded or are alive. The consistency is never raised.
///
/// Using this policy means accepting weaker consistency for availability, so a successful query
/// does not guarantee the requested level was achieved.
#[derive(Default, Debug, Clone, Copy)]
pub struct DowngradingConsistencyRetryPolicy;

impl DowngradingConsistencyRetryPolicy {
    fn downgrade(consistency: Consistency, required: CInt, available: CInt) -> RetryDecision {
        if available >= required {
            return RetryDecision::retry_same_node(None);
        }

        match Consistency::for_replica_count(available) {
            Some(downgraded) => {
                debug!(%consistency, %downgraded, available, required, "Downgrading consistency");
                RetryDecision::retry_same_node(Some(downgraded))
            }
            None => RetryDecision::Rethrow,
        }
    }
}

impl RetryPolicy for DowngradingConsistencyRetryPolicy {
    fn on_read_timeout(
        &self,
        _query: &QueryInfo,
        consistency: Consistency,
        required_responses: CInt,
        received_responses: CInt,
        data_retrieved: bool,
        retry_count: usize,
    ) -> RetryDecision {
        if retry_count != 0 {
            return RetryDecision::Rethrow;
        }

        if received_responses < required_responses {
            return Self::downgrade(consistency, required_responses, received_responses);
        }

        if !data_retrieved {
            RetryDecision::retry_same_node(None)
        } else {
            RetryDecision::Rethrow
        }
    }

    fn on_write_timeout(
        &self,
        _query: &QueryInfo,
        consistency: Consistency,
        write_type: WriteType,
        required_acks: CInt,
        received_acks: CInt,
        retry_count: usize,
    ) -> RetryDecision {
        if retry_count != 0 {
            return RetryDecision::Rethrow;
        }

        match write_type {
            // at least one replica persisted the write, and it will be replicated eventually
            WriteType::Simple | WriteType::Batch if received_acks > 0 => RetryDecision::Ignore,
            WriteType::UnloggedBatch => {
                Self::downgrade(consistency, required_acks, received_acks)
            }
            // the batch log write failed, so nothing was applied yet
            WriteType::BatchLog => RetryDecision::retry_same_node(None),
            _ => RetryDecision::Rethrow,
        }
    }

    fn on_unavailable(
        &self,
        _query: &QueryInfo,
        consistency: Consistency,
        required_replicas: CInt,
        alive_replicas: CInt,
        retry_count: usize,
    ) -> RetryDecision {
        if retry_count != 0 {
            return RetryDecision::Rethrow;
        }

        Self::downgrade(consistency, required_replicas, alive_replicas)
    }
}

/// Ignores every failure. Queries appear to succeed with an empty result.
#[derive(Default, Debug, Clone, Copy)]
pub struct AlwaysIgnoreRetryPolicy;

impl RetryPolicy for AlwaysIgnoreRetryPolicy {
    fn on_read_timeout(
        &self,
        _query: &QueryInfo,
        _consistency: Consistency,
        _required_responses: CInt,
        _received_responses: CInt,
        _data_retrieved: bool,
        _retry_count: usize,
    ) -> RetryDecision {
        RetryDecision::Ignore
    }

    fn on_write_timeout(
        &self,
        _query: &QueryInfo,
        _consistency: Consistency,
        _write_type: WriteType,
        _required_acks: CInt,
        _received_acks: CInt,
        _retry_count: usize,
    ) -> RetryDecision {
        RetryDecision::Ignore
    }

    fn on_unavailable(
        &self,
        _query: &QueryInfo,
        _consistency: Consistency,
        _required_replicas: CInt,
        _alive_replicas: CInt,
        _retry_count: usize,
    ) -> RetryDecision {
        RetryDecision::Ignore
    }
}

/// Retries every failure on the same node at the same consistency. The number of attempts is still
/// bounded by the session's maximum retry count.
#[derive(Default, Debug, Clone, Copy)]
pub struct AlwaysRetryRetryPolicy;

impl RetryPolicy for AlwaysRetryRetryPolicy {
    fn on_read_timeout(
        &self,
        _query: &QueryInfo,
        _consistency: Consistency,
        _required_responses: CInt,
        _received_responses: CInt,
        _data_retrieved: bool,
        _retry_count: usize,
    ) -> RetryDecision {
        RetryDecision::retry_same_node(None)
    }

    fn on_write_timeout(
        &self,
        _query: &QueryInfo,
        _consistency: Consistency,
        _write_type: WriteType,
        _required_acks: CInt,
        _received_acks: CInt,
        _retry_count: usize,
    ) -> RetryDecision {
        RetryDecision::retry_same_node(None)
    }

    fn on_unavailable(
        &self,
        _query: &QueryInfo,
        _consistency: Consistency,
        _required_replicas: CInt,
        _alive_replicas: CInt,
        _retry_count: usize,
    ) -> RetryDecision {
        RetryDecision::retry_same_node(None)
    }
}

/// Logs decisions of the wrapped policy, other than rethrowing.
#[derive(Default, Debug, Clone, Copy)]
pub struct LoggingRetryPolicy<P> {
    policy: P,
}

impl<P: RetryPolicy> LoggingRetryPolicy<P> {
    pub fn new(policy: P) -> Self {
        LoggingRetryPolicy { policy }
    }

    #[inline]
    pub fn inner(&self) -> &P {
        &self.policy
    }
}

fn log_decision(
    decision: RetryDecision,
    failure: &str,
    query: &QueryInfo,
    consistency: Consistency,
    required: CInt,
    received: CInt,
    retry_count: usize,
) {
    match decision {
        RetryDecision::Rethrow => {}
        RetryDecision::Ignore => info!(
            query = query.query,
            %consistency,
            required,
            received,
            retry_count,
            "Ignoring {failure}"
        ),
        RetryDecision::Retry {
            consistency: new_consistency,
            same_node,
        } => info!(
            query = query.query,
            %consistency,
            new_consistency = %new_consistency.unwrap_or(consistency),
            same_node,
            required,
            received,
            retry_count,
            "Retrying on {failure}"
        ),
    }
}

impl<P: RetryPolicy> RetryPolicy for LoggingRetryPolicy<P> {
    fn on_read_timeout(
        &self,
        query: &QueryInfo,
        consistency: Consistency,
        required_responses: CInt,
        received_responses: CInt,
        data_retrieved: bool,
        retry_count: usize,
    ) -> RetryDecision {
        let decision = self.policy.on_read_timeout(
            query,
            consistency,
            required_responses,
            received_responses,
            data_retrieved,
            retry_count,
        );

        log_decision(
            decision,
            "read timeout",
            query,
            consistency,
            required_responses,
            received_responses,
            retry_count,
        );

        decision
    }

    fn on_write_timeout(
        &self,
        query: &QueryInfo,
        consistency: Consistency,
        write_type: WriteType,
        required_acks: CInt,
        received_acks: CInt,
        retry_count: usize,
    ) -> RetryDecision {
        let decision = self.policy.on_write_timeout(
            query,
            consistency,
            write_type,
            required_acks,
            received_acks,
            retry_count,
        );

        log_decision(
            decision,
            "write timeout",
            query,
            consistency,
            required_acks,
            received_acks,
            retry_count,
        );

        decision
    }

    fn on_unavailable(
        &self,
        query: &QueryInfo,
        consistency: Consistency,
        required_replicas: CInt,
        alive_replicas: CInt,
        retry_count: usize,
    ) -> RetryDecision {
        let decision = self.policy.on_unavailable(
            query,
            consistency,
            required_replicas,
            alive_replicas,
            retry_count,
        );

        log_decision(
            decision,
            "unavailable",
            query,
            consistency,
            required_replicas,
            alive_replicas,
            retry_count,
        );

        decision
    }
}
