use derivative::Derivative;
use std::sync::Arc;
use std::time::Duration;

use crate::frame::message_query::QueryParams;
use crate::retry::RetryPolicy;

/// Parameters of Query for query operation.
#[derive(Default, Clone, Derivative)]
#[derivative(Debug)]
pub struct StatementParams {
    /// Protocol-level parameters.
    pub query_params: QueryParams,
    /// Is the query idempotent.
    pub is_idempotent: bool,
    /// Upper bound for the whole execution, including every retry. An execution which does not
    /// finish in time is abandoned and fails with a timeout.
    pub timeout: Option<Duration>,
    /// Custom statement retry policy.
    #[derivative(Debug = "ignore")]
    pub retry_policy: Option<Arc<dyn RetryPolicy + Send + Sync>>,
}
