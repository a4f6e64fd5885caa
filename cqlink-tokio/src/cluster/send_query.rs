use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::*;

use crate::cluster::connection_pool::{ConnectionPool, ConnectionPools};
use crate::cluster::row_cursor::RowCursor;
use crate::cluster::topology::Node;
use crate::cluster::{ConnectionManager, HostRegistry};
use crate::error::{Error, Result};
use crate::frame::message_error::AdditionalErrorInfo;
use crate::frame::message_query::QueryParams;
use crate::frame::{Frame, Version};
use crate::retry::{QueryInfo, RetryDecision, RetryPolicy};
use crate::transport::CqlTransport;

/// Settings shared by every attempt of a single execution.
#[derive(Clone, Copy)]
pub struct ExecutionProfile<'a> {
    pub retry_policy: &'a (dyn RetryPolicy + Send + Sync),
    /// Upper bound of retries, regardless of what the retry policy decides.
    pub max_retries: usize,
    /// Time allowed for a single attempt.
    pub request_timeout: Option<Duration>,
    pub version: Version,
}

enum FailureAction {
    /// The node could not be reached.
    MarkDown,
    /// The node could not serve the request, but is otherwise healthy.
    NextNode,
    Decide(RetryDecision),
    Surface,
}

fn failure_action(
    error: &Error,
    retry_policy: &dyn RetryPolicy,
    query_info: &QueryInfo,
    retry_count: usize,
) -> FailureAction {
    if error.is_connectivity() {
        return FailureAction::MarkDown;
    }

    let body = match error {
        Error::Server { body, .. } => body,
        // the attempt took too long; the node may be merely busy
        Error::Timeout(_) => return FailureAction::NextNode,
        _ => return FailureAction::Surface,
    };

    match &body.additional_info {
        AdditionalErrorInfo::ReadTimeout(info) => {
            FailureAction::Decide(retry_policy.on_read_timeout(
                query_info,
                info.cl,
                info.block_for,
                info.received,
                info.replica_has_responded(),
                retry_count,
            ))
        }
        AdditionalErrorInfo::WriteTimeout(info) => {
            FailureAction::Decide(retry_policy.on_write_timeout(
                query_info,
                info.cl,
                info.write_type,
                info.block_for,
                info.received,
                retry_count,
            ))
        }
        AdditionalErrorInfo::Unavailable(info) => {
            FailureAction::Decide(retry_policy.on_unavailable(
                query_info,
                info.cl,
                info.required,
                info.alive,
                retry_count,
            ))
        }
        AdditionalErrorInfo::Overloaded | AdditionalErrorInfo::IsBootstrapping => {
            FailureAction::NextNode
        }
        _ => FailureAction::Surface,
    }
}

/// Acquires a connection and sends the frame. The request timeout covers both, so waiting for a
/// free request slot counts against it.
async fn attempt<T: CqlTransport, CM: ConnectionManager<T>>(
    pool: &ConnectionPool<T, CM>,
    frame: &Frame,
    request_timeout: Option<Duration>,
) -> Result<Frame> {
    let execution = async {
        let connection = pool.acquire().await?;
        connection.write_frame(frame).await
    };

    match request_timeout {
        Some(timeout) => tokio::time::timeout(timeout, execution)
            .await
            .unwrap_or_else(|_| {
                Err(Error::Timeout(format!(
                    "No response from {} within {timeout:?}",
                    pool.node().address()
                )))
            }),
        None => execution.await,
    }
}

/// Executes a query against the nodes of a query plan, in order, until one of them returns a
/// result. Unreachable nodes are marked down and skipped; failures reported by nodes are handed
/// to the retry policy. Attempts are strictly sequential.
pub async fn send_query<T: CqlTransport, CM: ConnectionManager<T>>(
    query_plan: impl Iterator<Item = Arc<Node>>,
    cluster: &HostRegistry,
    pools: &ConnectionPools<T, CM>,
    query: &str,
    query_params: &QueryParams,
    is_idempotent: bool,
    profile: ExecutionProfile<'_>,
) -> Result<RowCursor> {
    let query_info = QueryInfo::new(query, is_idempotent);
    let mut query_params = query_params.clone();
    let mut retry_count = 0;
    let mut errors: Vec<(SocketAddr, Error)> = vec![];

    'next_node: for node in query_plan {
        let address = node.address();
        let pool = pools.pool(&node);

        loop {
            let frame = Frame::new_req_query(query.into(), query_params.clone(), profile.version);
            let result = attempt(&*pool, &frame, profile.request_timeout).await;

            let error = match result {
                Ok(response) => return RowCursor::from_response(&response, address),
                Err(error) => error,
            };

            match failure_action(&error, profile.retry_policy, &query_info, retry_count) {
                FailureAction::MarkDown => {
                    debug!(%address, %error, "Node unreachable");
                    cluster.mark_node_down(&node);
                    errors.push((address, error));
                    continue 'next_node;
                }
                FailureAction::NextNode => {
                    debug!(%address, %error, "Trying next node");
                    errors.push((address, error));
                    continue 'next_node;
                }
                FailureAction::Surface => return Err(error),
                FailureAction::Decide(RetryDecision::Rethrow) => return Err(error),
                FailureAction::Decide(RetryDecision::Ignore) => {
                    debug!(%address, %error, "Ignoring failure");
                    return Ok(RowCursor::empty());
                }
                FailureAction::Decide(RetryDecision::Retry {
                    consistency,
                    same_node,
                }) => {
                    if retry_count >= profile.max_retries {
                        warn!(%address, %error, retry_count, "Retry limit reached");
                        return Err(error);
                    }

                    retry_count += 1;
                    if let Some(consistency) = consistency {
                        query_params.consistency = consistency;
                    }

                    debug!(
                        %address,
                        %error,
                        retry_count,
                        consistency = %query_params.consistency,
                        same_node,
                        "Retrying query"
                    );

                    if same_node {
                        continue;
                    }

                    errors.push((address, error));
                    continue 'next_node;
                }
            }
        }
    }

    if errors.is_empty() {
        Err(Error::EmptyQueryPlan)
    } else {
        Err(Error::NoHostAvailable { errors })
    }
}
