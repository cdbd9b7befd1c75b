//! Consistency reconciliation
//!
//! A create command's acknowledgment does not guarantee the entity is
//! visible to queries yet. Instead of the fixed-duration sleeps the calling
//! scripts used to insert before re-querying, [`await_visible`] retries an
//! idempotent read with bounded exponential backoff and fails with a
//! distinct error once the budget is exhausted. Only reads are ever
//! retried here; blind retry of a create risks duplicate entities.

use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::scene::{Node, NodeId};
use std::cmp;
use std::time::Duration;

/// Retry budget for [`await_visible`].
#[derive(Debug, Clone)]
pub struct SettleConfig {
    /// Maximum number of query attempts before giving up.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles each retry.
    pub initial_backoff: Duration,
    /// Upper bound on the per-retry delay.
    pub max_backoff: Duration,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_secs(1),
        }
    }
}

/// Repeatedly issue `query` until `predicate` accepts its result.
///
/// A [`ClientError::NotFound`] result counts as "not yet visible" and is
/// retried; every other error propagates immediately. Exhausting the
/// attempt budget fails with [`ClientError::ConsistencyTimeout`] rather
/// than hanging or returning an absent result.
pub async fn await_visible<T, Q, Fut, P>(
    mut query: Q,
    predicate: P,
    config: &SettleConfig,
) -> Result<T>
where
    Q: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    let mut backoff = config.initial_backoff;
    for attempt in 1..=config.max_attempts {
        match query().await {
            Ok(value) if predicate(&value) => return Ok(value),
            Ok(_) => {}
            Err(ClientError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }

        if attempt < config.max_attempts {
            tracing::debug!(
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "entity not yet visible, retrying"
            );
            tokio::time::sleep(backoff).await;
            backoff = cmp::min(backoff * 2, config.max_backoff);
        }
    }

    Err(ClientError::ConsistencyTimeout {
        attempts: config.max_attempts,
    })
}

impl Connection {
    /// [`Connection::find_by_name`] wrapped in the reconciler, for looking
    /// up entities that were just created.
    pub async fn find_by_name_settled(
        &self,
        name: &str,
        parent: Option<&NodeId>,
        depth: u32,
        settle: &SettleConfig,
    ) -> Result<Node> {
        await_visible(|| self.find_by_name(name, parent, depth), |_| true, settle).await
    }
}
