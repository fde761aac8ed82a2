//! Deadline helper for backend and negotiation calls.

use std::future::Future;
use std::time::Duration;

use crate::error::{CallError, Result};

/// Bound `future` by `limit`. An overrun yields [`CallError::Timeout`].
pub async fn with_timeout<T>(
    limit: Duration,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, future).await.unwrap_or_else(|_| {
        let millis = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
        tracing::warn!(timeout_ms = millis, "Operation timed out");
        Err(CallError::Timeout(millis))
    })
}
