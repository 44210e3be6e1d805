//! Deadline and cancellation helpers for otherwise unbounded waits.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{PeerError, Result};

/// Race `operation` against a `limit` deadline.
///
/// If the deadline fires first this fails with [`PeerError::Timeout`] and
/// `operation` is dropped, detaching whatever it was listening on. Otherwise
/// the operation's own output is returned unchanged.
pub async fn timeout<F>(operation: F, limit: Duration) -> Result<F::Output>
where
    F: Future,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(output) => Ok(output),
        Err(_) => {
            tracing::debug!(?limit, "operation timed out");
            Err(PeerError::Timeout(limit))
        }
    }
}

/// Run `operation` until it completes or `token` is cancelled.
///
/// Returns `None` on cancellation; the operation is dropped.
pub async fn until_cancelled<F>(token: &CancellationToken, operation: F) -> Option<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        output = operation => Some(output),
    }
}
