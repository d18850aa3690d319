//! Async timeout and cancellation wrappers.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default timeout for connecting and for individual send/receive operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default deadline for the whole handshake, from the first send to the live signal.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Run `future` and map an elapsed deadline to `ProtocolError::Timeout`.
pub async fn with_timeout_error<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

/// Run `future` unless `token` is cancelled first.
///
/// Cancellation resolves to `ProtocolError::ConnectionClosed` so callers waiting on
/// a read see an ordinary connection error.
pub async fn until_cancelled<F, T>(future: F, token: &CancellationToken) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ProtocolError::ConnectionClosed),
        result = future => result,
    }
}
