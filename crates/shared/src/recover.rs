use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CallError<E> {
    #[error("{operation} timed out after {timeout_ms}ms")]
    TimedOut {
        operation: &'static str,
        timeout_ms: u64,
    },
    #[error("{operation} failed: {source}")]
    Failed {
        operation: &'static str,
        #[source]
        source: E,
    },
}

/// Bounds an external call by `timeout` and logs any failure once, here.
/// Callers decide which documented default to substitute on error.
pub async fn guarded_call<T, E, F>(
    operation: &'static str,
    timeout: Duration,
    future: F,
) -> Result<T, CallError<E>>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => {
            warn!(operation, error = %source, "external call failed");
            Err(CallError::Failed { operation, source })
        }
        Err(_) => {
            warn!(operation, timeout_ms, "external call timed out");
            Err(CallError::TimedOut {
                operation,
                timeout_ms,
            })
        }
    }
}
