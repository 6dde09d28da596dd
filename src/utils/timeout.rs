//! Deadline helpers.
//!
//! The protocol core never times out on its own; these wrappers are applied at the
//! transport edge (connect, handshake, shutdown drain).

use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Default deadline for establishing a connection
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default deadline for a peer to finish the handshake
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time allowed for sessions to drain on shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `future`, failing with [`ProtocolError::Timeout`] if it outlives `duration`.
pub async fn with_timeout<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| ProtocolError::Timeout)
}

/// Like [`with_timeout`] for futures that already return a protocol `Result`.
pub async fn with_timeout_error<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    with_timeout(future, duration).await?
}
