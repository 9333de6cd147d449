//! Queue error types.

use sysupgrade_core::Fingerprint;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Request(#[from] sysupgrade_core::Error),

    #[error("no job with fingerprint {0}")]
    NotFound(Fingerprint),

    /// The store could not be reached or rejected the statement.
    #[error("store unavailable: {0}")]
    Store(#[from] sqlx::Error),
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;
