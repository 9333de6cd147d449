//! Error types for sysupgrade.

use thiserror::Error;

use crate::job::{JobEvent, JobStatus};

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request: {field} {reason}")]
    InvalidRequest { field: &'static str, reason: String },

    #[error("cannot {event} a job that is {from}")]
    InvalidTransition { from: JobStatus, event: JobEvent },

    #[error("invalid job status code: {0}")]
    InvalidStatus(i32),

    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),
}

pub type Result<T> = std::result::Result<T, Error>;
