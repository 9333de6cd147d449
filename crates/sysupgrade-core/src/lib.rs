//! Core domain types for the sysupgrade build queue.
//!
//! This crate contains:
//! - Build requests and their canonical form
//! - Content fingerprints used as job identity
//! - The job lifecycle state machine

pub mod error;
pub mod fingerprint;
pub mod job;
pub mod request;

pub use error::{Error, Result};
pub use fingerprint::{DEFAULT_HASH_LENGTH, Fingerprint};
pub use job::{BuildJob, EnqueueOutcome, Enqueued, JobEvent, JobStatus};
pub use request::{BuildRequest, NormalizedRequest, TargetCoords};
