//! Build job queue for sysupgrade.
//!
//! Producers submit build requests, workers claim them oldest first.
//! All coordination happens in PostgreSQL: submission relies on the unique
//! fingerprint constraint and claiming on `FOR UPDATE SKIP LOCKED`.

pub mod error;
pub mod queue;
pub mod worker;

pub use error::{QueueError, QueueResult};
pub use queue::{BuildQueue, PgBuildQueue};
pub use worker::{BuildOutcome, ImageBuilder, Worker};
