//! Build jobs and their lifecycle.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::{Error, Result};

/// Status of a queued build job.
///
/// Stored as an integer code; `Pending` is the only status a job can be claimed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[display("pending")]
    Pending,
    #[display("in progress")]
    InProgress,
    #[display("failed")]
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 3] = [JobStatus::Pending, JobStatus::InProgress, JobStatus::Failed];

    /// Integer code persisted in the `status` column.
    pub fn code(self) -> i32 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::InProgress => 1,
            JobStatus::Failed => 2,
        }
    }

    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(JobStatus::Pending),
            1 => Ok(JobStatus::InProgress),
            2 => Ok(JobStatus::Failed),
            other => Err(Error::InvalidStatus(other)),
        }
    }

    /// Apply a lifecycle event, rejecting anything outside
    /// `Pending -> InProgress` and `InProgress -> Failed`.
    ///
    /// Deletion is not an event: a job can be removed from any status.
    pub fn apply(self, event: JobEvent) -> Result<JobStatus> {
        match (self, event) {
            (JobStatus::Pending, JobEvent::Claim) => Ok(JobStatus::InProgress),
            (JobStatus::InProgress, JobEvent::Fail) => Ok(JobStatus::Failed),
            (from, event) => Err(Error::InvalidTransition { from, event }),
        }
    }
}

impl TryFrom<i32> for JobStatus {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self> {
        Self::from_code(code)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "in_progress" | "in-progress" => Ok(JobStatus::InProgress),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(Error::InvalidRequest {
                field: "status",
                reason: format!("unknown status {:?}", s),
            }),
        }
    }
}

/// Something that moves a job from one status to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum JobEvent {
    #[display("claim")]
    Claim,
    #[display("fail")]
    Fail,
}

impl JobEvent {
    /// The only status this event may be applied to.
    pub fn source(self) -> JobStatus {
        match self {
            JobEvent::Claim => JobStatus::Pending,
            JobEvent::Fail => JobStatus::InProgress,
        }
    }

    /// Status a job is left in after this event.
    pub fn target(self) -> JobStatus {
        match self {
            JobEvent::Claim => JobStatus::InProgress,
            JobEvent::Fail => JobStatus::Failed,
        }
    }
}

/// A job stored in the build queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildJob {
    pub id: i64,
    pub fingerprint: Fingerprint,
    pub distro: String,
    pub release: String,
    pub target: String,
    pub subtarget: String,
    pub profile: String,
    pub packages: Vec<String>,
    pub network_profile: String,
    pub status: JobStatus,
}

/// Result of submitting a request to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enqueued {
    pub id: i64,
    pub status: JobStatus,
    /// Whether this call inserted the row.
    pub created: bool,
}

/// What a submitter should tell its client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueOutcome {
    #[display("queued")]
    Queued,
    #[display("already queued")]
    AlreadyQueued,
    #[display("building")]
    Building,
    #[display("failed previously")]
    PreviouslyFailed,
}

impl Enqueued {
    pub fn outcome(&self) -> EnqueueOutcome {
        match (self.created, self.status) {
            (true, _) => EnqueueOutcome::Queued,
            (false, JobStatus::Pending) => EnqueueOutcome::AlreadyQueued,
            (false, JobStatus::InProgress) => EnqueueOutcome::Building,
            (false, JobStatus::Failed) => EnqueueOutcome::PreviouslyFailed,
        }
    }
}
