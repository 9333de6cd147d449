//! Build queue backed by PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;
use sysupgrade_core::{
    BuildJob, BuildRequest, Enqueued, Fingerprint, JobEvent, JobStatus, NormalizedRequest,
};
use tracing::{debug, info, warn};

use crate::{QueueError, QueueResult};

/// Operations request handlers and workers perform on the queue.
#[async_trait]
pub trait BuildQueue: Send + Sync {
    /// Submit a request. Returns the existing job when an equivalent request is already queued.
    async fn enqueue(&self, request: &BuildRequest) -> QueueResult<Enqueued>;

    /// Claim the oldest pending job, or `None` when there is no work.
    async fn claim_next(&self) -> QueueResult<Option<BuildJob>>;

    /// Record a build failure for a claimed job.
    ///
    /// Only an in-progress job can fail. A pending or already failed job is left
    /// untouched and yields `InvalidTransition`; a missing one yields `NotFound`.
    async fn mark_failed(&self, fingerprint: &Fingerprint) -> QueueResult<BuildJob>;

    /// Remove a job in any status. Returns whether it existed.
    async fn delete(&self, fingerprint: &Fingerprint) -> QueueResult<bool>;

    async fn get(&self, fingerprint: &Fingerprint) -> QueueResult<Option<BuildJob>>;

    async fn count(&self, status: JobStatus) -> QueueResult<i64>;

    /// Jobs in `status`, oldest first.
    async fn list(&self, status: JobStatus, limit: i64) -> QueueResult<Vec<BuildJob>>;
}

/// A row of the `build_queue` table.
#[derive(Debug, sqlx::FromRow)]
struct QueueRow {
    id: i64,
    image_hash: String,
    distro: String,
    release: String,
    target: String,
    subtarget: String,
    profile: String,
    packages: String,
    network_profile: String,
    status: i32,
}

impl TryFrom<QueueRow> for BuildJob {
    type Error = sysupgrade_core::Error;

    fn try_from(row: QueueRow) -> Result<Self, Self::Error> {
        Ok(BuildJob {
            id: row.id,
            fingerprint: Fingerprint::parse(&row.image_hash)?,
            distro: row.distro,
            release: row.release,
            target: row.target,
            subtarget: row.subtarget,
            profile: row.profile,
            packages: row.packages.split_whitespace().map(String::from).collect(),
            network_profile: row.network_profile,
            status: JobStatus::from_code(row.status)?,
        })
    }
}

fn into_job(row: QueueRow) -> QueueResult<BuildJob> {
    Ok(BuildJob::try_from(row)?)
}

/// PostgreSQL implementation of BuildQueue.
pub struct PgBuildQueue {
    pool: PgPool,
    hash_length: usize,
}

impl PgBuildQueue {
    /// Create a queue. `hash_length` is the number of hex digits kept from each request hash.
    pub fn new(pool: PgPool, hash_length: usize) -> QueueResult<Self> {
        sysupgrade_core::fingerprint::check_length(hash_length)?;
        Ok(Self { pool, hash_length })
    }

    /// Normalize a request and compute the fingerprint it is queued under.
    pub fn fingerprint(&self, request: &BuildRequest) -> QueueResult<(NormalizedRequest, Fingerprint)> {
        let normalized = request.normalize()?;
        let fingerprint = Fingerprint::compute(&normalized, self.hash_length)?;
        Ok((normalized, fingerprint))
    }

    async fn fail_if_in_progress(&self, fingerprint: &Fingerprint) -> QueueResult<Option<BuildJob>> {
        let event = JobEvent::Fail;
        let row = sqlx::query_as::<_, QueueRow>(
            r#"
            UPDATE build_queue
            SET status = $1
            WHERE image_hash = $2 AND status = $3
            RETURNING *
            "#,
        )
        .bind(event.target().code())
        .bind(fingerprint.as_str())
        .bind(event.source().code())
        .fetch_optional(&self.pool)
        .await?;
        row.map(into_job).transpose()
    }
}

#[async_trait]
impl BuildQueue for PgBuildQueue {
    async fn enqueue(&self, request: &BuildRequest) -> QueueResult<Enqueued> {
        let (normalized, fingerprint) = self.fingerprint(request)?;
        let coords = normalized.coords();

        // The no-op update makes RETURNING yield the existing row on conflict.
        // xmax is zero only for a row version created by this statement's insert.
        let (id, status, created) = sqlx::query_as::<_, (i64, i32, bool)>(
            r#"
            INSERT INTO build_queue
                (image_hash, distro, release, target, subtarget, profile, packages, network_profile, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (image_hash) DO UPDATE SET id = build_queue.id
            RETURNING id, status, (xmax = 0) AS created
            "#,
        )
        .bind(fingerprint.as_str())
        .bind(&coords.distro)
        .bind(&coords.release)
        .bind(&coords.target)
        .bind(&coords.subtarget)
        .bind(normalized.profile())
        .bind(normalized.packages_joined())
        .bind(normalized.network_profile())
        .bind(JobStatus::Pending.code())
        .fetch_one(&self.pool)
        .await?;

        let enqueued = Enqueued {
            id,
            status: JobStatus::from_code(status)?,
            created,
        };
        info!(
            fingerprint = %fingerprint,
            job_id = id,
            outcome = %enqueued.outcome(),
            "Enqueued build request"
        );
        Ok(enqueued)
    }

    async fn claim_next(&self) -> QueueResult<Option<BuildJob>> {
        let event = JobEvent::Claim;
        // SKIP LOCKED keeps concurrent claimers off each other's rows.
        let row = sqlx::query_as::<_, QueueRow>(
            r#"
            UPDATE build_queue
            SET status = $1
            WHERE id = (
                SELECT id FROM build_queue
                WHERE status = $2
                ORDER BY id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(event.target().code())
        .bind(event.source().code())
        .fetch_optional(&self.pool)
        .await?;

        let job = row.map(into_job).transpose()?;
        match &job {
            Some(job) => info!(fingerprint = %job.fingerprint, job_id = job.id, "Claimed build job"),
            None => debug!("No pending build jobs"),
        }
        Ok(job)
    }

    async fn mark_failed(&self, fingerprint: &Fingerprint) -> QueueResult<BuildJob> {
        // Statuses only move forward, so this retries at most once: when a
        // claim lands between the conditional update and the lookup.
        loop {
            if let Some(job) = self.fail_if_in_progress(fingerprint).await? {
                warn!(fingerprint = %fingerprint, job_id = job.id, "Build job failed");
                return Ok(job);
            }

            let job = self
                .get(fingerprint)
                .await?
                .ok_or_else(|| QueueError::NotFound(fingerprint.clone()))?;
            job.status.apply(JobEvent::Fail)?;
        }
    }

    async fn delete(&self, fingerprint: &Fingerprint) -> QueueResult<bool> {
        let result = sqlx::query("DELETE FROM build_queue WHERE image_hash = $1")
            .bind(fingerprint.as_str())
            .execute(&self.pool)
            .await?;
        let deleted = result.rows_affected() > 0;
        info!(fingerprint = %fingerprint, deleted, "Deleted build job");
        Ok(deleted)
    }

    async fn get(&self, fingerprint: &Fingerprint) -> QueueResult<Option<BuildJob>> {
        let row = sqlx::query_as::<_, QueueRow>("SELECT * FROM build_queue WHERE image_hash = $1")
            .bind(fingerprint.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(into_job).transpose()
    }

    async fn count(&self, status: JobStatus) -> QueueResult<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM build_queue WHERE status = $1")
                .bind(status.code())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn list(&self, status: JobStatus, limit: i64) -> QueueResult<Vec<BuildJob>> {
        let rows = sqlx::query_as::<_, QueueRow>(
            "SELECT * FROM build_queue WHERE status = $1 ORDER BY id ASC LIMIT $2",
        )
        .bind(status.code())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(into_job).collect()
    }
}
