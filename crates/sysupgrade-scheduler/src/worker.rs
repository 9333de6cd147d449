//! Worker that processes jobs from the queue.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use sysupgrade_config::WorkerConfig;
use sysupgrade_core::BuildJob;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::QueueResult;
use crate::queue::BuildQueue;

/// Builds the image for a claimed job.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Build and store the image. An error message marks the job failed.
    async fn build(&self, job: &BuildJob) -> Result<(), String>;
}

/// What a single worker iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The queue had no pending job.
    Idle,
    /// The image was built and the job removed from the queue.
    Built(BuildJob),
    /// The build failed and the job was marked failed.
    Failed { job: BuildJob, message: String },
}

/// A worker that claims and builds jobs.
pub struct Worker {
    id: String,
    queue: Arc<dyn BuildQueue>,
    builder: Arc<dyn ImageBuilder>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        queue: Arc<dyn BuildQueue>,
        builder: Arc<dyn ImageBuilder>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            id: id.into(),
            queue,
            builder,
            config,
        }
    }

    /// Claim one job, build it and report the result.
    pub async fn run_once(&self) -> QueueResult<BuildOutcome> {
        let Some(job) = self.queue.claim_next().await? else {
            return Ok(BuildOutcome::Idle);
        };

        info!(worker_id = %self.id, fingerprint = %job.fingerprint, job_id = job.id, "Building image");
        match self.builder.build(&job).await {
            Ok(()) => {
                if self.queue.delete(&job.fingerprint).await? {
                    info!(worker_id = %self.id, fingerprint = %job.fingerprint, "Image built");
                } else {
                    warn!(worker_id = %self.id, fingerprint = %job.fingerprint, "Image built, but its job was already removed");
                }
                Ok(BuildOutcome::Built(job))
            }
            Err(message) => {
                error!(worker_id = %self.id, fingerprint = %job.fingerprint, error = %message, "Image build failed");
                let job = self.queue.mark_failed(&job.fingerprint).await?;
                Ok(BuildOutcome::Failed { job, message })
            }
        }
    }

    /// Run the worker loop until `shutdown` resolves.
    ///
    /// A build in progress is finished before the loop stops.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) {
        info!(worker_id = %self.id, "Starting worker");
        tokio::pin!(shutdown);

        loop {
            let delay = match self.run_once().await {
                Ok(BuildOutcome::Idle) => Some(self.config.idle_interval),
                Ok(_) => None,
                Err(e) => {
                    warn!(worker_id = %self.id, error = %e, "Failed to process job");
                    Some(self.config.error_backoff)
                }
            };

            tokio::select! {
                _ = &mut shutdown => break,
                _ = sleep(delay.unwrap_or_default()) => {}
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    /// Run the worker loop forever.
    pub async fn run(&self) {
        self.run_until(std::future::pending()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QueueError;
    use std::sync::Mutex;
    use std::time::Duration;
    use sysupgrade_core::{BuildRequest, Enqueued, Fingerprint, JobEvent, JobStatus};

    /// In-memory stand-in for the database queue.
    #[derive(Default)]
    struct MockQueue {
        jobs: Mutex<Vec<BuildJob>>,
        fail_claims: bool,
    }

    impl MockQueue {
        fn with_jobs(fingerprints: &[&str]) -> Self {
            let jobs = fingerprints
                .iter()
                .zip(1..)
                .map(|(hash, id)| BuildJob {
                    id,
                    fingerprint: Fingerprint::parse(hash).unwrap(),
                    distro: "openwrt".to_string(),
                    release: "23.05".to_string(),
                    target: "x86".to_string(),
                    subtarget: "64".to_string(),
                    profile: "generic".to_string(),
                    packages: vec!["base-files".to_string()],
                    network_profile: "default".to_string(),
                    status: JobStatus::Pending,
                })
                .collect();
            Self {
                jobs: Mutex::new(jobs),
                fail_claims: false,
            }
        }

        fn status_of(&self, hash: &str) -> Option<JobStatus> {
            self.jobs
                .lock()
                .unwrap()
                .iter()
                .find(|j| j.fingerprint.as_str() == hash)
                .map(|j| j.status)
        }
    }

    #[async_trait]
    impl BuildQueue for MockQueue {
        async fn enqueue(&self, _request: &BuildRequest) -> QueueResult<Enqueued> {
            unimplemented!()
        }

        async fn claim_next(&self) -> QueueResult<Option<BuildJob>> {
            if self.fail_claims {
                return Err(QueueError::Store(sqlx::Error::PoolTimedOut));
            }
            let mut jobs = self.jobs.lock().unwrap();
            Ok(jobs
                .iter_mut()
                .find(|j| j.status == JobStatus::Pending)
                .map(|job| {
                    job.status = job.status.apply(JobEvent::Claim).unwrap();
                    job.clone()
                }))
        }

        async fn mark_failed(&self, fingerprint: &Fingerprint) -> QueueResult<BuildJob> {
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs
                .iter_mut()
                .find(|j| &j.fingerprint == fingerprint)
                .ok_or_else(|| QueueError::NotFound(fingerprint.clone()))?;
            job.status = job.status.apply(JobEvent::Fail)?;
            Ok(job.clone())
        }

        async fn delete(&self, fingerprint: &Fingerprint) -> QueueResult<bool> {
            let mut jobs = self.jobs.lock().unwrap();
            let before = jobs.len();
            jobs.retain(|j| &j.fingerprint != fingerprint);
            Ok(jobs.len() < before)
        }

        async fn get(&self, fingerprint: &Fingerprint) -> QueueResult<Option<BuildJob>> {
            let jobs = self.jobs.lock().unwrap();
            Ok(jobs.iter().find(|j| &j.fingerprint == fingerprint).cloned())
        }

        async fn count(&self, status: JobStatus) -> QueueResult<i64> {
            let jobs = self.jobs.lock().unwrap();
            Ok(jobs.iter().filter(|j| j.status == status).count() as i64)
        }

        async fn list(&self, _status: JobStatus, _limit: i64) -> QueueResult<Vec<BuildJob>> {
            unimplemented!()
        }
    }

    /// Fails builds for fingerprints in `broken`, succeeds otherwise.
    struct MockBuilder {
        broken: Vec<String>,
        built: Mutex<Vec<i64>>,
    }

    impl MockBuilder {
        fn new(broken: &[&str]) -> Self {
            Self {
                broken: broken.iter().map(|s| s.to_string()).collect(),
                built: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ImageBuilder for MockBuilder {
        async fn build(&self, job: &BuildJob) -> Result<(), String> {
            self.built.lock().unwrap().push(job.id);
            if self.broken.iter().any(|b| b == job.fingerprint.as_str()) {
                Err("package conflict".to_string())
            } else {
                Ok(())
            }
        }
    }

    /// Succeeds after deleting the job from under the worker.
    struct DeletingBuilder {
        queue: Arc<MockQueue>,
    }

    #[async_trait]
    impl ImageBuilder for DeletingBuilder {
        async fn build(&self, job: &BuildJob) -> Result<(), String> {
            self.queue
                .delete(&job.fingerprint)
                .await
                .map_err(|e| e.to_string())?;
            Ok(())
        }
    }

    fn worker(queue: Arc<MockQueue>, builder: Arc<dyn ImageBuilder>) -> Worker {
        let config = WorkerConfig {
            idle_interval: Duration::from_millis(5),
            error_backoff: Duration::from_millis(5),
        };
        Worker::new("test-worker", queue, builder, config)
    }

    #[tokio::test]
    async fn test_successful_build_deletes_job() {
        let queue = Arc::new(MockQueue::with_jobs(&["aaaaaaaaaaaa"]));
        let builder = Arc::new(MockBuilder::new(&[]));
        let worker = worker(queue.clone(), builder.clone());

        match worker.run_once().await.unwrap() {
            BuildOutcome::Built(job) => assert_eq!(job.id, 1),
            other => panic!("expected built, got {:?}", other),
        }
        assert_eq!(queue.status_of("aaaaaaaaaaaa"), None);
    }

    #[tokio::test]
    async fn test_failed_build_marks_job_failed() {
        let queue = Arc::new(MockQueue::with_jobs(&["bbbbbbbbbbbb"]));
        let builder = Arc::new(MockBuilder::new(&["bbbbbbbbbbbb"]));
        let worker = worker(queue.clone(), builder);

        match worker.run_once().await.unwrap() {
            BuildOutcome::Failed { job, message } => {
                assert_eq!(job.status, JobStatus::Failed);
                assert_eq!(message, "package conflict");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(queue.status_of("bbbbbbbbbbbb"), Some(JobStatus::Failed));

        // A failed job is never handed out again.
        assert_eq!(worker.run_once().await.unwrap(), BuildOutcome::Idle);
    }

    #[tokio::test]
    async fn test_build_of_removed_job_still_succeeds() {
        let queue = Arc::new(MockQueue::with_jobs(&["cccccccccccc"]));
        let builder = Arc::new(DeletingBuilder {
            queue: queue.clone(),
        });
        let worker = worker(queue.clone(), builder);

        match worker.run_once().await.unwrap() {
            BuildOutcome::Built(job) => assert_eq!(job.fingerprint.as_str(), "cccccccccccc"),
            other => panic!("expected built, got {:?}", other),
        }
        assert_eq!(queue.status_of("cccccccccccc"), None);
    }

    #[tokio::test]
    async fn test_empty_queue_is_idle() {
        let queue = Arc::new(MockQueue::default());
        let worker = worker(queue, Arc::new(MockBuilder::new(&[])));
        assert_eq!(worker.run_once().await.unwrap(), BuildOutcome::Idle);
    }

    #[tokio::test]
    async fn test_store_error_is_propagated() {
        let queue = Arc::new(MockQueue {
            fail_claims: true,
            ..Default::default()
        });
        let worker = worker(queue, Arc::new(MockBuilder::new(&[])));
        assert!(matches!(
            worker.run_once().await,
            Err(QueueError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_run_until_drains_queue_in_order() {
        let queue = Arc::new(MockQueue::with_jobs(&[
            "111111111111",
            "222222222222",
            "333333333333",
        ]));
        let builder = Arc::new(MockBuilder::new(&["222222222222"]));
        let worker = worker(queue.clone(), builder.clone());

        let watched = queue.clone();
        let drained = async move {
            while watched.count(JobStatus::Pending).await.unwrap() > 0 {
                sleep(Duration::from_millis(1)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), worker.run_until(drained))
            .await
            .expect("worker did not stop");

        assert_eq!(*builder.built.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(queue.status_of("111111111111"), None);
        assert_eq!(queue.status_of("222222222222"), Some(JobStatus::Failed));
        assert_eq!(queue.status_of("333333333333"), None);
    }
}
