//! Drives a provider-side job to a terminal state.

use crate::error::Result;
use crate::types::{Failure, FailureCategory};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::time::{sleep, Instant};

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl JobStatus {
    /// Maps a provider status string. Anything unrecognised is still in flight.
    pub fn from_wire(status: &str) -> Self {
        match status {
            "starting" | "pending" | "queued" => JobStatus::Pending,
            "succeeded" => JobStatus::Succeeded,
            "failed" => JobStatus::Failed,
            "canceled" | "cancelled" => JobStatus::Canceled,
            _ => JobStatus::Running,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Canceled
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollableJob {
    pub id: String,
    pub status: JobStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
}

/// Where the poller reads job state from.
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn fetch(&self, id: &str) -> Result<PollableJob>;
}

#[derive(Debug, Clone, Copy)]
pub struct Poller {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            timeout: POLL_TIMEOUT,
        }
    }
}

impl Poller {
    /// Polls until `job` is terminal.
    ///
    /// `started` is the moment the job was submitted; the deadline is measured
    /// from there. Returns the succeeded job, or the failure that ended it. A
    /// fetch error ends polling immediately.
    pub async fn wait(
        &self,
        source: &dyn JobSource,
        mut job: PollableJob,
        started: Instant,
    ) -> std::result::Result<PollableJob, Failure> {
        while !job.status.is_terminal() {
            if started.elapsed() > self.timeout {
                tracing::warn!(job = %job.id, "job exceeded poll deadline, abandoning");
                return Err(Failure::new(
                    FailureCategory::Timeout,
                    format!(
                        "Prediction timed out after {} minutes",
                        self.timeout.as_secs() / 60
                    ),
                ));
            }

            sleep(self.interval).await;

            let next = source.fetch(&job.id).await.map_err(|e| {
                Failure::new(
                    FailureCategory::PollError,
                    format!("Failed to poll prediction: {e}"),
                )
            })?;
            if next.status != job.status {
                tracing::debug!(job = %next.id, status = ?next.status, "job status changed");
            }
            job = next;
        }

        match job.status {
            JobStatus::Failed => Err(Failure::new(
                FailureCategory::JobFailed,
                job.error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| "Prediction failed".to_string()),
            )),
            JobStatus::Canceled => Err(Failure::new(
                FailureCategory::Canceled,
                "Prediction was canceled",
            )),
            _ => Ok(job),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Scripted {
        statuses: Mutex<VecDeque<Result<PollableJob>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(steps: Vec<Result<PollableJob>>) -> Self {
            Self {
                statuses: Mutex::new(steps.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl JobSource for Scripted {
        async fn fetch(&self, id: &str) -> Result<PollableJob> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(job(id, JobStatus::Running)))
        }
    }

    fn job(id: &str, status: JobStatus) -> PollableJob {
        PollableJob {
            id: id.to_string(),
            status,
            output: None,
            error: None,
        }
    }

    #[test]
    fn wire_statuses() {
        assert_eq!(JobStatus::from_wire("starting"), JobStatus::Pending);
        assert_eq!(JobStatus::from_wire("processing"), JobStatus::Running);
        assert_eq!(JobStatus::from_wire("canceled"), JobStatus::Canceled);
        assert!(JobStatus::from_wire("succeeded").is_terminal());
        assert!(!JobStatus::from_wire("processing").is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn runs_until_succeeded() {
        let mut done = job("p1", JobStatus::Succeeded);
        done.output = Some(Value::String("https://cdn/out.png".into()));
        let source = Scripted::new(vec![Ok(job("p1", JobStatus::Running)), Ok(done)]);

        let result = Poller::default()
            .wait(&source, job("p1", JobStatus::Pending), Instant::now())
            .await
            .unwrap();
        assert_eq!(result.status, JobStatus::Succeeded);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn running_past_deadline_times_out() {
        let source = Scripted::new(Vec::new());
        let started = Instant::now();
        let failure = Poller::default()
            .wait(&source, job("slow", JobStatus::Running), started)
            .await
            .unwrap_err();
        assert_eq!(failure.category, FailureCategory::Timeout);
        assert_eq!(failure.message, "Prediction timed out after 5 minutes");
        assert!(started.elapsed() > POLL_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_and_canceled_are_distinct() {
        let mut failed = job("f", JobStatus::Failed);
        failed.error = Some("CUDA out of memory".into());
        let failure = Poller::default()
            .wait(&Scripted::new(Vec::new()), failed, Instant::now())
            .await
            .unwrap_err();
        assert_eq!(failure.category, FailureCategory::JobFailed);
        assert_eq!(failure.message, "CUDA out of memory");

        let failure = Poller::default()
            .wait(
                &Scripted::new(Vec::new()),
                job("f", JobStatus::Failed),
                Instant::now(),
            )
            .await
            .unwrap_err();
        assert_eq!(failure.message, "Prediction failed");

        let failure = Poller::default()
            .wait(
                &Scripted::new(Vec::new()),
                job("c", JobStatus::Canceled),
                Instant::now(),
            )
            .await
            .unwrap_err();
        assert_eq!(failure.category, FailureCategory::Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_error_is_not_retried() {
        let source = Scripted::new(vec![Err(ProviderError::http("http 503: unavailable"))]);
        let failure = Poller::default()
            .wait(&source, job("p", JobStatus::Running), Instant::now())
            .await
            .unwrap_err();
        assert_eq!(failure.category, FailureCategory::PollError);
        assert!(failure.message.contains("503"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
