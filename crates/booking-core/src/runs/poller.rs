use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use super::backend::{PendingJob, RunBackend, RunBackendError};

/// Bounded wait for a run to leave the queued/in-progress states.
///
/// Hitting the attempt ceiling is not an error: the last observed job is
/// returned and the caller decides how to present it.
#[derive(Debug, Clone, Copy)]
pub struct RunPoller {
    interval: Duration,
    max_attempts: u32,
}

impl RunPoller {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn await_terminal(
        &self,
        backend: &dyn RunBackend,
        job: PendingJob,
    ) -> Result<PendingJob, RunBackendError> {
        let mut job = job;
        let mut attempts = 0_u32;

        while !job.status.stops_polling() && attempts < self.max_attempts {
            sleep(self.interval).await;
            job = backend.fetch_run(&job.thread_id, &job.id).await?;
            attempts = attempts.saturating_add(1);
        }

        if job.status.stops_polling() {
            debug!(job_id = %job.id, status = job.status.as_str(), attempts, "run settled");
        } else {
            warn!(
                job_id = %job.id,
                status = job.status.as_str(),
                attempts,
                "run polling exhausted before a terminal status"
            );
        }

        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::sync::Mutex;

    use super::*;
    use crate::models::ChatTurn;
    use crate::runs::backend::{JobStatus, RunBackendFuture, ToolOutputSubmission};

    struct ScriptedRuns {
        statuses: Mutex<VecDeque<JobStatus>>,
        fallback: JobStatus,
        fetches: AtomicU32,
    }

    impl ScriptedRuns {
        fn new(statuses: Vec<JobStatus>, fallback: JobStatus) -> Self {
            Self {
                statuses: Mutex::new(VecDeque::from(statuses)),
                fallback,
                fetches: AtomicU32::new(0),
            }
        }
    }

    fn job(status: JobStatus) -> PendingJob {
        PendingJob {
            id: "run-1".to_string(),
            thread_id: "thread-1".to_string(),
            status,
            required_tool_calls: Vec::new(),
            last_error: None,
        }
    }

    impl RunBackend for ScriptedRuns {
        fn create_thread<'a>(&'a self) -> RunBackendFuture<'a, String> {
            Box::pin(async { Ok("thread-1".to_string()) })
        }

        fn append_message<'a>(
            &'a self,
            _thread_id: &'a str,
            _turn: &'a ChatTurn,
        ) -> RunBackendFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }

        fn start_run<'a>(
            &'a self,
            _thread_id: &'a str,
            _instructions: &'a str,
        ) -> RunBackendFuture<'a, PendingJob> {
            Box::pin(async { Ok(job(JobStatus::Queued)) })
        }

        fn fetch_run<'a>(
            &'a self,
            _thread_id: &'a str,
            _run_id: &'a str,
        ) -> RunBackendFuture<'a, PendingJob> {
            Box::pin(async move {
                self.fetches.fetch_add(1, Ordering::SeqCst);
                let status = self
                    .statuses
                    .lock()
                    .await
                    .pop_front()
                    .unwrap_or(self.fallback);
                Ok(job(status))
            })
        }

        fn submit_tool_outputs<'a>(
            &'a self,
            _thread_id: &'a str,
            _run_id: &'a str,
            _outputs: Vec<ToolOutputSubmission>,
        ) -> RunBackendFuture<'a, PendingJob> {
            Box::pin(async { Ok(job(JobStatus::Queued)) })
        }

        fn latest_reply<'a>(&'a self, _thread_id: &'a str) -> RunBackendFuture<'a, Option<String>> {
            Box::pin(async { Ok(None) })
        }
    }

    #[tokio::test]
    async fn stops_at_first_actionable_status() {
        let backend = ScriptedRuns::new(
            vec![JobStatus::InProgress, JobStatus::RequiresAction],
            JobStatus::Completed,
        );
        let poller = RunPoller::new(Duration::ZERO, 10);

        let settled = poller
            .await_terminal(&backend, job(JobStatus::Queued))
            .await
            .expect("polling should succeed");

        assert_eq!(settled.status, JobStatus::RequiresAction);
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn settled_job_is_returned_without_polling() {
        let backend = ScriptedRuns::new(Vec::new(), JobStatus::Queued);
        let poller = RunPoller::new(Duration::ZERO, 10);

        let settled = poller
            .await_terminal(&backend, job(JobStatus::Completed))
            .await
            .expect("polling should succeed");

        assert_eq!(settled.status, JobStatus::Completed);
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn returns_last_status_at_attempt_ceiling() {
        let backend = ScriptedRuns::new(Vec::new(), JobStatus::InProgress);
        let poller = RunPoller::new(Duration::from_millis(1), 4);

        let settled = poller
            .await_terminal(&backend, job(JobStatus::Queued))
            .await
            .expect("exhaustion should not be an error");

        assert_eq!(settled.status, JobStatus::InProgress);
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 4);
    }
}
