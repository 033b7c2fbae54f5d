use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::jobs::{AsyncJob, JobSnapshot, JobStatus, PollPolicy};

/// Identifies the vendor job stream being polled.
#[derive(Debug, Clone, Copy)]
pub struct JobTarget<'a> {
    /// Human-readable service name used in messages and details.
    pub service: &'a str,
    /// Prefix for the `<VENDOR>_ERROR` code raised on vendor failures.
    pub vendor: &'a str,
    pub policy: PollPolicy,
}

/// Submit-then-poll driver shared by every media tool.
///
/// The poller owns only the loop: sleep, check, classify. How a job is
/// submitted and how a status response is read are supplied by the caller,
/// so the same loop drives any vendor.
#[derive(Clone)]
pub struct JobPoller {
    clock: Arc<dyn Clock>,
}

impl JobPoller {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn submit_and_await<S, SFut, P, PFut>(
        &self,
        target: &JobTarget<'_>,
        submit: S,
        mut check_status: P,
    ) -> Result<AsyncJob>
    where
        S: FnOnce() -> SFut,
        SFut: Future<Output = Result<Option<String>>>,
        P: FnMut(String) -> PFut,
        PFut: Future<Output = Result<JobSnapshot>>,
    {
        let job_id = submit()
            .await?
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                Error::vendor(
                    target.vendor,
                    format!("{} did not return a job id", target.service),
                )
                .with_details(json!({ "service": target.service }))
            })?;

        info!("Submitted {} job {}", target.service, job_id);

        let policy = target.policy;
        let mut last_status = "submitted".to_string();

        for poll in 1..=policy.max_polls {
            self.clock.sleep(policy.interval).await;

            let snapshot = check_status(job_id.clone()).await?;
            debug!(
                "{} job {} poll {}/{}: {}",
                target.service, job_id, poll, policy.max_polls, snapshot.vendor_status
            );
            last_status = snapshot.vendor_status.clone();

            match snapshot.status {
                JobStatus::Succeeded => {
                    if snapshot.outputs.is_empty() {
                        return Err(Error::vendor(
                            target.vendor,
                            format!("{} job completed without output", target.service),
                        )
                        .with_details(json!({
                            "service": target.service,
                            "jobId": job_id,
                        })));
                    }

                    info!(
                        "{} job {} succeeded after {} polls with {} output(s)",
                        target.service,
                        job_id,
                        poll,
                        snapshot.outputs.len()
                    );
                    return Ok(AsyncJob {
                        job_id,
                        status: JobStatus::Succeeded,
                        result_url: snapshot.outputs.first().cloned(),
                        outputs: snapshot.outputs,
                        error_detail: None,
                        polls: poll,
                    });
                }
                JobStatus::Failed | JobStatus::Canceled => {
                    let detail = snapshot
                        .error
                        .clone()
                        .unwrap_or_else(|| format!("job {}", snapshot.status.as_str()));
                    warn!("{} job {} {}: {}", target.service, job_id, snapshot.status.as_str(), detail);

                    return Err(Error::vendor(
                        target.vendor,
                        format!("{} job {}: {}", target.service, snapshot.status.as_str(), detail),
                    )
                    .with_details(json!({
                        "service": target.service,
                        "jobId": job_id,
                        "status": snapshot.vendor_status,
                        "errorDetail": detail,
                    })));
                }
                JobStatus::Pending | JobStatus::Timeout => {}
            }
        }

        let max_wait_ms = policy.max_wait().as_millis() as u64;
        warn!(
            "{} job {} timed out after {} polls (last status {})",
            target.service, job_id, policy.max_polls, last_status
        );

        Err(Error::timeout(format!(
            "{} job {} did not complete within {}ms",
            target.service, job_id, max_wait_ms
        ))
        .with_details(json!({
            "service": target.service,
            "jobId": job_id,
            "polls": policy.max_polls,
            "lastStatus": last_status,
            "maxWaitMs": max_wait_ms,
        })))
    }
}

/// Results of running N independent jobs one after another.
#[derive(Debug, Default)]
pub struct VariationOutcome {
    pub succeeded: Vec<(u32, AsyncJob)>,
    pub failed: Vec<(u32, Error)>,
}

impl VariationOutcome {
    pub fn is_partial(&self) -> bool {
        !self.succeeded.is_empty() && !self.failed.is_empty()
    }
}

/// Run `count` variations sequentially. A failed variation never stops the
/// remaining ones; indices are 1-based.
pub async fn run_variations<F, Fut>(count: u32, mut run: F) -> VariationOutcome
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<AsyncJob>>,
{
    let mut outcome = VariationOutcome::default();
    for index in 1..=count {
        match run(index).await {
            Ok(job) => outcome.succeeded.push((index, job)),
            Err(err) => {
                warn!("Variation {}/{} failed: {}", index, count, err);
                outcome.failed.push((index, err));
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorCode;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn target(max_polls: u32) -> JobTarget<'static> {
        JobTarget {
            service: "Replicate",
            vendor: "REPLICATE",
            policy: PollPolicy::new(Duration::from_millis(2_000), max_polls),
        }
    }

    struct Script {
        statuses: Mutex<VecDeque<JobSnapshot>>,
        checks: AtomicU32,
    }

    impl Script {
        fn new(statuses: Vec<JobSnapshot>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                checks: AtomicU32::new(0),
            }
        }

        async fn next(&self, _job_id: String) -> Result<JobSnapshot> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .statuses
                .lock()
                .pop_front()
                .unwrap_or_else(|| JobSnapshot::pending("processing")))
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_pending_polls() {
        let clock = Arc::new(ManualClock::new(0));
        let poller = JobPoller::new(clock.clone());
        let script = Script::new(vec![
            JobSnapshot::pending("starting"),
            JobSnapshot::pending("processing"),
            JobSnapshot::succeeded(vec!["https://cdn/out.png".to_string()]),
        ]);

        let job = poller
            .submit_and_await(
                &target(60),
                || async { Ok(Some("pred-1".to_string())) },
                |id| script.next(id),
            )
            .await
            .unwrap();

        assert_eq!(job.job_id, "pred-1");
        assert_eq!(job.result_url.as_deref(), Some("https://cdn/out.png"));
        assert_eq!(job.polls, 3);
        assert_eq!(script.checks.load(Ordering::SeqCst), 3);
        assert_eq!(clock.sleep_count(), 3);
        assert_eq!(clock.now_millis(), 6_000);
    }

    #[tokio::test]
    async fn test_times_out_after_max_polls() {
        let clock = Arc::new(ManualClock::new(0));
        let poller = JobPoller::new(clock.clone());
        let script = Script::new(Vec::new());

        let err = poller
            .submit_and_await(
                &target(5),
                || async { Ok(Some("pred-2".to_string())) },
                |id| script.next(id),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), &ErrorCode::Timeout);
        assert_eq!(err.status_code(), 504);
        assert_eq!(script.checks.load(Ordering::SeqCst), 5);
        let details = err.details().unwrap();
        assert_eq!(details["jobId"], "pred-2");
        assert_eq!(details["polls"], 5);
        assert_eq!(details["lastStatus"], "processing");
    }

    #[tokio::test]
    async fn test_failure_stops_polling() {
        let poller = JobPoller::new(Arc::new(ManualClock::new(0)));
        let script = Script::new(vec![
            JobSnapshot::failed("NSFW content detected"),
            JobSnapshot::succeeded(vec!["never".to_string()]),
        ]);

        let err = poller
            .submit_and_await(
                &target(60),
                || async { Ok(Some("pred-3".to_string())) },
                |id| script.next(id),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code().as_string(), "REPLICATE_ERROR");
        assert!(err.message().contains("NSFW"));
        assert_eq!(script.checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_canceled_is_terminal() {
        let poller = JobPoller::new(Arc::new(ManualClock::new(0)));
        let script = Script::new(vec![JobSnapshot::canceled()]);

        let err = poller
            .submit_and_await(
                &target(60),
                || async { Ok(Some("pred-4".to_string())) },
                |id| script.next(id),
            )
            .await
            .unwrap_err();

        assert_eq!(err.details().unwrap()["status"], "canceled");
        assert_eq!(script.checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_job_id_is_vendor_error() {
        let clock = Arc::new(ManualClock::new(0));
        let poller = JobPoller::new(clock.clone());
        let script = Script::new(Vec::new());

        let err = poller
            .submit_and_await(&target(60), || async { Ok(None) }, |id| script.next(id))
            .await
            .unwrap_err();

        assert_eq!(err.code(), &ErrorCode::Vendor("REPLICATE".to_string()));
        assert_eq!(err.status_code(), 400);
        assert_eq!(script.checks.load(Ordering::SeqCst), 0);
        assert_eq!(clock.sleep_count(), 0);
    }

    #[tokio::test]
    async fn test_success_without_output_is_vendor_error() {
        let poller = JobPoller::new(Arc::new(ManualClock::new(0)));
        let script = Script::new(vec![JobSnapshot::succeeded(Vec::new())]);

        let err = poller
            .submit_and_await(
                &target(60),
                || async { Ok(Some("pred-5".to_string())) },
                |id| script.next(id),
            )
            .await
            .unwrap_err();

        assert!(err.message().contains("without output"));
    }

    #[tokio::test]
    async fn test_run_variations_keeps_going_after_failure() {
        let outcome = run_variations(3, |index| async move {
            if index == 2 {
                Err(Error::timeout("slow"))
            } else {
                Ok(AsyncJob {
                    job_id: format!("job-{}", index),
                    status: JobStatus::Succeeded,
                    result_url: Some(format!("https://cdn/{}.png", index)),
                    outputs: vec![format!("https://cdn/{}.png", index)],
                    error_detail: None,
                    polls: 1,
                })
            }
        })
        .await;

        assert_eq!(outcome.succeeded.len(), 2);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, 2);
        assert!(outcome.is_partial());
    }
}
