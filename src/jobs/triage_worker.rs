use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app::error::PipelineError;
use crate::app::triage::TriageService;
use crate::config::policy::PipelinePolicy;
use crate::infra::clock::Clock;
use crate::infra::queue::{QueueClient, ReceivedJob};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageJob {
    pub report_id: Uuid,
    #[serde(default)]
    pub attempt: u32,
}

impl TriageJob {
    pub fn new(report_id: Uuid) -> Self {
        Self {
            report_id,
            attempt: 0,
        }
    }

    /// The follow-up job, or `None` once retries are exhausted. Exhausted
    /// reports are picked up by the stale sweep.
    pub fn retry(&self) -> Option<TriageJob> {
        (self.attempt + 1 < MAX_ATTEMPTS).then(|| TriageJob {
            report_id: self.report_id,
            attempt: self.attempt + 1,
        })
    }

    pub fn retry_delay_seconds(&self) -> i32 {
        (RETRY_BASE_SECONDS << self.attempt.min(6)).min(900)
    }
}

const POLL_WAIT_SECONDS: i32 = 10;
const RECEIVE_BATCH: i32 = 5;
const IDLE_SLEEP_MS: u64 = 200;
const ERROR_BACKOFF_MS: u64 = 1000;
const SWEEP_INTERVAL_SECONDS: u64 = 60;
const MAX_ATTEMPTS: u32 = 5;
const RETRY_BASE_SECONDS: i32 = 15;

#[derive(Debug, PartialEq, Eq)]
enum ProcessingOutcome {
    Completed,
    RetryLater,
}

fn outcome_for(result: &Result<(), PipelineError>) -> ProcessingOutcome {
    match result {
        Ok(()) => ProcessingOutcome::Completed,
        // Deleted or already decided: nothing left to triage.
        Err(PipelineError::NotFound(_)) | Err(PipelineError::Conflict { .. }) => {
            ProcessingOutcome::Completed
        }
        Err(_) => ProcessingOutcome::RetryLater,
    }
}

/// Consumes triage jobs when a queue is configured and sweeps stale
/// `pending_triage` reports once a minute either way.
pub async fn run(
    service: TriageService,
    queue: Option<QueueClient>,
    clock: Arc<dyn Clock>,
    policy: PipelinePolicy,
) -> Result<()> {
    match queue {
        Some(queue) => {
            info!(queue = queue.queue_name(), "triage worker started");
            tokio::join!(consume(&service, &queue), sweep(&service, clock.as_ref(), policy));
        }
        None => {
            info!("triage worker started without a queue, sweeping only");
            sweep(&service, clock.as_ref(), policy).await;
        }
    }
    Ok(())
}

async fn consume(service: &TriageService, queue: &QueueClient) {
    loop {
        match queue.receive_triage_jobs(RECEIVE_BATCH, POLL_WAIT_SECONDS).await {
            Ok(messages) if messages.is_empty() => {
                tokio::time::sleep(Duration::from_millis(IDLE_SLEEP_MS)).await;
            }
            Ok(messages) => {
                for message in messages {
                    handle(service, queue, message).await;
                }
            }
            Err(err) => {
                warn!(error = ?err, "queue receive failed, backing off");
                tokio::time::sleep(Duration::from_millis(ERROR_BACKOFF_MS)).await;
            }
        }
    }
}

async fn handle(service: &TriageService, queue: &QueueClient, message: ReceivedJob) {
    let job = message.job;
    let result = service.triage_report(job.report_id).await.map(|_| ());
    if let Err(err) = &result {
        error!(
            error = ?err,
            report_id = %job.report_id,
            attempt = job.attempt,
            "failed to process triage job"
        );
    }

    if outcome_for(&result) == ProcessingOutcome::RetryLater {
        match job.retry() {
            Some(next) => {
                if let Err(err) = queue
                    .enqueue_triage_job(&next, job.retry_delay_seconds())
                    .await
                {
                    // Leave the message in flight; it becomes visible again.
                    warn!(error = ?err, report_id = %job.report_id, "failed to requeue triage job");
                    return;
                }
            }
            None => {
                warn!(report_id = %job.report_id, "triage retries exhausted, leaving to stale sweep");
            }
        }
    }

    if let Err(err) = queue.acknowledge(&message.receipt_handle).await {
        warn!(error = ?err, "failed to delete queue message");
    }
}

async fn sweep(service: &TriageService, clock: &dyn Clock, policy: PipelinePolicy) {
    let mut ticker = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECONDS));
    loop {
        ticker.tick().await;
        let cutoff = clock.now() - policy.triage_stale_after();
        if let Err(err) = service.expire_stale(cutoff).await {
            error!(error = ?err, "stale triage sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_back_off_and_stop() {
        let mut job = TriageJob::new(Uuid::new_v4());
        assert_eq!(job.retry_delay_seconds(), 15);

        let mut attempts = 1;
        while let Some(next) = job.retry() {
            assert!(next.retry_delay_seconds() > job.retry_delay_seconds());
            job = next;
            attempts += 1;
        }
        assert_eq!(attempts, MAX_ATTEMPTS);
    }

    #[test]
    fn settled_reports_are_not_retried() {
        assert_eq!(
            outcome_for(&Err(PipelineError::NotFound("report"))),
            ProcessingOutcome::Completed
        );
        assert_eq!(
            outcome_for(&Err(PipelineError::conflict("decided", "approved"))),
            ProcessingOutcome::Completed
        );
        assert_eq!(
            outcome_for(&Err(PipelineError::Storage(anyhow::anyhow!("connection reset")))),
            ProcessingOutcome::RetryLater
        );
    }

    #[test]
    fn jobs_without_attempt_field_parse() {
        let id = Uuid::new_v4();
        let job: TriageJob = serde_json::from_str(&format!("{{\"report_id\":\"{}\"}}", id)).unwrap();
        assert_eq!(job.report_id, id);
        assert_eq!(job.attempt, 0);
    }
}
