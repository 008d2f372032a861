//! SQS transport for triage jobs. Bodies are JSON `TriageJob`s; a body
//! that does not decode is deleted so it is never redelivered.

use anyhow::{anyhow, Context, Result};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::Client;
use tracing::{debug, warn};

use crate::config::QueueConfig;
use crate::jobs::triage_worker::TriageJob;

/// SQS rejects longer delays.
const MAX_DELAY_SECONDS: i32 = 900;
/// SQS returns at most ten messages per receive.
const MAX_BATCH: i32 = 10;

#[derive(Clone)]
pub struct QueueClient {
    client: Client,
    queue_name: String,
    queue_url: String,
}

#[derive(Debug)]
pub struct ReceivedJob {
    pub job: TriageJob,
    pub receipt_handle: String,
}

#[derive(Debug)]
enum Delivery {
    Job(ReceivedJob),
    Poison {
        receipt_handle: String,
        reason: String,
    },
    /// Without a receipt handle the message cannot be deleted; it
    /// reappears after its visibility timeout.
    Unacknowledgeable,
}

fn decode(receipt_handle: Option<&str>, body: Option<&str>) -> Delivery {
    let Some(receipt_handle) = receipt_handle.map(str::to_string) else {
        return Delivery::Unacknowledgeable;
    };
    let Some(body) = body else {
        return Delivery::Poison {
            receipt_handle,
            reason: "empty body".to_string(),
        };
    };
    match serde_json::from_str::<TriageJob>(body) {
        Ok(job) => Delivery::Job(ReceivedJob {
            job,
            receipt_handle,
        }),
        Err(err) => Delivery::Poison {
            receipt_handle,
            reason: err.to_string(),
        },
    }
}

fn delay_seconds(requested: i32) -> i32 {
    requested.clamp(0, MAX_DELAY_SECONDS)
}

async fn resolve_queue_url(client: &Client, name: &str) -> Result<String> {
    let url = match client.get_queue_url().queue_name(name).send().await {
        Ok(found) => found.queue_url().map(str::to_string),
        Err(err)
            if err
                .as_service_error()
                .map_or(false, |e| e.is_queue_does_not_exist()) =>
        {
            debug!(queue = name, "queue missing, creating it");
            client
                .create_queue()
                .queue_name(name)
                .send()
                .await
                .with_context(|| format!("creating queue {}", name))?
                .queue_url()
                .map(str::to_string)
        }
        Err(err) => return Err(anyhow!(err).context(format!("looking up queue {}", name))),
    };
    url.ok_or_else(|| anyhow!("queue {} has no url", name))
}

impl QueueClient {
    /// Connects to the configured endpoint and creates the queue on first use.
    pub async fn new(config: &QueueConfig) -> Result<Self> {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint.clone())
            .load()
            .await;
        let client = Client::new(&shared);
        let queue_url = resolve_queue_url(&client, &config.name).await?;

        Ok(Self {
            client,
            queue_name: config.name.clone(),
            queue_url,
        })
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub async fn enqueue_triage_job(&self, job: &TriageJob, delay: i32) -> Result<()> {
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(serde_json::to_string(job)?)
            .delay_seconds(delay_seconds(delay))
            .send()
            .await
            .with_context(|| format!("enqueueing triage of report {}", job.report_id))?;
        Ok(())
    }

    /// Long-polls for up to `max` jobs. Undecodable messages are dropped
    /// from the queue and left out of the result.
    pub async fn receive_triage_jobs(&self, max: i32, wait_seconds: i32) -> Result<Vec<ReceivedJob>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max.clamp(1, MAX_BATCH))
            .wait_time_seconds(wait_seconds)
            .send()
            .await
            .with_context(|| format!("receiving from queue {}", self.queue_name))?;

        let mut jobs = Vec::new();
        for message in output.messages() {
            match decode(message.receipt_handle(), message.body()) {
                Delivery::Job(received) => {
                    debug!(
                        report_id = %received.job.report_id,
                        attempt = received.job.attempt,
                        "received triage job"
                    );
                    jobs.push(received);
                }
                Delivery::Poison {
                    receipt_handle,
                    reason,
                } => {
                    warn!(reason = %reason, "discarding undecodable triage job");
                    if let Err(err) = self.acknowledge(&receipt_handle).await {
                        warn!(error = ?err, "failed to discard queue message");
                    }
                }
                Delivery::Unacknowledgeable => {
                    warn!("queue message missing receipt handle");
                }
            }
        }
        Ok(jobs)
    }

    /// Deletes a handled message.
    pub async fn acknowledge(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .with_context(|| format!("deleting message from queue {}", self.queue_name))?;
        Ok(())
    }
}
