use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::domain::triage::{TriageAssessment, TriageRequest};

/// External severity scorer. Responses are advisory and may be slow or
/// missing; callers apply their own timeout.
#[async_trait]
pub trait TriageClient: Send + Sync {
    async fn assess(&self, request: &TriageRequest) -> Result<TriageAssessment>;
}

/// Posts the request as JSON to `TRIAGE_ENDPOINT`.
pub struct HttpTriageClient {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpTriageClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TriageClient for HttpTriageClient {
    async fn assess(&self, request: &TriageRequest) -> Result<TriageAssessment> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            bail!("triage endpoint returned HTTP {}: {}", status, body);
        }

        let assessment: TriageAssessment = serde_json::from_str(&body)?;
        if !(0.0..=1.0).contains(&assessment.confidence) {
            bail!("triage confidence out of range: {}", assessment.confidence);
        }
        Ok(assessment)
    }
}

/// Stand-in when no scorer is configured; every attempt degrades.
pub struct UnconfiguredTriageClient;

#[async_trait]
impl TriageClient for UnconfiguredTriageClient {
    async fn assess(&self, _request: &TriageRequest) -> Result<TriageAssessment> {
        Err(anyhow!("no triage endpoint configured"))
    }
}
