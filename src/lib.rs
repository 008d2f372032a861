pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod jobs;

use std::sync::Arc;

use crate::app::triage::TriageDispatcher;
use crate::config::policy::PipelinePolicy;
use crate::config::rate_limits::RateLimits;
use crate::infra::clock::Clock;
use crate::infra::storage::MediaVerifier;
use crate::infra::store::{AnonymousReportStore, IncidentStore, ReportStore};
use crate::infra::triage_client::TriageClient;
use crate::infra::{cache::RedisCache, db::Db};

#[derive(Clone)]
pub struct AppState {
    pub reports: Arc<dyn ReportStore>,
    pub anonymous: Arc<dyn AnonymousReportStore>,
    pub incidents: Arc<dyn IncidentStore>,
    pub triage_client: Arc<dyn TriageClient>,
    pub dispatcher: TriageDispatcher,
    pub media: Arc<dyn MediaVerifier>,
    pub clock: Arc<dyn Clock>,
    /// Only set for the Postgres backend; used by the health check.
    pub db: Option<Db>,
    /// Rate limiting is skipped without redis.
    pub cache: Option<RedisCache>,
    pub policy: PipelinePolicy,
    pub rate_limits: RateLimits,
    pub fingerprint_salt: [u8; 32],
    pub paseto_access_key: [u8; 32],
    pub access_ttl_minutes: u64,
}
