#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::OnceCell;
use tower::ServiceExt;
use uuid::Uuid;

use vigia::app::auth::{AuthService, Role};
use vigia::app::triage::{TriageDispatcher, TriageService};
use vigia::config::policy::PipelinePolicy;
use vigia::config::rate_limits::RateLimits;
use vigia::domain::triage::{TriageAssessment, TriageRequest};
use vigia::infra::clock::ManualClock;
use vigia::infra::memory_store::MemoryStore;
use vigia::infra::storage::PrefixMediaVerifier;
use vigia::infra::store::{AnonymousReportStore, IncidentStore, ReportStore};
use vigia::infra::triage_client::TriageClient;
use vigia::AppState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const TEST_PASETO_ACCESS_KEY: [u8; 32] = *b"0123456789abcdef0123456789abcdef";
const TEST_FINGERPRINT_SALT: [u8; 32] = *b"fedcba9876543210fedcba9876543210";
pub const MEDIA_BASE_URL: &str = "https://media.vigia.test/";
pub const TRIAGE_TIMEOUT_MS: u64 = 50;

// ---------------------------------------------------------------------------
// Scripted triage scorer
// ---------------------------------------------------------------------------

/// What the fake scorer does for a given report title. Titles without a
/// script behave as an offline scorer.
#[derive(Clone)]
pub enum Script {
    Assess(TriageAssessment),
    Fail,
    Hang,
}

#[derive(Clone, Default)]
pub struct ScriptedTriageClient {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
}

impl ScriptedTriageClient {
    pub fn script(&self, title: &str, script: Script) {
        self.scripts.lock().insert(title.to_string(), script);
    }
}

#[async_trait]
impl TriageClient for ScriptedTriageClient {
    async fn assess(&self, request: &TriageRequest) -> anyhow::Result<TriageAssessment> {
        let script = self.scripts.lock().get(&request.title).cloned();
        match script {
            Some(Script::Assess(assessment)) => Ok(assessment),
            Some(Script::Hang) => {
                tokio::time::sleep(Duration::from_millis(TRIAGE_TIMEOUT_MS * 20)).await;
                Err(anyhow::anyhow!("scorer hung"))
            }
            Some(Script::Fail) | None => Err(anyhow::anyhow!("scorer offline")),
        }
    }
}

// ---------------------------------------------------------------------------
// TestApp
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub clock: ManualClock,
    pub triage: ScriptedTriageClient,
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body_bytes).to_string()
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub token: String,
}

static TEST_APP: OnceCell<TestApp> = OnceCell::const_new();

/// Get (or lazily create) the shared TestApp instance.
pub async fn app() -> &'static TestApp {
    TEST_APP
        .get_or_init(|| async {
            let store = MemoryStore::new();
            TestApp::with_stores(
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Arc::new(store),
            )
        })
        .await
}

impl TestApp {
    /// Builds an isolated app over the given stores. Triage is only run
    /// through the explicit trigger endpoint.
    pub fn with_stores(
        reports: Arc<dyn ReportStore>,
        anonymous: Arc<dyn AnonymousReportStore>,
        incidents: Arc<dyn IncidentStore>,
    ) -> Self {
        Self::build(reports, anonymous, incidents, false)
    }

    /// A memory-backed app where intake hands every report to a
    /// background triage task, as the api process does without a queue.
    pub fn spawning() -> Self {
        let store = MemoryStore::new();
        Self::build(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store),
            true,
        )
    }

    fn build(
        reports: Arc<dyn ReportStore>,
        anonymous: Arc<dyn AnonymousReportStore>,
        incidents: Arc<dyn IncidentStore>,
        spawn_triage: bool,
    ) -> Self {
        let clock = ManualClock::new(
            OffsetDateTime::from_unix_timestamp(1_709_294_400).expect("valid timestamp"),
        );
        let triage = ScriptedTriageClient::default();
        let policy = PipelinePolicy {
            triage_timeout_ms: TRIAGE_TIMEOUT_MS,
            ..PipelinePolicy::default()
        };

        let dispatcher = if spawn_triage {
            TriageDispatcher::Spawn(TriageService::new(
                reports.clone(),
                Arc::new(triage.clone()),
                Arc::new(clock.clone()),
                policy,
            ))
        } else {
            TriageDispatcher::Manual
        };

        let state = AppState {
            reports,
            anonymous,
            incidents,
            triage_client: Arc::new(triage.clone()),
            dispatcher,
            media: Arc::new(PrefixMediaVerifier::new(MEDIA_BASE_URL)),
            clock: Arc::new(clock.clone()),
            db: None,
            cache: None,
            policy,
            rate_limits: RateLimits::default(),
            fingerprint_salt: TEST_FINGERPRINT_SALT,
            paseto_access_key: TEST_PASETO_ACCESS_KEY,
            access_ttl_minutes: 60,
        };

        let router = vigia::http::router(state.clone());

        TestApp {
            router,
            state,
            clock,
            triage,
        }
    }

    pub fn memory() -> Self {
        let store = MemoryStore::new();
        Self::with_stores(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store),
        )
    }

    // ------------------------------------------------------------------
    // Low-level request helper
    // ------------------------------------------------------------------
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        for &(key, value) in headers {
            builder = builder.header(key, value);
        }

        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        // The anonymous channel reads the client address.
        let mut request = request;
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 0))));

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    // ------------------------------------------------------------------
    // Convenience HTTP helpers
    // ------------------------------------------------------------------
    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        let auth;
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(Method::GET, path, None, &headers).await
    }

    pub async fn post_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        let auth;
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(Method::POST, path, Some(body), &headers).await
    }

    pub async fn patch_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        let auth;
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(Method::PATCH, path, Some(body), &headers)
            .await
    }

    /// Anonymous submission from a given device.
    pub async fn post_anonymous(&self, body: Value, device: &str) -> TestResponse {
        self.request(
            Method::POST,
            "/v1/anonymous-reports",
            Some(body),
            &[
                (vigia::http::DEVICE_FINGERPRINT_HEADER, device),
                ("user-agent", "vigia-tests/1.0"),
            ],
        )
        .await
    }

    // ------------------------------------------------------------------
    // Test data helpers
    // ------------------------------------------------------------------

    /// Mints a session token the same way the external auth service does.
    pub fn user(&self, role: Role) -> TestUser {
        let id = Uuid::new_v4();
        let auth_service = AuthService::new(
            self.state.paseto_access_key,
            self.state.access_ttl_minutes,
        );
        let token = auth_service
            .issue_access_token(id, role)
            .expect("failed to issue access token");
        TestUser { id, token }
    }

    pub fn citizen(&self) -> TestUser {
        self.user(Role::Citizen)
    }

    pub fn reviewer(&self) -> TestUser {
        self.user(Role::Reviewer)
    }

    /// Submits a valid report and returns its id.
    pub async fn submit_report(&self, owner: &TestUser, body: Value) -> Uuid {
        let resp = self.post_json("/v1/reports", body, Some(&owner.token)).await;
        assert_eq!(resp.status, StatusCode::CREATED, "submit failed: {}", resp.text());
        resp.json()["id"]
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
            .expect("report id")
    }

    /// Runs triage and returns the report as the reviewer sees it.
    pub async fn triage(&self, report_id: Uuid) -> Value {
        let reviewer = self.reviewer();
        let resp = self
            .post_json(
                &format!("/v1/reports/{}/triage", report_id),
                json!({}),
                Some(&reviewer.token),
            )
            .await;
        assert_eq!(resp.status, StatusCode::OK, "triage failed: {}", resp.text());
        resp.json()
    }

    pub async fn vote(&self, voter: &TestUser, report_id: Uuid, vote: &str) -> TestResponse {
        self.post_json(
            &format!("/v1/reports/{}/votes", report_id),
            json!({ "vote": vote }),
            Some(&voter.token),
        )
        .await
    }
}

/// A valid named submission with a unique title.
pub fn flood_report(title: &str) -> Value {
    json!({
        "category": "flood",
        "title": title,
        "description": "Water up to the knees on Rua Augusta",
        "latitude": -23.55,
        "longitude": -46.63,
    })
}

pub fn unique_title(prefix: &str) -> String {
    format!("{} {}", prefix, &Uuid::new_v4().simple().to_string()[..8])
}
