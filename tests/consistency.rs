mod common;

use async_trait::async_trait;
use axum::http::StatusCode;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use vigia::app::auth::{Caller, Role};
use vigia::app::community::{CommunityService, VoteRequest};
use vigia::app::error::{PipelineError, PipelineResult};
use vigia::domain::geo::GeoPoint;
use vigia::domain::incident::PublicIncident;
use vigia::domain::report::{
    IncidentCategory, Report, ReportContent, ReportMetrics, ReportStatus, Severity, Vote,
};
use vigia::domain::triage::TriageAuditEntry;
use vigia::infra::clock::SystemClock;
use vigia::infra::memory_store::MemoryStore;
use vigia::infra::store::{IncidentProjection, ReportFilter, ReportMutation, ReportStore};

use common::{flood_report, unique_title, TestApp};

/// Delegates to the memory store but fails every publication.
struct OfflineFeedStore {
    inner: MemoryStore,
}

#[async_trait]
impl ReportStore for OfflineFeedStore {
    async fn insert_report(&self, report: &Report) -> PipelineResult<()> {
        self.inner.insert_report(report).await
    }

    async fn get_report(&self, id: Uuid) -> PipelineResult<Option<Report>> {
        self.inner.get_report(id).await
    }

    async fn list_reports(&self, filter: &ReportFilter) -> PipelineResult<Vec<Report>> {
        self.inner.list_reports(filter).await
    }

    async fn update_report(&self, id: Uuid, mutate: ReportMutation<'_>) -> PipelineResult<Report> {
        self.inner.update_report(id, mutate).await
    }

    async fn update_report_with_audit(
        &self,
        id: Uuid,
        mutate: ReportMutation<'_>,
        audit: &TriageAuditEntry,
    ) -> PipelineResult<Report> {
        self.inner.update_report_with_audit(id, mutate, audit).await
    }

    async fn append_triage_audit(&self, audit: &TriageAuditEntry) -> PipelineResult<()> {
        self.inner.append_triage_audit(audit).await
    }

    async fn update_report_and_publish(
        &self,
        id: Uuid,
        mutate: ReportMutation<'_>,
        _project: IncidentProjection<'_>,
    ) -> PipelineResult<(Report, PublicIncident)> {
        self.inner
            .update_report_and_publish(id, mutate, &|_: &Report| {
                Err(PipelineError::Publish("incident feed offline".to_string()))
            })
            .await
    }

    async fn review_queue(&self, limit: i64) -> PipelineResult<Vec<Report>> {
        self.inner.review_queue(limit).await
    }

    async fn increment_views(&self, id: Uuid) -> PipelineResult<()> {
        self.inner.increment_views(id).await
    }

    async fn list_triage_audit(&self, report_id: Uuid) -> PipelineResult<Vec<TriageAuditEntry>> {
        self.inner.list_triage_audit(report_id).await
    }
}

#[tokio::test]
async fn failed_publication_leaves_report_undecided() {
    let store = MemoryStore::new();
    let app = TestApp::with_stores(
        Arc::new(OfflineFeedStore {
            inner: store.clone(),
        }),
        Arc::new(store.clone()),
        Arc::new(store),
    );
    let citizen = app.citizen();
    let reviewer = app.reviewer();
    let id = app
        .submit_report(&citizen, flood_report(&unique_title("Sem feed")))
        .await;
    app.triage(id).await;

    let resp = app
        .post_json(
            &format!("/v1/reports/{}/review", id),
            json!({ "decision": "approve", "reason": "confirmed by field team" }),
            Some(&reviewer.token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(!resp.text().contains("incident feed offline"));

    let report = app.get(&format!("/v1/reports/{}", id), None).await.json();
    assert_eq!(report["status"], "pending_community");
    assert!(report["decision"].is_null());

    let incidents = app.get("/v1/incidents", None).await.json();
    assert!(incidents["items"].as_array().unwrap().is_empty());

    // The report is still open to a decision that needs no publication.
    let resp = app
        .post_json(
            &format!("/v1/reports/{}/review", id),
            json!({ "decision": "reject" }),
            Some(&reviewer.token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
}

fn open_report() -> Report {
    let now = OffsetDateTime::now_utc();
    Report {
        id: Uuid::new_v4(),
        owner_id: Some(Uuid::new_v4()),
        anonymous: false,
        content: ReportContent {
            category: IncidentCategory::Flood,
            title: "Rua alagada".into(),
            description: "Water up to the knees on Rua Augusta".into(),
            location: GeoPoint::new(-23.55, -46.63),
            address: None,
            media_refs: vec![],
        },
        severity: Some(Severity::Medium),
        urgent: false,
        status: ReportStatus::PendingCommunity,
        triage: None,
        validations: vec![],
        decision: None,
        supersedes: None,
        metrics: ReportMetrics::default(),
        version: 0,
        created_at: now,
        updated_at: now,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn concurrent_votes_from_distinct_validators_are_all_counted(
        votes in prop::collection::vec(any::<bool>(), 1..48)
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        let (tally, stored) = runtime.block_on(async {
            let store = MemoryStore::new();
            let report = open_report();
            store.insert_report(&report).await.unwrap();
            let service = CommunityService::new(Arc::new(store.clone()), Arc::new(SystemClock));

            let handles: Vec<_> = votes
                .iter()
                .map(|&up| {
                    let service = service.clone();
                    let caller = Caller { user_id: Uuid::new_v4(), role: Role::Citizen };
                    let vote = if up { Vote::Up } else { Vote::Down };
                    tokio::spawn(async move {
                        service
                            .record_vote(&caller, report.id, VoteRequest { vote, comment: None })
                            .await
                    })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap().unwrap();
            }

            let stored = store.get_report(report.id).await.unwrap().unwrap();
            (stored.tally(), stored)
        });

        let up = votes.iter().filter(|&&v| v).count() as i64;
        let down = votes.len() as i64 - up;
        prop_assert_eq!(tally.up, up);
        prop_assert_eq!(tally.down, down);
        prop_assert_eq!(tally.net, up - down);
        prop_assert_eq!(stored.validations.len(), votes.len());
    }
}
