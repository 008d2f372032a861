mod common;

use std::time::Duration;
use uuid::Uuid;

use vigia::app::triage::TriageService;
use vigia::domain::report::{ReportStatus, Severity};
use vigia::domain::triage::TriageAssessment;
use vigia::jobs;

use common::{flood_report, unique_title, Script, TestApp};

/// Polls the store until the report leaves `pending_triage` or the
/// deadline passes.
async fn wait_for_triage(app: &TestApp, id: Uuid) -> ReportStatus {
    for _ in 0..100 {
        let report = app.state.reports.get_report(id).await.unwrap().unwrap();
        if report.status != ReportStatus::PendingTriage {
            return report.status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    ReportStatus::PendingTriage
}

#[tokio::test]
async fn submission_is_triaged_in_the_background() {
    let app = TestApp::spawning();
    let citizen = app.citizen();
    let title = unique_title("Enchente");
    app.triage.script(
        &title,
        Script::Assess(TriageAssessment {
            severity: Severity::High,
            confidence: 0.8,
            keywords: vec!["flood".into()],
            flags: vec![],
        }),
    );

    let id = app.submit_report(&citizen, flood_report(&title)).await;
    assert_eq!(wait_for_triage(&app, id).await, ReportStatus::PendingCommunity);

    let report = app.state.reports.get_report(id).await.unwrap().unwrap();
    assert_eq!(report.severity, Some(Severity::High));
    let log = app.state.reports.list_triage_audit(id).await.unwrap();
    assert_eq!(log.len(), 1);
}

#[tokio::test]
async fn background_triage_degrades_when_the_scorer_is_offline() {
    let app = TestApp::spawning();
    let citizen = app.citizen();
    let id = app
        .submit_report(&citizen, flood_report(&unique_title("Sem scorer")))
        .await;

    assert_eq!(wait_for_triage(&app, id).await, ReportStatus::PendingCommunity);
    let report = app.state.reports.get_report(id).await.unwrap().unwrap();
    assert_eq!(report.severity, Some(Severity::Medium));
}

#[tokio::test]
async fn worker_without_queue_sweeps_stale_reports() {
    let app = TestApp::memory();
    let citizen = app.citizen();
    let id = app
        .submit_report(&citizen, flood_report(&unique_title("Parado")))
        .await;
    app.clock.advance(time::Duration::minutes(11));

    let service = TriageService::new(
        app.state.reports.clone(),
        app.state.triage_client.clone(),
        app.state.clock.clone(),
        app.state.policy,
    );
    let worker = tokio::spawn(jobs::triage_worker::run(
        service,
        None,
        app.state.clock.clone(),
        app.state.policy,
    ));

    let status = wait_for_triage(&app, id).await;
    worker.abort();
    assert_eq!(status, ReportStatus::PendingCommunity);

    let log = app.state.reports.list_triage_audit(id).await.unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0]
        .error
        .as_deref()
        .unwrap_or_default()
        .starts_with("no triage result before"));
}
