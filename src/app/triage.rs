//! Automated triage: the single `pending_triage -> pending_community`
//! advance, driven by an external scorer that may fail or time out.

use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::auth::Caller;
use crate::app::error::{PipelineError, PipelineResult};
use crate::config::policy::PipelinePolicy;
use crate::domain::report::{Report, ReportStatus, Severity, TriageResult};
use crate::domain::triage::{
    TriageAssessment, TriageAuditEntry, TriageOutcome, TriageRequest, TRIAGE_UNAVAILABLE_FLAG,
    URGENT_FLAG,
};
use crate::infra::clock::Clock;
use crate::infra::queue::QueueClient;
use crate::infra::store::{ReportFilter, ReportStore};
use crate::infra::triage_client::TriageClient;
use crate::jobs::triage_worker::TriageJob;

/// Applies a scorer assessment. Severity and flags follow the latest
/// assessment; status only ever moves out of `pending_triage`.
pub fn apply_assessment(
    report: &mut Report,
    assessment: &TriageAssessment,
    now: OffsetDateTime,
) -> PipelineResult<()> {
    ensure_triageable(report)?;
    report.triage = Some(TriageResult {
        severity: Some(assessment.severity),
        confidence: assessment.confidence,
        keywords: assessment.keywords.clone(),
        flags: assessment.flags.clone(),
        assessed_at: now,
    });
    report.severity = Some(assessment.severity);
    if assessment.severity == Severity::Critical || assessment.flags.iter().any(|f| f == URGENT_FLAG) {
        report.urgent = true;
    }
    advance(report, now);
    Ok(())
}

/// Degraded path: default severity plus the `triage_unavailable` flag. An
/// earlier successful assessment is kept.
pub fn apply_unavailable(report: &mut Report, now: OffsetDateTime) -> PipelineResult<()> {
    ensure_triageable(report)?;
    let has_assessment = report
        .triage
        .as_ref()
        .map_or(false, |t| t.severity.is_some());
    if !has_assessment {
        report.triage = Some(TriageResult {
            severity: None,
            confidence: 0.0,
            keywords: Vec::new(),
            flags: vec![TRIAGE_UNAVAILABLE_FLAG.to_string()],
            assessed_at: now,
        });
        report.severity.get_or_insert(Severity::Medium);
    }
    advance(report, now);
    Ok(())
}

fn ensure_triageable(report: &Report) -> PipelineResult<()> {
    if report.status.is_terminal() {
        return Err(PipelineError::conflict(
            "report already has a final decision",
            report.status.as_db(),
        ));
    }
    Ok(())
}

fn advance(report: &mut Report, now: OffsetDateTime) {
    if report.status == ReportStatus::PendingTriage {
        report.status = ReportStatus::PendingCommunity;
    }
    report.updated_at = now;
}

fn audit_entry(
    report_id: Uuid,
    result: &Result<TriageAssessment, String>,
    now: OffsetDateTime,
) -> TriageAuditEntry {
    match result {
        Ok(assessment) => TriageAuditEntry {
            id: Uuid::new_v4(),
            report_id,
            outcome: TriageOutcome::Assessed,
            severity: Some(assessment.severity),
            confidence: Some(assessment.confidence),
            keywords: assessment.keywords.clone(),
            flags: assessment.flags.clone(),
            error: None,
            created_at: now,
        },
        Err(reason) => TriageAuditEntry {
            id: Uuid::new_v4(),
            report_id,
            outcome: TriageOutcome::Unavailable,
            severity: None,
            confidence: None,
            keywords: Vec::new(),
            flags: vec![TRIAGE_UNAVAILABLE_FLAG.to_string()],
            error: Some(reason.clone()),
            created_at: now,
        },
    }
}

#[derive(Clone)]
pub struct TriageService {
    reports: Arc<dyn ReportStore>,
    client: Arc<dyn TriageClient>,
    clock: Arc<dyn Clock>,
    policy: PipelinePolicy,
}

impl TriageService {
    pub fn new(
        reports: Arc<dyn ReportStore>,
        client: Arc<dyn TriageClient>,
        clock: Arc<dyn Clock>,
        policy: PipelinePolicy,
    ) -> Self {
        Self {
            reports,
            client,
            clock,
            policy,
        }
    }

    /// Calls the scorer under the configured timeout and records the
    /// outcome. Scorer failures never fail the call.
    pub async fn triage_report(&self, report_id: Uuid) -> PipelineResult<Report> {
        let report = self
            .reports
            .get_report(report_id)
            .await?
            .ok_or(PipelineError::NotFound("report"))?;
        ensure_triageable(&report)?;

        let request = TriageRequest {
            title: report.content.title.clone(),
            description: report.content.description.clone(),
            media_refs: report.content.media_refs.clone(),
        };
        let result = match tokio::time::timeout(
            self.policy.triage_timeout(),
            self.client.assess(&request),
        )
        .await
        {
            Ok(Ok(assessment)) => Ok(assessment),
            Ok(Err(err)) => Err(format!("{:#}", err)),
            Err(_) => Err(format!(
                "timed out after {}ms",
                self.policy.triage_timeout_ms
            )),
        };

        let now = self.clock.now();
        let audit = audit_entry(report_id, &result, now);
        let outcome = match &result {
            Ok(assessment) => {
                self.reports
                    .update_report_with_audit(
                        report_id,
                        &|r: &mut Report| apply_assessment(r, assessment, now),
                        &audit,
                    )
                    .await
            }
            Err(reason) => {
                tracing::warn!(report_id = %report_id, reason = %reason, "triage unavailable, using default severity");
                self.reports
                    .update_report_with_audit(
                        report_id,
                        &|r: &mut Report| apply_unavailable(r, now),
                        &audit,
                    )
                    .await
            }
        };
        let updated = match outcome {
            Ok(updated) => updated,
            Err(err @ PipelineError::Conflict { .. }) => {
                // The scorer was still called; keep the attempt on record.
                tracing::info!(report_id = %report_id, "report left triage while scoring");
                self.reports.append_triage_audit(&audit).await?;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        tracing::info!(
            report_id = %report_id,
            severity = ?updated.severity,
            status = updated.status.as_db(),
            "report triaged"
        );
        Ok(updated)
    }

    /// Advances every report still waiting on triage that was created
    /// before `cutoff`. Returns how many were advanced.
    pub async fn expire_stale(&self, cutoff: OffsetDateTime) -> PipelineResult<usize> {
        let filter = ReportFilter {
            statuses: vec![ReportStatus::PendingTriage],
            created_before: Some(cutoff),
            ..ReportFilter::default()
        };
        let stale = self.reports.list_reports(&filter).await?;

        let mut advanced = 0;
        for report in stale {
            let now = self.clock.now();
            let result = Err(format!("no triage result before {}", cutoff));
            let audit = audit_entry(report.id, &result, now);
            let outcome = self
                .reports
                .update_report_with_audit(
                    report.id,
                    &|r: &mut Report| {
                        if r.status != ReportStatus::PendingTriage {
                            return Err(PipelineError::conflict(
                                "report already left triage",
                                r.status.as_db(),
                            ));
                        }
                        apply_unavailable(r, now)
                    },
                    &audit,
                )
                .await;

            match outcome {
                Ok(_) => advanced += 1,
                Err(PipelineError::Conflict { .. }) => {}
                Err(err) => {
                    tracing::error!(report_id = %report.id, error = ?err, "failed to expire stale triage");
                }
            }
        }

        if advanced > 0 {
            tracing::info!(advanced = advanced, "expired stale triage");
        }
        Ok(advanced)
    }

    pub async fn audit_log(
        &self,
        caller: &Caller,
        report_id: Uuid,
    ) -> PipelineResult<Vec<TriageAuditEntry>> {
        caller.require_reviewer()?;
        if self.reports.get_report(report_id).await?.is_none() {
            return Err(PipelineError::NotFound("report"));
        }
        self.reports.list_triage_audit(report_id).await
    }
}

/// How intake hands a new report to triage.
#[derive(Clone)]
pub enum TriageDispatcher {
    /// Enqueue for the worker process.
    Queue(QueueClient),
    /// Run in a background task of the current process.
    Spawn(TriageService),
    /// Leave it to an explicit trigger or the stale sweep.
    Manual,
}

impl TriageDispatcher {
    pub async fn dispatch(&self, report_id: Uuid) -> anyhow::Result<()> {
        match self {
            TriageDispatcher::Queue(queue) => {
                queue
                    .enqueue_triage_job(&TriageJob::new(report_id), 0)
                    .await
            }
            TriageDispatcher::Spawn(service) => {
                let service = service.clone();
                tokio::spawn(async move {
                    if let Err(err) = service.triage_report(report_id).await {
                        tracing::warn!(report_id = %report_id, error = ?err, "background triage failed");
                    }
                });
                Ok(())
            }
            TriageDispatcher::Manual => Ok(()),
        }
    }
}
