use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::auth::Caller;
use crate::app::error::{PipelineError, PipelineResult, Violation};
use crate::app::publisher::project;
use crate::app::validation::{validate_optional_text, REVIEW_TEXT_MAX_CHARS};
use crate::domain::incident::PublicIncident;
use crate::domain::report::{AuthorityDecision, Report, ReportStatus, Severity};
use crate::infra::clock::Clock;
use crate::infra::store::ReportStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    /// Shown to the public and the submitter.
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub internal_notes: Option<String>,
    /// Overrides the triage severity before projection.
    #[serde(default)]
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub report: Report,
    pub incident: Option<PublicIncident>,
}

/// Sets the terminal decision. Fails with the current status when the
/// report is already decided.
pub fn apply_decision(
    report: &mut Report,
    reviewer_id: Uuid,
    request: &ReviewRequest,
    now: OffsetDateTime,
) -> PipelineResult<()> {
    let next = match request.decision {
        ReviewDecision::Approve => ReportStatus::Approved,
        ReviewDecision::Reject => ReportStatus::Rejected,
    };
    if report.decision.is_some() || !report.status.can_transition_to(next) {
        return Err(PipelineError::conflict(
            "report already has a final decision",
            report.status.as_db(),
        ));
    }

    if let Some(severity) = request.severity {
        report.severity = Some(severity);
    }
    report.decision = Some(AuthorityDecision {
        reviewer_id,
        approved: next == ReportStatus::Approved,
        public_response: clean(request.reason.as_deref()),
        internal_notes: clean(request.internal_notes.as_deref()),
        decided_at: now,
    });
    report.status = next;
    report.updated_at = now;
    Ok(())
}

fn clean(text: Option<&str>) -> Option<String> {
    text.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string)
}

#[derive(Clone)]
pub struct ReviewService {
    reports: Arc<dyn ReportStore>,
    clock: Arc<dyn Clock>,
}

impl ReviewService {
    pub fn new(reports: Arc<dyn ReportStore>, clock: Arc<dyn Clock>) -> Self {
        Self { reports, clock }
    }

    /// Approval and publication commit together or not at all.
    pub async fn review(
        &self,
        caller: &Caller,
        report_id: Uuid,
        request: ReviewRequest,
    ) -> PipelineResult<ReviewOutcome> {
        caller.require_reviewer()?;

        let violations: Vec<Violation> = [
            validate_optional_text("reason", request.reason.as_deref(), REVIEW_TEXT_MAX_CHARS),
            validate_optional_text(
                "internal_notes",
                request.internal_notes.as_deref(),
                REVIEW_TEXT_MAX_CHARS,
            ),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();
        if !violations.is_empty() {
            return Err(PipelineError::Validation(violations));
        }

        let now = self.clock.now();
        let reviewer_id = caller.user_id;
        let decide = |r: &mut Report| apply_decision(r, reviewer_id, &request, now);

        let outcome = match request.decision {
            ReviewDecision::Approve => {
                let (report, incident) = self
                    .reports
                    .update_report_and_publish(report_id, &decide, &|r: &Report| project(r, now))
                    .await
                    .map_err(|err| {
                        if matches!(err, PipelineError::Publish(_) | PipelineError::Storage(_)) {
                            tracing::error!(
                                report_id = %report_id,
                                reviewer_id = %reviewer_id,
                                error = ?err,
                                "approval rolled back, publication failed"
                            );
                        }
                        err
                    })?;
                tracing::info!(
                    report_id = %report_id,
                    incident_id = %incident.id,
                    "report approved and published"
                );
                ReviewOutcome {
                    report,
                    incident: Some(incident),
                }
            }
            ReviewDecision::Reject => {
                let report = self.reports.update_report(report_id, &decide).await?;
                tracing::info!(report_id = %report_id, "report rejected");
                ReviewOutcome {
                    report,
                    incident: None,
                }
            }
        };

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geo::GeoPoint;
    use crate::domain::report::{IncidentCategory, ReportContent, ReportMetrics};

    fn report(status: ReportStatus) -> Report {
        let now = OffsetDateTime::UNIX_EPOCH;
        Report {
            id: Uuid::new_v4(),
            owner_id: Some(Uuid::new_v4()),
            anonymous: false,
            content: ReportContent {
                category: IncidentCategory::StructuralRisk,
                title: "Marquise rachada".into(),
                description: "The awning over the bus stop is cracking".into(),
                location: GeoPoint::new(-8.05, -34.9),
                address: None,
                media_refs: vec![],
            },
            severity: Some(Severity::Low),
            urgent: false,
            status,
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

    fn approve(severity: Option<Severity>) -> ReviewRequest {
        ReviewRequest {
            decision: ReviewDecision::Approve,
            reason: Some("  confirmed by field team ".into()),
            internal_notes: None,
            severity,
        }
    }

    #[test]
    fn reviewer_may_short_circuit_triage() {
        let mut r = report(ReportStatus::PendingTriage);
        apply_decision(&mut r, Uuid::new_v4(), &approve(None), OffsetDateTime::UNIX_EPOCH).unwrap();
        assert_eq!(r.status, ReportStatus::Approved);
        let decision = r.decision.unwrap();
        assert!(decision.approved);
        assert_eq!(decision.public_response.as_deref(), Some("confirmed by field team"));
    }

    #[test]
    fn severity_override_replaces_triage_value() {
        let mut r = report(ReportStatus::PendingCommunity);
        apply_decision(
            &mut r,
            Uuid::new_v4(),
            &approve(Some(Severity::Critical)),
            OffsetDateTime::UNIX_EPOCH,
        )
        .unwrap();
        assert_eq!(r.severity, Some(Severity::Critical));
    }

    #[test]
    fn second_decision_conflicts_and_changes_nothing() {
        let mut r = report(ReportStatus::PendingCommunity);
        let reject = ReviewRequest {
            decision: ReviewDecision::Reject,
            reason: None,
            internal_notes: None,
            severity: None,
        };
        apply_decision(&mut r, Uuid::new_v4(), &reject, OffsetDateTime::UNIX_EPOCH).unwrap();
        let decided = r.clone();

        let err = apply_decision(&mut r, Uuid::new_v4(), &approve(None), OffsetDateTime::UNIX_EPOCH)
            .unwrap_err();
        match err {
            PipelineError::Conflict { current_status, .. } => assert_eq!(current_status, "rejected"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(r, decided);
    }
}
