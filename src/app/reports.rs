use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::auth::Caller;
use crate::app::error::{PipelineError, PipelineResult, Violation};
use crate::app::triage::TriageDispatcher;
use crate::app::validation::{into_content, ContentSubmission, ValidationProfile};
use crate::domain::report::{
    AuthorityDecision, CommunityValidation, Report, ReportContent, ReportMetrics, ReportStatus,
    Severity, TriageResult, VoteTally,
};
use crate::infra::clock::Clock;
use crate::infra::storage::MediaVerifier;
use crate::infra::store::{ReportFilter, ReportStore};

#[derive(Debug, Clone, Deserialize)]
pub struct ReportSubmission {
    #[serde(flatten)]
    pub content: ContentSubmission,
    #[serde(default)]
    pub urgent: bool,
    /// Drops the owner reference before the record is stored.
    #[serde(default)]
    pub anonymous: bool,
    #[serde(default)]
    pub supersedes: Option<Uuid>,
}

/// Decision as shown to a given viewer.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionView {
    pub approved: bool,
    pub public_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub decided_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportView {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,
    pub anonymous: bool,
    #[serde(flatten)]
    pub content: ReportContent,
    pub severity: Option<Severity>,
    pub urgent: bool,
    pub status: ReportStatus,
    pub tally: VoteTally,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triage: Option<TriageResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validations: Option<Vec<CommunityValidation>>,
    pub decision: Option<DecisionView>,
    pub supersedes: Option<Uuid>,
    pub metrics: ReportMetrics,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ReportView {
    /// Owners see their own id; reviewers see moderation internals.
    pub fn for_viewer(report: Report, viewer: Option<&Caller>) -> Self {
        let is_reviewer = viewer.map_or(false, |c| c.role.can_review());
        let is_owner = matches!(
            (viewer, report.owner_id),
            (Some(caller), Some(owner)) if caller.user_id == owner
        );
        let tally = report.tally();
        let decision = report.decision.map(|d: AuthorityDecision| DecisionView {
            approved: d.approved,
            public_response: d.public_response,
            reviewer_id: is_reviewer.then_some(d.reviewer_id),
            internal_notes: if is_reviewer { d.internal_notes } else { None },
            decided_at: d.decided_at,
        });

        Self {
            id: report.id,
            owner_id: if is_owner || is_reviewer {
                report.owner_id
            } else {
                None
            },
            anonymous: report.anonymous,
            content: report.content,
            severity: report.severity,
            urgent: report.urgent,
            status: report.status,
            tally,
            triage: if is_reviewer { report.triage } else { None },
            validations: is_reviewer.then_some(report.validations),
            decision,
            supersedes: report.supersedes,
            metrics: report.metrics,
            created_at: report.created_at,
            updated_at: report.updated_at,
        }
    }
}

/// Review queue order: urgent first, then severity (unknown last), then
/// engagement, then most disputed, then oldest.
pub fn queue_order(a: &Report, b: &Report) -> Ordering {
    let (ta, tb) = (a.tally(), b.tally());
    b.urgent
        .cmp(&a.urgent)
        .then_with(|| severity_rank(b.severity).cmp(&severity_rank(a.severity)))
        .then_with(|| tb.engagement().cmp(&ta.engagement()))
        .then_with(|| ta.net.cmp(&tb.net))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

fn severity_rank(severity: Option<Severity>) -> u8 {
    match severity {
        Some(Severity::Critical) => 4,
        Some(Severity::High) => 3,
        Some(Severity::Medium) => 2,
        Some(Severity::Low) => 1,
        None => 0,
    }
}

/// Fails submission on missing media; an unreachable store blocks it.
pub async fn verify_media(verifier: &dyn MediaVerifier, refs: &[String]) -> PipelineResult<()> {
    if refs.is_empty() {
        return Ok(());
    }
    let missing = verifier.missing(refs).await.map_err(|err| {
        tracing::error!(error = ?err, "media verification failed");
        PipelineError::Dependency("media storage unavailable".to_string())
    })?;
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::Validation(vec![Violation::new(
            "media_refs",
            format!("unknown media references: {}", missing.join(", ")),
        )]))
    }
}

#[derive(Clone)]
pub struct ReportService {
    reports: Arc<dyn ReportStore>,
    media: Arc<dyn MediaVerifier>,
    dispatcher: TriageDispatcher,
    clock: Arc<dyn Clock>,
}

impl ReportService {
    pub fn new(
        reports: Arc<dyn ReportStore>,
        media: Arc<dyn MediaVerifier>,
        dispatcher: TriageDispatcher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reports,
            media,
            dispatcher,
            clock,
        }
    }

    pub async fn submit(&self, caller: &Caller, submission: ReportSubmission) -> PipelineResult<Report> {
        let content = into_content(submission.content, ValidationProfile::Named)
            .map_err(PipelineError::Validation)?;
        verify_media(self.media.as_ref(), &content.media_refs).await?;

        if let Some(previous) = submission.supersedes {
            if self.reports.get_report(previous).await?.is_none() {
                return Err(PipelineError::invalid(
                    "supersedes",
                    "superseded report does not exist",
                ));
            }
        }

        let now = self.clock.now();
        let report = Report {
            id: Uuid::new_v4(),
            owner_id: (!submission.anonymous).then_some(caller.user_id),
            anonymous: submission.anonymous,
            content,
            severity: None,
            urgent: submission.urgent,
            status: ReportStatus::PendingTriage,
            triage: None,
            validations: Vec::new(),
            decision: None,
            supersedes: submission.supersedes,
            metrics: ReportMetrics::default(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.reports.insert_report(&report).await?;

        tracing::info!(
            report_id = %report.id,
            category = report.content.category.as_db(),
            anonymous = report.anonymous,
            "report submitted"
        );

        // A lost dispatch is picked up by the stale triage sweep.
        if let Err(err) = self.dispatcher.dispatch(report.id).await {
            tracing::warn!(report_id = %report.id, error = ?err, "failed to dispatch triage");
        }

        Ok(report)
    }

    /// Counts a view and returns the viewer's projection.
    pub async fn get(&self, viewer: Option<&Caller>, report_id: Uuid) -> PipelineResult<ReportView> {
        let mut report = self
            .reports
            .get_report(report_id)
            .await?
            .ok_or(PipelineError::NotFound("report"))?;
        self.reports.increment_views(report_id).await?;
        report.metrics.view_count += 1;
        Ok(ReportView::for_viewer(report, viewer))
    }

    pub async fn list(
        &self,
        viewer: Option<&Caller>,
        filter: &ReportFilter,
    ) -> PipelineResult<Vec<ReportView>> {
        let reports = self.reports.list_reports(filter).await?;
        Ok(reports
            .into_iter()
            .map(|report| ReportView::for_viewer(report, viewer))
            .collect())
    }

    pub async fn review_queue(&self, caller: &Caller, limit: i64) -> PipelineResult<Vec<ReportView>> {
        caller.require_reviewer()?;
        let reports = self.reports.review_queue(limit).await?;
        Ok(reports
            .into_iter()
            .map(|report| ReportView::for_viewer(report, Some(caller)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::auth::Role;
    use crate::domain::geo::GeoPoint;
    use crate::domain::report::{IncidentCategory, Vote};

    fn report(urgent: bool, severity: Option<Severity>, votes: &[Vote], age_minutes: i64) -> Report {
        let created_at = OffsetDateTime::UNIX_EPOCH + time::Duration::days(1)
            - time::Duration::minutes(age_minutes);
        let mut report = Report {
            id: Uuid::new_v4(),
            owner_id: Some(Uuid::new_v4()),
            anonymous: false,
            content: ReportContent {
                category: IncidentCategory::Landslide,
                title: "Encosta cedendo".into(),
                description: "Cracks opened on the slope behind the school".into(),
                location: GeoPoint::new(-22.9, -43.2),
                address: None,
                media_refs: vec![],
            },
            severity,
            urgent,
            status: ReportStatus::PendingCommunity,
            triage: None,
            validations: vec![],
            decision: None,
            supersedes: None,
            metrics: ReportMetrics::default(),
            version: 0,
            created_at,
            updated_at: created_at,
        };
        for vote in votes {
            report.upsert_validation(Uuid::new_v4(), *vote, None, created_at);
        }
        report
    }

    #[test]
    fn queue_puts_urgent_then_severe_first() {
        let calm = report(false, Some(Severity::Low), &[], 10);
        let critical = report(false, Some(Severity::Critical), &[], 5);
        let urgent_low = report(true, Some(Severity::Low), &[], 1);
        let unknown = report(false, None, &[], 60);

        let mut queue = vec![calm.clone(), unknown.clone(), critical.clone(), urgent_low.clone()];
        queue.sort_by(queue_order);
        let ids: Vec<_> = queue.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![urgent_low.id, critical.id, calm.id, unknown.id]);
    }

    #[test]
    fn queue_prefers_engaged_and_disputed_reports() {
        use Vote::*;
        let quiet = report(false, Some(Severity::High), &[Up], 10);
        let busy_positive = report(false, Some(Severity::High), &[Up, Up, Up], 10);
        let busy_negative = report(false, Some(Severity::High), &[Down, Down, Up], 10);

        let mut queue = vec![quiet.clone(), busy_positive.clone(), busy_negative.clone()];
        queue.sort_by(queue_order);
        let ids: Vec<_> = queue.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![busy_negative.id, busy_positive.id, quiet.id]);
    }

    #[test]
    fn view_hides_owner_and_internals_from_strangers() {
        let mut r = report(false, Some(Severity::High), &[Vote::Up], 1);
        r.decision = Some(AuthorityDecision {
            reviewer_id: Uuid::new_v4(),
            approved: true,
            public_response: Some("confirmed by field team".into()),
            internal_notes: Some("called the fire brigade".into()),
            decided_at: r.created_at,
        });
        let owner = Caller {
            user_id: r.owner_id.unwrap(),
            role: Role::Citizen,
        };
        let stranger = Caller {
            user_id: Uuid::new_v4(),
            role: Role::Citizen,
        };
        let reviewer = Caller {
            user_id: Uuid::new_v4(),
            role: Role::Reviewer,
        };

        let public = ReportView::for_viewer(r.clone(), Some(&stranger));
        assert_eq!(public.owner_id, None);
        assert!(public.validations.is_none());
        let decision = public.decision.unwrap();
        assert_eq!(decision.internal_notes, None);
        assert_eq!(decision.reviewer_id, None);
        assert_eq!(public.tally.up, 1);

        assert_eq!(ReportView::for_viewer(r.clone(), Some(&owner)).owner_id, r.owner_id);

        let full = ReportView::for_viewer(r.clone(), Some(&reviewer));
        assert_eq!(full.owner_id, r.owner_id);
        assert_eq!(
            full.decision.unwrap().internal_notes.as_deref(),
            Some("called the fire brigade")
        );
    }
}
