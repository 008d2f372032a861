//! Anonymous intake. No caller identity is ever stored; the submitter
//! gets a tracking code instead.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::app::auth::Caller;
use crate::app::error::{PipelineError, PipelineResult, Violation};
use crate::app::fingerprint::{short, ClientSignals, DuplicateGuard, FingerprintGuard};
use crate::app::reports::verify_media;
use crate::app::validation::{
    into_content, validate_optional_text, ContentSubmission, ValidationProfile,
    REVIEW_TEXT_MAX_CHARS,
};
use crate::config::policy::PipelinePolicy;
use crate::domain::anonymous::{AnonymousReport, AnonymousStatus, AnonymousStatusView};
use crate::domain::report::Severity;
use crate::infra::clock::Clock;
use crate::infra::storage::MediaVerifier;
use crate::infra::store::{AnonymousFilter, AnonymousReportStore};

const TRACKING_SECRET_LEN: usize = 12;

/// `<report id>.<secret>`; only a hash of the secret is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingCode {
    pub report_id: Uuid,
    secret: String,
}

impl TrackingCode {
    pub fn generate(report_id: Uuid) -> Self {
        let secret = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TRACKING_SECRET_LEN)
            .map(char::from)
            .collect();
        Self { report_id, secret }
    }

    pub fn parse(code: &str) -> Option<Self> {
        let (id, secret) = code.trim().split_once('.')?;
        if secret.len() != TRACKING_SECRET_LEN || !secret.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(Self {
            report_id: Uuid::parse_str(id).ok()?,
            secret: secret.to_string(),
        })
    }

    pub fn secret_hash(&self) -> String {
        hex::encode(Sha256::digest(self.secret.as_bytes()))
    }

    pub fn matches(&self, stored_hash: &str) -> bool {
        self.secret_hash()
            .as_bytes()
            .ct_eq(stored_hash.as_bytes())
            .into()
    }

    pub fn as_string(&self) -> String {
        format!("{}.{}", self.report_id, self.secret)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnonymousSubmission {
    #[serde(flatten)]
    pub content: ContentSubmission,
    #[serde(default)]
    pub urgent: bool,
}

/// Returned once, at submission. The tracking code is not recoverable.
#[derive(Debug, Clone, Serialize)]
pub struct AnonymousReceipt {
    pub id: Uuid,
    pub tracking_code: String,
    pub status: AnonymousStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnonymousReviewRequest {
    pub status: AnonymousStatus,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub public_response: Option<String>,
    #[serde(default)]
    pub internal_notes: Option<String>,
}

pub fn apply_review(
    report: &mut AnonymousReport,
    reviewer_id: Uuid,
    request: &AnonymousReviewRequest,
    now: time::OffsetDateTime,
) -> PipelineResult<()> {
    if !report.status.can_transition_to(request.status) {
        let message = if report.status.is_terminal() {
            "report is already closed".to_string()
        } else {
            format!(
                "cannot move from {} to {}",
                report.status.as_db(),
                request.status.as_db()
            )
        };
        return Err(PipelineError::conflict(message, report.status.as_db()));
    }

    report.status = request.status;
    if let Some(severity) = request.severity {
        report.severity = Some(severity);
    }
    if let Some(response) = &request.public_response {
        report.public_response = Some(response.trim().to_string()).filter(|r| !r.is_empty());
    }
    if let Some(notes) = &request.internal_notes {
        report.internal_notes = Some(notes.trim().to_string()).filter(|n| !n.is_empty());
    }
    report.reviewed_by = Some(reviewer_id);
    report.updated_at = now;
    Ok(())
}

#[derive(Clone)]
pub struct AnonymousService {
    store: Arc<dyn AnonymousReportStore>,
    media: Arc<dyn MediaVerifier>,
    clock: Arc<dyn Clock>,
    policy: PipelinePolicy,
    fingerprints: FingerprintGuard,
}

impl AnonymousService {
    pub fn new(
        store: Arc<dyn AnonymousReportStore>,
        media: Arc<dyn MediaVerifier>,
        clock: Arc<dyn Clock>,
        policy: PipelinePolicy,
        fingerprint_salt: [u8; 32],
    ) -> Self {
        Self {
            store,
            media,
            clock,
            policy,
            fingerprints: FingerprintGuard::new(fingerprint_salt),
        }
    }

    pub async fn submit(
        &self,
        submission: AnonymousSubmission,
        signals: &ClientSignals,
    ) -> PipelineResult<AnonymousReceipt> {
        let content = into_content(submission.content, ValidationProfile::Anonymous)
            .map_err(PipelineError::Validation)?;
        verify_media(self.media.as_ref(), &content.media_refs).await?;

        let now = self.clock.now();
        let id = Uuid::new_v4();
        let tracking = TrackingCode::generate(id);
        let fingerprint = self.fingerprints.derive(signals);
        let report = AnonymousReport {
            id,
            content,
            urgent: submission.urgent,
            severity: None,
            status: AnonymousStatus::Pending,
            reporter_fingerprint: fingerprint,
            tracking_secret_hash: tracking.secret_hash(),
            public_response: None,
            internal_notes: None,
            reviewed_by: None,
            created_at: now,
            updated_at: now,
        };
        let guard = DuplicateGuard {
            since: now - self.policy.anon_duplicate_window(),
            radius_meters: self.policy.anon_duplicate_radius_meters,
        };

        if let Err(err) = self.store.insert_anonymous(&report, &guard).await {
            if matches!(err, PipelineError::Duplicate(_)) {
                tracing::info!(
                    fingerprint = short(&report.reporter_fingerprint),
                    category = report.content.category.as_db(),
                    "duplicate anonymous report rejected"
                );
            }
            return Err(err);
        }

        tracing::info!(
            report_id = %id,
            fingerprint = short(&report.reporter_fingerprint),
            "anonymous report submitted"
        );
        Ok(AnonymousReceipt {
            id,
            tracking_code: tracking.as_string(),
            status: report.status,
        })
    }

    /// Every failure looks the same to the caller.
    pub async fn status_by_tracking_code(&self, code: &str) -> PipelineResult<AnonymousStatusView> {
        let not_found = || PipelineError::NotFound("anonymous report");
        let tracking = TrackingCode::parse(code).ok_or_else(not_found)?;
        let report = self
            .store
            .get_anonymous(tracking.report_id)
            .await?
            .ok_or_else(not_found)?;
        if !tracking.matches(&report.tracking_secret_hash) {
            return Err(not_found());
        }
        Ok(AnonymousStatusView::from(&report))
    }

    pub async fn review(
        &self,
        caller: &Caller,
        report_id: Uuid,
        request: AnonymousReviewRequest,
    ) -> PipelineResult<AnonymousReport> {
        caller.require_reviewer()?;
        let violations: Vec<Violation> = [
            validate_optional_text(
                "public_response",
                request.public_response.as_deref(),
                REVIEW_TEXT_MAX_CHARS,
            ),
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
        let report = self
            .store
            .update_anonymous(report_id, &|r: &mut AnonymousReport| {
                apply_review(r, reviewer_id, &request, now)
            })
            .await?;

        tracing::info!(
            report_id = %report_id,
            status = report.status.as_db(),
            "anonymous report reviewed"
        );
        Ok(report)
    }

    pub async fn list(
        &self,
        caller: &Caller,
        filter: &AnonymousFilter,
    ) -> PipelineResult<Vec<AnonymousReport>> {
        caller.require_reviewer()?;
        self.store.list_anonymous(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geo::GeoPoint;
    use crate::domain::report::{IncidentCategory, ReportContent};
    use time::OffsetDateTime;

    #[test]
    fn tracking_code_parses_and_matches_its_hash() {
        let id = Uuid::new_v4();
        let code = TrackingCode::generate(id);
        let text = code.as_string();
        let parsed = TrackingCode::parse(&text).unwrap();
        assert_eq!(parsed.report_id, id);
        assert!(parsed.matches(&code.secret_hash()));

        let other = TrackingCode::generate(id);
        assert!(!parsed.matches(&other.secret_hash()));
    }

    #[test]
    fn malformed_tracking_codes_are_rejected() {
        let id = Uuid::new_v4();
        assert!(TrackingCode::parse("nonsense").is_none());
        assert!(TrackingCode::parse(&format!("{}.short", id)).is_none());
        assert!(TrackingCode::parse(&format!("{}.abc-def-ghij", id)).is_none());
        assert!(TrackingCode::parse("not-a-uuid.abcdefghijkl").is_none());
    }

    fn pending_report() -> AnonymousReport {
        let now = OffsetDateTime::UNIX_EPOCH;
        AnonymousReport {
            id: Uuid::new_v4(),
            content: ReportContent {
                category: IncidentCategory::Other,
                title: "Denuncia".into(),
                description: "Illegal dumping next to the river bank every night".into(),
                location: GeoPoint::new(-3.1, -60.0),
                address: None,
                media_refs: vec![],
            },
            urgent: false,
            severity: None,
            status: AnonymousStatus::Pending,
            reporter_fingerprint: "f".repeat(64),
            tracking_secret_hash: String::new(),
            public_response: None,
            internal_notes: None,
            reviewed_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn move_to(status: AnonymousStatus) -> AnonymousReviewRequest {
        AnonymousReviewRequest {
            status,
            severity: None,
            public_response: None,
            internal_notes: None,
        }
    }

    #[test]
    fn review_follows_ladder_and_stops_at_terminal() {
        let reviewer = Uuid::new_v4();
        let now = OffsetDateTime::UNIX_EPOCH;
        let mut report = pending_report();

        let skip = apply_review(&mut report, reviewer, &move_to(AnonymousStatus::Resolved), now);
        assert!(matches!(skip, Err(PipelineError::Conflict { .. })));
        assert_eq!(report.status, AnonymousStatus::Pending);

        apply_review(&mut report, reviewer, &move_to(AnonymousStatus::UnderReview), now).unwrap();
        apply_review(&mut report, reviewer, &move_to(AnonymousStatus::Resolved), now).unwrap();
        assert_eq!(report.reviewed_by, Some(reviewer));

        let reopen = apply_review(&mut report, reviewer, &move_to(AnonymousStatus::UnderReview), now);
        match reopen {
            Err(PipelineError::Conflict { current_status, .. }) => {
                assert_eq!(current_status, "resolved")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
