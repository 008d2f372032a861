use serde::Deserialize;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::auth::Caller;
use crate::app::error::{PipelineError, PipelineResult};
use crate::app::validation::{validate_optional_text, VOTE_COMMENT_MAX_CHARS};
use crate::domain::report::{Report, ReportStatus, Vote, VoteTally};
use crate::infra::clock::Clock;
use crate::infra::store::ReportStore;

#[derive(Debug, Clone, Deserialize)]
pub struct VoteRequest {
    pub vote: Vote,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Records or replaces one validator's vote. Votes are only collected
/// while the report is in `pending_community`.
pub fn apply_vote(
    report: &mut Report,
    validator_id: Uuid,
    vote: Vote,
    comment: Option<String>,
    now: OffsetDateTime,
) -> PipelineResult<bool> {
    if report.owner_id == Some(validator_id) {
        return Err(PipelineError::Authorization(
            "cannot validate your own report".to_string(),
        ));
    }
    match report.status {
        ReportStatus::PendingCommunity => {}
        ReportStatus::PendingTriage => {
            return Err(PipelineError::conflict(
                "report is not open for validation yet",
                report.status.as_db(),
            ))
        }
        ReportStatus::Approved | ReportStatus::Rejected => {
            return Err(PipelineError::conflict(
                "report already has a final decision",
                report.status.as_db(),
            ))
        }
    }

    let inserted = report.upsert_validation(validator_id, vote, comment, now);
    report.updated_at = now;
    Ok(inserted)
}

#[derive(Clone)]
pub struct CommunityService {
    reports: Arc<dyn ReportStore>,
    clock: Arc<dyn Clock>,
}

impl CommunityService {
    pub fn new(reports: Arc<dyn ReportStore>, clock: Arc<dyn Clock>) -> Self {
        Self { reports, clock }
    }

    pub async fn record_vote(
        &self,
        caller: &Caller,
        report_id: Uuid,
        request: VoteRequest,
    ) -> PipelineResult<VoteTally> {
        validate_optional_text("comment", request.comment.as_deref(), VOTE_COMMENT_MAX_CHARS)
            .map_err(|violation| PipelineError::Validation(vec![violation]))?;
        let comment = request
            .comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let now = self.clock.now();
        let validator_id = caller.user_id;
        let report = self
            .reports
            .update_report(report_id, &|r: &mut Report| {
                apply_vote(r, validator_id, request.vote, comment.clone(), now).map(|_| ())
            })
            .await?;

        let tally = report.tally();
        tracing::debug!(
            report_id = %report_id,
            up = tally.up,
            down = tally.down,
            "vote recorded"
        );
        Ok(tally)
    }
}
