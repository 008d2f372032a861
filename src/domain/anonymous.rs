use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::report::{IncidentCategory, ReportContent, Severity};

/// Lifecycle of an anonymous report. Only reviewers move it forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnonymousStatus {
    Pending,
    UnderReview,
    Investigating,
    Resolved,
    Rejected,
}

impl AnonymousStatus {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "under_review" => Some(Self::UnderReview),
            "investigating" => Some(Self::Investigating),
            "resolved" => Some(Self::Resolved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UnderReview => "under_review",
            Self::Investigating => "investigating",
            Self::Resolved => "resolved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Rejected)
    }

    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(&self, next: AnonymousStatus) -> bool {
        use AnonymousStatus::*;
        matches!(
            (self, next),
            (Pending, UnderReview)
                | (Pending, Rejected)
                | (UnderReview, Investigating)
                | (UnderReview, Resolved)
                | (UnderReview, Rejected)
                | (Investigating, Resolved)
                | (Investigating, Rejected)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymousReport {
    pub id: Uuid,
    pub content: ReportContent,
    pub urgent: bool,
    pub severity: Option<Severity>,
    pub status: AnonymousStatus,
    /// Salted hash of client signals; never leaves the service.
    #[serde(skip_serializing)]
    pub reporter_fingerprint: String,
    #[serde(skip_serializing)]
    pub tracking_secret_hash: String,
    pub public_response: Option<String>,
    pub internal_notes: Option<String>,
    pub reviewed_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// What a tracking-code holder may see.
#[derive(Debug, Clone, Serialize)]
pub struct AnonymousStatusView {
    pub id: Uuid,
    pub status: AnonymousStatus,
    pub category: IncidentCategory,
    pub title: String,
    pub public_response: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&AnonymousReport> for AnonymousStatusView {
    fn from(report: &AnonymousReport) -> Self {
        Self {
            id: report.id,
            status: report.status,
            category: report.content.category,
            title: report.content.title.clone(),
            public_response: report.public_response.clone(),
            created_at: report.created_at,
            updated_at: report.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_transitions_follow_review_ladder() {
        use AnonymousStatus::*;
        assert!(Pending.can_transition_to(UnderReview));
        assert!(!Pending.can_transition_to(Investigating));
        assert!(!Pending.can_transition_to(Resolved));
        assert!(UnderReview.can_transition_to(Investigating));
        assert!(Investigating.can_transition_to(Resolved));
        assert!(!Resolved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(UnderReview));
    }

    #[test]
    fn open_states_exclude_terminal_ones() {
        use AnonymousStatus::*;
        assert!(Pending.is_open());
        assert!(Investigating.is_open());
        assert!(!Resolved.is_open());
        assert!(!Rejected.is_open());
    }
}
