use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentCategory {
    Flood,
    Landslide,
    Fire,
    #[serde(alias = "structural-risk")]
    StructuralRisk,
    Drought,
    Windstorm,
    Other,
}

impl IncidentCategory {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "flood" => Some(Self::Flood),
            "landslide" => Some(Self::Landslide),
            "fire" => Some(Self::Fire),
            "structural_risk" | "structural-risk" => Some(Self::StructuralRisk),
            "drought" => Some(Self::Drought),
            "windstorm" => Some(Self::Windstorm),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Flood => "flood",
            Self::Landslide => "landslide",
            Self::Fire => "fire",
            Self::StructuralRisk => "structural_risk",
            Self::Drought => "drought",
            Self::Windstorm => "windstorm",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Lifecycle of a named report.
///
/// `PendingTriage -> PendingCommunity -> Approved | Rejected`, with a
/// direct `PendingTriage -> Approved | Rejected` short-circuit for
/// reviewers. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    PendingTriage,
    PendingCommunity,
    Approved,
    Rejected,
}

impl ReportStatus {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "pending_triage" => Some(Self::PendingTriage),
            "pending_community" => Some(Self::PendingCommunity),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::PendingTriage => "pending_triage",
            Self::PendingCommunity => "pending_community",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        use ReportStatus::*;
        matches!(
            (self, next),
            (PendingTriage, PendingCommunity)
                | (PendingTriage, Approved)
                | (PendingTriage, Rejected)
                | (PendingCommunity, Approved)
                | (PendingCommunity, Rejected)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    Up,
    Down,
}

/// Content shared by named and anonymous reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportContent {
    pub category: IncidentCategory,
    pub title: String,
    pub description: String,
    pub location: GeoPoint,
    pub address: Option<String>,
    pub media_refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    pub severity: Option<Severity>,
    pub confidence: f64,
    pub keywords: Vec<String>,
    pub flags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub assessed_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityValidation {
    pub validator_id: Uuid,
    pub vote: Vote,
    pub comment: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityDecision {
    pub reviewer_id: Uuid,
    pub approved: bool,
    pub public_response: Option<String>,
    pub internal_notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub decided_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMetrics {
    pub view_count: i64,
    pub validation_count: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub up: i64,
    pub down: i64,
    pub net: i64,
}

impl VoteTally {
    pub fn engagement(&self) -> i64 {
        self.up + self.down
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub anonymous: bool,
    pub content: ReportContent,
    pub severity: Option<Severity>,
    pub urgent: bool,
    pub status: ReportStatus,
    pub triage: Option<TriageResult>,
    pub validations: Vec<CommunityValidation>,
    pub decision: Option<AuthorityDecision>,
    pub supersedes: Option<Uuid>,
    pub metrics: ReportMetrics,
    pub version: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Report {
    pub fn tally(&self) -> VoteTally {
        let up = self
            .validations
            .iter()
            .filter(|v| v.vote == Vote::Up)
            .count() as i64;
        let down = self.validations.len() as i64 - up;
        VoteTally {
            up,
            down,
            net: up - down,
        }
    }

    /// Inserts or replaces the validator's vote. Returns true when the
    /// validator had not voted before.
    pub fn upsert_validation(
        &mut self,
        validator_id: Uuid,
        vote: Vote,
        comment: Option<String>,
        now: OffsetDateTime,
    ) -> bool {
        if let Some(existing) = self
            .validations
            .iter_mut()
            .find(|v| v.validator_id == validator_id)
        {
            existing.vote = vote;
            existing.comment = comment;
            existing.updated_at = now;
            return false;
        }

        self.validations.push(CommunityValidation {
            validator_id,
            vote,
            comment,
            created_at: now,
            updated_at: now,
        });
        self.metrics.validation_count += 1;
        true
    }
}
