use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::report::Severity;

pub const TRIAGE_UNAVAILABLE_FLAG: &str = "triage_unavailable";
pub const URGENT_FLAG: &str = "urgent";

/// Payload sent to the external scorer.
#[derive(Debug, Clone, Serialize)]
pub struct TriageRequest {
    pub title: String,
    pub description: String,
    pub media_refs: Vec<String>,
}

/// Scorer response, treated as advisory.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TriageAssessment {
    pub severity: Severity,
    pub confidence: f64,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageOutcome {
    Assessed,
    Unavailable,
}

impl TriageOutcome {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "assessed" => Some(Self::Assessed),
            "unavailable" => Some(Self::Unavailable),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Assessed => "assessed",
            Self::Unavailable => "unavailable",
        }
    }
}

/// One row per triage invocation; never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageAuditEntry {
    pub id: Uuid,
    pub report_id: Uuid,
    pub outcome: TriageOutcome,
    pub severity: Option<Severity>,
    pub confidence: Option<f64>,
    pub keywords: Vec<String>,
    pub flags: Vec<String>,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
