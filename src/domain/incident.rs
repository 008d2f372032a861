use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::geo::GeoPoint;
use crate::domain::report::IncidentCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    Incident,
    Alert,
    Shelter,
}

impl IncidentType {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "incident" => Some(Self::Incident),
            "alert" => Some(Self::Alert),
            "shelter" => Some(Self::Shelter),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Incident => "incident",
            Self::Alert => "alert",
            Self::Shelter => "shelter",
        }
    }
}

/// Public severity scale; coarser than the internal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublicSeverity {
    Low,
    Medium,
    High,
}

impl PublicSeverity {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Active,
    Investigating,
    Resolved,
}

impl IncidentStatus {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "investigating" => Some(Self::Investigating),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Investigating => "investigating",
            Self::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentSource {
    UserReport,
    OfficialAlert,
    TriageSystem,
}

impl IncidentSource {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "user_report" => Some(Self::UserReport),
            "official_alert" => Some(Self::OfficialAlert),
            "triage_system" => Some(Self::TriageSystem),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::UserReport => "user_report",
            Self::OfficialAlert => "official_alert",
            Self::TriageSystem => "triage_system",
        }
    }
}

/// Read-model row shown on maps and feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicIncident {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub incident_type: IncidentType,
    pub category: IncidentCategory,
    pub severity: PublicSeverity,
    pub status: IncidentStatus,
    pub location: GeoPoint,
    pub address: Option<String>,
    pub source: IncidentSource,
    pub source_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
