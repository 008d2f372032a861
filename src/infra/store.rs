//! Storage seams for the pipeline.
//!
//! Every mutating method is an atomic read-modify-write on a single
//! record: the closure sees the latest committed state and, when it
//! returns an error, nothing is written. Implementations must serialize
//! concurrent mutations of the same record.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::error::PipelineResult;
use crate::app::fingerprint::DuplicateGuard;
use crate::domain::anonymous::{AnonymousReport, AnonymousStatus};
use crate::domain::geo::RadiusFilter;
use crate::domain::incident::{IncidentStatus, PublicIncident};
use crate::domain::report::{IncidentCategory, Report, ReportStatus};
use crate::domain::triage::TriageAuditEntry;

pub type ReportMutation<'a> = &'a (dyn Fn(&mut Report) -> PipelineResult<()> + Send + Sync);
pub type AnonymousMutation<'a> =
    &'a (dyn Fn(&mut AnonymousReport) -> PipelineResult<()> + Send + Sync);
pub type IncidentProjection<'a> =
    &'a (dyn Fn(&Report) -> PipelineResult<PublicIncident> + Send + Sync);

pub type Cursor = (OffsetDateTime, Uuid);

pub const DUPLICATE_MESSAGE: &str =
    "an open report with the same category and location was already submitted";

#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    /// Empty means any status.
    pub statuses: Vec<ReportStatus>,
    pub category: Option<IncidentCategory>,
    pub near: Option<RadiusFilter>,
    pub created_before: Option<OffsetDateTime>,
    pub cursor: Option<Cursor>,
    pub limit: i64,
}

impl ReportFilter {
    pub fn matches(&self, report: &Report) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&report.status))
            && self.category.map_or(true, |c| c == report.content.category)
            && self
                .near
                .map_or(true, |near| near.contains(&report.content.location))
            && self.created_before.map_or(true, |t| report.created_at < t)
            && before_cursor(self.cursor, report.created_at, report.id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    pub status: Option<IncidentStatus>,
    pub near: Option<RadiusFilter>,
    pub cursor: Option<Cursor>,
    pub limit: i64,
}

impl IncidentFilter {
    pub fn matches(&self, incident: &PublicIncident) -> bool {
        self.status.map_or(true, |s| s == incident.status)
            && self.near.map_or(true, |near| near.contains(&incident.location))
            && before_cursor(self.cursor, incident.created_at, incident.id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnonymousFilter {
    pub status: Option<AnonymousStatus>,
    pub cursor: Option<Cursor>,
    pub limit: i64,
}

impl AnonymousFilter {
    pub fn matches(&self, report: &AnonymousReport) -> bool {
        self.status.map_or(true, |s| s == report.status)
            && before_cursor(self.cursor, report.created_at, report.id)
    }
}

/// Newest-first keyset pagination: rows strictly after the cursor.
fn before_cursor(cursor: Option<Cursor>, created_at: OffsetDateTime, id: Uuid) -> bool {
    match cursor {
        Some((at, cursor_id)) => created_at < at || (created_at == at && id < cursor_id),
        None => true,
    }
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn insert_report(&self, report: &Report) -> PipelineResult<()>;

    async fn get_report(&self, id: Uuid) -> PipelineResult<Option<Report>>;

    /// Newest first.
    async fn list_reports(&self, filter: &ReportFilter) -> PipelineResult<Vec<Report>>;

    async fn update_report(&self, id: Uuid, mutate: ReportMutation<'_>) -> PipelineResult<Report>;

    /// Applies a triage mutation and appends its audit entry in one unit.
    async fn update_report_with_audit(
        &self,
        id: Uuid,
        mutate: ReportMutation<'_>,
        audit: &TriageAuditEntry,
    ) -> PipelineResult<Report>;

    /// Appends an audit entry on its own, for triage attempts whose
    /// mutation was refused.
    async fn append_triage_audit(&self, audit: &TriageAuditEntry) -> PipelineResult<()>;

    /// Applies a review mutation and publishes the projection of the
    /// mutated report in one unit. A failing projection or insert leaves
    /// the report untouched. An existing projection for the same report is
    /// reused instead of inserting a second one.
    async fn update_report_and_publish(
        &self,
        id: Uuid,
        mutate: ReportMutation<'_>,
        project: IncidentProjection<'_>,
    ) -> PipelineResult<(Report, PublicIncident)>;

    /// Undecided reports in review order: urgent first, then severity
    /// (unknown last), then engagement, then lowest net support, then
    /// oldest. `limit <= 0` means no limit.
    async fn review_queue(&self, limit: i64) -> PipelineResult<Vec<Report>>;

    async fn increment_views(&self, id: Uuid) -> PipelineResult<()>;

    async fn list_triage_audit(&self, report_id: Uuid) -> PipelineResult<Vec<TriageAuditEntry>>;
}

#[async_trait]
pub trait AnonymousReportStore: Send + Sync {
    /// Inserts unless an open report matches `guard`, in which case
    /// `PipelineError::Duplicate` is returned and nothing is written.
    async fn insert_anonymous(
        &self,
        report: &AnonymousReport,
        guard: &DuplicateGuard,
    ) -> PipelineResult<()>;

    async fn get_anonymous(&self, id: Uuid) -> PipelineResult<Option<AnonymousReport>>;

    async fn list_anonymous(&self, filter: &AnonymousFilter) -> PipelineResult<Vec<AnonymousReport>>;

    async fn update_anonymous(
        &self,
        id: Uuid,
        mutate: AnonymousMutation<'_>,
    ) -> PipelineResult<AnonymousReport>;
}

#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Insert-once keyed on the source report; returns the stored row.
    async fn publish_incident(&self, incident: &PublicIncident) -> PipelineResult<PublicIncident>;

    async fn get_incident(&self, id: Uuid) -> PipelineResult<Option<PublicIncident>>;

    async fn find_incident_by_source(&self, report_id: Uuid)
        -> PipelineResult<Option<PublicIncident>>;

    async fn list_incidents(&self, filter: &IncidentFilter) -> PipelineResult<Vec<PublicIncident>>;

    async fn update_incident_status(
        &self,
        id: Uuid,
        status: IncidentStatus,
        now: OffsetDateTime,
    ) -> PipelineResult<PublicIncident>;
}
