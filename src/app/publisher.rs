//! Projection of approved reports into the public incident feed.

use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::auth::Caller;
use crate::app::error::{PipelineError, PipelineResult};
use crate::domain::incident::{
    IncidentSource, IncidentStatus, IncidentType, PublicIncident, PublicSeverity,
};
use crate::domain::report::{IncidentCategory, Report, ReportStatus, Severity};
use crate::infra::clock::Clock;
use crate::infra::store::{IncidentFilter, IncidentStore, ReportStore};

pub fn map_severity(severity: Severity) -> PublicSeverity {
    match severity {
        Severity::Critical | Severity::High => PublicSeverity::High,
        Severity::Medium => PublicSeverity::Medium,
        Severity::Low => PublicSeverity::Low,
    }
}

/// Slow-onset hazards are published as alerts; everything else is an
/// incident. Shelters only come from official sources.
pub fn incident_type_for(category: IncidentCategory) -> IncidentType {
    match category {
        IncidentCategory::Drought => IncidentType::Alert,
        _ => IncidentType::Incident,
    }
}

/// Builds the public record for an approved report. Votes, triage detail
/// and reviewer notes are never copied.
pub fn project(report: &Report, now: OffsetDateTime) -> PipelineResult<PublicIncident> {
    if report.status != ReportStatus::Approved {
        return Err(PipelineError::conflict(
            "only approved reports are published",
            report.status.as_db(),
        ));
    }

    Ok(PublicIncident {
        id: Uuid::new_v4(),
        title: report.content.title.clone(),
        description: report.content.description.clone(),
        incident_type: incident_type_for(report.content.category),
        category: report.content.category,
        severity: map_severity(report.severity.unwrap_or(Severity::Medium)),
        status: IncidentStatus::Active,
        location: report.content.location,
        address: report.content.address.clone(),
        source: IncidentSource::UserReport,
        source_id: Some(report.id),
        created_at: now,
        updated_at: now,
    })
}

#[derive(Clone)]
pub struct PublisherService {
    reports: Arc<dyn ReportStore>,
    incidents: Arc<dyn IncidentStore>,
    clock: Arc<dyn Clock>,
}

impl PublisherService {
    pub fn new(
        reports: Arc<dyn ReportStore>,
        incidents: Arc<dyn IncidentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reports,
            incidents,
            clock,
        }
    }

    /// Re-runs publication for an approved report. Returns the existing
    /// incident when one is already present.
    pub async fn republish(&self, caller: &Caller, report_id: Uuid) -> PipelineResult<PublicIncident> {
        caller.require_reviewer()?;
        let report = self
            .reports
            .get_report(report_id)
            .await?
            .ok_or(PipelineError::NotFound("report"))?;

        if let Some(existing) = self.incidents.find_incident_by_source(report_id).await? {
            return Ok(existing);
        }

        let incident = project(&report, self.clock.now())?;
        let stored = self.incidents.publish_incident(&incident).await.map_err(|err| {
            tracing::error!(report_id = %report_id, error = ?err, "republish failed");
            match err {
                PipelineError::Storage(inner) => PipelineError::Publish(format!("{:#}", inner)),
                other => other,
            }
        })?;
        tracing::info!(report_id = %report_id, incident_id = %stored.id, "report republished");
        Ok(stored)
    }

    pub async fn set_status(
        &self,
        caller: &Caller,
        incident_id: Uuid,
        status: IncidentStatus,
    ) -> PipelineResult<PublicIncident> {
        caller.require_reviewer()?;
        let incident = self
            .incidents
            .update_incident_status(incident_id, status, self.clock.now())
            .await?;
        tracing::info!(incident_id = %incident_id, status = status.as_db(), "incident status updated");
        Ok(incident)
    }

    pub async fn get(&self, incident_id: Uuid) -> PipelineResult<PublicIncident> {
        self.incidents
            .get_incident(incident_id)
            .await?
            .ok_or(PipelineError::NotFound("incident"))
    }

    pub async fn list(&self, filter: &IncidentFilter) -> PipelineResult<Vec<PublicIncident>> {
        self.incidents.list_incidents(filter).await
    }
}
