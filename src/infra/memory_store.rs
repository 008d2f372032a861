use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::error::{PipelineError, PipelineResult};
use crate::app::fingerprint::DuplicateGuard;
use crate::app::reports::queue_order;
use crate::domain::anonymous::AnonymousReport;
use crate::domain::incident::{IncidentStatus, PublicIncident};
use crate::domain::report::{Report, ReportStatus};
use crate::domain::triage::TriageAuditEntry;
use crate::infra::store::{
    AnonymousFilter, DUPLICATE_MESSAGE, AnonymousMutation, AnonymousReportStore, IncidentFilter, IncidentProjection,
    IncidentStore, ReportFilter, ReportMutation, ReportStore,
};

#[derive(Default)]
struct MemoryState {
    reports: HashMap<Uuid, Report>,
    anonymous: HashMap<Uuid, AnonymousReport>,
    incidents: HashMap<Uuid, PublicIncident>,
    incident_by_source: HashMap<Uuid, Uuid>,
    triage_audit: Vec<TriageAuditEntry>,
}

/// Process-local store with the same atomicity guarantees as `PgStore`.
/// Mutations run against a clone that is only written back on success.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page<T, K: Ord>(mut items: Vec<T>, limit: i64, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
    if limit > 0 {
        items.truncate(limit as usize);
    }
    items
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn insert_report(&self, report: &Report) -> PipelineResult<()> {
        let mut state = self.state.lock();
        if state.reports.contains_key(&report.id) {
            return Err(PipelineError::conflict(
                "report already exists",
                report.status.as_db(),
            ));
        }
        state.reports.insert(report.id, report.clone());
        Ok(())
    }

    async fn get_report(&self, id: Uuid) -> PipelineResult<Option<Report>> {
        Ok(self.state.lock().reports.get(&id).cloned())
    }

    async fn list_reports(&self, filter: &ReportFilter) -> PipelineResult<Vec<Report>> {
        let state = self.state.lock();
        let matching = state
            .reports
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        Ok(page(matching, filter.limit, |r: &Report| (r.created_at, r.id)))
    }

    async fn update_report(&self, id: Uuid, mutate: ReportMutation<'_>) -> PipelineResult<Report> {
        let mut state = self.state.lock();
        let current = state
            .reports
            .get(&id)
            .ok_or(PipelineError::NotFound("report"))?;
        let mut next = current.clone();
        mutate(&mut next)?;
        next.version += 1;
        state.reports.insert(id, next.clone());
        Ok(next)
    }

    async fn update_report_with_audit(
        &self,
        id: Uuid,
        mutate: ReportMutation<'_>,
        audit: &TriageAuditEntry,
    ) -> PipelineResult<Report> {
        let mut state = self.state.lock();
        let current = state
            .reports
            .get(&id)
            .ok_or(PipelineError::NotFound("report"))?;
        let mut next = current.clone();
        mutate(&mut next)?;
        next.version += 1;
        state.reports.insert(id, next.clone());
        state.triage_audit.push(audit.clone());
        Ok(next)
    }

    async fn append_triage_audit(&self, audit: &TriageAuditEntry) -> PipelineResult<()> {
        self.state.lock().triage_audit.push(audit.clone());
        Ok(())
    }

    async fn update_report_and_publish(
        &self,
        id: Uuid,
        mutate: ReportMutation<'_>,
        project: IncidentProjection<'_>,
    ) -> PipelineResult<(Report, PublicIncident)> {
        let mut state = self.state.lock();
        let current = state
            .reports
            .get(&id)
            .ok_or(PipelineError::NotFound("report"))?;
        let mut next = current.clone();
        mutate(&mut next)?;
        let projected = project(&next)?;

        let existing = state
            .incident_by_source
            .get(&next.id)
            .and_then(|incident_id| state.incidents.get(incident_id))
            .cloned();
        let incident = match existing {
            Some(existing) => existing,
            None => {
                state.incident_by_source.insert(next.id, projected.id);
                state.incidents.insert(projected.id, projected.clone());
                projected
            }
        };

        next.version += 1;
        state.reports.insert(id, next.clone());
        Ok((next, incident))
    }

    async fn review_queue(&self, limit: i64) -> PipelineResult<Vec<Report>> {
        let state = self.state.lock();
        let mut queue: Vec<Report> = state
            .reports
            .values()
            .filter(|r| {
                matches!(
                    r.status,
                    ReportStatus::PendingTriage | ReportStatus::PendingCommunity
                )
            })
            .cloned()
            .collect();
        queue.sort_by(queue_order);
        if limit > 0 {
            queue.truncate(limit as usize);
        }
        Ok(queue)
    }

    async fn increment_views(&self, id: Uuid) -> PipelineResult<()> {
        let mut state = self.state.lock();
        if let Some(report) = state.reports.get_mut(&id) {
            report.metrics.view_count += 1;
        }
        Ok(())
    }

    async fn list_triage_audit(&self, report_id: Uuid) -> PipelineResult<Vec<TriageAuditEntry>> {
        let state = self.state.lock();
        Ok(state
            .triage_audit
            .iter()
            .filter(|entry| entry.report_id == report_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AnonymousReportStore for MemoryStore {
    async fn insert_anonymous(
        &self,
        report: &AnonymousReport,
        guard: &DuplicateGuard,
    ) -> PipelineResult<()> {
        let mut state = self.state.lock();
        if state
            .anonymous
            .values()
            .any(|existing| guard.is_duplicate(existing, report))
        {
            return Err(PipelineError::Duplicate(DUPLICATE_MESSAGE.to_string()));
        }
        state.anonymous.insert(report.id, report.clone());
        Ok(())
    }

    async fn get_anonymous(&self, id: Uuid) -> PipelineResult<Option<AnonymousReport>> {
        Ok(self.state.lock().anonymous.get(&id).cloned())
    }

    async fn list_anonymous(
        &self,
        filter: &AnonymousFilter,
    ) -> PipelineResult<Vec<AnonymousReport>> {
        let state = self.state.lock();
        let matching = state
            .anonymous
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        Ok(page(matching, filter.limit, |r: &AnonymousReport| {
            (r.created_at, r.id)
        }))
    }

    async fn update_anonymous(
        &self,
        id: Uuid,
        mutate: AnonymousMutation<'_>,
    ) -> PipelineResult<AnonymousReport> {
        let mut state = self.state.lock();
        let current = state
            .anonymous
            .get(&id)
            .ok_or(PipelineError::NotFound("anonymous report"))?;
        let mut next = current.clone();
        mutate(&mut next)?;
        state.anonymous.insert(id, next.clone());
        Ok(next)
    }
}

#[async_trait]
impl IncidentStore for MemoryStore {
    async fn publish_incident(&self, incident: &PublicIncident) -> PipelineResult<PublicIncident> {
        let mut state = self.state.lock();
        if let Some(source_id) = incident.source_id {
            let existing = state
                .incident_by_source
                .get(&source_id)
                .and_then(|id| state.incidents.get(id))
                .cloned();
            if let Some(existing) = existing {
                return Ok(existing);
            }
            state.incident_by_source.insert(source_id, incident.id);
        }
        state.incidents.insert(incident.id, incident.clone());
        Ok(incident.clone())
    }

    async fn get_incident(&self, id: Uuid) -> PipelineResult<Option<PublicIncident>> {
        Ok(self.state.lock().incidents.get(&id).cloned())
    }

    async fn find_incident_by_source(
        &self,
        report_id: Uuid,
    ) -> PipelineResult<Option<PublicIncident>> {
        let state = self.state.lock();
        Ok(state
            .incident_by_source
            .get(&report_id)
            .and_then(|id| state.incidents.get(id))
            .cloned())
    }

    async fn list_incidents(&self, filter: &IncidentFilter) -> PipelineResult<Vec<PublicIncident>> {
        let state = self.state.lock();
        let matching = state
            .incidents
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        Ok(page(matching, filter.limit, |i: &PublicIncident| {
            (i.created_at, i.id)
        }))
    }

    async fn update_incident_status(
        &self,
        id: Uuid,
        status: IncidentStatus,
        now: OffsetDateTime,
    ) -> PipelineResult<PublicIncident> {
        let mut state = self.state.lock();
        let incident = state
            .incidents
            .get_mut(&id)
            .ok_or(PipelineError::NotFound("incident"))?;
        incident.status = status;
        incident.updated_at = now;
        Ok(incident.clone())
    }
}
