use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, Postgres, Row, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::error::{PipelineError, PipelineResult};
use crate::app::fingerprint::DuplicateGuard;
use crate::domain::anonymous::{AnonymousReport, AnonymousStatus};
use crate::domain::geo::GeoPoint;
use crate::domain::incident::{
    IncidentSource, IncidentStatus, IncidentType, PublicIncident, PublicSeverity,
};
use crate::domain::report::{
    AuthorityDecision, CommunityValidation, IncidentCategory, Report, ReportContent,
    ReportMetrics, ReportStatus, Severity, TriageResult,
};
use crate::domain::triage::{TriageAuditEntry, TriageOutcome};
use crate::infra::db::Db;
use crate::infra::store::{
    AnonymousFilter, AnonymousMutation, AnonymousReportStore, IncidentFilter, IncidentProjection,
    IncidentStore, ReportFilter, ReportMutation, ReportStore, DUPLICATE_MESSAGE,
};

const REPORT_COLUMNS: &str = "id, owner_id, anonymous, category, title, description, \
     latitude, longitude, address, media_refs, severity, urgent, status, triage, \
     validations, decision, supersedes, view_count, validation_count, version, \
     created_at, updated_at";

const ANONYMOUS_COLUMNS: &str = "id, category, title, description, latitude, longitude, \
     address, media_refs, urgent, severity, status, reporter_fingerprint, \
     tracking_secret_hash, public_response, internal_notes, reviewed_by, created_at, updated_at";

const INCIDENT_COLUMNS: &str = "id, title, description, incident_type, category, severity, \
     status, latitude, longitude, address, source, source_id, created_at, updated_at";

/// Postgres-backed store. Each mutation locks its row with `FOR UPDATE`
/// inside a transaction so concurrent writers serialize per record.
#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn decode<T>(value: &str, column: &str, parse: fn(&str) -> Option<T>) -> Result<T> {
    parse(value).ok_or_else(|| anyhow!("unexpected {} value: {}", column, value))
}

fn limit_param(limit: i64) -> Option<i64> {
    (limit > 0).then_some(limit)
}

fn content_from_row(row: &PgRow) -> Result<ReportContent> {
    let category: String = row.try_get("category")?;
    Ok(ReportContent {
        category: decode(&category, "category", IncidentCategory::from_db)?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        location: GeoPoint::new(row.try_get("latitude")?, row.try_get("longitude")?),
        address: row.try_get("address")?,
        media_refs: row.try_get("media_refs")?,
    })
}

fn optional_severity(row: &PgRow) -> Result<Option<Severity>> {
    let severity: Option<String> = row.try_get("severity")?;
    severity
        .map(|value| decode(&value, "severity", Severity::from_db))
        .transpose()
}

fn report_from_row(row: &PgRow) -> Result<Report> {
    let status: String = row.try_get("status")?;
    let triage: Option<Json<TriageResult>> = row.try_get("triage")?;
    let validations: Json<Vec<CommunityValidation>> = row.try_get("validations")?;
    let decision: Option<Json<AuthorityDecision>> = row.try_get("decision")?;

    Ok(Report {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        anonymous: row.try_get("anonymous")?,
        content: content_from_row(row)?,
        severity: optional_severity(row)?,
        urgent: row.try_get("urgent")?,
        status: decode(&status, "status", ReportStatus::from_db)?,
        triage: triage.map(|t| t.0),
        validations: validations.0,
        decision: decision.map(|d| d.0),
        supersedes: row.try_get("supersedes")?,
        metrics: ReportMetrics {
            view_count: row.try_get("view_count")?,
            validation_count: row.try_get("validation_count")?,
        },
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn anonymous_from_row(row: &PgRow) -> Result<AnonymousReport> {
    let status: String = row.try_get("status")?;
    Ok(AnonymousReport {
        id: row.try_get("id")?,
        content: content_from_row(row)?,
        urgent: row.try_get("urgent")?,
        severity: optional_severity(row)?,
        status: decode(&status, "status", AnonymousStatus::from_db)?,
        reporter_fingerprint: row.try_get("reporter_fingerprint")?,
        tracking_secret_hash: row.try_get("tracking_secret_hash")?,
        public_response: row.try_get("public_response")?,
        internal_notes: row.try_get("internal_notes")?,
        reviewed_by: row.try_get("reviewed_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn incident_from_row(row: &PgRow) -> Result<PublicIncident> {
    let incident_type: String = row.try_get("incident_type")?;
    let category: String = row.try_get("category")?;
    let severity: String = row.try_get("severity")?;
    let status: String = row.try_get("status")?;
    let source: String = row.try_get("source")?;

    Ok(PublicIncident {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        incident_type: decode(&incident_type, "incident_type", IncidentType::from_db)?,
        category: decode(&category, "category", IncidentCategory::from_db)?,
        severity: decode(&severity, "severity", PublicSeverity::from_db)?,
        status: decode(&status, "status", IncidentStatus::from_db)?,
        location: GeoPoint::new(row.try_get("latitude")?, row.try_get("longitude")?),
        address: row.try_get("address")?,
        source: decode(&source, "source", IncidentSource::from_db)?,
        source_id: row.try_get("source_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn audit_from_row(row: &PgRow) -> Result<TriageAuditEntry> {
    let outcome: String = row.try_get("outcome")?;
    Ok(TriageAuditEntry {
        id: row.try_get("id")?,
        report_id: row.try_get("report_id")?,
        outcome: decode(&outcome, "outcome", TriageOutcome::from_db)?,
        severity: optional_severity(row)?,
        confidence: row.try_get("confidence")?,
        keywords: row.try_get("keywords")?,
        flags: row.try_get("flags")?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
    })
}

async fn lock_report(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<Option<Report>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM reports WHERE id = $1 FOR UPDATE",
        REPORT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;

    row.as_ref().map(report_from_row).transpose()
}

/// Content columns are write-once; only lifecycle fields are rewritten.
async fn write_report(tx: &mut Transaction<'_, Postgres>, report: &Report) -> Result<()> {
    sqlx::query(
        "UPDATE reports SET severity = $2, urgent = $3, status = $4, triage = $5, \
         validations = $6, decision = $7, view_count = $8, validation_count = $9, \
         version = $10, updated_at = $11 \
         WHERE id = $1",
    )
    .bind(report.id)
    .bind(report.severity.map(|s| s.as_db()))
    .bind(report.urgent)
    .bind(report.status.as_db())
    .bind(report.triage.as_ref().map(Json))
    .bind(Json(&report.validations))
    .bind(report.decision.as_ref().map(Json))
    .bind(report.metrics.view_count)
    .bind(report.metrics.validation_count)
    .bind(report.version)
    .bind(report.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn mutate_locked(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    mutate: ReportMutation<'_>,
) -> PipelineResult<Report> {
    let mut report = lock_report(tx, id)
        .await?
        .ok_or(PipelineError::NotFound("report"))?;
    mutate(&mut report)?;
    report.version += 1;
    write_report(tx, &report).await?;
    Ok(report)
}

async fn insert_audit(conn: &mut PgConnection, audit: &TriageAuditEntry) -> Result<()> {
    sqlx::query(
        "INSERT INTO triage_audit_log \
         (id, report_id, outcome, severity, confidence, keywords, flags, error, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(audit.id)
    .bind(audit.report_id)
    .bind(audit.outcome.as_db())
    .bind(audit.severity.map(|s| s.as_db()))
    .bind(audit.confidence)
    .bind(&audit.keywords)
    .bind(&audit.flags)
    .bind(&audit.error)
    .bind(audit.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_incident_once(
    tx: &mut Transaction<'_, Postgres>,
    incident: &PublicIncident,
) -> Result<PublicIncident> {
    let inserted = sqlx::query(&format!(
        "INSERT INTO public_incidents ({}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
         ON CONFLICT (source_id) WHERE source = 'user_report' DO NOTHING \
         RETURNING {}",
        INCIDENT_COLUMNS, INCIDENT_COLUMNS
    ))
    .bind(incident.id)
    .bind(&incident.title)
    .bind(&incident.description)
    .bind(incident.incident_type.as_db())
    .bind(incident.category.as_db())
    .bind(incident.severity.as_db())
    .bind(incident.status.as_db())
    .bind(incident.location.latitude)
    .bind(incident.location.longitude)
    .bind(&incident.address)
    .bind(incident.source.as_db())
    .bind(incident.source_id)
    .bind(incident.created_at)
    .bind(incident.updated_at)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(row) = inserted {
        return incident_from_row(&row);
    }

    let row = sqlx::query(&format!(
        "SELECT {} FROM public_incidents WHERE source = 'user_report' AND source_id = $1",
        INCIDENT_COLUMNS
    ))
    .bind(incident.source_id)
    .fetch_one(&mut **tx)
    .await?;
    incident_from_row(&row)
}

#[async_trait]
impl ReportStore for PgStore {
    async fn insert_report(&self, report: &Report) -> PipelineResult<()> {
        sqlx::query(&format!(
            "INSERT INTO reports ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, \
             $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)",
            REPORT_COLUMNS
        ))
        .bind(report.id)
        .bind(report.owner_id)
        .bind(report.anonymous)
        .bind(report.content.category.as_db())
        .bind(&report.content.title)
        .bind(&report.content.description)
        .bind(report.content.location.latitude)
        .bind(report.content.location.longitude)
        .bind(&report.content.address)
        .bind(&report.content.media_refs)
        .bind(report.severity.map(|s| s.as_db()))
        .bind(report.urgent)
        .bind(report.status.as_db())
        .bind(report.triage.as_ref().map(Json))
        .bind(Json(&report.validations))
        .bind(report.decision.as_ref().map(Json))
        .bind(report.supersedes)
        .bind(report.metrics.view_count)
        .bind(report.metrics.validation_count)
        .bind(report.version)
        .bind(report.created_at)
        .bind(report.updated_at)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    async fn get_report(&self, id: Uuid) -> PipelineResult<Option<Report>> {
        let row = sqlx::query(&format!("SELECT {} FROM reports WHERE id = $1", REPORT_COLUMNS))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.as_ref().map(report_from_row).transpose()?)
    }

    async fn list_reports(&self, filter: &ReportFilter) -> PipelineResult<Vec<Report>> {
        let statuses: Vec<&str> = filter.statuses.iter().map(|s| s.as_db()).collect();
        let (cursor_at, cursor_id) = filter.cursor.unzip();

        let rows = sqlx::query(&format!(
            "SELECT {} FROM reports \
             WHERE (cardinality($1::text[]) = 0 OR status = ANY($1)) \
               AND ($2::text IS NULL OR category = $2) \
               AND ($3::float8 IS NULL \
                    OR vigia_distance_meters($3, $4, latitude, longitude) <= $5) \
               AND ($6::timestamptz IS NULL OR created_at < $6) \
               AND ($7::timestamptz IS NULL \
                    OR created_at < $7 OR (created_at = $7 AND id < $8)) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $9",
            REPORT_COLUMNS
        ))
        .bind(statuses)
        .bind(filter.category.map(|c| c.as_db()))
        .bind(filter.near.map(|n| n.center.latitude))
        .bind(filter.near.map(|n| n.center.longitude))
        .bind(filter.near.map(|n| n.radius_km * 1000.0))
        .bind(filter.created_before)
        .bind(cursor_at)
        .bind(cursor_id)
        .bind(limit_param(filter.limit))
        .fetch_all(self.db.pool())
        .await?;

        let mut reports = Vec::with_capacity(rows.len());
        for row in &rows {
            reports.push(report_from_row(row)?);
        }
        Ok(reports)
    }

    async fn update_report(&self, id: Uuid, mutate: ReportMutation<'_>) -> PipelineResult<Report> {
        let mut tx = self.db.pool().begin().await?;
        let report = mutate_locked(&mut tx, id, mutate).await?;
        tx.commit().await?;
        Ok(report)
    }

    async fn update_report_with_audit(
        &self,
        id: Uuid,
        mutate: ReportMutation<'_>,
        audit: &TriageAuditEntry,
    ) -> PipelineResult<Report> {
        let mut tx = self.db.pool().begin().await?;
        let report = mutate_locked(&mut tx, id, mutate).await?;
        insert_audit(&mut *tx, audit).await?;
        tx.commit().await?;
        Ok(report)
    }

    async fn append_triage_audit(&self, audit: &TriageAuditEntry) -> PipelineResult<()> {
        let mut conn = self.db.pool().acquire().await?;
        insert_audit(&mut *conn, audit).await?;
        Ok(())
    }

    async fn update_report_and_publish(
        &self,
        id: Uuid,
        mutate: ReportMutation<'_>,
        project: IncidentProjection<'_>,
    ) -> PipelineResult<(Report, PublicIncident)> {
        let mut tx = self.db.pool().begin().await?;
        let mut report = lock_report(&mut tx, id)
            .await?
            .ok_or(PipelineError::NotFound("report"))?;
        mutate(&mut report)?;
        let projected = project(&report)?;
        let incident = insert_incident_once(&mut tx, &projected)
            .await
            .map_err(|err| PipelineError::Publish(format!("{:#}", err)))?;
        report.version += 1;
        write_report(&mut tx, &report).await?;
        tx.commit().await?;
        Ok((report, incident))
    }

    async fn review_queue(&self, limit: i64) -> PipelineResult<Vec<Report>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM reports \
             WHERE status = ANY($1) \
             ORDER BY urgent DESC, \
                      CASE severity \
                          WHEN 'critical' THEN 4 WHEN 'high' THEN 3 \
                          WHEN 'medium' THEN 2 WHEN 'low' THEN 1 ELSE 0 \
                      END DESC, \
                      jsonb_array_length(validations) DESC, \
                      (SELECT COALESCE(SUM(CASE WHEN v->>'vote' = 'up' THEN 1 ELSE -1 END), 0) \
                       FROM jsonb_array_elements(validations) AS v) ASC, \
                      created_at ASC, id ASC \
             LIMIT $2",
            REPORT_COLUMNS
        ))
        .bind(vec![
            ReportStatus::PendingTriage.as_db(),
            ReportStatus::PendingCommunity.as_db(),
        ])
        .bind(limit_param(limit))
        .fetch_all(self.db.pool())
        .await?;

        let mut reports = Vec::with_capacity(rows.len());
        for row in &rows {
            reports.push(report_from_row(row)?);
        }
        Ok(reports)
    }

    async fn increment_views(&self, id: Uuid) -> PipelineResult<()> {
        sqlx::query("UPDATE reports SET view_count = view_count + 1 WHERE id = $1")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn list_triage_audit(&self, report_id: Uuid) -> PipelineResult<Vec<TriageAuditEntry>> {
        let rows = sqlx::query(
            "SELECT id, report_id, outcome, severity, confidence, keywords, flags, error, created_at \
             FROM triage_audit_log \
             WHERE report_id = $1 \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(report_id)
        .fetch_all(self.db.pool())
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(audit_from_row(row)?);
        }
        Ok(entries)
    }
}

#[async_trait]
impl AnonymousReportStore for PgStore {
    async fn insert_anonymous(
        &self,
        report: &AnonymousReport,
        guard: &DuplicateGuard,
    ) -> PipelineResult<()> {
        let mut tx = self.db.pool().begin().await?;

        // Serializes concurrent submissions from the same reporter.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&report.reporter_fingerprint)
            .execute(&mut *tx)
            .await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM anonymous_reports \
             WHERE reporter_fingerprint = $1 \
               AND category = $2 \
               AND status IN ('pending', 'under_review', 'investigating') \
               AND created_at >= $3",
            ANONYMOUS_COLUMNS
        ))
        .bind(&report.reporter_fingerprint)
        .bind(report.content.category.as_db())
        .bind(guard.since)
        .fetch_all(&mut *tx)
        .await?;

        for row in &rows {
            let existing = anonymous_from_row(row)?;
            if guard.is_duplicate(&existing, report) {
                return Err(PipelineError::Duplicate(DUPLICATE_MESSAGE.to_string()));
            }
        }

        sqlx::query(&format!(
            "INSERT INTO anonymous_reports ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, \
             $10, $11, $12, $13, $14, $15, $16, $17, $18)",
            ANONYMOUS_COLUMNS
        ))
        .bind(report.id)
        .bind(report.content.category.as_db())
        .bind(&report.content.title)
        .bind(&report.content.description)
        .bind(report.content.location.latitude)
        .bind(report.content.location.longitude)
        .bind(&report.content.address)
        .bind(&report.content.media_refs)
        .bind(report.urgent)
        .bind(report.severity.map(|s| s.as_db()))
        .bind(report.status.as_db())
        .bind(&report.reporter_fingerprint)
        .bind(&report.tracking_secret_hash)
        .bind(&report.public_response)
        .bind(&report.internal_notes)
        .bind(report.reviewed_by)
        .bind(report.created_at)
        .bind(report.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_anonymous(&self, id: Uuid) -> PipelineResult<Option<AnonymousReport>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM anonymous_reports WHERE id = $1",
            ANONYMOUS_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(anonymous_from_row).transpose()?)
    }

    async fn list_anonymous(
        &self,
        filter: &AnonymousFilter,
    ) -> PipelineResult<Vec<AnonymousReport>> {
        let (cursor_at, cursor_id) = filter.cursor.unzip();
        let rows = sqlx::query(&format!(
            "SELECT {} FROM anonymous_reports \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::timestamptz IS NULL \
                    OR created_at < $2 OR (created_at = $2 AND id < $3)) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $4",
            ANONYMOUS_COLUMNS
        ))
        .bind(filter.status.map(|s| s.as_db()))
        .bind(cursor_at)
        .bind(cursor_id)
        .bind(limit_param(filter.limit))
        .fetch_all(self.db.pool())
        .await?;

        let mut reports = Vec::with_capacity(rows.len());
        for row in &rows {
            reports.push(anonymous_from_row(row)?);
        }
        Ok(reports)
    }

    async fn update_anonymous(
        &self,
        id: Uuid,
        mutate: AnonymousMutation<'_>,
    ) -> PipelineResult<AnonymousReport> {
        let mut tx = self.db.pool().begin().await?;
        let row = sqlx::query(&format!(
            "SELECT {} FROM anonymous_reports WHERE id = $1 FOR UPDATE",
            ANONYMOUS_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(PipelineError::NotFound("anonymous report"))?;

        let mut report = anonymous_from_row(&row)?;
        mutate(&mut report)?;

        sqlx::query(
            "UPDATE anonymous_reports SET status = $2, severity = $3, urgent = $4, \
             public_response = $5, internal_notes = $6, reviewed_by = $7, updated_at = $8 \
             WHERE id = $1",
        )
        .bind(report.id)
        .bind(report.status.as_db())
        .bind(report.severity.map(|s| s.as_db()))
        .bind(report.urgent)
        .bind(&report.public_response)
        .bind(&report.internal_notes)
        .bind(report.reviewed_by)
        .bind(report.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(report)
    }
}

#[async_trait]
impl IncidentStore for PgStore {
    async fn publish_incident(&self, incident: &PublicIncident) -> PipelineResult<PublicIncident> {
        let mut tx = self.db.pool().begin().await?;
        let stored = insert_incident_once(&mut tx, incident).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn get_incident(&self, id: Uuid) -> PipelineResult<Option<PublicIncident>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM public_incidents WHERE id = $1",
            INCIDENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(incident_from_row).transpose()?)
    }

    async fn find_incident_by_source(
        &self,
        report_id: Uuid,
    ) -> PipelineResult<Option<PublicIncident>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM public_incidents WHERE source = 'user_report' AND source_id = $1",
            INCIDENT_COLUMNS
        ))
        .bind(report_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(incident_from_row).transpose()?)
    }

    async fn list_incidents(&self, filter: &IncidentFilter) -> PipelineResult<Vec<PublicIncident>> {
        let (cursor_at, cursor_id) = filter.cursor.unzip();
        let rows = sqlx::query(&format!(
            "SELECT {} FROM public_incidents \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::float8 IS NULL \
                    OR vigia_distance_meters($2, $3, latitude, longitude) <= $4) \
               AND ($5::timestamptz IS NULL \
                    OR created_at < $5 OR (created_at = $5 AND id < $6)) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $7",
            INCIDENT_COLUMNS
        ))
        .bind(filter.status.map(|s| s.as_db()))
        .bind(filter.near.map(|n| n.center.latitude))
        .bind(filter.near.map(|n| n.center.longitude))
        .bind(filter.near.map(|n| n.radius_km * 1000.0))
        .bind(cursor_at)
        .bind(cursor_id)
        .bind(limit_param(filter.limit))
        .fetch_all(self.db.pool())
        .await?;

        let mut incidents = Vec::with_capacity(rows.len());
        for row in &rows {
            incidents.push(incident_from_row(row)?);
        }
        Ok(incidents)
    }

    async fn update_incident_status(
        &self,
        id: Uuid,
        status: IncidentStatus,
        now: OffsetDateTime,
    ) -> PipelineResult<PublicIncident> {
        let row = sqlx::query(&format!(
            "UPDATE public_incidents SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            INCIDENT_COLUMNS
        ))
        .bind(id)
        .bind(status.as_db())
        .bind(now)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or(PipelineError::NotFound("incident"))?;

        Ok(incident_from_row(&row)?)
    }
}
