use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::anonymous::{
    AnonymousReceipt, AnonymousReviewRequest, AnonymousService, AnonymousSubmission,
};
use crate::app::community::{CommunityService, VoteRequest};
use crate::app::fingerprint::ClientSignals;
use crate::app::publisher::PublisherService;
use crate::app::reports::{ReportService, ReportSubmission, ReportView};
use crate::app::review::{ReviewRequest, ReviewService};
use crate::app::triage::TriageService;
use crate::domain::anonymous::{AnonymousReport, AnonymousStatus, AnonymousStatusView};
use crate::domain::geo::{GeoPoint, RadiusFilter};
use crate::domain::incident::{IncidentStatus, PublicIncident};
use crate::domain::report::{IncidentCategory, ReportStatus, VoteTally};
use crate::domain::triage::TriageAuditEntry;
use crate::infra::store::{AnonymousFilter, Cursor, IncidentFilter, ReportFilter};
use crate::http::{AppError, AuthUser, OptionalAuthUser};
use crate::AppState;

pub const DEVICE_FINGERPRINT_HEADER: &str = "x-device-fingerprint";

const DEFAULT_LIMIT: i64 = 30;
const MAX_LIMIT: i64 = 100;
const MAX_RADIUS_KM: f64 = 500.0;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

fn parse_cursor(cursor: Option<String>) -> Result<Option<Cursor>, AppError> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };

    let (timestamp, id) = cursor
        .split_once('/')
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;
    let timestamp = OffsetDateTime::parse(timestamp, &Rfc3339)
        .map_err(|_| AppError::bad_request("invalid cursor"))?;
    let id = Uuid::parse_str(id).map_err(|_| AppError::bad_request("invalid cursor"))?;

    Ok(Some((timestamp, id)))
}

fn encode_cursor(cursor: Option<Cursor>) -> Option<String> {
    let (timestamp, id) = cursor?;
    let timestamp = timestamp.format(&Rfc3339).ok()?;
    Some(format!("{}/{}", timestamp, id))
}

fn parse_limit(limit: Option<i64>) -> Result<i64, AppError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(AppError::bad_request(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }
    Ok(limit)
}

/// Fetches one row past the page; the last row kept becomes the cursor.
fn paginate<T>(
    mut items: Vec<T>,
    limit: i64,
    key: impl Fn(&T) -> Cursor,
) -> ListResponse<T> {
    let next_cursor = if items.len() > limit as usize {
        items.truncate(limit as usize);
        items.last().map(&key)
    } else {
        None
    };
    ListResponse {
        items,
        next_cursor: encode_cursor(next_cursor),
    }
}

fn parse_radius(
    lat: Option<f64>,
    lng: Option<f64>,
    radius_km: Option<f64>,
) -> Result<Option<RadiusFilter>, AppError> {
    match (lat, lng, radius_km) {
        (None, None, None) => Ok(None),
        (Some(lat), Some(lng), Some(radius_km)) => {
            let center = GeoPoint::new(lat, lng);
            if !center.is_valid() {
                return Err(AppError::bad_request("lat/lng out of range"));
            }
            if !(radius_km > 0.0 && radius_km <= MAX_RADIUS_KM) {
                return Err(AppError::bad_request(format!(
                    "radius_km must be greater than 0 and at most {}",
                    MAX_RADIUS_KM
                )));
            }
            Ok(Some(RadiusFilter { center, radius_km }))
        }
        _ => Err(AppError::bad_request(
            "lat, lng and radius_km must be given together",
        )),
    }
}

fn parse_statuses(value: Option<&str>) -> Result<Vec<ReportStatus>, AppError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            ReportStatus::from_db(s)
                .ok_or_else(|| AppError::bad_request(format!("unknown status: {}", s)))
        })
        .collect()
}

fn report_service(state: &AppState) -> ReportService {
    ReportService::new(
        state.reports.clone(),
        state.media.clone(),
        state.dispatcher.clone(),
        state.clock.clone(),
    )
}

fn triage_service(state: &AppState) -> TriageService {
    TriageService::new(
        state.reports.clone(),
        state.triage_client.clone(),
        state.clock.clone(),
        state.policy,
    )
}

fn publisher_service(state: &AppState) -> PublisherService {
    PublisherService::new(
        state.reports.clone(),
        state.incidents.clone(),
        state.clock.clone(),
    )
}

fn anonymous_service(state: &AppState) -> AnonymousService {
    AnonymousService::new(
        state.anonymous.clone(),
        state.media.clone(),
        state.clock.clone(),
        state.policy,
        state.fingerprint_salt,
    )
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db = match &state.db {
        Some(db) => db.ping().await.is_ok(),
        None => true,
    };
    let redis = match &state.cache {
        Some(cache) => cache.ping().await.is_ok(),
        None => true,
    };
    let status = if db && redis { "ok" } else { "degraded" };

    Json(HealthResponse { status })
}

pub async fn submit_report(
    auth: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<ReportSubmission>, JsonRejection>,
) -> Result<(StatusCode, Json<ReportView>), AppError> {
    let Json(payload) = payload?;
    let caller = auth.0;
    let report = report_service(&state).submit(&caller, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ReportView::for_viewer(report, Some(&caller))),
    ))
}

pub async fn get_report(
    Path(id): Path<Uuid>,
    auth: OptionalAuthUser,
    State(state): State<AppState>,
) -> Result<Json<ReportView>, AppError> {
    let view = report_service(&state).get(auth.0.as_ref(), id).await?;
    Ok(Json(view))
}

#[derive(Deserialize)]
pub struct ReportListQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_km: Option<f64>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

pub async fn list_reports(
    auth: OptionalAuthUser,
    State(state): State<AppState>,
    Query(query): Query<ReportListQuery>,
) -> Result<Json<ListResponse<ReportView>>, AppError> {
    let limit = parse_limit(query.limit)?;
    let category = match query.category.as_deref() {
        Some(value) => Some(
            IncidentCategory::from_db(value)
                .ok_or_else(|| AppError::bad_request(format!("unknown category: {}", value)))?,
        ),
        None => None,
    };
    let filter = ReportFilter {
        statuses: parse_statuses(query.status.as_deref())?,
        category,
        near: parse_radius(query.lat, query.lng, query.radius_km)?,
        created_before: None,
        cursor: parse_cursor(query.cursor)?,
        limit: limit + 1,
    };

    let reports = report_service(&state).list(auth.0.as_ref(), &filter).await?;
    Ok(Json(paginate(reports, limit, |r| (r.created_at, r.id))))
}

#[derive(Deserialize)]
pub struct QueueQuery {
    pub limit: Option<i64>,
}

pub async fn review_queue(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<QueueQuery>,
) -> Result<Json<Vec<ReportView>>, AppError> {
    let limit = parse_limit(query.limit)?;
    let queue = report_service(&state)
        .review_queue(&auth.0, limit)
        .await?;
    Ok(Json(queue))
}

pub async fn vote_on_report(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<VoteTally>, AppError> {
    let Json(payload) = payload?;
    let service = CommunityService::new(state.reports.clone(), state.clock.clone());
    let tally = service.record_vote(&auth.0, id, payload).await?;
    Ok(Json(tally))
}

#[derive(Serialize)]
pub struct ReviewResponse {
    pub report: ReportView,
    pub incident: Option<PublicIncident>,
}

pub async fn review_report(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<ReviewRequest>, JsonRejection>,
) -> Result<Json<ReviewResponse>, AppError> {
    let Json(payload) = payload?;
    let caller = auth.0;
    let service = ReviewService::new(state.reports.clone(), state.clock.clone());
    let outcome = service.review(&caller, id, payload).await?;
    Ok(Json(ReviewResponse {
        report: ReportView::for_viewer(outcome.report, Some(&caller)),
        incident: outcome.incident,
    }))
}

pub async fn trigger_triage(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ReportView>, AppError> {
    let caller = auth.0;
    caller.require_reviewer()?;
    let report = triage_service(&state).triage_report(id).await?;
    Ok(Json(ReportView::for_viewer(report, Some(&caller))))
}

pub async fn triage_log(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<TriageAuditEntry>>, AppError> {
    let entries = triage_service(&state).audit_log(&auth.0, id).await?;
    Ok(Json(entries))
}

pub async fn publish_report(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<PublicIncident>, AppError> {
    let incident = publisher_service(&state).republish(&auth.0, id).await?;
    Ok(Json(incident))
}

#[derive(Deserialize)]
pub struct IncidentListQuery {
    pub status: Option<IncidentStatus>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_km: Option<f64>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

pub async fn list_incidents(
    State(state): State<AppState>,
    Query(query): Query<IncidentListQuery>,
) -> Result<Json<ListResponse<PublicIncident>>, AppError> {
    let limit = parse_limit(query.limit)?;
    let filter = IncidentFilter {
        status: query.status,
        near: parse_radius(query.lat, query.lng, query.radius_km)?,
        cursor: parse_cursor(query.cursor)?,
        limit: limit + 1,
    };
    let incidents = publisher_service(&state).list(&filter).await?;
    Ok(Json(paginate(incidents, limit, |i| (i.created_at, i.id))))
}

pub async fn get_incident(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<PublicIncident>, AppError> {
    let incident = publisher_service(&state).get(id).await?;
    Ok(Json(incident))
}

#[derive(Deserialize)]
pub struct IncidentStatusRequest {
    pub status: IncidentStatus,
}

pub async fn update_incident_status(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<IncidentStatusRequest>, JsonRejection>,
) -> Result<Json<PublicIncident>, AppError> {
    let Json(payload) = payload?;
    let incident = publisher_service(&state)
        .set_status(&auth.0, id, payload.status)
        .await?;
    Ok(Json(incident))
}

fn client_signals(headers: &HeaderMap, addr: SocketAddr) -> ClientSignals {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    ClientSignals {
        device_fingerprint: header(DEVICE_FINGERPRINT_HEADER),
        user_agent: header("user-agent"),
        ip: Some(addr.ip()),
    }
}

/// No extractor for the caller here: a session, if sent, is ignored.
pub async fn submit_anonymous_report(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<AnonymousSubmission>, JsonRejection>,
) -> Result<(StatusCode, Json<AnonymousReceipt>), AppError> {
    let Json(payload) = payload?;
    let signals = client_signals(&headers, addr);
    let receipt = anonymous_service(&state).submit(payload, &signals).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn track_anonymous_report(
    Path(code): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AnonymousStatusView>, AppError> {
    let view = anonymous_service(&state)
        .status_by_tracking_code(&code)
        .await?;
    Ok(Json(view))
}

#[derive(Deserialize)]
pub struct AnonymousListQuery {
    pub status: Option<AnonymousStatus>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

pub async fn list_anonymous_reports(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<AnonymousListQuery>,
) -> Result<Json<ListResponse<AnonymousReport>>, AppError> {
    let limit = parse_limit(query.limit)?;
    let filter = AnonymousFilter {
        status: query.status,
        cursor: parse_cursor(query.cursor)?,
        limit: limit + 1,
    };
    let reports = anonymous_service(&state).list(&auth.0, &filter).await?;
    Ok(Json(paginate(reports, limit, |r| (r.created_at, r.id))))
}

pub async fn review_anonymous_report(
    Path(id): Path<Uuid>,
    auth: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<AnonymousReviewRequest>, JsonRejection>,
) -> Result<Json<AnonymousReport>, AppError> {
    let Json(payload) = payload?;
    let report = anonymous_service(&state)
        .review(&auth.0, id, payload)
        .await?;
    Ok(Json(report))
}
