use axum::{routing::get, routing::patch, routing::post, Router};

use crate::AppState;
use crate::http::handlers;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn reports() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/reports",
            post(handlers::submit_report).get(handlers::list_reports),
        )
        .route("/v1/reports/:id", get(handlers::get_report))
        .route("/v1/reports/:id/votes", post(handlers::vote_on_report))
}

pub fn review() -> Router<AppState> {
    Router::new()
        .route("/v1/review-queue", get(handlers::review_queue))
        .route("/v1/reports/:id/review", post(handlers::review_report))
        .route("/v1/reports/:id/triage", post(handlers::trigger_triage))
        .route("/v1/reports/:id/triage-log", get(handlers::triage_log))
        .route("/v1/reports/:id/publish", post(handlers::publish_report))
}

pub fn incidents() -> Router<AppState> {
    Router::new()
        .route("/v1/incidents", get(handlers::list_incidents))
        .route("/v1/incidents/:id", get(handlers::get_incident))
        .route(
            "/v1/incidents/:id/status",
            patch(handlers::update_incident_status),
        )
}

pub fn anonymous() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/anonymous-reports",
            post(handlers::submit_anonymous_report).get(handlers::list_anonymous_reports),
        )
        .route(
            "/v1/anonymous-reports/:id/status",
            post(handlers::review_anonymous_report),
        )
        .route("/v1/tracking/:code", get(handlers::track_anonymous_report))
}
