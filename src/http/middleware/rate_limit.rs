use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;

use crate::app::rate_limiter::{RateLimiter, RateSubject};
use crate::config::rate_limits::RateAction;
use crate::http::{AppError, AuthUser};
use crate::AppState;

enum Keyed {
    User(RateAction),
    Ip(RateAction),
}

fn classify(method: &str, path: &str) -> Option<Keyed> {
    let segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();
    match (method, segments.as_slice()) {
        ("POST", ["", "v1", "reports"]) => Some(Keyed::User(RateAction::SubmitReport)),
        ("POST", ["", "v1", "reports", _, "votes"]) => Some(Keyed::User(RateAction::Vote)),
        ("POST", ["", "v1", "anonymous-reports"]) => {
            Some(Keyed::Ip(RateAction::AnonymousSubmit))
        }
        ("GET", ["", "v1", "tracking", _]) => Some(Keyed::Ip(RateAction::TrackingLookup)),
        _ => None,
    }
}

/// Per-user caps on named writes and per-IP caps on the anonymous
/// channel. A no-op when redis is not configured.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(cache) = state.cache.clone() else {
        return Ok(next.run(request).await);
    };

    // Unauthenticated named writes fall through to the handler's 401.
    let (subject, action) = match classify(request.method().as_str(), request.uri().path()) {
        Some(Keyed::User(action)) => match auth {
            Some(AuthUser(caller)) => (RateSubject::User(caller.user_id), action),
            None => return Ok(next.run(request).await),
        },
        Some(Keyed::Ip(action)) => match connect_info {
            Some(ConnectInfo(addr)) => (RateSubject::Ip(addr.ip()), action),
            None => return Ok(next.run(request).await),
        },
        None => return Ok(next.run(request).await),
    };

    let rate_limiter = RateLimiter::new(cache, state.rate_limits);
    let info = rate_limiter.check(subject, action).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to check rate limit");
        AppError::internal("failed to check rate limit")
    })?;

    if info.limited {
        tracing::warn!(
            subject = %subject,
            action = action.as_key(),
            "rate limit exceeded"
        );
        return Err(AppError::rate_limited(format!(
            "rate limit exceeded for {}, please try again later",
            action.as_key()
        )));
    }

    if let Err(err) = rate_limiter.increment(subject, action).await {
        tracing::warn!(error = ?err, "failed to increment rate limit counter");
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(info.limit));
    headers.insert(
        "x-ratelimit-remaining",
        HeaderValue::from(info.remaining.saturating_sub(1)),
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pipeline_writes_and_lookups_are_limited() {
        let vote_path = format!("/v1/reports/{}/votes", uuid::Uuid::new_v4());
        assert!(matches!(
            classify("POST", &vote_path),
            Some(Keyed::User(RateAction::Vote))
        ));
        assert!(matches!(
            classify("POST", "/v1/reports"),
            Some(Keyed::User(RateAction::SubmitReport))
        ));
        assert!(matches!(
            classify("GET", "/v1/tracking/abc.def"),
            Some(Keyed::Ip(RateAction::TrackingLookup))
        ));
        assert!(classify("GET", "/v1/reports").is_none());
        assert!(classify("GET", "/v1/incidents").is_none());
    }
}
