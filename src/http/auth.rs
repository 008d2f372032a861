use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::app::auth::{AuthService, Caller};
use crate::http::AppError;
use crate::AppState;

#[derive(Debug, Clone)]
pub struct AuthUser(pub Caller);

/// Public reads accept an optional session; a bad token is still an error.
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<Caller>);

fn bearer_token(parts: &Parts) -> Result<Option<&str>, AppError> {
    let header_value = match parts.headers.get(header::AUTHORIZATION) {
        Some(value) => value,
        None => return Ok(None),
    };
    let header_value = header_value
        .to_str()
        .map_err(|_| AppError::unauthorized("invalid Authorization header"))?;
    header_value
        .strip_prefix("Bearer ")
        .map(Some)
        .ok_or_else(|| AppError::unauthorized("invalid Authorization header"))
}

fn authenticate(state: &AppState, token: &str) -> Result<Caller, AppError> {
    let service = AuthService::new(state.paseto_access_key, state.access_ttl_minutes);
    service
        .authenticate_access_token(token)
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to authenticate");
            AppError::internal("failed to authenticate")
        })?
        .ok_or_else(|| AppError::unauthorized("invalid token"))
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?
            .ok_or_else(|| AppError::unauthorized("missing Authorization header"))?;
        Ok(AuthUser(authenticate(state, token)?))
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for OptionalAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match bearer_token(parts)? {
            Some(token) => Ok(OptionalAuthUser(Some(authenticate(state, token)?))),
            None => Ok(OptionalAuthUser(None)),
        }
    }
}
