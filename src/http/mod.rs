use axum::middleware::from_fn_with_state;
use axum::Router;

use crate::AppState;

mod auth;
mod error;
mod handlers;
mod middleware;
mod routes;

pub use auth::{AuthUser, OptionalAuthUser};
pub use error::AppError;
pub use handlers::DEVICE_FINGERPRINT_HEADER;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health())
        .merge(routes::reports())
        .merge(routes::review())
        .merge(routes::incidents())
        .merge(routes::anonymous())
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ))
        .with_state(state)
}
