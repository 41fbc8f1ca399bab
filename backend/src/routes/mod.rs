pub mod auth;
pub mod health;
pub mod home;
pub mod provision;
pub mod useradmin;

use std::sync::Arc;

use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

use crate::logging::request_logger;
use crate::AppState;

/// The full HTTP surface.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(home::router(state.clone()))
        .merge(provision::router(state.clone()))
        .merge(auth::router(state.clone()))
        .merge(useradmin::router(state))
        .layer(middleware::from_fn(request_logger))
        .layer(TraceLayer::new_for_http())
}
