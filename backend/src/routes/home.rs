use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Response, routing::get, Router};

use crate::views::{render, HomepageTemplate};
use crate::AppState;

async fn homepage(State(state): State<Arc<AppState>>) -> Response {
    render(
        StatusCode::OK,
        &HomepageTemplate {
            admin_url: state.admin_url(),
        },
    )
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new().route("/", get(homepage)).with_state(state)
}
