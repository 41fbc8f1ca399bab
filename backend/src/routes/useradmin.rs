//! Admin pages: user listing and bulk actions.

use std::sync::Arc;

use axum::{
    extract::{Form, Query, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::auth::session::{set_cookie, RETURN_COOKIE};
use crate::useradmin::{int_value, BulkAction, DEFAULT_PAGE, DEFAULT_SHOW};
use crate::views::{error_page, render, ActionLogTemplate, ListUsersTemplate};
use crate::AppState;

pub const LOGIN_PATH: &str = "/auth/login/";

/// Middleware that requires a signed-in operator in the admin group.
///
/// Anonymous requests are sent to the login page with their path remembered
/// in the return cookie. Form posts are redirected with 303 so the browser
/// follows up with a GET.
async fn require_group(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let group = &state.config.oidc.admin_group;

    match state.identity.authenticate(request.headers()).await {
        Ok(user) => {
            if !user.has_group(group) {
                tracing::warn!(
                    sub = %user.sub,
                    username = ?user.username,
                    "Operator is not in group {}",
                    group
                );
                return error_page(
                    StatusCode::UNAUTHORIZED,
                    "You do not have access to this resource.",
                );
            }
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!("Redirecting to login: {}", e);
            let return_to = request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            let method = request.method();
            let redirect = if method == Method::GET || method == Method::HEAD {
                Redirect::temporary(LOGIN_PATH)
            } else {
                Redirect::to(LOGIN_PATH)
            };
            (
                AppendHeaders([(header::SET_COOKIE, set_cookie(RETURN_COOKIE, return_to))]),
                redirect,
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    page: Option<String>,
    show: Option<String>,
}

/// GET {prefix}/ - one page of users with their groups.
async fn list_users(State(state): State<Arc<AppState>>, Query(query): Query<ListQuery>) -> Response {
    let page = int_value(query.page.as_deref(), DEFAULT_PAGE);
    let show = int_value(query.show.as_deref(), DEFAULT_SHOW);

    match state.user_admin.list_users(page, show).await {
        Ok(listing) => render(
            StatusCode::OK,
            &ListUsersTemplate::new(state.admin_url(), listing),
        ),
        Err(e) => {
            tracing::error!("Listing gitlab users: {}", e);
            error_page(StatusCode::INTERNAL_SERVER_ERROR, "Error listing users.")
        }
    }
}

/// POST {prefix}/ - apply a bulk action and show its log.
async fn update_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(fields): Form<Vec<(String, String)>>,
) -> Response {
    let mut user_ids = Vec::new();
    for (_, value) in fields.iter().filter(|(key, _)| key == "user") {
        match value.trim().parse::<u64>() {
            Ok(id) => user_ids.push(id),
            Err(e) => {
                tracing::warn!("Invalid form data in bulk update: {:?}: {}", value, e);
                return error_page(StatusCode::BAD_REQUEST, "Bad request.");
            }
        }
    }

    let field = |name: &str| {
        fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .unwrap_or("")
    };

    let action = match BulkAction::parse(field("action"), field("param")) {
        Ok(action) => action,
        Err(e) => {
            tracing::warn!("Unsupported bulk action {:?}", e.0);
            return error_page(StatusCode::NOT_IMPLEMENTED, &e.to_string());
        }
    };

    let mut log = state.user_admin.execute(&action, &user_ids).await;
    log.ref_url = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    render(
        StatusCode::OK,
        &ActionLogTemplate::new(&log, &state.admin_url()),
    )
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.admin_url(), get(list_users).post(update_users))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_group))
        .with_state(state)
}
