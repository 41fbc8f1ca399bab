//! Sign-in round trip with the identity provider (authorization-code flow).

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use rand::{distributions::Alphanumeric, Rng};
use serde::Deserialize;

use crate::auth::session::{
    clear_cookie, read_cookie, safe_return_path, set_cookie_for, AUTH_COOKIE, RETURN_COOKIE,
    STATE_COOKIE,
};
use crate::auth::AuthError;
use crate::views::error_page;
use crate::AppState;

/// How long a started sign-in may take, in seconds.
const STATE_TTL_SECS: u64 = 600;
const STATE_LEN: usize = 32;

fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LEN)
        .map(char::from)
        .collect()
}

/// GET /auth/login/ - go back if already signed in, to the provider otherwise.
async fn login(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if state.identity.authenticate(&headers).await.is_ok() {
        let target = safe_return_path(read_cookie(&headers, RETURN_COOKIE));
        return (
            AppendHeaders([(header::SET_COOKIE, clear_cookie(RETURN_COOKIE))]),
            Redirect::temporary(&target),
        )
            .into_response();
    }

    let sign_in_state = random_state();
    match state.identity.authorize_url(&sign_in_state) {
        Ok(url) => (
            AppendHeaders([(
                header::SET_COOKIE,
                set_cookie_for(STATE_COOKIE, &sign_in_state, STATE_TTL_SECS),
            )]),
            Redirect::temporary(&url),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Cannot start sign-in: {}", e);
            error_page(StatusCode::SERVICE_UNAVAILABLE, "Login is not configured.")
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// GET /auth/callback?code=...&state=... - trade the code for an ID token,
/// start a session and return to the remembered page.
async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = query.error {
        tracing::warn!("Identity provider refused sign-in: {}", error);
        return error_page(StatusCode::UNAUTHORIZED, "Sign-in was refused.");
    }

    let expected = read_cookie(&headers, STATE_COOKIE);
    if expected.is_none() || expected != query.state {
        tracing::warn!("Sign-in state mismatch");
        return error_page(StatusCode::UNAUTHORIZED, "Invalid sign-in state.");
    }

    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return error_page(StatusCode::UNAUTHORIZED, "Missing credentials.");
    };

    let user = match state.identity.exchange_code(&code).await {
        Ok(user) => user,
        Err(e @ AuthError::NotConfigured(_)) => {
            tracing::error!("Cannot finish sign-in: {}", e);
            return error_page(StatusCode::SERVICE_UNAVAILABLE, "Login is not configured.");
        }
        Err(e) => {
            tracing::warn!("Rejected sign-in: {}", e);
            return error_page(StatusCode::UNAUTHORIZED, "Invalid credentials.");
        }
    };

    let session = match state.identity.issue_session(&user) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("Signing session for {}: {}", user.sub, e);
            return error_page(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        }
    };

    tracing::info!(sub = %user.sub, username = ?user.username, "Operator signed in");
    let target = safe_return_path(read_cookie(&headers, RETURN_COOKIE));
    (
        AppendHeaders([
            (
                header::SET_COOKIE,
                set_cookie_for(AUTH_COOKIE, &session, state.identity.session_ttl_secs()),
            ),
            (header::SET_COOKIE, clear_cookie(RETURN_COOKIE)),
            (header::SET_COOKIE, clear_cookie(STATE_COOKIE)),
        ]),
        Redirect::temporary(&target),
    )
        .into_response()
}

/// GET /auth/logout/ - drop the session cookie.
async fn logout() -> Response {
    (
        AppendHeaders([(header::SET_COOKIE, clear_cookie(AUTH_COOKIE))]),
        Redirect::temporary("/"),
    )
        .into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/login/", get(login))
        .route("/auth/callback", get(callback))
        .route("/auth/logout/", get(logout))
        .with_state(state)
}
