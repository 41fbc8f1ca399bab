//! Onboarding webhook.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::StatusCode, routing::post, Router};

use crate::provisioner::{parse_payload, ProvisionError};
use crate::AppState;

/// POST /user/provision/ - create the new hire's accounts everywhere.
async fn provision(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, ProvisionError> {
    let user = parse_payload(&body).inspect_err(|e| {
        tracing::warn!("Rejected onboarding payload: {:?}", e);
    })?;

    match state.provisioner.provision(&user).await {
        Ok(outcome) => {
            tracing::info!(
                gitlab_id = outcome.gitlab_id,
                chat_user_id = %outcome.chat_user_id,
                memberships = outcome.memberships.len(),
                "Provisioned {}",
                user.telegram_handle
            );
            Ok(StatusCode::OK)
        }
        Err(e) => {
            tracing::error!(stage = ?e.stage(), "Provisioning {}: {}", user.telegram_handle, e);
            Err(e)
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/user/provision/", post(provision))
        .with_state(state)
}
